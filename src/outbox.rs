//! # Outbound Dispatcher Module
//!
//! Bounded queue between "decide what to send" and "send it". Handlers push
//! [`Outbound`] descriptors through an [`Outbox`]; a fixed pool of workers
//! hands them to the [`Transport`]. Delivery is best-effort: failures are
//! logged and dropped.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::DispatchError;
use crate::transport::{Keyboard, Transport};

/// A fully constructed outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text {
        chat_id: i64,
        text: String,
    },
    Photo {
        chat_id: i64,
        photo_file_id: String,
    },
    Keyboard {
        chat_id: i64,
        text: String,
        keyboard: Keyboard,
    },
    AnswerCallback {
        callback_id: String,
    },
}

impl Outbound {
    /// Destination chat, if the descriptor targets one
    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Outbound::Text { chat_id, .. }
            | Outbound::Photo { chat_id, .. }
            | Outbound::Keyboard { chat_id, .. } => Some(*chat_id),
            Outbound::AnswerCallback { .. } => None,
        }
    }

    /// Message text, if the descriptor carries one
    pub fn text(&self) -> Option<&str> {
        match self {
            Outbound::Text { text, .. } | Outbound::Keyboard { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// Sending half of the outbound queue, cloned into every handler context
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Outbound>,
}

impl Outbox {
    /// Create an outbox and the receiver the workers drain
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a descriptor, waiting while the queue is full
    pub async fn push(&self, item: Outbound) -> Result<(), DispatchError> {
        self.tx.send(item).await.map_err(DispatchError::from)
    }

    pub async fn text(&self, chat_id: i64, text: impl Into<String>) -> Result<(), DispatchError> {
        self.push(Outbound::Text {
            chat_id,
            text: text.into(),
        })
        .await
    }

    pub async fn photo(
        &self,
        chat_id: i64,
        photo_file_id: impl Into<String>,
    ) -> Result<(), DispatchError> {
        self.push(Outbound::Photo {
            chat_id,
            photo_file_id: photo_file_id.into(),
        })
        .await
    }

    pub async fn keyboard(
        &self,
        chat_id: i64,
        text: impl Into<String>,
        keyboard: Keyboard,
    ) -> Result<(), DispatchError> {
        self.push(Outbound::Keyboard {
            chat_id,
            text: text.into(),
            keyboard,
        })
        .await
    }

    pub async fn answer_callback(
        &self,
        callback_id: impl Into<String>,
    ) -> Result<(), DispatchError> {
        self.push(Outbound::AnswerCallback {
            callback_id: callback_id.into(),
        })
        .await
    }
}

async fn deliver(transport: &dyn Transport, item: &Outbound) -> anyhow::Result<()> {
    match item {
        Outbound::Text { chat_id, text } => transport.send_text(*chat_id, text).await,
        Outbound::Photo {
            chat_id,
            photo_file_id,
        } => transport.send_photo(*chat_id, photo_file_id).await,
        Outbound::Keyboard {
            chat_id,
            text,
            keyboard,
        } => transport.send_with_keyboard(*chat_id, text, keyboard).await,
        Outbound::AnswerCallback { callback_id } => transport.answer_callback(callback_id).await,
    }
}

/// Start `workers` tasks draining `rx` into `transport`.
///
/// The tasks finish once every [`Outbox`] clone is dropped and the queue is empty.
pub fn spawn_outbound_workers(
    rx: mpsc::Receiver<Outbound>,
    transport: Arc<dyn Transport>,
    workers: usize,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..workers.max(1))
        .map(|worker| {
            let rx = Arc::clone(&rx);
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                debug!(worker, "Outbound worker started");
                loop {
                    // Only the receive is under the lock; sending runs unlocked
                    let next = rx.lock().await.recv().await;
                    let Some(item) = next else { break };
                    if let Err(e) = deliver(transport.as_ref(), &item).await {
                        warn!(worker, chat_id = ?item.chat_id(), error = %e, "Failed to deliver outbound message");
                    }
                }
                info!(worker, "Outbound worker stopped");
            })
        })
        .collect()
}
