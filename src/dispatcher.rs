//! # Update Dispatcher Module
//!
//! Bounded FIFO of inbound chat events drained by a fixed worker pool.
//! The ingress only enqueues; each worker routes an event to the message
//! or callback handler and runs it to completion before taking the next.
//!
//! Two events from the same user may be handled concurrently by different
//! workers; nothing here serializes per user.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bot::{callback_handler, message_handler, BotContext};
use crate::errors::DispatchError;

/// Inbound text or photo message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub sender_id: i64,
    pub username: Option<String>,
    pub language_code: Option<String>,
    /// Message text, or the caption of a photo message
    pub text: Option<String>,
    /// File ids of every attached photo size, smallest first
    pub photos: Vec<String>,
}

impl IncomingMessage {
    /// Command name without the leading slash or `@botname` suffix
    pub fn command(&self) -> Option<&str> {
        let text = self.text.as_deref()?.trim_start();
        let first = text.split_whitespace().next()?;
        let command = first.strip_prefix('/')?;
        let command = command.split('@').next().unwrap_or(command);
        (!command.is_empty()).then_some(command)
    }

    /// The highest-resolution photo attached, if any
    pub fn largest_photo(&self) -> Option<&str> {
        self.photos.last().map(String::as_str)
    }
}

/// Inbound button press
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCallback {
    pub callback_id: String,
    pub sender_id: i64,
    /// Chat of the message the button belongs to
    pub chat_id: i64,
    pub language_code: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(IncomingMessage),
    Callback(IncomingCallback),
}

impl InboundEvent {
    pub fn sender_id(&self) -> i64 {
        match self {
            InboundEvent::Message(m) => m.sender_id,
            InboundEvent::Callback(c) => c.sender_id,
        }
    }
}

/// Sending half of the inbound queue, held by the ingress
#[derive(Debug, Clone)]
pub struct UpdateQueue {
    tx: mpsc::Sender<InboundEvent>,
}

impl UpdateQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<InboundEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue without waiting; a full queue is reported to the caller
    pub fn try_submit(&self, event: InboundEvent) -> Result<(), DispatchError> {
        self.tx.try_send(event).map_err(DispatchError::from)
    }

    /// Enqueue, waiting for space while the queue is full
    pub async fn submit(&self, event: InboundEvent) -> Result<(), DispatchError> {
        self.tx.send(event).await.map_err(DispatchError::from)
    }
}

/// Route one event to its handler
pub async fn handle_event(ctx: &BotContext, event: InboundEvent) -> anyhow::Result<()> {
    match event {
        InboundEvent::Message(msg) => message_handler(ctx, msg).await,
        InboundEvent::Callback(q) => callback_handler(ctx, q).await,
    }
}

/// Start `workers` tasks draining `rx`.
///
/// The tasks finish once every [`UpdateQueue`] clone is dropped and the queue is empty.
pub fn spawn_update_workers(
    rx: mpsc::Receiver<InboundEvent>,
    ctx: BotContext,
    workers: usize,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..workers.max(1))
        .map(|worker| {
            let rx = Arc::clone(&rx);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                debug!(worker, "Update worker started");
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(event) = next else { break };
                    let user_id = event.sender_id();
                    if let Err(e) = handle_event(&ctx, event).await {
                        error!(worker, user_id, error = %e, "Failed to handle update");
                    }
                }
                info!(worker, "Update worker stopped");
            })
        })
        .collect()
}
