//! Outbound side of the chat transport.
//!
//! Handlers never talk to the transport directly; they queue
//! [`crate::outbox::Outbound`] descriptors and the outbound workers call
//! into a [`Transport`].

use anyhow::Result;
use async_trait::async_trait;

/// A single inline button carrying an opaque callback payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Transport-neutral inline keyboard, one `Vec` per row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    /// Iterate over every button payload, row by row
    pub fn callback_data(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(|b| b.data.as_str())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    async fn send_photo(&self, chat_id: i64, photo_file_id: &str) -> Result<()>;

    async fn send_with_keyboard(&self, chat_id: i64, text: &str, keyboard: &Keyboard)
        -> Result<()>;

    /// Dismiss the client-side loading indicator of a button press
    async fn answer_callback(&self, callback_id: &str) -> Result<()>;
}
