//! # Error Types Module
//!
//! Structured errors for the storage backends and the work queues.
//! Handlers wrap these in `anyhow` and decide which ones are user-facing.

use thiserror::Error;

/// Errors returned by [`crate::db::Store`] implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested profile or order does not exist
    #[error("record not found")]
    NotFound,
    /// The creator already owns an active order
    #[error("user {creator_id} already has an active order")]
    OrderConflict { creator_id: i64 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A stored row could not be mapped back to the data model
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Errors returned when submitting work to a bounded queue
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The queue is at capacity; the caller decides whether to wait or drop
    #[error("queue is full")]
    QueueFull,
    /// The workers have shut down
    #[error("queue is closed")]
    Closed,
}

impl<T> From<tokio::sync::mpsc::error::TrySendError<T>> for DispatchError {
    fn from(err: tokio::sync::mpsc::error::TrySendError<T>) -> Self {
        match err {
            tokio::sync::mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            tokio::sync::mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for DispatchError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        DispatchError::Closed
    }
}
