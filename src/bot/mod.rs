//! Bot module for handling chat interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Handles commands and text/photo messages
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `ui_builder`: Creates keyboards and formats messages

use std::sync::Arc;

use crate::config::HandlerPolicy;
use crate::db::Store;
use crate::outbox::Outbox;
use crate::state_table::ConversationStates;

pub mod callback_handler;
pub mod message_handler;
pub mod ui_builder;

// Re-export main handler functions for use by the dispatcher
pub use callback_handler::{callback_handler, CallbackAction};
pub use message_handler::message_handler;

/// Shared dependencies of the message and callback handlers
#[derive(Clone)]
pub struct BotContext {
    pub store: Arc<dyn Store>,
    pub states: Arc<ConversationStates>,
    pub outbox: Outbox,
    pub policy: Arc<HandlerPolicy>,
}

impl BotContext {
    pub fn new(
        store: Arc<dyn Store>,
        states: Arc<ConversationStates>,
        outbox: Outbox,
        policy: HandlerPolicy,
    ) -> Self {
        Self {
            store,
            states,
            outbox,
            policy: Arc::new(policy),
        }
    }
}
