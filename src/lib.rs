//! # Connect Bot
//!
//! A Telegram bot that matches executors offering services with clients
//! requesting them. Clients' orders are posted to per-category groups where
//! an executor can connect with the author once; complaints moderate orders
//! automatically.

pub mod bot;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod dispatcher;
pub mod errors;
pub mod json_store;
pub mod localization;
pub mod models;
pub mod outbox;
pub mod state_table;
pub mod telegram;
pub mod transport;
