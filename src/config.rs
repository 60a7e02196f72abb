//! # Bot Configuration Module
//!
//! This module defines the runtime configuration of the bot: credentials,
//! storage selection, the category-to-group routing table, worker pool sizes
//! and the dialogue/moderation policies consulted by the handlers.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::models::Category;

// Constants for queue and state table configuration
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_UPDATE_WORKERS: usize = 4;
pub const DEFAULT_OUTBOUND_WORKERS: usize = 2;
pub const STATE_TTL: Duration = Duration::from_secs(15 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_STORAGE_PATH: &str = "storage.json";

// Constants for dialogue policy
pub const MIN_DESCRIPTION_CHARS: usize = 150;
pub const MAX_DESCRIPTION_CHARS: usize = 200;
pub const MAX_ORDER_TEXT_CHARS: usize = 1000;

// Constants for moderation policy
pub const COMPLAINT_DELETE_THRESHOLD: u32 = 10;
pub const COMPLAINT_WARN_THRESHOLD: u32 = 7;

/// Length bounds for executor profile descriptions
#[derive(Debug, Clone)]
pub struct ProfilePolicy {
    /// Minimum description length in characters (after trimming)
    pub min_description_chars: usize,
    /// Maximum description length in characters (after trimming)
    pub max_description_chars: usize,
}

impl Default for ProfilePolicy {
    fn default() -> Self {
        Self {
            min_description_chars: MIN_DESCRIPTION_CHARS,
            max_description_chars: MAX_DESCRIPTION_CHARS,
        }
    }
}

/// Length bound for client order texts
#[derive(Debug, Clone)]
pub struct OrderPolicy {
    /// Maximum order text length in characters (after trimming)
    pub max_text_chars: usize,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            max_text_chars: MAX_ORDER_TEXT_CHARS,
        }
    }
}

/// Complaint thresholds for automatic moderation
#[derive(Debug, Clone)]
pub struct ModerationPolicy {
    /// Complaint count at which an order is deleted
    pub delete_threshold: u32,
    /// Complaint count at which the creator is warned; `None` disables warnings
    pub warn_threshold: Option<u32>,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            delete_threshold: COMPLAINT_DELETE_THRESHOLD,
            warn_threshold: Some(COMPLAINT_WARN_THRESHOLD),
        }
    }
}

/// Destination group chat for each order category.
///
/// A zero chat id means the category is not routed.
#[derive(Debug, Clone, Default)]
pub struct GroupRoutes {
    pub design: i64,
    pub programming: i64,
    pub content: i64,
}

impl GroupRoutes {
    /// Group chat id for `category`, or `None` when the category is unrouted
    pub fn chat_for(&self, category: Category) -> Option<i64> {
        let chat_id = match category {
            Category::Design => self.design,
            Category::Programming => self.programming,
            Category::Content => self.content,
        };
        (chat_id != 0).then_some(chat_id)
    }
}

/// Policies consulted by the message and callback handlers
#[derive(Debug, Clone, Default)]
pub struct HandlerPolicy {
    pub profile: ProfilePolicy,
    pub order: OrderPolicy,
    pub moderation: ModerationPolicy,
    pub groups: GroupRoutes,
}

/// Webhook settings; long polling is used when absent
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: String,
    pub port: u16,
}

/// Full process configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    pub database_url: Option<String>,
    pub storage_path: String,
    pub webhook: Option<WebhookConfig>,
    pub update_workers: usize,
    pub outbound_workers: usize,
    pub queue_capacity: usize,
    pub policy: HandlerPolicy,
}

impl BotConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let telegram_token =
            env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;

        let webhook = match (
            non_empty_var("TELEGRAM_WEBHOOK_URL"),
            non_empty_var("WEBHOOK_SECRET"),
        ) {
            (Some(url), Some(secret)) => Some(WebhookConfig {
                url,
                secret,
                port: parse_var("PORT", DEFAULT_PORT)?,
            }),
            _ => None,
        };

        let policy = HandlerPolicy {
            groups: GroupRoutes {
                design: parse_var("DESIGN_GROUP_ID", 0)?,
                programming: parse_var("PROGRAMMING_GROUP_ID", 0)?,
                content: parse_var("CONTENT_GROUP_ID", 0)?,
            },
            ..HandlerPolicy::default()
        };

        Ok(Self {
            telegram_token,
            database_url: non_empty_var("DATABASE_URL"),
            storage_path: non_empty_var("STORAGE_PATH")
                .unwrap_or_else(|| DEFAULT_STORAGE_PATH.to_string()),
            webhook,
            update_workers: parse_var("UPDATE_WORKERS", DEFAULT_UPDATE_WORKERS)?.max(1),
            outbound_workers: parse_var("OUTBOUND_WORKERS", DEFAULT_OUTBOUND_WORKERS)?.max(1),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            policy,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}
