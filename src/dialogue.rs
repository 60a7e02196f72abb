//! Dialogue module for the per-user conversation state and input validation.

use serde::{Deserialize, Serialize};

use crate::config::{OrderPolicy, ProfilePolicy};
use crate::models::Category;

/// Represents where a user is in a multi-step flow
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogueState {
    #[default]
    Idle,
    /// Executor is writing a profile description
    CreatingProfile,
    /// Client is describing a task in `category`
    CreatingOrder { category: Category },
}

/// Validates a profile description input.
///
/// Returns the trimmed description, or the localization key of the
/// message explaining the rejection.
pub fn validate_description(text: &str, policy: &ProfilePolicy) -> Result<String, &'static str> {
    let trimmed = text.trim();
    let chars = trimmed.chars().count();

    if chars < policy.min_description_chars {
        return Err("profile-description-too-short");
    }

    if chars > policy.max_description_chars {
        return Err("profile-description-too-long");
    }

    Ok(trimmed.to_string())
}

/// Validates an order text input
pub fn validate_order_text(text: &str, policy: &OrderPolicy) -> Result<String, &'static str> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Err("order-text-empty");
    }

    if trimmed.chars().count() > policy.max_text_chars {
        return Err("order-text-too-long");
    }

    Ok(trimmed.to_string())
}
