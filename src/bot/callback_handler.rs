//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::dialogue::DialogueState;
use crate::dispatcher::IncomingCallback;
use crate::errors::StoreError;
use crate::localization::{t_args_lang, t_lang};
use crate::models::Category;

use super::message_handler::{send_generic_error, send_profile, send_role_prompt};
use super::ui_builder::{create_categories_keyboard, create_complaint_confirm_keyboard};
use super::BotContext;

/// Parsed inline button payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    RoleExecutor,
    RoleClient,
    Category(Category),
    Connect(i64),
    Complain(i64),
    ComplainConfirm(i64),
    ComplainCancel,
    ProfileEdit,
    ProfileDelete,
    BackToStart,
    /// An order action whose id does not parse
    MalformedOrderId,
}

impl CallbackAction {
    /// Parse a payload; `None` for anything this bot never sends
    pub fn parse(data: &str) -> Option<Self> {
        let action = match data {
            "role:executor" => Self::RoleExecutor,
            "role:client" => Self::RoleClient,
            "complain:cancel" => Self::ComplainCancel,
            "profile:edit" => Self::ProfileEdit,
            "profile:delete" => Self::ProfileDelete,
            "back:to_start" => Self::BackToStart,
            _ => {
                if let Some(category) = data.strip_prefix("cat:") {
                    return category.parse().ok().map(Self::Category);
                }
                let order_id = |prefix: &str| {
                    data.strip_prefix(prefix)
                        .map(|id| id.parse::<i64>().ok())
                };
                if let Some(id) = order_id("order:connect:") {
                    return Some(id.map_or(Self::MalformedOrderId, Self::Connect));
                }
                if let Some(id) = order_id("order:complain:") {
                    return Some(id.map_or(Self::MalformedOrderId, Self::Complain));
                }
                if let Some(id) = order_id("complain:confirm:") {
                    return Some(id.map_or(Self::MalformedOrderId, Self::ComplainConfirm));
                }
                return None;
            }
        };
        Some(action)
    }

    /// Payload carried by a button for this action
    pub fn to_data(&self) -> String {
        match self {
            Self::RoleExecutor => "role:executor".to_string(),
            Self::RoleClient => "role:client".to_string(),
            Self::Category(category) => format!("cat:{category}"),
            Self::Connect(id) => format!("order:connect:{id}"),
            Self::Complain(id) => format!("order:complain:{id}"),
            Self::ComplainConfirm(id) => format!("complain:confirm:{id}"),
            Self::ComplainCancel => "complain:cancel".to_string(),
            Self::ProfileEdit => "profile:edit".to_string(),
            Self::ProfileDelete => "profile:delete".to_string(),
            Self::BackToStart => "back:to_start".to_string(),
            Self::MalformedOrderId => String::new(),
        }
    }
}

/// Handle callback queries from inline keyboards
pub async fn callback_handler(ctx: &BotContext, q: IncomingCallback) -> Result<()> {
    // Answer first so the client drops its loading indicator whatever happens next
    ctx.outbox.answer_callback(q.callback_id.clone()).await?;

    let language_code = q.language_code.as_deref();
    let Some(action) = CallbackAction::parse(&q.data) else {
        debug!(user_id = q.sender_id, data = %q.data, "Ignoring unknown callback payload");
        return Ok(());
    };
    debug!(user_id = q.sender_id, action = ?action, "Received callback query from user");

    match action {
        CallbackAction::RoleExecutor | CallbackAction::ProfileEdit => {
            start_profile_flow(ctx, q.sender_id, language_code).await
        }
        CallbackAction::RoleClient => {
            ctx.outbox
                .keyboard(
                    q.chat_id,
                    t_lang("category-prompt", language_code),
                    create_categories_keyboard(language_code),
                )
                .await?;
            Ok(())
        }
        CallbackAction::Category(category) => {
            ctx.states
                .set(q.sender_id, DialogueState::CreatingOrder { category });
            ctx.outbox
                .text(q.sender_id, t_lang("order-prompt", language_code))
                .await?;
            Ok(())
        }
        CallbackAction::Connect(order_id) => {
            handle_connect(ctx, q.sender_id, order_id, language_code).await
        }
        CallbackAction::Complain(order_id) => {
            ctx.outbox
                .keyboard(
                    q.chat_id,
                    t_args_lang(
                        "complain-confirm-prompt",
                        &[("id", &order_id.to_string())],
                        language_code,
                    ),
                    create_complaint_confirm_keyboard(order_id, language_code),
                )
                .await?;
            Ok(())
        }
        CallbackAction::ComplainConfirm(order_id) => {
            handle_complaint(ctx, q.sender_id, order_id, language_code).await
        }
        CallbackAction::ComplainCancel => {
            ctx.outbox
                .text(q.sender_id, t_lang("complain-cancelled", language_code))
                .await?;
            Ok(())
        }
        CallbackAction::ProfileDelete => handle_profile_delete(ctx, q.sender_id, language_code).await,
        CallbackAction::BackToStart => send_role_prompt(ctx, q.chat_id, language_code).await,
        CallbackAction::MalformedOrderId => {
            warn!(user_id = q.sender_id, data = %q.data, "Callback with malformed order id");
            ctx.outbox
                .text(q.sender_id, t_lang("order-not-found", language_code))
                .await?;
            Ok(())
        }
    }
}

async fn start_profile_flow(
    ctx: &BotContext,
    user_id: i64,
    language_code: Option<&str>,
) -> Result<()> {
    let policy = &ctx.policy.profile;
    ctx.states.set(user_id, DialogueState::CreatingProfile);
    let prompt = t_args_lang(
        "profile-prompt",
        &[
            ("min", &policy.min_description_chars.to_string()),
            ("max", &policy.max_description_chars.to_string()),
        ],
        language_code,
    );
    ctx.outbox.text(user_id, prompt).await?;
    Ok(())
}

async fn handle_profile_delete(
    ctx: &BotContext,
    user_id: i64,
    language_code: Option<&str>,
) -> Result<()> {
    let key = match ctx.store.delete_profile(user_id).await {
        Ok(()) => {
            info!(user_id, "Profile deleted");
            "profile-deleted"
        }
        Err(StoreError::NotFound) => "profile-not-found",
        Err(e) => {
            error!(user_id, error = %e, "Failed to delete profile");
            "error-generic"
        }
    };
    ctx.outbox.text(user_id, t_lang(key, language_code)).await?;
    Ok(())
}

/// Introduce `connector_id` to the order's creator and consume the order.
///
/// Not transactional: notifications are queued before the delete and are
/// not withdrawn if a later step fails.
pub async fn handle_connect(
    ctx: &BotContext,
    connector_id: i64,
    order_id: i64,
    language_code: Option<&str>,
) -> Result<()> {
    let order = match ctx.store.get_order_by_id(order_id).await {
        Ok(order) => order,
        Err(StoreError::NotFound) => {
            ctx.outbox
                .text(connector_id, t_lang("order-not-found", language_code))
                .await?;
            return Ok(());
        }
        Err(e) => {
            error!(order_id, error = %e, "Failed to load order for connect");
            return send_generic_error(ctx, connector_id, language_code).await;
        }
    };

    ctx.outbox
        .text(
            order.creator_id,
            t_args_lang(
                "connect-creator-notice",
                &[("connector", &connector_id.to_string())],
                None,
            ),
        )
        .await?;

    match ctx.store.get_profile(connector_id).await {
        Ok(profile) => send_profile(ctx, order.creator_id, &profile, None, None).await?,
        Err(StoreError::NotFound) => {}
        Err(e) => warn!(user_id = connector_id, error = %e, "Failed to load connector profile"),
    }

    match ctx.store.delete_order_by_id(order_id).await {
        Ok(()) => {}
        Err(StoreError::NotFound) => {
            // Another connect consumed the order between lookup and delete
            ctx.outbox
                .text(connector_id, t_lang("order-not-found", language_code))
                .await?;
            return Ok(());
        }
        Err(e) => {
            error!(order_id, error = %e, "Failed to delete connected order");
            return send_generic_error(ctx, connector_id, language_code).await;
        }
    }

    info!(order_id, connector_id, creator_id = order.creator_id, "Order connected");
    ctx.outbox
        .text(connector_id, t_lang("connect-success", language_code))
        .await?;
    Ok(())
}

/// Count a confirmed complaint and apply the moderation thresholds
pub async fn handle_complaint(
    ctx: &BotContext,
    reporter_id: i64,
    order_id: i64,
    language_code: Option<&str>,
) -> Result<()> {
    let count = match ctx.store.increment_complaint(order_id).await {
        Ok(count) => count,
        Err(StoreError::NotFound) => {
            ctx.outbox
                .text(reporter_id, t_lang("order-not-found", language_code))
                .await?;
            return Ok(());
        }
        Err(e) => {
            error!(order_id, error = %e, "Failed to record complaint");
            return send_generic_error(ctx, reporter_id, language_code).await;
        }
    };

    info!(order_id, reporter_id, complaints = count, "Complaint recorded");
    ctx.outbox
        .text(
            reporter_id,
            t_args_lang(
                "complain-accepted",
                &[("count", &count.to_string())],
                language_code,
            ),
        )
        .await?;

    let moderation = &ctx.policy.moderation;
    let should_delete = count >= moderation.delete_threshold;
    let should_warn = moderation.warn_threshold.is_some_and(|warn| count >= warn);
    if !should_delete && !should_warn {
        return Ok(());
    }

    let order = match ctx.store.get_order_by_id(order_id).await {
        Ok(order) => order,
        // Already removed by a concurrent complaint or connect
        Err(StoreError::NotFound) => return Ok(()),
        Err(e) => {
            error!(order_id, error = %e, "Failed to load order for moderation");
            return Ok(());
        }
    };

    let count_arg = count.to_string();
    if should_delete {
        match ctx.store.delete_order_by_id(order_id).await {
            Ok(()) => {
                warn!(order_id, complaints = count, "Order removed after complaints");
                ctx.outbox
                    .text(
                        order.creator_id,
                        t_args_lang("order-removed-complaints", &[("count", &count_arg)], None),
                    )
                    .await?;
            }
            Err(StoreError::NotFound) => {}
            Err(e) => error!(order_id, error = %e, "Failed to delete order after complaints"),
        }
    } else {
        let limit = moderation.delete_threshold.to_string();
        ctx.outbox
            .text(
                order.creator_id,
                t_args_lang(
                    "order-complaint-warning",
                    &[("count", &count_arg), ("limit", &limit)],
                    None,
                ),
            )
            .await?;
    }
    Ok(())
}
