//! Message Handler module for processing incoming commands, texts and photos

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::dialogue::{validate_description, validate_order_text, DialogueState};
use crate::dispatcher::IncomingMessage;
use crate::errors::StoreError;
use crate::localization::{t_args_lang, t_lang};
use crate::models::{Category, NewOrder, Profile};
use crate::transport::Keyboard;

use super::ui_builder::{
    create_order_actions_keyboard, create_profile_keyboard, create_role_keyboard,
    format_order_post, format_profile,
};
use super::BotContext;

pub async fn message_handler(ctx: &BotContext, msg: IncomingMessage) -> Result<()> {
    let language_code = msg.language_code.as_deref();
    debug!(
        user_id = msg.sender_id,
        has_text = msg.text.is_some(),
        photos = msg.photos.len(),
        "Received message from user"
    );

    if let Some(command) = msg.command() {
        return match command {
            "start" => send_role_prompt(ctx, msg.chat_id, language_code).await,
            "my_profile" => handle_my_profile(ctx, &msg, language_code).await,
            "delete_order" => handle_delete_order(ctx, &msg, language_code).await,
            other => {
                debug!(user_id = msg.sender_id, command = other, "Unknown command");
                ctx.outbox
                    .text(msg.chat_id, t_lang("unknown-command", language_code))
                    .await?;
                Ok(())
            }
        };
    }

    match ctx.states.get(msg.sender_id) {
        DialogueState::CreatingProfile => handle_profile_input(ctx, &msg, language_code).await,
        DialogueState::CreatingOrder { category } => {
            handle_order_input(ctx, &msg, category, language_code).await
        }
        DialogueState::Idle => {
            ctx.outbox
                .text(msg.chat_id, t_lang("start-hint", language_code))
                .await?;
            Ok(())
        }
    }
}

pub(crate) async fn send_role_prompt(
    ctx: &BotContext,
    chat_id: i64,
    language_code: Option<&str>,
) -> Result<()> {
    ctx.outbox
        .keyboard(
            chat_id,
            t_lang("welcome-choose-role", language_code),
            create_role_keyboard(language_code),
        )
        .await?;
    Ok(())
}

/// Send the profile text (with an optional keyboard) followed by its photo
pub(crate) async fn send_profile(
    ctx: &BotContext,
    chat_id: i64,
    profile: &Profile,
    keyboard: Option<Keyboard>,
    language_code: Option<&str>,
) -> Result<()> {
    let text = format_profile(profile, language_code);
    match keyboard {
        Some(keyboard) => ctx.outbox.keyboard(chat_id, text, keyboard).await?,
        None => ctx.outbox.text(chat_id, text).await?,
    }
    if let Some(photo) = &profile.photo_file_id {
        ctx.outbox.photo(chat_id, photo.clone()).await?;
    }
    Ok(())
}

pub(crate) async fn send_generic_error(
    ctx: &BotContext,
    chat_id: i64,
    language_code: Option<&str>,
) -> Result<()> {
    ctx.outbox
        .text(chat_id, t_lang("error-generic", language_code))
        .await?;
    Ok(())
}

async fn handle_my_profile(
    ctx: &BotContext,
    msg: &IncomingMessage,
    language_code: Option<&str>,
) -> Result<()> {
    match ctx.store.get_profile(msg.sender_id).await {
        Ok(profile) => {
            send_profile(
                ctx,
                msg.chat_id,
                &profile,
                Some(create_profile_keyboard(language_code)),
                language_code,
            )
            .await
        }
        Err(StoreError::NotFound) => {
            ctx.outbox
                .text(msg.chat_id, t_lang("profile-not-found", language_code))
                .await?;
            Ok(())
        }
        Err(e) => {
            error!(user_id = msg.sender_id, error = %e, "Failed to load profile");
            send_generic_error(ctx, msg.chat_id, language_code).await
        }
    }
}

async fn handle_delete_order(
    ctx: &BotContext,
    msg: &IncomingMessage,
    language_code: Option<&str>,
) -> Result<()> {
    let deleted = match ctx.store.get_order_by_creator(msg.sender_id).await {
        Ok(order) => ctx.store.delete_order_by_id(order.id).await,
        Err(e) => Err(e),
    };

    let key = match deleted {
        Ok(()) => {
            info!(user_id = msg.sender_id, "Order deleted by its creator");
            "order-deleted"
        }
        Err(StoreError::NotFound) => "order-none",
        Err(e) => {
            error!(user_id = msg.sender_id, error = %e, "Failed to delete order");
            "error-generic"
        }
    };
    ctx.outbox.text(msg.chat_id, t_lang(key, language_code)).await?;
    Ok(())
}

async fn handle_profile_input(
    ctx: &BotContext,
    msg: &IncomingMessage,
    language_code: Option<&str>,
) -> Result<()> {
    let policy = &ctx.policy.profile;
    let input = msg.text.as_deref().unwrap_or_default();

    let description = match validate_description(input, policy) {
        Ok(description) => description,
        Err(key) => {
            // Keep the dialogue active and restart its inactivity timer
            ctx.states.set(msg.sender_id, DialogueState::CreatingProfile);
            let length = input.trim().chars().count().to_string();
            let reply = t_args_lang(
                key,
                &[
                    ("min", &policy.min_description_chars.to_string()),
                    ("max", &policy.max_description_chars.to_string()),
                    ("length", &length),
                ],
                language_code,
            );
            ctx.outbox.text(msg.chat_id, reply).await?;
            return Ok(());
        }
    };

    let profile = Profile {
        user_id: msg.sender_id,
        username: msg.username.clone().unwrap_or_default(),
        description,
        photo_file_id: msg.largest_photo().map(str::to_string),
    };

    if let Err(e) = ctx.store.upsert_profile(&profile).await {
        error!(user_id = msg.sender_id, error = %e, "Failed to save profile");
        return send_generic_error(ctx, msg.chat_id, language_code).await;
    }

    ctx.states.clear(msg.sender_id);
    info!(user_id = msg.sender_id, has_photo = profile.photo_file_id.is_some(), "Profile saved");
    ctx.outbox
        .text(msg.chat_id, t_lang("profile-saved", language_code))
        .await?;
    Ok(())
}

async fn handle_order_input(
    ctx: &BotContext,
    msg: &IncomingMessage,
    category: Category,
    language_code: Option<&str>,
) -> Result<()> {
    let max = ctx.policy.order.max_text_chars;
    let text = match validate_order_text(msg.text.as_deref().unwrap_or_default(), &ctx.policy.order)
    {
        Ok(text) => text,
        Err(key) => {
            ctx.states
                .set(msg.sender_id, DialogueState::CreatingOrder { category });
            let reply = t_args_lang(key, &[("max", &max.to_string())], language_code);
            ctx.outbox.text(msg.chat_id, reply).await?;
            return Ok(());
        }
    };

    let order = NewOrder {
        creator_id: msg.sender_id,
        category,
        text,
        photo_file_id: msg.largest_photo().map(str::to_string),
    };

    let order_id = match ctx.store.create_order(order.clone()).await {
        Ok(id) => id,
        Err(StoreError::OrderConflict { .. }) => {
            ctx.states.clear(msg.sender_id);
            ctx.outbox
                .text(msg.chat_id, t_lang("order-conflict", language_code))
                .await?;
            return Ok(());
        }
        Err(e) => {
            error!(user_id = msg.sender_id, error = %e, "Failed to create order");
            return send_generic_error(ctx, msg.chat_id, language_code).await;
        }
    };

    let posted = post_order_to_group(ctx, order_id, &order).await?;

    ctx.states.clear(msg.sender_id);
    let key = if posted {
        "order-created"
    } else {
        "order-created-unposted"
    };
    ctx.outbox.text(msg.chat_id, t_lang(key, language_code)).await?;
    Ok(())
}

/// Post the order summary with connect/complain buttons to its category group.
/// Group posts use the default language since the audience is mixed.
///
/// Returns `false` when the category has no group to post to.
async fn post_order_to_group(ctx: &BotContext, order_id: i64, order: &NewOrder) -> Result<bool> {
    let Some(group_id) = ctx.policy.groups.chat_for(order.category) else {
        warn!(order_id, category = %order.category, "No group configured for category, order not posted");
        return Ok(false);
    };

    if let Some(photo) = &order.photo_file_id {
        ctx.outbox.photo(group_id, photo.clone()).await?;
    }
    let post = format_order_post(order_id, order.category, &order.text, order.creator_id, None);
    ctx.outbox
        .keyboard(group_id, post, create_order_actions_keyboard(order_id, None))
        .await?;
    info!(order_id, group_id, category = %order.category, "Order posted to group");
    Ok(true)
}
