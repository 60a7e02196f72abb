use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use connect_bot::bot::BotContext;
use connect_bot::config::{BotConfig, WebhookConfig, STATE_TTL, SWEEP_INTERVAL};
use connect_bot::db::{PgStore, Store};
use connect_bot::dispatcher::{spawn_update_workers, InboundEvent, UpdateQueue};
use connect_bot::json_store::JsonStore;
use connect_bot::outbox::{spawn_outbound_workers, Outbox};
use connect_bot::state_table::ConversationStates;
use connect_bot::telegram::{incoming_callback, incoming_message};

async fn enqueue_message(msg: Message, updates: UpdateQueue) -> Result<()> {
    match incoming_message(&msg) {
        Some(event) => updates.submit(InboundEvent::Message(event)).await?,
        None => debug!(chat_id = %msg.chat.id, "Rejected message without sender"),
    }
    Ok(())
}

async fn enqueue_callback(q: CallbackQuery, updates: UpdateQueue) -> Result<()> {
    match incoming_callback(&q) {
        Some(event) => updates.submit(InboundEvent::Callback(event)).await?,
        None => debug!(user_id = %q.from.id, "Rejected callback without data"),
    }
    Ok(())
}

async fn open_store(config: &BotConfig) -> Result<Arc<dyn Store>> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url)
                .await
                .context("Failed to initialize PostgreSQL storage")?;
            info!("Using PostgreSQL storage");
            Ok(Arc::new(store))
        }
        None => {
            let store = JsonStore::open(&config.storage_path)
                .await
                .context("Failed to initialize JSON file storage")?;
            warn!(path = %config.storage_path, "Using JSON file storage; set DATABASE_URL for production");
            Ok(Arc::new(store))
        }
    }
}

fn webhook_url(webhook: &WebhookConfig) -> Result<url::Url> {
    let raw = format!(
        "{}/webhook/{}",
        webhook.url.trim_end_matches('/'),
        webhook.secret
    );
    raw.parse().context("TELEGRAM_WEBHOOK_URL is not a valid URL")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Connect Telegram Bot");

    let config = BotConfig::from_env()?;
    let store = open_store(&config).await?;
    let bot = Bot::new(&config.telegram_token);

    let states = Arc::new(ConversationStates::new(STATE_TTL));
    let sweeper = Arc::clone(&states).spawn_sweeper(SWEEP_INTERVAL);

    let (outbox, outbound_rx) = Outbox::channel(config.queue_capacity);
    let outbound_workers =
        spawn_outbound_workers(outbound_rx, Arc::new(bot.clone()), config.outbound_workers);

    let ctx = BotContext::new(store, states, outbox, config.policy.clone());
    let (updates, update_rx) = UpdateQueue::channel(config.queue_capacity);
    let update_workers = spawn_update_workers(update_rx, ctx, config.update_workers);

    info!(
        update_workers = config.update_workers,
        outbound_workers = config.outbound_workers,
        "Workers started, starting dispatcher"
    );

    // The ingress only converts and enqueues; the worker pool does the rest
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(enqueue_message))
        .branch(Update::filter_callback_query().endpoint(enqueue_callback));

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![updates])
        .enable_ctrlc_handler()
        .build();

    match &config.webhook {
        Some(webhook) => {
            let addr = SocketAddr::from(([0, 0, 0, 0], webhook.port));
            let url = webhook_url(webhook)?;
            info!(%addr, "Receiving updates via webhook");
            let listener = webhooks::axum(bot.clone(), webhooks::Options::new(addr, url))
                .await
                .context("Failed to set up webhook")?;
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await;
        }
        None => {
            info!("Receiving updates via long polling");
            dispatcher.dispatch().await;
        }
    }

    info!("Dispatcher stopped, draining queues");
    // Dropping the dispatcher drops the last UpdateQueue, letting the workers finish
    drop(dispatcher);
    for handle in update_workers {
        handle.await?;
    }
    for handle in outbound_workers {
        handle.await?;
    }
    sweeper.abort();

    info!("Shut down gracefully");
    Ok(())
}
