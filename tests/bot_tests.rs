//! # Bot Handler Tests
//!
//! Drives the message and callback handlers against the in-memory store
//! and inspects the outbound descriptors they queue.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::Instant;

use connect_bot::bot::{callback_handler, message_handler, BotContext};
use connect_bot::config::{GroupRoutes, HandlerPolicy, ModerationPolicy, STATE_TTL};
use connect_bot::db::Store;
use connect_bot::dialogue::DialogueState;
use connect_bot::dispatcher::{IncomingCallback, IncomingMessage};
use connect_bot::json_store::JsonStore;
use connect_bot::localization::{t_args_lang, t_lang};
use connect_bot::models::{Category, NewOrder, Profile};
use connect_bot::outbox::{Outbound, Outbox};
use connect_bot::state_table::ConversationStates;

const DESIGN_GROUP: i64 = -100;
const PROGRAMMING_GROUP: i64 = -200;
const CONTENT_GROUP: i64 = -300;

struct Harness {
    ctx: BotContext,
    store: Arc<JsonStore>,
    rx: mpsc::Receiver<Outbound>,
}

impl Harness {
    fn new() -> Self {
        Self::with_moderation(ModerationPolicy::default())
    }

    fn with_moderation(moderation: ModerationPolicy) -> Self {
        let store = Arc::new(JsonStore::in_memory());
        let states = Arc::new(ConversationStates::new(STATE_TTL));
        let (outbox, rx) = Outbox::channel(1024);
        let policy = HandlerPolicy {
            groups: GroupRoutes {
                design: DESIGN_GROUP,
                programming: PROGRAMMING_GROUP,
                content: CONTENT_GROUP,
            },
            moderation,
            ..HandlerPolicy::default()
        };
        let ctx = BotContext::new(store.clone(), states, outbox, policy);
        Self { ctx, store, rx }
    }

    fn drain(&mut self) -> Vec<Outbound> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }

    async fn send(&mut self, msg: IncomingMessage) -> Result<Vec<Outbound>> {
        message_handler(&self.ctx, msg).await?;
        Ok(self.drain())
    }

    async fn press(&mut self, q: IncomingCallback) -> Result<Vec<Outbound>> {
        callback_handler(&self.ctx, q).await?;
        Ok(self.drain())
    }

    fn state(&self, user_id: i64) -> DialogueState {
        self.ctx.states.get(user_id)
    }
}

fn text_message(user_id: i64, text: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id: user_id,
        sender_id: user_id,
        username: Some(format!("user{user_id}")),
        language_code: None,
        text: Some(text.to_string()),
        photos: Vec::new(),
    }
}

fn photo_message(user_id: i64, caption: Option<&str>, photos: &[&str]) -> IncomingMessage {
    IncomingMessage {
        text: caption.map(str::to_string),
        photos: photos.iter().map(|p| p.to_string()).collect(),
        ..text_message(user_id, "")
    }
}

fn button(user_id: i64, chat_id: i64, data: &str) -> IncomingCallback {
    IncomingCallback {
        callback_id: format!("cb-{user_id}-{data}"),
        sender_id: user_id,
        chat_id,
        language_code: None,
        data: data.to_string(),
    }
}

fn text(chat_id: i64, key: &str) -> Outbound {
    Outbound::Text {
        chat_id,
        text: t_lang(key, None),
    }
}

fn description(len: usize) -> String {
    "d".repeat(len)
}

/// Texts sent to `chat_id`, in order
fn texts_to(items: &[Outbound], chat_id: i64) -> Vec<&str> {
    items
        .iter()
        .filter(|item| item.chat_id() == Some(chat_id))
        .filter_map(Outbound::text)
        .collect()
}

async fn seed_order(store: &JsonStore, creator_id: i64) -> Result<i64> {
    Ok(store
        .create_order(NewOrder {
            creator_id,
            category: Category::Design,
            text: "Need a logo".to_string(),
            photo_file_id: None,
        })
        .await?)
}

#[tokio::test]
async fn test_start_sends_role_keyboard() -> Result<()> {
    let mut h = Harness::new();
    let items = h.send(text_message(1, "/start")).await?;

    assert_eq!(items.len(), 1);
    match &items[0] {
        Outbound::Keyboard {
            chat_id,
            text,
            keyboard,
        } => {
            assert_eq!(*chat_id, 1);
            assert_eq!(text, &t_lang("welcome-choose-role", None));
            let data: Vec<&str> = keyboard.callback_data().collect();
            assert_eq!(data, vec!["role:executor", "role:client"]);
        }
        other => panic!("Unexpected outbound item: {other:?}"),
    }
    assert_eq!(h.state(1), DialogueState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_idle_text_gets_start_hint() -> Result<()> {
    let mut h = Harness::new();
    let items = h.send(text_message(5, "hello")).await?;
    assert_eq!(items, vec![text(5, "start-hint")]);
    Ok(())
}

#[tokio::test]
async fn test_unknown_command() -> Result<()> {
    let mut h = Harness::new();
    let items = h.send(text_message(5, "/orders")).await?;
    assert_eq!(items, vec![text(5, "unknown-command")]);
    Ok(())
}

#[tokio::test]
async fn test_executor_profile_scenario() -> Result<()> {
    let mut h = Harness::new();

    let items = h.press(button(10, 10, "role:executor")).await?;
    assert_eq!(
        items[0],
        Outbound::AnswerCallback {
            callback_id: "cb-10-role:executor".to_string()
        }
    );
    assert_eq!(h.state(10), DialogueState::CreatingProfile);

    // Below the minimum bound: rejected, still in the flow
    let items = h.send(text_message(10, &description(20))).await?;
    let expected = t_args_lang(
        "profile-description-too-short",
        &[("min", "150"), ("max", "200"), ("length", "20")],
        None,
    );
    assert_eq!(texts_to(&items, 10), vec![expected.as_str()]);
    assert_eq!(h.state(10), DialogueState::CreatingProfile);
    assert!(h.store.get_profile(10).await.is_err());

    // Within bounds: persisted and back to idle
    let items = h.send(text_message(10, &description(160))).await?;
    assert_eq!(items, vec![text(10, "profile-saved")]);
    assert_eq!(h.state(10), DialogueState::Idle);

    let profile = h.store.get_profile(10).await?;
    assert_eq!(profile.description, description(160));
    assert_eq!(profile.username, "user10");
    Ok(())
}

#[tokio::test]
async fn test_profile_too_long_is_rejected() -> Result<()> {
    let mut h = Harness::new();
    h.press(button(11, 11, "role:executor")).await?;

    h.send(text_message(11, &description(201))).await?;
    assert_eq!(h.state(11), DialogueState::CreatingProfile);
    assert!(h.store.get_profile(11).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_profile_with_photo_renders_on_my_profile() -> Result<()> {
    let mut h = Harness::new();
    h.press(button(12, 12, "role:executor")).await?;

    let caption = description(150);
    h.send(photo_message(12, Some(&caption), &["small", "medium", "large"]))
        .await?;

    let items = h.send(text_message(12, "/my_profile")).await?;
    assert_eq!(items.len(), 2);
    match &items[0] {
        Outbound::Keyboard { text, keyboard, .. } => {
            assert_eq!(text, &format!("Profile @user12\n\n{caption}"));
            let data: Vec<&str> = keyboard.callback_data().collect();
            assert_eq!(data, vec!["profile:edit", "profile:delete"]);
        }
        other => panic!("Unexpected outbound item: {other:?}"),
    }
    assert_eq!(
        items[1],
        Outbound::Photo {
            chat_id: 12,
            photo_file_id: "large".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_profile_overwrite_keeps_latest_text() -> Result<()> {
    let mut h = Harness::new();
    let first = format!("first {}", description(150));
    let second = format!("second {}", description(150));

    h.press(button(13, 13, "role:executor")).await?;
    h.send(text_message(13, &first)).await?;
    h.press(button(13, 13, "profile:edit")).await?;
    assert_eq!(h.state(13), DialogueState::CreatingProfile);
    h.send(text_message(13, &second)).await?;

    let profile = h.store.get_profile(13).await?;
    assert_eq!(profile.description, second);
    assert_eq!(profile.photo_file_id, None);
    Ok(())
}

#[tokio::test]
async fn test_my_profile_not_found() -> Result<()> {
    let mut h = Harness::new();
    let items = h.send(text_message(14, "/my_profile")).await?;
    assert_eq!(items, vec![text(14, "profile-not-found")]);
    Ok(())
}

#[tokio::test]
async fn test_profile_delete_button() -> Result<()> {
    let mut h = Harness::new();
    h.store
        .upsert_profile(&Profile {
            user_id: 15,
            username: "dev".to_string(),
            description: description(150),
            photo_file_id: None,
        })
        .await?;

    let items = h.press(button(15, 15, "profile:delete")).await?;
    assert_eq!(texts_to(&items, 15), vec![t_lang("profile-deleted", None)]);
    assert!(h.store.get_profile(15).await.is_err());

    let items = h.press(button(15, 15, "profile:delete")).await?;
    assert_eq!(texts_to(&items, 15), vec![t_lang("profile-not-found", None)]);
    Ok(())
}

#[tokio::test]
async fn test_client_order_scenario() -> Result<()> {
    let mut h = Harness::new();

    let items = h.press(button(20, 20, "role:client")).await?;
    match &items[1] {
        Outbound::Keyboard { chat_id, keyboard, .. } => {
            assert_eq!(*chat_id, 20);
            assert!(keyboard.callback_data().any(|d| d == "cat:design"));
        }
        other => panic!("Unexpected outbound item: {other:?}"),
    }
    // Choosing a role alone does not start a flow
    assert_eq!(h.state(20), DialogueState::Idle);

    h.press(button(20, 20, "cat:programming")).await?;
    assert_eq!(
        h.state(20),
        DialogueState::CreatingOrder {
            category: Category::Programming
        }
    );

    let items = h
        .send(text_message(20, "  Need a Telegram bot, budget 500  "))
        .await?;
    assert_eq!(h.state(20), DialogueState::Idle);

    let order = h.store.get_order_by_creator(20).await?;
    assert_eq!(order.text, "Need a Telegram bot, budget 500");
    assert_eq!(order.category, Category::Programming);
    assert_eq!(order.complaints, 0);

    let post = items
        .iter()
        .find(|item| item.chat_id() == Some(PROGRAMMING_GROUP))
        .expect("order posted to the programming group");
    match post {
        Outbound::Keyboard { text, keyboard, .. } => {
            assert!(text.contains(&format!("id {}", order.id)));
            assert!(text.contains("Need a Telegram bot, budget 500"));
            let data: Vec<String> = keyboard.callback_data().map(String::from).collect();
            assert_eq!(
                data,
                vec![
                    format!("order:connect:{}", order.id),
                    format!("order:complain:{}", order.id)
                ]
            );
        }
        other => panic!("Unexpected outbound item: {other:?}"),
    }
    assert_eq!(texts_to(&items, 20), vec![t_lang("order-created", None)]);
    Ok(())
}

#[tokio::test]
async fn test_order_photo_is_posted_before_summary() -> Result<()> {
    let mut h = Harness::new();
    h.press(button(21, 21, "cat:content")).await?;

    let items = h
        .send(photo_message(21, Some("Shoot a product video"), &["p1", "p2"]))
        .await?;
    let group_items: Vec<&Outbound> = items
        .iter()
        .filter(|item| item.chat_id() == Some(CONTENT_GROUP))
        .collect();
    assert_eq!(group_items.len(), 2);
    assert_eq!(
        group_items[0],
        &Outbound::Photo {
            chat_id: CONTENT_GROUP,
            photo_file_id: "p2".to_string()
        }
    );
    assert!(matches!(group_items[1], Outbound::Keyboard { .. }));

    let order = h.store.get_order_by_creator(21).await?;
    assert_eq!(order.photo_file_id.as_deref(), Some("p2"));
    Ok(())
}

#[tokio::test]
async fn test_empty_order_text_reprompts() -> Result<()> {
    let mut h = Harness::new();
    h.press(button(22, 22, "cat:design")).await?;

    let items = h.send(photo_message(22, None, &["only-photo"])).await?;
    assert_eq!(items, vec![text(22, "order-text-empty")]);
    assert_eq!(
        h.state(22),
        DialogueState::CreatingOrder {
            category: Category::Design
        }
    );
    assert!(h.store.get_order_by_creator(22).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_second_order_conflicts() -> Result<()> {
    let mut h = Harness::new();

    h.press(button(23, 23, "cat:design")).await?;
    h.send(text_message(23, "First task")).await?;

    h.press(button(23, 23, "cat:design")).await?;
    let items = h.send(text_message(23, "Second task")).await?;

    assert_eq!(items, vec![text(23, "order-conflict")]);
    assert_eq!(h.state(23), DialogueState::Idle);

    let orders = h.store.list_orders_by_category(Category::Design).await?;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].text, "First task");
    Ok(())
}

#[tokio::test]
async fn test_delete_order_command() -> Result<()> {
    let mut h = Harness::new();

    let items = h.send(text_message(24, "/delete_order")).await?;
    assert_eq!(items, vec![text(24, "order-none")]);

    seed_order(&h.store, 24).await?;
    let items = h.send(text_message(24, "/delete_order")).await?;
    assert_eq!(items, vec![text(24, "order-deleted")]);
    assert!(h.store.get_order_by_creator(24).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_command_keeps_flow_state() -> Result<()> {
    let mut h = Harness::new();
    h.press(button(25, 25, "role:executor")).await?;
    h.send(text_message(25, "/start")).await?;
    assert_eq!(h.state(25), DialogueState::CreatingProfile);
    Ok(())
}

#[tokio::test]
async fn test_back_to_start_resends_roles() -> Result<()> {
    let mut h = Harness::new();
    let items = h.press(button(26, 26, "back:to_start")).await?;
    assert!(matches!(
        &items[1],
        Outbound::Keyboard { chat_id: 26, text, .. } if text == &t_lang("welcome-choose-role", None)
    ));
    Ok(())
}

#[tokio::test]
async fn test_connect_is_single_use() -> Result<()> {
    let mut h = Harness::new();
    let creator = 30;
    let executor = 31;
    h.store
        .upsert_profile(&Profile {
            user_id: executor,
            username: "designer".to_string(),
            description: description(150),
            photo_file_id: Some("portfolio".to_string()),
        })
        .await?;
    let order_id = seed_order(&h.store, creator).await?;
    let payload = format!("order:connect:{order_id}");

    let items = h.press(button(executor, DESIGN_GROUP, &payload)).await?;

    let notice = t_args_lang("connect-creator-notice", &[("connector", "31")], None);
    let to_creator: Vec<&Outbound> = items
        .iter()
        .filter(|item| item.chat_id() == Some(creator))
        .collect();
    assert_eq!(to_creator.len(), 3);
    assert_eq!(to_creator[0].text(), Some(notice.as_str()));
    assert_eq!(
        to_creator[1].text(),
        Some(format!("Profile @designer\n\n{}", description(150)).as_str())
    );
    assert_eq!(
        to_creator[2],
        &Outbound::Photo {
            chat_id: creator,
            photo_file_id: "portfolio".to_string()
        }
    );
    assert_eq!(texts_to(&items, executor), vec![t_lang("connect-success", None)]);
    assert!(h.store.get_order_by_id(order_id).await.is_err());

    // A second press on the consumed order
    let items = h.press(button(32, DESIGN_GROUP, &payload)).await?;
    assert_eq!(items.len(), 2);
    assert!(matches!(items[0], Outbound::AnswerCallback { .. }));
    assert_eq!(items[1], text(32, "order-not-found"));
    Ok(())
}

#[tokio::test]
async fn test_connect_without_profile_only_notifies() -> Result<()> {
    let mut h = Harness::new();
    let order_id = seed_order(&h.store, 33).await?;

    let items = h
        .press(button(34, DESIGN_GROUP, &format!("order:connect:{order_id}")))
        .await?;
    assert_eq!(texts_to(&items, 33).len(), 1);
    assert!(h.store.get_order_by_id(order_id).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_malformed_order_id_reports_not_found() -> Result<()> {
    let mut h = Harness::new();
    let items = h.press(button(35, DESIGN_GROUP, "order:connect:oops")).await?;
    assert_eq!(items[1], text(35, "order-not-found"));
    Ok(())
}

#[tokio::test]
async fn test_complain_asks_for_confirmation() -> Result<()> {
    let mut h = Harness::new();
    let order_id = seed_order(&h.store, 40).await?;

    let items = h
        .press(button(41, DESIGN_GROUP, &format!("order:complain:{order_id}")))
        .await?;
    match &items[1] {
        Outbound::Keyboard {
            chat_id,
            text,
            keyboard,
        } => {
            assert_eq!(*chat_id, DESIGN_GROUP);
            assert!(text.contains(&order_id.to_string()));
            let data: Vec<String> = keyboard.callback_data().map(String::from).collect();
            assert_eq!(
                data,
                vec![format!("complain:confirm:{order_id}"), "complain:cancel".to_string()]
            );
        }
        other => panic!("Unexpected outbound item: {other:?}"),
    }
    assert_eq!(h.store.get_order_by_id(order_id).await?.complaints, 0);

    let items = h.press(button(41, DESIGN_GROUP, "complain:cancel")).await?;
    assert_eq!(items[1], text(41, "complain-cancelled"));
    assert_eq!(h.store.get_order_by_id(order_id).await?.complaints, 0);
    Ok(())
}

#[tokio::test]
async fn test_complaint_thresholds() -> Result<()> {
    let mut h = Harness::new();
    let creator = 50;
    let order_id = seed_order(&h.store, creator).await?;
    let payload = format!("complain:confirm:{order_id}");

    for n in 1..=10u32 {
        let reporter = 100 + i64::from(n);
        let items = h.press(button(reporter, reporter, &payload)).await?;

        let accepted = t_args_lang("complain-accepted", &[("count", &n.to_string())], None);
        assert_eq!(texts_to(&items, reporter), vec![accepted.as_str()]);

        let to_creator = texts_to(&items, creator);
        match n {
            1..=6 => {
                assert!(to_creator.is_empty(), "no notice expected at {n}");
                assert_eq!(h.store.get_order_by_id(order_id).await?.complaints, n);
            }
            7..=9 => {
                let warning = t_args_lang(
                    "order-complaint-warning",
                    &[("count", &n.to_string()), ("limit", "10")],
                    None,
                );
                assert_eq!(to_creator, vec![warning.as_str()]);
                assert!(h.store.get_order_by_id(order_id).await.is_ok());
            }
            _ => {
                let removed =
                    t_args_lang("order-removed-complaints", &[("count", "10")], None);
                assert_eq!(to_creator, vec![removed.as_str()]);
                assert!(h.store.get_order_by_id(order_id).await.is_err());
            }
        }
    }

    // Further complaints find nothing
    let items = h.press(button(200, 200, &payload)).await?;
    assert_eq!(items[1], text(200, "order-not-found"));
    Ok(())
}

#[tokio::test]
async fn test_complaint_warning_can_be_disabled() -> Result<()> {
    let mut h = Harness::with_moderation(ModerationPolicy {
        delete_threshold: 10,
        warn_threshold: None,
    });
    let creator = 60;
    let order_id = seed_order(&h.store, creator).await?;
    let payload = format!("complain:confirm:{order_id}");

    for n in 1..=9i64 {
        let items = h.press(button(300 + n, 300 + n, &payload)).await?;
        assert!(texts_to(&items, creator).is_empty());
    }
    let items = h.press(button(310, 310, &payload)).await?;
    assert_eq!(texts_to(&items, creator).len(), 1);
    assert!(h.store.get_order_by_id(order_id).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_unknown_callback_is_only_acknowledged() -> Result<()> {
    let mut h = Harness::new();
    let items = h.press(button(70, 70, "group:design")).await?;
    assert_eq!(
        items,
        vec![Outbound::AnswerCallback {
            callback_id: "cb-70-group:design".to_string()
        }]
    );
    Ok(())
}

#[tokio::test]
async fn test_expired_state_is_treated_as_idle() -> Result<()> {
    let mut h = Harness::new();
    h.press(button(80, 80, "role:executor")).await?;
    let set_at = Instant::now();

    h.ctx.states.purge_stale(set_at + std::time::Duration::from_secs(10 * 60));
    assert_eq!(h.state(80), DialogueState::CreatingProfile);

    h.ctx.states.purge_stale(set_at + std::time::Duration::from_secs(16 * 60));
    assert_eq!(h.state(80), DialogueState::Idle);

    let items = h.send(text_message(80, &description(160))).await?;
    assert_eq!(items, vec![text(80, "start-hint")]);
    assert!(h.store.get_profile(80).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_russian_language_code_is_honoured() -> Result<()> {
    let mut h = Harness::new();
    let mut msg = text_message(90, "hello");
    msg.language_code = Some("ru-RU".to_string());

    let items = h.send(msg).await?;
    assert_eq!(texts_to(&items, 90), vec!["Нажмите /start чтобы начать."]);
    Ok(())
}

#[tokio::test]
async fn test_unrouted_category_is_not_reported_as_posted() -> Result<()> {
    let mut h = Harness::new();
    h.ctx = BotContext::new(
        h.store.clone(),
        Arc::clone(&h.ctx.states),
        h.ctx.outbox.clone(),
        HandlerPolicy::default(),
    );

    h.press(button(27, 27, "cat:content")).await?;
    let items = h.send(text_message(27, "Edit my podcast")).await?;

    assert_eq!(items, vec![text(27, "order-created-unposted")]);
    assert!(h.store.get_order_by_creator(27).await.is_ok());
    assert_eq!(h.state(27), DialogueState::Idle);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rejected_input_restarts_inactivity_timer() -> Result<()> {
    let mut h = Harness::new();
    let minutes = |n: u64| std::time::Duration::from_secs(n * 60);

    h.press(button(81, 81, "role:executor")).await?;
    h.press(button(82, 82, "cat:design")).await?;

    tokio::time::advance(minutes(10)).await;
    h.send(text_message(81, "too short")).await?;
    h.send(photo_message(82, None, &["no-caption"])).await?;

    // 20 minutes after the flows started, 10 after the last attempt
    tokio::time::advance(minutes(10)).await;
    assert_eq!(h.ctx.states.purge_stale(Instant::now()), 0);
    assert_eq!(h.state(81), DialogueState::CreatingProfile);
    assert_eq!(
        h.state(82),
        DialogueState::CreatingOrder {
            category: Category::Design
        }
    );

    tokio::time::advance(minutes(6)).await;
    assert_eq!(h.ctx.states.purge_stale(Instant::now()), 2);
    assert_eq!(h.state(81), DialogueState::Idle);
    Ok(())
}
