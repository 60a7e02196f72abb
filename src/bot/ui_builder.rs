//! UI Builder module for creating keyboards and formatting messages

use crate::localization::{t_args_lang, t_lang};
use crate::models::{Category, Profile};
use crate::transport::{Button, Keyboard};

use super::callback_handler::CallbackAction;

fn button(label_key: &str, action: CallbackAction, language_code: Option<&str>) -> Button {
    Button::new(t_lang(label_key, language_code), action.to_data())
}

/// Executor / client choice shown on /start
pub fn create_role_keyboard(language_code: Option<&str>) -> Keyboard {
    Keyboard::new(vec![vec![
        button("role-executor-button", CallbackAction::RoleExecutor, language_code),
        button("role-client-button", CallbackAction::RoleClient, language_code),
    ]])
}

/// One category per row, then a back button
pub fn create_categories_keyboard(language_code: Option<&str>) -> Keyboard {
    let mut rows: Vec<Vec<Button>> = Category::ALL
        .iter()
        .map(|category| {
            vec![button(
                &category_label_key(*category),
                CallbackAction::Category(*category),
                language_code,
            )]
        })
        .collect();
    rows.push(vec![button(
        "back-button",
        CallbackAction::BackToStart,
        language_code,
    )]);
    Keyboard::new(rows)
}

/// Edit / delete actions under a rendered profile
pub fn create_profile_keyboard(language_code: Option<&str>) -> Keyboard {
    Keyboard::new(vec![
        vec![button("profile-edit-button", CallbackAction::ProfileEdit, language_code)],
        vec![button(
            "profile-delete-button",
            CallbackAction::ProfileDelete,
            language_code,
        )],
    ])
}

/// Connect / complain actions attached to an order posted in a group
pub fn create_order_actions_keyboard(order_id: i64, language_code: Option<&str>) -> Keyboard {
    Keyboard::new(vec![vec![
        button("connect-button", CallbackAction::Connect(order_id), language_code),
        button("complain-button", CallbackAction::Complain(order_id), language_code),
    ]])
}

pub fn create_complaint_confirm_keyboard(order_id: i64, language_code: Option<&str>) -> Keyboard {
    Keyboard::new(vec![vec![
        button(
            "complain-yes-button",
            CallbackAction::ComplainConfirm(order_id),
            language_code,
        ),
        button(
            "complain-cancel-button",
            CallbackAction::ComplainCancel,
            language_code,
        ),
    ]])
}

pub fn category_label_key(category: Category) -> String {
    format!("category-{}", category.as_str())
}

/// Text part of a rendered profile; the photo is sent separately
pub fn format_profile(profile: &Profile, language_code: Option<&str>) -> String {
    let username = if profile.username.is_empty() {
        profile.user_id.to_string()
    } else {
        profile.username.clone()
    };
    format!(
        "{}\n\n{}",
        t_args_lang("profile-header", &[("username", &username)], language_code),
        profile.description
    )
}

/// Summary posted to the category group
pub fn format_order_post(
    order_id: i64,
    category: Category,
    text: &str,
    creator_id: i64,
    language_code: Option<&str>,
) -> String {
    t_args_lang(
        "order-post",
        &[
            ("id", &order_id.to_string()),
            ("category", &t_lang(&category_label_key(category), language_code)),
            ("text", text),
            ("creator", &creator_id.to_string()),
        ],
        language_code,
    )
}
