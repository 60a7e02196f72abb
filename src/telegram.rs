//! teloxide adapter: converts Telegram updates into inbound events and
//! implements [`Transport`] on top of [`teloxide::Bot`].

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, CallbackQueryId, FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, User,
};

use crate::dispatcher::{IncomingCallback, IncomingMessage};
use crate::transport::{Keyboard, Transport};

fn user_id(user: &User) -> i64 {
    // Telegram user ids fit in 52 bits
    user.id.0 as i64
}

/// Convert a Telegram message; messages without a sender are rejected
pub fn incoming_message(msg: &Message) -> Option<IncomingMessage> {
    let from = msg.from.as_ref()?;
    let text = msg.text().or_else(|| msg.caption()).map(str::to_string);
    let photos = msg
        .photo()
        .map(|sizes| sizes.iter().map(|size| size.file.id.0.clone()).collect())
        .unwrap_or_default();

    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        sender_id: user_id(from),
        username: from.username.clone(),
        language_code: from.language_code.clone(),
        text,
        photos,
    })
}

/// Convert a button press; callbacks without data are rejected
pub fn incoming_callback(q: &CallbackQuery) -> Option<IncomingCallback> {
    let data = q.data.clone()?;
    let sender_id = user_id(&q.from);
    let chat_id = q
        .message
        .as_ref()
        .map(|msg| msg.chat().id.0)
        .unwrap_or(sender_id);

    Some(IncomingCallback {
        callback_id: q.id.0.clone(),
        sender_id,
        chat_id,
        language_code: q.from.language_code.clone(),
        data,
    })
}

pub fn to_inline_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.data.clone()))
            .collect::<Vec<_>>()
    }))
}

#[async_trait]
impl Transport for Bot {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, photo_file_id: &str) -> Result<()> {
        Requester::send_photo(
            self,
            ChatId(chat_id),
            InputFile::file_id(FileId(photo_file_id.to_string())),
        )
        .await?;
        Ok(())
    }

    async fn send_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<()> {
        self.send_message(ChatId(chat_id), text)
            .reply_markup(to_inline_markup(keyboard))
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.answer_callback_query(CallbackQueryId(callback_id.to_string()))
            .await?;
        Ok(())
    }
}
