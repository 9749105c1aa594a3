//! Telegram transport
//!
//! Long polling in, Bot API calls out. Inbound messages and button presses
//! become [`InboundUpdate`]s for the dialogue engine.

use crate::runtime::{InboundUpdate, Keyboard, ProductionEngine, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId,
};

/// Bot API implementation of [`Transport`]
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn chat_id(session_id: &str) -> Result<ChatId, String> {
    session_id
        .parse::<i64>()
        .map(ChatId)
        .map_err(|e| format!("invalid chat_id {session_id:?}: {e}"))
}

fn markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| {
                InlineKeyboardButton::callback(button.label.clone(), button.payload.clone())
            })
            .collect::<Vec<_>>()
    }))
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(
        &self,
        session_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        let chat_id = chat_id(session_id)?;
        let request = self.bot.send_message(chat_id, text);
        let result = match keyboard {
            Some(keyboard) => request.reply_markup(markup(keyboard)).await,
            None => request.await,
        };
        result
            .map(|_| ())
            .map_err(|e| format!("failed to send message: {e}"))
    }

    async fn send_photo(
        &self,
        session_id: &str,
        photo_url: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        let chat_id = chat_id(session_id)?;
        let url = reqwest::Url::parse(photo_url).map_err(|e| format!("invalid photo url: {e}"))?;
        let request = self
            .bot
            .send_photo(chat_id, InputFile::url(url))
            .caption(caption);
        let result = match keyboard {
            Some(keyboard) => request.reply_markup(markup(keyboard)).await,
            None => request.await,
        };
        result
            .map(|_| ())
            .map_err(|e| format!("failed to send photo: {e}"))
    }

    async fn edit_text(
        &self,
        session_id: &str,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        let chat_id = chat_id(session_id)?;
        let request = self
            .bot
            .edit_message_text(chat_id, MessageId(message_id), text);
        let result = match keyboard {
            Some(keyboard) => request.reply_markup(markup(keyboard)).await,
            None => request.await,
        };
        match result {
            Ok(_) => Ok(()),
            // Pressing the same button twice
            Err(e) if e.to_string().contains("message is not modified") => Ok(()),
            Err(e) => Err(format!("failed to edit message: {e}")),
        }
    }

    async fn delete_message(&self, session_id: &str, message_id: i32) -> Result<(), String> {
        let chat_id = chat_id(session_id)?;
        self.bot
            .delete_message(chat_id, MessageId(message_id))
            .await
            .map(|_| ())
            .map_err(|e| format!("failed to delete message: {e}"))
    }

    async fn answer_callback(&self, callback_id: &str, notice: Option<&str>) -> Result<(), String> {
        let request = self
            .bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()));
        let result = match notice {
            Some(text) => request.text(text).await,
            None => request.await,
        };
        result
            .map(|_| ())
            .map_err(|e| format!("failed to answer callback: {e}"))
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Text message or command; other message types are ignored
pub fn message_update(msg: &Message) -> Option<InboundUpdate> {
    let text = msg.text()?;
    let sender_name = msg.from.as_ref().map(|user| user.first_name.clone());
    Some(InboundUpdate::message(
        msg.chat.id.0.to_string(),
        msg.id.0,
        text,
        sender_name,
    ))
}

/// Button press; presses without data or without a chat are ignored
pub fn callback_update(query: &CallbackQuery) -> Option<InboundUpdate> {
    let data = query.data.as_deref()?;
    let message = query.message.as_ref()?;
    Some(InboundUpdate::button(
        message.chat().id.0.to_string(),
        Some(message.id().0),
        query.id.0.clone(),
        data,
    ))
}

async fn on_message(msg: Message, engine: Arc<ProductionEngine>) -> ResponseResult<()> {
    match message_update(&msg) {
        // Failures are logged by the engine and never stop polling
        Some(update) => {
            let _ = engine.handle_update(update).await;
        }
        None => tracing::debug!(chat_id = msg.chat.id.0, "Ignoring non-text message"),
    }
    respond(())
}

async fn on_callback(
    bot: Bot,
    query: CallbackQuery,
    engine: Arc<ProductionEngine>,
) -> ResponseResult<()> {
    match callback_update(&query) {
        Some(update) => {
            let _ = engine.handle_update(update).await;
        }
        None => {
            tracing::debug!(callback_id = %query.id.0, "Ignoring callback without data");
            bot.answer_callback_query(query.id).await?;
        }
    }
    respond(())
}

/// Poll Telegram until interrupted
pub async fn run_polling(bot: Bot, engine: Arc<ProductionEngine>) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    tracing::info!("Starting Telegram long polling");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    tracing::info!("Telegram polling stopped");
}
