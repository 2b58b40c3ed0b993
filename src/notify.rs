//! Notification sink: the delivery boundary for the dispatch scheduler.
//!
//! The trait keeps dispatch logic testable without a network; the Telegram
//! implementation maps Bot API errors into the two outcomes the scheduler
//! cares about: "nothing changed" (success) and "that message is gone"
//! (fall through to a fresh send).

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId, ParseMode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Edit matched the existing content; treated as success upstream
    #[error("message is not modified")]
    NotModified,
    /// The stored message id no longer resolves; sender should post fresh
    #[error("message to edit not found")]
    MessageMissing,
    #[error("delivery failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait NotifySink: Send + Sync {
    /// Send a new message; returns the created message id.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, NotifyError>;

    /// Edit an existing message in place.
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), NotifyError>;
}

/// Telegram delivery via the Bot API.
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    pub fn new(token: &str) -> Result<Self, String> {
        if token.is_empty() {
            return Err("Bot token is empty".to_string());
        }
        Ok(Self {
            bot: Bot::new(token),
        })
    }

    fn map_error(error: teloxide::RequestError) -> NotifyError {
        use teloxide::{ApiError, RequestError};
        match &error {
            RequestError::Api(ApiError::MessageNotModified) => NotifyError::NotModified,
            RequestError::Api(ApiError::MessageToEditNotFound)
            | RequestError::Api(ApiError::MessageIdInvalid) => NotifyError::MessageMissing,
            _ => NotifyError::Other(error.to_string()),
        }
    }
}

#[async_trait]
impl NotifySink for TelegramSink {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, NotifyError> {
        let message = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(true)
            .await
            .map_err(Self::map_error)?;
        Ok(message.id.0 as i64)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), NotifyError> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id as i32), text)
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(true)
            .await
            .map_err(Self::map_error)?;
        Ok(())
    }
}
