//! [`SourceMessage`] backed by the Telegram client.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::adapters::TelegramClient;
use crate::core::{InlineKeyboard, SourceMessage};

/// A chat message the bot can answer
pub struct TelegramMessage {
    client: Arc<TelegramClient>,
    chat_id: i64,
    user_id: i64,
    /// Set for messages the bot itself sent (button callbacks), enables edits
    message_id: Option<i64>,
}

impl TelegramMessage {
    pub fn new(client: Arc<TelegramClient>, chat_id: i64, user_id: i64) -> Self {
        Self {
            client,
            chat_id,
            user_id,
            message_id: None,
        }
    }

    pub fn editable(mut self, message_id: i64) -> Self {
        self.message_id = Some(message_id);
        self
    }
}

#[async_trait]
impl SourceMessage for TelegramMessage {
    fn chat_id(&self) -> i64 {
        self.chat_id
    }

    fn user_id(&self) -> i64 {
        self.user_id
    }

    async fn reply_text(&self, text: &str) -> Result<()> {
        self.client.send_message(self.chat_id, text, None).await?;
        Ok(())
    }

    async fn reply_with_buttons(&self, text: &str, keyboard: InlineKeyboard) -> Result<()> {
        self.client
            .send_message(self.chat_id, text, Some(&keyboard))
            .await?;
        Ok(())
    }

    async fn reply_document(&self, path: &Path, caption: &str) -> Result<()> {
        self.client.send_document(self.chat_id, path, caption).await?;
        Ok(())
    }

    async fn edit_text(&self, text: &str) -> Result<()> {
        match self.message_id {
            Some(message_id) => {
                self.client
                    .edit_message_text(self.chat_id, message_id, text, None)
                    .await
            }
            None => self.reply_text(text).await,
        }
    }

    async fn edit_with_buttons(&self, text: &str, keyboard: InlineKeyboard) -> Result<()> {
        match self.message_id {
            Some(message_id) => {
                self.client
                    .edit_message_text(self.chat_id, message_id, text, Some(&keyboard))
                    .await
            }
            None => self.reply_with_buttons(text, keyboard).await,
        }
    }
}
