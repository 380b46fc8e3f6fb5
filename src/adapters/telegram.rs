//! Telegram Bot API adapter.
//!
//! Thin wrapper over the HTTP Bot API: long-polling for updates, text
//! replies with inline keyboards, document uploads, and voice downloads.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::InlineKeyboard;

const API_BASE: &str = "https://api.telegram.org";

/// Long-poll window passed to `getUpdates`
pub const POLL_TIMEOUT_SECS: u64 = 30;

/// Telegram Bot API client
pub struct TelegramClient {
    /// Bot token
    bot_token: String,
    /// API root, overridable for tests
    api_base: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Response envelope from the Telegram API
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Message result from sendMessage/sendDocument
#[derive(Debug, Deserialize)]
struct MessageResult {
    message_id: i64,
}

// ============================================================================
// Inbound types (subset of the Bot API)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<Voice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Voice {
    pub file_id: String,
    #[serde(default)]
    pub duration: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Result of `getFile`
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct ButtonPayload<'a> {
    text: &'a str,
    callback_data: &'a str,
}

/// Convert rows of buttons into a `reply_markup` value
fn keyboard_markup(keyboard: &InlineKeyboard) -> serde_json::Value {
    let rows: Vec<Vec<ButtonPayload<'_>>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| ButtonPayload {
                    text: &b.text,
                    callback_data: &b.callback_data,
                })
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

impl TelegramClient {
    /// Create a new Telegram client
    pub fn new(bot_token: String) -> Self {
        Self::with_api_base(bot_token, API_BASE)
    }

    pub fn with_api_base(bot_token: String, api_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 30))
            .build()
            .unwrap_or_default();

        Self {
            bot_token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Build a file download URL for a `file_path` returned by `getFile`
    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path)
    }

    /// Unwrap the Bot API envelope
    async fn parse<T: DeserializeOwned>(response: reqwest::Response, method: &str) -> Result<T> {
        let result: TelegramResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram {} response", method))?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error ({}): {}",
                method,
                result.description.unwrap_or_default()
            );
        }

        result
            .result
            .with_context(|| format!("Telegram {} returned no result", method))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to call Telegram {}", method))?;

        Self::parse(response, method).await
    }

    /// Fetch pending updates after `offset`, waiting up to the poll window
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    /// Send a text message, optionally with an inline keyboard
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<i64> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = keyboard_markup(keyboard);
        }

        let result: MessageResult = self.call("sendMessage", body).await?;
        Ok(result.message_id)
    }

    /// Replace the text (and keyboard) of a message the bot sent
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = keyboard_markup(keyboard);
        }

        let _: serde_json::Value = self.call("editMessageText", body).await?;
        Ok(())
    }

    /// Acknowledge a button press so the client stops its spinner
    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({ "callback_query_id": callback_query_id }),
            )
            .await?;
        Ok(())
    }

    /// Upload a local file as a document
    pub async fn send_document(&self, chat_id: i64, path: &Path, caption: &str) -> Result<i64> {
        let file_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let file_bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read document {}", path.display()))?;

        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str("text/plain")?;

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", file_part);

        let response = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .context("Failed to send Telegram document")?;

        let result: MessageResult = Self::parse(response, "sendDocument").await?;
        Ok(result.message_id)
    }

    /// Resolve a `file_id` to a downloadable path
    pub async fn get_file(&self, file_id: &str) -> Result<RemoteFile> {
        self.call("getFile", json!({ "file_id": file_id })).await
    }

    /// Download a file referenced by `file_id` to `dest`
    pub async fn download_file(&self, file_id: &str, dest: &Path) -> Result<()> {
        let remote = self.get_file(file_id).await?;
        let file_path = remote
            .file_path
            .with_context(|| format!("Telegram file {} has no download path", remote.file_id))?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .context("Failed to download Telegram file")?
            .error_for_status()
            .context("Telegram file download rejected")?;

        let bytes = response
            .bytes()
            .await
            .context("Failed to read Telegram file body")?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;

        Ok(())
    }
}
