//! Journiv journaling backend.
//!
//! `/journivsetup <base_url> <email> <password>` logs in, stores the tokens
//! and picks a journal. Every diary entry is then uploaded to that journal,
//! with the voice note attached as media when there is one.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::adapters::journiv::{Journal, JournivClient, JournivError, NewEntry};
use crate::core::{
    CallbackContext, CallbackHandler, CommandContext, CommandHandler, ConfigSchema,
    DiaryArtifact, InlineButton, Plugin, PluginConfig, PluginContext, Registrar,
};

pub const PLUGIN_ID: &str = "journiv";
pub const SETUP_COMMAND: &str = "journivsetup";
pub const SELECT_PREFIX: &str = "journiv_select_";

/// Telegram rejects callback data longer than this
const MAX_CALLBACK_BYTES: usize = 64;

/// Stored per-user connection settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournivConfig {
    pub base_url: String,
    pub access_token: String,
    pub refresh_token: String,
    pub journal_id: String,
}

impl JournivConfig {
    /// Base URL, access token and journal are all present
    pub fn is_complete(&self) -> bool {
        !self.base_url.trim().is_empty()
            && !self.access_token.trim().is_empty()
            && !self.journal_id.trim().is_empty()
    }
}

impl ConfigSchema for JournivConfig {
    const VERSION: u32 = 2;

    /// v1 kept a single `token`; v2 splits access and refresh tokens
    fn migrate(from_version: u32, raw: Value) -> Result<Value, String> {
        match (from_version, raw) {
            (1, Value::Object(mut map)) => {
                if !map.contains_key("access_token") {
                    let token = map.remove("token").unwrap_or(Value::String(String::new()));
                    map.insert("access_token".to_string(), token);
                }
                map.entry("refresh_token")
                    .or_insert_with(|| Value::String(String::new()));
                map.remove("token");
                Ok(Value::Object(map))
            }
            (1, Value::Null) => Ok(Value::Object(Map::new())),
            (1, other) => Err(format!("expected an object, found {}", other)),
            (v, _) => Err(format!("unknown schema version {}", v)),
        }
    }
}

/// Callback data for a journal picker button, trimmed to the Telegram limit.
///
/// Only the title is ever shortened. When the id leaves no room for it the
/// data carries the id alone, which [`parse_select_data`] reads back as both
/// id and name.
pub fn select_callback_data(journal: &Journal) -> String {
    let mut data = format!("{}{}_", SELECT_PREFIX, journal.id);
    if data.len() >= MAX_CALLBACK_BYTES {
        data.pop();
        return data;
    }

    let mut cut = (MAX_CALLBACK_BYTES - data.len()).min(journal.title.len());
    while !journal.title.is_char_boundary(cut) {
        cut -= 1;
    }
    if cut == 0 {
        data.pop();
        return data;
    }
    data.push_str(&journal.title[..cut]);
    data
}

/// Split callback data into `(journal_id, journal_name)`
pub fn parse_select_data(data: &str) -> Option<(String, String)> {
    let rest = data.strip_prefix(SELECT_PREFIX)?;
    let (id, name) = match rest.split_once('_') {
        Some((id, name)) => (id, name),
        None => (rest, rest),
    };
    if id.is_empty() {
        return None;
    }
    Some((id.to_string(), name.to_string()))
}

/// Uploads entries to a Journiv server
pub struct JournivPlugin {
    config: PluginConfig,
    http: reqwest::Client,
}

impl JournivPlugin {
    pub fn new(ctx: &PluginContext) -> Self {
        Self {
            config: ctx.config_for(PLUGIN_ID),
            http: ctx.http().clone(),
        }
    }

    /// Stored config for `user_id`; unreadable blobs count as absent
    fn stored_config(&self, user_id: i64) -> Option<JournivConfig> {
        match self.config.load_versioned::<JournivConfig>(user_id) {
            Ok(config) => config,
            Err(e) => {
                warn!(user_id, error = %e, "Ignoring unreadable journiv config");
                None
            }
        }
    }

    fn client(&self, config: &JournivConfig) -> JournivClient {
        JournivClient::new(self.http.clone(), &config.base_url)
    }

    /// Exchange the refresh token and persist the new pair
    async fn refresh_tokens(
        &self,
        client: &JournivClient,
        user_id: i64,
        mut config: JournivConfig,
    ) -> Result<JournivConfig, JournivError> {
        let tokens = client.refresh(&config.refresh_token).await?;
        config.access_token = tokens.access_token;
        if let Some(refresh) = tokens.refresh_token {
            config.refresh_token = refresh;
        }

        match self.config.save_versioned(user_id, &config) {
            Ok(()) => info!(user_id, "Refreshed journiv access token"),
            Err(e) => warn!(user_id, error = %e, "Failed to persist refreshed journiv tokens"),
        }
        Ok(config)
    }

    /// Create the entry, retrying once with a refreshed token on 401
    async fn upload(
        &self,
        user_id: i64,
        config: JournivConfig,
        artifact: &DiaryArtifact,
    ) -> Result<UploadOutcome, JournivError> {
        let client = self.client(&config);
        let entry = NewEntry::new(&config.journal_id, &artifact.diary_entry, Local::now());

        let (config, created) = match client.create_entry(&config.access_token, &entry).await {
            Err(e) if e.is_unauthorized() && !config.refresh_token.is_empty() => {
                let config = self.refresh_tokens(&client, user_id, config).await?;
                let created = client.create_entry(&config.access_token, &entry).await?;
                (config, created)
            }
            other => (config, other?),
        };

        let media_error = match &artifact.voice_note_path {
            Some(voice) => client
                .upload_media(&config.access_token, voice, &created.id, Some("Voice note"))
                .await
                .err(),
            None => None,
        };

        Ok(UploadOutcome {
            title: entry.title,
            media_error,
        })
    }

    async fn setup(&self, ctx: CommandContext) -> Result<()> {
        let message = &ctx.message;
        let [base_url, email, password, ..] = ctx.args.as_slice() else {
            return message
                .reply_text("Usage: /journivsetup <base_url> <email> <password>")
                .await;
        };
        let user_id = message.user_id();

        let mut config = JournivConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..JournivConfig::default()
        };
        let client = self.client(&config);

        let tokens = match client.login(email, password).await {
            Ok(tokens) => tokens,
            Err(e) => return message.reply_text(&e.to_string()).await,
        };
        config.access_token = tokens.access_token;
        config.refresh_token = tokens.refresh_token.unwrap_or_default();
        self.config.save_versioned(user_id, &config)?;

        let journals = match client.journals(&config.access_token).await {
            Ok(journals) => journals,
            Err(e) => return message.reply_text(&e.to_string()).await,
        };

        match journals.as_slice() {
            [] => {
                message
                    .reply_text("Setup complete, but this account has no journals yet.")
                    .await
            }
            [only] => {
                config.journal_id = only.id.clone();
                self.config.save_versioned(user_id, &config)?;
                info!(user_id, journal = %only.id, "Journiv journal selected");
                message
                    .reply_text(&format!("Setup complete. Logging to: {}", only.title))
                    .await
            }
            many => {
                let keyboard = many
                    .iter()
                    .map(|j| vec![InlineButton::new(j.title.clone(), select_callback_data(j))])
                    .collect();
                message
                    .reply_with_buttons(
                        "Setup complete. Choose which journal entries should be uploaded to:",
                        keyboard,
                    )
                    .await
            }
        }
    }

    async fn select_journal(&self, ctx: CallbackContext) -> Result<()> {
        let Some((journal_id, journal_name)) = parse_select_data(&ctx.data) else {
            return ctx.message.edit_text("❌ Unknown journal selection.").await;
        };
        let user_id = ctx.message.user_id();

        let Some(mut config) = self.stored_config(user_id) else {
            return ctx
                .message
                .edit_text("❌ Journiv is not set up. Use /journivsetup first.")
                .await;
        };

        config.journal_id = journal_id;
        self.config.save_versioned(user_id, &config)?;
        info!(user_id, journal = %config.journal_id, "Journiv journal selected");

        ctx.message
            .edit_text(&format!("Journiv setup complete for journal {}!", journal_name))
            .await
    }
}

struct UploadOutcome {
    title: String,
    media_error: Option<JournivError>,
}

#[async_trait]
impl Plugin for JournivPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn description(&self) -> &str {
        "Upload entries and voice notes to a Journiv server"
    }

    fn load(self: Arc<Self>, registrar: &mut dyn Registrar) -> Result<()> {
        registrar.add_command(SETUP_COMMAND, Arc::new(SetupCommand(Arc::clone(&self))));
        registrar.add_callback(SELECT_PREFIX, Arc::new(SelectJournal(self)));
        Ok(())
    }

    async fn on_entry(&self, artifact: &DiaryArtifact) -> Result<()> {
        let user_id = artifact.source.user_id();

        let config = match self.stored_config(user_id) {
            Some(config) if config.is_complete() => config,
            _ => {
                debug!(user_id, "Journiv not configured for user, skipping");
                return Ok(());
            }
        };

        match self.upload(user_id, config, artifact).await {
            Ok(UploadOutcome {
                title,
                media_error: None,
            }) => {
                artifact
                    .source
                    .reply_text(&format!("✅ Entry saved to Journiv: {}", title))
                    .await
            }
            Ok(UploadOutcome {
                title,
                media_error: Some(e),
            }) => {
                warn!(user_id, error = %e, "Journiv media upload failed");
                artifact
                    .source
                    .reply_text(&format!(
                        "✅ Entry saved to Journiv: {}\n⚠️ The voice note could not be attached: {}",
                        title, e
                    ))
                    .await
            }
            Err(e) => {
                artifact
                    .source
                    .reply_text(&format!("❌ Journiv upload failed: {}", e))
                    .await?;
                Err(e.into())
            }
        }
    }
}

/// `/journivsetup` handler
struct SetupCommand(Arc<JournivPlugin>);

#[async_trait]
impl CommandHandler for SetupCommand {
    async fn handle(&self, ctx: CommandContext) -> Result<()> {
        self.0.setup(ctx).await
    }
}

/// `journiv_select_<id>_<name>` handler
struct SelectJournal(Arc<JournivPlugin>);

#[async_trait]
impl CallbackHandler for SelectJournal {
    async fn handle(&self, ctx: CallbackContext) -> Result<()> {
        self.0.select_journal(ctx).await
    }
}
