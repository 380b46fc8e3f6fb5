//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use voxdiary::core::{
    CallbackHandler, CommandHandler, DiaryArtifact, InlineKeyboard, PluginConfigStore,
    PluginContext, Registrar, SourceMessage,
};

/// Something the bot sent back to the chat
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    Buttons(String, InlineKeyboard),
    Document(PathBuf, String),
    Edit(String),
}

/// `SourceMessage` that records every reply instead of talking to Telegram
pub struct RecordingMessage {
    user_id: i64,
    sent: Mutex<Vec<Sent>>,
}

impl RecordingMessage {
    pub fn new(user_id: i64) -> Arc<Self> {
        Arc::new(Self {
            user_id,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Plain text replies and edits, in order
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) | Sent::Edit(t) | Sent::Buttons(t, _) => Some(t),
                Sent::Document(..) => None,
            })
            .collect()
    }

    fn push(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }
}

#[async_trait]
impl SourceMessage for RecordingMessage {
    fn chat_id(&self) -> i64 {
        self.user_id
    }

    fn user_id(&self) -> i64 {
        self.user_id
    }

    async fn reply_text(&self, text: &str) -> Result<()> {
        self.push(Sent::Text(text.to_string()));
        Ok(())
    }

    async fn reply_with_buttons(&self, text: &str, keyboard: InlineKeyboard) -> Result<()> {
        self.push(Sent::Buttons(text.to_string(), keyboard));
        Ok(())
    }

    async fn reply_document(&self, path: &Path, caption: &str) -> Result<()> {
        self.push(Sent::Document(path.to_path_buf(), caption.to_string()));
        Ok(())
    }

    async fn edit_text(&self, text: &str) -> Result<()> {
        self.push(Sent::Edit(text.to_string()));
        Ok(())
    }
}

/// Registrar that keeps handlers so tests can invoke them directly
#[derive(Default)]
pub struct RecordingRegistrar {
    pub commands: HashMap<String, Arc<dyn CommandHandler>>,
    pub callbacks: HashMap<String, Arc<dyn CallbackHandler>>,
}

impl Registrar for RecordingRegistrar {
    fn add_command(&mut self, name: &str, handler: Arc<dyn CommandHandler>) {
        self.commands.insert(name.to_string(), handler);
    }

    fn add_callback(&mut self, prefix: &str, handler: Arc<dyn CallbackHandler>) {
        self.callbacks.insert(prefix.to_string(), handler);
    }
}

pub fn plugin_store(temp: &TempDir) -> Arc<PluginConfigStore> {
    Arc::new(PluginConfigStore::new(temp.path().join("plugin_config.json")))
}

pub fn plugin_context(temp: &TempDir) -> PluginContext {
    PluginContext::new(plugin_store(temp))
}

/// Artifact with a real transcription file under `temp`
pub fn artifact(temp: &TempDir, message: Arc<RecordingMessage>, entry: &str) -> DiaryArtifact {
    let transcription_path = temp.path().join("transcription.txt");
    std::fs::write(&transcription_path, entry).unwrap();

    DiaryArtifact {
        source: message,
        transcription_path,
        voice_note_path: None,
        diary_entry: entry.to_string(),
    }
}
