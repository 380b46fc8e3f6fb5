//! Plugin contract and the host interfaces plugins talk to.
//!
//! A plugin is invoked once per finished diary entry. It may also register
//! extra bot commands and inline-button callbacks while it is being loaded.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

// ============================================================================
// Host-side handles
// ============================================================================

/// One inline keyboard button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Rows of inline buttons
pub type InlineKeyboard = Vec<Vec<InlineButton>>;

/// The chat message a diary entry (or command) originated from.
///
/// Lets plugins answer the user without knowing the transport.
#[async_trait]
pub trait SourceMessage: Send + Sync {
    /// Chat the message belongs to
    fn chat_id(&self) -> i64;

    /// User who triggered the message
    fn user_id(&self) -> i64;

    async fn reply_text(&self, text: &str) -> Result<()>;

    async fn reply_with_buttons(&self, text: &str, keyboard: InlineKeyboard) -> Result<()>;

    async fn reply_document(&self, path: &Path, caption: &str) -> Result<()>;

    /// Replace the text of this message (used for button callbacks)
    async fn edit_text(&self, text: &str) -> Result<()>;

    /// Replace text and keyboard. Transports that cannot edit send a new message.
    async fn edit_with_buttons(&self, text: &str, keyboard: InlineKeyboard) -> Result<()> {
        self.reply_with_buttons(text, keyboard).await
    }
}

/// A `/command` invocation
pub struct CommandContext {
    pub message: Arc<dyn SourceMessage>,
    /// Whitespace-separated arguments after the command name
    pub args: Vec<String>,
}

/// An inline-button press
pub struct CallbackContext {
    /// The message carrying the keyboard; `user_id()` is the user who pressed
    pub message: Arc<dyn SourceMessage>,
    pub data: String,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: CommandContext) -> Result<()>;
}

#[async_trait]
pub trait CallbackHandler: Send + Sync {
    async fn handle(&self, ctx: CallbackContext) -> Result<()>;
}

/// Registration surface handed to [`Plugin::load`]
pub trait Registrar {
    /// Route `/name` to `handler`
    fn add_command(&mut self, name: &str, handler: Arc<dyn CommandHandler>);

    /// Route callback data starting with `prefix` to `handler`
    fn add_callback(&mut self, prefix: &str, handler: Arc<dyn CallbackHandler>);
}

// ============================================================================
// Diary artifact
// ============================================================================

/// Everything produced for a single voice note
#[derive(Clone)]
pub struct DiaryArtifact {
    pub source: Arc<dyn SourceMessage>,
    pub transcription_path: PathBuf,
    /// Absent when a stored transcription is reprocessed
    pub voice_note_path: Option<PathBuf>,
    pub diary_entry: String,
}

impl fmt::Debug for DiaryArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiaryArtifact")
            .field("chat_id", &self.source.chat_id())
            .field("transcription_path", &self.transcription_path)
            .field("voice_note_path", &self.voice_note_path)
            .field("diary_entry_len", &self.diary_entry.len())
            .finish()
    }
}

// ============================================================================
// Plugin contract
// ============================================================================

/// An optional extension run after every diary entry
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable identifier, matched against `ENABLED_PLUGINS`
    fn id(&self) -> &str;

    /// One-line description for `voxdiary plugins`
    fn description(&self) -> &str {
        ""
    }

    /// Called once at startup, only for enabled plugins
    fn load(self: Arc<Self>, registrar: &mut dyn Registrar) -> Result<()> {
        let _ = registrar;
        Ok(())
    }

    /// Handle a finished diary entry. Errors are logged by the dispatcher.
    async fn on_entry(&self, artifact: &DiaryArtifact) -> Result<()>;
}
