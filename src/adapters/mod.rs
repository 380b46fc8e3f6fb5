//! Adapter interfaces for external systems.
//!
//! The diary pipeline talks to speech-to-text and the language model only
//! through the traits below, so tests can swap in canned implementations.

pub mod journiv;
pub mod openai;
pub mod telegram;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

pub use journiv::{JournivClient, JournivError};
pub use openai::OpenAiWriter;
pub use telegram::TelegramClient;

pub use crate::ingest::TranscriptResult;

/// Speech-to-text backend
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptResult>;
}

/// Rewrites a raw transcription into a diary entry
#[async_trait]
pub trait DiaryWriter: Send + Sync {
    fn name(&self) -> &str;

    /// `style` is the user's style sample or the default instruction
    async fn write_entry(&self, transcription: &str, style: &str) -> Result<String>;
}

/// System prompt sent with every rewrite request
pub fn system_prompt(style: &str) -> String {
    format!(
        "You are a reflective diary-writing assistant. Instructions from the user about how \
         to write a diary entry in their style is:\n\n{}\n\nConvert the following \
         transcription into a diary entry that matches the tone and language and rules set \
         out by the user.",
        style
    )
}
