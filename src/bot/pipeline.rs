//! Voice note → transcription → diary entry → plugins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{info, instrument, warn};

use super::styles::StyleStore;
use crate::adapters::{DiaryWriter, Transcriber};
use crate::config::{paths, ArtifactPaths};
use crate::core::{DiaryArtifact, DispatchReport, PluginHost, SourceMessage, UserConfigStore};

pub const TRANSCRIPTION_CAPTION: &str = "📝 Here's your transcription";

/// Produces diary artifacts and hands them to the plugin host
pub struct DiaryPipeline {
    paths: ArtifactPaths,
    transcriber: Arc<dyn Transcriber>,
    /// `None` when no language model is configured
    writer: Option<Arc<dyn DiaryWriter>>,
    styles: StyleStore,
    users: Arc<UserConfigStore>,
    host: Arc<PluginHost>,
}

impl DiaryPipeline {
    pub fn new(
        paths: ArtifactPaths,
        transcriber: Arc<dyn Transcriber>,
        writer: Option<Arc<dyn DiaryWriter>>,
        users: Arc<UserConfigStore>,
        host: Arc<PluginHost>,
    ) -> Self {
        Self {
            styles: StyleStore::new(paths.clone()),
            paths,
            transcriber,
            writer,
            users,
            host,
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Transcribe `audio_path`, store the text, then continue as
    /// [`transcribed_file_to_diary`](Self::transcribed_file_to_diary).
    #[instrument(skip_all, fields(user_id = message.user_id(), audio = %audio_path.display()))]
    pub async fn audio_file_to_diary(
        &self,
        message: Arc<dyn SourceMessage>,
        audio_path: &Path,
    ) -> Result<DispatchReport> {
        message.reply_text("Transcribing...").await?;

        let transcript = self.transcriber.transcribe(audio_path).await?;
        info!(
            backend = self.transcriber.name(),
            language = %transcript.language,
            duration_seconds = transcript.duration_seconds,
            "Transcribed voice note"
        );

        let dir = self.paths.transcription_dir(message.user_id());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let transcription_path = dir.join(paths::transcription_filename(Local::now()));
        tokio::fs::write(&transcription_path, &transcript.text)
            .await
            .with_context(|| format!("Failed to write {}", transcription_path.display()))?;

        message
            .reply_document(&transcription_path, TRANSCRIPTION_CAPTION)
            .await?;

        self.transcribed_file_to_diary(message, &transcription_path, Some(audio_path.to_path_buf()))
            .await
    }

    /// Turn a stored transcription into a diary entry and run the plugins.
    ///
    /// With AI disabled for the user (or no language model configured) the
    /// transcription text is the entry.
    #[instrument(skip_all, fields(user_id = message.user_id(), transcription = %transcription_path.display()))]
    pub async fn transcribed_file_to_diary(
        &self,
        message: Arc<dyn SourceMessage>,
        transcription_path: &Path,
        voice_note_path: Option<PathBuf>,
    ) -> Result<DispatchReport> {
        let user_id = message.user_id();
        let text = tokio::fs::read_to_string(transcription_path)
            .await
            .with_context(|| format!("Failed to read {}", transcription_path.display()))?;

        let user = self.users.load_or_default(user_id)?;
        let diary_entry = match (&self.writer, user.ai_enabled) {
            (Some(writer), true) => {
                message.reply_text("Converting to diary entry...").await?;
                let style = self.styles.get(user_id).await?;
                writer.write_entry(&text, &style).await?
            }
            (None, true) => {
                warn!("AI processing requested but no language model is configured");
                text
            }
            (_, false) => text,
        };

        let artifact = DiaryArtifact {
            source: message,
            transcription_path: transcription_path.to_path_buf(),
            voice_note_path,
            diary_entry,
        };

        let report = self.host.run_plugins(&artifact).await;
        info!(
            plugins = report.runs.len(),
            succeeded = report.succeeded(),
            "Diary entry dispatched"
        );
        Ok(report)
    }
}
