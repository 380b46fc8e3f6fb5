//! Whisper transcription backend.
//!
//! Shells out to a local whisper binary for transcription.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::adapters::Transcriber;

/// Result of transcription
#[derive(Debug, Clone)]
pub struct TranscriptResult {
    pub text: String,
    pub language: String,
    pub duration_seconds: f64,
}

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    end: f64,
}

/// Local whisper CLI
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    binary: PathBuf,
    model: String,
    /// `None` lets whisper detect the language
    language: Option<String>,
}

impl WhisperTranscriber {
    pub fn new(binary: impl Into<PathBuf>, model: impl Into<String>, language: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            language,
        }
    }

    fn command(&self, audio_path: &Path, output_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(audio_path)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_dir")
            .arg(output_dir)
            .arg("--output_format")
            .arg("json");
        if let Some(language) = &self.language {
            cmd.arg("--language").arg(language);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptResult> {
        // Create temp dir for output
        let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;

        debug!(audio = %audio_path.display(), model = %self.model, "Running whisper");

        let output = self
            .command(audio_path, temp_dir.path())
            .output()
            .await
            .with_context(|| format!("Failed to run whisper at {}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Whisper failed: {}", stderr.trim());
        }

        // Find and parse JSON output
        let stem = audio_path.file_stem().unwrap_or_default().to_string_lossy();
        let json_path = temp_dir.path().join(format!("{}.json", stem));

        let json_content = tokio::fs::read_to_string(&json_path)
            .await
            .context("Failed to read whisper output")?;

        parse_output(&json_content, self.language.as_deref())
    }
}

fn parse_output(json_content: &str, requested_language: Option<&str>) -> Result<TranscriptResult> {
    let whisper: WhisperOutput =
        serde_json::from_str(json_content).context("Failed to parse whisper JSON")?;

    let duration = whisper.segments.last().map(|s| s.end).unwrap_or(0.0);

    let language = if whisper.language.is_empty() {
        requested_language.unwrap_or("unknown").to_string()
    } else {
        whisper.language
    };

    Ok(TranscriptResult {
        text: whisper.text.trim().to_string(),
        language,
        duration_seconds: duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output() {
        let raw = r#"{"text": "  hello there ", "language": "en",
                      "segments": [{"end": 1.5}, {"end": 4.25}]}"#;
        let result = parse_output(raw, None).unwrap();
        assert_eq!(result.text, "hello there");
        assert_eq!(result.language, "en");
        assert_eq!(result.duration_seconds, 4.25);
    }

    #[test]
    fn test_parse_output_falls_back_to_requested_language() {
        let result = parse_output(r#"{"text": "hola"}"#, Some("es")).unwrap();
        assert_eq!(result.language, "es");
        assert_eq!(result.duration_seconds, 0.0);
    }

    #[test]
    fn test_language_flag_only_when_set() {
        let auto = WhisperTranscriber::new("whisper", "base", None);
        let args: Vec<String> = auto
            .command(Path::new("a.ogg"), Path::new("/tmp/out"))
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(!args.contains(&"--language".to_string()));

        let fixed = WhisperTranscriber::new("whisper", "base", Some("en".to_string()));
        let args: Vec<String> = fixed
            .command(Path::new("a.ogg"), Path::new("/tmp/out"))
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(args.ends_with(&["--language".to_string(), "en".to_string()]));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let transcriber = WhisperTranscriber::new("/nonexistent/whisper-bin", "base", None);
        let err = transcriber.transcribe(Path::new("a.ogg")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to run whisper"));
    }
}
