//! Canonical paths for voxdiary state and artifacts.
//!
//! Single source of truth - use this instead of hardcoding paths.
//!
//! ## Layout
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `user_config.json` | Global per-user settings |
//! | `plugin_config.json` | Per-user plugin blobs |
//! | `audio/<user_id>/` | Downloaded voice notes |
//! | `transcriptions/<user_id>/` | Transcription text files |
//! | `styles/user_<user_id>_style.txt` | Diary style samples |

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Resolved artifact locations under one home directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    home: PathBuf,
}

impl ArtifactPaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn user_config(&self) -> PathBuf {
        self.home.join("user_config.json")
    }

    pub fn plugin_config(&self) -> PathBuf {
        self.home.join("plugin_config.json")
    }

    pub fn audio_dir(&self, user_id: i64) -> PathBuf {
        self.home.join("audio").join(user_id.to_string())
    }

    pub fn transcription_dir(&self, user_id: i64) -> PathBuf {
        self.home.join("transcriptions").join(user_id.to_string())
    }

    pub fn styles_dir(&self) -> PathBuf {
        self.home.join("styles")
    }

    pub fn style_file(&self, user_id: i64) -> PathBuf {
        self.styles_dir().join(format!("user_{}_style.txt", user_id))
    }
}

/// `dd_mm_YYYY_HH_MM_<unix>` for a moment in local time
pub fn artifact_stem(now: DateTime<Local>) -> String {
    format!("{}_{}", now.format("%d_%m_%Y_%H_%M"), now.timestamp())
}

pub fn audio_filename(now: DateTime<Local>) -> String {
    format!("{}.ogg", artifact_stem(now))
}

pub fn transcription_filename(now: DateTime<Local>) -> String {
    format!("{}.txt", artifact_stem(now))
}

/// Reject names that could escape the user's directory
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

// ============================================================================
// Tests
// ============================================================================
