//! Per-user diary style samples, one text file per user.

use std::io;

use anyhow::{Context, Result};

use crate::config::ArtifactPaths;

pub const DEFAULT_STYLE: &str = "The user has not set a style. Use a thoughtful and personal tone.";

#[derive(Debug, Clone)]
pub struct StyleStore {
    paths: ArtifactPaths,
}

impl StyleStore {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self { paths }
    }

    /// The user's saved sample, or [`DEFAULT_STYLE`]
    pub async fn get(&self, user_id: i64) -> Result<String> {
        let path = self.paths.style_file(user_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(style) => Ok(style),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DEFAULT_STYLE.to_string()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub async fn set(&self, user_id: i64, style: &str) -> Result<()> {
        let dir = self.paths.styles_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = self.paths.style_file(user_id);
        tokio::fs::write(&path, style)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}
