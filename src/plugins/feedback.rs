//! Echoes the finished diary entry back to the user.

use anyhow::Result;
use async_trait::async_trait;

use crate::core::{DiaryArtifact, Plugin};

pub const PLUGIN_ID: &str = "feedback";

pub struct FeedbackPlugin;

/// Reply text for one entry
pub fn format_entry(diary_entry: &str) -> String {
    format!("📔 Your entry:\n\n{}", diary_entry)
}

#[async_trait]
impl Plugin for FeedbackPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn description(&self) -> &str {
        "Reply with the finished diary entry"
    }

    async fn on_entry(&self, artifact: &DiaryArtifact) -> Result<()> {
        artifact
            .source
            .reply_text(&format_entry(&artifact.diary_entry))
            .await
    }
}
