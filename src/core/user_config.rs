//! Global per-user settings (`user_config.json`).
//!
//! Same whole-document pattern as the plugin store, but with a fixed schema:
//!
//! ```text
//! { "<user_id>": { "ai_enabled": true, "reminder_time": "07:30" } }
//! ```
//!
//! Records are decoded one at a time. A record that does not fit the schema
//! is skipped on read and left as-is on write, so it never takes the other
//! users down with it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::document::{to_json_value, JsonDocument, StoreError};

/// Settings for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Rewrite transcriptions with the language model
    pub ai_enabled: bool,

    /// Daily reminder time, `HH:MM` (24h)
    pub reminder_time: Option<String>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            ai_enabled: true,
            reminder_time: None,
        }
    }
}

type UserDocument = BTreeMap<String, Value>;

fn decode(key: &str, raw: Value) -> Option<UserConfig> {
    match serde_json::from_value(raw) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(user = %key, error = %e, "Skipping malformed user config record");
            None
        }
    }
}

/// Whole-document store for [`UserConfig`] records
pub struct UserConfigStore {
    document: JsonDocument<UserDocument>,
}

impl UserConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            document: JsonDocument::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.document.path()
    }

    /// Load every user's settings. Missing or unreadable file yields an empty map.
    pub fn load_all(&self) -> Result<BTreeMap<i64, UserConfig>, StoreError> {
        let raw = self.document.load()?;
        let mut configs = BTreeMap::new();

        for (key, value) in raw {
            let Ok(user_id) = key.parse::<i64>() else {
                warn!(key = %key, "Skipping user config with non-numeric id");
                continue;
            };
            if let Some(config) = decode(&key, value) {
                configs.insert(user_id, config);
            }
        }

        Ok(configs)
    }

    /// Settings for `user_id`, `None` if the user never saved any
    pub fn load(&self, user_id: i64) -> Result<Option<UserConfig>, StoreError> {
        let key = user_id.to_string();
        Ok(self
            .document
            .load()?
            .remove(&key)
            .and_then(|raw| decode(&key, raw)))
    }

    /// Settings for `user_id`, falling back to defaults
    pub fn load_or_default(&self, user_id: i64) -> Result<UserConfig, StoreError> {
        Ok(self.load(user_id)?.unwrap_or_default())
    }

    /// Insert or replace one user's settings
    pub fn save(&self, user_id: i64, config: &UserConfig) -> Result<(), StoreError> {
        let value = to_json_value(config)?;
        self.document.update(|doc| {
            doc.insert(user_id.to_string(), value);
        })
    }

    /// Overwrite the whole document
    pub fn save_all(&self, configs: &BTreeMap<i64, UserConfig>) -> Result<(), StoreError> {
        let doc = configs
            .iter()
            .map(|(id, cfg)| Ok((id.to_string(), to_json_value(cfg)?)))
            .collect::<Result<UserDocument, StoreError>>()?;
        self.document.replace(&doc)
    }

    /// Toggle AI rewriting, creating the record if needed
    pub fn set_ai_enabled(&self, user_id: i64, enabled: bool) -> Result<UserConfig, StoreError> {
        self.modify(user_id, |cfg| cfg.ai_enabled = enabled)
    }

    /// Set or clear the daily reminder, creating the record if needed
    pub fn set_reminder(
        &self,
        user_id: i64,
        reminder_time: Option<String>,
    ) -> Result<UserConfig, StoreError> {
        self.modify(user_id, |cfg| cfg.reminder_time = reminder_time)
    }

    /// `(user_id, "HH:MM")` for every user with a reminder
    pub fn users_with_reminders(&self) -> Result<Vec<(i64, String)>, StoreError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter_map(|(id, cfg)| cfg.reminder_time.map(|t| (id, t)))
            .collect())
    }

    fn modify<F>(&self, user_id: i64, change: F) -> Result<UserConfig, StoreError>
    where
        F: FnOnce(&mut UserConfig),
    {
        let key = user_id.to_string();
        self.document.update(|doc| {
            let mut config = doc
                .remove(&key)
                .and_then(|raw| decode(&key, raw))
                .unwrap_or_default();
            change(&mut config);
            doc.insert(key.clone(), to_json_value(&config)?);
            Ok::<_, StoreError>(config)
        })?
    }
}
