//! Configuration for voxdiary.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TELEGRAM_TOKEN, ENABLED_PLUGINS, AI_*, WHISPER_*, ...)
//! 2. Config file (`$VOXDIARY_CONFIG`, else `$VOXDIARY_HOME/config.yaml`)
//! 3. Defaults (~/.voxdiary)
//!
//! Relative paths in the config file are resolved against the file's directory.

pub mod paths;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::core::EnabledPlugins;

pub use paths::ArtifactPaths;

pub const DEFAULT_AI_PROVIDER: &str = "openai";
pub const DEFAULT_AI_MODEL: &str = "gpt-4";
pub const DEFAULT_AI_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_WHISPER_PATH: &str = "whisper";
pub const DEFAULT_WHISPER_MODEL: &str = "base";
pub const DEFAULT_PLUGIN_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_REMINDER_POLL_SECS: u64 = 30;
pub const MIN_REMINDER_POLL_SECS: u64 = 5;
/// Reminders match to the minute, so polling must not skip one
pub const MAX_REMINDER_POLL_SECS: u64 = 60;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Data directory (relative to the config file)
    pub home: Option<String>,
    pub telegram_token: Option<String>,
    #[serde(default)]
    pub enabled_plugins: Vec<String>,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub whisper: WhisperConfig,
    pub plugin_timeout_secs: Option<u64>,
    pub reminder_poll_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AiConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WhisperConfig {
    pub path: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
}

/// Language model settings
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Speech-to-text settings
#[derive(Debug, Clone)]
pub struct WhisperSettings {
    pub path: PathBuf,
    pub model: String,
    pub language: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct Settings {
    /// Data directory holding config documents and artifacts
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub telegram_token: Option<String>,
    pub enabled_plugins: EnabledPlugins,
    pub ai: AiSettings,
    pub whisper: WhisperSettings,
    pub plugin_timeout_secs: u64,
    pub reminder_poll_secs: u64,
}

impl Settings {
    /// Resolve settings from the process environment
    pub fn load() -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let default_home = dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".voxdiary");
        Self::resolve(&env, default_home)
    }

    /// Resolve settings from an explicit environment map
    pub fn resolve(env: &HashMap<String, String>, default_home: PathBuf) -> Result<Self> {
        let var = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let env_home = var("VOXDIARY_HOME").map(PathBuf::from);
        let config_path = match var("VOXDIARY_CONFIG") {
            Some(path) => Some(PathBuf::from(path)),
            None => {
                let candidate = env_home
                    .clone()
                    .unwrap_or_else(|| default_home.clone())
                    .join("config.yaml");
                candidate.exists().then_some(candidate)
            }
        };

        let file = match &config_path {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };
        let base_dir = config_path
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(Path::new("."));

        let home = match (env_home, &file.home) {
            (Some(home), _) => home,
            (None, Some(home)) => resolve_path(base_dir, home),
            (None, None) => default_home,
        };

        let enabled_plugins = match var("ENABLED_PLUGINS") {
            Some(list) => EnabledPlugins::parse(list),
            None => file.enabled_plugins.iter().map(String::as_str).collect(),
        };

        let ai = AiSettings {
            provider: var("AI_PROVIDER")
                .map(str::to_string)
                .or(file.ai.provider)
                .unwrap_or_else(|| DEFAULT_AI_PROVIDER.to_string()),
            model: var("AI_MODEL")
                .map(str::to_string)
                .or(file.ai.model)
                .unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            temperature: parse_or_default(
                var("AI_TEMPERATURE"),
                "AI_TEMPERATURE",
                file.ai.temperature.unwrap_or(DEFAULT_AI_TEMPERATURE),
            ),
            base_url: var("AI_BASE_URL")
                .map(str::to_string)
                .or(file.ai.base_url)
                .unwrap_or_else(|| crate::adapters::openai::DEFAULT_BASE_URL.to_string()),
            api_key: var("OPENAI_API_KEY").map(str::to_string).or(file.ai.api_key),
        };

        let whisper = WhisperSettings {
            path: var("WHISPER_PATH")
                .map(str::to_string)
                .or(file.whisper.path)
                .unwrap_or_else(|| DEFAULT_WHISPER_PATH.to_string())
                .into(),
            model: var("WHISPER_MODEL")
                .map(str::to_string)
                .or(file.whisper.model)
                .unwrap_or_else(|| DEFAULT_WHISPER_MODEL.to_string()),
            language: var("WHISPER_LANGUAGE")
                .map(str::to_string)
                .or(file.whisper.language),
        };

        let plugin_timeout_secs = parse_or_default(
            var("PLUGIN_TIMEOUT_SECS"),
            "PLUGIN_TIMEOUT_SECS",
            file.plugin_timeout_secs.unwrap_or(DEFAULT_PLUGIN_TIMEOUT_SECS),
        );

        let reminder_poll_secs = file
            .reminder_poll_secs
            .unwrap_or(DEFAULT_REMINDER_POLL_SECS)
            .clamp(MIN_REMINDER_POLL_SECS, MAX_REMINDER_POLL_SECS);

        Ok(Settings {
            home,
            config_file: config_path,
            telegram_token: var("TELEGRAM_TOKEN")
                .map(str::to_string)
                .or(file.telegram_token),
            enabled_plugins,
            ai,
            whisper,
            plugin_timeout_secs,
            reminder_poll_secs,
        })
    }

    pub fn paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.home)
    }

    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_secs(self.plugin_timeout_secs)
    }

    pub fn reminder_poll(&self) -> Duration {
        Duration::from_secs(self.reminder_poll_secs)
    }

    /// Bot token, required by `voxdiary run`
    pub fn require_telegram_token(&self) -> Result<&str> {
        self.telegram_token
            .as_deref()
            .context("TELEGRAM_TOKEN is not set (env or config file)")
    }
}

/// Parse an env value, keeping `default` (with a warning) when it is malformed
fn parse_or_default<T>(raw: Option<&str>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match raw {
        None => default,
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!(key, value, fallback = %default, "There was an error parsing setting");
            default
        }),
    }
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}
