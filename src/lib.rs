//! voxdiary - Voice-note diary bot with pluggable journaling backends
//!
//! A user sends a voice note to a Telegram bot. The note is transcribed,
//! rewritten into a diary entry in the user's own style, and handed to every
//! enabled plugin (reply with the entry, upload to Journiv, ...).
//!
//! # Architecture
//!
//! The center of the crate is the plugin core:
//! - Plugins are compiled in and listed in a static catalog
//! - `ENABLED_PLUGINS` decides which of them are activated at startup
//! - Each finished entry is fanned out to the active plugins in order; a
//!   failing plugin never stops the others
//! - Plugins persist per-user settings through a scoped config handle
//!
//! # Modules
//!
//! - `core`: Plugin contract, registry, dispatcher, config stores
//! - `plugins`: Built-in plugins (feedback, journiv)
//! - `bot`: Telegram polling loop, command routing, diary pipeline
//! - `adapters`: External systems (Telegram, Journiv, language model)
//! - `ingest`: Speech-to-text
//! - `reminders`: Daily reminder scheduler
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Start the bot
//! TELEGRAM_TOKEN=... ENABLED_PLUGINS=feedback,journiv voxdiary run
//!
//! # Which plugins are compiled in / enabled
//! voxdiary plugins
//! ```

pub mod adapters;
pub mod bot;
pub mod cli;
pub mod config;
pub mod core;
pub mod ingest;
pub mod plugins;
pub mod reminders;

// Re-export main types at crate root for convenience
pub use crate::core::{
    DiaryArtifact, DispatchReport, EnabledPlugins, Plugin, PluginConfigStore, PluginHost,
    PluginOutcome, PluginRegistry, UserConfig, UserConfigStore,
};
pub use config::Settings;
