//! Plugin dispatch and configuration core.
//!
//! This module contains:
//! - JsonDocument: Locked, atomic whole-document JSON persistence
//! - PluginConfigStore / PluginConfig: Per-user plugin blobs
//! - UserConfigStore: Global per-user settings
//! - Plugin: The plugin contract and host interfaces
//! - PluginRegistry: Static catalog plus enablement filtering
//! - PluginHost: Sequential fan-out with per-plugin isolation

pub mod config_store;
pub mod dispatcher;
pub mod document;
pub mod plugin;
pub mod registry;
pub mod user_config;

// Re-export commonly used types
pub use config_store::{ConfigSchema, PluginConfig, PluginConfigStore, PluginDocument};
pub use dispatcher::{DispatchReport, PluginHost, PluginOutcome, PluginRun, DEFAULT_PLUGIN_TIMEOUT};
pub use document::{to_json_value, JsonDocument, StoreError, DEFAULT_LOCK_TIMEOUT};
pub use plugin::{
    CallbackContext, CallbackHandler, CommandContext, CommandHandler, DiaryArtifact,
    InlineButton, InlineKeyboard, Plugin, Registrar, SourceMessage,
};
pub use registry::{EnabledPlugins, PluginContext, PluginFactory, PluginRegistry, PluginSummary};
pub use user_config::{UserConfig, UserConfigStore};
