//! Compiled-in plugins.
//!
//! The catalog order is the activation order, and therefore the order in
//! which plugins see each diary entry.

pub mod feedback;
pub mod journiv;

use std::sync::Arc;

use crate::core::{Plugin, PluginContext, PluginFactory};

pub use feedback::FeedbackPlugin;
pub use journiv::{JournivConfig, JournivPlugin};

/// Every plugin shipped with the binary
pub fn builtin_catalog() -> Vec<PluginFactory> {
    vec![
        Box::new(|_: &PluginContext| Arc::new(FeedbackPlugin) as Arc<dyn Plugin>),
        Box::new(|ctx: &PluginContext| Arc::new(JournivPlugin::new(ctx)) as Arc<dyn Plugin>),
    ]
}
