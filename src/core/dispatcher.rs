//! Fan-out of finished diary entries to the active plugins.
//!
//! Plugins run strictly one after another, in activation order. Each call
//! runs on its own task so a panic is contained like an error. A plugin that
//! fails or overruns its timeout is logged and the remaining plugins still run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{error, info, instrument, warn, Instrument};
use uuid::Uuid;

use super::plugin::{DiaryArtifact, Plugin, Registrar};
use super::registry::PluginRegistry;

/// Default upper bound for a single `on_entry` call
pub const DEFAULT_PLUGIN_TIMEOUT: Duration = Duration::from_secs(120);

/// How a single plugin invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOutcome {
    Succeeded,
    Failed(String),
    TimedOut,
}

/// Result of one plugin invocation
#[derive(Debug, Clone)]
pub struct PluginRun {
    pub plugin_id: String,
    pub outcome: PluginOutcome,
    pub duration_ms: u64,
}

/// Per-plugin outcomes of one fan-out
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub runs: Vec<PluginRun>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| r.outcome == PluginOutcome::Succeeded)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PluginRun> {
        self.runs
            .iter()
            .filter(|r| r.outcome != PluginOutcome::Succeeded)
    }

    pub fn outcome_of(&self, plugin_id: &str) -> Option<&PluginOutcome> {
        self.runs
            .iter()
            .find(|r| r.plugin_id == plugin_id)
            .map(|r| &r.outcome)
    }
}

/// Owns the active plugin list and runs the fan-out
pub struct PluginHost {
    registry: PluginRegistry,
    active: Vec<Arc<dyn Plugin>>,
    plugin_timeout: Duration,
}

impl PluginHost {
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            registry,
            active: Vec::new(),
            plugin_timeout: DEFAULT_PLUGIN_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, plugin_timeout: Duration) -> Self {
        self.plugin_timeout = plugin_timeout;
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Discover, filter and load plugins. Replaces any previously active list.
    pub fn load_plugins(&mut self, registrar: &mut dyn Registrar) {
        self.active = self.registry.activate(registrar);
        info!(count = self.active.len(), "Plugins loaded");
    }

    /// Ids of the active plugins, in run order
    pub fn active_ids(&self) -> Vec<String> {
        self.active.iter().map(|p| p.id().to_string()).collect()
    }

    /// Hand `artifact` to every active plugin in order
    #[instrument(skip_all, fields(dispatch_id = %Uuid::new_v4(), chat_id = artifact.source.chat_id()))]
    pub async fn run_plugins(&self, artifact: &DiaryArtifact) -> DispatchReport {
        let mut report = DispatchReport::default();

        for plugin in &self.active {
            let plugin_id = plugin.id().to_string();
            info!(plugin = %plugin_id, "Running plugin");

            let started = Instant::now();
            let task = {
                let plugin = Arc::clone(plugin);
                let artifact = artifact.clone();
                tokio::spawn(async move { plugin.on_entry(&artifact).await }.in_current_span())
            };
            let abort = task.abort_handle();

            let outcome = match timeout(self.plugin_timeout, task).await {
                Ok(Ok(Ok(()))) => PluginOutcome::Succeeded,
                Ok(Ok(Err(e))) => {
                    let reason = format!("{:#}", e);
                    error!(plugin = %plugin_id, error = %reason, "Plugin failed");
                    PluginOutcome::Failed(reason)
                }
                Ok(Err(join_error)) => {
                    let reason = format!("plugin task aborted: {}", join_error);
                    error!(plugin = %plugin_id, error = %reason, "Plugin failed");
                    PluginOutcome::Failed(reason)
                }
                Err(_) => {
                    abort.abort();
                    warn!(
                        plugin = %plugin_id,
                        timeout_secs = self.plugin_timeout.as_secs(),
                        "Plugin timed out"
                    );
                    PluginOutcome::TimedOut
                }
            };

            report.runs.push(PluginRun {
                plugin_id,
                outcome,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        report
    }
}
