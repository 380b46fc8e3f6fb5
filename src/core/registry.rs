//! Plugin catalog and enablement filtering.
//!
//! Plugins are compiled in. The catalog is an ordered list of factories;
//! loading instantiates each one, reads its id, and activates it only when
//! the id is in the enablement set.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::config_store::{PluginConfig, PluginConfigStore};
use super::plugin::{Plugin, Registrar};

/// Builds a plugin instance from shared resources
pub type PluginFactory = Box<dyn Fn(&PluginContext) -> Arc<dyn Plugin> + Send + Sync>;

/// Shared resources handed to plugin factories
#[derive(Clone)]
pub struct PluginContext {
    config_store: Arc<PluginConfigStore>,
    http: reqwest::Client,
}

impl PluginContext {
    pub fn new(config_store: Arc<PluginConfigStore>) -> Self {
        Self::with_http(config_store, reqwest::Client::new())
    }

    pub fn with_http(config_store: Arc<PluginConfigStore>, http: reqwest::Client) -> Self {
        Self { config_store, http }
    }

    /// Config handle scoped to `plugin_id`
    pub fn config_for(&self, plugin_id: &str) -> PluginConfig {
        self.config_store.scoped(plugin_id)
    }

    pub fn config_store(&self) -> &Arc<PluginConfigStore> {
        &self.config_store
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

/// Plugin ids allowed to run in this deployment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnabledPlugins(BTreeSet<String>);

impl EnabledPlugins {
    /// Parse a comma-separated list such as `"feedback, journiv"`.
    /// Blank entries are ignored.
    pub fn parse(list: &str) -> Self {
        Self(
            list.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for EnabledPlugins {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Catalog listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSummary {
    pub id: String,
    pub description: String,
    pub enabled: bool,
}

/// Ordered catalog of compiled-in plugins plus the enablement set
pub struct PluginRegistry {
    context: PluginContext,
    enabled: EnabledPlugins,
    catalog: Vec<PluginFactory>,
}

impl PluginRegistry {
    pub fn new(context: PluginContext, enabled: EnabledPlugins) -> Self {
        Self {
            context,
            enabled,
            catalog: Vec::new(),
        }
    }

    /// Append factories to the catalog, keeping their order
    pub fn with_catalog(mut self, factories: impl IntoIterator<Item = PluginFactory>) -> Self {
        self.catalog.extend(factories);
        self
    }

    pub fn register(&mut self, factory: PluginFactory) {
        self.catalog.push(factory);
    }

    pub fn enabled(&self) -> &EnabledPlugins {
        &self.enabled
    }

    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    /// Instantiate every catalog entry and report whether it is enabled
    pub fn describe(&self) -> Vec<PluginSummary> {
        self.catalog
            .iter()
            .map(|factory| {
                let plugin = factory(&self.context);
                PluginSummary {
                    id: plugin.id().to_string(),
                    description: plugin.description().to_string(),
                    enabled: self.enabled.contains(plugin.id()),
                }
            })
            .collect()
    }

    /// Instantiate the catalog, load the enabled plugins, and return them in
    /// catalog order.
    ///
    /// A plugin whose `load` fails is left out. When two plugins share an id,
    /// the later one replaces the earlier one in place.
    pub fn activate(&self, registrar: &mut dyn Registrar) -> Vec<Arc<dyn Plugin>> {
        let mut active: Vec<Arc<dyn Plugin>> = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();

        for factory in &self.catalog {
            let plugin = factory(&self.context);
            let id = plugin.id().to_string();
            seen.insert(id.clone());

            if !self.enabled.contains(&id) {
                info!(plugin = %id, "Disabled plugin");
                continue;
            }

            if let Err(e) = Arc::clone(&plugin).load(registrar) {
                error!(plugin = %id, error = %e, "Plugin failed to load, skipping");
                continue;
            }

            info!(plugin = %id, "Enabled plugin");

            match active.iter().position(|p| p.id() == id) {
                Some(index) => {
                    warn!(plugin = %id, "Duplicate plugin id, replacing earlier instance");
                    active[index] = plugin;
                }
                None => active.push(plugin),
            }
        }

        for id in self.enabled.iter().filter(|id| !seen.contains(*id)) {
            warn!(plugin = %id, "Enabled plugin id matches no compiled-in plugin");
        }

        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enabled_list() {
        let enabled = EnabledPlugins::parse(" feedback, journiv ,,");
        assert!(enabled.contains("feedback"));
        assert!(enabled.contains("journiv"));
        assert_eq!(enabled.iter().count(), 2);
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(EnabledPlugins::parse("").is_empty());
        assert!(EnabledPlugins::parse(" , ").is_empty());
    }

    #[test]
    fn test_from_iterator() {
        let enabled: EnabledPlugins = ["a", "b"].into_iter().collect();
        assert!(enabled.contains("a"));
        assert!(!enabled.contains("c"));
    }
}
