//! Per-user plugin configuration store.
//!
//! Layout on disk (`plugin_config.json`):
//!
//! ```text
//! { "<user_id>": { "<plugin_id>": <any JSON value>, ... }, ... }
//! ```
//!
//! Plugins never touch the file directly. They get a [`PluginConfig`] handle
//! scoped to their own id at construction time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::document::{to_json_value, JsonDocument, StoreError};

/// `{ user_id: { plugin_id: blob } }`
pub type PluginDocument = BTreeMap<String, BTreeMap<String, Value>>;

/// Whole-document store for plugin configuration blobs
pub struct PluginConfigStore {
    document: JsonDocument<PluginDocument>,
}

impl PluginConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            document: JsonDocument::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.document.path()
    }

    /// Load every user's plugin configuration.
    ///
    /// Returns an empty mapping when the file is missing or unparseable.
    pub fn load_all_configs(&self) -> Result<PluginDocument, StoreError> {
        self.document.load()
    }

    /// Overwrite the whole document
    pub fn save_all_configs(&self, doc: &PluginDocument) -> Result<(), StoreError> {
        self.document.replace(doc)
    }

    /// Store `data` at `[user_id][plugin_id]`.
    ///
    /// `data` is converted to JSON before the document is read, so a value
    /// that cannot be serialized leaves the file untouched. Non-finite
    /// floats count as unserializable.
    pub fn save_user_config<T>(
        &self,
        user_id: i64,
        plugin_id: &str,
        data: &T,
    ) -> Result<(), StoreError>
    where
        T: Serialize + ?Sized,
    {
        let value = to_json_value(data)?;

        self.document.update(|doc| {
            doc.entry(user_id.to_string())
                .or_default()
                .insert(plugin_id.to_string(), value);
        })
    }

    /// Fetch the blob at `[user_id][plugin_id]`, `None` when either level is absent
    pub fn load_user_config(
        &self,
        user_id: i64,
        plugin_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        let mut doc = self.document.load()?;
        Ok(doc
            .remove(&user_id.to_string())
            .and_then(|mut plugins| plugins.remove(plugin_id)))
    }

    /// Create a handle whose reads and writes are confined to `plugin_id`
    pub fn scoped(self: &Arc<Self>, plugin_id: impl Into<String>) -> PluginConfig {
        PluginConfig {
            store: Arc::clone(self),
            plugin_id: plugin_id.into(),
        }
    }
}

// ============================================================================
// Scoped handle
// ============================================================================

/// Config access for a single plugin
#[derive(Clone)]
pub struct PluginConfig {
    store: Arc<PluginConfigStore>,
    plugin_id: String,
}

impl PluginConfig {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn save_config<T>(&self, user_id: i64, data: &T) -> Result<(), StoreError>
    where
        T: Serialize + ?Sized,
    {
        self.store.save_user_config(user_id, &self.plugin_id, data)
    }

    pub fn load_config(&self, user_id: i64) -> Result<Option<Value>, StoreError> {
        self.store.load_user_config(user_id, &self.plugin_id)
    }

    /// Load and deserialize the raw blob
    pub fn load_typed<T: DeserializeOwned>(&self, user_id: i64) -> Result<Option<T>, StoreError> {
        self.load_config(user_id)?
            .map(|value| self.decode(value))
            .transpose()
    }

    /// Store `config` wrapped in a schema-version envelope
    pub fn save_versioned<S: ConfigSchema>(&self, user_id: i64, config: &S) -> Result<(), StoreError> {
        let envelope = Envelope {
            schema_version: S::VERSION,
            data: config,
        };
        self.save_config(user_id, &envelope)
    }

    /// Load a versioned config, migrating older schemas forward.
    ///
    /// A blob stored without an envelope counts as schema version 1. When a
    /// migration ran, the upgraded blob is written back.
    pub fn load_versioned<S: ConfigSchema>(&self, user_id: i64) -> Result<Option<S>, StoreError> {
        let Some(value) = self.load_config(user_id)? else {
            return Ok(None);
        };

        let (stored_version, raw) = split_envelope(value);
        let upgraded = migrate_to_current::<S>(stored_version, raw)?;
        let config: S = self.decode(upgraded)?;

        if stored_version < S::VERSION {
            info!(
                plugin = %self.plugin_id,
                user_id,
                from = stored_version,
                to = S::VERSION,
                "Migrated plugin config schema"
            );
            self.save_versioned(user_id, &config)?;
        }

        Ok(Some(config))
    }

    fn decode<T: DeserializeOwned>(&self, value: Value) -> Result<T, StoreError> {
        serde_json::from_value(value).map_err(|source| StoreError::Malformed {
            plugin_id: self.plugin_id.clone(),
            source,
        })
    }
}

// ============================================================================
// Schema versioning
// ============================================================================

/// A plugin config type with an explicit schema version
pub trait ConfigSchema: Serialize + DeserializeOwned {
    /// Version written by the current code
    const VERSION: u32;

    /// Upgrade a raw blob from `from_version` to `from_version + 1`
    fn migrate(from_version: u32, raw: Value) -> Result<Value, String> {
        let _ = raw;
        Err(format!("no migration defined from version {}", from_version))
    }
}

#[derive(Serialize)]
struct Envelope<T> {
    schema_version: u32,
    data: T,
}

/// Split a stored blob into `(version, payload)`
fn split_envelope(value: Value) -> (u32, Value) {
    match value {
        Value::Object(mut map) => match envelope_version(&map) {
            Some(version) => {
                let data = map.remove("data").unwrap_or(Value::Null);
                (version, data)
            }
            None => (1, Value::Object(map)),
        },
        other => (1, other),
    }
}

fn envelope_version(map: &serde_json::Map<String, Value>) -> Option<u32> {
    if !map.contains_key("data") {
        return None;
    }
    map.get("schema_version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

fn migrate_to_current<S: ConfigSchema>(stored: u32, mut raw: Value) -> Result<Value, StoreError> {
    if stored > S::VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: stored,
            supported: S::VERSION,
        });
    }

    let mut version = stored;
    while version < S::VERSION {
        raw = S::migrate(version, raw)
            .map_err(|reason| StoreError::Migration { from: version, reason })?;
        version += 1;
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Creds {
        user: String,
        secret: String,
    }

    impl ConfigSchema for Creds {
        const VERSION: u32 = 2;

        fn migrate(from_version: u32, raw: Value) -> Result<Value, String> {
            match from_version {
                1 => {
                    let token = raw
                        .get("token")
                        .and_then(Value::as_str)
                        .ok_or("missing token")?;
                    Ok(json!({ "user": "legacy", "secret": token }))
                }
                v => Err(format!("unknown version {}", v)),
            }
        }
    }

    fn store(temp: &TempDir) -> Arc<PluginConfigStore> {
        Arc::new(PluginConfigStore::new(temp.path().join("plugin_config.json")))
    }

    #[test]
    fn test_split_envelope() {
        let (v, data) = split_envelope(json!({ "schema_version": 3, "data": { "a": 1 } }));
        assert_eq!(v, 3);
        assert_eq!(data, json!({ "a": 1 }));

        let (v, data) = split_envelope(json!({ "a": 1 }));
        assert_eq!(v, 1);
        assert_eq!(data, json!({ "a": 1 }));

        let (v, _) = split_envelope(json!("scalar"));
        assert_eq!(v, 1);
    }

    #[test]
    fn test_scoped_handle_uses_own_namespace() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let alpha = store.scoped("alpha");
        let beta = store.scoped("beta");

        alpha.save_config(1, &json!({ "x": 1 })).unwrap();

        assert_eq!(alpha.load_config(1).unwrap(), Some(json!({ "x": 1 })));
        assert_eq!(beta.load_config(1).unwrap(), None);
        assert_eq!(
            store.load_user_config(1, "alpha").unwrap(),
            Some(json!({ "x": 1 }))
        );
    }

    #[test]
    fn test_versioned_roundtrip_writes_envelope() {
        let temp = TempDir::new().unwrap();
        let cfg = store(&temp).scoped("creds");
        let creds = Creds {
            user: "ana".to_string(),
            secret: "s3".to_string(),
        };

        cfg.save_versioned(5, &creds).unwrap();

        let raw = cfg.load_config(5).unwrap().unwrap();
        assert_eq!(raw["schema_version"], json!(2));
        assert_eq!(cfg.load_versioned::<Creds>(5).unwrap(), Some(creds));
    }

    #[test]
    fn test_legacy_blob_is_migrated_and_persisted() {
        let temp = TempDir::new().unwrap();
        let cfg = store(&temp).scoped("creds");
        cfg.save_config(5, &json!({ "token": "old-token" })).unwrap();

        let loaded = cfg.load_versioned::<Creds>(5).unwrap().unwrap();
        assert_eq!(loaded.secret, "old-token");
        assert_eq!(loaded.user, "legacy");

        let raw = cfg.load_config(5).unwrap().unwrap();
        assert_eq!(raw["schema_version"], json!(2));
        assert_eq!(raw["data"]["secret"], json!("old-token"));
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let temp = TempDir::new().unwrap();
        let cfg = store(&temp).scoped("creds");
        cfg.save_config(5, &json!({ "schema_version": 9, "data": {} })).unwrap();

        let err = cfg.load_versioned::<Creds>(5).unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnsupportedVersion { found: 9, supported: 2 }
        ));
    }

    #[test]
    fn test_malformed_blob_reports_plugin() {
        let temp = TempDir::new().unwrap();
        let cfg = store(&temp).scoped("creds");
        cfg.save_config(5, &json!(42)).unwrap();

        let err = cfg.load_typed::<Creds>(5).unwrap_err();
        assert!(err.to_string().contains("creds"));
    }
}
