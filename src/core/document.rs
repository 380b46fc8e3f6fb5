//! Whole-document JSON persistence.
//!
//! Both configuration stores keep a single pretty-printed JSON file that is
//! read, mutated and rewritten as a unit. Every read-modify-write holds an
//! in-process mutex plus an exclusive lock on a sidecar `.lock` file, and the
//! new content is written to a temp file that is renamed over the target.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::ser::{self, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by the configuration stores
#[derive(Debug, Error)]
pub enum StoreError {
    /// The value handed to the store cannot be represented as JSON.
    /// Raised before the document on disk is touched.
    #[error("Plugin data must be JSON-serializable: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A stored value exists but does not match the requested type
    #[error("Stored config for plugin '{plugin_id}' is malformed: {source}")]
    Malformed {
        plugin_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Stored schema version is newer than the running code understands
    #[error("Config schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Migration between schema versions failed
    #[error("Config migration from version {from} failed: {reason}")]
    Migration { from: u32, reason: String },

    /// Another process held the document lock for too long
    #[error("Timed out after {waited_ms}ms waiting for lock on {path}")]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// How long a writer waits for the cross-process lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Result of reading the backing file
enum Snapshot<T> {
    Missing,
    Parsed(T),
    Corrupt(String),
}

/// A JSON file holding one document of type `T`
pub struct JsonDocument<T> {
    path: PathBuf,
    guard: Mutex<()>,
    lock_timeout: Duration,
    _doc: std::marker::PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            _doc: std::marker::PhantomData,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the unreadable document is moved to before it gets overwritten
    pub fn corrupt_backup_path(&self) -> PathBuf {
        sibling(&self.path, "corrupt")
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }

    /// Load the whole document.
    ///
    /// A missing file and a file that fails to parse both yield `T::default()`.
    pub fn load(&self) -> Result<T, StoreError> {
        match self.read()? {
            Snapshot::Missing => Ok(T::default()),
            Snapshot::Parsed(doc) => Ok(doc),
            Snapshot::Corrupt(reason) => {
                warn!(
                    path = %self.path.display(),
                    %reason,
                    "Config document is unreadable, treating it as empty"
                );
                Ok(T::default())
            }
        }
    }

    /// Overwrite the whole document
    pub fn replace(&self, doc: &T) -> Result<(), StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let _file_lock = self.acquire_file_lock()?;
        self.write(doc)
    }

    /// Read the document, apply `mutate`, and write the result back
    pub fn update<F, R>(&self, mutate: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut T) -> R,
    {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let _file_lock = self.acquire_file_lock()?;

        let mut doc = match self.read()? {
            Snapshot::Missing => T::default(),
            Snapshot::Parsed(doc) => doc,
            Snapshot::Corrupt(reason) => {
                let backup = self.corrupt_backup_path();
                warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    %reason,
                    "Preserving unreadable config document before rewriting it"
                );
                fs::rename(&self.path, &backup).map_err(|e| StoreError::io(&self.path, e))?;
                T::default()
            }
        };

        let result = mutate(&mut doc);
        self.write(&doc)?;
        Ok(result)
    }

    fn read(&self) -> Result<Snapshot<T>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Snapshot::Missing),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Ok(Snapshot::Corrupt(e.to_string()))
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(Snapshot::Missing);
        }

        match serde_json::from_str(&content) {
            Ok(doc) => Ok(Snapshot::Parsed(doc)),
            Err(e) => Ok(Snapshot::Corrupt(e.to_string())),
        }
    }

    fn write(&self, doc: &T) -> Result<(), StoreError> {
        let parent = self.parent_dir();
        fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;

        let body = serde_json::to_string_pretty(doc).map_err(StoreError::Serialization)?;

        let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| StoreError::io(&parent, e))?;
        if let Err(e) = writeln!(tmp, "{}", body).and_then(|_| tmp.flush()) {
            return Err(StoreError::io(tmp.path(), e));
        }
        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;

        debug!(path = %self.path.display(), bytes = body.len(), "Config document written");
        Ok(())
    }

    fn acquire_file_lock(&self) -> Result<fs::File, StoreError> {
        let parent = self.parent_dir();
        fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;

        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StoreError::io(&lock_path, e))?;

        // Bounded by `lock_timeout`; released when the handle drops
        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(file),
                Err(e) if e.kind() != fs2::lock_contended_error().kind() => {
                    return Err(StoreError::io(&lock_path, e));
                }
                Err(_) if started.elapsed() >= self.lock_timeout => {
                    return Err(StoreError::LockTimeout {
                        path: lock_path,
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Err(_) => thread::sleep(LOCK_RETRY_DELAY),
            }
        }
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

// ============================================================================
// Strict JSON encoding
// ============================================================================

/// Convert `data` to a JSON value, rejecting non-finite floats.
///
/// `serde_json` silently writes `NaN` and infinities as `null`, which would
/// not round-trip.
pub fn to_json_value<T>(data: &T) -> Result<Value, StoreError>
where
    T: Serialize + ?Sized,
{
    data.serialize(FiniteFloats)
        .map_err(StoreError::Serialization)?;
    serde_json::to_value(data).map_err(StoreError::Serialization)
}

/// Walks a value and fails on the first `NaN` or infinity
struct FiniteFloats;

impl FiniteFloats {
    fn check(v: f64) -> Result<(), serde_json::Error> {
        if v.is_finite() {
            Ok(())
        } else {
            Err(ser::Error::custom(format!(
                "non-finite number {} has no JSON representation",
                v
            )))
        }
    }
}

impl ser::Serializer for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_f32(self, v: f32) -> Result<(), Self::Error> {
        Self::check(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), Self::Error> {
        Self::check(v)
    }

    fn serialize_bool(self, _: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i128(self, _: i128) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u128(self, _: u128) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_char(self, _: char) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_str(self, _: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_none(self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Self::Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Self::Error> {
        key.serialize(FiniteFloats)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// `plugin_config.json` -> `plugin_config.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    type Doc = BTreeMap<String, u32>;

    fn document(temp: &TempDir) -> JsonDocument<Doc> {
        JsonDocument::new(temp.path().join("doc.json"))
    }

    #[test]
    fn test_missing_file_loads_default() {
        let temp = TempDir::new().unwrap();
        let doc = document(&temp);
        assert!(doc.load().unwrap().is_empty());
        assert!(!doc.path().exists());
    }

    #[test]
    fn test_update_creates_pretty_printed_file() {
        let temp = TempDir::new().unwrap();
        let doc = document(&temp);

        doc.update(|d| d.insert("a".to_string(), 1)).unwrap();

        let raw = std::fs::read_to_string(doc.path()).unwrap();
        assert_eq!(raw, "{\n  \"a\": 1\n}\n");
    }

    #[test]
    fn test_update_is_read_modify_write() {
        let temp = TempDir::new().unwrap();
        let doc = document(&temp);

        doc.update(|d| d.insert("a".to_string(), 1)).unwrap();
        doc.update(|d| d.insert("b".to_string(), 2)).unwrap();

        let loaded = doc.load().unwrap();
        assert_eq!(loaded.get("a"), Some(&1));
        assert_eq!(loaded.get("b"), Some(&2));
    }

    #[test]
    fn test_corrupt_file_is_backed_up_on_write() {
        let temp = TempDir::new().unwrap();
        let doc = document(&temp);
        std::fs::write(doc.path(), "{ not json").unwrap();

        assert!(doc.load().unwrap().is_empty());

        doc.update(|d| d.insert("fresh".to_string(), 7)).unwrap();

        let backup = std::fs::read_to_string(doc.corrupt_backup_path()).unwrap();
        assert_eq!(backup, "{ not json");
        assert_eq!(doc.load().unwrap().get("fresh"), Some(&7));
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(to_json_value(&bad), Err(StoreError::Serialization(_))));
        }
        let nested = serde_json::json!({ "ok": 1.5 });
        assert_eq!(to_json_value(&nested).unwrap(), nested);

        let mut map = BTreeMap::new();
        map.insert("deep", vec![Some(1.0f32), Some(f32::NAN)]);
        assert!(to_json_value(&map).is_err());
    }

    #[test]
    fn test_held_lock_times_out() {
        let temp = TempDir::new().unwrap();
        let doc = document(&temp).with_lock_timeout(Duration::from_millis(50));

        let holder = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(doc.lock_path())
            .unwrap();
        holder.lock_exclusive().unwrap();

        let err = doc.update(|d| d.insert("a".to_string(), 1)).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
        assert!(!doc.path().exists());

        holder.unlock().unwrap();
        doc.update(|d| d.insert("a".to_string(), 1)).unwrap();
        assert_eq!(doc.load().unwrap().get("a"), Some(&1));
    }

    #[test]
    fn test_sibling_paths() {
        let path = PathBuf::from("/tmp/cfg/plugin_config.json");
        assert_eq!(
            sibling(&path, "lock"),
            PathBuf::from("/tmp/cfg/plugin_config.json.lock")
        );
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_writes() {
        let temp = TempDir::new().unwrap();
        let doc = std::sync::Arc::new(document(&temp));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let doc = doc.clone();
                std::thread::spawn(move || {
                    doc.update(|d| d.insert(format!("k{}", i), i)).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(doc.load().unwrap().len(), 8);
    }
}
