//! Config Store Integration Tests
//!
//! Persistence behavior of the plugin and user config documents.

mod common;

use std::sync::Arc;
use std::thread;

use serde::{Serialize, Serializer};
use serde_json::json;
use tempfile::TempDir;

use common::plugin_store;
use voxdiary::core::{JsonDocument, PluginDocument, StoreError, UserConfig, UserConfigStore};

/// Always fails to serialize
struct Unserializable;

impl Serialize for Unserializable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("cannot encode this"))
    }
}

#[test]
fn test_plugin_config_round_trip() {
    let temp = TempDir::new().unwrap();
    let store = plugin_store(&temp);
    let blob = json!({ "base_url": "https://journiv.local", "journal_id": "5", "tags": ["a", "b"] });

    store.save_user_config(42, "journiv", &blob).unwrap();

    // A fresh handle reads from disk, not from memory
    let reopened = plugin_store(&temp);
    assert_eq!(reopened.load_user_config(42, "journiv").unwrap(), Some(blob));
    assert_eq!(reopened.load_user_config(42, "other").unwrap(), None);
    assert_eq!(reopened.load_user_config(43, "journiv").unwrap(), None);
}

#[test]
fn test_unserializable_value_leaves_file_untouched() {
    let temp = TempDir::new().unwrap();
    let store = plugin_store(&temp);
    store.save_user_config(1, "journiv", &json!({ "k": "v" })).unwrap();
    let before = std::fs::read(store.path()).unwrap();

    let err = store
        .save_user_config(1, "journiv", &Unserializable)
        .unwrap_err();

    assert!(matches!(err, StoreError::Serialization(_)));
    assert_eq!(std::fs::read(store.path()).unwrap(), before);
}

#[test]
fn test_non_finite_numbers_are_rejected_before_writing() {
    let temp = TempDir::new().unwrap();
    let store = plugin_store(&temp);
    store.save_user_config(1, "journiv", &json!({ "k": "v" })).unwrap();
    let before = std::fs::read(store.path()).unwrap();

    let err = store.save_user_config(1, "journiv", &f64::NAN).unwrap_err();
    assert!(matches!(err, StoreError::Serialization(_)));

    let err = store
        .save_user_config(2, "journiv", &vec![f64::INFINITY, 1.5])
        .unwrap_err();
    assert!(matches!(err, StoreError::Serialization(_)));

    assert_eq!(std::fs::read(store.path()).unwrap(), before);
    assert_eq!(store.load_user_config(2, "journiv").unwrap(), None);

    // Finite floats still go through
    store.save_user_config(2, "journiv", &vec![1.5, -0.25]).unwrap();
    assert_eq!(
        store.load_user_config(2, "journiv").unwrap(),
        Some(json!([1.5, -0.25]))
    );
}

#[test]
fn test_missing_file_loads_as_empty() {
    let temp = TempDir::new().unwrap();
    let store = plugin_store(&temp);

    assert!(!store.path().exists());
    assert!(store.load_all_configs().unwrap().is_empty());
    assert_eq!(store.load_user_config(1, "journiv").unwrap(), None);
    assert_eq!(store.scoped("journiv").load_config(1).unwrap(), None);
}

#[test]
fn test_corrupt_file_loads_as_empty_and_is_backed_up() {
    let temp = TempDir::new().unwrap();
    let store = plugin_store(&temp);
    std::fs::write(store.path(), "{ this is not json").unwrap();

    assert!(store.load_all_configs().unwrap().is_empty());
    assert_eq!(store.load_user_config(1, "journiv").unwrap(), None);

    store.save_user_config(1, "journiv", &json!({ "k": 1 })).unwrap();

    let backup = JsonDocument::<PluginDocument>::new(store.path()).corrupt_backup_path();
    assert_eq!(std::fs::read_to_string(backup).unwrap(), "{ this is not json");
    assert_eq!(
        store.load_user_config(1, "journiv").unwrap(),
        Some(json!({ "k": 1 }))
    );
}

#[test]
fn test_concurrent_writers_do_not_lose_each_others_updates() {
    let temp = TempDir::new().unwrap();
    let store = plugin_store(&temp);

    let writers: Vec<_> = (0..8i64)
        .map(|user_id| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for round in 0..10 {
                    store
                        .save_user_config(user_id, "journiv", &json!({ "round": round }))
                        .unwrap();
                    store
                        .save_user_config(user_id, "feedback", &json!({ "user": user_id }))
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let doc = store.load_all_configs().unwrap();
    assert_eq!(doc.len(), 8);
    for user_id in 0..8i64 {
        let plugins = &doc[&user_id.to_string()];
        assert_eq!(plugins["journiv"], json!({ "round": 9 }));
        assert_eq!(plugins["feedback"], json!({ "user": user_id }));
    }
}

#[test]
fn test_user_settings_are_separate_from_plugin_config() {
    let temp = TempDir::new().unwrap();
    let plugins = plugin_store(&temp);
    let users = UserConfigStore::new(temp.path().join("user_config.json"));

    plugins.save_user_config(5, "journiv", &json!({ "k": 1 })).unwrap();
    users.set_ai_enabled(5, false).unwrap();
    users.set_reminder(5, Some("21:30".to_string())).unwrap();

    assert_eq!(
        users.load(5).unwrap(),
        Some(UserConfig {
            ai_enabled: false,
            reminder_time: Some("21:30".to_string()),
        })
    );
    assert_eq!(plugins.load_user_config(5, "journiv").unwrap(), Some(json!({ "k": 1 })));
    assert_eq!(users.users_with_reminders().unwrap(), vec![(5, "21:30".to_string())]);
}

#[test]
fn test_one_bad_user_record_does_not_wipe_the_others() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("user_config.json");
    std::fs::write(
        &path,
        r#"{
            "42": { "ai_enabled": true, "reminder_time": "07:30" },
            "7": { "reminder_time": "09:00" },
            "9": "not a record"
        }"#,
    )
    .unwrap();
    let users = UserConfigStore::new(&path);

    assert_eq!(
        users.load(42).unwrap(),
        Some(UserConfig {
            ai_enabled: true,
            reminder_time: Some("07:30".to_string()),
        })
    );

    users.set_reminder(43, Some("08:00".to_string())).unwrap();

    let reopened = UserConfigStore::new(&path);
    assert!(reopened.load(42).unwrap().is_some());
    assert!(reopened.load(7).unwrap().unwrap().ai_enabled);
    assert_eq!(
        reopened.users_with_reminders().unwrap(),
        vec![
            (7, "09:00".to_string()),
            (42, "07:30".to_string()),
            (43, "08:00".to_string()),
        ]
    );
    assert!(!JsonDocument::<PluginDocument>::new(&path)
        .corrupt_backup_path()
        .exists());
}
