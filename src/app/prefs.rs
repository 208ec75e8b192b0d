//! Flat key-value mirror shared with the UI and the boot dispatcher.
//!
//! The orchestrator writes through to this file for cross-process visibility; it is
//! read back as authoritative only at cold start. Each write reloads the file and
//! replaces a single key, so concurrent writers resolve as last-write-wins per key.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::app::error::AppError;

#[derive(Debug, Clone)]
pub struct PrefsStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl PrefsStore {
    /// Opens the store; a missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = read_values(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "failed to read prefs, starting empty");
            BTreeMap::new()
        });
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the file. A missing file reads as empty; an unreadable or corrupt one
    /// is an error and leaves the in-memory values untouched.
    pub fn reload(&mut self, trace_id: &str) -> Result<(), AppError> {
        let values = read_values(&self.path).map_err(|err| {
            AppError::system(
                format!("Failed to read prefs {}: {err}", self.path.display()),
                trace_id,
            )
        })?;
        self.values = values;
        Ok(())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.values
            .get(key)
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn put_bool(&mut self, key: &str, value: bool, trace_id: &str) -> Result<(), AppError> {
        self.put(key, Value::Bool(value), trace_id)
    }

    pub fn put_i64(&mut self, key: &str, value: i64, trace_id: &str) -> Result<(), AppError> {
        self.put(key, Value::from(value), trace_id)
    }

    pub fn put_string(&mut self, key: &str, value: &str, trace_id: &str) -> Result<(), AppError> {
        self.put(key, Value::String(value.to_string()), trace_id)
    }

    /// Applies several boolean writes with one reload and one file replace.
    pub fn put_bools(&mut self, entries: &[(&str, bool)], trace_id: &str) -> Result<(), AppError> {
        if entries.is_empty() {
            return Ok(());
        }
        // Never write back over a file we could not read: other writers' keys would be lost.
        self.reload(trace_id)?;
        for (key, value) in entries {
            self.values.insert((*key).to_string(), Value::Bool(*value));
        }
        self.persist(trace_id)
    }

    fn put(&mut self, key: &str, value: Value, trace_id: &str) -> Result<(), AppError> {
        self.reload(trace_id)?;
        self.values.insert(key.to_string(), value);
        self.persist(trace_id)
    }

    fn persist(&self, trace_id: &str) -> Result<(), AppError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .map_err(|err| AppError::system(format!("Failed to create prefs dir: {err}"), trace_id))?;
        let payload = serde_json::to_string_pretty(&self.values)
            .map_err(|err| AppError::system(format!("Failed to serialize prefs: {err}"), trace_id))?;
        let mut temp = NamedTempFile::new_in(&parent)
            .map_err(|err| AppError::system(format!("Failed to stage prefs: {err}"), trace_id))?;
        temp.write_all(payload.as_bytes())
            .map_err(|err| AppError::system(format!("Failed to write prefs: {err}"), trace_id))?;
        temp.persist(&self.path)
            .map_err(|err| AppError::system(format!("Failed to replace prefs: {err}"), trace_id))?;
        Ok(())
    }
}

fn read_values(path: &Path) -> Result<BTreeMap<String, Value>, String> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = fs::read_to_string(path).map_err(|err| err.to_string())?;
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let value: Value = serde_json::from_str(&raw).map_err(|err| err.to_string())?;
    let Value::Object(map) = value else {
        return Err("prefs root is not an object".to_string());
    };
    // Only scalars are meaningful here; nested values from foreign writers are dropped.
    Ok(map
        .into_iter()
        .filter(|(_, value)| value.is_boolean() || value.is_number() || value.is_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_is_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PrefsStore::open(dir.path().join("prefs.json"));
        assert!(!store.get_bool("rgb_on_boot", false));
        assert_eq!(store.get_i64("led_red", 255), 255);
        assert_eq!(store.get_string("gpu_max_freq_selection"), None);
    }

    #[test]
    fn writes_are_visible_to_a_second_handle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("prefs.json");
        let mut writer = PrefsStore::open(&path);
        writer.put_bool("rgb_led_is_running", true, "t").expect("put bool");
        writer.put_i64("led_green", 12, "t").expect("put int");
        writer
            .put_string("gpu_max_freq_selection", "587", "t")
            .expect("put string");

        let reader = PrefsStore::open(&path);
        assert!(reader.get_bool("rgb_led_is_running", false));
        assert_eq!(reader.get_i64("led_green", 255), 12);
        assert_eq!(
            reader.get_string("gpu_max_freq_selection").as_deref(),
            Some("587")
        );
    }

    #[test]
    fn last_write_wins_per_key_across_handles() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs.json");
        let mut orchestrator = PrefsStore::open(&path);
        let mut ui = PrefsStore::open(&path);

        orchestrator.put_bool("min_freq_is_running", true, "t").expect("put");
        ui.put_bool("rgb_on_boot", true, "t").expect("put");
        orchestrator.put_bool("min_freq_is_running", false, "t").expect("put");

        let fresh = PrefsStore::open(&path);
        assert!(fresh.get_bool("rgb_on_boot", false));
        assert!(!fresh.get_bool("min_freq_is_running", true));
    }

    #[test]
    fn ignores_non_scalar_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs.json");
        fs::write(&path, r#"{"a": true, "b": [1, 2], "c": {"x": 1}}"#).expect("seed");
        let store = PrefsStore::open(&path);
        assert!(store.get_bool("a", false));
        assert_eq!(store.get_i64("b", -1), -1);
    }

    #[test]
    fn corrupt_file_is_never_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs.json");
        let mut store = PrefsStore::open(&path);
        store.put_bool("rgb_on_boot", true, "t1").expect("seed");

        fs::write(&path, "{\"rgb_on_boot\": tru").expect("corrupt");
        let err = store
            .put_bool("min_freq_is_running", true, "t2")
            .expect_err("unreadable file");
        assert_eq!(err.trace_id, "t2");
        assert_eq!(err.code, crate::app::error::ERR_SYSTEM);
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            "{\"rgb_on_boot\": tru"
        );
        assert!(store
            .put_bools(&[("power_led_is_running", false)], "t3")
            .is_err());
    }
}
