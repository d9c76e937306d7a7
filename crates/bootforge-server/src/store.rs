//! Durable key-value store
//!
//! An in-memory map of string keys to JSON values, mirrored to a single
//! file on every mutation. The file always holds a complete snapshot:
//! writers stage the new snapshot in a temporary file in the same directory
//! and atomically rename it over the target, so a failed persist never
//! leaves a torn file behind.
//!
//! The store's writer lock is the single serialization point for all
//! provisioning state. Mutations hold it across the persist; the persist is
//! one bounded JSON encode plus fsync plus rename, so nothing here ever
//! blocks on another node's progress.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockWriteGuard};
use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode value: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("stored value does not match requested shape: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("store lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// File-backed key-value store
///
/// Values are deep-copied through JSON on the way in and out, so callers
/// never alias stored state. Readers proceed concurrently; a writer
/// excludes everything for the duration of its mutation and persist.
pub struct FileStore {
    data: RwLock<HashMap<String, Value>>,
    path: PathBuf,
}

impl FileStore {
    /// Open a store backed by the given file.
    ///
    /// A missing file yields an empty store. Any other read or decode
    /// failure is an error: the caller must not run against a store it
    /// cannot trust.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(StoreError::Deserialize)?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };
        Ok(Self {
            data: RwLock::new(data),
            path,
        })
    }

    /// Insert or replace a value and persist the full snapshot.
    ///
    /// On persist failure both the map and the file keep their previous
    /// contents.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value).map_err(StoreError::Serialize)?;
        let mut data = self.write_guard()?;
        let previous = data.insert(key.to_string(), encoded);
        if let Err(e) = persist(&self.path, &data) {
            match previous {
                Some(v) => data.insert(key.to_string(), v),
                None => data.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Insert a value only if the key is absent; returns whether it was
    /// inserted.
    ///
    /// Presence check and insert happen under one writer acquisition, so
    /// concurrent callers racing on a new key see exactly one `true`.
    pub fn insert_if_absent<T: Serialize>(&self, key: &str, value: &T) -> Result<bool> {
        let encoded = serde_json::to_value(value).map_err(StoreError::Serialize)?;
        let mut data = self.write_guard()?;
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), encoded);
        if let Err(e) = persist(&self.path, &data) {
            data.remove(key);
            return Err(e);
        }
        Ok(true)
    }

    /// Get a key, decoded into the requested shape. Absent keys are
    /// `Ok(None)`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let data = self.data.read().map_err(|_| StoreError::LockPoisoned)?;
        match data.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(StoreError::Deserialize),
            None => Ok(None),
        }
    }

    /// Remove a key if present (absent is not an error) and persist.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut data = self.write_guard()?;
        let previous = match data.remove(key) {
            Some(v) => v,
            None => return Ok(()),
        };
        if let Err(e) = persist(&self.path, &data) {
            data.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    /// Decode every key starting with `prefix`. Iteration order is
    /// unspecified.
    pub fn scan_prefix<T: DeserializeOwned>(&self, prefix: &str) -> Result<HashMap<String, T>> {
        let data = self.data.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut out = HashMap::new();
        for (key, value) in data.iter() {
            if key.starts_with(prefix) {
                let decoded =
                    serde_json::from_value(value.clone()).map_err(StoreError::Deserialize)?;
                out.insert(key.clone(), decoded);
            }
        }
        Ok(out)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_guard(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Value>>> {
        self.data.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Write the full snapshot next to the target and rename over it.
fn persist(path: &Path, data: &HashMap<String, Value>) -> Result<()> {
    let encoded = serde_json::to_vec_pretty(data).map_err(StoreError::Serialize)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    let tmp = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{}.tmp", file_name));

    let mut file = File::create(&tmp)?;
    file.write_all(&encoded)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
    struct Sample {
        label: String,
        count: u32,
    }

    fn sample() -> Sample {
        Sample {
            label: "one".to_string(),
            count: 1,
        }
    }

    #[test]
    fn test_set_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();

        store.set("k", &sample()).unwrap();
        let got: Sample = store.get("k").unwrap().unwrap();
        assert_eq!(got, sample());
    }

    #[test]
    fn test_get_absent_is_none() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();

        let got: Option<Sample> = store.get("missing").unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn test_get_wrong_shape_errors() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();

        store.set("k", &"just a string").unwrap();
        let got = store.get::<Sample>("k");
        assert!(matches!(got, Err(StoreError::Deserialize(_))));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set("k", &sample()).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        let got: Sample = store.get("k").unwrap().unwrap();
        assert_eq!(got, sample());
    }

    #[test]
    fn test_delete_absent_is_ok() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();
        store.delete("never-existed").unwrap();
    }

    #[test]
    fn test_delete_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        store.set("k", &sample()).unwrap();
        store.delete("k").unwrap();

        let store = FileStore::open(&path).unwrap();
        let got: Option<Sample> = store.get("k").unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn test_insert_if_absent() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();

        assert!(store.insert_if_absent("k", &sample()).unwrap());
        let other = Sample {
            label: "two".to_string(),
            count: 2,
        };
        assert!(!store.insert_if_absent("k", &other).unwrap());

        // the losing insert did not overwrite
        let got: Sample = store.get("k").unwrap().unwrap();
        assert_eq!(got, sample());
    }

    #[test]
    fn test_scan_prefix() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();

        store.set("node-a", &sample()).unwrap();
        store.set("node-b", &sample()).unwrap();
        store.set("setting-x", &"other").unwrap();

        let nodes: HashMap<String, Sample> = store.scan_prefix("node-").unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.contains_key("node-a"));
        assert!(nodes.contains_key("node-b"));
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nonexistent.json")).unwrap();
        let all: HashMap<String, Sample> = store.scan_prefix("").unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn test_open_corrupt_file_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::Deserialize(_))
        ));
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let dir = tempdir().unwrap();
        // parent directory does not exist, so every persist fails
        let store = FileStore::open(dir.path().join("gone").join("store.json")).unwrap();

        assert!(matches!(
            store.set("k", &sample()),
            Err(StoreError::Io(_))
        ));
        let got: Option<Sample> = store.get("k").unwrap();
        assert!(got.is_none(), "failed set must not leave the value behind");
    }

    #[test]
    fn test_stray_tmp_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        store.set("k", &sample()).unwrap();
        let good = fs::read(&path).unwrap();

        // a crash between tmp write and rename leaves a stray tmp behind
        fs::write(dir.path().join("store.json.tmp"), b"garbage").unwrap();

        let store = FileStore::open(&path).unwrap();
        let got: Sample = store.get("k").unwrap().unwrap();
        assert_eq!(got, sample());
        assert_eq!(fs::read(&path).unwrap(), good, "original file untouched");
    }

    #[test]
    fn test_no_aliasing_with_caller() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();

        let mut value = sample();
        store.set("k", &value).unwrap();
        value.count = 99;

        let got: Sample = store.get("k").unwrap().unwrap();
        assert_eq!(got.count, 1);
    }
}
