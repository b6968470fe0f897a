//! localStorage-style persistence: one JSON object file of string values
//! under fixed keys, serving the same record shapes as the file-backed
//! store. Used by the local (serverless) client variant.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::storage::{RecordStore, StorageError, merge_partial};
use crate::types::{Record, fresh_id};

/// Fixed key holding the persisted user identifier.
pub const USER_KEY: &str = "simple_user";
/// Fixed key holding the theme preference ("light" / "dark").
pub const THEME_KEY: &str = "simple_theme";

/// String key-value store backed by a single JSON object file.
pub struct KvStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl KvStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("local.json"),
            lock: Mutex::new(()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> BTreeMap<String, String> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to read local store, treating as empty"
                );
                return BTreeMap::new();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "local store is not valid JSON, treating as empty"
                );
                BTreeMap::new()
            }
        }
    }

    fn persist(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = self.path.with_extension("tmp");
        let mut file = File::create(&temp)?;
        let content = serde_json::to_string_pretty(map)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(temp, &self.path)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let _guard = self.guard();
        self.load().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.guard();
        let mut map = self.load();
        map.insert(key.to_string(), value.to_string());
        self.persist(&map)
    }
}

/// Adapter exposing one key of a [`KvStore`] as a [`RecordStore`]: the
/// collection is a JSON-encoded array string under the kind's fixed key,
/// exactly the shape the browser client kept in localStorage.
pub struct KvRecordStore<T> {
    kv: Arc<KvStore>,
    // Serializes load-modify-store cycles; KvStore only guards single calls.
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> KvRecordStore<T> {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self {
            kv,
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> Vec<T> {
        let Some(raw) = self.kv.get(T::kind().storage_key()) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(
                    key = T::kind().storage_key(),
                    error = %err,
                    "stored collection is not valid JSON, treating as empty"
                );
                Vec::new()
            }
        }
    }

    fn store(&self, records: &[T]) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(records)?;
        self.kv.set(T::kind().storage_key(), &encoded)
    }
}

impl<T: Record> RecordStore<T> for KvRecordStore<T> {
    fn list(&self) -> Result<Vec<T>, StorageError> {
        let _guard = self.guard();
        Ok(self.load())
    }

    fn create(&self, fields: T::New) -> Result<T, StorageError> {
        let _guard = self.guard();
        let mut records = self.load();
        let record = T::build(fresh_id(), fields);
        records.push(record.clone());
        self.store(&records)?;
        Ok(record)
    }

    fn update(&self, id: &str, partial: &Map<String, Value>) -> Result<T, StorageError> {
        let _guard = self.guard();
        let mut records = self.load();
        let index = records
            .iter()
            .position(|record| record.id() == id)
            .ok_or_else(|| StorageError::NotFound(T::kind().label(), id.to_string()))?;
        let updated = merge_partial(&records[index], partial)?;
        records[index] = updated.clone();
        self.store(&records)?;
        Ok(updated)
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        let _guard = self.guard();
        let mut records = self.load();
        records.retain(|record| record.id() != id);
        self.store(&records)?;
        Ok(())
    }
}
