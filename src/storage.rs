use std::fs::{self, File};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{Record, fresh_id};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_, _))
    }
}

/// CRUD contract over one collection of records. Both backends (file-backed
/// and key-value) honor the same semantics: reads never fail on absence,
/// `update` signals NotFound, `delete` of an unknown id still succeeds.
pub trait RecordStore<T: Record>: Send + Sync {
    fn list(&self) -> Result<Vec<T>, StorageError>;

    /// Records owned by `user_id` (exact, case-sensitive match), in
    /// unspecified order.
    fn list_by_user(&self, user_id: &str) -> Result<Vec<T>, StorageError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|record| record.user_id() == user_id)
            .collect())
    }

    /// Assigns a fresh id, applies kind defaults, appends and persists.
    fn create(&self, fields: T::New) -> Result<T, StorageError>;

    /// Shallow-merges `partial` over the record with `id` (any owner) and
    /// persists. NotFound if no record matches.
    fn update(&self, id: &str, partial: &Map<String, Value>) -> Result<T, StorageError>;

    /// Removes any record with `id` and persists; no-op on an unknown id.
    fn delete(&self, id: &str) -> Result<(), StorageError>;
}

/// Overwrite only the named fields of `record`, leaving the rest untouched.
/// Values that break the record's types surface as a JSON error.
pub(crate) fn merge_partial<T: Record>(
    record: &T,
    partial: &Map<String, Value>,
) -> Result<T, StorageError> {
    let mut doc = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut doc {
        for (key, value) in partial {
            map.insert(key.clone(), value.clone());
        }
    }
    Ok(serde_json::from_value(doc)?)
}

/// Data directory when none is configured.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".habit-tracker"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// File-backed store: the whole collection lives in one pretty-printed JSON
/// array file, rewritten in full on every mutation.
///
/// The mutex serializes read-modify-write cycles within this process, so
/// concurrent handlers cannot drop each other's writes. A writer in another
/// process still races on the whole file, last write wins.
pub struct FileStore<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> FileStore<T> {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(T::kind().file_name()),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Missing file is an empty collection; an unreadable or unparseable
    /// file is an empty collection too, logged and never surfaced.
    fn load(&self) -> Vec<T> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to read store file, treating as empty"
                );
                return Vec::new();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "store file is not valid JSON, treating as empty"
                );
                Vec::new()
            }
        }
    }

    /// Write the full collection through a temp file and an atomic rename so
    /// a crash mid-write cannot leave a truncated store behind.
    fn persist(&self, records: &[T]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = self.path.with_extension("tmp");
        let mut file = File::create(&temp)?;
        let content = serde_json::to_string_pretty(records)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(temp, &self.path)?;
        Ok(())
    }
}

impl<T: Record> RecordStore<T> for FileStore<T> {
    fn list(&self) -> Result<Vec<T>, StorageError> {
        let _guard = self.guard();
        Ok(self.load())
    }

    fn create(&self, fields: T::New) -> Result<T, StorageError> {
        let _guard = self.guard();
        let mut records = self.load();
        let record = T::build(fresh_id(), fields);
        records.push(record.clone());
        self.persist(&records)?;
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
        self.persist(&records)?;
        Ok(updated)
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        let _guard = self.guard();
        let mut records = self.load();
        records.retain(|record| record.id() != id);
        self.persist(&records)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::types::{Habit, NewHabit, NewTask, Task};

    fn new_habit(user_id: &str, title: &str, goal: u32) -> NewHabit {
        NewHabit {
            user_id: user_id.to_string(),
            title: title.to_string(),
            goal,
        }
    }

    #[test]
    fn missing_file_lists_empty() {
        let dir = tempdir().unwrap();
        let store: FileStore<Habit> = FileStore::new(dir.path());
        assert!(store.list().unwrap().is_empty());
        assert!(store.list_by_user("u1").unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_lists_empty() {
        let dir = tempdir().unwrap();
        let store: FileStore<Habit> = FileStore::new(dir.path());
        fs::write(store.path(), "not json{{").unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn create_assigns_id_and_defaults() {
        let dir = tempdir().unwrap();
        let store: FileStore<Habit> = FileStore::new(dir.path());
        let habit = store.create(new_habit("u1", "Read", 5)).unwrap();
        assert!(!habit.id.is_empty());
        assert_eq!(habit.user_id, "u1");
        assert_eq!(habit.title, "Read");
        assert_eq!(habit.goal, 5);
        assert!(habit.completed_dates.is_empty());
    }

    #[test]
    fn create_then_list_round_trips() {
        let dir = tempdir().unwrap();
        let store: FileStore<Habit> = FileStore::new(dir.path());
        let habit = store.create(new_habit("u1", "Read", 5)).unwrap();
        store.create(new_habit("u2", "Run", 3)).unwrap();

        let listed = store.list_by_user("u1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, habit.id);
        assert_eq!(listed[0].title, "Read");
        assert_eq!(listed[0].goal, 5);
    }

    #[test]
    fn list_by_user_is_case_sensitive() {
        let dir = tempdir().unwrap();
        let store: FileStore<Habit> = FileStore::new(dir.path());
        store.create(new_habit("u1", "Read", 5)).unwrap();
        assert!(store.list_by_user("U1").unwrap().is_empty());
        assert!(store.list_by_user("unknown").unwrap().is_empty());
    }

    #[test]
    fn update_merges_only_named_fields() {
        let dir = tempdir().unwrap();
        let store: FileStore<Task> = FileStore::new(dir.path());
        let task = store
            .create(NewTask {
                user_id: "u1".to_string(),
                title: "Call dentist".to_string(),
                time: "09:00".to_string(),
            })
            .unwrap();

        let mut partial = Map::new();
        partial.insert("completed".to_string(), json!(true));
        let updated = store.update(&task.id, &partial).unwrap();

        assert!(updated.completed);
        assert_eq!(updated.id, task.id);
        assert_eq!(updated.user_id, task.user_id);
        assert_eq!(updated.title, task.title);
        assert_eq!(updated.time, task.time);
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let dir = tempdir().unwrap();
        let store: FileStore<Habit> = FileStore::new(dir.path());
        let mut partial = Map::new();
        partial.insert("title".to_string(), json!("New"));
        let err = store.update("missing", &partial).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn delete_unknown_id_succeeds_and_changes_nothing() {
        let dir = tempdir().unwrap();
        let store: FileStore<Habit> = FileStore::new(dir.path());
        let habit = store.create(new_habit("u1", "Read", 5)).unwrap();

        store.delete("missing").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, habit.id);
        assert_eq!(listed[0].title, "Read");
    }

    #[test]
    fn delete_removes_the_record() {
        let dir = tempdir().unwrap();
        let store: FileStore<Habit> = FileStore::new(dir.path());
        let habit = store.create(new_habit("u1", "Read", 5)).unwrap();
        store.delete(&habit.id).unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn file_is_pretty_printed_json_array() {
        let dir = tempdir().unwrap();
        let store: FileStore<Habit> = FileStore::new(dir.path());
        store.create(new_habit("u1", "Read", 5)).unwrap();
        let contents = fs::read_to_string(store.path()).unwrap();
        assert!(contents.starts_with('['));
        assert!(contents.contains('\n'));
        assert!(contents.contains("\"completedDates\""));
    }

    #[test]
    fn type_breaking_partial_is_a_json_error() {
        let dir = tempdir().unwrap();
        let store: FileStore<Habit> = FileStore::new(dir.path());
        let habit = store.create(new_habit("u1", "Read", 5)).unwrap();
        let mut partial = Map::new();
        partial.insert("goal".to_string(), json!("not a number"));
        let err = store.update(&habit.id, &partial).unwrap_err();
        assert!(matches!(err, StorageError::Json(_)));
    }
}
