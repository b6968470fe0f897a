use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Which of the two collections a store operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Habit,
    Task,
}

impl RecordKind {
    /// File holding this kind's collection in the file-backed store.
    pub fn file_name(self) -> &'static str {
        match self {
            RecordKind::Habit => "habits.json",
            RecordKind::Task => "tasks.json",
        }
    }

    /// Fixed key holding this kind's collection in the key-value store.
    pub fn storage_key(self) -> &'static str {
        match self {
            RecordKind::Habit => "simple_habits",
            RecordKind::Task => "simple_tasks",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RecordKind::Habit => "Habit",
            RecordKind::Task => "Task",
        }
    }
}

/// A record the store can hold: carries its own id and owner, and knows how
/// to construct itself from a creation payload plus a store-assigned id.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type New: DeserializeOwned + Send;

    fn kind() -> RecordKind;
    fn id(&self) -> &str;
    fn user_id(&self) -> &str;
    fn build(id: String, fields: Self::New) -> Self;
}

/// Fresh record id. ULIDs are unique and monotonic within a process, which
/// covers the "collisions negligible" contract of the original id scheme.
pub fn fresh_id() -> String {
    Ulid::new().to_string()
}

/// Recurring goal tracked by a weekly target count and a set of completion
/// dates (`YYYY-MM-DD`, each present at most once).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub goal: u32,
    // One client variant wrote `doneDates`; accepted on input, never emitted.
    #[serde(default, alias = "doneDates")]
    pub completed_dates: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewHabit {
    pub user_id: String,
    pub title: String,
    pub goal: u32,
}

impl Record for Habit {
    type New = NewHabit;

    fn kind() -> RecordKind {
        RecordKind::Habit
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn build(id: String, fields: NewHabit) -> Self {
        Habit {
            id,
            user_id: fields.user_id,
            title: fields.title,
            goal: fields.goal,
            completed_dates: Vec::new(),
        }
    }
}

/// Single to-do scheduled at a time of day. `time` is an `HH:MM` string used
/// only for lexicographic display ordering, never parsed as a real time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub time: String,
    #[serde(default, alias = "done")]
    pub completed: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewTask {
    pub user_id: String,
    pub title: String,
    pub time: String,
}

impl Record for Task {
    type New = NewTask;

    fn kind() -> RecordKind {
        RecordKind::Task
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn build(id: String, fields: NewTask) -> Self {
        Task {
            id,
            user_id: fields.user_id,
            title: fields.title,
            time: fields.time,
            completed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn habit_wire_names_are_camel_case() {
        let habit = Habit {
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            user_id: "u1".to_string(),
            title: "Read".to_string(),
            goal: 5,
            completed_dates: vec!["2026-08-26".to_string()],
        };
        let value = serde_json::to_value(&habit).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["completedDates"][0], "2026-08-26");
        assert!(value.get("user_id").is_none());
    }

    #[test]
    fn legacy_done_dates_alias_is_accepted() {
        let habit: Habit = serde_json::from_str(
            r#"{"id":"id3f9k2a","userId":"u1","title":"Run","goal":3,"doneDates":["2026-08-25"]}"#,
        )
        .unwrap();
        assert_eq!(habit.completed_dates, vec!["2026-08-25".to_string()]);
    }

    #[test]
    fn legacy_done_flag_alias_is_accepted() {
        let task: Task = serde_json::from_str(
            r#"{"id":"id9x","userId":"u1","title":"Call","time":"09:00","done":true}"#,
        )
        .unwrap();
        assert!(task.completed);
    }

    #[test]
    fn build_applies_kind_defaults() {
        let habit = Habit::build(
            fresh_id(),
            NewHabit {
                user_id: "u1".to_string(),
                title: "Read".to_string(),
                goal: 5,
            },
        );
        assert!(!habit.id.is_empty());
        assert!(habit.completed_dates.is_empty());

        let task = Task::build(
            fresh_id(),
            NewTask {
                user_id: "u1".to_string(),
                title: "Call".to_string(),
                time: "09:00".to_string(),
            },
        );
        assert!(!task.completed);
    }
}
