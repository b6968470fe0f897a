//! The client side: one canonical controller over a capability trait, with
//! the server-backed and local-store backends as interchangeable
//! implementations selected at startup.

use std::sync::Arc;

use chrono::{Local, Utc};
use serde_json::{Map, json};
use ulid::Ulid;

use crate::error::{ServiceError, ServiceResult};
use crate::local_store::{KvRecordStore, KvStore, THEME_KEY, USER_KEY};
use crate::storage::RecordStore;
use crate::types::{Habit, NewHabit, NewTask, Task};

/// Everything the controller needs from a backend.
pub trait Tracker {
    fn list_habits(&self, user_id: &str) -> ServiceResult<Vec<Habit>>;
    fn add_habit(&self, user_id: &str, title: &str, goal: u32) -> ServiceResult<Habit>;
    fn toggle_habit(&self, habit: &Habit) -> ServiceResult<Habit>;
    fn delete_habit(&self, id: &str) -> ServiceResult<()>;
    fn list_tasks(&self, user_id: &str) -> ServiceResult<Vec<Task>>;
    fn add_task(&self, user_id: &str, title: &str, time: &str) -> ServiceResult<Task>;
    fn toggle_task(&self, task: &Task) -> ServiceResult<Task>;
    fn delete_task(&self, id: &str) -> ServiceResult<()>;
}

/// Local-timezone calendar date, `YYYY-MM-DD`.
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Remove `date` if present, append it otherwise. Applying this twice with
/// the same date restores the original set.
pub fn toggled_dates(dates: &[String], date: &str) -> Vec<String> {
    if dates.iter().any(|d| d == date) {
        dates.iter().filter(|d| d.as_str() != date).cloned().collect()
    } else {
        let mut out = dates.to_vec();
        out.push(date.to_string());
        out
    }
}

/// Display order: lexicographic on the `HH:MM` string, which is
/// chronological for same-day times.
pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.time.cmp(&b.time));
}

/// Opaque owner id, generated once per installation and persisted.
pub fn generate_user_id() -> String {
    let ulid = Ulid::new().to_string();
    let suffix = ulid[ulid.len() - 6..].to_lowercase();
    format!("user_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// Backend persisting straight into the key-value store, no server involved.
pub struct LocalTracker {
    habits: KvRecordStore<Habit>,
    tasks: KvRecordStore<Task>,
}

impl LocalTracker {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self {
            habits: KvRecordStore::new(kv.clone()),
            tasks: KvRecordStore::new(kv),
        }
    }
}

impl Tracker for LocalTracker {
    fn list_habits(&self, user_id: &str) -> ServiceResult<Vec<Habit>> {
        Ok(self.habits.list_by_user(user_id)?)
    }

    fn add_habit(&self, user_id: &str, title: &str, goal: u32) -> ServiceResult<Habit> {
        Ok(self.habits.create(NewHabit {
            user_id: user_id.to_string(),
            title: title.to_string(),
            goal,
        })?)
    }

    fn toggle_habit(&self, habit: &Habit) -> ServiceResult<Habit> {
        let mut partial = Map::new();
        partial.insert(
            "completedDates".to_string(),
            json!(toggled_dates(&habit.completed_dates, &today())),
        );
        Ok(self.habits.update(&habit.id, &partial)?)
    }

    fn delete_habit(&self, id: &str) -> ServiceResult<()> {
        Ok(self.habits.delete(id)?)
    }

    fn list_tasks(&self, user_id: &str) -> ServiceResult<Vec<Task>> {
        Ok(self.tasks.list_by_user(user_id)?)
    }

    fn add_task(&self, user_id: &str, title: &str, time: &str) -> ServiceResult<Task> {
        Ok(self.tasks.create(NewTask {
            user_id: user_id.to_string(),
            title: title.to_string(),
            time: time.to_string(),
        })?)
    }

    fn toggle_task(&self, task: &Task) -> ServiceResult<Task> {
        let mut partial = Map::new();
        partial.insert("completed".to_string(), json!(!task.completed));
        Ok(self.tasks.update(&task.id, &partial)?)
    }

    fn delete_task(&self, id: &str) -> ServiceResult<()> {
        Ok(self.tasks.delete(id)?)
    }
}

/// Owns the persisted user id and the fetched collections. Every mutation
/// goes through the backend and is followed by a full re-fetch of the
/// affected list; there is no optimistic update.
pub struct Controller<T: Tracker> {
    tracker: T,
    kv: Arc<KvStore>,
    user_id: String,
    habits: Vec<Habit>,
    tasks: Vec<Task>,
}

impl<T: Tracker> Controller<T> {
    pub fn new(tracker: T, kv: Arc<KvStore>) -> ServiceResult<Self> {
        let user_id = match kv.get(USER_KEY) {
            Some(id) => id,
            None => {
                let id = generate_user_id();
                kv.set(USER_KEY, &id)?;
                id
            }
        };
        let mut controller = Self {
            tracker,
            kv,
            user_id,
            habits: Vec::new(),
            tasks: Vec::new(),
        };
        controller.refresh_habits();
        controller.refresh_tasks();
        Ok(controller)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn habits(&self) -> &[Habit] {
        &self.habits
    }

    /// Tasks in display order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// A failed fetch is logged and the list falls back to empty.
    fn refresh_habits(&mut self) {
        self.habits = match self.tracker.list_habits(&self.user_id) {
            Ok(habits) => habits,
            Err(err) => {
                tracing::error!(error = %err, "failed to load habits");
                Vec::new()
            }
        };
    }

    fn refresh_tasks(&mut self) {
        self.tasks = match self.tracker.list_tasks(&self.user_id) {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::error!(error = %err, "failed to load tasks");
                Vec::new()
            }
        };
        sort_tasks(&mut self.tasks);
    }

    /// Empty title is a silent no-op, matching the form behavior.
    pub fn add_habit(&mut self, title: &str, goal: u32) -> ServiceResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(());
        }
        self.tracker.add_habit(&self.user_id, title, goal)?;
        self.refresh_habits();
        Ok(())
    }

    pub fn toggle_habit(&mut self, id: &str) -> ServiceResult<()> {
        let Some(habit) = self.habits.iter().find(|h| h.id == id).cloned() else {
            return Err(ServiceError::NotFound("Habit", id.to_string()));
        };
        self.tracker.toggle_habit(&habit)?;
        self.refresh_habits();
        Ok(())
    }

    pub fn delete_habit(&mut self, id: &str) -> ServiceResult<()> {
        self.tracker.delete_habit(id)?;
        self.refresh_habits();
        Ok(())
    }

    /// Empty title or time is a silent no-op.
    pub fn add_task(&mut self, title: &str, time: &str) -> ServiceResult<()> {
        let title = title.trim();
        if title.is_empty() || time.trim().is_empty() {
            return Ok(());
        }
        self.tracker.add_task(&self.user_id, title, time)?;
        self.refresh_tasks();
        Ok(())
    }

    pub fn toggle_task(&mut self, id: &str) -> ServiceResult<()> {
        let Some(task) = self.tasks.iter().find(|t| t.id == id).cloned() else {
            return Err(ServiceError::NotFound("Task", id.to_string()));
        };
        self.tracker.toggle_task(&task)?;
        self.refresh_tasks();
        Ok(())
    }

    pub fn delete_task(&mut self, id: &str) -> ServiceResult<()> {
        self.tracker.delete_task(id)?;
        self.refresh_tasks();
        Ok(())
    }

    /// Flip the persisted theme preference and return the new value.
    pub fn toggle_theme(&self) -> ServiceResult<String> {
        let next = match self.kv.get(THEME_KEY).as_deref() {
            Some("dark") => "light",
            _ => "dark",
        };
        self.kv.set(THEME_KEY, next)?;
        Ok(next.to_string())
    }

    /// Plain-text view of both lists. Carries no contract.
    pub fn render(&self) -> String {
        let today = today();
        let mut out = String::new();
        out.push_str("Habits:\n");
        if self.habits.is_empty() {
            out.push_str("  (none)\n");
        }
        for habit in &self.habits {
            let mark = if habit.completed_dates.iter().any(|d| d == &today) {
                'x'
            } else {
                ' '
            };
            out.push_str(&format!(
                "  [{mark}] {} ({} days/week)  {}\n",
                habit.title, habit.goal, habit.id
            ));
        }
        out.push_str("Tasks:\n");
        if self.tasks.is_empty() {
            out.push_str("  (none)\n");
        }
        for task in &self.tasks {
            let mark = if task.completed { 'x' } else { ' ' };
            out.push_str(&format!(
                "  [{mark}] {} {}  {}\n",
                task.time, task.title, task.id
            ));
        }
        out
    }
}
