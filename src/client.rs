//! Blocking HTTP client for the REST surface, the server-backed `Tracker`
//! implementation.

use serde_json::json;

use crate::controller::{Tracker, today, toggled_dates};
use crate::error::{ServiceError, ServiceResult};
use crate::types::{Habit, Task};

pub struct ApiClient {
    base_url: String,
}

impl ApiClient {
    /// Accepts `host:port` or a full URL; a missing scheme defaults to http.
    pub fn new(base_url: &str) -> Self {
        let base_url = if base_url.starts_with("http") {
            base_url.to_string()
        } else {
            format!("http://{base_url}")
        };
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn call_failed(err: ureq::Error) -> ServiceError {
    match err {
        ureq::Error::Status(code, response) => {
            let message = response.into_string().unwrap_or_default();
            ServiceError::Api(format!("HTTP {code}: {message}"))
        }
        other => ServiceError::Network(other.to_string()),
    }
}

fn read_failed(err: std::io::Error) -> ServiceError {
    ServiceError::Network(format!("failed to read response: {err}"))
}

impl Tracker for ApiClient {
    fn list_habits(&self, user_id: &str) -> ServiceResult<Vec<Habit>> {
        ureq::get(&self.url(&format!("/api/habits/{user_id}")))
            .call()
            .map_err(call_failed)?
            .into_json()
            .map_err(read_failed)
    }

    fn add_habit(&self, user_id: &str, title: &str, goal: u32) -> ServiceResult<Habit> {
        ureq::post(&self.url("/api/habits"))
            .send_json(json!({ "userId": user_id, "title": title, "goal": goal }))
            .map_err(call_failed)?
            .into_json()
            .map_err(read_failed)
    }

    fn toggle_habit(&self, habit: &Habit) -> ServiceResult<Habit> {
        let dates = toggled_dates(&habit.completed_dates, &today());
        ureq::put(&self.url(&format!("/api/habits/{}", habit.id)))
            .send_json(json!({ "completedDates": dates }))
            .map_err(call_failed)?
            .into_json()
            .map_err(read_failed)
    }

    fn delete_habit(&self, id: &str) -> ServiceResult<()> {
        ureq::delete(&self.url(&format!("/api/habits/{id}")))
            .call()
            .map_err(call_failed)?;
        Ok(())
    }

    fn list_tasks(&self, user_id: &str) -> ServiceResult<Vec<Task>> {
        ureq::get(&self.url(&format!("/api/tasks/{user_id}")))
            .call()
            .map_err(call_failed)?
            .into_json()
            .map_err(read_failed)
    }

    fn add_task(&self, user_id: &str, title: &str, time: &str) -> ServiceResult<Task> {
        ureq::post(&self.url("/api/tasks"))
            .send_json(json!({ "userId": user_id, "title": title, "time": time }))
            .map_err(call_failed)?
            .into_json()
            .map_err(read_failed)
    }

    fn toggle_task(&self, task: &Task) -> ServiceResult<Task> {
        ureq::put(&self.url(&format!("/api/tasks/{}", task.id)))
            .send_json(json!({ "completed": !task.completed }))
            .map_err(call_failed)?
            .into_json()
            .map_err(read_failed)
    }

    fn delete_task(&self, id: &str) -> ServiceResult<()> {
        ureq::delete(&self.url(&format!("/api/tasks/{id}")))
            .call()
            .map_err(call_failed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_normalization() {
        let client = ApiClient::new("localhost:3000");
        assert_eq!(client.base_url, "http://localhost:3000");

        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");

        let client = ApiClient::new("https://tracker.example.com");
        assert_eq!(client.base_url, "https://tracker.example.com");
    }

    #[test]
    fn urls_join_cleanly() {
        let client = ApiClient::new("localhost:3000/");
        assert_eq!(
            client.url("/api/habits/u1"),
            "http://localhost:3000/api/habits/u1"
        );
    }
}
