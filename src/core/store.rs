//! Storage contract for task records.
//!
//! The engine only talks to storage through [`TaskStore`]. Every method is
//! scoped by a [`UserScope`], which the caller obtains from its auth layer and
//! never from a plan.

use crate::core::error::PlanGateError;
use crate::engine::query::ParameterizedQuery;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authenticated user id. Injected by the caller, never read from a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserScope(String);

impl UserScope {
    pub fn new(user_id: impl Into<String>) -> Result<Self, PlanGateError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(PlanGateError::ValidationError(
                "user id must not be empty".to_string(),
            ));
        }
        Ok(Self(user_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Completed];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" | "in progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: i64,
    pub status: String,
    pub scheduled_time: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// Case folding shared by the stored `search_text` column and keyword
/// patterns. Both sides must fold identically, including non-ASCII.
pub fn fold_text(s: &str) -> String {
    s.to_lowercase()
}

/// Value of the `search_text` column for a record.
pub fn search_text(title: &str, description: Option<&str>, category: Option<&str>) -> String {
    fold_text(&format!(
        "{title} {} {}",
        description.unwrap_or_default(),
        category.unwrap_or_default()
    ))
}

/// Fully validated insert payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: i64,
    pub status: TaskStatus,
    pub scheduled_time: Option<String>,
}

/// Three-state field change for updates: leave as is, null out, or set.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> FieldUpdate<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, FieldUpdate::Keep)
    }
}

/// Fully validated update payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: FieldUpdate<String>,
    pub category: FieldUpdate<String>,
    pub priority: Option<i64>,
    pub status: Option<TaskStatus>,
    pub scheduled_time: FieldUpdate<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_keep()
            && self.category.is_keep()
            && self.priority.is_none()
            && self.status.is_none()
            && self.scheduled_time.is_keep()
    }
}

/// The storage collaborator. Atomicity is per call, never across calls.
pub trait TaskStore: Send + Sync {
    fn insert(&self, user: &UserScope, task: &NewTask) -> Result<Task, PlanGateError>;

    fn get(&self, user: &UserScope, id: &str) -> Result<Option<Task>, PlanGateError>;

    /// Runs a query produced by `QueryBuilder`. The query carries its own
    /// user-scope predicate.
    fn select(&self, query: &ParameterizedQuery) -> Result<Vec<Task>, PlanGateError>;

    /// Returns `None` when no row with `id` exists in the user's scope.
    fn update(&self, user: &UserScope, id: &str, patch: &TaskPatch) -> Result<Option<Task>, PlanGateError>;

    /// Deletes the given ids within scope and returns the number removed.
    fn delete(&self, user: &UserScope, ids: &[String]) -> Result<usize, PlanGateError>;
}
