//! SQLite-backed task store.
//!
//! Every statement carries the caller's user id as a bound parameter. Writes
//! go through the broker, one transaction per call.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::{self, PlanGateError};
use crate::core::schemas;
use crate::core::store::{self, FieldUpdate, NewTask, Task, TaskPatch, TaskStatus, TaskStore, UserScope};
use crate::core::time::{self, Clock};
use crate::engine::query::ParameterizedQuery;
use crate::engine::session::{OrdinalBuffer, Session, SessionStore};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ulid::Ulid;

pub struct SqliteTaskStore {
    broker: DbBroker,
    clock: Arc<dyn Clock>,
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        priority: row.get(5)?,
        status: row.get(6)?,
        scheduled_time: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

fn fetch(conn: &Connection, user: &UserScope, id: &str) -> Result<Option<Task>, PlanGateError> {
    let sql = format!(
        "SELECT {} FROM tasks WHERE id = ?1 AND user_id = ?2",
        schemas::TASK_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![id, user.as_str()], task_from_row)
        .optional()?)
}

fn apply(update: &FieldUpdate<String>, current: Option<String>) -> Option<String> {
    match update {
        FieldUpdate::Keep => current,
        FieldUpdate::Clear => None,
        FieldUpdate::Set(v) => Some(v.clone()),
    }
}

impl SqliteTaskStore {
    /// Opens (creating if needed) the database and brings its schema up to
    /// date.
    pub fn open(
        db_path: &Path,
        audit_log: Option<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PlanGateError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let broker = DbBroker::new(db_path, audit_log);
        broker.with_write("plangate", "store.init", db::ensure_schema)?;
        Ok(Self { broker, clock })
    }

    pub fn db_path(&self) -> &Path {
        self.broker.db_path()
    }

    fn now(&self) -> String {
        time::to_storage(self.clock.now())
    }
}

impl TaskStore for SqliteTaskStore {
    fn insert(&self, user: &UserScope, task: &NewTask) -> Result<Task, PlanGateError> {
        let id = format!("task_{}", Ulid::new());
        let ts = self.now();
        let completed_at = (task.status == TaskStatus::Completed).then(|| ts.clone());
        let search = store::search_text(
            &task.title,
            task.description.as_deref(),
            task.category.as_deref(),
        );
        self.broker.with_write(user.as_str(), "task.insert", |conn| {
            conn.execute(
                "INSERT INTO tasks(id, user_id, title, description, category, priority, status, scheduled_time, created_at, updated_at, completed_at, search_text)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10, ?11)",
                params![
                    id,
                    user.as_str(),
                    task.title,
                    task.description,
                    task.category,
                    task.priority,
                    task.status.as_str(),
                    task.scheduled_time,
                    ts,
                    completed_at,
                    search,
                ],
            )
            .map_err(error::classify_storage)?;
            fetch(conn, user, &id)?
                .ok_or_else(|| PlanGateError::ConstraintViolation("inserted row vanished".into()))
        })
    }

    fn get(&self, user: &UserScope, id: &str) -> Result<Option<Task>, PlanGateError> {
        self.broker
            .with_conn(user.as_str(), "task.get", |conn| fetch(conn, user, id))
    }

    fn select(&self, query: &ParameterizedQuery) -> Result<Vec<Task>, PlanGateError> {
        self.broker.with_conn("plangate", "task.select", |conn| {
            let mut stmt = conn.prepare(query.sql())?;
            let rows = stmt
                .query_map(params_from_iter(query.params().iter()), task_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn update(&self, user: &UserScope, id: &str, patch: &TaskPatch) -> Result<Option<Task>, PlanGateError> {
        let ts = self.now();
        self.broker.with_write(user.as_str(), "task.update", |conn| {
            let Some(current) = fetch(conn, user, id)? else {
                return Ok(None);
            };
            let was_completed = current.status == TaskStatus::Completed.as_str();
            let status = patch
                .status
                .map(|s| s.as_str().to_string())
                .unwrap_or(current.status);
            let completed_at = match patch.status {
                Some(TaskStatus::Completed) if !was_completed => Some(ts.clone()),
                Some(TaskStatus::Completed) => current.completed_at.or_else(|| Some(ts.clone())),
                Some(_) => None,
                None => current.completed_at,
            };
            let title = patch.title.clone().unwrap_or(current.title);
            let description = apply(&patch.description, current.description);
            let category = apply(&patch.category, current.category);
            let search = store::search_text(&title, description.as_deref(), category.as_deref());
            conn.execute(
                "UPDATE tasks SET title = ?1, description = ?2, category = ?3, priority = ?4, status = ?5,
                        scheduled_time = ?6, updated_at = ?7, completed_at = ?8, search_text = ?9
                 WHERE id = ?10 AND user_id = ?11",
                params![
                    title,
                    description,
                    category,
                    patch.priority.unwrap_or(current.priority),
                    status,
                    apply(&patch.scheduled_time, current.scheduled_time),
                    ts,
                    completed_at,
                    search,
                    id,
                    user.as_str(),
                ],
            )
            .map_err(error::classify_storage)?;
            fetch(conn, user, id)
        })
    }

    fn delete(&self, user: &UserScope, ids: &[String]) -> Result<usize, PlanGateError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.broker.with_write(user.as_str(), "task.delete", |conn| {
            let mut stmt = conn.prepare("DELETE FROM tasks WHERE id = ?1 AND user_id = ?2")?;
            let mut removed = 0;
            for id in ids {
                removed += stmt
                    .execute(params![id, user.as_str()])
                    .map_err(error::classify_storage)?;
            }
            Ok(removed)
        })
    }
}

impl SessionStore for SqliteTaskStore {
    fn load_session(&self, user: &UserScope, session_id: &str) -> Result<Session, PlanGateError> {
        let row: Option<(String, String)> = self.broker.with_conn(user.as_str(), "session.load", |conn| {
            Ok(conn
                .query_row(
                    "SELECT user_id, ordinal_ids FROM sessions WHERE session_id = ?1",
                    params![session_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?)
        })?;
        let mut session = Session::new(user.clone(), session_id);
        if let Some((owner, ids)) = row
            && owner == user.as_str()
        {
            let ids: Vec<String> = serde_json::from_str(&ids)?;
            session.ordinals = OrdinalBuffer::from_ids(ids);
        }
        Ok(session)
    }

    fn save_session(&self, session: &Session) -> Result<(), PlanGateError> {
        let ids = serde_json::to_string(session.ordinals.ids())?;
        let ts = self.now();
        self.broker
            .with_write(session.user.as_str(), "session.save", |conn| {
                conn.execute(
                    "INSERT INTO sessions(session_id, user_id, ordinal_ids, updated_at) VALUES(?1, ?2, ?3, ?4)
                     ON CONFLICT(session_id) DO UPDATE SET
                        user_id = excluded.user_id,
                        ordinal_ids = excluded.ordinal_ids,
                        updated_at = excluded.updated_at",
                    params![session.session_id, session.user.as_str(), ids, ts],
                )?;
                Ok(())
            })
    }
}
