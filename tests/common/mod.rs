#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use plangate::core::error::PlanGateError;
use plangate::core::store::{NewTask, Task, TaskPatch, TaskStore, UserScope};
use plangate::core::time::{self, Clock, FixedClock};
use plangate::core::todo::SqliteTaskStore;
use plangate::engine::coordinator::{CoordinatorConfig, ExecutionCoordinator};
use plangate::engine::query::ParameterizedQuery;
use plangate::engine::session::Session;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use tempfile::TempDir;

pub const NOW: &str = "2026-10-16T12:00:00Z";

pub fn now() -> DateTime<Utc> {
    time::parse_datetime(NOW).expect("fixed now")
}

/// Advances one second per call so insertion order is visible in
/// `created_at`.
pub struct TickingClock {
    base: DateTime<Utc>,
    ticks: AtomicI64,
}

impl TickingClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            ticks: AtomicI64::new(0),
        }
    }
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        let n = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.base + Duration::seconds(n)
    }
}

/// Wraps a real store and counts every call that reaches it.
pub struct CountingStore {
    pub inner: SqliteTaskStore,
    calls: AtomicUsize,
    selects: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn selects(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl TaskStore for CountingStore {
    fn insert(&self, user: &UserScope, task: &NewTask) -> Result<Task, PlanGateError> {
        self.hit();
        self.inner.insert(user, task)
    }

    fn get(&self, user: &UserScope, id: &str) -> Result<Option<Task>, PlanGateError> {
        self.hit();
        self.inner.get(user, id)
    }

    fn select(&self, query: &ParameterizedQuery) -> Result<Vec<Task>, PlanGateError> {
        self.hit();
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.inner.select(query)
    }

    fn update(&self, user: &UserScope, id: &str, patch: &TaskPatch) -> Result<Option<Task>, PlanGateError> {
        self.hit();
        self.inner.update(user, id, patch)
    }

    fn delete(&self, user: &UserScope, ids: &[String]) -> Result<usize, PlanGateError> {
        self.hit();
        self.inner.delete(user, ids)
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub store: Arc<CountingStore>,
    pub coordinator: ExecutionCoordinator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    pub fn with_config(config: CoordinatorConfig) -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let inner = SqliteTaskStore::open(
            &tmp.path().join("tasks.db"),
            None,
            Arc::new(TickingClock::new(now())),
        )
        .expect("open store");
        let store = Arc::new(CountingStore {
            inner,
            calls: AtomicUsize::new(0),
            selects: AtomicUsize::new(0),
        });
        let coordinator = ExecutionCoordinator::new(
            store.clone(),
            Arc::new(FixedClock(now())),
            config,
        );
        Self {
            tmp,
            store,
            coordinator,
        }
    }

    pub fn session(&self, user: &str) -> Session {
        Session::new(UserScope::new(user).expect("user"), "s-1")
    }

    /// All rows for `user`, bypassing the engine.
    pub fn rows(&self, user: &str) -> Vec<Task> {
        let conn = rusqlite::Connection::open(self.tmp.path().join("tasks.db")).expect("open");
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, title, description, category, priority, status, scheduled_time, created_at, updated_at, completed_at
                 FROM tasks WHERE user_id = ?1 ORDER BY rowid",
            )
            .expect("prepare");
        stmt.query_map([user], |row| {
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
        })
        .expect("query")
        .collect::<Result<Vec<_>, _>>()
        .expect("rows")
    }
}
