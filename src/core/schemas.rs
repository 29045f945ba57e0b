//! Centralized database schema definitions.
//!
//! plangate keeps a single SQLite database ("tasks.db") holding the task
//! records and the per-session ordinal buffers.

pub const TASKS_DB_NAME: &str = "tasks.db";
pub const BROKER_EVENTS_NAME: &str = "broker.events.jsonl";
pub const TRACES_NAME: &str = "traces.jsonl";

pub const TASKS_SCHEMA_VERSION: u32 = 1;

pub const TASKS_DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

/// `search_text` backs the keyword filter's text search. The store writes
/// it with `store::search_text` so it folds case exactly like the pattern.
pub const TASKS_DB_SCHEMA_TASKS: &str = "
    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL CHECK (length(trim(title)) > 0),
        description TEXT,
        category TEXT,
        priority INTEGER NOT NULL DEFAULT 0 CHECK (priority >= 0 AND priority <= 3),
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'in_progress', 'completed')),
        scheduled_time TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT,
        search_text TEXT NOT NULL DEFAULT ''
    )
";

pub const TASKS_DB_SCHEMA_INDEX_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id)";
pub const TASKS_DB_SCHEMA_INDEX_SCHEDULED: &str =
    "CREATE INDEX IF NOT EXISTS idx_tasks_scheduled ON tasks(user_id, scheduled_time)";
pub const TASKS_DB_SCHEMA_INDEX_STATUS: &str =
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(user_id, status)";
pub const TASKS_DB_SCHEMA_INDEX_PRIORITY: &str =
    "CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks(user_id, priority)";

pub const TASKS_DB_SCHEMA_SESSIONS: &str = "
    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        ordinal_ids TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";

/// Column list shared by every task SELECT; order matches `todo::task_from_row`.
pub const TASK_COLUMNS: &str = "id, user_id, title, description, category, priority, status, scheduled_time, created_at, updated_at, completed_at";
