use crate::core::error;
use crate::core::schemas;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT_SECS: u64 = 5;

pub fn db_connect(db_path: &Path) -> Result<Connection, error::PlanGateError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

/// Creates or upgrades the task schema. Idempotent.
pub fn ensure_schema(conn: &Connection) -> Result<(), error::PlanGateError> {
    conn.execute(schemas::TASKS_DB_SCHEMA_META, [])?;

    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let current_version: u32 = current
        .as_deref()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);

    if current_version >= schemas::TASKS_SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute(schemas::TASKS_DB_SCHEMA_TASKS, [])?;
    conn.execute(schemas::TASKS_DB_SCHEMA_INDEX_USER, [])?;
    conn.execute(schemas::TASKS_DB_SCHEMA_INDEX_SCHEDULED, [])?;
    conn.execute(schemas::TASKS_DB_SCHEMA_INDEX_STATUS, [])?;
    conn.execute(schemas::TASKS_DB_SCHEMA_INDEX_PRIORITY, [])?;
    conn.execute(schemas::TASKS_DB_SCHEMA_SESSIONS, [])?;

    conn.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [schemas::TASKS_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_schema_is_idempotent() {
        let tmp = tempdir().unwrap();
        let conn = db_connect(&tmp.path().join(schemas::TASKS_DB_NAME)).unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        let version: String = conn
            .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, schemas::TASKS_SCHEMA_VERSION.to_string());
    }
}
