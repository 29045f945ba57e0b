use crate::core::db;
use crate::core::error;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// The DB Broker is the single entry point for task-store connections.
///
/// Reads open a fresh connection and run concurrently under WAL. Writes are
/// serialized through one in-process lock per broker. When an audit path is
/// configured every operation appends a `BrokerEvent` line. An audit append
/// failure is logged and never changes the operation's own result.
pub struct DbBroker {
    db_path: PathBuf,
    audit_log_path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub db_id: String,
    pub status: String,
}

impl DbBroker {
    pub fn new(db_path: &Path, audit_log_path: Option<PathBuf>) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            audit_log_path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run a read-only closure on a fresh connection.
    pub fn with_conn<F, R>(&self, actor: &str, op_name: &str, f: F) -> Result<R, error::PlanGateError>
    where
        F: FnOnce(&Connection) -> Result<R, error::PlanGateError>,
    {
        let conn = db::db_connect(&self.db_path)?;
        let result = f(&conn);
        self.audit(actor, op_name, result.is_ok());
        result
    }

    /// Run a mutating closure inside one transaction, serialized with every
    /// other write through this broker.
    pub fn with_write<F, R>(&self, actor: &str, op_name: &str, f: F) -> Result<R, error::PlanGateError>
    where
        F: FnOnce(&Connection) -> Result<R, error::PlanGateError>,
    {
        let _lock = self.write_lock.lock().map_err(|_| {
            error::PlanGateError::ConstraintViolation("broker write lock poisoned".to_string())
        })?;
        let mut conn = db::db_connect(&self.db_path)?;
        let tx = conn.transaction()?;
        let result = f(&tx);
        let result = match result {
            Ok(value) => tx.commit().map(|_| value).map_err(error::classify_storage),
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        };
        self.audit(actor, op_name, result.is_ok());
        result
    }

    fn audit(&self, actor: &str, op: &str, ok: bool) {
        if let Err(err) = self.log_event(actor, op, ok) {
            warn!(actor, op, detail = %err, "broker audit append failed");
        }
    }

    fn log_event(&self, actor: &str, op: &str, ok: bool) -> Result<(), error::PlanGateError> {
        let Some(path) = &self.audit_log_path else {
            return Ok(());
        };
        let db_id = self
            .db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            op: op.to_string(),
            db_id,
            status: if ok { "success" } else { "error" }.to_string(),
        };

        let mut f = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(f, "{}", serde_json::to_string(&ev)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn failed_write_rolls_back_and_is_audited() {
        let tmp = tempdir().unwrap();
        let audit = tmp.path().join("broker.events.jsonl");
        let broker = DbBroker::new(&tmp.path().join("t.db"), Some(audit.clone()));

        broker
            .with_write("u1", "setup", |conn| {
                conn.execute("CREATE TABLE t (v INTEGER NOT NULL)", [])?;
                Ok(())
            })
            .unwrap();
        let res: Result<(), _> = broker.with_write("u1", "insert", |conn| {
            conn.execute("INSERT INTO t (v) VALUES (1)", [])?;
            Err(error::PlanGateError::ValidationError("stop".into()))
        });
        assert!(res.is_err());

        let count: i64 = broker
            .with_conn("u1", "count", |conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);

        let lines: Vec<BrokerEvent> = std::fs::read_to_string(&audit)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].op, "insert");
        assert_eq!(lines[1].status, "error");
    }

    #[test]
    fn unwritable_audit_log_keeps_committed_result() {
        let tmp = tempdir().unwrap();
        let audit = tmp.path().join("audit");
        std::fs::create_dir(&audit).unwrap();
        let broker = DbBroker::new(&tmp.path().join("t.db"), Some(audit));

        broker
            .with_write("u1", "setup", |conn| {
                conn.execute("CREATE TABLE t (v INTEGER NOT NULL)", [])?;
                Ok(())
            })
            .unwrap();
        let inserted = broker.with_write("u1", "insert", |conn| {
            Ok(conn.execute("INSERT INTO t (v) VALUES (7)", [])?)
        });
        assert_eq!(inserted.unwrap(), 1);

        let v: i64 = broker
            .with_conn("u1", "read", |conn| {
                Ok(conn.query_row("SELECT v FROM t", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(v, 7);
    }
}
