//! SQLite adapter for ExecutionStore
//!
//! One `executions` table; logs, request and result are stored as JSON text.
//! Every mutation is a read-modify-write inside an immediate transaction so
//! the record state machine (`ExecutionRecord::append_logs` / `finish`) is the
//! single source of truth for both adapters.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::domain::{ExecutionRecord, ExecutionStatus, ExecutionStore};
use crate::{Result, StorageError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS executions (
    id            TEXT PRIMARY KEY NOT NULL,
    status        TEXT NOT NULL DEFAULT 'running',
    logs          TEXT NOT NULL DEFAULT '[]',
    request_json  TEXT NOT NULL,
    result_json   TEXT,
    started_at    TEXT NOT NULL,
    finished_at   TEXT,
    submitted_by  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status);
"#;

const SELECT_RECORD: &str = "SELECT id, status, logs, request_json, result_json, started_at, finished_at, submitted_by \
     FROM executions WHERE id = ?1";

/// SQLite-backed execution store
#[derive(Clone)]
pub struct SqliteExecutionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteExecutionStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!("Opened execution database at {}", path.as_ref().display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection off the async executor
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::database(format!("Blocking task failed: {}", e)))?
    }
}

struct RawRow {
    id: String,
    status: String,
    logs: String,
    request_json: String,
    result_json: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    submitted_by: String,
}

impl RawRow {
    fn into_record(self) -> Result<ExecutionRecord> {
        Ok(ExecutionRecord {
            id: self.id,
            status: ExecutionStatus::parse(&self.status)?,
            logs: serde_json::from_str(&self.logs)?,
            request_payload: serde_json::from_str(&self.request_json)?,
            result_payload: self
                .result_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            started_at: self.started_at,
            finished_at: self.finished_at,
            submitted_by: self.submitted_by,
        })
    }
}

fn load(conn: &Connection, id: &str) -> Result<Option<ExecutionRecord>> {
    let raw = conn
        .query_row(SELECT_RECORD, params![id], |row| {
            Ok(RawRow {
                id: row.get(0)?,
                status: row.get(1)?,
                logs: row.get(2)?,
                request_json: row.get(3)?,
                result_json: row.get(4)?,
                started_at: row.get(5)?,
                finished_at: row.get(6)?,
                submitted_by: row.get(7)?,
            })
        })
        .optional()?;

    raw.map(RawRow::into_record).transpose()
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn create(
        &self,
        id: &str,
        request: &serde_json::Value,
        submitted_by: &str,
    ) -> Result<ExecutionRecord> {
        let record = ExecutionRecord::new(id, request.clone(), submitted_by);
        let request_json = serde_json::to_string(&record.request_payload)?;

        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if load(&tx, &record.id)?.is_some() {
                return Err(StorageError::already_exists(&record.id));
            }
            tx.execute(
                "INSERT INTO executions (id, status, logs, request_json, started_at, submitted_by) \
                 VALUES (?1, ?2, '[]', ?3, ?4, ?5)",
                params![
                    record.id,
                    record.status.as_str(),
                    request_json,
                    record.started_at,
                    record.submitted_by
                ],
            )?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn append_logs(&self, id: &str, lines: &[String]) -> Result<()> {
        let id = id.to_string();
        let lines = lines.to_vec();

        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut record = load(&tx, &id)?.ok_or_else(|| StorageError::not_found(&id))?;
            record.append_logs(&lines)?;
            tx.execute(
                "UPDATE executions SET logs = ?1 WHERE id = ?2",
                params![serde_json::to_string(&record.logs)?, id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn write_result(
        &self,
        id: &str,
        result: serde_json::Value,
        status: ExecutionStatus,
    ) -> Result<()> {
        let id = id.to_string();

        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut record = load(&tx, &id)?.ok_or_else(|| StorageError::not_found(&id))?;
            record.finish(result, status)?;
            tx.execute(
                "UPDATE executions SET status = ?1, result_json = ?2, finished_at = ?3 WHERE id = ?4",
                params![
                    record.status.as_str(),
                    serde_json::to_string(&record.result_payload)?,
                    record.finished_at,
                    id
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<ExecutionRecord>> {
        let id = id.to_string();
        self.blocking(move |conn| load(conn, &id)).await
    }
}
