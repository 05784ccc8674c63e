//! Domain layer for the execution record store
//!
//! # Lifecycle
//!
//! 1. Created by the submission layer: `running`, no logs, no result
//! 2. Mutated only by the orchestrator run: log appends, then exactly one
//!    terminal write (`result_payload` + `status` + `finished_at`)
//! 3. Read-only once `completed` or `failed`
//!
//! # Port Trait
//!
//! - `ExecutionStore`: primary storage abstraction, implemented by
//!   `InMemoryExecutionStore` and `SqliteExecutionStore`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, StorageError};

// ═══════════════════════════════════════════════════════════════════════════
// Domain Models
// ═══════════════════════════════════════════════════════════════════════════

/// Execution status
///
/// Transitions only forward: `Running → Completed` or `Running → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(StorageError::invalid_status(format!(
                "Unknown execution status: {}",
                other
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One record per submitted job
///
/// # Invariants
///
/// - `finished_at.is_some()` if and only if `status.is_terminal()`
/// - `logs` only grows
/// - `id`, `request_payload`, `submitted_by` and `started_at` never change
///
/// # Examples
///
/// ```rust
/// use seige_storage::domain::{ExecutionRecord, ExecutionStatus};
///
/// let record = ExecutionRecord::new("exec-0123456789ab", serde_json::json!({}), "alice");
/// assert_eq!(record.status, ExecutionStatus::Running);
/// assert!(record.finished_at.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Execution ID (primary key, immutable)
    pub id: String,
    /// Current status
    pub status: ExecutionStatus,
    /// Ordered milestone lines
    pub logs: Vec<String>,
    /// Submission parameters, stored verbatim
    pub request_payload: serde_json::Value,
    /// Final structured output (terminal records only)
    pub result_payload: Option<serde_json::Value>,
    /// Creation timestamp
    pub started_at: DateTime<Utc>,
    /// Set exactly once, at the terminal transition
    pub finished_at: Option<DateTime<Utc>>,
    /// Caller identity
    pub submitted_by: String,
}

impl ExecutionRecord {
    /// Create a new running record
    pub fn new(
        id: impl Into<String>,
        request_payload: serde_json::Value,
        submitted_by: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status: ExecutionStatus::Running,
            logs: Vec::new(),
            request_payload,
            result_payload: None,
            started_at: Utc::now(),
            finished_at: None,
            submitted_by: submitted_by.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append milestone lines (rejected once terminal)
    pub fn append_logs(&mut self, lines: &[String]) -> Result<()> {
        if self.is_terminal() {
            return Err(StorageError::terminal_state(&self.id, self.status));
        }
        self.logs.extend(lines.iter().cloned());
        Ok(())
    }

    /// Terminal transition: RUNNING → COMPLETED | FAILED
    pub fn finish(&mut self, result: serde_json::Value, status: ExecutionStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(StorageError::invalid_status(format!(
                "Cannot finish execution {} with non-terminal status {}",
                self.id, status
            )));
        }
        if self.is_terminal() {
            return Err(StorageError::terminal_state(&self.id, self.status));
        }

        self.result_payload = Some(result);
        self.status = status;
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Port Trait: ExecutionStore
// ═══════════════════════════════════════════════════════════════════════════

/// Execution record storage abstraction
///
/// Safe for independent-key read/modify/write; no cross-record locking is
/// provided or needed.
///
/// # Examples
///
/// ```rust,ignore
/// use seige_storage::{ExecutionStatus, ExecutionStore};
///
/// async fn example(store: impl ExecutionStore) -> seige_storage::Result<()> {
///     store.create("exec-1", &serde_json::json!({}), "alice").await?;
///     store.append_logs("exec-1", &["Pipeline started".to_string()]).await?;
///     store
///         .write_result("exec-1", serde_json::json!({"ok": true}), ExecutionStatus::Completed)
///         .await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Create a running record
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::AlreadyExists` if the id is taken
    async fn create(
        &self,
        id: &str,
        request: &serde_json::Value,
        submitted_by: &str,
    ) -> Result<ExecutionRecord>;

    /// Append lines to the record's log
    ///
    /// # Errors
    ///
    /// - `ErrorKind::NotFound` if the record does not exist
    /// - `ErrorKind::TerminalState` if the record is completed/failed
    async fn append_logs(&self, id: &str, lines: &[String]) -> Result<()>;

    /// Single terminal write: result + status + finished_at
    ///
    /// # Errors
    ///
    /// - `ErrorKind::NotFound` if the record does not exist
    /// - `ErrorKind::InvalidStatus` if `status` is `Running`
    /// - `ErrorKind::TerminalState` if the record already finished
    async fn write_result(
        &self,
        id: &str,
        result: serde_json::Value,
        status: ExecutionStatus,
    ) -> Result<()>;

    /// Read a record snapshot
    async fn get(&self, id: &str) -> Result<Option<ExecutionRecord>>;
}
