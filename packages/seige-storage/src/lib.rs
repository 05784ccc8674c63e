//! Execution Record Store
//!
//! Durable keyed storage for one record per submitted analysis job: status,
//! milestone logs, the verbatim request, the final result and timestamps.
//!
//! ## Core Principles
//!
//! 1. **Forward-only status**: `running → completed | failed`, never reopened
//! 2. **Append-only logs**: persisted on every append
//! 3. **Single terminal write**: result + status + `finished_at` together, once
//!
//! ## Usage
//!
//! ```rust,ignore
//! use seige_storage::{ExecutionStatus, ExecutionStore, SqliteExecutionStore};
//!
//! let store = SqliteExecutionStore::open("executions.db")?;
//! store.create("exec-0123456789ab", &request, "alice").await?;
//! store.append_logs("exec-0123456789ab", &["Pipeline started".into()]).await?;
//! store.write_result("exec-0123456789ab", result, ExecutionStatus::Completed).await?;
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{ExecutionRecord, ExecutionStatus, ExecutionStore};
pub use infrastructure::InMemoryExecutionStore;

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteExecutionStore;
