//! Infrastructure layer - Storage adapters
//!
//! - In-memory adapter (tests, single-process deployments)
//! - SQLite adapter (feature `sqlite`)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryExecutionStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExecutionStore;
