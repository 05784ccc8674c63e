use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{ExecutionRecord, ExecutionStatus, ExecutionStore};
use crate::{Result, StorageError};

/// In-memory execution store
#[derive(Clone, Default)]
pub struct InMemoryExecutionStore {
    records: Arc<Mutex<HashMap<String, ExecutionRecord>>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create(
        &self,
        id: &str,
        request: &serde_json::Value,
        submitted_by: &str,
    ) -> Result<ExecutionRecord> {
        let mut records = self.records.lock();
        if records.contains_key(id) {
            return Err(StorageError::already_exists(id));
        }

        let record = ExecutionRecord::new(id, request.clone(), submitted_by);
        records.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn append_logs(&self, id: &str, lines: &[String]) -> Result<()> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(id))?;
        record.append_logs(lines)
    }

    async fn write_result(
        &self,
        id: &str,
        result: serde_json::Value,
        status: ExecutionStatus,
    ) -> Result<()> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(id))?;
        record.finish(result, status)
    }

    async fn get(&self, id: &str) -> Result<Option<ExecutionRecord>> {
        Ok(self.records.lock().get(id).cloned())
    }
}
