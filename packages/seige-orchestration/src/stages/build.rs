use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Project compilation capability; a failure is terminal for the run
#[async_trait]
pub trait ProjectBuilder: Send + Sync {
    async fn build(&self, source_path: &Path) -> Result<()>;
}

/// Stand-in builder: waits `delay`, then reports success for any existing directory
#[derive(Debug, Clone)]
pub struct SimulatedBuilder {
    delay: Duration,
}

impl SimulatedBuilder {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ProjectBuilder for SimulatedBuilder {
    async fn build(&self, source_path: &Path) -> Result<()> {
        if !source_path.is_dir() {
            return Err(OrchestratorError::Build(format!(
                "source directory not found: {}",
                source_path.display()
            )));
        }
        debug!("Simulating build of {} ({:?})", source_path.display(), self.delay);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
