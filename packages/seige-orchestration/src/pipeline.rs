use crate::config::{PipelineSettings, RunnerConfig};
use crate::error::Result;
use crate::process::CommandRunner;
use crate::stages::{
    EngineClient, EvoSuiteClient, ProjectBuilder, SimulatedBuilder, SourceAcquirer,
    SourceProvider, TestGenerator,
};
use seige_storage::ExecutionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const CLONE_TIMEOUT: Duration = Duration::from_secs(600);

/// Milestone log lines. Progress inference matches on these prefixes.
pub mod milestones {
    pub const PIPELINE_STARTED: &str = "Pipeline started";
    pub const FETCHING_SOURCE: &str = "Fetching source";
    pub const SOURCE_READY: &str = "Source ready at";
    pub const TARGET_PARAMETERS: &str = "Target parameters:";
    pub const BUILDING: &str = "Building project...";
    pub const BUILD_COMPLETED: &str = "Build completed";
    pub const GENERATING_TESTS: &str = "Generating tests...";
    pub const TEST_GENERATION_SKIPPED: &str = "Test generation skipped";
    pub const TEST_GENERATION_DISABLED: &str = "Test generation disabled";
    pub const TEST_GENERATION_COMPLETED: &str = "Test generation completed";
    pub const TEST_GENERATION_FAILED: &str = "Test generation failed:";
    pub const INVOKING_ENGINE: &str = "Invoking core-engine...";
    pub const ENGINE_DIRECT_COMPLETED: &str = "core-engine HTTP call completed";
    pub const ENGINE_DIRECT_FAILED: &str = "core-engine HTTP failed:";
    pub const ENGINE_FALLBACK_COMPLETED: &str = "core-engine fallback completed";
    pub const ENGINE_FALLBACK_FAILED: &str = "core-engine fallback failed:";
    pub const ENGINE_SKIPPED: &str = "Core-engine invocation skipped";
    pub const PARSING_RESULT: &str = "Parsing core-engine result";
    pub const PIPELINE_COMPLETED: &str = "Pipeline completed";
    pub const PIPELINE_FAILED: &str = "Pipeline failed:";
    pub const PIPELINE_ERROR: &str = "Pipeline error:";
}

/// Per-run milestone log: every line is persisted before the next stage starts
pub struct RunLog {
    store: Arc<dyn ExecutionStore>,
    execution_id: String,
    appended: usize,
}

impl RunLog {
    pub fn new(store: Arc<dyn ExecutionStore>, execution_id: impl Into<String>) -> Self {
        Self {
            store,
            execution_id: execution_id.into(),
            appended: 0,
        }
    }

    pub async fn push(&mut self, line: impl Into<String>) -> Result<()> {
        let line = line.into();
        info!(execution_id = %self.execution_id, "{}", line);
        self.store
            .append_logs(&self.execution_id, std::slice::from_ref(&line))
            .await?;
        self.appended += 1;
        Ok(())
    }

    /// Lines persisted by this run
    pub fn appended(&self) -> usize {
        self.appended
    }
}

/// Collaborators of one orchestrator, injected once at startup
#[derive(Clone)]
pub struct PipelineComponents {
    pub store: Arc<dyn ExecutionStore>,
    pub source: Arc<dyn SourceProvider>,
    pub builder: Arc<dyn ProjectBuilder>,
    pub test_generator: Arc<dyn TestGenerator>,
    pub engine: Arc<EngineClient>,
    pub settings: PipelineSettings,
}

impl PipelineComponents {
    /// Production wiring: git/EvoSuite/docker through `runner`, HTTP via reqwest
    pub fn from_config(
        config: &RunnerConfig,
        store: Arc<dyn ExecutionStore>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let engine = EngineClient::from_config(&config.engine, runner.clone())?;
        Ok(Self {
            store,
            source: Arc::new(SourceAcquirer::new(
                runner.clone(),
                config.workspace.root.clone(),
                CLONE_TIMEOUT,
            )),
            builder: Arc::new(SimulatedBuilder::new(Duration::from_millis(
                config.pipeline.build_delay_ms,
            ))),
            test_generator: Arc::new(EvoSuiteClient::new(
                config.test_generation.clone(),
                runner,
            )),
            engine: Arc::new(engine),
            settings: config.pipeline.clone(),
        })
    }
}
