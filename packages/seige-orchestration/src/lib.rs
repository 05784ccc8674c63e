/*
 * SEIGE Orchestration - analysis pipeline runner
 *
 * Drives one submitted analysis job through its stages:
 * - Source acquisition (git clone / uploaded archive)
 * - Build
 * - Test generation (EvoSuite, optional, non-fatal)
 * - External core-engine invocation (HTTP, container-exec fallback)
 *
 * Every milestone is persisted to the execution store as it happens;
 * each run ends with exactly one terminal write.
 */

// Public modules
pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod report;
pub mod scheduler;
pub mod stages;
pub mod submission;

// Re-exports
pub use config::{ConfigError, RunnerConfig, Validatable};
pub use error::{ErrorCategory, OrchestratorError, Result};
pub use job::{new_execution_id, normalize_target_id, RunRequest, SourceKind, TargetHints};
pub use orchestrator::PipelineOrchestrator;
pub use pipeline::{milestones, PipelineComponents, RunLog};
pub use process::{CommandOutput, CommandRunner, CommandSpec, TokioCommandRunner};
pub use progress::{StatusView, StepState, StepView};
pub use report::render_text_report;
pub use scheduler::{TaskScheduler, TokioScheduler};
pub use stages::{
    extract_archive, ContainerExecTransport, EngineClient, EngineTransport, EvoSuiteClient,
    HttpEngineTransport, ProjectBuilder, SimulatedBuilder, SourceAcquirer, SourceProvider,
    SourceRef, TestGenReport, TestGenRequest, TestGenerator, DEFAULT_MAX_EXTRACTED_BYTES,
};
pub use submission::{check_archive_content_type, JobSubmitter, SubmissionReceipt};
