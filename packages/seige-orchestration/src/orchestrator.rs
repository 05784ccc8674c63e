use crate::error::Result;
use crate::job::{RunRequest, SourceKind};
use crate::pipeline::{milestones, PipelineComponents, RunLog};
use crate::stages::{SourceRef, TestGenRequest};
use futures::FutureExt;
use seige_storage::{ExecutionStatus, ExecutionStore};
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Terminal outcome of a driven run, written once by [`PipelineOrchestrator::run`]
type Outcome = (ExecutionStatus, Value);

/// Drives one execution through
/// `start → acquire → target → build → test generation → engine → finalize`.
///
/// Every milestone is persisted before the next stage begins; the record is
/// finished with exactly one terminal write.
pub struct PipelineOrchestrator {
    components: PipelineComponents,
}

impl PipelineOrchestrator {
    pub fn new(components: PipelineComponents) -> Self {
        Self { components }
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.components.store
    }

    pub fn components(&self) -> &PipelineComponents {
        &self.components
    }

    /// Run to a terminal state. Never returns an error and never panics out:
    /// stage errors and panics become a `failed` record. Returns `None` only
    /// when the terminal write itself could not be persisted.
    pub async fn run(&self, execution_id: &str, request: RunRequest) -> Option<ExecutionStatus> {
        let mut log = RunLog::new(self.components.store.clone(), execution_id);

        let driven = AssertUnwindSafe(self.drive(&mut log, execution_id, &request))
            .catch_unwind()
            .await;

        let (status, result) = match driven {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("[{}] Pipeline error: {}", execution_id, e);
                self.record_error(&mut log, &e.to_string()).await
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("[{}] Pipeline panicked: {}", execution_id, message);
                self.record_error(&mut log, &message).await
            }
        };

        match self
            .components
            .store
            .write_result(execution_id, result, status)
            .await
        {
            Ok(()) => {
                info!(
                    "[{}] Execution {} after {} log lines",
                    execution_id,
                    status,
                    log.appended()
                );
                Some(status)
            }
            Err(e) => {
                error!("[{}] Failed to persist terminal state: {}", execution_id, e);
                None
            }
        }
    }

    async fn record_error(&self, log: &mut RunLog, message: &str) -> Outcome {
        if let Err(e) = log
            .push(format!("{} {}", milestones::PIPELINE_ERROR, message))
            .await
        {
            warn!("Could not persist error milestone: {}", e);
        }
        (ExecutionStatus::Failed, json!({ "error": message }))
    }

    async fn fail(&self, log: &mut RunLog, message: impl Into<String>) -> Result<Outcome> {
        let message = message.into();
        log.push(format!("{} {}", milestones::PIPELINE_FAILED, message))
            .await?;
        Ok((ExecutionStatus::Failed, json!({ "error": message })))
    }

    async fn drive(
        &self,
        log: &mut RunLog,
        execution_id: &str,
        request: &RunRequest,
    ) -> Result<Outcome> {
        let c = &self.components;
        log.push(milestones::PIPELINE_STARTED).await?;

        // Acquire source
        let Some(kind) = request.source_kind() else {
            return self
                .fail(log, format!("unknown source type: {}", request.source_type))
                .await;
        };
        log.push(format!("{} ({})...", milestones::FETCHING_SOURCE, kind))
            .await?;
        tokio::time::sleep(Duration::from_millis(c.settings.fetch_delay_ms)).await;

        let source_ref = match resolve_source(kind, request) {
            Ok(source_ref) => source_ref,
            Err(reason) => return self.fail(log, reason).await,
        };
        let source_path = match c.source.acquire(execution_id, &source_ref).await {
            Ok(path) => path,
            Err(e) => return self.fail(log, e.to_string()).await,
        };
        log.push(format!(
            "{} {}",
            milestones::SOURCE_READY,
            source_path.display()
        ))
        .await?;

        // Target parameters
        let hints = request.hints();
        log.push(format!(
            "{} {}",
            milestones::TARGET_PARAMETERS,
            hints.describe()
        ))
        .await?;

        // Build
        log.push(milestones::BUILDING).await?;
        if let Err(e) = c.builder.build(&source_path).await {
            return self.fail(log, e.to_string()).await;
        }
        log.push(milestones::BUILD_COMPLETED).await?;

        let test_generation = self
            .test_generation_section(log, request, &source_path)
            .await?;

        // Engine
        let core_engine = if request.skip_engine {
            self.hold_for_skip(log, milestones::ENGINE_SKIPPED).await?
        } else {
            log.push(milestones::INVOKING_ENGINE).await?;
            let payload = request.to_value()?;
            let timeout = request.timeout_secs.map(Duration::from_secs);

            match c.engine.invoke_direct(&payload, timeout).await {
                Ok(result) => {
                    log.push(milestones::ENGINE_DIRECT_COMPLETED).await?;
                    result
                }
                Err(direct_err) => {
                    log.push(format!(
                        "{} {}, trying container exec fallback",
                        milestones::ENGINE_DIRECT_FAILED,
                        direct_err
                    ))
                    .await?;
                    match c.engine.invoke_fallback(&payload, timeout).await {
                        Ok(result) => {
                            log.push(milestones::ENGINE_FALLBACK_COMPLETED).await?;
                            result
                        }
                        Err(e) => {
                            log.push(format!("{} {}", milestones::ENGINE_FALLBACK_FAILED, e))
                                .await?;
                            log.push(format!("{} {}", milestones::PIPELINE_FAILED, e))
                                .await?;
                            return Ok((
                                ExecutionStatus::Failed,
                                json!({
                                    "error": e.to_string(),
                                    "direct_error": direct_err.to_string(),
                                    "test_generation": test_generation,
                                }),
                            ));
                        }
                    }
                }
            }
        };

        // Finalize
        log.push(milestones::PARSING_RESULT).await?;
        let result = json!({
            "test_generation": test_generation,
            "core_engine": core_engine,
        });
        log.push(milestones::PIPELINE_COMPLETED).await?;
        Ok((ExecutionStatus::Completed, result))
    }

    /// Skippable, non-fatal: failures are captured inside the section
    async fn test_generation_section(
        &self,
        log: &mut RunLog,
        request: &RunRequest,
        source_path: &Path,
    ) -> Result<Value> {
        let generator = &self.components.test_generator;
        if request.skip_test_generation {
            return self
                .hold_for_skip(log, milestones::TEST_GENERATION_SKIPPED)
                .await;
        }
        if !generator.enabled() {
            log.push(milestones::TEST_GENERATION_DISABLED).await?;
            return Ok(json!({ "skipped": true, "reason": "disabled" }));
        }

        log.push(milestones::GENERATING_TESTS).await?;
        let gen_request = TestGenRequest {
            source_path: source_path.to_path_buf(),
            target_method: request.hints().target_method,
            search_budget: request.search_budget,
            timeout: request.timeout_secs.map(Duration::from_secs),
        };
        match generator.generate(&gen_request).await {
            Ok(report) => {
                match &report.error {
                    Some(err) => {
                        log.push(format!("{} {}", milestones::TEST_GENERATION_FAILED, err))
                            .await?
                    }
                    None => log.push(milestones::TEST_GENERATION_COMPLETED).await?,
                }
                Ok(serde_json::to_value(&report)?)
            }
            Err(e) => {
                log.push(format!("{} {}", milestones::TEST_GENERATION_FAILED, e))
                    .await?;
                Ok(json!({ "error": e.to_string() }))
            }
        }
    }

    /// Caller-requested skip: hold the run for a random delay inside the
    /// configured window, then report the stage as skipped.
    async fn hold_for_skip(&self, log: &mut RunLog, milestone: &str) -> Result<Value> {
        let delay = self.skip_delay();
        let seconds = (delay.as_millis() as f64 / 1000.0 * 10.0).round() / 10.0;
        log.push(format!("{} (requested, {:.1}s)", milestone, seconds))
            .await?;
        tokio::time::sleep(delay).await;
        Ok(json!({
            "skipped": true,
            "reason": "requested",
            "simulated_delay": seconds,
        }))
    }

    fn skip_delay(&self) -> Duration {
        let min = self.components.settings.skip_delay_min_ms;
        let max = self.components.settings.skip_delay_max_ms.max(min);
        let span = (max - min) as u128 + 1;
        let offset = (Uuid::new_v4().as_u128() % span) as u64;
        Duration::from_millis(min + offset)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn resolve_source(kind: SourceKind, request: &RunRequest) -> std::result::Result<SourceRef, String> {
    match kind {
        SourceKind::Repository => {
            let url = non_empty(request.repository_url.as_deref())
                .ok_or_else(|| "missing repository reference".to_string())?;
            Ok(SourceRef::Repository {
                url: url.to_string(),
                branch: non_empty(request.branch.as_deref()).map(str::to_string),
            })
        }
        SourceKind::Archive => {
            let path = non_empty(request.source_path.as_deref())
                .ok_or_else(|| "invalid source path: none given".to_string())?;
            Ok(SourceRef::Archive {
                path: PathBuf::from(path),
            })
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic: unknown payload".to_string()
    }
}
