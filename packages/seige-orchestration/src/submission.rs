use crate::error::{OrchestratorError, Result};
use crate::job::{new_execution_id, RunRequest, SourceKind};
use crate::orchestrator::PipelineOrchestrator;
use crate::scheduler::TaskScheduler;
use crate::stages::{extract_archive, DEFAULT_MAX_EXTRACTED_BYTES};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Content types accepted for archive uploads
pub const ARCHIVE_CONTENT_TYPES: &[&str] = &[
    "application/gzip",
    "application/x-gzip",
    "application/x-compressed-tar",
];

/// Returned as soon as the record exists and the run is scheduled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub status: String,
    pub execution_id: String,
    pub message: String,
    pub started_at: DateTime<Utc>,
}

/// Job submission layer: validate, create the record, schedule the run.
///
/// Input errors are returned before any record exists.
pub struct JobSubmitter {
    orchestrator: Arc<PipelineOrchestrator>,
    scheduler: Arc<dyn TaskScheduler>,
    upload_root: PathBuf,
    max_extracted_bytes: u64,
}

impl JobSubmitter {
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        scheduler: Arc<dyn TaskScheduler>,
        upload_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            orchestrator,
            scheduler,
            upload_root: upload_root.into(),
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
        }
    }

    /// Cap the decompressed size of uploaded archives
    pub fn with_extract_limit(mut self, max_extracted_bytes: u64) -> Self {
        self.max_extracted_bytes = max_extracted_bytes;
        self
    }

    pub fn orchestrator(&self) -> &Arc<PipelineOrchestrator> {
        &self.orchestrator
    }

    pub async fn submit(
        &self,
        mut request: RunRequest,
        submitted_by: &str,
    ) -> Result<SubmissionReceipt> {
        request.validate()?;
        self.start(new_execution_id(), request, submitted_by).await
    }

    /// Unpack a gzip tarball under `<upload_root>/<id>/upload`, then submit it
    /// as an archive source.
    pub async fn submit_archive(
        &self,
        content_type: Option<&str>,
        body: Vec<u8>,
        mut request: RunRequest,
        submitted_by: &str,
    ) -> Result<SubmissionReceipt> {
        check_archive_content_type(content_type)?;
        request.validate()?;

        let execution_id = new_execution_id();
        let execution_dir = self.upload_root.join(&execution_id);
        let dest = execution_dir.join("upload");
        let limit = self.max_extracted_bytes;
        let extracted = tokio::task::spawn_blocking(move || extract_archive(&body, &dest, limit))
            .await
            .map_err(|e| OrchestratorError::Other(anyhow::anyhow!("upload extraction task failed: {}", e)))
            .and_then(|r| r);
        let source_dir = match extracted {
            Ok(dir) => dir,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&execution_dir).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            "[{}] Failed to remove upload directory {}: {}",
                            execution_id,
                            execution_dir.display(),
                            cleanup
                        );
                    }
                }
                return Err(e);
            }
        };

        request.source_type = SourceKind::Archive.as_str().to_string();
        request.source_path = Some(source_dir.to_string_lossy().into_owned());
        self.start(execution_id, request, submitted_by).await
    }

    async fn start(
        &self,
        execution_id: String,
        request: RunRequest,
        submitted_by: &str,
    ) -> Result<SubmissionReceipt> {
        let payload = request.to_value()?;
        let record = self
            .orchestrator
            .store()
            .create(&execution_id, &payload, submitted_by)
            .await?;

        let orchestrator = self.orchestrator.clone();
        let run_id = execution_id.clone();
        self.scheduler.schedule(
            async move {
                orchestrator.run(&run_id, request).await;
            }
            .boxed(),
        );
        info!("[{}] Submitted by {}", execution_id, submitted_by);

        Ok(SubmissionReceipt {
            status: "success".to_string(),
            execution_id,
            message: "SEIGE analysis started".to_string(),
            started_at: record.started_at,
        })
    }
}

pub fn check_archive_content_type(content_type: Option<&str>) -> Result<()> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if ARCHIVE_CONTENT_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        Err(OrchestratorError::UnsupportedContentType(
            content_type.unwrap_or("<none>").to_string(),
        ))
    }
}
