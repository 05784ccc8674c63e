//! Job submission: synchronous validation, record creation, deferred runs

mod common;

use common::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use seige_orchestration::{JobSubmitter, OrchestratorError, RunRequest, StatusView};
use seige_storage::{ExecutionStatus, ExecutionStore};
use std::sync::Arc;
use tempfile::TempDir;

fn gz_tar(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, body.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn submitter(h: &Harness, scheduler: Arc<DeferredScheduler>, root: &TempDir) -> JobSubmitter {
    JobSubmitter::new(h.orchestrator.clone(), scheduler, root.path())
}

#[tokio::test]
async fn test_submit_creates_running_record_and_defers_run() {
    let tmp = TempDir::new().unwrap();
    let h = Harness::happy(tmp.path());
    let scheduler = Arc::new(DeferredScheduler::default());
    let submitter = submitter(&h, scheduler.clone(), &tmp);

    let request = RunRequest {
        target_id: Some("cve-2021-44228".into()),
        ..RunRequest::repository("https://example.com/app.git")
    };
    let receipt = submitter.submit(request, "alice").await.unwrap();
    assert_eq!(receipt.status, "success");
    assert!(receipt.execution_id.starts_with("exec-"));

    // nothing has run yet: the caller got its answer first
    let record = h.record(&receipt.execution_id).await;
    assert_eq!(record.status, ExecutionStatus::Running);
    assert!(record.logs.is_empty());
    assert_eq!(record.submitted_by, "alice");
    assert_eq!(record.request_payload["target_id"], "CVE-2021-44228");
    assert_eq!(scheduler.pending(), 1);

    scheduler.run_all().await;
    let record = h.record(&receipt.execution_id).await;
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_terminal_consistency(&record);
    assert_eq!(StatusView::from_record(&record).progress, 100);
}

#[tokio::test]
async fn test_invalid_target_id_is_rejected_before_record_exists() {
    let tmp = TempDir::new().unwrap();
    let h = Harness::happy(tmp.path());
    let scheduler = Arc::new(DeferredScheduler::default());
    let submitter = submitter(&h, scheduler.clone(), &tmp);

    for bad in ["CVE-21-1", "not-an-id"] {
        let request = RunRequest {
            target_id: Some(bad.into()),
            ..RunRequest::repository("https://example.com/app.git")
        };
        let err = submitter.submit(request, "alice").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTargetId(_)));
    }
    assert!(h.store.is_empty());
    assert_eq!(scheduler.pending(), 0);
}

#[tokio::test]
async fn test_empty_repository_is_accepted_then_fails() {
    let tmp = TempDir::new().unwrap();
    let h = Harness::happy(tmp.path());
    let scheduler = Arc::new(DeferredScheduler::default());
    let submitter = submitter(&h, scheduler.clone(), &tmp);

    let receipt = submitter
        .submit(RunRequest::default(), "alice")
        .await
        .unwrap();
    scheduler.run_all().await;

    let record = h.record(&receipt.execution_id).await;
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(
        record.result_payload.unwrap()["error"],
        "missing repository reference"
    );
}

#[tokio::test]
async fn test_submit_archive_extracts_and_runs() {
    let tmp = TempDir::new().unwrap();
    let h = Harness::happy(tmp.path());
    let scheduler = Arc::new(DeferredScheduler::default());
    let submitter = submitter(&h, scheduler.clone(), &tmp);

    let body = gz_tar(&[
        ("demo/pom.xml", "<project/>"),
        ("demo/src/App.java", "class App {}"),
    ]);
    let receipt = submitter
        .submit_archive(
            Some("application/gzip"),
            body,
            RunRequest::default(),
            "bob",
        )
        .await
        .unwrap();

    let record = h.record(&receipt.execution_id).await;
    let source_path = record.request_payload["source_path"].as_str().unwrap().to_string();
    assert_eq!(record.request_payload["source_type"], "archive");
    assert_eq!(
        source_path,
        tmp.path()
            .join(&receipt.execution_id)
            .join("upload")
            .join("demo")
            .to_string_lossy()
    );
    assert!(std::path::Path::new(&source_path).join("src/App.java").is_file());

    scheduler.run_all().await;
    let record = h.record(&receipt.execution_id).await;
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert!(record
        .logs
        .contains(&format!("Source ready at {}", source_path)));
}

#[tokio::test]
async fn test_submit_archive_rejects_wrong_content_type_and_garbage() {
    let tmp = TempDir::new().unwrap();
    let h = Harness::happy(tmp.path());
    let scheduler = Arc::new(DeferredScheduler::default());
    let submitter = submitter(&h, scheduler.clone(), &tmp);

    let err = submitter
        .submit_archive(
            Some("application/zip"),
            gz_tar(&[("a.txt", "a")]),
            RunRequest::default(),
            "bob",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::UnsupportedContentType(_)));

    let err = submitter
        .submit_archive(
            Some("application/x-gzip"),
            b"not a tarball".to_vec(),
            RunRequest::default(),
            "bob",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Archive(_)));

    assert!(h.store.is_empty());
    assert_eq!(scheduler.pending(), 0);
}

#[tokio::test]
async fn test_failed_extraction_leaves_no_upload_directory() {
    let tmp = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let h = Harness::happy(tmp.path());
    let scheduler = Arc::new(DeferredScheduler::default());
    let submitter = JobSubmitter::new(h.orchestrator.clone(), scheduler.clone(), uploads.path())
        .with_extract_limit(16 * 1024);

    let err = submitter
        .submit_archive(
            Some("application/gzip"),
            b"not a tarball".to_vec(),
            RunRequest::default(),
            "bob",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Archive(_)));

    let padding = "x".repeat(256 * 1024);
    let err = submitter
        .submit_archive(
            Some("application/gzip"),
            gz_tar(&[("demo/A.java", "class A {}"), ("demo/big.txt", padding.as_str())]),
            RunRequest::default(),
            "bob",
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("exceeds 16384 bytes"));

    assert_eq!(std::fs::read_dir(uploads.path()).unwrap().count(), 0);
    assert!(h.store.is_empty());
    assert_eq!(scheduler.pending(), 0);
}

#[tokio::test]
async fn test_zero_timeout_is_rejected_before_record_exists() {
    let tmp = TempDir::new().unwrap();
    let h = Harness::happy(tmp.path());
    let scheduler = Arc::new(DeferredScheduler::default());
    let submitter = submitter(&h, scheduler.clone(), &tmp);

    let request = RunRequest {
        timeout_secs: Some(0),
        ..RunRequest::repository("https://example.com/app.git")
    };
    let err = submitter.submit(request, "alice").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidRequest(_)));

    let request = RunRequest {
        timeout_secs: Some(0),
        ..RunRequest::default()
    };
    let err = submitter
        .submit_archive(
            Some("application/gzip"),
            gz_tar(&[("demo/A.java", "class A {}")]),
            request,
            "alice",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidRequest(_)));

    assert!(h.store.is_empty());
    assert_eq!(scheduler.pending(), 0);
}

#[tokio::test]
async fn test_store_reads_are_independent_of_runs() {
    let tmp = TempDir::new().unwrap();
    let h = Harness::happy(tmp.path());
    let scheduler = Arc::new(DeferredScheduler::default());
    let submitter = submitter(&h, scheduler.clone(), &tmp);

    let a = submitter
        .submit(RunRequest::repository("https://example.com/a.git"), "alice")
        .await
        .unwrap();
    let b = submitter
        .submit(RunRequest::repository("https://example.com/b.git"), "bob")
        .await
        .unwrap();
    assert_ne!(a.execution_id, b.execution_id);
    assert_eq!(h.store.len(), 2);

    scheduler.run_all().await;
    for id in [&a.execution_id, &b.execution_id] {
        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
    }
}
