use crate::handlers;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use seige_orchestration::{EngineClient, JobSubmitter};
use seige_storage::ExecutionStore;
use std::sync::Arc;

/// Upper bound for archive upload bodies
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Shared handler state; everything reachable from the submitter
#[derive(Clone)]
pub struct AppState {
    pub submitter: Arc<JobSubmitter>,
}

impl AppState {
    pub fn new(submitter: Arc<JobSubmitter>) -> Self {
        Self { submitter }
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        self.submitter.orchestrator().store()
    }

    pub fn engine(&self) -> &Arc<EngineClient> {
        &self.submitter.orchestrator().components().engine
    }
}

pub fn router(state: AppState) -> Router {
    let analysis = Router::new()
        .route("/run", post(handlers::run_analysis))
        .route(
            "/upload",
            post(handlers::upload_analysis).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/status/:execution_id", get(handlers::analysis_status))
        .route("/result/:execution_id", get(handlers::analysis_result))
        .route(
            "/result/export/:execution_id",
            get(handlers::export_result),
        );

    let core = Router::new()
        .route("/run", post(handlers::core_run))
        .route("/health", get(handlers::core_health));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/health", get(handlers::health))
        .nest("/api/v1/analysis", analysis)
        .nest("/api/v1/core", core)
        .with_state(state)
}
