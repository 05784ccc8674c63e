//! Request handlers for the runner API.
//!
//! Handlers stay thin: validation and scheduling live in `JobSubmitter`,
//! status/report rendering in the orchestration crate.

use crate::api_errors::ApiError;
use crate::app::AppState;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use seige_orchestration::{render_text_report, RunRequest, StatusView, SubmissionReceipt};
use seige_storage::{ExecutionRecord, ExecutionStore};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

pub const APP_NAME: &str = "SEIGE Runner API";
pub const SUBMITTED_BY_HEADER: &str = "x-submitted-by";
const ANONYMOUS: &str = "anonymous";

fn submitted_by(headers: &HeaderMap) -> String {
    headers
        .get(SUBMITTED_BY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

async fn load_record(state: &AppState, execution_id: &str) -> Result<ExecutionRecord, ApiError> {
    state
        .store()
        .get(execution_id)
        .await?
        .ok_or_else(|| ApiError::not_found("execution_id not found"))
}

fn ready_result(record: &ExecutionRecord) -> Result<&Value, ApiError> {
    record
        .result_payload
        .as_ref()
        .ok_or_else(|| ApiError::not_found("result not ready"))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "app": APP_NAME }))
}

pub async fn run_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::bad_request(rejection.body_text())
            .with_details(json!({ "rejection": rejection.to_string() }))
    })?;
    let receipt = state
        .submitter
        .submit(request, &submitted_by(&headers))
        .await?;
    Ok(Json(receipt))
}

/// Query-string form of the request fields accepted with an archive upload
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub branch: Option<String>,
    pub target_id: Option<String>,
    pub target_method: Option<String>,
    pub target_line: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub search_budget: Option<u32>,
    pub skip_test_generation: Option<bool>,
    pub skip_engine: Option<bool>,
}

impl From<UploadParams> for RunRequest {
    fn from(params: UploadParams) -> Self {
        RunRequest {
            branch: params.branch,
            target_id: params.target_id,
            target_method: params.target_method,
            target_line: params.target_line,
            timeout_secs: params.timeout_secs,
            search_budget: params.search_budget,
            skip_test_generation: params.skip_test_generation.unwrap_or(false),
            skip_engine: params.skip_engine.unwrap_or(false),
            ..RunRequest::default()
        }
    }
}

pub async fn upload_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<UploadParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    let Query(params) = params.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    info!("Archive upload received: {} bytes", body.len());

    let receipt = state
        .submitter
        .submit_archive(
            content_type,
            body.to_vec(),
            params.into(),
            &submitted_by(&headers),
        )
        .await?;
    Ok(Json(receipt))
}

pub async fn analysis_status(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<StatusView>, ApiError> {
    let record = load_record(&state, &execution_id).await?;
    Ok(Json(StatusView::from_record(&record)))
}

pub async fn analysis_result(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = load_record(&state, &execution_id).await?;
    Ok(Json(ready_result(&record)?.clone()))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

pub async fn export_result(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let record = load_record(&state, &execution_id).await?;
    let result = ready_result(&record)?;

    let format = params
        .format
        .as_deref()
        .unwrap_or("json")
        .to_ascii_lowercase();
    match format.as_str() {
        "json" => Ok(Json(json!({
            "execution_id": execution_id,
            "result": result,
        }))
        .into_response()),
        "text" => {
            let report = render_text_report(&record)
                .ok_or_else(|| ApiError::not_found("result not ready"))?;
            let disposition = format!("attachment; filename=\"{}.txt\"", execution_id);
            Ok((
                [
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                report,
            )
                .into_response())
        }
        _ => Err(ApiError::bad_request("format must be json or text")
            .with_details(json!({ "format": format }))),
    }
}

pub async fn core_run(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    match state.engine().proxy(&body).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            warn!("core-engine proxy call failed: {}", e);
            Err(ApiError::internal(e.to_string()))
        }
    }
}

pub async fn core_health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.engine().health().await {
        Ok(core) => Ok(Json(json!({ "status": "ok", "core": core }))),
        Err(e) => {
            warn!("core-engine health check failed: {}", e);
            Err(ApiError::unavailable(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_submitted_by_defaults_to_anonymous() {
        let mut headers = HeaderMap::new();
        assert_eq!(submitted_by(&headers), "anonymous");

        headers.insert(SUBMITTED_BY_HEADER, HeaderValue::from_static("  "));
        assert_eq!(submitted_by(&headers), "anonymous");

        headers.insert(SUBMITTED_BY_HEADER, HeaderValue::from_static("alice"));
        assert_eq!(submitted_by(&headers), "alice");
    }

    #[test]
    fn test_upload_params_become_archive_request_fields() {
        let request: RunRequest = UploadParams {
            target_id: Some("cve-2024-1234".into()),
            skip_engine: Some(true),
            ..UploadParams::default()
        }
        .into();
        assert_eq!(request.target_id.as_deref(), Some("cve-2024-1234"));
        assert!(request.skip_engine);
        assert!(!request.skip_test_generation);
        assert!(request.repository_url.is_none());
    }
}
