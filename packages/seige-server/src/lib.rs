/*
 * SEIGE Server - HTTP surface for the analysis runner
 *
 * Routes:
 * - /health, /api/v1/health
 * - /api/v1/analysis/{run,upload,status,result,result/export}
 * - /api/v1/core/{run,health}
 *
 * Submission returns as soon as the record exists; runs are polled
 * through the status and result routes.
 */

pub mod api_errors;
pub mod app;
pub mod handlers;

pub use api_errors::ApiError;
pub use app::{router, AppState, MAX_UPLOAD_BYTES};
pub use handlers::{APP_NAME, SUBMITTED_BY_HEADER};
