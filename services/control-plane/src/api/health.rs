//! Health check endpoints.
//!
//! `/livez` and `/healthz` only say the process is up. `/readyz` also
//! requires every managed worker to be Ready.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;
use crate::supervisor::WorkerStatus;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status: "ok" or "degraded".
    pub status: String,

    /// Service name.
    pub service: String,

    /// Service version.
    pub version: String,

    /// Current timestamp (ISO 8601).
    pub timestamp: String,

    /// Managed workers, on readiness checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<Vec<WorkerStatus>>,
}

impl HealthResponse {
    fn new(ok: bool, workers: Option<Vec<WorkerStatus>>) -> Self {
        Self {
            status: if ok { "ok" } else { "degraded" }.to_string(),
            service: "switchyard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().to_rfc3339(),
            workers,
        }
    }
}

/// Create health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(livez))
}

async fn healthz() -> impl IntoResponse {
    Json(HealthResponse::new(true, None))
}

/// Returns 503 until every managed worker is Ready.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let workers = state.supervisor().workers();
    let all_ready = workers
        .iter()
        .all(|worker| worker.state == crate::supervisor::WorkerState::Ready);

    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(HealthResponse::new(all_ready, Some(workers))))
}

async fn livez() -> impl IntoResponse {
    StatusCode::OK
}
