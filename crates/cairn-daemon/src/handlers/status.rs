//! Handlers for `GET /api/status` and `GET /health` (spec.md §6).

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cairn_core::analytics::HealthStatus;
use serde_json::json;

use crate::state::AppState;

fn status_str(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Degraded => "degraded",
        HealthStatus::Unhealthy => "unhealthy",
    }
}

/// Full diagnostics composite, one entry per domain plus the overall
/// verdict (spec.md §4.7).
pub async fn status(State(state): State<AppState>) -> Response {
    match state.daemon.analytics.diagnostics(&state.daemon.storage) {
        Ok(report) => Json(json!({
            "status": status_str(report.overall),
            "version": cairn_core::VERSION,
            "domains": {
                "queue": status_str(report.queue.status),
                "storage": status_str(report.storage.status),
                "index": status_str(report.index.status),
                "provider": status_str(report.provider.status),
                "mutation": status_str(report.mutation.status),
            },
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "diagnostics failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal_error" }))).into_response()
        }
    }
}

/// Bare liveness probe — no storage reads, so it answers even if the
/// database file is momentarily locked.
pub async fn health() -> Response {
    Json(json!({ "status": "healthy", "version": cairn_core::VERSION })).into_response()
}
