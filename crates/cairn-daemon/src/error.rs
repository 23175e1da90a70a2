//! Maps `CoreError` onto the HTTP status codes named in spec.md §6/§7.
//!
//! Client-visible kinds surface with their structured detail; everything
//! else collapses to a plain 500 while the full error goes into the
//! `ErrorRing` so the timeline builder can still reconstruct it
//! (spec.md §7: "everything else becomes a 500 ... while the detail goes
//! to the error ring").

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cairn_core::analytics::{ErrorEntry, ErrorRing, ErrorStage};
use cairn_core::error::CoreError;
use serde_json::json;

/// Request-scoped detail attached to an error before it's recorded, so the
/// ring entry and the timeline stay attributable to the memory/request
/// that caused it.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub stage: Option<ErrorStage>,
    pub request_id: Option<String>,
    pub memory_id: Option<String>,
    pub actor: Option<String>,
}

impl ErrorContext {
    pub fn new(stage: ErrorStage) -> Self {
        Self { stage: Some(stage), ..Default::default() }
    }

    pub fn memory(mut self, id: impl Into<String>) -> Self {
        self.memory_id = Some(id.into());
        self
    }

    pub fn request(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Reuses an inbound `x-request-id` if the caller set one, otherwise mints
/// a fresh one — so the error ring and the caller's own logs can be
/// correlated either way.
pub fn request_id_from_headers(headers: &axum::http::HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Records `err` into `ring` and converts it to the response spec.md §6's
/// table documents. Kept as a free function rather than a blanket
/// `IntoResponse` impl so every call site supplies its own context.
pub fn respond(ring: &ErrorRing, ctx: ErrorContext, err: CoreError) -> Response {
    ring.push(ErrorEntry {
        timestamp: chrono::Utc::now(),
        stage: ctx.stage.unwrap_or(ErrorStage::Mutation),
        code: error_code(&err),
        message: err.to_string(),
        request_id: ctx.request_id,
        memory_id: ctx.memory_id,
        actor: ctx.actor,
    });

    match err {
        CoreError::NotFound => (StatusCode::NOT_FOUND, Json(json!({ "error": "not_found" }))).into_response(),
        CoreError::MissingReason => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": "missing_reason" }))).into_response()
        }
        CoreError::VersionConflict { current } => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "version_conflict", "status": "version_conflict", "currentVersion": current })),
        )
            .into_response(),
        CoreError::PinnedRequiresForce => {
            (StatusCode::CONFLICT, Json(json!({ "error": "pinned_requires_force" }))).into_response()
        }
        CoreError::RetentionExpired => {
            (StatusCode::CONFLICT, Json(json!({ "error": "retention_expired" }))).into_response()
        }
        CoreError::BatchConfirmRequired { count, confirm_token } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "requires_confirm",
                "count": count,
                "confirmToken": confirm_token,
            })),
        )
            .into_response(),
        CoreError::BatchConfirmInvalid => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_confirm_token" }))).into_response()
        }
        CoreError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_input", "message": msg }))).into_response()
        }
        CoreError::RateLimited { retry_after_secs } => {
            let mut resp =
                (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": "rate_limited" }))).into_response();
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                resp.headers_mut().insert("Retry-After", value);
            }
            resp
        }
        other => {
            tracing::error!(error = %other, "unhandled core error");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal_error" }))).into_response()
        }
    }
}

fn error_code(err: &CoreError) -> String {
    match err {
        CoreError::Store(_) => "store_error".into(),
        CoreError::Io(_) => "io_error".into(),
        CoreError::NotFound => "not_found".into(),
        CoreError::MissingReason => "missing_reason".into(),
        CoreError::VersionConflict { .. } => "version_conflict".into(),
        CoreError::PinnedRequiresForce => "pinned_requires_force".into(),
        CoreError::RetentionExpired => "retention_expired".into(),
        CoreError::BatchConfirmRequired { .. } => "requires_confirm".into(),
        CoreError::BatchConfirmInvalid => "invalid_confirm_token".into(),
        CoreError::Validation(_) => "invalid_input".into(),
        CoreError::RateLimited { .. } => "rate_limited".into(),
        CoreError::Corruption(_) => "corruption".into(),
        _ => "unknown".into(),
    }
}
