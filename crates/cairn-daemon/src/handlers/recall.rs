//! Handler for `POST /api/memory/recall` (spec.md §4.3, §6).

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use cairn_core::analytics::ErrorStage;
use cairn_core::auth::{Permission, ScopeTarget};
use cairn_core::recall::{RecallContext, RecallQuery};
use cairn_core::memory::MemoryType;
use serde::Deserialize;
use serde_json::json;

use crate::auth_ext::claims_from_headers;
use crate::error::{ErrorContext, request_id_from_headers, respond};
use crate::handlers::guard;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecallRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(rename = "type", default)]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default)]
    pub alpha: Option<f32>,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn recall(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<RecallRequest>,
) -> Response {
    let claims = claims_from_headers(&headers);
    let request_id = request_id_from_headers(&headers);
    let scope = ScopeTarget { project: req.project.clone(), agent: None, user: None };
    if let Err(resp) = guard(&state.daemon.auth, claims.as_ref(), Permission::Recall, &scope, None) {
        return resp;
    }

    let config = &state.daemon.config.recall;
    let query = RecallQuery {
        text: req.query,
        limit: req.limit.unwrap_or(config.top_k),
        memory_type: req.memory_type,
        project: req.project,
        min_score: req.min_score,
        alpha: req.alpha,
        session_key: req.session_id,
    };

    match state.daemon.recall.recall(query, RecallContext::Hook).await {
        Ok(results) => Json(json!({ "results": results })).into_response(),
        Err(e) => respond(&state.daemon.analytics.errors, ErrorContext::new(ErrorStage::Connector).request(request_id), e),
    }
}
