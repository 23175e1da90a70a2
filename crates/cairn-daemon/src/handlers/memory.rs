//! Handlers for `/api/memory/*` (spec.md §6).

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use cairn_core::analytics::ErrorStage;
use cairn_core::auth::{Permission, RateLimitedOp, ScopeTarget};
use cairn_core::{ForgetMode, ForgetSelector, IngestEnvelope, MemoryPatch};
use serde::Deserialize;
use serde_json::json;

use crate::auth_ext::claims_from_headers;
use crate::error::{ErrorContext, request_id_from_headers, respond};
use crate::handlers::guard;
use crate::state::AppState;

pub async fn remember(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(envelope): Json<IngestEnvelope>,
) -> Response {
    let claims = claims_from_headers(&headers);
    let request_id = request_id_from_headers(&headers);
    let scope = ScopeTarget { project: envelope.project.clone(), agent: None, user: None };
    if let Err(resp) = guard(&state.daemon.auth, claims.as_ref(), Permission::Remember, &scope, None) {
        return resp;
    }

    match state.daemon.store.ingest(envelope) {
        Ok(result) => Json(json!({ "id": result.id, "deduped": result.deduped })).into_response(),
        Err(e) => respond(&state.daemon.analytics.errors, ErrorContext::new(ErrorStage::Mutation).request(request_id.clone()), e),
    }
}

pub async fn get_memory(State(state): State<AppState>, headers: axum::http::HeaderMap, Path(id): Path<String>) -> Response {
    let claims = claims_from_headers(&headers);
    let request_id = request_id_from_headers(&headers);
    let scope = ScopeTarget::default();
    if let Err(resp) = guard(&state.daemon.auth, claims.as_ref(), Permission::Recall, &scope, None) {
        return resp;
    }

    match state.daemon.store.get(&id) {
        Ok(memory) => Json(memory).into_response(),
        Err(e) => respond(&state.daemon.analytics.errors, ErrorContext::new(ErrorStage::Mutation).request(request_id.clone()).memory(id), e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatchRequest {
    pub patch: MemoryPatch,
    pub reason: String,
    #[serde(default)]
    pub if_version: Option<i64>,
}

pub async fn patch_memory(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<PatchRequest>,
) -> Response {
    let claims = claims_from_headers(&headers);
    let request_id = request_id_from_headers(&headers);
    let scope = ScopeTarget::default();
    if let Err(resp) = guard(&state.daemon.auth, claims.as_ref(), Permission::Modify, &scope, Some(RateLimitedOp::Modify)) {
        return resp;
    }

    match state.daemon.store.update(&id, req.patch, &req.reason, req.if_version) {
        Ok(result) => Json(json!({ "status": result.status, "version": result.version })).into_response(),
        Err(e) => respond(&state.daemon.analytics.errors, ErrorContext::new(ErrorStage::Mutation).request(request_id.clone()).memory(id), e),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub reason: Option<String>,
    #[serde(default)]
    pub force: bool,
}

pub async fn delete_memory(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Response {
    let claims = claims_from_headers(&headers);
    let request_id = request_id_from_headers(&headers);
    let scope = ScopeTarget::default();
    let op = if params.force { RateLimitedOp::ForceDelete } else { RateLimitedOp::Forget };
    if let Err(resp) = guard(&state.daemon.auth, claims.as_ref(), Permission::Forget, &scope, Some(op)) {
        return resp;
    }

    let reason = match params.reason {
        Some(r) => r,
        None => {
            return respond(
                &state.daemon.analytics.errors,
                ErrorContext::new(ErrorStage::Mutation).request(request_id.clone()).memory(id),
                cairn_core::CoreError::MissingReason,
            );
        }
    };

    match state.daemon.store.soft_delete(&id, &reason, params.force) {
        Ok(()) => Json(json!({ "status": "forgotten" })).into_response(),
        Err(e) => respond(&state.daemon.analytics.errors, ErrorContext::new(ErrorStage::Mutation).request(request_id.clone()).memory(id), e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecoverRequest {
    pub reason: String,
}

pub async fn recover_memory(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RecoverRequest>,
) -> Response {
    let claims = claims_from_headers(&headers);
    let request_id = request_id_from_headers(&headers);
    let scope = ScopeTarget::default();
    if let Err(resp) = guard(&state.daemon.auth, claims.as_ref(), Permission::Recover, &scope, None) {
        return resp;
    }

    match state.daemon.store.recover(&id, &req.reason) {
        Ok(()) => Json(json!({ "status": "recovered" })).into_response(),
        Err(e) => respond(&state.daemon.analytics.errors, ErrorContext::new(ErrorStage::Mutation).request(request_id.clone()).memory(id), e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModifyItem {
    pub id: String,
    pub patch: MemoryPatch,
    pub reason: String,
    #[serde(default)]
    pub if_version: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModifyRequest {
    pub patches: Vec<ModifyItem>,
}

pub async fn modify_batch(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<ModifyRequest>,
) -> Response {
    let claims = claims_from_headers(&headers);
    let request_id = request_id_from_headers(&headers);
    let scope = ScopeTarget::default();
    if let Err(resp) = guard(&state.daemon.auth, claims.as_ref(), Permission::Modify, &scope, Some(RateLimitedOp::Modify)) {
        return resp;
    }

    let mut results = Vec::with_capacity(req.patches.len());
    let mut updated = 0usize;
    for item in req.patches {
        let status = match state.daemon.store.update(&item.id, item.patch, &item.reason, item.if_version) {
            Ok(result) => {
                updated += 1;
                result.status.to_string()
            }
            Err(cairn_core::CoreError::NotFound) => "not_found".to_string(),
            Err(cairn_core::CoreError::VersionConflict { .. }) => "version_conflict".to_string(),
            Err(e) => {
                state.daemon.analytics.errors.push(cairn_core::analytics::ErrorEntry {
                    timestamp: chrono::Utc::now(),
                    stage: ErrorStage::Mutation,
                    code: "modify_failed".to_string(),
                    message: e.to_string(),
                    request_id: Some(request_id.clone()),
                    memory_id: Some(item.id.clone()),
                    actor: None,
                });
                "error".to_string()
            }
        };
        results.push(json!({ "id": item.id, "status": status }));
    }

    Json(json!({ "total": results.len(), "updated": updated, "results": results })).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForgetRequest {
    pub mode: ForgetMode,
    pub selector: ForgetSelector,
    #[serde(default)]
    pub confirm_token: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn forget_batch(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<ForgetRequest>,
) -> Response {
    let claims = claims_from_headers(&headers);
    let request_id = request_id_from_headers(&headers);
    let scope = ScopeTarget { project: req.selector.project.clone(), agent: None, user: None };
    if let Err(resp) = guard(&state.daemon.auth, claims.as_ref(), Permission::Forget, &scope, Some(RateLimitedOp::BatchForget)) {
        return resp;
    }

    match req.mode {
        ForgetMode::Preview => match state.daemon.store.batch_forget_preview(&req.selector) {
            Ok(preview) => Json(preview).into_response(),
            Err(e) => respond(&state.daemon.analytics.errors, ErrorContext::new(ErrorStage::Mutation).request(request_id.clone()), e),
        },
        ForgetMode::Execute => {
            let reason = match req.reason {
                Some(r) => r,
                None => {
                    return respond(
                        &state.daemon.analytics.errors,
                        ErrorContext::new(ErrorStage::Mutation).request(request_id.clone()),
                        cairn_core::CoreError::MissingReason,
                    );
                }
            };
            match state.daemon.store.batch_forget_execute(&req.selector, req.confirm_token.as_deref(), &reason) {
                Ok(outcome) => Json(outcome).into_response(),
                Err(e) => respond(&state.daemon.analytics.errors, ErrorContext::new(ErrorStage::Mutation).request(request_id.clone()), e),
            }
        }
    }
}

pub async fn history(State(state): State<AppState>, headers: axum::http::HeaderMap, Path(id): Path<String>) -> Response {
    let claims = claims_from_headers(&headers);
    let request_id = request_id_from_headers(&headers);
    let scope = ScopeTarget::default();
    if let Err(resp) = guard(&state.daemon.auth, claims.as_ref(), Permission::Recall, &scope, None) {
        return resp;
    }

    match state.daemon.store.history(&id) {
        Ok(rows) => Json(json!({ "memoryId": id, "count": rows.len(), "history": rows })).into_response(),
        Err(e) => respond(&state.daemon.analytics.errors, ErrorContext::new(ErrorStage::Mutation).request(request_id.clone()).memory(id), e),
    }
}
