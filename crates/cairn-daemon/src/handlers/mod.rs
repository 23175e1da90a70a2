pub mod memory;
pub mod recall;
pub mod status;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cairn_core::auth::{AuthPolicy, Claims, Permission, RateLimitedOp, ScopeTarget};
use serde_json::json;

use crate::auth_ext::actor_key;

/// Runs the permission → scope → rate-limit checks shared by every
/// mutating endpoint, in that order (spec.md §4.8: permission gates
/// capability, scope gates the target, the limiter gates frequency).
pub fn guard(
    auth: &AuthPolicy,
    claims: Option<&Claims>,
    perm: Permission,
    scope: &ScopeTarget,
    rate_op: Option<RateLimitedOp>,
) -> Result<(), Response> {
    if !auth.check_permission(claims, perm) {
        return Err(forbidden("permission_denied"));
    }
    if !auth.check_scope(claims, scope) {
        return Err(forbidden("scope_denied"));
    }
    if let Some(op) = rate_op {
        let key = actor_key(claims);
        let status = auth.check_rate_limit(op, &key);
        if !status.allowed {
            return Err(rate_limited(status.reset_at));
        }
        auth.record_rate_limit(op, &key);
    }
    Ok(())
}

fn forbidden(reason: &str) -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "error": reason }))).into_response()
}

fn rate_limited(reset_at: chrono::DateTime<chrono::Utc>) -> Response {
    let retry_after = (reset_at - chrono::Utc::now()).num_seconds().max(0);
    let mut resp = (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": "rate_limited" }))).into_response();
    if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
        resp.headers_mut().insert("Retry-After", value);
    }
    resp
}
