//! Extracts `Claims` from request headers.
//!
//! spec.md §4.8 scopes the auth policy to pure calculation and leaves the
//! transport out-of-band. Header-based claims are the closest thing the
//! teacher has to a precedent (`mcp-session-id` in `protocol/http.rs`);
//! a `hybrid`/`team` deployment that issues real tokens would replace this
//! extraction without touching `cairn_core::auth` at all.

use axum::http::HeaderMap;
use cairn_core::auth::{Claims, Role};

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn role_from_str(s: &str) -> Option<Role> {
    match s.to_ascii_lowercase().as_str() {
        "admin" => Some(Role::Admin),
        "operator" => Some(Role::Operator),
        "agent" => Some(Role::Agent),
        "readonly" => Some(Role::Readonly),
        _ => None,
    }
}

pub fn claims_from_headers(headers: &HeaderMap) -> Option<Claims> {
    let role = header_str(headers, "x-cairn-role").and_then(role_from_str);
    let project = header_str(headers, "x-cairn-project").map(str::to_string);
    let agent = header_str(headers, "x-cairn-agent").map(str::to_string);
    let user = header_str(headers, "x-cairn-user").map(str::to_string);

    if role.is_none() && project.is_none() && agent.is_none() && user.is_none() {
        return None;
    }
    Some(Claims { role, project, agent, user })
}

/// Best-effort caller identity for rate-limit keying and error attribution
/// when no claims are present (local mode is the common case).
pub fn actor_key(claims: Option<&Claims>) -> String {
    claims
        .and_then(|c| c.user.clone().or_else(|| c.agent.clone()))
        .unwrap_or_else(|| "anonymous".to_string())
}
