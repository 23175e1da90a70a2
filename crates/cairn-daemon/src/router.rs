//! Builds the axum `Router` wiring every `/api/*` route to its handler
//! (spec.md §6), following the teacher's `dashboard::build_router` shape:
//! a `ServiceBuilder` stack of concurrency limit, CORS, and tracing layered
//! over a stateful router.

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::daemon::Daemon;
use crate::handlers::{memory, recall, status};
use crate::state::AppState;

pub fn build(daemon: Arc<Daemon>) -> Router {
    let state = AppState { daemon };

    Router::new()
        .route("/api/memory/remember", post(memory::remember))
        .route("/api/memory/recall", post(recall::recall))
        .route("/api/memory/modify", post(memory::modify_batch))
        .route("/api/memory/forget", post(memory::forget_batch))
        .route("/api/memory/{id}", get(memory::get_memory))
        .route("/api/memory/{id}", patch(memory::patch_memory))
        .route("/api/memory/{id}", delete(memory::delete_memory))
        .route("/api/memory/{id}/recover", post(memory::recover_memory))
        .route("/api/memory/{id}/history", get(memory::history))
        .route("/api/status", get(status::status))
        .route("/health", get(status::health))
        .layer(ServiceBuilder::new().concurrency_limit(64).layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http()))
        .with_state(state)
}
