//! Shared application state threaded through every axum handler.

use std::sync::Arc;

use crate::daemon::Daemon;

#[derive(Clone)]
pub struct AppState {
    pub daemon: Arc<Daemon>,
}
