//! Environment-driven configuration overlay on top of `cairn_core::DaemonConfig`.
//!
//! `cairn-core` stays environment-agnostic (its doc comment says as much);
//! this module is where `CAIRN_*` env vars get parsed into the shapes it
//! defines, following the same "parse once at startup" approach as the
//! teacher's CLI arg parsing in `main.rs`.

use std::path::PathBuf;
use std::time::Duration;

use cairn_core::config::{AuthConfig, AuthMode, DaemonConfig};
use directories::ProjectDirs;

/// Settings that aren't part of `DaemonConfig` itself but gate how the
/// binary starts: where the database lives and what address it binds to.
pub struct ServerConfig {
    pub daemon: DaemonConfig,
    pub db_path: Option<PathBuf>,
    pub bind_addr: String,
    pub bind_port: u16,
    pub worker_count: usize,
}

fn env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn auth_mode_from_env() -> AuthMode {
    match std::env::var("CAIRN_AUTH_MODE").as_deref() {
        Ok("local-notoken") => AuthMode::LocalNoToken,
        Ok("hybrid") => AuthMode::Hybrid,
        Ok("team") => AuthMode::Team,
        _ => AuthMode::Local,
    }
}

/// Default data directory under the OS-conventional app-data location,
/// mirroring the teacher's `directories`-based `--data-dir` default.
fn default_data_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "cairn", "cairn").map(|dirs| dirs.data_dir().to_path_buf())
}

pub fn load() -> ServerConfig {
    let mut daemon = DaemonConfig::default();

    daemon.retention.tombstone = env_duration_secs("CAIRN_RETENTION_TOMBSTONE_SECS", daemon.retention.tombstone);
    daemon.retention.history = env_duration_secs("CAIRN_RETENTION_HISTORY_SECS", daemon.retention.history);
    daemon.retention.sweep_interval = env_duration_secs("CAIRN_RETENTION_INTERVAL_SECS", daemon.retention.sweep_interval);
    daemon.retention.batch_limit = env_usize("CAIRN_RETENTION_BATCH_LIMIT", daemon.retention.batch_limit);

    daemon.continuity.enabled = std::env::var("CAIRN_CONTINUITY_ENABLED")
        .map(|v| v != "0" && v.to_ascii_lowercase() != "false")
        .unwrap_or(daemon.continuity.enabled);
    daemon.continuity.prompt_interval = env_u32("CAIRN_CONTINUITY_PROMPT_INTERVAL", daemon.continuity.prompt_interval);

    daemon.recall.alpha = env_f32("CAIRN_RECALL_ALPHA", daemon.recall.alpha);
    daemon.recall.top_k = env_usize("CAIRN_RECALL_TOP_K", daemon.recall.top_k);
    daemon.recall.min_score = env_f32("CAIRN_RECALL_MIN_SCORE", daemon.recall.min_score);

    daemon.jobs.poll_interval = env_duration_secs("CAIRN_JOBS_POLL_INTERVAL_SECS", daemon.jobs.poll_interval);
    daemon.jobs.batch_size = env_usize("CAIRN_JOBS_BATCH_SIZE", daemon.jobs.batch_size);
    daemon.jobs.max_attempts = env_u32("CAIRN_JOBS_MAX_ATTEMPTS", daemon.jobs.max_attempts);

    daemon.auth = AuthConfig { mode: auth_mode_from_env(), ..daemon.auth };

    daemon.dedup_window_days = std::env::var("CAIRN_DEDUP_WINDOW_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(daemon.dedup_window_days);

    let db_path = std::env::var("CAIRN_DB_PATH")
        .ok()
        .map(PathBuf::from)
        .or_else(|| default_data_dir().map(|d| d.join("cairn.db")));

    daemon.memory_dir = std::env::var("CAIRN_MEMORY_DIR")
        .ok()
        .map(PathBuf::from)
        .or_else(|| default_data_dir().map(|d| d.join("memory")))
        .unwrap_or(daemon.memory_dir);

    let bind_addr = std::env::var("CAIRN_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let bind_port = std::env::var("CAIRN_BIND_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8077);
    let worker_count = env_usize("CAIRN_WORKERS", 4);

    ServerConfig { daemon, db_path, bind_addr, bind_port, worker_count }
}
