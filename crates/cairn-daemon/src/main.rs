//! `cairnd` — the local memory daemon binary.
//!
//! Boots storage, wires the `Daemon` aggregate (store, job pipeline,
//! recall, session continuity, analytics, auth), spawns its background
//! workers, and serves the HTTP surface from spec.md §6.

mod auth_ext;
mod config;
mod daemon;
mod error;
mod handlers;
mod router;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use cairn_core::providers::{NullEmbedder, NullProvider};
use cairn_core::storage::Storage;
use tracing_subscriber::EnvFilter;

use crate::daemon::Daemon;

/// Any job left `processing` from a previous run didn't crash on purpose —
/// the process died mid-lease. Mark those rows failed so they don't sit
/// leased forever; the normal retry/backoff path picks them back up.
fn reap_stale_leases(storage: &Storage) -> cairn_core::error::Result<()> {
    storage.write(|conn| {
        conn.execute(
            "UPDATE memory_jobs SET status = 'failed', error = 'daemon_restart' WHERE status = 'processing'",
            [],
        )?;
        conn.execute(
            "UPDATE summary_jobs SET status = 'failed', error = 'daemon_restart' WHERE status = 'processing'",
            [],
        )?;
        Ok(())
    })
}

async fn shutdown_signal(tx: tokio::sync::watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
    let _ = tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let server_config = config::load();

    let storage = Arc::new(Storage::open(server_config.db_path.clone())?);
    reap_stale_leases(&storage)?;

    // No LLM/embedding provider is bundled by default (spec.md Non-goals
    // exclude shipping a concrete model integration); a deployment that
    // wants extraction, decision, and embedding jobs to do real work
    // supplies its own `LlmProvider`/`Embedder` impl here.
    let llm: Arc<dyn cairn_core::providers::LlmProvider> = Arc::new(NullProvider);
    let embedder: Arc<dyn cairn_core::providers::Embedder> = Arc::new(NullEmbedder);

    let daemon: Arc<Daemon> = Daemon::new(storage, server_config.daemon, llm, embedder);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker_handles = daemon.spawn_background_tasks(server_config.worker_count, shutdown_rx);

    let app = router::build(daemon.clone());
    let addr: SocketAddr = format!("{}:{}", server_config.bind_addr, server_config.bind_port).parse()?;
    tracing::info!(%addr, "cairnd listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_tx)).await?;

    for handle in worker_handles {
        handle.abort();
    }

    tracing::info!("cairnd shut down");
    Ok(())
}
