//! Run command - launches the agent.

use crate::cli::args::RunArgs;
use crate::content::{ContentOrchestrator, FetchCache, LoggingSurface, SharedSurface};
use crate::core::config::{AgentConfig, Settings};
use crate::core::identity::IdentityStore;
use crate::core::telemetry;
use crate::dispatch::Dispatcher;
use crate::session::SessionManager;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};

/// Wait for shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() -> &'static str {
    let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

pub async fn run_agent(args: RunArgs) -> Result<()> {
    let config = AgentConfig::load_or_default(&args.config)?;
    telemetry::init_tracing(config.log_level.as_deref())?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "beacon agent starting");

    let store = IdentityStore::new(&config.resolve_data_dir());
    let identity =
        store.load_or_create(config.device_id.as_deref(), config.client_id.as_deref())?;
    tracing::info!(
        device_id = %identity.device_id,
        client_id = %identity.client_id,
        "agent identity"
    );

    let cache = FetchCache::new(&config.fetch, config.cache_dir.clone())?;
    let surface: SharedSurface = Arc::new(LoggingSurface);
    let settings = Settings::new(config.clone());

    let (session, inbound) = SessionManager::new(settings, identity);
    let (orchestrator, content_events) = ContentOrchestrator::new(surface.clone(), cache);
    let (dispatcher, mut shutdown) = Dispatcher::new(session.clone(), orchestrator, surface);
    let dispatch_task = tokio::spawn(dispatcher.run(inbound, content_events));

    if config.auto_connect {
        if let Err(err) = session.connect().await {
            tracing::warn!("initial connect failed: {err:#}");
        }
    } else {
        tracing::info!("auto_connect disabled, agent idle until restarted");
    }

    tokio::select! {
        sig = shutdown_signal() => {
            tracing::info!(signal = sig, "signal received, shutting down");
        }
        _ = shutdown.changed() => {
            tracing::info!("shutdown requested");
        }
    }

    session.disconnect().await;
    // Grace window for the offline status to reach the broker.
    tokio::time::sleep(Duration::from_secs(1)).await;
    dispatch_task.abort();
    tracing::info!("beacon agent stopped");
    Ok(())
}
