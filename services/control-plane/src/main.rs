//! Switchyard control plane
//!
//! Accepts worker connections, answers introspection requests, and launches
//! the workers listed in `SWITCHYARD_WORKERS_FILE`.

use std::sync::Arc;

use anyhow::Result;
use switchyard_control_plane::{
    api, config,
    correlator::run_sweeper,
    state::AppState,
    supervisor::HttpProbe,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to SWITCHYARD_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting switchyard control plane");
    info!(
        listen_addr = %config.listen_addr,
        request_timeout_secs = config.request_timeout.as_secs(),
        sweep_interval_secs = config.sweep_interval.as_secs(),
        fail_pending_on_disconnect = config.fail_pending_on_disconnect,
        "Configuration loaded"
    );

    let workers = match &config.workers_file {
        Some(path) => config::load_workers(path)?,
        None => Vec::new(),
    };

    let state = AppState::new(&config, Arc::new(HttpProbe::new()?));

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_handle = tokio::spawn(run_sweeper(
        Arc::clone(state.correlator()),
        config.sweep_interval,
        shutdown_rx.clone(),
    ));

    let app = api::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    // Spawn the server with graceful shutdown
    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Start configured workers; failures are reported, not retried
    let supervisor = Arc::clone(state.supervisor());
    let startup_handle = tokio::spawn(async move {
        for spec in workers {
            let name = spec.name.clone();
            match supervisor.start(spec).await {
                Ok(()) => info!(worker = %name, "Worker started"),
                Err(e) => error!(worker = %name, code = e.code(), error = %e, "Worker failed to start"),
            }
        }
    });

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    // Signal shutdown to background tasks
    let _ = shutdown_tx.send(true);
    startup_handle.abort();

    info!("Stopping workers...");
    state.supervisor().stop_all().await;

    let shutdown_timeout = std::time::Duration::from_secs(10);

    if let Err(e) = tokio::time::timeout(shutdown_timeout, sweeper_handle).await {
        warn!(error = %e, "Request sweeper did not shut down in time");
    }

    if !server_handle.is_finished() {
        if let Err(e) = tokio::time::timeout(shutdown_timeout, server_handle).await {
            warn!(error = %e, "HTTP server did not shut down in time");
        }
    }

    info!("Control plane shutdown complete");
    Ok(())
}
