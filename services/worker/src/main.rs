//! Demo worker serving `echo_request` and `ping_request`.

use anyhow::Result;
use switchyard_worker::{HandlerTable, Worker, WorkerConfig};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = WorkerConfig::from_env()?;

    // Prefer RUST_LOG, fallback to SWITCHYARD_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let mut handlers = HandlerTable::new();
    handlers
        .register_fn("echo_request", |_ctx, payload| async move { Ok(payload) })
        .register_fn("ping_request", |_ctx, _payload| async { Ok("pong".to_string()) });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    Worker::new(config, handlers).run(shutdown_rx).await?;
    Ok(())
}
