//! Local `/livez` endpoint the supervisor probes.

use std::net::SocketAddr;

use axum::{http::StatusCode, routing::get, Router};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::WorkerError;

fn routes() -> Router {
    Router::new().route("/livez", get(|| async { StatusCode::OK }))
}

/// Binds `127.0.0.1:{port}` and serves `/livez` until shutdown.
///
/// Returns the bound address, which differs from `port` only when it is 0.
pub async fn serve(
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(SocketAddr, JoinHandle<()>), WorkerError> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Liveness endpoint listening");

    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, routes())
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "Liveness endpoint failed");
        }
    });

    Ok((addr, handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_livez_answers_until_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (addr, handle) = serve(0, shutdown_rx).await.unwrap();

        let response = reqwest::get(format!("http://{addr}/livez")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
