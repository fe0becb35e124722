//! # switchyard-worker
//!
//! Client side of a Switchyard domain channel.
//!
//! A worker process is launched by the control plane's supervisor with its
//! domain, liveness port and control-plane URL in the environment. It serves
//! `/livez`, connects over WebSocket, announces itself with a
//! `register_request`, then answers requests from its [`HandlerTable`]. If the
//! connection drops it reconnects with exponential backoff.
//!
//! ```no_run
//! use switchyard_worker::{HandlerTable, Worker, WorkerConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut handlers = HandlerTable::new();
//! handlers.register_fn("echo_request", |_ctx, payload| async move { Ok(payload) });
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! Worker::new(WorkerConfig::from_env()?, handlers)
//!     .run(shutdown_rx)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
mod error;
pub mod liveness;
pub mod session;
mod transport;
mod worker;

pub use backoff::BackoffPolicy;
pub use config::WorkerConfig;
pub use error::WorkerError;
pub use switchyard_envelope::{HandlerError, HandlerTable, RequestContext};
pub use worker::Worker;
