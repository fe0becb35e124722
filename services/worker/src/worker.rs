//! Worker run loop: liveness endpoint plus a reconnecting session.

use std::sync::Arc;

use switchyard_envelope::HandlerTable;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backoff::BackoffPolicy;
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::liveness;
use crate::session::{self, SessionEnd};

/// A domain worker: serves its handler table over the control-plane channel.
pub struct Worker {
    config: WorkerConfig,
    handlers: Arc<HandlerTable>,
    backoff: BackoffPolicy,
}

impl Worker {
    pub fn new(config: WorkerConfig, handlers: HandlerTable) -> Self {
        Self {
            config,
            handlers: Arc::new(handlers),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs until shutdown, reconnecting with backoff whenever the channel
    /// drops.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        let (_, liveness_handle) = liveness::serve(self.config.port, shutdown.clone()).await?;

        info!(
            domain = %self.config.domain,
            handlers = ?self.handlers.message_types(),
            "Worker starting"
        );

        let mut attempt = 0u32;

        while !*shutdown.borrow() {
            match session::run(&self.config, &self.handlers, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Disconnected { registered }) => {
                    if registered {
                        attempt = 0;
                    }
                }
                Err(e) => {
                    warn!(domain = %self.config.domain, error = %e, attempt, "Session failed");
                }
            }

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            info!(
                domain = %self.config.domain,
                delay_ms = delay.as_millis() as u64,
                attempt,
                "Reconnecting to control plane"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = liveness_handle.await {
            warn!(error = %e, "Liveness task failed");
        }
        info!(domain = %self.config.domain, "Worker stopped");
        Ok(())
    }
}
