//! Liveness probes used while a worker is awaiting readiness.

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

/// Per-attempt timeout of the HTTP probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Answers "is the worker on this port alive yet?".
#[async_trait]
pub trait LivenessProbe: Send + Sync + 'static {
    async fn is_alive(&self, port: u16) -> bool;
}

/// Probes `GET http://127.0.0.1:{port}/livez`.
///
/// Connections are not pooled, so nothing is held open once a worker is
/// ready.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    path: String,
}

impl HttpProbe {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_path("/livez")
    }

    pub fn with_path(path: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            client,
            path: path.into(),
        })
    }

    fn url(&self, port: u16) -> String {
        format!("http://127.0.0.1:{port}{}", self.path)
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn is_alive(&self, port: u16) -> bool {
        match self.client.get(self.url(port)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                trace!(port, error = %e, "Liveness probe failed");
                false
            }
        }
    }
}
