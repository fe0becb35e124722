use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::correlator::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_SWEEP_INTERVAL};
use crate::supervisor::{SupervisorConfig, WorkerSpec};

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub request_timeout: Duration,
    pub sweep_interval: Duration,
    pub readiness_timeout: Duration,
    pub readiness_poll_interval: Duration,
    pub shutdown_grace: Duration,
    pub fail_pending_on_disconnect: bool,
    pub workers_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr = lookup("SWITCHYARD_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:7400".to_string())
            .parse()
            .context("SWITCHYARD_LISTEN_ADDR is not a socket address")?;

        let log_level = lookup("SWITCHYARD_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let request_timeout = Duration::from_secs(parse_or(
            &lookup,
            "SWITCHYARD_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        )?);
        let sweep_interval = Duration::from_secs(parse_or(
            &lookup,
            "SWITCHYARD_SWEEP_INTERVAL_SECS",
            DEFAULT_SWEEP_INTERVAL.as_secs(),
        )?);
        let readiness_timeout =
            Duration::from_secs(parse_or(&lookup, "SWITCHYARD_READINESS_TIMEOUT_SECS", 30)?);
        let readiness_poll_interval =
            Duration::from_millis(parse_or(&lookup, "SWITCHYARD_READINESS_POLL_MS", 250)?);
        let shutdown_grace =
            Duration::from_secs(parse_or(&lookup, "SWITCHYARD_SHUTDOWN_GRACE_SECS", 5)?);

        anyhow::ensure!(
            !sweep_interval.is_zero(),
            "SWITCHYARD_SWEEP_INTERVAL_SECS must be greater than zero"
        );
        anyhow::ensure!(
            !readiness_poll_interval.is_zero(),
            "SWITCHYARD_READINESS_POLL_MS must be greater than zero"
        );

        let fail_pending_on_disconnect = lookup("SWITCHYARD_FAIL_PENDING_ON_DISCONNECT")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let workers_file = lookup("SWITCHYARD_WORKERS_FILE")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            listen_addr,
            log_level,
            request_timeout,
            sweep_interval,
            readiness_timeout,
            readiness_poll_interval,
            shutdown_grace,
            fail_pending_on_disconnect,
            workers_file,
        })
    }

    /// WebSocket URL workers are told to connect to.
    pub fn control_plane_url(&self) -> String {
        format!("ws://{}/v1/domains/connect", self.listen_addr)
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            control_plane_url: self.control_plane_url(),
            readiness_timeout: self.readiness_timeout,
            readiness_poll_interval: self.readiness_poll_interval,
            shutdown_grace: self.shutdown_grace,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

/// Reads a JSON array of worker launch descriptors.
pub fn load_workers(path: &Path) -> Result<Vec<WorkerSpec>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read workers file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse workers file {}", path.display()))
}
