//! Configuration for a worker process.
//!
//! The supervisor that launches a worker injects everything it needs.

use anyhow::{Context, Result};
use switchyard_id::DomainName;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// WebSocket URL of the control plane's connect endpoint.
    pub control_plane_url: String,

    /// Domain this worker serves.
    pub domain: DomainName,

    /// Port for the local liveness endpoint.
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let control_plane_url = lookup("SWITCHYARD_CONTROL_PLANE_URL")
            .unwrap_or_else(|| "ws://127.0.0.1:7400/v1/domains/connect".to_string());

        let domain = lookup("SWITCHYARD_DOMAIN").context("SWITCHYARD_DOMAIN is not set")?;
        let domain = DomainName::new(domain).context("SWITCHYARD_DOMAIN is not a valid domain name")?;

        let port = lookup("SWITCHYARD_WORKER_PORT")
            .context("SWITCHYARD_WORKER_PORT is not set")?
            .trim()
            .parse()
            .context("SWITCHYARD_WORKER_PORT is not a port number")?;

        let log_level = lookup("SWITCHYARD_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            control_plane_url,
            domain,
            port,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<WorkerConfig> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        WorkerConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_reads_injected_variables() {
        let config = config(&[
            ("SWITCHYARD_CONTROL_PLANE_URL", "ws://10.0.0.1:7400/v1/domains/connect"),
            ("SWITCHYARD_DOMAIN", "users"),
            ("SWITCHYARD_WORKER_PORT", "9001"),
        ])
        .unwrap();
        assert_eq!(config.domain.as_str(), "users");
        assert_eq!(config.port, 9001);
        assert_eq!(config.control_plane_url, "ws://10.0.0.1:7400/v1/domains/connect");
    }

    #[test]
    fn test_requires_domain_and_port() {
        assert!(config(&[("SWITCHYARD_WORKER_PORT", "9001")]).is_err());
        assert!(config(&[("SWITCHYARD_DOMAIN", "users")]).is_err());
        assert!(config(&[("SWITCHYARD_DOMAIN", "no spaces"), ("SWITCHYARD_WORKER_PORT", "1")]).is_err());
        assert!(config(&[("SWITCHYARD_DOMAIN", "users"), ("SWITCHYARD_WORKER_PORT", "70000")]).is_err());
    }
}
