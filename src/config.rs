//! Application configuration loaded from environment variables.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ServerError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Server Configuration ===
    /// Address the listener binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port. Zero picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on graceful shutdown before the serve task is aborted.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    // === Probe Configuration ===
    /// Base URL probed by the `probe` command.
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Per-request timeout for probes.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    // === Logging ===
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_probe_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            probe_url: default_probe_url(),
            probe_timeout_secs: default_probe_timeout(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Load from environment and validate in one step.
    pub fn load_validated() -> crate::Result<Self> {
        let config = Self::load()?;
        config.validate().map_err(ServerError::InvalidConfig)?;
        Ok(config)
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.parse::<IpAddr>().is_err() {
            return Err(format!("HOST must be an IP address, got {:?}", self.host));
        }

        if self.shutdown_timeout_secs == 0 {
            return Err("SHUTDOWN_TIMEOUT_SECS must be greater than 0".to_string());
        }

        if self.probe_timeout_secs == 0 {
            return Err("PROBE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        let url = Url::parse(&self.probe_url)
            .map_err(|e| format!("PROBE_URL is not a valid URL: {}", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err("PROBE_URL must use http or https".to_string());
        }

        Ok(())
    }

    /// Socket address built from host and port.
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| format!("HOST must be an IP address, got {:?}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Log filter directive: crate-level debug when verbose, else `RUST_LOG`.
    pub fn log_filter(&self, verbose_flag: bool) -> String {
        if verbose_flag || self.verbose {
            "probe_server=debug,info".to_string()
        } else {
            self.rust_log.clone()
        }
    }

    /// Graceful shutdown bound.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Probe request timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
