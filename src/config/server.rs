//! Listener configuration

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use super::error::ValidationError;
use super::validate_timeout;

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address for plain HTTP traffic (deliveries without TLS, ACME challenges with TLS)
    #[serde(default = "default_http_address")]
    pub http_address: String,

    /// Address for TLS traffic
    #[serde(default = "default_https_address")]
    pub https_address: String,

    /// Seconds in-flight requests and handlers get to finish on shutdown
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    /// Largest delivery body accepted, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Rust log filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl ServerConfig {
    /// Get the plain HTTP socket address
    pub fn http_addr(&self) -> Result<SocketAddr, ValidationError> {
        parse_address(&self.http_address)
    }

    /// Get the TLS socket address
    pub fn https_addr(&self) -> Result<SocketAddr, ValidationError> {
        parse_address(&self.https_address)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Validate listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.http_addr()?;
        self.https_addr()?;
        validate_timeout("server.grace_period_secs", self.grace_period_secs)?;
        if self.max_body_bytes == 0 {
            return Err(ValidationError::InvalidBodyLimit);
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_address: default_http_address(),
            https_address: default_https_address(),
            grace_period_secs: default_grace_period(),
            max_body_bytes: default_max_body_bytes(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Accepts `host:port` as well as the bare `:port` shorthand for all interfaces.
fn parse_address(raw: &str) -> Result<SocketAddr, ValidationError> {
    let normalized = if raw.starts_with(':') {
        format!("0.0.0.0{}", raw)
    } else {
        raw.to_string()
    };
    normalized
        .parse()
        .map_err(|_| ValidationError::InvalidAddress(raw.to_string()))
}

fn default_http_address() -> String {
    "0.0.0.0:80".to_string()
}

fn default_https_address() -> String {
    "0.0.0.0:443".to_string()
}

fn default_grace_period() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    // GitHub caps delivery payloads at 25 MB.
    25 * 1024 * 1024
}

fn default_log_level() -> String {
    "info,github_responder=debug".to_string()
}
