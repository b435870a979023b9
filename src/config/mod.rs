//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `GITHUB_RESPONDER` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use github_responder::config::ResponderConfig;
//!
//! let config = ResponderConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Watching {}", config.github.repo);
//! ```

mod error;
mod github;
mod server;
mod tls;

pub use error::{ConfigError, ValidationError};
pub use github::GithubConfig;
pub use server::{LogFormat, ServerConfig};
pub use tls::{TlsConfig, LETS_ENCRYPT_PRODUCTION_URL};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Environment variable consulted when no token is configured explicitly.
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Root configuration for one responder session
///
/// Immutable once validated; shared read-only by every component of the session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponderConfig {
    /// Repository, token, event filter and hook identity
    #[serde(default)]
    pub github: GithubConfig,

    /// Listen addresses, grace period and body limit
    #[serde(default)]
    pub server: ServerConfig,

    /// Automatic TLS via ACME
    #[serde(default)]
    pub tls: TlsConfig,
}

impl ResponderConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `GITHUB_RESPONDER` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Falls back to `GITHUB_TOKEN` when no token is configured
    ///
    /// # Environment Variable Format
    ///
    /// - `GITHUB_RESPONDER__GITHUB__REPO=acme/widget` -> `github.repo`
    /// - `GITHUB_RESPONDER__GITHUB__EVENTS=push,pull_request` -> `github.events`
    /// - `GITHUB_RESPONDER__TLS__ENABLED=false` -> `tls.enabled`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config: ResponderConfig = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("GITHUB_RESPONDER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("github.events")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        if config.github.token.expose_secret().is_empty() {
            if let Ok(token) = std::env::var(GITHUB_TOKEN_VAR) {
                config.github.token = SecretString::new(token);
            }
        }

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.github.validate()?;
        self.server.validate()?;
        self.tls.validate()?;
        Ok(())
    }

    /// URL scheme deliveries arrive on.
    pub fn scheme(&self) -> &'static str {
        if self.tls.enabled {
            "https"
        } else {
            "http"
        }
    }
}

/// Shared bound for the timeouts in this module.
pub(crate) fn validate_timeout(name: &'static str, secs: u64) -> Result<(), ValidationError> {
    if secs == 0 || secs > 300 {
        return Err(ValidationError::InvalidTimeout(name));
    }
    Ok(())
}
