//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid repository '{0}': need 'owner/repo' form")]
    InvalidRepository(String),

    #[error("At least one event type must be subscribed")]
    NoEvents,

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Invalid callback URL: {0}")]
    InvalidCallbackUrl(String),

    #[error("Invalid API base URL: {0}")]
    InvalidApiUrl(String),

    #[error("Invalid ACME directory URL: {0}")]
    InvalidDirectoryUrl(String),

    #[error("TLS requires a domain to serve")]
    TlsDomainRequired,

    #[error("TLS requires accepting the certificate authority's terms of service")]
    TermsNotAccepted,

    #[error("Invalid timeout for {0}: must be between 1 and 300 seconds")]
    InvalidTimeout(&'static str),

    #[error("Maximum body size must be greater than zero")]
    InvalidBodyLimit,
}
