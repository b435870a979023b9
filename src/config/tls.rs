//! TLS / ACME configuration

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ValidationError;
use super::validate_timeout;

/// Let's Encrypt production directory.
pub const LETS_ENCRYPT_PRODUCTION_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Automatic TLS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Enable automatic TLS negotiation
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Domain to serve; a certificate is acquired for it
    #[serde(default)]
    pub domain: String,

    /// Contact email used for registration and recovery
    pub email: Option<String>,

    /// Acceptance of the certificate authority's terms of service
    #[serde(default)]
    pub accept_tos: bool,

    /// ACME directory of the certificate authority
    #[serde(default = "default_ca_directory_url")]
    pub ca_directory_url: String,

    /// Directory used to cache account credentials and certificates
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Upper bound on one ACME order, in seconds
    #[serde(default = "default_challenge_timeout")]
    pub challenge_timeout_secs: u64,

    /// Renew once the certificate expires within this many days
    #[serde(default = "default_renew_before_days")]
    pub renew_before_days: u32,
}

impl TlsConfig {
    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_secs(self.challenge_timeout_secs)
    }

    pub fn renew_before(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.renew_before_days))
    }

    /// Contact URIs for the ACME account (`mailto:` form).
    pub fn contacts(&self) -> Vec<String> {
        self.email
            .iter()
            .filter(|e| !e.trim().is_empty())
            .map(|e| format!("mailto:{}", e.trim()))
            .collect()
    }

    /// Validate TLS configuration. Nothing is checked when TLS is disabled.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled {
            return Ok(());
        }
        if self.domain.trim().is_empty() {
            return Err(ValidationError::TlsDomainRequired);
        }
        if !self.accept_tos {
            return Err(ValidationError::TermsNotAccepted);
        }
        if !self.ca_directory_url.starts_with("https://")
            && !self.ca_directory_url.starts_with("http://")
        {
            return Err(ValidationError::InvalidDirectoryUrl(
                self.ca_directory_url.clone(),
            ));
        }
        validate_timeout("tls.challenge_timeout_secs", self.challenge_timeout_secs)?;
        Ok(())
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            domain: String::new(),
            email: None,
            accept_tos: false,
            ca_directory_url: default_ca_directory_url(),
            cache_path: default_cache_path(),
            challenge_timeout_secs: default_challenge_timeout(),
            renew_before_days: default_renew_before_days(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_ca_directory_url() -> String {
    LETS_ENCRYPT_PRODUCTION_URL.to_string()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".github-responder")
}

fn default_challenge_timeout() -> u64 {
    120
}

fn default_renew_before_days() -> u32 {
    30
}
