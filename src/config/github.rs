//! GitHub configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::validate_timeout;

/// GitHub repository and webhook configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    /// Repository to watch, in `owner/repo` form
    #[serde(default)]
    pub repo: String,

    /// API token used as a bearer credential
    #[serde(default = "empty_secret")]
    pub token: SecretString,

    /// Event types to subscribe to (`*` for all)
    #[serde(default = "default_events")]
    pub events: Vec<String>,

    /// Callback URL registered with GitHub. Generated when absent.
    pub callback_url: Option<String>,

    /// Shared HMAC secret registered with the hook. Generated when absent.
    pub secret: Option<SecretString>,

    /// Base URL of the REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Retries for hook creation on transient failures
    #[serde(default = "default_create_retries")]
    pub create_retries: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound on hook deletion during cleanup, in seconds
    #[serde(default = "default_delete_timeout")]
    pub delete_timeout_secs: u64,
}

impl GithubConfig {
    /// Split `repo` into `(owner, name)`.
    pub fn owner_and_name(&self) -> Result<(&str, &str), ValidationError> {
        let (owner, name) = self
            .repo
            .split_once('/')
            .ok_or_else(|| ValidationError::InvalidRepository(self.repo.clone()))?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(ValidationError::InvalidRepository(self.repo.clone()));
        }
        Ok((owner, name))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    /// Validate GitHub configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.repo.is_empty() {
            return Err(ValidationError::MissingRequired("GITHUB__REPO"));
        }
        self.owner_and_name()?;

        if self.token.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("GITHUB_TOKEN"));
        }

        if self.events.iter().all(|e| e.trim().is_empty()) {
            return Err(ValidationError::NoEvents);
        }

        if let Some(url) = &self.callback_url {
            validate_callback_url(url)?;
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ValidationError::InvalidApiUrl(self.api_base_url.clone()));
        }

        validate_timeout("github.request_timeout_secs", self.request_timeout_secs)?;
        validate_timeout("github.delete_timeout_secs", self.delete_timeout_secs)?;
        Ok(())
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            token: empty_secret(),
            events: default_events(),
            callback_url: None,
            secret: None,
            api_base_url: default_api_base_url(),
            create_retries: default_create_retries(),
            request_timeout_secs: default_request_timeout(),
            delete_timeout_secs: default_delete_timeout(),
        }
    }
}

/// Callback URLs must be absolute http(s) URLs with a non-root path that the
/// router can bind literally.
fn validate_callback_url(raw: &str) -> Result<(), ValidationError> {
    let url = reqwest::Url::parse(raw)
        .map_err(|_| ValidationError::InvalidCallbackUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ValidationError::InvalidCallbackUrl(raw.to_string()));
    }
    let path = url.path();
    if path == "/" || path.contains([':', '*', '{', '}']) {
        return Err(ValidationError::InvalidCallbackUrl(raw.to_string()));
    }
    Ok(())
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

fn default_events() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_create_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    30
}

fn default_delete_timeout() -> u64 {
    10
}
