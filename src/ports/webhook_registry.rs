//! Webhook registry port - creates and deletes the repository hook.
//!
//! Exactly one registration exists per session. It is created at start and
//! destroyed at cleanup; deleting a hook that is already gone succeeds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use thiserror::Error;

/// Port for the platform-side webhook resource.
#[async_trait]
pub trait WebhookRegistry: Send + Sync {
    /// Register a hook delivering `request.events` to `request.callback_url`.
    ///
    /// Callers must not start serving when this fails.
    async fn create(&self, request: &CreateHookRequest)
        -> Result<WebhookRegistration, RegistryError>;

    /// Remove the hook. Implementations treat "not found" as success.
    async fn delete(&self, registration: &WebhookRegistration) -> Result<(), RegistryError>;
}

/// Request to create a repository hook.
#[derive(Debug, Clone)]
pub struct CreateHookRequest {
    /// Repository owner (user or organisation).
    pub owner: String,

    /// Repository name.
    pub repo: String,

    /// Where GitHub should deliver events.
    pub callback_url: String,

    /// HMAC key GitHub signs deliveries with.
    pub secret: SecretString,

    /// Subscribed event types, `*` for all.
    pub events: Vec<String>,
}

/// The hook as it exists on GitHub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRegistration {
    /// Platform-assigned hook ID.
    pub id: u64,

    pub owner: String,

    pub repo: String,

    pub callback_url: String,

    pub events: Vec<String>,

    /// When the hook was created (platform timestamp when available).
    pub created_at: DateTime<Utc>,
}

/// Errors from webhook registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Token missing, invalid or expired.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Token lacks admin rights on the repository's hooks.
    #[error("permission denied: {0}")]
    Permission(String),

    /// An identical hook is already registered.
    #[error("hook already exists: {0}")]
    Conflict(String),

    /// Repository or hook does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// Request did not complete within its time budget.
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Any other non-success response.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl RegistryError {
    /// Check if this error is transient and worth a bounded retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistryError::Network(_) | RegistryError::Timeout { .. } => true,
            RegistryError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
