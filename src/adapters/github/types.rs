//! Wire types for the GitHub repository hooks API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /repos/{owner}/{repo}/hooks`.
#[derive(Debug, Serialize)]
pub struct CreateHookBody<'a> {
    /// Always `"web"` for repository webhooks.
    pub name: &'static str,
    pub active: bool,
    pub events: &'a [String],
    pub config: HookConfigBody<'a>,
}

#[derive(Debug, Serialize)]
pub struct HookConfigBody<'a> {
    pub url: &'a str,
    pub content_type: &'static str,
    pub secret: &'a str,
    pub insecure_ssl: &'static str,
}

/// Subset of the hook object GitHub returns.
#[derive(Debug, Deserialize)]
pub struct HookResponse {
    pub id: u64,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// GitHub error body.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// Top-level message joined with any detail messages.
    pub fn summary(&self) -> String {
        let details: Vec<&str> = self
            .errors
            .iter()
            .filter_map(|e| e.message.as_deref())
            .collect();
        if details.is_empty() {
            self.message.clone()
        } else {
            format!("{} ({})", self.message, details.join("; "))
        }
    }

    /// GitHub reports duplicate hooks as a 422 with this detail.
    pub fn is_duplicate_hook(&self) -> bool {
        self.summary().contains("Hook already exists")
    }
}
