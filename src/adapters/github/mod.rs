//! GitHub REST adapter.
//!
//! Implements `WebhookRegistry` against `/repos/{owner}/{repo}/hooks`.

mod types;
mod webhook_client;

pub use webhook_client::{GitHubClientConfig, GitHubWebhookClient};
