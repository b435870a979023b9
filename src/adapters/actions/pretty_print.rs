//! Default action: pretty-print the payload to stdout.

use std::io::Write;

use async_trait::async_trait;

use crate::domain::{Delivery, GitHubEvent};
use crate::ports::{DeliveryHandler, HandlerError};

/// Prints each delivery's JSON payload, indented, to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrettyPrintAction;

impl PrettyPrintAction {
    pub fn new() -> Self {
        Self
    }

    /// Indented JSON for `delivery`, followed by a newline.
    pub fn render(delivery: &Delivery) -> Result<String, HandlerError> {
        let value: serde_json::Value = serde_json::from_slice(&delivery.body)?;
        let mut pretty = serde_json::to_string_pretty(&value)?;
        pretty.push('\n');
        Ok(pretty)
    }
}

/// One-line description of the event for the log.
fn summarize(delivery: &Delivery) -> String {
    match GitHubEvent::parse(&delivery.event_type, &delivery.body) {
        Ok(GitHubEvent::Push(push)) => format!("push to {} ({} commits)", push.git_ref, push.commits.len()),
        Ok(GitHubEvent::PullRequest(pr)) => format!("pull request #{} {}", pr.number, pr.action),
        Ok(GitHubEvent::Ping(_)) => "ping".to_string(),
        Ok(other) => other.event_type().to_string(),
        Err(_) => delivery.event_type.clone(),
    }
}

#[async_trait]
impl DeliveryHandler for PrettyPrintAction {
    async fn handle(&self, delivery: Delivery) -> Result<(), HandlerError> {
        tracing::info!(
            size = delivery.size(),
            summary = %summarize(&delivery),
            "Received event"
        );

        let rendered = Self::render(&delivery)?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(rendered.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}
