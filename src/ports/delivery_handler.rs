//! Delivery handler port - the action invoked for each admitted delivery.
//!
//! Handlers run on their own task, after the HTTP acknowledgment has been
//! sent. They should return promptly or offload long work. Errors and panics
//! are caught and logged by the dispatcher; nothing a handler does reaches
//! the listener.

use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Delivery;

/// Port for actions run against verified deliveries.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// Handle one delivery: `(event_type, delivery_id, raw payload)`.
    async fn handle(&self, delivery: Delivery) -> Result<(), HandlerError>;
}

/// Failure reported by a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("payload could not be decoded: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Adapts an async closure into a [`DeliveryHandler`].
pub struct HandlerFn<F>(F);

/// Wraps `f` so it can be passed where a handler is expected.
///
/// ```ignore
/// let handler = handler_fn(|delivery: Delivery| async move {
///     println!("{} {}", delivery.event_type, delivery.delivery_id);
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> DeliveryHandler for HandlerFn<F>
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, delivery: Delivery) -> Result<(), HandlerError> {
        (self.0)(delivery).await
    }
}
