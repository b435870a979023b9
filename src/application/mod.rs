//! Application layer - session orchestration.
//!
//! Coordinates the ports: registers the hook through `WebhookRegistry`,
//! serves deliveries to a `DeliveryHandler`, and guarantees cleanup.

mod error;
mod session;

pub use error::ResponderError;
pub use session::{RunningSession, Session, CALLBACK_PATH_PREFIX};
