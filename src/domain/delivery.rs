//! One inbound webhook delivery.

use bytes::Bytes;

/// Header carrying the event type (`push`, `pull_request`, ...).
pub const EVENT_HEADER: &str = "X-GitHub-Event";

/// Header carrying the unique delivery GUID.
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

/// Header carrying `sha256=<hex>` HMAC of the raw body.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// A verified, admitted delivery as handed to the action handler.
///
/// Exists only for the duration of handling one request; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Value of `X-GitHub-Event`.
    pub event_type: String,
    /// Value of `X-GitHub-Delivery`, empty when GitHub did not send one.
    pub delivery_id: String,
    /// Raw request body, exactly as signed.
    pub body: Bytes,
    /// Value of `X-Hub-Signature-256` as received.
    pub signature: Option<String>,
}

impl Delivery {
    pub fn new(
        event_type: impl Into<String>,
        delivery_id: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            delivery_id: delivery_id.into(),
            body: body.into(),
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }
}
