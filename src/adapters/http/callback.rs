//! Callback endpoint for GitHub deliveries.
//!
//! Exactly one path is routed; everything else is 404. On that path a
//! delivery is size-limited, signature-checked, filtered by event type,
//! acknowledged, and handed to the [`Dispatcher`].

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::domain::{
    Delivery, DeliveryVerifier, EventFilter, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER,
};

use super::dispatcher::Dispatcher;

// ════════════════════════════════════════════════════════════════════════════
// State
// ════════════════════════════════════════════════════════════════════════════

/// Shared state of the callback endpoint.
#[derive(Clone)]
pub struct CallbackState {
    verifier: Arc<DeliveryVerifier>,
    filter: Arc<EventFilter>,
    dispatcher: Dispatcher,
}

impl CallbackState {
    pub fn new(verifier: DeliveryVerifier, filter: EventFilter, dispatcher: Dispatcher) -> Self {
        Self {
            verifier: Arc::new(verifier),
            filter: Arc::new(filter),
            dispatcher,
        }
    }
}

/// Create the callback router.
///
/// # Routes
/// - `POST {path}` - receive a delivery
///
/// Any other path or method answers 404. Bodies larger than `max_body_bytes` answer 413.
pub fn callback_router(path: &str, state: CallbackState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(path, post(receive_delivery).fallback(not_found))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════

/// POST {callback path} - Receive a GitHub delivery
pub async fn receive_delivery(
    State(state): State<CallbackState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, CallbackRejection> {
    let delivery_id = header_str(&headers, DELIVERY_HEADER).unwrap_or_default();
    let signature = header_str(&headers, SIGNATURE_HEADER);

    if let Err(reason) = state.verifier.check(&body, signature) {
        tracing::warn!(delivery_id = %delivery_id, reason = %reason, "Rejected delivery");
        return Err(CallbackRejection::InvalidSignature);
    }

    let event_type = header_str(&headers, EVENT_HEADER)
        .filter(|e| !e.is_empty())
        .ok_or(CallbackRejection::MissingEventType)?;

    if !state.filter.admits(event_type) {
        tracing::debug!(
            delivery_id = %delivery_id,
            event_type = %event_type,
            "Ignoring delivery for unsubscribed event"
        );
        return Ok(StatusCode::OK);
    }

    tracing::info!(
        delivery_id = %delivery_id,
        event_type = %event_type,
        size = body.len(),
        "Accepted delivery"
    );

    let mut delivery = Delivery::new(event_type, delivery_id, body);
    if let Some(signature) = signature {
        delivery = delivery.with_signature(signature);
    }
    state.dispatcher.dispatch(delivery);

    Ok(StatusCode::OK)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

// ════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════

/// Reasons a delivery is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackRejection {
    /// Missing, malformed or wrong signature alike.
    InvalidSignature,
    /// Authentic request without an event type header.
    MissingEventType,
}

impl IntoResponse for CallbackRejection {
    fn into_response(self) -> Response {
        match self {
            CallbackRejection::InvalidSignature => {
                (StatusCode::FORBIDDEN, "invalid signature").into_response()
            }
            CallbackRejection::MissingEventType => {
                (StatusCode::BAD_REQUEST, "missing X-GitHub-Event header").into_response()
            }
        }
    }
}
