//! Plain-HTTP router used while TLS is enabled.
//!
//! Answers ACME HTTP-01 challenges and redirects the callback path to its
//! HTTPS equivalent. Everything else is 404.

use axum::{response::IntoResponse, routing::any, Router};
use http::{header, StatusCode};
use tower_http::trace::TraceLayer;

use crate::adapters::acme::{challenge_router, ChallengeStore};

/// Create the bootstrap router.
///
/// # Routes
/// - `GET /.well-known/acme-challenge/:token` - HTTP-01 key authorization
/// - `ANY {callback_path}` - 308 to `https_url`
pub fn bootstrap_router(challenges: ChallengeStore, callback_path: &str, https_url: &str) -> Router {
    let location = https_url.to_string();

    challenge_router(challenges)
        .route(
            callback_path,
            any(move || {
                let location = location.clone();
                async move {
                    (StatusCode::PERMANENT_REDIRECT, [(header::LOCATION, location)]).into_response()
                }
            }),
        )
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(TraceLayer::new_for_http())
}
