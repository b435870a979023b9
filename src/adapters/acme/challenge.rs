//! HTTP-01 challenge table.
//!
//! The issuer publishes key authorizations here while an order is pending;
//! the plain-HTTP listener answers `/.well-known/acme-challenge/{token}`
//! from it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

/// Path prefix of HTTP-01 challenge requests.
pub const CHALLENGE_PATH_PREFIX: &str = "/.well-known/acme-challenge/";

/// Pending HTTP-01 key authorizations, keyed by token.
#[derive(Debug, Clone, Default)]
pub struct ChallengeStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, key_authorization: impl Into<String>) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(token.into(), key_authorization.into());
    }

    pub fn remove(&self, token: &str) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.remove(token);
    }

    pub fn get(&self, token: &str) -> Option<String> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Router answering HTTP-01 challenge requests.
pub fn challenge_router(store: ChallengeStore) -> Router {
    Router::new()
        .route("/.well-known/acme-challenge/:token", get(serve_challenge))
        .with_state(store)
}

async fn serve_challenge(
    State(store): State<ChallengeStore>,
    Path(token): Path<String>,
) -> Response {
    match store.get(&token) {
        Some(key_authorization) => {
            tracing::debug!(token = %token, "Serving ACME challenge");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/octet-stream")],
                key_authorization,
            )
                .into_response()
        }
        None => {
            tracing::debug!(token = %token, "Unknown ACME challenge token");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_token(router: Router, token: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("{}{}", CHALLENGE_PATH_PREFIX, token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn insert_get_remove() {
        let store = ChallengeStore::new();
        assert!(store.is_empty());

        store.insert("tok", "tok.thumb");
        assert_eq!(store.get("tok").as_deref(), Some("tok.thumb"));
        assert_eq!(store.len(), 1);

        store.remove("tok");
        assert!(store.get("tok").is_none());
    }

    #[test]
    fn clones_share_state() {
        let store = ChallengeStore::new();
        let clone = store.clone();
        clone.insert("a", "b");
        assert_eq!(store.get("a").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn router_serves_known_token() {
        let store = ChallengeStore::new();
        store.insert("abc123", "abc123.thumbprint");

        let (status, body) = get_token(challenge_router(store), "abc123").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "abc123.thumbprint");
    }

    #[tokio::test]
    async fn router_returns_404_for_unknown_token() {
        let (status, _) = get_token(challenge_router(ChallengeStore::new()), "nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
