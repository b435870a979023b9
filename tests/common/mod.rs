//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use github_responder::adapters::{FixedSecretSource, GitHubClientConfig, GitHubWebhookClient};
use github_responder::config::ResponderConfig;
use github_responder::domain::{Delivery, DeliveryVerifier};
use github_responder::ports::{handler_fn, DeliveryHandler};

pub const OWNER: &str = "acme";
pub const REPO: &str = "widget";
pub const SECRET: &str = "s3cr3t";
pub const CALLBACK_TOKEN: &str = "0d7a3b9e-5c41-4f0e-8f7d-6a2b1c9e4d30";
pub const HOOK_ID: u64 = 12345678;
pub const DOMAIN: &str = "hooks.example.com";

pub const PUSH_BODY: &str = r#"{"ref":"refs/heads/main","before":"9049f126","after":"0d1a26e6","commits":[{"id":"0d1a26e6","message":"Update README","added":[],"modified":["README.md"],"removed":[]}],"repository":{"full_name":"acme/widget"}}"#;

// =============================================================================
// Stub GitHub
// =============================================================================

/// Mounts create and delete endpoints for the test repository.
pub async fn stub_github(server: &MockServer, expected_creates: u64, expected_deletes: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/repos/{}/{}/hooks", OWNER, REPO)))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": HOOK_ID,
            "name": "web",
            "active": true,
            "events": ["push"],
            "created_at": "2024-05-01T12:00:00Z"
        })))
        .expect(expected_creates)
        .mount(server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(format!("/repos/{}/{}/hooks/{}", OWNER, REPO, HOOK_ID)))
        .respond_with(ResponseTemplate::new(204))
        .expect(expected_deletes)
        .mount(server)
        .await;
}

/// Requests the stub received, as `(method, path)`.
pub async fn recorded(server: &MockServer) -> Vec<(String, String)> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|r| (r.method.to_string(), r.url.path().to_string()))
        .collect()
}

pub fn github_client(server: &MockServer) -> Arc<GitHubWebhookClient> {
    let config = GitHubClientConfig::new(SecretString::new("ghp_integration".to_string()))
        .with_base_url(server.uri())
        .with_max_retries(0);
    Arc::new(GitHubWebhookClient::new(config).unwrap())
}

// =============================================================================
// Session inputs
// =============================================================================

/// Plain-HTTP session config on an ephemeral port.
pub fn plain_config(server: &MockServer) -> ResponderConfig {
    let mut config = ResponderConfig::default();
    config.github.repo = format!("{}/{}", OWNER, REPO);
    config.github.token = SecretString::new("ghp_integration".to_string());
    config.github.events = vec!["push".to_string()];
    config.github.api_base_url = server.uri();
    config.github.delete_timeout_secs = 2;
    config.server.http_address = "127.0.0.1:0".to_string();
    config.server.grace_period_secs = 2;
    config.tls.enabled = false;
    config.tls.domain = DOMAIN.to_string();
    config
}

pub fn secrets() -> Arc<FixedSecretSource> {
    Arc::new(FixedSecretSource::new(SECRET, CALLBACK_TOKEN))
}

pub fn callback_path() -> String {
    format!("/gh-callback/{}", CALLBACK_TOKEN)
}

/// Handler that records the event types it sees.
pub struct Recorder {
    pub calls: Arc<AtomicUsize>,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> (Self, Arc<dyn DeliveryHandler>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let events = Arc::new(Mutex::new(Vec::new()));
        let (c, e) = (calls.clone(), events.clone());
        let handler = handler_fn(move |delivery: Delivery| {
            let (c, e) = (c.clone(), e.clone());
            async move {
                e.lock().unwrap().push(delivery.event_type.clone());
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        (Self { calls, events }, Arc::new(handler))
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Count once in-flight handlers have had a moment to run.
    pub async fn settled_count(&self, expected: usize) -> usize {
        for _ in 0..50 {
            if self.count() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.count()
    }
}

// =============================================================================
// Deliveries
// =============================================================================

pub fn sign(secret: &str, body: &str) -> String {
    DeliveryVerifier::new(SecretString::new(secret.to_string())).sign(body.as_bytes())
}

/// POST a delivery signed with `secret`; returns the status code.
pub async fn post_delivery(
    client: &reqwest::Client,
    url: &str,
    event: &str,
    secret: &str,
    body: &str,
) -> u16 {
    client
        .post(url)
        .header("Content-Type", "application/json")
        .header("X-GitHub-Event", event)
        .header("X-GitHub-Delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958")
        .header("X-Hub-Signature-256", sign(secret, body))
        .body(body.to_string())
        .send()
        .await
        .unwrap()
        .status()
        .as_u16()
}

pub fn local_url(addr: SocketAddr, path: &str) -> String {
    format!("http://{}{}", addr, path)
}

/// An address nothing is listening on.
pub fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
