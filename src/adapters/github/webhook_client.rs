//! GitHub webhook client.
//!
//! Implements the `WebhookRegistry` port against the GitHub REST API
//! (`POST`/`DELETE /repos/{owner}/{repo}/hooks`), authenticating with a
//! bearer token.
//!
//! # Configuration
//!
//! ```ignore
//! let config = GitHubClientConfig::new(token)
//!     .with_base_url("https://github.example.com/api/v3")
//!     .with_max_retries(3);
//! let client = GitHubWebhookClient::new(config)?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::sleep;

use crate::config::GithubConfig;
use crate::ports::{CreateHookRequest, RegistryError, WebhookRegistration, WebhookRegistry};

use super::types::{ApiErrorBody, CreateHookBody, HookConfigBody, HookResponse};

/// REST API version pinned in every request.
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Media type GitHub recommends for REST requests.
const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Configuration for the GitHub client.
#[derive(Debug, Clone)]
pub struct GitHubClientConfig {
    /// Bearer token.
    token: SecretString,
    /// Base URL for the API (default: https://api.github.com).
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retries of hook creation on transient failures.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each attempt.
    pub retry_base_delay: Duration,
}

impl GitHubClientConfig {
    /// Creates a new configuration with the given token.
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
            base_url: "https://api.github.com".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }

    /// Builds client configuration from the `github` config section.
    pub fn from_config(config: &GithubConfig) -> Self {
        Self::new(config.token.clone())
            .with_base_url(config.api_base_url.clone())
            .with_timeout(config.request_timeout())
            .with_max_retries(config.create_retries)
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the initial retry delay.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }
}

/// GitHub repository hooks client.
pub struct GitHubWebhookClient {
    config: GitHubClientConfig,
    client: Client,
}

impl GitHubWebhookClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: GitHubClientConfig) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("github-responder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn hooks_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}/hooks", self.config.base_url, owner, repo)
    }

    fn hook_url(&self, registration: &WebhookRegistration) -> String {
        format!(
            "{}/{}",
            self.hooks_url(&registration.owner, &registration.repo),
            registration.id
        )
    }

    fn map_send_error(&self, e: reqwest::Error) -> RegistryError {
        if e.is_timeout() {
            RegistryError::Timeout {
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else if e.is_connect() {
            RegistryError::Network(format!("Connection failed: {}", e))
        } else {
            RegistryError::Network(e.to_string())
        }
    }

    /// One create attempt.
    async fn try_create(
        &self,
        request: &CreateHookRequest,
    ) -> Result<WebhookRegistration, RegistryError> {
        let body = CreateHookBody {
            name: "web",
            active: true,
            events: &request.events,
            config: HookConfigBody {
                url: &request.callback_url,
                content_type: "json",
                secret: request.secret.expose_secret(),
                insecure_ssl: "0",
            },
        };

        let response = self
            .client
            .post(self.hooks_url(&request.owner, &request.repo))
            .bearer_auth(self.config.token.expose_secret())
            .header(reqwest::header::ACCEPT, GITHUB_MEDIA_TYPE)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(classify_create_failure(response).await);
        }

        let hook: HookResponse = response.json().await.map_err(|e| RegistryError::Api {
            status: 201,
            message: format!("Failed to parse hook response: {}", e),
        })?;

        Ok(WebhookRegistration {
            id: hook.id,
            owner: request.owner.clone(),
            repo: request.repo.clone(),
            callback_url: request.callback_url.clone(),
            events: if hook.events.is_empty() {
                request.events.clone()
            } else {
                hook.events
            },
            created_at: hook.created_at.unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl WebhookRegistry for GitHubWebhookClient {
    async fn create(
        &self,
        request: &CreateHookRequest,
    ) -> Result<WebhookRegistration, RegistryError> {
        let mut retry_count = 0;

        loop {
            match self.try_create(request).await {
                Ok(registration) => {
                    tracing::info!(
                        hook_id = registration.id,
                        owner = %registration.owner,
                        repo = %registration.repo,
                        events = ?registration.events,
                        "Webhook created"
                    );
                    return Ok(registration);
                }
                Err(err) if err.is_retryable() && retry_count < self.config.max_retries => {
                    // Exponential backoff: base, 2x base, 4x base, ...
                    let delay = self.config.retry_base_delay * 2u32.pow(retry_count);
                    tracing::warn!(
                        error = %err,
                        attempt = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Webhook creation failed, retrying"
                    );
                    sleep(delay).await;
                    retry_count += 1;
                }
                Err(err) => {
                    tracing::error!(error = %err, "Webhook creation failed");
                    return Err(err);
                }
            }
        }
    }

    async fn delete(&self, registration: &WebhookRegistration) -> Result<(), RegistryError> {
        let response = self
            .client
            .delete(self.hook_url(registration))
            .bearer_auth(self.config.token.expose_secret())
            .header(reqwest::header::ACCEPT, GITHUB_MEDIA_TYPE)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            tracing::info!(hook_id = registration.id, "Webhook already gone");
            return Ok(());
        }

        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(match status {
                StatusCode::UNAUTHORIZED => RegistryError::Auth(body.summary()),
                StatusCode::FORBIDDEN => RegistryError::Permission(body.summary()),
                _ => RegistryError::Api {
                    status: status.as_u16(),
                    message: body.summary(),
                },
            });
        }

        tracing::info!(hook_id = registration.id, "Webhook deleted");
        Ok(())
    }
}

async fn read_error_body(response: Response) -> ApiErrorBody {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or(ApiErrorBody {
        message: text,
        errors: Vec::new(),
    })
}

/// Maps a failed create response onto the registry error taxonomy.
///
/// GitHub answers 404 rather than 403 when the token cannot see the
/// repository's hooks, so both count as a permission problem.
async fn classify_create_failure(response: Response) -> RegistryError {
    let status = response.status();
    let body = read_error_body(response).await;

    match status {
        StatusCode::UNAUTHORIZED => RegistryError::Auth(body.summary()),
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => RegistryError::Permission(body.summary()),
        StatusCode::UNPROCESSABLE_ENTITY if body.is_duplicate_hook() => {
            RegistryError::Conflict(body.summary())
        }
        _ => RegistryError::Api {
            status: status.as_u16(),
            message: body.summary(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "ghp_test_token";

    fn client(server: &MockServer) -> GitHubWebhookClient {
        let config = GitHubClientConfig::new(SecretString::new(TOKEN.to_string()))
            .with_base_url(server.uri())
            .with_max_retries(2)
            .with_retry_base_delay(Duration::from_millis(10));
        GitHubWebhookClient::new(config).unwrap()
    }

    fn request() -> CreateHookRequest {
        CreateHookRequest {
            owner: "acme".to_string(),
            repo: "widget".to_string(),
            callback_url: "https://hooks.example.com/gh-callback/abc".to_string(),
            secret: SecretString::new("s3cr3t".to_string()),
            events: vec!["push".to_string()],
        }
    }

    fn registration(id: u64) -> WebhookRegistration {
        WebhookRegistration {
            id,
            owner: "acme".to_string(),
            repo: "widget".to_string(),
            callback_url: "https://hooks.example.com/gh-callback/abc".to_string(),
            events: vec!["push".to_string()],
            created_at: Utc::now(),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Create
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn create_posts_hook_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widget/hooks"))
            .and(header("authorization", "Bearer ghp_test_token"))
            .and(body_partial_json(json!({
                "name": "web",
                "events": ["push"],
                "config": {
                    "url": "https://hooks.example.com/gh-callback/abc",
                    "content_type": "json",
                    "secret": "s3cr3t"
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 4242,
                "events": ["push"],
                "created_at": "2024-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registration = client(&server).create(&request()).await.unwrap();

        assert_eq!(registration.id, 4242);
        assert_eq!(registration.owner, "acme");
        assert_eq!(registration.events, vec!["push"]);
        assert_eq!(registration.created_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn create_maps_unauthorized_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).create(&request()).await.unwrap_err();

        assert_eq!(err, RegistryError::Auth("Bad credentials".to_string()));
    }

    #[tokio::test]
    async fn create_maps_forbidden_and_not_found_to_permission_error() {
        for status in [403, 404] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(
                    ResponseTemplate::new(status).set_body_json(json!({"message": "Not Found"})),
                )
                .mount(&server)
                .await;

            let err = client(&server).create(&request()).await.unwrap_err();

            assert!(matches!(err, RegistryError::Permission(_)), "status {}", status);
        }
    }

    #[tokio::test]
    async fn create_maps_duplicate_hook_to_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Validation Failed",
                "errors": [{"message": "Hook already exists on this repository"}]
            })))
            .mount(&server)
            .await;

        let err = client(&server).create(&request()).await.unwrap_err();

        assert!(matches!(err, RegistryError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let registration = client(&server).create(&request()).await.unwrap();

        assert_eq!(registration.id, 7);
    }

    #[tokio::test]
    async fn create_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server).create(&request()).await.unwrap_err();

        assert!(matches!(err, RegistryError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn create_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client(&server).create(&request()).await.is_err());
    }

    #[tokio::test]
    async fn create_reports_network_error_when_unreachable() {
        let config = GitHubClientConfig::new(SecretString::new(TOKEN.to_string()))
            .with_base_url("http://127.0.0.1:1")
            .with_max_retries(0);
        let client = GitHubWebhookClient::new(config).unwrap();

        let err = client.create(&request()).await.unwrap_err();

        assert!(matches!(err, RegistryError::Network(_)));
    }

    // ══════════════════════════════════════════════════════════════
    // Delete
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn delete_issues_delete_for_hook_id() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/repos/acme/widget/hooks/4242"))
            .and(header("authorization", "Bearer ghp_test_token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).delete(&registration(4242)).await.unwrap();
    }

    #[tokio::test]
    async fn delete_treats_not_found_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server).delete(&registration(1)).await.is_ok());
    }

    #[tokio::test]
    async fn delete_reports_other_failures() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let err = client(&server).delete(&registration(1)).await.unwrap_err();

        assert_eq!(
            err,
            RegistryError::Api {
                status: 500,
                message: "oops".to_string()
            }
        );
    }
}
