//! ACME certificate issuer.
//!
//! Runs the order → authorize → HTTP-01 challenge → finalize exchange with
//! `instant-acme`. Challenge responses are published to the shared
//! [`ChallengeStore`] that the plain-HTTP listener serves, and withdrawn when
//! the order ends, including when it times out or is cancelled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, HttpClient, Identifier,
    NewAccount, NewOrder, Order, OrderStatus,
};
use rcgen::{CertificateParams, DistinguishedName, KeyPair};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::TlsConfig;
use crate::ports::{CertificateError, CertificateIssuer, CertificateStore, StoredCertificate};

use super::challenge::ChallengeStore;

const INITIAL_POLL_DELAY: Duration = Duration::from_millis(250);
const MAX_POLL_DELAY: Duration = Duration::from_secs(5);

impl From<instant_acme::Error> for CertificateError {
    fn from(e: instant_acme::Error) -> Self {
        CertificateError::Acme(e.to_string())
    }
}

impl From<rcgen::Error> for CertificateError {
    fn from(e: rcgen::Error) -> Self {
        CertificateError::Csr(e.to_string())
    }
}

/// Builds the HTTP client an ACME account talks through.
pub type HttpClientFactory = Arc<dyn Fn() -> Box<dyn HttpClient> + Send + Sync>;

/// Obtains certificates from an ACME certificate authority.
pub struct AcmeIssuer {
    directory_url: String,
    contacts: Vec<String>,
    store: Arc<dyn CertificateStore>,
    challenges: ChallengeStore,
    order_timeout: Duration,
    cancel: CancellationToken,
    http: Option<HttpClientFactory>,
}

/// Challenge tokens published for one order. Dropping it withdraws them.
struct PublishedChallenges<'a> {
    store: &'a ChallengeStore,
    tokens: Vec<String>,
}

impl<'a> PublishedChallenges<'a> {
    fn new(store: &'a ChallengeStore) -> Self {
        Self {
            store,
            tokens: Vec::new(),
        }
    }

    fn publish(&mut self, token: &str, key_authorization: &str) {
        self.store.insert(token, key_authorization);
        self.tokens.push(token.to_string());
    }
}

impl Drop for PublishedChallenges<'_> {
    fn drop(&mut self) {
        for token in &self.tokens {
            self.store.remove(token);
        }
    }
}

impl AcmeIssuer {
    pub fn new(
        config: &TlsConfig,
        store: Arc<dyn CertificateStore>,
        challenges: ChallengeStore,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            directory_url: config.ca_directory_url.clone(),
            contacts: config.contacts(),
            store,
            challenges,
            order_timeout: config.challenge_timeout(),
            cancel,
            http: None,
        }
    }

    /// Talk to the directory through `factory` instead of the default
    /// HTTPS client, e.g. for a private CA behind a custom trust root.
    pub fn with_http_client(mut self, factory: HttpClientFactory) -> Self {
        self.http = Some(factory);
        self
    }

    async fn restore_account(
        &self,
        credentials: AccountCredentials,
    ) -> Result<Account, instant_acme::Error> {
        match &self.http {
            Some(factory) => Account::from_credentials_and_http(credentials, factory()).await,
            None => Account::from_credentials(credentials).await,
        }
    }

    /// Reuses cached account credentials for this directory, or registers
    /// a new account and caches its credentials.
    async fn account(&self) -> Result<Account, CertificateError> {
        if let Some(json) = self.store.load_account(&self.directory_url).await? {
            match serde_json::from_str::<AccountCredentials>(&json) {
                Ok(credentials) => match self.restore_account(credentials).await {
                    Ok(account) => return Ok(account),
                    Err(e) => {
                        tracing::warn!(error = %e, "Cached ACME account unusable, registering a new one")
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Cached ACME account is corrupt, registering a new one")
                }
            }
        }

        let contacts: Vec<&str> = self.contacts.iter().map(String::as_str).collect();
        let new_account = NewAccount {
            contact: &contacts,
            terms_of_service_agreed: true,
            only_return_existing: false,
        };
        let (account, credentials) = match &self.http {
            Some(factory) => {
                Account::create_with_http(&new_account, &self.directory_url, None, factory())
                    .await?
            }
            None => Account::create(&new_account, &self.directory_url, None).await?,
        };

        let json = serde_json::to_string(&credentials)
            .map_err(|e| CertificateError::Acme(format!("failed to serialize account: {}", e)))?;
        self.store.save_account(&self.directory_url, &json).await?;
        tracing::info!(directory = %self.directory_url, "Registered ACME account");

        Ok(account)
    }

    async fn run_order(&self, domain: &str) -> Result<StoredCertificate, CertificateError> {
        let account = self.account().await?;
        let mut order = account
            .new_order(&NewOrder {
                identifiers: &[Identifier::Dns(domain.to_string())],
            })
            .await?;

        let mut published = PublishedChallenges::new(&self.challenges);
        self.complete_order(&mut order, domain, &mut published).await
    }

    async fn complete_order(
        &self,
        order: &mut Order,
        domain: &str,
        published: &mut PublishedChallenges<'_>,
    ) -> Result<StoredCertificate, CertificateError> {
        let authorizations = order.authorizations().await?;
        let mut ready = Vec::new();

        for authz in &authorizations {
            match authz.status {
                AuthorizationStatus::Pending => {}
                AuthorizationStatus::Valid => continue,
                other => return Err(CertificateError::OrderFailed(format!("authorization {:?}", other))),
            }

            let challenge = authz
                .challenges
                .iter()
                .find(|c| c.r#type == ChallengeType::Http01)
                .ok_or(CertificateError::ChallengeUnavailable("http-01"))?;

            let key_authorization = order.key_authorization(challenge);
            published.publish(&challenge.token, key_authorization.as_str());
            ready.push(challenge.url.clone());
        }

        for url in &ready {
            order.set_challenge_ready(url).await?;
        }
        tracing::debug!(domain = %domain, challenges = ready.len(), "ACME challenges ready");

        let mut delay = INITIAL_POLL_DELAY;
        loop {
            sleep(delay).await;
            let state = order.refresh().await?;
            match state.status {
                OrderStatus::Ready => break,
                OrderStatus::Invalid => {
                    return Err(CertificateError::OrderFailed("invalid".to_string()))
                }
                _ => delay = (delay * 2).min(MAX_POLL_DELAY),
            }
        }

        let mut params = CertificateParams::new(vec![domain.to_string()])?;
        params.distinguished_name = DistinguishedName::new();
        let key_pair = KeyPair::generate()?;
        let csr = params.serialize_request(&key_pair)?;
        order.finalize(csr.der().as_ref()).await?;

        let mut delay = INITIAL_POLL_DELAY;
        let cert_chain_pem = loop {
            match order.certificate().await? {
                Some(pem) => break pem,
                None => {
                    sleep(delay).await;
                    delay = (delay * 2).min(MAX_POLL_DELAY);
                }
            }
        };

        Ok(StoredCertificate {
            cert_chain_pem,
            private_key_pem: key_pair.serialize_pem(),
        })
    }
}

#[async_trait]
impl CertificateIssuer for AcmeIssuer {
    async fn issue(&self, domain: &str) -> Result<StoredCertificate, CertificateError> {
        tracing::info!(domain = %domain, directory = %self.directory_url, "Ordering certificate");

        let certificate = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(CertificateError::Cancelled),
            result = timeout(self.order_timeout, self.run_order(domain)) => match result {
                Ok(certificate) => certificate?,
                Err(_) => {
                    return Err(CertificateError::Timeout {
                        timeout_secs: self.order_timeout.as_secs(),
                    })
                }
            },
        };

        if let Err(e) = self.store.save_certificate(domain, &certificate).await {
            tracing::warn!(domain = %domain, error = %e, "Failed to cache issued certificate");
        }
        tracing::info!(domain = %domain, "Certificate issued");
        Ok(certificate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::acme::FileCertificateStore;
    use bytes::Bytes;
    use http_body_util::Full;
    use hyper_util::client::legacy::{connect::HttpConnector, Client as HyperClient};
    use hyper_util::rt::TokioExecutor;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOMAIN: &str = "hooks.example.com";
    const TOKEN: &str = "http01-token";
    const CERT_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

    fn tls_config(directory: &str, timeout_secs: u64) -> TlsConfig {
        TlsConfig {
            enabled: true,
            domain: DOMAIN.to_string(),
            accept_tos: true,
            ca_directory_url: directory.to_string(),
            challenge_timeout_secs: timeout_secs,
            ..TlsConfig::default()
        }
    }

    fn plain_http() -> HttpClientFactory {
        Arc::new(|| {
            let client: HyperClient<HttpConnector, Full<Bytes>> =
                HyperClient::builder(TokioExecutor::new()).build_http();
            Box::new(client) as Box<dyn HttpClient>
        })
    }

    fn issuer(
        server: &MockServer,
        timeout_secs: u64,
        store: Arc<dyn CertificateStore>,
        challenges: &ChallengeStore,
    ) -> AcmeIssuer {
        AcmeIssuer::new(
            &tls_config(&format!("{}/directory", server.uri()), timeout_secs),
            store,
            challenges.clone(),
            CancellationToken::new(),
        )
        .with_http_client(plain_http())
    }

    /// A certificate authority whose order moves to `order_status` once the
    /// challenge is marked ready. Account registrations must number `accounts`.
    async fn certificate_authority(order_status: &str, accounts: u64) -> MockServer {
        let server = MockServer::start().await;
        let uri = server.uri();

        Mock::given(method("GET"))
            .and(path("/directory"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "newNonce": format!("{}/nonce", uri),
                "newAccount": format!("{}/account", uri),
                "newOrder": format!("{}/order", uri),
            })))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/nonce"))
            .respond_with(ResponseTemplate::new(200).insert_header("Replay-Nonce", "nonce"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/account"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("{}/account/1", uri).as_str())
                    .set_body_json(json!({"status": "valid"})),
            )
            .expect(accounts)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("{}/order/1", uri).as_str())
                    .set_body_json(json!({
                        "status": "pending",
                        "authorizations": [format!("{}/authz/1", uri)],
                        "finalize": format!("{}/finalize/1", uri),
                    })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/authz/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "pending",
                "identifier": {"type": "dns", "value": DOMAIN},
                "challenges": [
                    {"type": "dns-01", "url": format!("{}/chall/2", uri), "token": "dns-token", "status": "pending"},
                    {"type": "http-01", "url": format!("{}/chall/1", uri), "token": TOKEN, "status": "pending"},
                ],
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chall/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "http-01",
                "url": format!("{}/chall/1", uri),
                "token": TOKEN,
                "status": "processing",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/order/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": order_status,
                "authorizations": [format!("{}/authz/1", uri)],
                "finalize": format!("{}/finalize/1", uri),
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/finalize/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "valid",
                "authorizations": [format!("{}/authz/1", uri)],
                "finalize": format!("{}/finalize/1", uri),
                "certificate": format!("{}/cert/1", uri),
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/cert/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CERT_PEM))
            .mount(&server)
            .await;

        server
    }

    /// Delegates to a file store but refuses to cache certificates.
    struct CertificateCacheFull(FileCertificateStore);

    #[async_trait]
    impl CertificateStore for CertificateCacheFull {
        async fn load_certificate(&self, domain: &str) -> std::io::Result<Option<StoredCertificate>> {
            self.0.load_certificate(domain).await
        }

        async fn save_certificate(
            &self,
            _domain: &str,
            _certificate: &StoredCertificate,
        ) -> std::io::Result<()> {
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
        }

        async fn load_account(&self, directory_url: &str) -> std::io::Result<Option<String>> {
            self.0.load_account(directory_url).await
        }

        async fn save_account(&self, directory_url: &str, credentials: &str) -> std::io::Result<()> {
            self.0.save_account(directory_url, credentials).await
        }
    }

    #[tokio::test]
    async fn cancelled_issuer_returns_cancelled() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let issuer = AcmeIssuer::new(
            &tls_config("http://127.0.0.1:1/directory", 5),
            Arc::new(FileCertificateStore::new(dir.path())),
            ChallengeStore::new(),
            cancel,
        );

        let err = issuer.issue(DOMAIN).await.unwrap_err();

        assert!(matches!(err, CertificateError::Cancelled));
    }

    #[tokio::test]
    async fn ready_order_issues_and_caches_certificate() {
        let server = certificate_authority("ready", 1).await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileCertificateStore::new(dir.path()));
        let challenges = ChallengeStore::new();
        let issuer = issuer(&server, 10, store.clone(), &challenges);

        let certificate = issuer.issue(DOMAIN).await.unwrap();

        assert_eq!(certificate.cert_chain_pem, CERT_PEM);
        assert!(certificate.private_key_pem.contains("PRIVATE KEY"));
        let cached = store.load_certificate(DOMAIN).await.unwrap().unwrap();
        assert_eq!(cached.cert_chain_pem, CERT_PEM);
        assert!(challenges.is_empty());
    }

    #[tokio::test]
    async fn invalid_order_fails_and_withdraws_challenge() {
        let server = certificate_authority("invalid", 1).await;
        let dir = TempDir::new().unwrap();
        let challenges = ChallengeStore::new();
        let issuer = issuer(
            &server,
            10,
            Arc::new(FileCertificateStore::new(dir.path())),
            &challenges,
        );

        let err = issuer.issue(DOMAIN).await.unwrap_err();

        assert!(matches!(err, CertificateError::OrderFailed(ref reason) if reason == "invalid"));
        assert!(challenges.is_empty());
    }

    #[tokio::test]
    async fn stalled_order_times_out_and_withdraws_challenge() {
        let server = certificate_authority("pending", 1).await;
        let dir = TempDir::new().unwrap();
        let challenges = ChallengeStore::new();
        let issuer = Arc::new(issuer(
            &server,
            2,
            Arc::new(FileCertificateStore::new(dir.path())),
            &challenges,
        ));

        let handle = tokio::spawn({
            let issuer = issuer.clone();
            async move { issuer.issue(DOMAIN).await }
        });

        let mut published = None;
        for _ in 0..150 {
            published = challenges.get(TOKEN);
            if published.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let key_authorization = published.expect("challenge was never published");
        assert!(key_authorization.starts_with(&format!("{}.", TOKEN)));
        assert!(challenges.get("dns-token").is_none());

        let err = handle.await.unwrap().unwrap_err();

        assert!(matches!(err, CertificateError::Timeout { timeout_secs: 2 }));
        assert!(challenges.is_empty());
    }

    #[tokio::test]
    async fn cached_account_is_reused_across_orders() {
        let server = certificate_authority("invalid", 1).await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileCertificateStore::new(dir.path()));
        let challenges = ChallengeStore::new();
        let issuer = issuer(&server, 10, store.clone(), &challenges);

        issuer.issue(DOMAIN).await.unwrap_err();
        issuer.issue(DOMAIN).await.unwrap_err();

        let directory = format!("{}/directory", server.uri());
        assert!(store.load_account(&directory).await.unwrap().is_some());
        server.verify().await;
    }

    #[tokio::test]
    async fn certificate_cache_failure_still_returns_certificate() {
        let server = certificate_authority("ready", 1).await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(CertificateCacheFull(FileCertificateStore::new(dir.path())));
        let challenges = ChallengeStore::new();
        let issuer = issuer(&server, 10, store.clone(), &challenges);

        let certificate = issuer.issue(DOMAIN).await.unwrap();

        assert_eq!(certificate.cert_chain_pem, CERT_PEM);
        assert!(store.load_certificate(DOMAIN).await.unwrap().is_none());
    }
}
