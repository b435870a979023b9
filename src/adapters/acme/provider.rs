//! On-demand TLS certificates.
//!
//! `CertificateProvider` hands the TLS listener a rustls `ServerConfig`
//! whose certificate resolver reads a single swappable slot. The first
//! handshake for the configured domain fills the slot from the cache or,
//! failing that, from the issuer. Renewal near expiry runs in the
//! background and replaces the slot contents in one write, so concurrent
//! handshakes see either the old certificate or the new one. A failed
//! renewal is not retried until `RENEWAL_RETRY_BACKOFF` has passed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use tokio::sync::Mutex;

use crate::config::TlsConfig;
use crate::ports::{CertificateError, CertificateIssuer, CertificateStore, StoredCertificate};

/// Pause after a failed renewal before a handshake may start another order.
const RENEWAL_RETRY_BACKOFF: Duration = Duration::from_secs(10 * 60);

/// A parsed certificate ready to serve.
#[derive(Clone)]
struct ServedCertificate {
    key: Arc<CertifiedKey>,
    not_after: DateTime<Utc>,
}

/// Resolver backed by the provider's slot.
#[derive(Debug, Default)]
struct SlotResolver {
    slot: RwLock<Option<Arc<CertifiedKey>>>,
}

impl SlotResolver {
    fn swap(&self, key: Arc<CertifiedKey>) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(key);
    }
}

impl ResolvesServerCert for SlotResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Obtains, caches and renews the certificate for one domain.
pub struct CertificateProvider {
    domain: String,
    store: Arc<dyn CertificateStore>,
    issuer: Arc<dyn CertificateIssuer>,
    renew_before: chrono::Duration,
    crypto: Arc<CryptoProvider>,
    resolver: Arc<SlotResolver>,
    server_config: Arc<ServerConfig>,
    current: RwLock<Option<ServedCertificate>>,
    obtain: Mutex<()>,
    renewing: AtomicBool,
    renewal_failed_at: RwLock<Option<Instant>>,
    renewal_backoff: Duration,
}

impl CertificateProvider {
    pub fn new(
        config: &TlsConfig,
        store: Arc<dyn CertificateStore>,
        issuer: Arc<dyn CertificateIssuer>,
    ) -> Result<Self, CertificateError> {
        let crypto = Arc::new(rustls::crypto::ring::default_provider());
        let resolver = Arc::new(SlotResolver::default());

        let mut server_config = ServerConfig::builder_with_provider(crypto.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| CertificateError::InvalidCertificate(e.to_string()))?
            .with_no_client_auth()
            .with_cert_resolver(resolver.clone());
        server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Self {
            domain: config.domain.trim().to_ascii_lowercase(),
            store,
            issuer,
            renew_before: config.renew_before(),
            crypto,
            resolver,
            server_config: Arc::new(server_config),
            current: RwLock::new(None),
            obtain: Mutex::new(()),
            renewing: AtomicBool::new(false),
            renewal_failed_at: RwLock::new(None),
            renewal_backoff: RENEWAL_RETRY_BACKOFF,
        })
    }

    /// Expiry of the certificate currently served, if any.
    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| c.not_after)
    }

    /// TLS configuration for a handshake that asked for `server_name`.
    ///
    /// Blocks the handshake only when no usable certificate exists yet.
    /// A failure here fails this handshake; the next one tries again.
    pub async fn server_config(
        self: &Arc<Self>,
        server_name: Option<&str>,
    ) -> Result<Arc<ServerConfig>, CertificateError> {
        if let Some(name) = server_name {
            if !name.eq_ignore_ascii_case(&self.domain) {
                return Err(CertificateError::UnknownServerName {
                    requested: Some(name.to_string()),
                    expected: self.domain.clone(),
                });
            }
        }

        let now = Utc::now();
        match self.not_after() {
            Some(not_after) if not_after > now => {
                if not_after - now <= self.renew_before {
                    self.spawn_renewal();
                }
            }
            _ => self.obtain(now).await?,
        }

        Ok(self.server_config.clone())
    }

    /// Fills the slot from the cache or the issuer. Single-flight.
    async fn obtain(&self, now: DateTime<Utc>) -> Result<(), CertificateError> {
        let _guard = self.obtain.lock().await;

        if matches!(self.not_after(), Some(not_after) if not_after > now) {
            return Ok(());
        }

        match self.store.load_certificate(&self.domain).await {
            Ok(Some(cached)) => match self.parse(&cached) {
                Ok(served) if served.not_after > now => {
                    tracing::info!(
                        domain = %self.domain,
                        not_after = %served.not_after,
                        "Loaded cached certificate"
                    );
                    self.install(served);
                    return Ok(());
                }
                Ok(_) => tracing::info!(domain = %self.domain, "Cached certificate expired"),
                Err(e) => tracing::warn!(domain = %self.domain, error = %e, "Ignoring unreadable cached certificate"),
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(domain = %self.domain, error = %e, "Certificate cache unavailable, ordering a new certificate")
            }
        }

        let issued = self.issuer.issue(&self.domain).await?;
        let served = self.parse(&issued)?;
        self.install(served);
        Ok(())
    }

    fn spawn_renewal(self: &Arc<Self>) {
        let backing_off = self
            .renewal_failed_at
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some_and(|failed_at| failed_at.elapsed() < self.renewal_backoff);
        if backing_off || self.renewing.swap(true, Ordering::AcqRel) {
            return;
        }

        let provider = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(domain = %provider.domain, "Renewing certificate");
            let failed_at = match provider.renew().await {
                Ok(not_after) => {
                    tracing::info!(domain = %provider.domain, not_after = %not_after, "Certificate renewed");
                    None
                }
                Err(e) => {
                    tracing::warn!(
                        domain = %provider.domain,
                        error = %e,
                        retry_after_secs = provider.renewal_backoff.as_secs(),
                        "Certificate renewal failed"
                    );
                    Some(Instant::now())
                }
            };
            *provider.renewal_failed_at.write().unwrap_or_else(|e| e.into_inner()) = failed_at;
            provider.renewing.store(false, Ordering::Release);
        });
    }

    async fn renew(&self) -> Result<DateTime<Utc>, CertificateError> {
        let _guard = self.obtain.lock().await;
        let issued = self.issuer.issue(&self.domain).await?;
        let served = self.parse(&issued)?;
        let not_after = served.not_after;
        self.install(served);
        Ok(not_after)
    }

    fn install(&self, served: ServedCertificate) {
        self.resolver.swap(served.key.clone());
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Some(served);
    }

    fn parse(&self, stored: &StoredCertificate) -> Result<ServedCertificate, CertificateError> {
        let chain = CertificateDer::pem_slice_iter(stored.cert_chain_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CertificateError::InvalidCertificate(format!("certificate chain: {}", e)))?;
        let leaf = chain
            .first()
            .ok_or_else(|| CertificateError::InvalidCertificate("empty certificate chain".to_string()))?;

        let (_, parsed) = x509_parser::parse_x509_certificate(leaf)
            .map_err(|e| CertificateError::InvalidCertificate(e.to_string()))?;
        let not_after = DateTime::from_timestamp(parsed.validity().not_after.timestamp(), 0)
            .ok_or_else(|| CertificateError::InvalidCertificate("expiry out of range".to_string()))?;

        let key = PrivateKeyDer::from_pem_slice(stored.private_key_pem.as_bytes())
            .map_err(|e| CertificateError::InvalidCertificate(format!("private key: {}", e)))?;
        let signing_key = self
            .crypto
            .key_provider
            .load_private_key(key)
            .map_err(|e| CertificateError::InvalidCertificate(e.to_string()))?;

        let key = CertifiedKey::new(chain, signing_key);
        key.keys_match()
            .map_err(|e| CertificateError::InvalidCertificate(format!("key does not match certificate: {}", e)))?;

        Ok(ServedCertificate {
            key: Arc::new(key),
            not_after,
        })
    }
}
