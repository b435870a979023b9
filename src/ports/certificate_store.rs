//! Certificate store and issuer ports.
//!
//! The store persists issued certificates and ACME account credentials so a
//! restart reuses them instead of ordering again. The issuer performs the
//! actual negotiation with a certificate authority.

use async_trait::async_trait;
use thiserror::Error;

/// PEM-encoded certificate chain and its private key.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredCertificate {
    /// Leaf first, then intermediates.
    pub cert_chain_pem: String,
    pub private_key_pem: String,
}

impl std::fmt::Debug for StoredCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCertificate")
            .field("cert_chain_pem_len", &self.cert_chain_pem.len())
            .finish_non_exhaustive()
    }
}

/// Port for the certificate cache.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Cached certificate for `domain`, if any.
    async fn load_certificate(&self, domain: &str) -> std::io::Result<Option<StoredCertificate>>;

    /// Persist a freshly issued certificate for `domain`.
    async fn save_certificate(
        &self,
        domain: &str,
        certificate: &StoredCertificate,
    ) -> std::io::Result<()>;

    /// Serialized ACME account credentials for `directory_url`, if any.
    async fn load_account(&self, directory_url: &str) -> std::io::Result<Option<String>>;

    /// Persist serialized ACME account credentials for `directory_url`.
    async fn save_account(&self, directory_url: &str, credentials: &str) -> std::io::Result<()>;
}

/// Port for obtaining a certificate from a certificate authority.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Run a complete order for `domain` and return the issued certificate.
    async fn issue(&self, domain: &str) -> Result<StoredCertificate, CertificateError>;
}

/// Errors from certificate negotiation, caching or loading.
///
/// Never fatal to a session: a failed handshake is retried on the next one.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("ACME protocol error: {0}")]
    Acme(String),

    #[error("no {0} challenge offered for the domain")]
    ChallengeUnavailable(&'static str),

    #[error("order ended in status {0}")]
    OrderFailed(String),

    #[error("order did not complete within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("certificate negotiation cancelled")]
    Cancelled,

    #[error("CSR generation failed: {0}")]
    Csr(String),

    #[error("invalid certificate material: {0}")]
    InvalidCertificate(String),

    #[error("server name {requested:?} is not served (expected {expected})")]
    UnknownServerName {
        requested: Option<String>,
        expected: String,
    },

    #[error("certificate cache error: {0}")]
    Cache(#[from] std::io::Error),
}
