//! Filesystem certificate cache.
//!
//! Layout under the cache directory:
//!
//! ```text
//! certs/{domain}.crt.pem
//! certs/{domain}.key.pem     (mode 0600 on unix)
//! accounts/{sha256(directory_url)}.json
//! ```

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::ports::{CertificateStore, StoredCertificate};

/// Certificate cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileCertificateStore {
    root: PathBuf,
}

impl FileCertificateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn certs_dir(&self) -> PathBuf {
        self.root.join("certs")
    }

    fn cert_path(&self, domain: &str) -> io::Result<PathBuf> {
        Ok(self.certs_dir().join(format!("{}.crt.pem", checked_domain(domain)?)))
    }

    fn key_path(&self, domain: &str) -> io::Result<PathBuf> {
        Ok(self.certs_dir().join(format!("{}.key.pem", checked_domain(domain)?)))
    }

    fn account_path(&self, directory_url: &str) -> PathBuf {
        let digest = Sha256::digest(directory_url.as_bytes());
        self.root
            .join("accounts")
            .join(format!("{}.json", hex::encode(digest)))
    }
}

/// Rejects names that would escape the cache directory.
fn checked_domain(domain: &str) -> io::Result<&str> {
    let valid = !domain.is_empty()
        && !domain.starts_with('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '*');
    if valid {
        Ok(domain)
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid domain for certificate cache: {:?}", domain),
        ))
    }
}

async fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Writes via a temporary sibling and rename so readers never see a partial file.
async fn write_atomic(path: &Path, contents: &str, private: bool) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    if private {
        restrict_to_owner(&tmp).await?;
    }
    tokio::fs::rename(&tmp, path).await
}

#[cfg(unix)]
async fn restrict_to_owner(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_to_owner(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[async_trait]
impl CertificateStore for FileCertificateStore {
    async fn load_certificate(&self, domain: &str) -> io::Result<Option<StoredCertificate>> {
        let cert = read_optional(&self.cert_path(domain)?).await?;
        let key = read_optional(&self.key_path(domain)?).await?;

        Ok(match (cert, key) {
            (Some(cert_chain_pem), Some(private_key_pem)) => Some(StoredCertificate {
                cert_chain_pem,
                private_key_pem,
            }),
            _ => None,
        })
    }

    async fn save_certificate(
        &self,
        domain: &str,
        certificate: &StoredCertificate,
    ) -> io::Result<()> {
        write_atomic(&self.key_path(domain)?, &certificate.private_key_pem, true).await?;
        write_atomic(&self.cert_path(domain)?, &certificate.cert_chain_pem, false).await?;
        tracing::debug!(domain = %domain, root = %self.root.display(), "Certificate cached");
        Ok(())
    }

    async fn load_account(&self, directory_url: &str) -> io::Result<Option<String>> {
        read_optional(&self.account_path(directory_url)).await
    }

    async fn save_account(&self, directory_url: &str, credentials: &str) -> io::Result<()> {
        write_atomic(&self.account_path(directory_url), credentials, true).await
    }
}
