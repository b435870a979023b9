//! Automatic TLS via ACME.
//!
//! - `ChallengeStore` / `challenge_router` - HTTP-01 responses on the plain listener
//! - `FileCertificateStore` - on-disk account and certificate cache
//! - `AcmeIssuer` - order negotiation with the certificate authority
//! - `CertificateProvider` - swappable certificate served to the TLS listener

mod challenge;
mod file_store;
mod issuer;
mod provider;

pub use challenge::{challenge_router, ChallengeStore, CHALLENGE_PATH_PREFIX};
pub use file_store::FileCertificateStore;
pub use issuer::AcmeIssuer;
pub use provider::CertificateProvider;
