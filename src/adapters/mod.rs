//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the session to external systems:
//! - `github` - GitHub REST client (`WebhookRegistry`)
//! - `acme` - certificate issuing, caching and serving
//! - `http` - callback endpoint and listeners
//! - `actions` - built-in `DeliveryHandler`s
//! - `secrets` - `SecretSource` implementations

pub mod acme;
pub mod actions;
pub mod github;
pub mod http;
pub mod secrets;

pub use acme::{AcmeIssuer, CertificateProvider, ChallengeStore, FileCertificateStore};
pub use actions::{ExecAction, PrettyPrintAction};
pub use github::{GitHubClientConfig, GitHubWebhookClient};
pub use secrets::{FixedSecretSource, RandomSecretSource};
