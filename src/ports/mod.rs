//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the session core and the outside world. Adapters implement these ports.
//!
//! - `WebhookRegistry` - creates and deletes the repository hook
//! - `DeliveryHandler` - the action run for each admitted delivery
//! - `SecretSource` - generated hook secrets and callback path tokens
//! - `CertificateStore` / `CertificateIssuer` - TLS certificate cache and ACME negotiation

mod certificate_store;
mod delivery_handler;
mod secret_source;
mod webhook_registry;

pub use certificate_store::{
    CertificateError, CertificateIssuer, CertificateStore, StoredCertificate,
};
pub use delivery_handler::{handler_fn, DeliveryHandler, HandlerError, HandlerFn};
pub use secret_source::SecretSource;
pub use webhook_registry::{CreateHookRequest, RegistryError, WebhookRegistration, WebhookRegistry};
