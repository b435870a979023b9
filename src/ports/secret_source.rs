//! Secret source port - where generated hook secrets and callback path
//! tokens come from.
//!
//! Injected into the session so tests can supply deterministic values.

use secrecy::SecretString;

/// Port for generating session identity material.
pub trait SecretSource: Send + Sync {
    /// A fresh shared secret for HMAC signing.
    fn hook_secret(&self) -> SecretString;

    /// An unguessable path segment for the callback URL.
    fn callback_token(&self) -> String;
}
