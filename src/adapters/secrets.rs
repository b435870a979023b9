//! Secret source adapters.

use rand::RngCore;
use secrecy::SecretString;
use uuid::Uuid;

use crate::ports::SecretSource;

/// Number of random bytes in a generated hook secret.
const SECRET_BYTES: usize = 32;

/// Generates secrets from the operating system RNG and callback tokens from
/// random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSecretSource;

impl SecretSource for RandomSecretSource {
    fn hook_secret(&self) -> SecretString {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        SecretString::new(hex::encode(bytes))
    }

    fn callback_token(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Always returns the same values. For tests and reproducible setups.
#[derive(Debug, Clone)]
pub struct FixedSecretSource {
    secret: String,
    token: String,
}

impl FixedSecretSource {
    pub fn new(secret: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            token: token.into(),
        }
    }
}

impl SecretSource for FixedSecretSource {
    fn hook_secret(&self) -> SecretString {
        SecretString::new(self.secret.clone())
    }

    fn callback_token(&self) -> String {
        self.token.clone()
    }
}
