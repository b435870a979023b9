//! GitHub delivery signature verification.
//!
//! GitHub signs every delivery with HMAC-SHA256 over the raw request body,
//! keyed with the hook secret, and sends it as `X-Hub-Signature-256:
//! sha256=<hex>`. Verification recomputes the digest and compares in
//! constant time.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Prefix GitHub puts in front of the hex digest.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Reasons a signature is rejected.
///
/// Kept for logging only; callers outside this module see a plain `bool`
/// so responses never reveal which check failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("signature header missing")]
    MissingSignature,

    #[error("signature header malformed")]
    Malformed,

    #[error("signature mismatch")]
    Mismatch,
}

/// Verifier for GitHub delivery signatures.
#[derive(Clone)]
pub struct DeliveryVerifier {
    /// The hook secret registered with GitHub.
    secret: SecretString,
}

impl DeliveryVerifier {
    /// Creates a new verifier with the given hook secret.
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Returns true only when `signature_header` is a valid signature of `body`.
    pub fn verify(&self, body: &[u8], signature_header: Option<&str>) -> bool {
        self.check(body, signature_header).is_ok()
    }

    /// Verifies the signature, reporting why it failed.
    ///
    /// # Verification Steps
    ///
    /// 1. Require the header and its `sha256=` prefix
    /// 2. Hex-decode the digest
    /// 3. Compute the expected digest over the raw body
    /// 4. Compare digests using constant-time comparison
    pub fn check(&self, body: &[u8], signature_header: Option<&str>) -> Result<(), VerificationError> {
        let header = signature_header.ok_or(VerificationError::MissingSignature)?;

        let hex_digest = header
            .trim()
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or(VerificationError::Malformed)?;

        let provided = hex::decode(hex_digest).map_err(|_| VerificationError::Malformed)?;

        let expected = self.compute_signature(body);

        if !constant_time_compare(&expected, &provided) {
            return Err(VerificationError::Mismatch);
        }

        Ok(())
    }

    /// Produces the header value GitHub would send for `body`.
    pub fn sign(&self, body: &[u8]) -> String {
        format!("{}{}", SIGNATURE_PREFIX, hex::encode(self.compute_signature(body)))
    }

    /// Computes the raw HMAC-SHA256 digest of the payload.
    fn compute_signature(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

impl std::fmt::Debug for DeliveryVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryVerifier").finish_non_exhaustive()
    }
}

/// Performs constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TEST_SECRET: &str = "s3cr3t";

    fn verifier() -> DeliveryVerifier {
        DeliveryVerifier::new(SecretString::new(TEST_SECRET.to_string()))
    }

    // ══════════════════════════════════════════════════════════════
    // Known Vectors
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn matches_github_documented_vector() {
        // From GitHub's "Validating webhook deliveries" guide.
        let verifier = DeliveryVerifier::new(SecretString::new(
            "It's a Secret to Everybody".to_string(),
        ));

        let signature = verifier.sign(b"Hello, World!");

        assert_eq!(
            signature,
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    // ══════════════════════════════════════════════════════════════
    // Signature Verification Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn verify_valid_signature() {
        let verifier = verifier();
        let payload = br#"{"ref":"refs/heads/main"}"#;
        let header = verifier.sign(payload);

        assert!(verifier.verify(payload, Some(&header)));
    }

    #[test]
    fn verify_wrong_secret_fails() {
        let payload = br#"{"ref":"refs/heads/main"}"#;
        let header = DeliveryVerifier::new(SecretString::new("wrong_secret".to_string())).sign(payload);

        assert_eq!(
            verifier().check(payload, Some(&header)),
            Err(VerificationError::Mismatch)
        );
    }

    #[test]
    fn verify_tampered_payload_fails() {
        let verifier = verifier();
        let header = verifier.sign(br#"{"id":1}"#);

        assert!(!verifier.verify(br#"{"id":2}"#, Some(&header)));
    }

    #[test]
    fn verify_missing_header_fails() {
        assert_eq!(
            verifier().check(b"{}", None),
            Err(VerificationError::MissingSignature)
        );
    }

    #[test]
    fn verify_without_prefix_fails() {
        let verifier = verifier();
        let header = verifier.sign(b"{}");
        let bare = header.trim_start_matches(SIGNATURE_PREFIX);

        assert_eq!(verifier.check(b"{}", Some(bare)), Err(VerificationError::Malformed));
    }

    #[test]
    fn verify_sha1_header_fails() {
        let header = format!("sha1={}", "a".repeat(40));
        assert_eq!(
            verifier().check(b"{}", Some(&header)),
            Err(VerificationError::Malformed)
        );
    }

    #[test]
    fn verify_invalid_hex_fails() {
        assert_eq!(
            verifier().check(b"{}", Some("sha256=not_valid_hex")),
            Err(VerificationError::Malformed)
        );
    }

    #[test]
    fn verify_truncated_digest_fails() {
        let verifier = verifier();
        let header = verifier.sign(b"{}");
        let truncated = &header[..header.len() - 2];

        assert_eq!(verifier.check(b"{}", Some(truncated)), Err(VerificationError::Mismatch));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let rendered = format!("{:?}", verifier());
        assert!(!rendered.contains(TEST_SECRET));
    }

    // ══════════════════════════════════════════════════════════════
    // Constant Time Comparison Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn constant_time_compare_different_lengths() {
        assert!(!constant_time_compare(&[1, 2, 3], &[1, 2, 3, 4]));
    }

    #[test]
    fn constant_time_compare_equal_values() {
        assert!(constant_time_compare(&[1, 2, 3], &[1, 2, 3]));
    }

    // ══════════════════════════════════════════════════════════════
    // Properties
    // ══════════════════════════════════════════════════════════════

    proptest! {
        #[test]
        fn signed_bodies_always_verify(
            secret in "[ -~]{1,64}",
            body in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let verifier = DeliveryVerifier::new(SecretString::new(secret));
            let header = verifier.sign(&body);
            prop_assert!(verifier.verify(&body, Some(&header)));
        }

        #[test]
        fn flipping_a_body_bit_breaks_verification(
            body in proptest::collection::vec(any::<u8>(), 1..512),
            index in any::<proptest::sample::Index>(),
            bit in 0u8..8,
        ) {
            let verifier = verifier();
            let header = verifier.sign(&body);

            let mut mutated = body.clone();
            let i = index.index(mutated.len());
            mutated[i] ^= 1 << bit;

            prop_assert!(!verifier.verify(&mutated, Some(&header)));
        }

        #[test]
        fn flipping_a_signature_bit_breaks_verification(
            body in proptest::collection::vec(any::<u8>(), 0..256),
            index in any::<proptest::sample::Index>(),
            bit in 0u8..8,
        ) {
            let verifier = verifier();
            let header = verifier.sign(&body);

            let mut digest = hex::decode(header.trim_start_matches(SIGNATURE_PREFIX)).unwrap();
            let i = index.index(digest.len());
            digest[i] ^= 1 << bit;
            let mutated = format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest));

            prop_assert!(!verifier.verify(&body, Some(&mutated)));
        }
    }
}
