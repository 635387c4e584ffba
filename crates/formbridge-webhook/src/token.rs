//! Token/signature verification strategy.
//!
//! Covers the header-based HMAC-SHA256 style (GitHub/Stripe-like
//! `sha256=<hex>` headers) and plain URL-token authentication, both against
//! a per-source shared secret. Pure in-memory computation; never suspends.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::context::{AuthOutcome, WebhookRequest};
use crate::verifier::WebhookVerifier;

type HmacSha256 = Hmac<Sha256>;

/// Signature header prefix (e.g. `sha256=abc123...`).
const SIGNATURE_PREFIX: &str = "sha256=";

/// Constant-time byte comparison to prevent timing side channels.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// Compute the hex-encoded HMAC-SHA256 of a payload.
fn compute_hmac_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies requests against a shared secret via HMAC signature header or
/// URL token.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    secret: Option<String>,
}

impl TokenVerifier {
    /// Create a verifier with an already-resolved secret. `None` means the
    /// environment provided no secret for this source; every request then
    /// reports `SecretNotConfigured`.
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// Generate a `sha256=<hex>` signature for a payload. Used when sending
    /// webhooks to other services and by tests.
    pub fn sign(secret: &str, payload: &[u8]) -> String {
        format!("{SIGNATURE_PREFIX}{}", compute_hmac_hex(secret, payload))
    }

    fn verify_signature(&self, secret: &str, payload: &[u8], header: &str) -> bool {
        let supplied = header.strip_prefix(SIGNATURE_PREFIX).unwrap_or(header);
        let supplied = supplied.to_ascii_lowercase();
        let expected = compute_hmac_hex(secret, payload);
        constant_time_eq(supplied.as_bytes(), expected.as_bytes())
    }

    fn verify_token(&self, secret: &str, token: &str) -> bool {
        constant_time_eq(token.as_bytes(), secret.as_bytes())
    }
}

impl WebhookVerifier for TokenVerifier {
    fn verify(&self, request: &WebhookRequest<'_>) -> AuthOutcome {
        // Secret resolution failure wins over whatever credentials were
        // supplied.
        let Some(secret) = self.secret.as_deref() else {
            return AuthOutcome::SecretNotConfigured;
        };

        // Signature header is always checked before the URL token.
        if let Some(header) = request.signature_header {
            return if self.verify_signature(secret, request.payload, header) {
                AuthOutcome::Success
            } else {
                AuthOutcome::InvalidSignature
            };
        }

        if let Some(token) = request.url_token {
            return if self.verify_token(secret, token) {
                AuthOutcome::Success
            } else {
                AuthOutcome::InvalidToken
            };
        }

        AuthOutcome::MissingSignature
    }
}
