//! Verifier abstraction.

use serde::{Deserialize, Serialize};

use crate::context::{AuthOutcome, WebhookRequest};

/// Which verification strategy a source is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierKind {
    /// HMAC signature header or URL token against a shared secret.
    Token,
    /// Base64 signature embedded in the payload body, checked against the
    /// source's public key.
    SignedBody,
}

impl VerifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifierKind::Token => "token",
            VerifierKind::SignedBody => "signed_body",
        }
    }
}

impl std::fmt::Display for VerifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A signature-verification strategy.
///
/// Verification is pure computation: the token strategy is in-memory HMAC,
/// the signed-body strategy is CPU-bound RSA. Neither performs I/O, so the
/// trait is synchronous.
pub trait WebhookVerifier: Send + Sync {
    /// Decide whether the request is authentic.
    fn verify(&self, request: &WebhookRequest<'_>) -> AuthOutcome;
}
