//! Authentication outcome taxonomy and audit context.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of one webhook authentication attempt.
///
/// Anything other than `Success` causes the caller to reject the request
/// without invoking synchronization. Failures are normal return values, not
/// errors: webhooks are adversarial-input-shaped and must never crash
/// request handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthOutcome {
    /// The request is authentic.
    Success,
    /// A signature was supplied but does not match the payload.
    InvalidSignature,
    /// A URL token was supplied but does not match the configured secret.
    InvalidToken,
    /// Neither a signature header nor a URL token was supplied.
    MissingSignature,
    /// No secret or public key is configured for the source.
    SecretNotConfigured,
    /// The payload document is structurally unusable for verification.
    MalformedPayload,
}

impl AuthOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthOutcome::Success => "success",
            AuthOutcome::InvalidSignature => "invalid_signature",
            AuthOutcome::InvalidToken => "invalid_token",
            AuthOutcome::MissingSignature => "missing_signature",
            AuthOutcome::SecretNotConfigured => "secret_not_configured",
            AuthOutcome::MalformedPayload => "malformed_payload",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success)
    }

    /// Human-readable rejection reason, `None` for success.
    pub(crate) fn error_message(&self) -> Option<&'static str> {
        match self {
            AuthOutcome::Success => None,
            AuthOutcome::InvalidSignature => Some("invalid webhook signature"),
            AuthOutcome::InvalidToken => Some("invalid webhook token"),
            AuthOutcome::MissingSignature => Some("missing webhook signature or token"),
            AuthOutcome::SecretNotConfigured => Some("webhook secret not configured for source"),
            AuthOutcome::MalformedPayload => Some("webhook payload is malformed"),
        }
    }
}

impl fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One inbound webhook request as seen by a verifier.
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    /// Exact raw request body bytes.
    pub payload: &'a [u8],
    /// Signature header value, if the sender supplied one.
    pub signature_header: Option<&'a str>,
    /// Token passed in the webhook URL, if the sender supplied one.
    pub url_token: Option<&'a str>,
}

/// Immutable record of one authentication attempt, created once per inbound
/// request and logged regardless of outcome.
#[derive(Debug, Clone, Serialize)]
pub struct AuthContext {
    /// Whether the request was successfully verified.
    pub verified: bool,
    /// The outcome classification.
    pub outcome: AuthOutcome,
    /// Webhook source identifier.
    pub source: String,
    /// Client network address, for audit.
    pub client_ip: String,
    /// Human-readable reason for a failed attempt.
    pub error: Option<String>,
}

impl AuthContext {
    pub(crate) fn new(outcome: AuthOutcome, source: &str, client_ip: &str) -> Self {
        Self {
            verified: outcome.is_success(),
            outcome,
            source: source.to_string(),
            client_ip: client_ip.to_string(),
            error: outcome.error_message().map(String::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_snake_case() {
        let json = serde_json::to_string(&AuthOutcome::SecretNotConfigured).unwrap();
        assert_eq!(json, "\"secret_not_configured\"");
    }

    #[test]
    fn context_populates_audit_fields() {
        let ctx = AuthContext::new(AuthOutcome::InvalidSignature, "store", "203.0.113.9");
        assert!(!ctx.verified);
        assert_eq!(ctx.source, "store");
        assert_eq!(ctx.client_ip, "203.0.113.9");
        assert!(ctx.error.is_some());

        let ok = AuthContext::new(AuthOutcome::Success, "store", "203.0.113.9");
        assert!(ok.verified);
        assert!(ok.error.is_none());
    }
}
