//! Per-source verifier selection and the single authentication entry point.

use std::collections::HashMap;
use std::sync::Arc;

use rsa::RsaPublicKey;
use tracing::{debug, warn};

use crate::context::{AuthContext, WebhookRequest};
use crate::error::WebhookAuthError;
use crate::signed_body::SignedBodyVerifier;
use crate::token::TokenVerifier;
use crate::verifier::{VerifierKind, WebhookVerifier};

struct SourceEntry {
    kind: VerifierKind,
    verifier: Arc<dyn WebhookVerifier>,
}

/// Decides whether an inbound webhook request is authentic, per source.
///
/// Sources are registered up front with their verification strategy and
/// already-resolved secret/key material; the authenticator never reads
/// environment state itself. A process-wide default secret can back sources
/// that have no secret of their own.
#[derive(Default)]
pub struct WebhookAuthenticator {
    sources: HashMap<String, SourceEntry>,
    default_secret: Option<String>,
}

impl WebhookAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback secret used by token sources registered without one.
    pub fn with_default_secret(mut self, secret: impl Into<String>) -> Self {
        self.default_secret = Some(secret.into());
        self
    }

    /// Register a source verified by HMAC signature header or URL token.
    /// `secret: None` falls back to the process-wide default secret.
    pub fn register_token_source(&mut self, source: impl Into<String>, secret: Option<String>) {
        let secret = secret.or_else(|| self.default_secret.clone());
        self.sources.insert(
            source.into(),
            SourceEntry {
                kind: VerifierKind::Token,
                verifier: Arc::new(TokenVerifier::new(secret)),
            },
        );
    }

    /// Register a source verified by a body-embedded asymmetric signature.
    pub fn register_signed_body_source(
        &mut self,
        source: impl Into<String>,
        public_key: Option<RsaPublicKey>,
    ) {
        self.sources.insert(
            source.into(),
            SourceEntry {
                kind: VerifierKind::SignedBody,
                verifier: Arc::new(SignedBodyVerifier::new(public_key)),
            },
        );
    }

    /// Verification strategy registered for a source, if any.
    pub fn source_kind(&self, source: &str) -> Option<VerifierKind> {
        self.sources.get(source).map(|entry| entry.kind)
    }

    /// Authenticate one inbound webhook request.
    ///
    /// Returns the audit context for every authentication outcome, success
    /// or failure. `Err` is reserved for the programming error of routing a
    /// source that was never registered.
    pub fn authenticate_request(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
        url_token: Option<&str>,
        source: &str,
        client_ip: &str,
    ) -> Result<AuthContext, WebhookAuthError> {
        let entry =
            self.sources
                .get(source)
                .ok_or_else(|| WebhookAuthError::SourceNotRegistered {
                    source_key: source.to_string(),
                })?;

        let request = WebhookRequest {
            payload,
            signature_header,
            url_token,
        };
        let outcome = entry.verifier.verify(&request);
        let context = AuthContext::new(outcome, source, client_ip);

        if context.verified {
            debug!(
                source,
                client_ip,
                strategy = %entry.kind,
                "webhook authenticated"
            );
        } else {
            warn!(
                source,
                client_ip,
                strategy = %entry.kind,
                outcome = %context.outcome,
                "webhook authentication failed"
            );
        }

        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AuthOutcome;

    const BODY: &[u8] = b"{}";

    #[test]
    fn dispatches_to_the_registered_strategy() {
        let mut auth = WebhookAuthenticator::new();
        auth.register_token_source("store", Some("s3cret".to_string()));

        let header = TokenVerifier::sign("s3cret", BODY);
        let ctx = auth
            .authenticate_request(BODY, Some(&header), None, "store", "198.51.100.4")
            .unwrap();
        assert!(ctx.verified);
        assert_eq!(ctx.outcome, AuthOutcome::Success);
        assert_eq!(ctx.source, "store");
        assert_eq!(ctx.client_ip, "198.51.100.4");
    }

    #[test]
    fn unregistered_source_is_an_error() {
        let auth = WebhookAuthenticator::new();
        let err = auth
            .authenticate_request(BODY, None, None, "ghost", "198.51.100.4")
            .unwrap_err();
        match err {
            WebhookAuthError::SourceNotRegistered { source_key } => {
                assert_eq!(source_key, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failure_still_populates_audit_fields() {
        let mut auth = WebhookAuthenticator::new();
        auth.register_token_source("store", Some("s3cret".to_string()));

        let ctx = auth
            .authenticate_request(BODY, Some("sha256=bad"), None, "store", "198.51.100.4")
            .unwrap();
        assert!(!ctx.verified);
        assert_eq!(ctx.outcome, AuthOutcome::InvalidSignature);
        assert_eq!(ctx.client_ip, "198.51.100.4");
        assert!(ctx.error.is_some());
    }

    #[test]
    fn default_secret_backs_sources_without_their_own() {
        let mut auth = WebhookAuthenticator::new().with_default_secret("shared");
        auth.register_token_source("store", None);

        let header = TokenVerifier::sign("shared", BODY);
        let ctx = auth
            .authenticate_request(BODY, Some(&header), None, "store", "ip")
            .unwrap();
        assert!(ctx.verified);
    }

    #[test]
    fn source_without_any_secret_reports_unconfigured() {
        let mut auth = WebhookAuthenticator::new();
        auth.register_token_source("store", None);

        let ctx = auth
            .authenticate_request(BODY, None, Some("tok"), "store", "ip")
            .unwrap();
        assert_eq!(ctx.outcome, AuthOutcome::SecretNotConfigured);
    }

    #[test]
    fn source_kind_reflects_registration() {
        let mut auth = WebhookAuthenticator::new();
        auth.register_token_source("a", Some("x".to_string()));
        auth.register_signed_body_source("b", None);

        assert_eq!(auth.source_kind("a"), Some(VerifierKind::Token));
        assert_eq!(auth.source_kind("b"), Some(VerifierKind::SignedBody));
        assert_eq!(auth.source_kind("c"), None);
    }
}
