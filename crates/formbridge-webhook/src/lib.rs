//! # Webhook Authentication
//!
//! Pluggable signature verification for inbound webhooks.
//!
//! Two independent strategies are supported, selected per source:
//!
//! - [`TokenVerifier`] — HMAC-SHA256 signature header (GitHub/Stripe style
//!   `sha256=<hex>`) or plain URL token, against a shared secret. All
//!   comparisons are constant-time.
//! - [`SignedBodyVerifier`] — base64 RSA signature embedded in the payload
//!   body, checked against the source's public key over the canonical JSON
//!   serialization of the payload's `data` field.
//!
//! [`WebhookAuthenticator::authenticate_request`] is the single entry point;
//! authentication failure is a normal [`AuthContext`] outcome, never an
//! error.
//!
//! ## Example
//!
//! ```
//! use formbridge_webhook::{TokenVerifier, WebhookAuthenticator};
//!
//! let mut auth = WebhookAuthenticator::new();
//! auth.register_token_source("store", Some("s3cret".to_string()));
//!
//! let body = br#"{"record_id": 7}"#;
//! let header = TokenVerifier::sign("s3cret", body);
//! let ctx = auth
//!     .authenticate_request(body, Some(&header), None, "store", "203.0.113.9")
//!     .unwrap();
//! assert!(ctx.verified);
//! ```

pub mod authenticator;
pub mod context;
pub mod error;
pub mod signed_body;
pub mod token;
pub mod verifier;

pub use authenticator::WebhookAuthenticator;
pub use context::{AuthContext, AuthOutcome, WebhookRequest};
pub use error::WebhookAuthError;
pub use signed_body::{canonical_json, SignedBodyVerifier};
pub use token::TokenVerifier;
pub use verifier::{VerifierKind, WebhookVerifier};
