//! Webhook authentication error types.
//!
//! These are programming/deployment errors only. An authentication failure
//! is a normal [`AuthContext`](crate::AuthContext) outcome, never an error.

use thiserror::Error;

/// Error raised for misuse of the authentication layer.
#[derive(Debug, Error)]
pub enum WebhookAuthError {
    /// No verifier has been registered for the source.
    // The field cannot be called `source`: thiserror reserves that name for
    // the error cause.
    #[error("no webhook verifier registered for source '{source_key}'")]
    SourceNotRegistered { source_key: String },

    /// A configured public key could not be parsed.
    #[error("invalid public key: {message}")]
    InvalidPublicKey { message: String },
}
