//! Synchronization engine error types.
//!
//! Configuration and routing errors propagate to the caller. Per-record
//! failures never surface as `Err`: they are captured inside
//! [`SyncReport`](crate::report::SyncReport) so one bad record cannot abort
//! the rest of a batch.

use formbridge_registry::ConfigurationError;
use thiserror::Error;

/// Error that can occur during a synchronization operation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid registry configuration.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// No registered form owns the webhook key.
    #[error("no sync service owns webhook key '{webhook_key}'")]
    UnroutedWebhook { webhook_key: String },

    /// The form has not been registered with the sync manager.
    #[error("no sync service registered for form '{form_key}'")]
    ServiceNotRegistered { form_key: String },

    /// Transport failure talking to the external store.
    #[error("external store transport error: {message}")]
    Transport { message: String },

    /// An outbound call exceeded its bounded timeout.
    #[error("external store call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The external store answered with a non-success status.
    #[error("external store returned status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// A webhook payload could not be interpreted as a record event.
    #[error("invalid webhook payload: {message}")]
    InvalidPayload { message: String },

    /// Local storage failure.
    #[error("local storage error: {message}")]
    Storage { message: String },
}

impl SyncError {
    pub fn transport(message: impl Into<String>) -> Self {
        SyncError::Transport {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        SyncError::Storage {
            message: message.into(),
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        SyncError::InvalidPayload {
            message: message.into(),
        }
    }
}

/// Result type for synchronization operations.
pub type SyncOpResult<T> = Result<T, SyncError>;
