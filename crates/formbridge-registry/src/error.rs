//! Registry configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Error that can occur while loading or querying form configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// No configuration document was found at any searched location.
    #[error("configuration document not found (searched: {searched:?})")]
    DocumentNotFound {
        /// Locations that were checked, in search order.
        searched: Vec<PathBuf>,
    },

    /// The document is not valid JSON or fails schema validation.
    #[error("invalid configuration document: {message}")]
    InvalidDocument { message: String },

    /// The same form key appears more than once.
    #[error("duplicate form key '{form_key}'")]
    DuplicateFormKey { form_key: String },

    /// The same non-empty webhook key is claimed by two forms.
    #[error("duplicate webhook key '{webhook_key}' (forms '{first}' and '{second}')")]
    DuplicateWebhookKey {
        webhook_key: String,
        first: String,
        second: String,
    },

    /// A form declares an empty external path.
    #[error("form '{form_key}': external path is empty")]
    EmptyExternalPath { form_key: String },

    /// The global base URL is empty.
    #[error("global settings: base URL is empty")]
    EmptyBaseUrl,

    /// A form key was requested that is not in the registry.
    #[error("form '{form_key}' not found in registry (available: {available:?})")]
    FormNotFound {
        form_key: String,
        available: Vec<String>,
    },

    /// A logical field name has no mapping in the owning form.
    #[error("field '{logical}' has no mapping in form '{form_key}'")]
    FieldNotMapped { form_key: String, logical: String },

    /// Filesystem error while reading the document.
    #[error("failed to read configuration document: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for registry operations.
pub type ConfigResult<T> = Result<T, ConfigurationError>;
