//! # Form Registry
//!
//! Typed configuration model and hot-reloadable registry for external forms.
//!
//! Every form on the external store is described by a [`FormDescriptor`]:
//! its path, field mapping, synchronization strategy, and webhook routing
//! key. The [`FormRegistry`] loads the configuration document, validates it
//! strictly, and serves lookups by form key or webhook key to the sync
//! engine and the webhook dispatcher.
//!
//! ## Example
//!
//! ```ignore
//! use formbridge_registry::FormRegistry;
//!
//! let registry = FormRegistry::new();
//! registry.load(None).await?;
//!
//! let form = registry.get_form("account_form").await?;
//! let field_id = form.resolve_field("EMPLOYEE_ID")?;
//! ```

pub mod error;
pub mod model;
pub mod registry;

pub use error::{ConfigResult, ConfigurationError};
pub use model::{FormDescriptor, GlobalSettings, RegistryConfiguration, SyncStrategy};
pub use registry::{FormRegistry, REGISTRY_FILE_NAME};
