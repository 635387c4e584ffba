//! Strategy-driven synchronization between local storage and an external
//! record store.
//!
//! Each form declares a [`SyncStrategy`](formbridge_registry::SyncStrategy)
//! in the shared registry; the [`SyncManager`] executes bulk runs and
//! single-record webhook events accordingly. Store access goes through the
//! [`ExternalStore`] and [`LocalStore`] traits so the engine stays testable
//! without a live backend; [`HttpExternalStore`] is the production
//! implementation.

pub mod error;
pub mod event;
pub mod extract;
pub mod http_store;
pub mod manager;
pub mod report;
pub mod store;

pub use error::{SyncError, SyncOpResult};
pub use event::{EventAction, WebhookEvent};
pub use http_store::HttpExternalStore;
pub use manager::{ConflictPolicy, SyncManager};
pub use report::{ServiceState, SyncReport, SyncServiceInfo};
pub use store::{
    ExternalFields, ExternalRecord, ExternalStore, LocalRecord, LocalStore, MemoryLocalStore,
    UpsertOutcome,
};
