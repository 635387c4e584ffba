//! Storage seams: the external store and the local cache.
//!
//! The engine talks to both sides through traits so the surrounding
//! persistence layer (out of scope here) can plug in its own tables. For
//! forms whose strategy designates the external store as master, local rows
//! are mutated only through [`LocalStore`], never by business code.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::error::SyncOpResult;

/// Field map of one raw external record, keyed by external field identifier.
pub type ExternalFields = Map<String, Value>;

/// One record as fetched from the external store.
#[derive(Debug, Clone)]
pub struct ExternalRecord {
    /// The external record identifier (the upsert conflict target).
    pub id: String,
    /// Raw fields keyed by external field identifier.
    pub fields: ExternalFields,
    /// Modification timestamp, when the store reports one. Used for
    /// conflict resolution in bidirectional sync.
    pub modified_at: Option<DateTime<Utc>>,
}

/// Gateway to the external no-code store.
#[async_trait]
pub trait ExternalStore: Send + Sync {
    /// Fetch all current records of a form.
    async fn fetch_all(&self, path: &str) -> SyncOpResult<Vec<ExternalRecord>>;

    /// Fetch a single record by external id. `None` when it does not exist.
    async fn fetch_one(&self, path: &str, record_id: &str) -> SyncOpResult<Option<ExternalRecord>>;

    /// Create a record, returning the external id assigned by the store.
    async fn create(&self, path: &str, fields: &ExternalFields) -> SyncOpResult<String>;

    /// Overwrite fields of an existing record.
    async fn update(&self, path: &str, record_id: &str, fields: &ExternalFields)
        -> SyncOpResult<()>;

    /// Delete a record. Returns whether it existed.
    async fn delete(&self, path: &str, record_id: &str) -> SyncOpResult<bool>;
}

/// Whether an upsert inserted or overwrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// One row of local storage as seen by the engine.
#[derive(Debug, Clone)]
pub struct LocalRecord {
    /// Identifier of the row in local storage.
    pub local_id: String,
    /// External id the row is bound to, once pushed or pulled.
    pub external_id: Option<String>,
    /// Mapped fields keyed by logical field name.
    pub fields: BTreeMap<String, Value>,
    /// Last local modification time, for conflict resolution.
    pub modified_at: Option<DateTime<Utc>>,
}

/// Local cache/source-of-truth tables, owned by the surrounding persistence
/// layer.
///
/// The upsert is a single atomic conflict-resolving write per record keyed
/// by external id; no record-level locking is needed on top of it.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert-or-overwrite a row keyed by external record id. An existing
    /// row is fully replaced by the incoming mapped fields.
    async fn upsert(
        &self,
        form_key: &str,
        external_id: &str,
        fields: BTreeMap<String, Value>,
    ) -> SyncOpResult<UpsertOutcome>;

    /// Fetch a row by external id.
    async fn get(&self, form_key: &str, external_id: &str) -> SyncOpResult<Option<LocalRecord>>;

    /// Delete a row by external id. Returns whether it existed.
    async fn delete(&self, form_key: &str, external_id: &str) -> SyncOpResult<bool>;

    /// Rows not yet pushed to the external store (no bound external id).
    async fn pending_push(&self, form_key: &str) -> SyncOpResult<Vec<LocalRecord>>;

    /// Record the external id assigned to a pushed row.
    async fn bind_external_id(
        &self,
        form_key: &str,
        local_id: &str,
        external_id: &str,
    ) -> SyncOpResult<()>;
}

/// In-memory [`LocalStore`] for tests and cache-free deployments.
#[derive(Default)]
pub struct MemoryLocalStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    /// form_key → external_id → row
    synced: HashMap<String, BTreeMap<String, LocalRecord>>,
    /// form_key → rows awaiting push
    pending: HashMap<String, Vec<LocalRecord>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row awaiting push, for `LocalMaster`/`Hybrid` scenarios.
    pub async fn insert_pending(
        &self,
        form_key: &str,
        local_id: &str,
        fields: BTreeMap<String, Value>,
        modified_at: Option<DateTime<Utc>>,
    ) {
        let mut state = self.inner.lock().await;
        state
            .pending
            .entry(form_key.to_string())
            .or_default()
            .push(LocalRecord {
                local_id: local_id.to_string(),
                external_id: None,
                fields,
                modified_at,
            });
    }

    /// Snapshot of all synced rows for a form, ordered by external id.
    pub async fn rows(&self, form_key: &str) -> Vec<LocalRecord> {
        let state = self.inner.lock().await;
        state
            .synced
            .get(form_key)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn upsert(
        &self,
        form_key: &str,
        external_id: &str,
        fields: BTreeMap<String, Value>,
    ) -> SyncOpResult<UpsertOutcome> {
        let mut state = self.inner.lock().await;
        let rows = state.synced.entry(form_key.to_string()).or_default();
        let outcome = if rows.contains_key(external_id) {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        };
        rows.insert(
            external_id.to_string(),
            LocalRecord {
                local_id: external_id.to_string(),
                external_id: Some(external_id.to_string()),
                fields,
                modified_at: Some(Utc::now()),
            },
        );
        Ok(outcome)
    }

    async fn get(&self, form_key: &str, external_id: &str) -> SyncOpResult<Option<LocalRecord>> {
        let state = self.inner.lock().await;
        Ok(state
            .synced
            .get(form_key)
            .and_then(|rows| rows.get(external_id))
            .cloned())
    }

    async fn delete(&self, form_key: &str, external_id: &str) -> SyncOpResult<bool> {
        let mut state = self.inner.lock().await;
        Ok(state
            .synced
            .get_mut(form_key)
            .is_some_and(|rows| rows.remove(external_id).is_some()))
    }

    async fn pending_push(&self, form_key: &str) -> SyncOpResult<Vec<LocalRecord>> {
        let state = self.inner.lock().await;
        Ok(state.pending.get(form_key).cloned().unwrap_or_default())
    }

    async fn bind_external_id(
        &self,
        form_key: &str,
        local_id: &str,
        external_id: &str,
    ) -> SyncOpResult<()> {
        let mut state = self.inner.lock().await;
        let Some(pending) = state.pending.get_mut(form_key) else {
            return Ok(());
        };
        if let Some(position) = pending.iter().position(|row| row.local_id == local_id) {
            let mut row = pending.remove(position);
            row.external_id = Some(external_id.to_string());
            state
                .synced
                .entry(form_key.to_string())
                .or_default()
                .insert(external_id.to_string(), row);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(name: &str) -> BTreeMap<String, Value> {
        BTreeMap::from([("NAME".to_string(), json!(name))])
    }

    #[tokio::test]
    async fn upsert_reports_created_then_updated() {
        let store = MemoryLocalStore::new();
        assert_eq!(
            store.upsert("f", "1", fields("a")).await.unwrap(),
            UpsertOutcome::Created
        );
        assert_eq!(
            store.upsert("f", "1", fields("b")).await.unwrap(),
            UpsertOutcome::Updated
        );

        let row = store.get("f", "1").await.unwrap().unwrap();
        assert_eq!(row.fields["NAME"], json!("b"));
    }

    #[tokio::test]
    async fn upsert_fully_overwrites_fields() {
        let store = MemoryLocalStore::new();
        let mut first = fields("a");
        first.insert("EXTRA".to_string(), json!(1));
        store.upsert("f", "1", first).await.unwrap();
        store.upsert("f", "1", fields("b")).await.unwrap();

        let row = store.get("f", "1").await.unwrap().unwrap();
        assert!(!row.fields.contains_key("EXTRA"));
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = MemoryLocalStore::new();
        store.upsert("f", "1", fields("a")).await.unwrap();
        assert!(store.delete("f", "1").await.unwrap());
        assert!(!store.delete("f", "1").await.unwrap());
    }

    #[tokio::test]
    async fn bind_moves_pending_row_into_synced() {
        let store = MemoryLocalStore::new();
        store.insert_pending("f", "loc-1", fields("a"), None).await;
        assert_eq!(store.pending_push("f").await.unwrap().len(), 1);

        store.bind_external_id("f", "loc-1", "42").await.unwrap();
        assert!(store.pending_push("f").await.unwrap().is_empty());

        let row = store.get("f", "42").await.unwrap().unwrap();
        assert_eq!(row.external_id.as_deref(), Some("42"));
    }
}
