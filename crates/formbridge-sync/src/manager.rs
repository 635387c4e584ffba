//! Synchronization manager.
//!
//! Registers per-form sync services, executes bulk and incremental syncs
//! according to each form's declared strategy, and dispatches authenticated
//! webhook events to the owning form. One sync operation runs per form at a
//! time (a second request queues behind the first); different forms
//! synchronize fully in parallel.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use formbridge_registry::{FormDescriptor, FormRegistry, SyncStrategy};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::error::{SyncError, SyncOpResult};
use crate::event::{EventAction, WebhookEvent};
use crate::extract::{extract_field, extract_key_field};
use crate::report::{ReportBuilder, ServiceState, SyncReport, SyncServiceInfo};
use crate::store::{
    ExternalFields, ExternalRecord, ExternalStore, LocalRecord, LocalStore, UpsertOutcome,
};

/// Tie-breaking policy for bidirectional conflicts when modification
/// timestamps are equal or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// The external store's version wins.
    PreferExternal,
    /// The local row wins and is pushed outward.
    PreferLocal,
}

struct ServiceEntry {
    display_name: String,
    strategy: SyncStrategy,
    auto_sync: bool,
    state: ServiceState,
    last_sync_at: Option<chrono::DateTime<Utc>>,
    last_report: Option<SyncReport>,
}

/// Coordinates all per-form synchronization.
///
/// Explicitly constructed by the composition root and shared by reference
/// with the webhook handler and the sync scheduler; holds no hidden global
/// state.
pub struct SyncManager {
    registry: Arc<FormRegistry>,
    external: Arc<dyn ExternalStore>,
    local: Arc<dyn LocalStore>,
    conflict_policy: ConflictPolicy,
    services: RwLock<HashMap<String, ServiceEntry>>,
    /// Per-form run locks, created lazily and retained for the process
    /// lifetime. The only synchronization needed to keep upserts race-free.
    run_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SyncManager {
    pub fn new(
        registry: Arc<FormRegistry>,
        external: Arc<dyn ExternalStore>,
        local: Arc<dyn LocalStore>,
    ) -> Self {
        Self {
            registry,
            external,
            local,
            conflict_policy: ConflictPolicy::PreferExternal,
            services: RwLock::new(HashMap::new()),
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the tie-breaking policy for bidirectional conflicts.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Register a sync service for a form. The form must exist in the
    /// registry; its strategy is captured for status reporting.
    pub async fn register(
        &self,
        form_key: &str,
        display_name: &str,
        auto_sync: bool,
    ) -> SyncOpResult<()> {
        let descriptor = self.registry.get_form(form_key).await?;
        let mut services = self.services.write().await;
        services.insert(
            form_key.to_string(),
            ServiceEntry {
                display_name: display_name.to_string(),
                strategy: descriptor.sync_strategy,
                auto_sync,
                state: ServiceState::Idle,
                last_sync_at: None,
                last_report: None,
            },
        );
        info!(form_key, display_name, strategy = %descriptor.sync_strategy, "sync service registered");
        Ok(())
    }

    /// Remove a form from the roster. Its retained run lock stays, so an
    /// in-flight run finishes undisturbed.
    pub async fn unregister(&self, form_key: &str) {
        let mut services = self.services.write().await;
        if services.remove(form_key).is_some() {
            info!(form_key, "sync service unregistered");
        }
    }

    /// Status of one registered form, without triggering a run.
    pub async fn status(&self, form_key: &str) -> Option<SyncServiceInfo> {
        let services = self.services.read().await;
        services
            .get(form_key)
            .map(|entry| Self::service_info(form_key, entry))
    }

    /// Status of every registered form, sorted by form key.
    pub async fn status_all(&self) -> Vec<SyncServiceInfo> {
        let services = self.services.read().await;
        let mut infos: Vec<SyncServiceInfo> = services
            .iter()
            .map(|(key, entry)| Self::service_info(key, entry))
            .collect();
        infos.sort_by(|a, b| a.form_key.cmp(&b.form_key));
        infos
    }

    fn service_info(form_key: &str, entry: &ServiceEntry) -> SyncServiceInfo {
        SyncServiceInfo {
            form_key: form_key.to_string(),
            display_name: entry.display_name.clone(),
            strategy: entry.strategy,
            auto_sync: entry.auto_sync,
            state: entry.state,
            last_sync_at: entry.last_sync_at,
            last_report: entry.last_report.clone(),
        }
    }

    /// Perform a bulk synchronization run for one form.
    #[instrument(skip(self))]
    pub async fn run_full_sync(&self, form_key: &str) -> SyncOpResult<SyncReport> {
        self.ensure_registered(form_key).await?;

        let lock = self.run_lock(form_key).await;
        let _guard = lock.lock().await;
        // Only set once the lock is held: a queued run must not have its
        // state clobbered back to Idle by the run ahead of it finishing.
        self.set_state(form_key, ServiceState::Syncing).await;

        // Resolve the descriptor once; the run keeps this generation even if
        // the registry is reloaded mid-run.
        let descriptor = match self.resolve_descriptor(form_key).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.set_state(form_key, ServiceState::Error).await;
                return Err(e);
            }
        };

        let mut report = ReportBuilder::start();
        match descriptor.sync_strategy {
            SyncStrategy::ExternalMaster => {
                self.pull_all(&descriptor, &mut report, false).await;
            }
            SyncStrategy::LocalMaster => {
                self.push_pending(&descriptor, &mut report).await;
            }
            SyncStrategy::Direct => {
                // Nothing to persist on either side; the report must still
                // say so rather than look like an empty pull.
                debug!(form_key, "direct strategy: not synchronized by design");
                report.skipped();
            }
            SyncStrategy::Hybrid => {
                self.pull_all(&descriptor, &mut report, true).await;
                self.push_pending(&descriptor, &mut report).await;
            }
        }

        Ok(self.finish_run(form_key, report).await)
    }

    /// Run every registered form. With `auto_only`, forms registered with
    /// `auto_sync = false` are skipped.
    pub async fn run_all(&self, auto_only: bool) -> HashMap<String, SyncReport> {
        let keys: Vec<String> = {
            let services = self.services.read().await;
            services
                .iter()
                .filter(|(_, entry)| !auto_only || entry.auto_sync)
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut results = HashMap::with_capacity(keys.len());
        for form_key in keys {
            match self.run_full_sync(&form_key).await {
                Ok(report) => {
                    results.insert(form_key, report);
                }
                Err(e) => warn!(form_key, error = %e, "full sync failed"),
            }
        }
        results
    }

    /// Apply one authenticated webhook event to the owning form.
    ///
    /// The caller has already verified the request; this routes the raw
    /// payload by webhook key and applies the single-record change with the
    /// same upsert/delete logic as a bulk run.
    #[instrument(skip(self, raw_payload))]
    pub async fn apply_webhook_event(
        &self,
        webhook_key: &str,
        raw_payload: &[u8],
    ) -> SyncOpResult<SyncReport> {
        let config = self.registry.current().await?;
        let descriptor = config
            .get_form_by_webhook_key(webhook_key)
            .cloned()
            .ok_or_else(|| SyncError::UnroutedWebhook {
                webhook_key: webhook_key.to_string(),
            })?;
        let form_key = descriptor.form_key.clone();
        self.ensure_registered(&form_key).await?;

        let event = WebhookEvent::parse(raw_payload)?;

        let lock = self.run_lock(&form_key).await;
        let _guard = lock.lock().await;
        self.set_state(&form_key, ServiceState::Syncing).await;

        let mut report = ReportBuilder::start();
        if descriptor.sync_strategy.accepts_webhook_updates() {
            if let Err(e) = self.apply_event(&descriptor, &event, &mut report).await {
                self.set_state(&form_key, ServiceState::Error).await;
                return Err(e);
            }
        } else {
            debug!(
                form_key,
                strategy = %descriptor.sync_strategy,
                "webhook ignored: strategy does not cache external changes"
            );
            report.skipped();
        }

        Ok(self.finish_run(&form_key, report).await)
    }

    // ---------------------------------------------------------------------
    // Strategy execution
    // ---------------------------------------------------------------------

    /// Pull all external records into local storage. With `bidirectional`,
    /// conflicts are resolved by most-recent-modification precedence and
    /// local winners are pushed back out.
    async fn pull_all(
        &self,
        descriptor: &FormDescriptor,
        report: &mut ReportBuilder,
        bidirectional: bool,
    ) {
        let records = match self.external.fetch_all(&descriptor.external_path).await {
            Ok(records) => records,
            Err(e) => {
                report.record_failure(format!("fetch failed: {e}"));
                return;
            }
        };

        debug!(
            form_key = %descriptor.form_key,
            count = records.len(),
            "pulling external records"
        );

        for record in records {
            let applied = if bidirectional {
                self.apply_with_conflict_resolution(descriptor, &record).await
            } else {
                self.upsert_record(descriptor, &record).await
            };
            match applied {
                Ok(Some(UpsertOutcome::Created)) => report.created(),
                Ok(Some(UpsertOutcome::Updated)) => report.updated(),
                Ok(None) => report.skipped(),
                Err(e) => report.record_failure(format!("record {}: {e}", record.id)),
            }
        }
    }

    /// Map and upsert one external record. The external record id is the
    /// conflict target; applying the same record twice leaves storage in the
    /// same end state.
    async fn upsert_record(
        &self,
        descriptor: &FormDescriptor,
        record: &ExternalRecord,
    ) -> SyncOpResult<Option<UpsertOutcome>> {
        let mapped = Self::map_record(descriptor, record)?;
        if mapped.is_empty() {
            return Ok(None);
        }
        let outcome = self
            .local
            .upsert(&descriptor.form_key, &record.id, mapped)
            .await?;
        Ok(Some(outcome))
    }

    /// Bidirectional application of one external record: last writer wins by
    /// modification timestamp, ties and missing timestamps resolved by the
    /// configured policy.
    async fn apply_with_conflict_resolution(
        &self,
        descriptor: &FormDescriptor,
        record: &ExternalRecord,
    ) -> SyncOpResult<Option<UpsertOutcome>> {
        let existing = self.local.get(&descriptor.form_key, &record.id).await?;
        let Some(local_row) = existing else {
            return self.upsert_record(descriptor, record).await;
        };

        let external_wins = match (record.modified_at, local_row.modified_at) {
            (Some(external), Some(local)) if external != local => external > local,
            _ => self.conflict_policy == ConflictPolicy::PreferExternal,
        };

        if external_wins {
            self.upsert_record(descriptor, record).await
        } else {
            let fields = Self::to_external_fields(descriptor, &local_row)?;
            self.external
                .update(&descriptor.external_path, &record.id, &fields)
                .await?;
            Ok(Some(UpsertOutcome::Updated))
        }
    }

    /// Push local rows that have no bound external id yet, binding the id
    /// the store assigns back onto each row.
    async fn push_pending(&self, descriptor: &FormDescriptor, report: &mut ReportBuilder) {
        let pending = match self.local.pending_push(&descriptor.form_key).await {
            Ok(rows) => rows,
            Err(e) => {
                report.record_failure(format!("pending rows unavailable: {e}"));
                return;
            }
        };

        for row in pending {
            match self.push_row(descriptor, &row).await {
                Ok(()) => report.created(),
                Err(e) => report.record_failure(format!("row {}: {e}", row.local_id)),
            }
        }
    }

    async fn push_row(&self, descriptor: &FormDescriptor, row: &LocalRecord) -> SyncOpResult<()> {
        let fields = Self::to_external_fields(descriptor, row)?;
        let external_id = self
            .external
            .create(&descriptor.external_path, &fields)
            .await?;
        self.local
            .bind_external_id(&descriptor.form_key, &row.local_id, &external_id)
            .await?;
        Ok(())
    }

    async fn apply_event(
        &self,
        descriptor: &FormDescriptor,
        event: &WebhookEvent,
        report: &mut ReportBuilder,
    ) -> SyncOpResult<()> {
        if event.action == EventAction::Delete {
            match self.local.delete(&descriptor.form_key, &event.record_id).await {
                Ok(true) => report.deleted(),
                Ok(false) => report.skipped(),
                Err(e) => report.record_failure(format!("record {}: {e}", event.record_id)),
            }
            return Ok(());
        }

        let record = match &event.fields {
            Some(fields) => ExternalRecord {
                id: event.record_id.clone(),
                fields: fields.clone(),
                modified_at: None,
            },
            None => {
                match self
                    .external
                    .fetch_one(&descriptor.external_path, &event.record_id)
                    .await
                {
                    Ok(Some(record)) => record,
                    Ok(None) => {
                        report.record_failure(format!(
                            "record {} not found on external store",
                            event.record_id
                        ));
                        return Ok(());
                    }
                    Err(e) => {
                        report.record_failure(format!("record {}: {e}", event.record_id));
                        return Ok(());
                    }
                }
            }
        };

        match self.upsert_record(descriptor, &record).await {
            Ok(Some(UpsertOutcome::Created)) => report.created(),
            Ok(Some(UpsertOutcome::Updated)) => report.updated(),
            Ok(None) => report.skipped(),
            // Mapping failures are configuration bugs and propagate; storage
            // failures stay per-record.
            Err(e @ SyncError::Configuration(_)) => return Err(e),
            Err(e) => report.record_failure(format!("record {}: {e}", record.id)),
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Field mapping
    // ---------------------------------------------------------------------

    /// Map a raw external record to logical fields via the form's mapping.
    ///
    /// The key field is resolved strictly: its mapping must exist, and its
    /// value never comes from fuzzy matching.
    fn map_record(
        descriptor: &FormDescriptor,
        record: &ExternalRecord,
    ) -> SyncOpResult<BTreeMap<String, Value>> {
        let key_logical = descriptor.key_field.as_deref();
        if let Some(logical) = key_logical {
            descriptor.resolve_field(logical)?;
        }

        let mut mapped = BTreeMap::new();
        for (logical, external_id) in &descriptor.field_mapping {
            let value = if key_logical == Some(logical.as_str()) {
                extract_key_field(&record.fields, external_id)
            } else {
                extract_field(&record.fields, external_id, descriptor.variants(logical))
            };
            if let Some(value) = value {
                mapped.insert(logical.clone(), value.clone());
            }
        }
        Ok(mapped)
    }

    /// Convert a local row's logical fields to external identifiers for an
    /// outbound write.
    fn to_external_fields(
        descriptor: &FormDescriptor,
        row: &LocalRecord,
    ) -> SyncOpResult<ExternalFields> {
        let mut fields = ExternalFields::new();
        for (logical, value) in &row.fields {
            let external_id = descriptor.resolve_field(logical)?;
            fields.insert(external_id.to_string(), value.clone());
        }
        Ok(fields)
    }

    // ---------------------------------------------------------------------
    // Bookkeeping
    // ---------------------------------------------------------------------

    async fn resolve_descriptor(&self, form_key: &str) -> SyncOpResult<FormDescriptor> {
        let config = self.registry.current().await?;
        Ok(config.get_form(form_key)?.clone())
    }

    async fn ensure_registered(&self, form_key: &str) -> SyncOpResult<()> {
        let services = self.services.read().await;
        if services.contains_key(form_key) {
            Ok(())
        } else {
            Err(SyncError::ServiceNotRegistered {
                form_key: form_key.to_string(),
            })
        }
    }

    async fn run_lock(&self, form_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.run_locks.lock().await;
        Arc::clone(
            locks
                .entry(form_key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    async fn set_state(&self, form_key: &str, state: ServiceState) {
        let mut services = self.services.write().await;
        if let Some(entry) = services.get_mut(form_key) {
            entry.state = state;
        }
    }

    async fn finish_run(&self, form_key: &str, report: ReportBuilder) -> SyncReport {
        let state = if report.has_failures() {
            ServiceState::Error
        } else {
            ServiceState::Idle
        };
        let report = report.finish();

        let mut services = self.services.write().await;
        if let Some(entry) = services.get_mut(form_key) {
            entry.state = state;
            entry.last_sync_at = Some(report.finished_at);
            entry.last_report = Some(report.clone());
        }

        info!(
            form_key,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            skipped = report.skipped,
            failed = report.failed,
            "sync run finished"
        );
        report
    }
}
