//! Sync run reporting and status types.

use chrono::{DateTime, Utc};
use formbridge_registry::SyncStrategy;
use serde::Serialize;

/// Outcome of one synchronization run for one form, bulk or incremental.
///
/// Produced at the end of every run and never mutated afterward; the manager
/// retains it as the form's last result until the next run supersedes it.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Records inserted into the receiving side.
    pub created: u64,
    /// Records that overwrote an existing row.
    pub updated: u64,
    /// Records removed.
    pub deleted: u64,
    /// Records intentionally not applied.
    pub skipped: u64,
    /// Records that failed; details in `errors`.
    pub failed: u64,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Per-record error descriptions, in encounter order.
    pub errors: Vec<String>,
}

/// Accumulator used while a run is in progress; frozen into a
/// [`SyncReport`] when the run ends.
#[derive(Debug)]
pub(crate) struct ReportBuilder {
    created: u64,
    updated: u64,
    deleted: u64,
    skipped: u64,
    failed: u64,
    started_at: DateTime<Utc>,
    errors: Vec<String>,
}

impl ReportBuilder {
    pub fn start() -> Self {
        Self {
            created: 0,
            updated: 0,
            deleted: 0,
            skipped: 0,
            failed: 0,
            started_at: Utc::now(),
            errors: Vec::new(),
        }
    }

    pub fn created(&mut self) {
        self.created += 1;
    }

    pub fn updated(&mut self) {
        self.updated += 1;
    }

    pub fn deleted(&mut self) {
        self.deleted += 1;
    }

    pub fn skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.failed += 1;
        self.errors.push(message.into());
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn finish(self) -> SyncReport {
        SyncReport {
            created: self.created,
            updated: self.updated,
            deleted: self.deleted,
            skipped: self.skipped,
            failed: self.failed,
            started_at: self.started_at,
            finished_at: Utc::now(),
            errors: self.errors,
        }
    }
}

/// Lifecycle state of a registered sync service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// No run in flight.
    Idle,
    /// A run holds the per-form lock and is executing.
    Syncing,
    /// The last run recorded at least one failure.
    Error,
}

/// Registration metadata plus the last run outcome for one form.
///
/// Returned by status introspection; never blocks on an in-flight sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncServiceInfo {
    /// The form this service synchronizes.
    pub form_key: String,
    /// Human-readable name for dashboards and logs.
    pub display_name: String,
    /// The form's declared strategy at registration time.
    pub strategy: SyncStrategy,
    /// Whether the scheduler includes this form in automatic runs.
    pub auto_sync: bool,
    pub state: ServiceState,
    /// When the last run finished, if any.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Outcome of the last run, if any.
    pub last_report: Option<SyncReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_counts_in_order() {
        let mut builder = ReportBuilder::start();
        builder.created();
        builder.updated();
        builder.record_failure("record 3: boom");
        builder.record_failure("record 9: bang");
        builder.skipped();

        let report = builder.finish();
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.errors, vec!["record 3: boom", "record 9: bang"]);
        assert!(report.finished_at >= report.started_at);
    }
}
