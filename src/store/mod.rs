//! Persistence store: the single source of truth for entities, evaluation
//! history, alert events and schedule tasks.
//!
//! [`MonitorStore`] is synchronous. Async callers run it on the blocking
//! pool through [`with_store`].

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;

use std::sync::Arc;

use crate::error::{GuardianError, Result};
use crate::types::{
    AlertEvent, DeliveryStatus, EvaluationRecord, GuardedEntity, PassCounter, ScheduleTask,
};

/// Everything one evaluation pass writes, committed as a single transaction.
#[derive(Debug, Clone)]
pub struct CycleCommit {
    /// New entity state. Its `version` field is ignored; the store bumps it.
    pub entity: GuardedEntity,
    /// Version the pass loaded. The write fails if it moved.
    pub expected_version: u64,
    pub record: EvaluationRecord,
    /// Alert emitted by this transition, if any.
    pub alert: Option<AlertEvent>,
}

/// Result of [`MonitorStore::commit_cycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Entity, record and alert were written. Holds the new entity version.
    Committed { version: u64 },
    /// Monitoring was disabled while the pass ran; nothing was written.
    EntityDisabled,
    /// Another writer changed the entity; nothing was written.
    VersionConflict,
}

/// Delivery bookkeeping written after a gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryUpdate {
    pub alert_id: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub next_attempt_at: u64,
    pub updated_at: u64,
}

/// Counts from one retention run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub alerts_archived: usize,
    pub evaluations_deleted: usize,
}

/// Durable storage used by the scheduler, monitor and delivery worker.
pub trait MonitorStore: Send + Sync {
    fn get_entity(&self, id: &str) -> Result<Option<GuardedEntity>>;

    /// Insert or fully replace an entity.
    fn upsert_entity(&self, entity: &GuardedEntity) -> Result<()>;

    /// All entities, ordered by id.
    fn list_entities(&self) -> Result<Vec<GuardedEntity>>;

    /// Write `entity` only if the stored version equals `expected_version`.
    /// Returns `false` on a version conflict.
    fn compare_and_swap_entity(&self, entity: &GuardedEntity, expected_version: u64)
    -> Result<bool>;

    /// Soft enable or disable monitoring. Enabling installs `task` when
    /// given; disabling removes the entity's task. Atomic.
    fn set_monitoring(&self, id: &str, enabled: bool, task: Option<&ScheduleTask>) -> Result<()>;

    /// Increment a scheduler counter without touching the entity version.
    fn bump_counter(&self, id: &str, counter: PassCounter) -> Result<()>;

    /// Append an evaluation record. Fails when `evaluated_at` is not strictly
    /// after the entity's latest record. Returns the row id.
    fn append_evaluation(&self, record: &EvaluationRecord) -> Result<i64>;

    fn append_alert(&self, alert: &AlertEvent) -> Result<()>;

    /// Atomically write entity state, the evaluation record and any alert.
    fn commit_cycle(&self, commit: &CycleCommit) -> Result<CommitOutcome>;

    /// Newest-first evaluation history.
    fn history(&self, id: &str, limit: usize) -> Result<Vec<EvaluationRecord>>;

    /// Newest-first alerts, for one entity or all.
    fn alerts(&self, entity_id: Option<&str>, limit: usize) -> Result<Vec<AlertEvent>>;

    fn get_alert(&self, id: &str) -> Result<Option<AlertEvent>>;

    /// `Pending` alerts whose next attempt is due.
    fn pending_alerts_due(&self, now_ms: u64) -> Result<Vec<AlertEvent>>;

    fn mark_delivered(&self, update: &DeliveryUpdate) -> Result<()>;

    /// Tasks of enabled entities that are due and past any backoff.
    fn list_due_tasks(&self, now_ms: u64) -> Result<Vec<ScheduleTask>>;

    fn get_task(&self, entity_id: &str) -> Result<Option<ScheduleTask>>;

    fn upsert_task(&self, task: &ScheduleTask) -> Result<()>;

    /// Update an existing task. Returns `false` if it was removed meanwhile.
    fn update_task(&self, task: &ScheduleTask) -> Result<bool>;

    fn remove_task(&self, entity_id: &str) -> Result<bool>;

    /// Archive settled alerts created before `alert_cutoff` and delete
    /// evaluation records before `evaluation_cutoff`, keeping each entity's
    /// latest record. `None` skips that half.
    fn prune(
        &self,
        alert_cutoff: Option<u64>,
        evaluation_cutoff: Option<u64>,
        now_ms: u64,
    ) -> Result<PruneReport>;
}

/// Run a store call on the blocking pool.
///
/// # Errors
///
/// Returns the call's own error, or `StorageUnavailable` if the blocking
/// task could not complete.
pub async fn with_store<T, F>(store: &Arc<dyn MonitorStore>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn MonitorStore) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| GuardianError::StorageUnavailable(format!("store task failed: {e}")))?
}

/// Errors from the SQLite backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("lock poisoned: {0}")]
    Lock(String),

    #[error("evaluation for '{entity_id}' at {evaluated_at} is not after {latest}")]
    OutOfOrder {
        entity_id: String,
        evaluated_at: u64,
        latest: u64,
    },
}

impl From<StoreError> for GuardianError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => GuardianError::NotFound(id),
            conflict @ StoreError::OutOfOrder { .. } => {
                GuardianError::Conflict(conflict.to_string())
            }
            other => GuardianError::StorageUnavailable(other.to_string()),
        }
    }
}
