//! SQLite-backed monitor store at `{root_dir}/guardian.db`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use super::schema::{apply_schema, read_schema_version};
use super::{CommitOutcome, CycleCommit, DeliveryUpdate, MonitorStore, PruneReport, StoreError};
use crate::types::{
    AlertEvent, AlertTier, DeliveryStatus, EntityKind, EvaluationRecord, GuardedEntity,
    PassCounter, ScheduleTask, SignalSnapshot, SignalTier, TrackingState,
};

/// Database filename within the store root directory.
const DB_FILENAME: &str = "guardian.db";

const ENTITY_COLUMNS: &str = "id, kind, tier, enabled, version, reported_tier, lower_streak, \
     lower_peak, cooldown_remaining, unknown_streak, suppressed_until, last_evaluated_at, \
     last_alert_at, missed_cycles, failed_passes, created_at";

const EVALUATION_COLUMNS: &str =
    "id, entity_id, evaluated_at, snapshot, reported_tier, resulting_tier, rationale";

const ALERT_COLUMNS: &str =
    "id, entity_id, tier, rationale, created_at, status, attempts, next_attempt_at, updated_at";

const TASK_COLUMNS: &str = "entity_id, next_due_at, retry_count, backoff_until, last_error";

/// SQLite monitor store.
///
/// Thread-safe via an internal `Mutex<Connection>`; every multi-row write
/// runs in one transaction.
pub struct SqliteStore {
    root: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `{root_dir}/guardian.db`.
    pub fn open(root_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root_dir).map_err(|e| StoreError::Io(e.to_string()))?;
        let conn = Connection::open(root_dir.join(DB_FILENAME))?;
        apply_schema(&conn)?;
        Ok(Self {
            root: Some(root_dir.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            root: None,
            conn: Mutex::new(conn),
        })
    }

    /// Root directory, `None` for in-memory stores.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    pub fn get_entity(&self, id: &str) -> Result<Option<GuardedEntity>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {ENTITY_COLUMNS} FROM guarded_entities WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id], row_to_entity).optional()?)
    }

    pub fn upsert_entity(&self, entity: &GuardedEntity) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let t = &entity.tracking;
        conn.execute(
            &format!(
                "INSERT INTO guarded_entities ({ENTITY_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16) \
                 ON CONFLICT(id) DO UPDATE SET kind = excluded.kind, tier = excluded.tier, \
                 enabled = excluded.enabled, version = excluded.version, \
                 reported_tier = excluded.reported_tier, lower_streak = excluded.lower_streak, \
                 lower_peak = excluded.lower_peak, \
                 cooldown_remaining = excluded.cooldown_remaining, \
                 unknown_streak = excluded.unknown_streak, \
                 suppressed_until = excluded.suppressed_until, \
                 last_evaluated_at = excluded.last_evaluated_at, \
                 last_alert_at = excluded.last_alert_at, \
                 missed_cycles = excluded.missed_cycles, \
                 failed_passes = excluded.failed_passes, created_at = excluded.created_at"
            ),
            params![
                entity.id,
                entity.kind.as_str(),
                entity.tier.as_str(),
                entity.enabled,
                entity.version,
                t.reported_tier.map(SignalTier::as_str),
                t.lower_streak,
                t.lower_peak.as_str(),
                t.cooldown_remaining,
                t.unknown_streak,
                t.suppressed_until,
                entity.last_evaluated_at,
                entity.last_alert_at,
                entity.missed_cycles,
                entity.failed_passes,
                entity.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_entities(&self) -> Result<Vec<GuardedEntity>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {ENTITY_COLUMNS} FROM guarded_entities ORDER BY id"))?;
        let rows = stmt.query_map([], row_to_entity)?;
        collect_rows(rows)
    }

    pub fn compare_and_swap_entity(
        &self,
        entity: &GuardedEntity,
        expected_version: u64,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = write_state(&conn, entity, expected_version, false)?;
        Ok(changed == 1)
    }

    pub fn set_monitoring(
        &self,
        id: &str,
        enabled: bool,
        task: Option<&ScheduleTask>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        // The version bump makes a pass that straddles disable/enable lose its commit.
        let changed = tx.execute(
            "UPDATE guarded_entities SET enabled = ?1, version = version + 1 WHERE id = ?2",
            params![enabled, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }

        if enabled {
            if let Some(task) = task {
                upsert_task_on(&tx, task)?;
            }
        } else {
            tx.execute(
                "DELETE FROM schedule_tasks WHERE entity_id = ?1",
                params![id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn bump_counter(&self, id: &str, counter: PassCounter) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let sql = match counter {
            PassCounter::Missed => {
                "UPDATE guarded_entities SET missed_cycles = missed_cycles + 1 WHERE id = ?1"
            }
            PassCounter::Failed => {
                "UPDATE guarded_entities SET failed_passes = failed_passes + 1 WHERE id = ?1"
            }
        };
        if conn.execute(sql, params![id])? == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }

    pub fn append_evaluation(&self, record: &EvaluationRecord) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let id = insert_evaluation(&tx, record)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn append_alert(&self, alert: &AlertEvent) -> Result<(), StoreError> {
        let conn = self.lock()?;
        insert_alert(&conn, alert)
    }

    pub fn commit_cycle(&self, commit: &CycleCommit) -> Result<CommitOutcome, StoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let changed = write_state(&tx, &commit.entity, commit.expected_version, true)?;
        if changed == 0 {
            let enabled: Option<bool> = tx
                .query_row(
                    "SELECT enabled FROM guarded_entities WHERE id = ?1",
                    params![commit.entity.id],
                    |row| row.get(0),
                )
                .optional()?;
            return match enabled {
                None => Err(StoreError::NotFound(commit.entity.id.clone())),
                Some(false) => Ok(CommitOutcome::EntityDisabled),
                Some(true) => Ok(CommitOutcome::VersionConflict),
            };
        }

        insert_evaluation(&tx, &commit.record)?;
        if let Some(alert) = &commit.alert {
            insert_alert(&tx, alert)?;
        }

        tx.commit()?;
        Ok(CommitOutcome::Committed {
            version: commit.expected_version.saturating_add(1),
        })
    }

    pub fn history(&self, id: &str, limit: usize) -> Result<Vec<EvaluationRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVALUATION_COLUMNS} FROM evaluation_records \
             WHERE entity_id = ?1 ORDER BY evaluated_at DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![id, clamp_limit(limit)], row_to_evaluation)?;
        collect_rows(rows)
    }

    pub fn alerts(
        &self,
        entity_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertEvent>, StoreError> {
        let conn = self.lock()?;
        let limit = clamp_limit(limit);
        match entity_id {
            Some(id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ALERT_COLUMNS} FROM alert_events WHERE entity_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![id, limit], row_to_alert)?;
                collect_rows(rows)
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ALERT_COLUMNS} FROM alert_events \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit], row_to_alert)?;
                collect_rows(rows)
            }
        }
    }

    pub fn get_alert(&self, id: &str) -> Result<Option<AlertEvent>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alert_events WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id], row_to_alert).optional()?)
    }

    pub fn pending_alerts_due(&self, now_ms: u64) -> Result<Vec<AlertEvent>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alert_events \
             WHERE status = 'pending' AND next_attempt_at <= ?1 \
             ORDER BY next_attempt_at, created_at"
        ))?;
        let rows = stmt.query_map(params![now_ms], row_to_alert)?;
        collect_rows(rows)
    }

    pub fn mark_delivered(&self, update: &DeliveryUpdate) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE alert_events SET status = ?1, attempts = ?2, next_attempt_at = ?3, \
             updated_at = ?4 WHERE id = ?5",
            params![
                update.status.as_str(),
                update.attempts,
                update.next_attempt_at,
                update.updated_at,
                update.alert_id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(update.alert_id.clone()));
        }
        Ok(())
    }

    pub fn list_due_tasks(&self, now_ms: u64) -> Result<Vec<ScheduleTask>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT t.entity_id, t.next_due_at, t.retry_count, t.backoff_until, t.last_error \
             FROM schedule_tasks t JOIN guarded_entities e ON e.id = t.entity_id \
             WHERE e.enabled = 1 AND t.next_due_at <= ?1 \
             AND (t.backoff_until IS NULL OR t.backoff_until <= ?1) \
             ORDER BY t.next_due_at, t.entity_id",
        )?;
        let rows = stmt.query_map(params![now_ms], row_to_task)?;
        collect_rows(rows)
    }

    pub fn get_task(&self, entity_id: &str) -> Result<Option<ScheduleTask>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {TASK_COLUMNS} FROM schedule_tasks WHERE entity_id = ?1");
        Ok(conn.query_row(&sql, params![entity_id], row_to_task).optional()?)
    }

    pub fn upsert_task(&self, task: &ScheduleTask) -> Result<(), StoreError> {
        let conn = self.lock()?;
        upsert_task_on(&conn, task)
    }

    pub fn update_task(&self, task: &ScheduleTask) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE schedule_tasks SET next_due_at = ?1, retry_count = ?2, backoff_until = ?3, \
             last_error = ?4 WHERE entity_id = ?5",
            params![
                task.next_due_at,
                task.retry_count,
                task.backoff_until,
                task.last_error,
                task.entity_id,
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn remove_task(&self, entity_id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM schedule_tasks WHERE entity_id = ?1",
            params![entity_id],
        )?;
        Ok(changed == 1)
    }

    pub fn prune(
        &self,
        alert_cutoff: Option<u64>,
        evaluation_cutoff: Option<u64>,
        now_ms: u64,
    ) -> Result<PruneReport, StoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let mut report = PruneReport::default();

        if let Some(cutoff) = alert_cutoff {
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO alert_archive ({ALERT_COLUMNS}, archived_at) \
                     SELECT {ALERT_COLUMNS}, ?2 FROM alert_events \
                     WHERE status != 'pending' AND created_at < ?1"
                ),
                params![cutoff, now_ms],
            )?;
            report.alerts_archived = tx.execute(
                "DELETE FROM alert_events WHERE status != 'pending' AND created_at < ?1",
                params![cutoff],
            )?;
        }

        if let Some(cutoff) = evaluation_cutoff {
            report.evaluations_deleted = tx.execute(
                "DELETE FROM evaluation_records WHERE evaluated_at < ?1 \
                 AND id NOT IN (SELECT MAX(id) FROM evaluation_records GROUP BY entity_id)",
                params![cutoff],
            )?;
        }

        tx.commit()?;
        Ok(report)
    }

    /// Number of archived alerts.
    pub fn archived_alert_count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM alert_archive", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

impl MonitorStore for SqliteStore {
    fn get_entity(&self, id: &str) -> crate::error::Result<Option<GuardedEntity>> {
        Ok(SqliteStore::get_entity(self, id)?)
    }

    fn upsert_entity(&self, entity: &GuardedEntity) -> crate::error::Result<()> {
        Ok(SqliteStore::upsert_entity(self, entity)?)
    }

    fn list_entities(&self) -> crate::error::Result<Vec<GuardedEntity>> {
        Ok(SqliteStore::list_entities(self)?)
    }

    fn compare_and_swap_entity(
        &self,
        entity: &GuardedEntity,
        expected_version: u64,
    ) -> crate::error::Result<bool> {
        Ok(SqliteStore::compare_and_swap_entity(
            self,
            entity,
            expected_version,
        )?)
    }

    fn set_monitoring(
        &self,
        id: &str,
        enabled: bool,
        task: Option<&ScheduleTask>,
    ) -> crate::error::Result<()> {
        Ok(SqliteStore::set_monitoring(self, id, enabled, task)?)
    }

    fn bump_counter(&self, id: &str, counter: PassCounter) -> crate::error::Result<()> {
        Ok(SqliteStore::bump_counter(self, id, counter)?)
    }

    fn append_evaluation(&self, record: &EvaluationRecord) -> crate::error::Result<i64> {
        Ok(SqliteStore::append_evaluation(self, record)?)
    }

    fn append_alert(&self, alert: &AlertEvent) -> crate::error::Result<()> {
        Ok(SqliteStore::append_alert(self, alert)?)
    }

    fn commit_cycle(&self, commit: &CycleCommit) -> crate::error::Result<CommitOutcome> {
        Ok(SqliteStore::commit_cycle(self, commit)?)
    }

    fn history(&self, id: &str, limit: usize) -> crate::error::Result<Vec<EvaluationRecord>> {
        Ok(SqliteStore::history(self, id, limit)?)
    }

    fn alerts(
        &self,
        entity_id: Option<&str>,
        limit: usize,
    ) -> crate::error::Result<Vec<AlertEvent>> {
        Ok(SqliteStore::alerts(self, entity_id, limit)?)
    }

    fn get_alert(&self, id: &str) -> crate::error::Result<Option<AlertEvent>> {
        Ok(SqliteStore::get_alert(self, id)?)
    }

    fn pending_alerts_due(&self, now_ms: u64) -> crate::error::Result<Vec<AlertEvent>> {
        Ok(SqliteStore::pending_alerts_due(self, now_ms)?)
    }

    fn mark_delivered(&self, update: &DeliveryUpdate) -> crate::error::Result<()> {
        Ok(SqliteStore::mark_delivered(self, update)?)
    }

    fn list_due_tasks(&self, now_ms: u64) -> crate::error::Result<Vec<ScheduleTask>> {
        Ok(SqliteStore::list_due_tasks(self, now_ms)?)
    }

    fn get_task(&self, entity_id: &str) -> crate::error::Result<Option<ScheduleTask>> {
        Ok(SqliteStore::get_task(self, entity_id)?)
    }

    fn upsert_task(&self, task: &ScheduleTask) -> crate::error::Result<()> {
        Ok(SqliteStore::upsert_task(self, task)?)
    }

    fn update_task(&self, task: &ScheduleTask) -> crate::error::Result<bool> {
        Ok(SqliteStore::update_task(self, task)?)
    }

    fn remove_task(&self, entity_id: &str) -> crate::error::Result<bool> {
        Ok(SqliteStore::remove_task(self, entity_id)?)
    }

    fn prune(
        &self,
        alert_cutoff: Option<u64>,
        evaluation_cutoff: Option<u64>,
        now_ms: u64,
    ) -> crate::error::Result<PruneReport> {
        Ok(SqliteStore::prune(
            self,
            alert_cutoff,
            evaluation_cutoff,
            now_ms,
        )?)
    }
}

// ---------------------------------------------------------------------------
// Write helpers (shared between plain and transactional paths)
// ---------------------------------------------------------------------------

/// Conditional state write. Counter columns and `enabled` are never touched.
fn write_state(
    conn: &Connection,
    entity: &GuardedEntity,
    expected_version: u64,
    require_enabled: bool,
) -> Result<usize, StoreError> {
    let t = &entity.tracking;
    let sql = if require_enabled {
        "UPDATE guarded_entities SET tier = ?1, reported_tier = ?2, lower_streak = ?3, \
         lower_peak = ?4, cooldown_remaining = ?5, unknown_streak = ?6, suppressed_until = ?7, \
         last_evaluated_at = ?8, last_alert_at = ?9, version = version + 1 \
         WHERE id = ?10 AND version = ?11 AND enabled = 1"
    } else {
        "UPDATE guarded_entities SET tier = ?1, reported_tier = ?2, lower_streak = ?3, \
         lower_peak = ?4, cooldown_remaining = ?5, unknown_streak = ?6, suppressed_until = ?7, \
         last_evaluated_at = ?8, last_alert_at = ?9, version = version + 1 \
         WHERE id = ?10 AND version = ?11"
    };
    Ok(conn.execute(
        sql,
        params![
            entity.tier.as_str(),
            t.reported_tier.map(SignalTier::as_str),
            t.lower_streak,
            t.lower_peak.as_str(),
            t.cooldown_remaining,
            t.unknown_streak,
            t.suppressed_until,
            entity.last_evaluated_at,
            entity.last_alert_at,
            entity.id,
            expected_version,
        ],
    )?)
}

fn insert_evaluation(conn: &Connection, record: &EvaluationRecord) -> Result<i64, StoreError> {
    let latest: Option<u64> = conn.query_row(
        "SELECT MAX(evaluated_at) FROM evaluation_records WHERE entity_id = ?1",
        params![record.entity_id],
        |row| row.get(0),
    )?;
    if let Some(latest) = latest
        && record.evaluated_at <= latest
    {
        return Err(StoreError::OutOfOrder {
            entity_id: record.entity_id.clone(),
            evaluated_at: record.evaluated_at,
            latest,
        });
    }

    let snapshot = match &record.snapshot {
        Some(s) => Some(serde_json::to_string(s).map_err(|e| StoreError::Io(e.to_string()))?),
        None => None,
    };
    conn.execute(
        "INSERT INTO evaluation_records \
         (entity_id, evaluated_at, snapshot, reported_tier, resulting_tier, rationale) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.entity_id,
            record.evaluated_at,
            snapshot,
            record.reported_tier.as_str(),
            record.resulting_tier.as_str(),
            record.rationale,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_alert(conn: &Connection, alert: &AlertEvent) -> Result<(), StoreError> {
    conn.execute(
        &format!(
            "INSERT INTO alert_events ({ALERT_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            alert.id,
            alert.entity_id,
            alert.tier.as_str(),
            alert.rationale,
            alert.created_at,
            alert.status.as_str(),
            alert.attempts,
            alert.next_attempt_at,
            alert.updated_at,
        ],
    )?;
    Ok(())
}

fn upsert_task_on(conn: &Connection, task: &ScheduleTask) -> Result<(), StoreError> {
    conn.execute(
        &format!(
            "INSERT INTO schedule_tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(entity_id) DO UPDATE SET next_due_at = excluded.next_due_at, \
             retry_count = excluded.retry_count, backoff_until = excluded.backoff_until, \
             last_error = excluded.last_error"
        ),
        params![
            task.entity_id,
            task.next_due_at,
            task.retry_count,
            task.backoff_until,
            task.last_error,
        ],
    )?;
    Ok(())
}

fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Row conversion helpers
// ---------------------------------------------------------------------------

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<GuardedEntity> {
    let kind: String = row.get(1)?;
    let tier: String = row.get(2)?;
    let reported: Option<String> = row.get(5)?;
    let lower_peak: String = row.get(7)?;

    Ok(GuardedEntity {
        id: row.get(0)?,
        kind: str_to_kind(&kind),
        tier: str_to_tier(&tier),
        enabled: row.get(3)?,
        version: row.get(4)?,
        tracking: TrackingState {
            reported_tier: reported.as_deref().map(str_to_signal_tier),
            lower_streak: row.get(6)?,
            lower_peak: str_to_tier(&lower_peak),
            cooldown_remaining: row.get(8)?,
            unknown_streak: row.get(9)?,
            suppressed_until: row.get(10)?,
        },
        last_evaluated_at: row.get(11)?,
        last_alert_at: row.get(12)?,
        missed_cycles: row.get(13)?,
        failed_passes: row.get(14)?,
        created_at: row.get(15)?,
    })
}

fn row_to_evaluation(row: &rusqlite::Row<'_>) -> rusqlite::Result<EvaluationRecord> {
    let snapshot_json: Option<String> = row.get(3)?;
    let reported: String = row.get(4)?;
    let resulting: String = row.get(5)?;

    Ok(EvaluationRecord {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        evaluated_at: row.get(2)?,
        snapshot: snapshot_json
            .as_deref()
            .and_then(|s| serde_json::from_str::<SignalSnapshot>(s).ok()),
        reported_tier: str_to_signal_tier(&reported),
        resulting_tier: str_to_tier(&resulting),
        rationale: row.get(6)?,
    })
}

fn row_to_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertEvent> {
    let tier: String = row.get(2)?;
    let status: String = row.get(5)?;

    Ok(AlertEvent {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        tier: str_to_tier(&tier),
        rationale: row.get(3)?,
        created_at: row.get(4)?,
        status: str_to_status(&status),
        attempts: row.get(6)?,
        next_attempt_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleTask> {
    Ok(ScheduleTask {
        entity_id: row.get(0)?,
        next_due_at: row.get(1)?,
        retry_count: row.get(2)?,
        backoff_until: row.get(3)?,
        last_error: row.get(4)?,
    })
}

fn str_to_kind(s: &str) -> EntityKind {
    match s {
        "application" => EntityKind::Application,
        "sensor" => EntityKind::Sensor,
        "device" => EntityKind::Device,
        _ => EntityKind::Device, // safe fallback
    }
}

fn str_to_tier(s: &str) -> AlertTier {
    match s {
        "warning" => AlertTier::Warning,
        "critical" => AlertTier::Critical,
        "suppressed" => AlertTier::Suppressed,
        _ => AlertTier::Normal,
    }
}

fn str_to_signal_tier(s: &str) -> SignalTier {
    match s {
        "normal" => SignalTier::Normal,
        "warning" => SignalTier::Warning,
        "critical" => SignalTier::Critical,
        _ => SignalTier::Unknown,
    }
}

fn str_to_status(s: &str) -> DeliveryStatus {
    match s {
        "delivered" => DeliveryStatus::Delivered,
        "failed" => DeliveryStatus::Failed,
        _ => DeliveryStatus::Pending,
    }
}
