//! SQLite DDL for the guardian store.

use rusqlite::Connection;

use crate::types::CURRENT_SCHEMA_VERSION;

/// Complete DDL for the guardian database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One row per monitored subject. Tracking columns belong to the alert
-- state machine; counters belong to the scheduler.
CREATE TABLE IF NOT EXISTS guarded_entities (
    id                 TEXT PRIMARY KEY,
    kind               TEXT NOT NULL,
    tier               TEXT NOT NULL DEFAULT 'normal',
    enabled            INTEGER NOT NULL DEFAULT 1,
    version            INTEGER NOT NULL DEFAULT 0,
    reported_tier      TEXT,
    lower_streak       INTEGER NOT NULL DEFAULT 0,
    lower_peak         TEXT NOT NULL DEFAULT 'normal',
    cooldown_remaining INTEGER NOT NULL DEFAULT 0,
    unknown_streak     INTEGER NOT NULL DEFAULT 0,
    suppressed_until   INTEGER,
    last_evaluated_at  INTEGER,
    last_alert_at      INTEGER,
    missed_cycles      INTEGER NOT NULL DEFAULT 0,
    failed_passes      INTEGER NOT NULL DEFAULT 0,
    created_at         INTEGER NOT NULL DEFAULT 0
);

-- Append-only audit trail.
CREATE TABLE IF NOT EXISTS evaluation_records (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id      TEXT NOT NULL REFERENCES guarded_entities(id),
    evaluated_at   INTEGER NOT NULL,
    snapshot       TEXT,               -- JSON SignalSnapshot, NULL when unavailable
    reported_tier  TEXT NOT NULL,
    resulting_tier TEXT NOT NULL,
    rationale      TEXT NOT NULL,
    UNIQUE (entity_id, evaluated_at)
);

CREATE INDEX IF NOT EXISTS idx_evaluations_at ON evaluation_records(evaluated_at);

CREATE TABLE IF NOT EXISTS alert_events (
    id              TEXT PRIMARY KEY,
    entity_id       TEXT NOT NULL REFERENCES guarded_entities(id),
    tier            TEXT NOT NULL,
    rationale       TEXT NOT NULL,
    created_at      INTEGER NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending',
    attempts        INTEGER NOT NULL DEFAULT 0,
    next_attempt_at INTEGER NOT NULL DEFAULT 0,
    updated_at      INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_alerts_pending ON alert_events(status, next_attempt_at);
CREATE INDEX IF NOT EXISTS idx_alerts_entity  ON alert_events(entity_id, created_at);

-- Settled alerts past retention.
CREATE TABLE IF NOT EXISTS alert_archive (
    id              TEXT PRIMARY KEY,
    entity_id       TEXT NOT NULL,
    tier            TEXT NOT NULL,
    rationale       TEXT NOT NULL,
    created_at      INTEGER NOT NULL,
    status          TEXT NOT NULL,
    attempts        INTEGER NOT NULL,
    next_attempt_at INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL,
    archived_at     INTEGER NOT NULL
);

-- Exactly one task per entity, removed when monitoring is disabled.
CREATE TABLE IF NOT EXISTS schedule_tasks (
    entity_id     TEXT PRIMARY KEY REFERENCES guarded_entities(id),
    next_due_at   INTEGER NOT NULL,
    retry_count   INTEGER NOT NULL DEFAULT 0,
    backoff_until INTEGER,
    last_error    TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_due ON schedule_tasks(next_due_at);
"#;

/// Apply the full schema and seed the schema version on a fresh database.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Read the stored schema version, if any.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let value: String = row.get(0)?;
            Ok(value.parse().ok())
        }
        None => Ok(None),
    }
}
