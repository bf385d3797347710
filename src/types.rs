//! Core data model shared by the store, evaluator, state machine and scheduler.
//!
//! All timestamps are Unix epoch milliseconds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current schema version for the SQLite store.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// What kind of subject an entity guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// An installed application (permission and usage checks).
    Application,
    /// A hardware sensor (camera, microphone, location, clipboard).
    Sensor,
    /// The device as a whole.
    Device,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Sensor => "sensor",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Alert tier held by an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTier {
    Normal,
    Warning,
    Critical,
    /// Operator acknowledged; no alerts until the suppression window ends.
    Suppressed,
}

impl AlertTier {
    /// Severity rank. `Suppressed` ranks with `Normal`; it is never compared
    /// as a severity by the state machine.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Normal | Self::Suppressed => 0,
            Self::Warning => 1,
            Self::Critical => 2,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Suppressed => "suppressed",
        }
    }
}

impl fmt::Display for AlertTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Tier reported by the evaluator for a single snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalTier {
    Normal,
    Warning,
    Critical,
    /// Signal missing, stale, or not classifiable.
    Unknown,
}

impl SignalTier {
    /// The alert tier this reading maps to, or `None` for `Unknown`.
    #[must_use]
    pub fn alert_tier(self) -> Option<AlertTier> {
        match self {
            Self::Normal => Some(AlertTier::Normal),
            Self::Warning => Some(AlertTier::Warning),
            Self::Critical => Some(AlertTier::Critical),
            Self::Unknown => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SignalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Delivery lifecycle of an alert event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// State-machine bookkeeping persisted alongside the entity tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingState {
    /// Last tier reported by the evaluator.
    pub reported_tier: Option<SignalTier>,
    /// Consecutive readings below the current tier.
    pub lower_streak: u32,
    /// Highest tier seen during the current lower streak.
    pub lower_peak: AlertTier,
    /// Evaluations left before a `Warning` escalation is allowed again.
    pub cooldown_remaining: u32,
    /// Consecutive unavailable or stale readings.
    pub unknown_streak: u32,
    /// End of the acknowledgement window while `Suppressed`.
    pub suppressed_until: Option<u64>,
}

impl Default for TrackingState {
    fn default() -> Self {
        Self {
            reported_tier: None,
            lower_streak: 0,
            lower_peak: AlertTier::Normal,
            cooldown_remaining: 0,
            unknown_streak: 0,
            suppressed_until: None,
        }
    }
}

/// A monitored subject and its current alert state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardedEntity {
    pub id: String,
    pub kind: EntityKind,
    pub tier: AlertTier,
    /// Soft-disable flag. Disabled entities are never deleted.
    pub enabled: bool,
    /// Optimistic-concurrency counter, bumped on every state write.
    pub version: u64,
    pub tracking: TrackingState,
    pub last_evaluated_at: Option<u64>,
    pub last_alert_at: Option<u64>,
    /// Cycles skipped because a previous pass was still running.
    pub missed_cycles: u64,
    /// Passes that ended in an error or timeout.
    pub failed_passes: u64,
    pub created_at: u64,
}

impl GuardedEntity {
    /// New entity in `Normal`, as created on first observation.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: EntityKind, now_ms: u64) -> Self {
        Self {
            id: id.into(),
            kind,
            tier: AlertTier::Normal,
            enabled: true,
            version: 0,
            tracking: TrackingState::default(),
            last_evaluated_at: None,
            last_alert_at: None,
            missed_cycles: 0,
            failed_passes: 0,
            created_at: now_ms,
        }
    }
}

/// Append-only audit record of a single evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Store-assigned row id (0 before insertion).
    pub id: i64,
    pub entity_id: String,
    pub evaluated_at: u64,
    /// Raw snapshot, `None` when the signal was unavailable.
    pub snapshot: Option<SignalSnapshot>,
    pub reported_tier: SignalTier,
    pub resulting_tier: AlertTier,
    pub rationale: String,
}

/// An alert emitted on a tier increase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub entity_id: String,
    pub tier: AlertTier,
    pub rationale: String,
    pub created_at: u64,
    pub status: DeliveryStatus,
    /// Delivery attempts made so far.
    pub attempts: u32,
    /// Earliest time the delivery worker may (re)try this alert.
    pub next_attempt_at: u64,
    pub updated_at: u64,
}

impl AlertEvent {
    /// New `Pending` alert with a fresh v4 id.
    #[must_use]
    pub fn pending(
        entity_id: impl Into<String>,
        tier: AlertTier,
        rationale: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: new_id(),
            entity_id: entity_id.into(),
            tier,
            rationale: rationale.into(),
            created_at: now_ms,
            status: DeliveryStatus::Pending,
            attempts: 0,
            next_attempt_at: now_ms,
            updated_at: now_ms,
        }
    }
}

/// Scheduler bookkeeping for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTask {
    pub entity_id: String,
    pub next_due_at: u64,
    /// Consecutive failed passes.
    pub retry_count: u32,
    pub backoff_until: Option<u64>,
    pub last_error: Option<String>,
}

impl ScheduleTask {
    /// Task that is due immediately.
    #[must_use]
    pub fn due_at(entity_id: impl Into<String>, next_due_at: u64) -> Self {
        Self {
            entity_id: entity_id.into(),
            next_due_at,
            retry_count: 0,
            backoff_until: None,
            last_error: None,
        }
    }
}

/// Opaque, versioned input to the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub schema_version: u32,
    pub captured_at: u64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Counters the scheduler bumps without a state-machine transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassCounter {
    Missed,
    Failed,
}

/// Generate a new unique id.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
