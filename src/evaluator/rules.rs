//! Built-in rule evaluator for schema-version-1 snapshots.
//!
//! Payload (every field optional):
//!
//! ```json
//! {
//!   "permissions_added": ["android.permission.READ_SMS"],
//!   "permissions": ["android.permission.CAMERA"],
//!   "sensor_events": [{ "sensor": "camera", "background": true }],
//!   "last_used_at": 1700000000000,
//!   "breaches": [{ "code": "root_detected", "severity": "critical" }]
//! }
//! ```
//!
//! Recognised sensors are `camera`, `microphone`, `location` and
//! `clipboard`; events for any other sensor are ignored. `last_used_at = 0`
//! means the app was never used.

use serde::Deserialize;

use super::{ConditionEvaluator, Reason, Verdict};
use crate::error::{GuardianError, Result};
use crate::types::{SignalSnapshot, SignalTier};

/// Snapshot schema version this evaluator understands.
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// Apps holding risky permissions are flagged once idle for longer than
/// this many days.
pub const UNUSED_APP_THRESHOLD_DAYS: u64 = 30;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

const HIGH_RISK: &[&str] = &[
    "READ_CONTACTS",
    "WRITE_CONTACTS",
    "READ_SMS",
    "SEND_SMS",
    "RECEIVE_SMS",
    "CAMERA",
    "RECORD_AUDIO",
    "READ_CALENDAR",
    "WRITE_CALENDAR",
    "BIND_ACCESSIBILITY_SERVICE",
    "READ_CALL_LOG",
    "PROCESS_OUTGOING_CALLS",
    "REQUEST_INSTALL_PACKAGES",
];

const MEDIUM_RISK: &[&str] = &[
    "ACCESS_FINE_LOCATION",
    "ACCESS_COARSE_LOCATION",
    "READ_EXTERNAL_STORAGE",
    "WRITE_EXTERNAL_STORAGE",
    "GET_ACCOUNTS",
    "READ_PHONE_STATE",
];

const LOW_RISK: &[&str] = &[
    "INTERNET",
    "ACCESS_NETWORK_STATE",
    "BLUETOOTH",
    "VIBRATE",
    "WAKE_LOCK",
];

/// Privacy risk of a single permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
}

/// Classify a permission name, with or without the `android.permission.` prefix.
#[must_use]
pub fn permission_risk(permission: &str) -> RiskLevel {
    let trimmed = permission.trim();
    let short = trimmed
        .rsplit_once('.')
        .map(|(_, name)| name)
        .unwrap_or(trimmed)
        .to_ascii_uppercase();
    if HIGH_RISK.contains(&short.as_str()) {
        RiskLevel::High
    } else if MEDIUM_RISK.contains(&short.as_str()) {
        RiskLevel::Medium
    } else if LOW_RISK.contains(&short.as_str()) {
        RiskLevel::Low
    } else {
        RiskLevel::None
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RulePayload {
    permissions_added: Vec<String>,
    permissions: Vec<String>,
    sensor_events: Vec<SensorEvent>,
    last_used_at: Option<u64>,
    breaches: Vec<Breach>,
}

#[derive(Debug, Deserialize)]
struct SensorEvent {
    sensor: String,
    #[serde(default)]
    background: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BreachSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Deserialize)]
struct Breach {
    code: String,
    severity: BreachSeverity,
}

/// Permission, sensor-access, idle-app and explicit-breach rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator;

impl ConditionEvaluator for RuleEvaluator {
    fn classify(&self, snapshot: &SignalSnapshot) -> Result<Verdict> {
        if snapshot.schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(GuardianError::Evaluation(format!(
                "unsupported snapshot schema version {} (expected {})",
                snapshot.schema_version, SUPPORTED_SCHEMA_VERSION
            )));
        }
        let payload: RulePayload = if snapshot.payload.is_null() {
            RulePayload::default()
        } else {
            serde_json::from_value(snapshot.payload.clone())
                .map_err(|e| GuardianError::Evaluation(format!("malformed payload: {e}")))?
        };

        let mut reasons = Vec::new();

        for permission in &payload.permissions_added {
            match permission_risk(permission) {
                RiskLevel::High => reasons.push(Reason::new(
                    SignalTier::Critical,
                    format!("high-risk permission granted: {permission}"),
                )),
                RiskLevel::Medium => reasons.push(Reason::new(
                    SignalTier::Warning,
                    format!("medium-risk permission granted: {permission}"),
                )),
                RiskLevel::Low | RiskLevel::None => {}
            }
        }

        for event in payload.sensor_events.iter().filter(|e| e.background) {
            let sensor = event.sensor.to_ascii_lowercase();
            let tier = match sensor.as_str() {
                "camera" | "microphone" => SignalTier::Critical,
                "location" | "clipboard" => SignalTier::Warning,
                _ => continue,
            };
            reasons.push(Reason::new(tier, format!("background {sensor} access")));
        }

        // No `last_used_at` means the collector has no usage data; 0 means
        // never used.
        if let Some(last_used_at) = payload.last_used_at {
            let idle_ms = snapshot.captured_at.saturating_sub(last_used_at);
            let holds_risky = payload
                .permissions
                .iter()
                .chain(payload.permissions_added.iter())
                .any(|p| permission_risk(p) >= RiskLevel::Medium);
            if idle_ms > UNUSED_APP_THRESHOLD_DAYS * DAY_MS && holds_risky {
                let rationale = if last_used_at == 0 {
                    "never used while holding risky permissions".to_owned()
                } else {
                    format!(
                        "unused for over {UNUSED_APP_THRESHOLD_DAYS} days ({} days) while holding risky permissions",
                        idle_ms / DAY_MS
                    )
                };
                reasons.push(Reason::new(SignalTier::Warning, rationale));
            }
        }

        for breach in &payload.breaches {
            let tier = match breach.severity {
                BreachSeverity::Warning => SignalTier::Warning,
                BreachSeverity::Critical => SignalTier::Critical,
            };
            reasons.push(Reason::new(tier, format!("breach {}", breach.code)));
        }

        Ok(Verdict::from_reasons(reasons))
    }
}
