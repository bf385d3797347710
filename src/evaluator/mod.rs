//! Condition evaluation.
//!
//! [`evaluate`] turns one signal reading plus the entity's prior unknown
//! streak into a reported [`SignalTier`] and a rationale. It is a pure
//! function of its inputs: `now_ms` is passed in, never read from a clock.
//!
//! Missing, stale, or unclassifiable readings report `Unknown`. After
//! `unknown_escalation_count` consecutive unknowns the reading is raised to
//! `Warning` so a silent sensor cannot look healthy forever.

pub mod rules;

pub use rules::{RiskLevel, RuleEvaluator, permission_risk};

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::signals::SignalFetch;
use crate::types::{SignalSnapshot, SignalTier};

/// One contributing finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reason {
    pub tier: SignalTier,
    pub detail: String,
}

impl Reason {
    pub fn new(tier: SignalTier, detail: impl Into<String>) -> Self {
        Self {
            tier,
            detail: detail.into(),
        }
    }
}

/// Classifier output for a single snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub tier: SignalTier,
    pub reasons: Vec<Reason>,
}

impl Verdict {
    /// Build a verdict whose tier is the most severe reason (highest wins).
    #[must_use]
    pub fn from_reasons(reasons: Vec<Reason>) -> Self {
        let tier = reasons
            .iter()
            .map(|r| r.tier)
            .max_by_key(|t| severity(*t))
            .unwrap_or(SignalTier::Normal);
        Self { tier, reasons }
    }

    /// Reasons ordered by severity, then text, joined into one line.
    #[must_use]
    pub fn rationale(&self) -> String {
        if self.reasons.is_empty() {
            return "no risk indicators".to_owned();
        }
        let mut reasons: Vec<&Reason> = self.reasons.iter().collect();
        reasons.sort_by(|a, b| {
            severity(b.tier)
                .cmp(&severity(a.tier))
                .then_with(|| a.detail.cmp(&b.detail))
        });
        reasons
            .iter()
            .map(|r| format!("{}: {}", r.tier, r.detail))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Classifies a snapshot. Implementations must be deterministic.
pub trait ConditionEvaluator: Send + Sync {
    /// # Errors
    ///
    /// Returns [`crate::GuardianError::Evaluation`] for snapshots the
    /// evaluator does not understand (e.g. an unsupported schema version).
    fn classify(&self, snapshot: &SignalSnapshot) -> Result<Verdict>;
}

/// Thresholds applied around the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationPolicy {
    pub stale_after_ms: u64,
    pub unknown_escalation_count: u32,
}

impl EvaluationPolicy {
    #[must_use]
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            stale_after_ms: config.stale_unknown_threshold_seconds.saturating_mul(1000),
            unknown_escalation_count: config.unknown_escalation_count,
        }
    }
}

/// Result of evaluating one reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub reported: SignalTier,
    pub rationale: String,
    /// Unknown streak to persist for the next pass.
    pub unknown_streak: u32,
}

/// Evaluate one reading.
///
/// # Errors
///
/// Propagates classifier errors; the caller treats them as a failed pass.
pub fn evaluate(
    evaluator: &dyn ConditionEvaluator,
    reading: &SignalFetch,
    prior_unknown_streak: u32,
    now_ms: u64,
    policy: &EvaluationPolicy,
) -> Result<Evaluation> {
    let unknown_reason = match reading {
        SignalFetch::Unavailable(reason) => format!("signal unavailable: {reason}"),
        SignalFetch::Snapshot(snapshot) => {
            let age_ms = now_ms.saturating_sub(snapshot.captured_at);
            if age_ms > policy.stale_after_ms {
                format!(
                    "snapshot stale: captured {}s ago, threshold {}s",
                    age_ms / 1000,
                    policy.stale_after_ms / 1000
                )
            } else {
                let verdict = evaluator.classify(snapshot)?;
                if verdict.tier != SignalTier::Unknown {
                    return Ok(Evaluation {
                        reported: verdict.tier,
                        rationale: verdict.rationale(),
                        unknown_streak: 0,
                    });
                }
                format!("inconclusive: {}", verdict.rationale())
            }
        }
    };

    let streak = prior_unknown_streak.saturating_add(1);
    if streak >= policy.unknown_escalation_count {
        return Ok(Evaluation {
            reported: SignalTier::Warning,
            rationale: format!("no usable signal for {streak} consecutive evaluations ({unknown_reason})"),
            unknown_streak: streak,
        });
    }
    Ok(Evaluation {
        reported: SignalTier::Unknown,
        rationale: unknown_reason,
        unknown_streak: streak,
    })
}

fn severity(tier: SignalTier) -> u8 {
    match tier {
        SignalTier::Unknown => 0,
        SignalTier::Normal => 1,
        SignalTier::Warning => 2,
        SignalTier::Critical => 3,
    }
}
