//! Alert tier state machine.
//!
//! ```text
//!            Warning (no cool-down)        Critical (always)
//!   Normal ───────────────────────▶ Warning ─────────────────▶ Critical
//!      ▲                               │ ▲                        │
//!      └──── N consecutive lower ──────┘ └── N consecutive lower ─┘
//!
//!   any ── acknowledge ──▶ Suppressed ── window ends ──▶ Normal (fresh)
//! ```
//!
//! - Escalation emits exactly one `Pending` alert.
//! - `Critical` bypasses and clears an active cool-down.
//! - De-escalation needs `N` consecutive lower readings and lands on the
//!   highest tier seen during that streak; it then starts an `N`-evaluation
//!   cool-down during which `Warning` escalations are held.
//! - `Unknown` readings change nothing but break a lower streak.
//! - While `Suppressed`, no alerts are produced. After the window the
//!   entity restarts from `Normal` and the current reading applies fresh.

use super::AlertPolicy;
use crate::evaluator::Evaluation;
use crate::types::{AlertEvent, AlertTier, GuardedEntity, TrackingState};

/// What a single evaluation did to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Tier increased and an alert was emitted.
    Escalated,
    /// Tier decreased after the cool-down streak completed.
    DeEscalated,
    /// A higher reading was held back by an active cool-down.
    HeldByCooldown,
    /// Entity is acknowledged; the reading was recorded only.
    Suppressed,
    /// No tier change.
    Unchanged,
}

/// Result of applying one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub previous_tier: AlertTier,
    /// Next entity state (version untouched; the store bumps it on commit).
    pub entity: GuardedEntity,
    pub alert: Option<AlertEvent>,
    pub kind: TransitionKind,
    /// Whether an expired suppression window was cleared by this evaluation.
    pub suppression_expired: bool,
}

/// Apply one evaluation to `entity` at `now_ms`.
#[must_use]
pub fn apply(
    entity: &GuardedEntity,
    evaluation: &Evaluation,
    policy: &AlertPolicy,
    now_ms: u64,
) -> Transition {
    let previous_tier = entity.tier;
    let mut next = entity.clone();
    next.tracking.reported_tier = Some(evaluation.reported);
    next.tracking.unknown_streak = evaluation.unknown_streak;
    next.last_evaluated_at = Some(now_ms);

    let mut suppression_expired = false;
    if next.tier == AlertTier::Suppressed {
        match next.tracking.suppressed_until {
            Some(until) if now_ms < until => {
                return Transition {
                    previous_tier,
                    entity: next,
                    alert: None,
                    kind: TransitionKind::Suppressed,
                    suppression_expired,
                };
            }
            _ => {
                next.tier = AlertTier::Normal;
                next.tracking = TrackingState {
                    reported_tier: next.tracking.reported_tier,
                    unknown_streak: next.tracking.unknown_streak,
                    ..TrackingState::default()
                };
                suppression_expired = true;
            }
        }
    }

    let n = policy.cooldown_evaluation_count.max(1);
    let current = next.tier;

    let kind = match evaluation.reported.alert_tier() {
        None => {
            reset_lower_streak(&mut next.tracking);
            tick_cooldown(&mut next.tracking);
            TransitionKind::Unchanged
        }
        Some(target) if target.rank() > current.rank() => {
            let bypass = target == AlertTier::Critical;
            if next.tracking.cooldown_remaining > 0 && !bypass {
                reset_lower_streak(&mut next.tracking);
                tick_cooldown(&mut next.tracking);
                TransitionKind::HeldByCooldown
            } else {
                next.tier = target;
                next.tracking.cooldown_remaining = 0;
                reset_lower_streak(&mut next.tracking);
                next.last_alert_at = Some(now_ms);
                TransitionKind::Escalated
            }
        }
        Some(target) if target.rank() == current.rank() => {
            reset_lower_streak(&mut next.tracking);
            tick_cooldown(&mut next.tracking);
            TransitionKind::Unchanged
        }
        Some(target) => {
            let t = &mut next.tracking;
            t.lower_peak = if t.lower_streak == 0 || target.rank() > t.lower_peak.rank() {
                target
            } else {
                t.lower_peak
            };
            t.lower_streak += 1;
            if t.lower_streak >= n {
                next.tier = t.lower_peak;
                reset_lower_streak(t);
                t.cooldown_remaining = n;
                TransitionKind::DeEscalated
            } else {
                tick_cooldown(t);
                TransitionKind::Unchanged
            }
        }
    };

    let alert = (kind == TransitionKind::Escalated).then(|| {
        AlertEvent::pending(
            next.id.clone(),
            next.tier,
            evaluation.rationale.clone(),
            now_ms,
        )
    });

    Transition {
        previous_tier,
        entity: next,
        alert,
        kind,
        suppression_expired,
    }
}

/// Suppress `entity` until `until_ms`.
#[must_use]
pub fn acknowledge(entity: &GuardedEntity, until_ms: u64) -> GuardedEntity {
    let mut next = entity.clone();
    next.tier = AlertTier::Suppressed;
    reset_lower_streak(&mut next.tracking);
    next.tracking.cooldown_remaining = 0;
    next.tracking.suppressed_until = Some(until_ms);
    next
}

fn reset_lower_streak(tracking: &mut TrackingState) {
    tracking.lower_streak = 0;
    tracking.lower_peak = AlertTier::Normal;
}

fn tick_cooldown(tracking: &mut TrackingState) {
    tracking.cooldown_remaining = tracking.cooldown_remaining.saturating_sub(1);
}
