//! Runtime events emitted by the scheduler, monitor and delivery worker.
//!
//! Lightweight (ids and tiers only) so emitters never block on observers.
//! Senders are unbounded; a dropped receiver is ignored.

use tokio::sync::mpsc;

use crate::types::{AlertTier, SignalTier};

/// What the engine is doing "right now".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// A pass committed its evaluation.
    PassCompleted {
        entity_id: String,
        reported: SignalTier,
        tier: AlertTier,
    },
    /// A pass ended in an error or timeout and was rescheduled with backoff.
    PassFailed {
        entity_id: String,
        error: String,
        retry_count: u32,
    },
    /// A due cycle was skipped because the previous pass was still running.
    MissedCycle { entity_id: String },
    /// A tier increase produced an alert.
    AlertEmitted {
        alert_id: String,
        entity_id: String,
        tier: AlertTier,
    },
    /// A gateway attempt finished.
    DeliveryFinished { alert_id: String, delivered: bool },
}

/// Optional event sink.
pub type EventSender = mpsc::UnboundedSender<RuntimeEvent>;

/// Send `event` if a sink is attached.
pub(crate) fn emit(events: Option<&EventSender>, event: RuntimeEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}
