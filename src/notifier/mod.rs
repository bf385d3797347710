//! Notifier gateway boundary and the delivery worker.
//!
//! Every alert gets one delivery attempt and, if that fails, exactly one
//! redelivery after `redelivery_delay_seconds`. A second failure marks the
//! alert `Failed`; it stays queryable until retention archives it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::DeliveryConfig;
use crate::error::Result;
use crate::store::{DeliveryUpdate, MonitorStore, with_store};
use crate::types::{AlertEvent, DeliveryStatus};

/// First attempt plus one redelivery.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 2;

/// Gateway response for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    Failed(String),
}

/// Receives finalized alerts. Called at most once per attempt.
#[async_trait]
pub trait NotifierGateway: Send + Sync {
    async fn deliver(&self, alert: &AlertEvent) -> DeliveryResult;
}

/// Gateway that writes alerts to the log. Used by the host binary when no
/// platform notifier is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotifierGateway for LogNotifier {
    async fn deliver(&self, alert: &AlertEvent) -> DeliveryResult {
        info!(
            alert_id = %alert.id,
            entity = %alert.entity_id,
            tier = %alert.tier,
            "ALERT: {}",
            alert.rationale
        );
        DeliveryResult::Delivered
    }
}

/// Redelivery timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub redelivery_delay_ms: u64,
    pub timeout: Duration,
}

impl DeliveryPolicy {
    #[must_use]
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            redelivery_delay_ms: config.redelivery_delay_seconds.saturating_mul(1000),
            timeout: Duration::from_secs(config.delivery_timeout_seconds),
        }
    }
}

/// What one `deliver` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// First attempt failed; redelivery scheduled at the given time.
    RetryScheduled { at: u64 },
    /// Final attempt failed.
    Failed(String),
    /// Already settled, not yet due, or being delivered by another caller.
    Skipped,
}

/// Drives alerts through the gateway and records the result.
pub struct DeliveryWorker {
    store: Arc<dyn MonitorStore>,
    gateway: Arc<dyn NotifierGateway>,
    clock: Arc<dyn Clock>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl DeliveryWorker {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        gateway: Arc<dyn NotifierGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Attempt delivery of one alert.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the alert state cannot be read or written.
    pub async fn deliver(&self, alert_id: &str, policy: &DeliveryPolicy) -> Result<DeliveryOutcome> {
        let Some(_claim) = InFlightClaim::take(&self.in_flight, alert_id) else {
            debug!(alert_id, "delivery already in flight");
            return Ok(DeliveryOutcome::Skipped);
        };

        let id = alert_id.to_owned();
        let Some(alert) = with_store(&self.store, move |s| s.get_alert(&id)).await? else {
            return Ok(DeliveryOutcome::Skipped);
        };
        let now = self.clock.now_millis();
        if alert.status != DeliveryStatus::Pending || alert.next_attempt_at > now {
            return Ok(DeliveryOutcome::Skipped);
        }

        let result = match tokio::time::timeout(policy.timeout, self.gateway.deliver(&alert)).await
        {
            Ok(result) => result,
            Err(_) => DeliveryResult::Failed(format!(
                "notifier timed out after {}ms",
                policy.timeout.as_millis()
            )),
        };

        let attempts = alert.attempts.saturating_add(1);
        let now = self.clock.now_millis();
        let (update, outcome) = match result {
            DeliveryResult::Delivered => {
                info!(alert_id = %alert.id, entity = %alert.entity_id, attempts, "alert delivered");
                (
                    DeliveryUpdate {
                        alert_id: alert.id.clone(),
                        status: DeliveryStatus::Delivered,
                        attempts,
                        next_attempt_at: alert.next_attempt_at,
                        updated_at: now,
                    },
                    DeliveryOutcome::Delivered,
                )
            }
            DeliveryResult::Failed(reason) if attempts < MAX_DELIVERY_ATTEMPTS => {
                let at = now.saturating_add(policy.redelivery_delay_ms);
                warn!(alert_id = %alert.id, entity = %alert.entity_id, retry_at = at, "delivery failed: {reason}");
                (
                    DeliveryUpdate {
                        alert_id: alert.id.clone(),
                        status: DeliveryStatus::Pending,
                        attempts,
                        next_attempt_at: at,
                        updated_at: now,
                    },
                    DeliveryOutcome::RetryScheduled { at },
                )
            }
            DeliveryResult::Failed(reason) => {
                warn!(alert_id = %alert.id, entity = %alert.entity_id, attempts, "redelivery failed, giving up: {reason}");
                (
                    DeliveryUpdate {
                        alert_id: alert.id.clone(),
                        status: DeliveryStatus::Failed,
                        attempts,
                        next_attempt_at: alert.next_attempt_at,
                        updated_at: now,
                    },
                    DeliveryOutcome::Failed(reason),
                )
            }
        };

        with_store(&self.store, move |s| s.mark_delivered(&update)).await?;
        Ok(outcome)
    }

    /// Deliver every pending alert that is due, including alerts committed
    /// before a restart. Returns how many were attempted.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the pending queue cannot be read.
    pub async fn redeliver_due(&self, policy: &DeliveryPolicy) -> Result<usize> {
        let now = self.clock.now_millis();
        let due = with_store(&self.store, move |s| s.pending_alerts_due(now)).await?;
        let mut attempted = 0;
        for alert in due {
            match self.deliver(&alert.id, policy).await {
                Ok(DeliveryOutcome::Skipped) => {}
                Ok(_) => attempted += 1,
                Err(e) => warn!(alert_id = %alert.id, "delivery bookkeeping failed: {e}"),
            }
        }
        Ok(attempted)
    }
}

/// Removes the alert id from the in-flight set on drop.
struct InFlightClaim {
    set: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl InFlightClaim {
    fn take(set: &Arc<Mutex<HashSet<String>>>, id: &str) -> Option<Self> {
        let mut guard = set.lock().ok()?;
        guard.insert(id.to_owned()).then(|| Self {
            set: Arc::clone(set),
            id: id.to_owned(),
        })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.set.lock() {
            guard.remove(&self.id);
        }
    }
}
