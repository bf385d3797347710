//! The monitor: one evaluation pass per call, plus the query API.
//!
//! A pass is load → fetch → evaluate → transition → commit. The commit is a
//! single store transaction guarded by the entity version, so a pass that
//! raced a disable, an acknowledgement or a zombie pass writes nothing.
//! Delivery of a raised alert follows the commit and never fails the pass.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::alerts::{self, AlertPolicy, TransitionKind};
use crate::clock::{Clock, SystemClock};
use crate::config::{GuardianConfig, SharedConfig};
use crate::error::{GuardianError, Result};
use crate::evaluator::{ConditionEvaluator, EvaluationPolicy, RuleEvaluator, evaluate};
use crate::notifier::{DeliveryOutcome, DeliveryPolicy, DeliveryWorker, NotifierGateway};
use crate::runtime::{EventSender, RuntimeEvent, emit};
use crate::scheduler::{PassOutcome, PassRunner};
use crate::signals::{SignalFetch, SignalSource};
use crate::store::{CommitOutcome, CycleCommit, MonitorStore, PruneReport, with_store};
use crate::types::{
    AlertEvent, EntityKind, EvaluationRecord, GuardedEntity, ScheduleTask,
};

/// Attempts before `acknowledge` gives up on a contended entity.
const ACK_MAX_ATTEMPTS: usize = 5;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Evaluation engine and query surface.
pub struct Monitor {
    store: Arc<dyn MonitorStore>,
    signals: Arc<dyn SignalSource>,
    gateway: Arc<dyn NotifierGateway>,
    evaluator: Arc<dyn ConditionEvaluator>,
    delivery: Arc<DeliveryWorker>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
    events: Option<EventSender>,
}

impl Monitor {
    /// Build a monitor using the built-in [`RuleEvaluator`] and the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`GuardianError::ConfigInvalid`] if `config` fails validation.
    pub fn new(
        store: Arc<dyn MonitorStore>,
        signals: Arc<dyn SignalSource>,
        gateway: Arc<dyn NotifierGateway>,
        config: GuardianConfig,
    ) -> Result<Self> {
        let config = SharedConfig::new(config)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let delivery = Arc::new(DeliveryWorker::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&clock),
        ));
        Ok(Self {
            store,
            signals,
            gateway,
            evaluator: Arc::new(RuleEvaluator),
            delivery,
            config,
            clock,
            events: None,
        })
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.delivery = Arc::new(DeliveryWorker::new(
            Arc::clone(&self.store),
            Arc::clone(&self.gateway),
            Arc::clone(&clock),
        ));
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &Arc<dyn MonitorStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn events(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }

    /// Live configuration handle shared with the scheduler.
    pub fn shared_config(&self) -> SharedConfig {
        self.config.clone()
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<GuardianConfig> {
        self.config.snapshot()
    }

    /// Validate and apply a new configuration from the next pass on.
    ///
    /// # Errors
    ///
    /// Returns [`GuardianError::ConfigInvalid`] and keeps the old config on failure.
    pub fn update_config(&self, config: GuardianConfig) -> Result<()> {
        self.config.replace(config)?;
        info!("configuration updated");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Passes
    // -----------------------------------------------------------------------

    /// Run one evaluation pass for `entity_id` and deliver any alert it
    /// raised.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the entity does not exist
    /// - `StorageUnavailable` if the store fails
    /// - `Evaluation` if the snapshot cannot be classified
    /// - `Conflict` if the entity changed while the pass ran
    pub async fn evaluate_entity(&self, entity_id: &str) -> Result<PassOutcome> {
        let outcome = self.commit_pass(entity_id).await?;
        self.deliver_raised(&outcome).await;
        Ok(outcome)
    }

    /// Fetch, evaluate and commit one pass without delivering its alert.
    /// A raised alert is durable and `Pending` once this returns.
    ///
    /// # Errors
    ///
    /// Same as [`Monitor::evaluate_entity`].
    pub async fn commit_pass(&self, entity_id: &str) -> Result<PassOutcome> {
        let config = self.config.snapshot();

        let id = entity_id.to_owned();
        let entity = with_store(&self.store, move |s| s.get_entity(&id))
            .await?
            .ok_or_else(|| GuardianError::NotFound(entity_id.to_owned()))?;
        if !entity.enabled {
            return Ok(PassOutcome::Discarded("monitoring disabled".to_owned()));
        }

        let fetch_timeout = Duration::from_secs(config.monitor.signal_fetch_timeout_seconds);
        let reading =
            match tokio::time::timeout(fetch_timeout, self.signals.fetch_snapshot(entity_id)).await
            {
                Ok(reading) => reading,
                Err(_) => SignalFetch::Unavailable(format!(
                    "signal fetch timed out after {}s",
                    fetch_timeout.as_secs()
                )),
            };
        if let SignalFetch::Unavailable(reason) = &reading {
            debug!(entity = entity_id, "signal unavailable: {reason}");
        }

        // Record timestamps per entity must strictly increase, even if the
        // wall clock steps backwards.
        let now = self
            .clock
            .now_millis()
            .max(entity.last_evaluated_at.map_or(0, |t| t.saturating_add(1)));

        let evaluation = evaluate(
            self.evaluator.as_ref(),
            &reading,
            entity.tracking.unknown_streak,
            now,
            &EvaluationPolicy::from_config(&config.monitor),
        )?;
        let transition = alerts::apply(
            &entity,
            &evaluation,
            &AlertPolicy::from_config(&config.monitor),
            now,
        );

        let record = EvaluationRecord {
            id: 0,
            entity_id: entity.id.clone(),
            evaluated_at: now,
            snapshot: match reading {
                SignalFetch::Snapshot(snapshot) => Some(snapshot),
                SignalFetch::Unavailable(_) => None,
            },
            reported_tier: evaluation.reported,
            resulting_tier: transition.entity.tier,
            rationale: evaluation.rationale.clone(),
        };
        let commit = CycleCommit {
            entity: transition.entity.clone(),
            expected_version: entity.version,
            record,
            alert: transition.alert.clone(),
        };

        match with_store(&self.store, move |s| s.commit_cycle(&commit)).await? {
            CommitOutcome::Committed { .. } => {}
            CommitOutcome::EntityDisabled => {
                info!(entity = entity_id, "monitoring disabled during pass, result discarded");
                return Ok(PassOutcome::Discarded(
                    "monitoring disabled during pass".to_owned(),
                ));
            }
            CommitOutcome::VersionConflict => {
                return Err(GuardianError::Conflict(format!(
                    "entity '{entity_id}' changed during pass (expected version {})",
                    entity.version
                )));
            }
        }

        let tier = transition.entity.tier;
        match transition.kind {
            TransitionKind::Escalated => warn!(
                entity = entity_id,
                from = %transition.previous_tier,
                to = %tier,
                "tier escalated: {}",
                evaluation.rationale
            ),
            TransitionKind::DeEscalated => info!(
                entity = entity_id,
                from = %transition.previous_tier,
                to = %tier,
                "tier de-escalated"
            ),
            TransitionKind::HeldByCooldown => info!(
                entity = entity_id,
                reported = %evaluation.reported,
                "escalation held by cool-down"
            ),
            TransitionKind::Suppressed | TransitionKind::Unchanged => debug!(
                entity = entity_id,
                reported = %evaluation.reported,
                tier = %tier,
                "evaluation recorded"
            ),
        }
        if transition.suppression_expired {
            info!(entity = entity_id, "suppression window ended");
        }

        emit(
            self.events.as_ref(),
            RuntimeEvent::PassCompleted {
                entity_id: entity_id.to_owned(),
                reported: evaluation.reported,
                tier,
            },
        );

        let alert_id = transition.alert.map(|alert| {
            emit(
                self.events.as_ref(),
                RuntimeEvent::AlertEmitted {
                    alert_id: alert.id.clone(),
                    entity_id: alert.entity_id.clone(),
                    tier: alert.tier,
                },
            );
            alert.id
        });

        Ok(PassOutcome::Committed { tier, alert_id })
    }

    /// First delivery attempt for the alert a committed pass raised, if any.
    /// Bounded by `delivery.delivery_timeout_seconds`, not the pass timeout.
    pub async fn deliver_raised(&self, outcome: &PassOutcome) {
        let PassOutcome::Committed {
            alert_id: Some(alert_id),
            ..
        } = outcome
        else {
            return;
        };
        let policy = DeliveryPolicy::from_config(&self.config.snapshot().delivery);
        // The alert is already durable; a bookkeeping failure here is
        // retried by the delivery sweep.
        match self.delivery.deliver(alert_id, &policy).await {
            Ok(DeliveryOutcome::Skipped) => {}
            Ok(delivered) => emit(
                self.events.as_ref(),
                RuntimeEvent::DeliveryFinished {
                    alert_id: alert_id.clone(),
                    delivered: delivered == DeliveryOutcome::Delivered,
                },
            ),
            Err(e) => warn!(alert_id = %alert_id, "alert delivery deferred: {e}"),
        }
    }

    /// Deliver pending alerts that are due (redeliveries and alerts left
    /// pending by a restart).
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the pending queue cannot be read.
    pub async fn redeliver_due(&self) -> Result<usize> {
        let policy = DeliveryPolicy::from_config(&self.config.snapshot().delivery);
        self.delivery.redeliver_due(&policy).await
    }

    /// Archive settled alerts and prune evaluation history past retention.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store fails.
    pub async fn prune_expired(&self) -> Result<PruneReport> {
        let retention = self.config.snapshot().retention.clone();
        let now = self.clock.now_millis();
        let cutoff = |days: u32| {
            (days > 0).then(|| now.saturating_sub(u64::from(days).saturating_mul(DAY_MS)))
        };
        let alert_cutoff = cutoff(retention.alert_retention_days);
        let evaluation_cutoff = cutoff(retention.evaluation_retention_days);
        let report =
            with_store(&self.store, move |s| s.prune(alert_cutoff, evaluation_cutoff, now))
                .await?;
        if report.alerts_archived + report.evaluations_deleted > 0 {
            info!(
                alerts_archived = report.alerts_archived,
                evaluations_deleted = report.evaluations_deleted,
                "retention pruning complete"
            );
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Query API
    // -----------------------------------------------------------------------

    /// All entities with their current tier.
    pub async fn list_entities(&self) -> Result<Vec<GuardedEntity>> {
        with_store(&self.store, |s| s.list_entities()).await
    }

    pub async fn entity(&self, entity_id: &str) -> Result<GuardedEntity> {
        let id = entity_id.to_owned();
        with_store(&self.store, move |s| s.get_entity(&id))
            .await?
            .ok_or_else(|| GuardianError::NotFound(entity_id.to_owned()))
    }

    /// Newest-first evaluation history.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown entities.
    pub async fn history(&self, entity_id: &str, limit: usize) -> Result<Vec<EvaluationRecord>> {
        let id = entity_id.to_owned();
        with_store(&self.store, move |s| {
            if s.get_entity(&id)?.is_none() {
                return Err(GuardianError::NotFound(id));
            }
            s.history(&id, limit)
        })
        .await
    }

    /// Newest-first alerts, including `Failed` ones not yet archived.
    pub async fn alerts(&self, entity_id: Option<&str>, limit: usize) -> Result<Vec<AlertEvent>> {
        let id = entity_id.map(str::to_owned);
        with_store(&self.store, move |s| s.alerts(id.as_deref(), limit)).await
    }

    /// Suppress alerts for `entity_id` for `duration_secs`.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for a zero duration
    /// - `NotFound` for unknown entities
    /// - `Conflict` if the entity keeps changing underneath
    pub async fn acknowledge(&self, entity_id: &str, duration_secs: u64) -> Result<GuardedEntity> {
        if duration_secs == 0 {
            return Err(GuardianError::InvalidRequest(
                "acknowledge duration must be > 0".to_owned(),
            ));
        }

        for _ in 0..ACK_MAX_ATTEMPTS {
            let current = self.entity(entity_id).await?;
            let until = self
                .clock
                .now_millis()
                .saturating_add(duration_secs.saturating_mul(1000));
            let mut next = alerts::acknowledge(&current, until);
            let expected = current.version;
            let write = next.clone();
            if with_store(&self.store, move |s| s.compare_and_swap_entity(&write, expected)).await? {
                next.version = expected.saturating_add(1);
                info!(entity = entity_id, until, "alerts acknowledged");
                return Ok(next);
            }
            debug!(entity = entity_id, "acknowledge raced a pass, retrying");
        }
        Err(GuardianError::Conflict(format!(
            "entity '{entity_id}' kept changing during acknowledge"
        )))
    }

    /// Acknowledge for the configured `suppression_window_seconds`.
    pub async fn acknowledge_default(&self, entity_id: &str) -> Result<GuardedEntity> {
        let window = self.config.snapshot().monitor.suppression_window_seconds;
        self.acknowledge(entity_id, window).await
    }

    /// Register an entity in `Normal` with a task due now. Existing entities
    /// are returned unchanged.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for an empty id.
    pub async fn register_entity(&self, entity_id: &str, kind: EntityKind) -> Result<GuardedEntity> {
        if entity_id.trim().is_empty() {
            return Err(GuardianError::InvalidRequest(
                "entity id must not be empty".to_owned(),
            ));
        }
        let now = self.clock.now_millis();
        let entity = GuardedEntity::new(entity_id, kind, now);
        let registered = with_store(&self.store, move |s| {
            if let Some(existing) = s.get_entity(&entity.id)? {
                return Ok((existing, false));
            }
            s.upsert_entity(&entity)?;
            s.upsert_task(&ScheduleTask::due_at(entity.id.clone(), now))?;
            Ok((entity, true))
        })
        .await?;
        if registered.1 {
            info!(entity = entity_id, kind = %kind, "entity registered");
        }
        Ok(registered.0)
    }

    /// Register `entity_id` if needed and bring its monitoring flag to
    /// `enabled`. An entity already in that state is left untouched, so its
    /// persisted schedule and backoff survive a restart.
    pub async fn ensure_entity(
        &self,
        entity_id: &str,
        kind: EntityKind,
        enabled: bool,
    ) -> Result<GuardedEntity> {
        let entity = self.register_entity(entity_id, kind).await?;
        if entity.enabled == enabled {
            return Ok(entity);
        }
        if enabled {
            self.enable_entity(entity_id).await?;
        } else {
            self.disable_entity(entity_id).await?;
        }
        self.entity(entity_id).await
    }

    /// Stop monitoring. The entity and its history are kept; an in-flight
    /// pass completes but its result is discarded.
    pub async fn disable_entity(&self, entity_id: &str) -> Result<()> {
        let id = entity_id.to_owned();
        with_store(&self.store, move |s| s.set_monitoring(&id, false, None)).await?;
        info!(entity = entity_id, "monitoring disabled");
        Ok(())
    }

    /// Resume monitoring with a pass due now.
    pub async fn enable_entity(&self, entity_id: &str) -> Result<()> {
        let task = ScheduleTask::due_at(entity_id, self.clock.now_millis());
        let id = entity_id.to_owned();
        with_store(&self.store, move |s| s.set_monitoring(&id, true, Some(&task))).await?;
        info!(entity = entity_id, "monitoring enabled");
        Ok(())
    }
}

#[async_trait]
impl PassRunner for Monitor {
    async fn run_pass(&self, entity_id: &str) -> Result<PassOutcome> {
        self.commit_pass(entity_id).await
    }

    async fn after_commit(&self, outcome: &PassOutcome) {
        self.deliver_raised(outcome).await;
    }
}
