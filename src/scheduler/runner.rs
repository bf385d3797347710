//! Scheduler background loop.
//!
//! Each tick lists due tasks from the store and dispatches at most one pass
//! per entity onto a bounded worker pool. A due entity whose previous pass
//! is still running is a missed cycle: it is logged, counted and
//! rescheduled one interval out, never queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::RetryPolicy;
use super::lease::{LeaseGuard, LeaseTable};
use crate::clock::{Clock, SystemClock};
use crate::config::SharedConfig;
use crate::error::{GuardianError, Result};
use crate::runtime::{EventSender, RuntimeEvent, emit};
use crate::store::{MonitorStore, with_store};
use crate::types::{AlertTier, PassCounter, ScheduleTask};

/// Extra lease lifetime beyond the pass and delivery timeouts.
const LEASE_GRACE_MS: u64 = 5_000;

/// What a finished pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Evaluation committed.
    Committed {
        tier: AlertTier,
        alert_id: Option<String>,
    },
    /// Result thrown away (entity disabled while the pass ran).
    Discarded(String),
}

/// Executes one evaluation pass for an entity.
#[async_trait]
pub trait PassRunner: Send + Sync {
    /// The timed part of a pass. Must leave its result durable on `Ok`.
    async fn run_pass(&self, entity_id: &str) -> Result<PassOutcome>;

    /// Follow-up work for a committed pass, run outside the pass timeout
    /// while the entity lease is still held. Cannot fail the pass.
    async fn after_commit(&self, _outcome: &PassOutcome) {}
}

/// Per-tick dispatch summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    pub missed: usize,
    /// Due but no worker free; picked up by a later tick.
    pub deferred: usize,
}

/// Cumulative counters since start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub missed: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    missed: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            missed: self.missed.load(Ordering::Relaxed),
        }
    }
}

/// Background scheduler driving evaluation passes.
pub struct Scheduler {
    store: Arc<dyn MonitorStore>,
    runner: Arc<dyn PassRunner>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
    leases: LeaseTable,
    permits: Arc<Semaphore>,
    passes: Mutex<JoinSet<()>>,
    stats: Arc<StatCounters>,
    events: Option<EventSender>,
}

impl Scheduler {
    /// Create a scheduler. The worker pool is sized from `monitor.worker_count`
    /// at construction.
    pub fn new(
        store: Arc<dyn MonitorStore>,
        runner: Arc<dyn PassRunner>,
        config: SharedConfig,
    ) -> Self {
        let workers = config.snapshot().monitor.worker_count.max(1);
        Self {
            store,
            runner,
            config,
            clock: Arc::new(SystemClock),
            leases: LeaseTable::new(),
            permits: Arc::new(Semaphore::new(workers)),
            passes: Mutex::new(JoinSet::new()),
            stats: Arc::new(StatCounters::default()),
            events: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Cumulative counters.
    pub fn stats(&self) -> SchedulerStats {
        self.stats.snapshot()
    }

    /// Leases currently held, i.e. passes in flight.
    pub fn in_flight(&self) -> usize {
        self.leases.len()
    }

    /// Start the scheduler loop. Stops dispatching when `cancel` fires and
    /// waits for in-flight passes before returning.
    pub fn run(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let tick_ms = self.config.snapshot().monitor.tick_interval_millis.max(1);
            let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(tick_ms, "scheduler started");

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.tick().await {
                            warn!("scheduler tick failed: {e}");
                        }
                    }
                }
            }

            self.drain().await;
            info!("scheduler stopped");
        })
    }

    /// Run one scheduler tick: dispatch due passes.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the task table cannot be read or updated.
    pub async fn tick(&self) -> Result<TickReport> {
        self.reap_finished().await;

        let config = self.config.snapshot();
        let interval_ms = config.monitor.evaluation_interval_seconds.saturating_mul(1000);
        let timeout = Duration::from_secs(config.monitor.pass_timeout_seconds);
        let lease_ttl_ms = config
            .monitor
            .pass_timeout_seconds
            .saturating_add(config.delivery.delivery_timeout_seconds)
            .saturating_mul(1000)
            .saturating_add(LEASE_GRACE_MS);
        let retry = RetryPolicy::from_config(&config.monitor);

        let now = self.clock.now_millis();
        let due = with_store(&self.store, move |s| s.list_due_tasks(now)).await?;
        let mut report = TickReport::default();

        for task in due {
            let Some(lease) = self.leases.try_acquire(&task.entity_id, now, lease_ttl_ms) else {
                self.record_missed(&task.entity_id, now, interval_ms).await;
                report.missed += 1;
                continue;
            };
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                debug!(entity = %task.entity_id, "no free worker, deferring pass");
                report.deferred += 1;
                continue;
            };

            let mut advanced = task;
            advanced.next_due_at = now.saturating_add(interval_ms);
            let update = advanced.clone();
            if !with_store(&self.store, move |s| s.update_task(&update)).await? {
                debug!(entity = %advanced.entity_id, "task removed before dispatch");
                continue;
            }

            self.spawn_pass(advanced, lease, permit, timeout, retry).await;
            report.dispatched += 1;
        }

        if report.dispatched + report.missed > 0 {
            debug!(
                dispatched = report.dispatched,
                missed = report.missed,
                deferred = report.deferred,
                "scheduler tick"
            );
        }
        Ok(report)
    }

    /// Wait for every in-flight pass to finish.
    pub async fn drain(&self) {
        let mut passes = self.passes.lock().await;
        while let Some(joined) = passes.join_next().await {
            if let Err(e) = joined {
                error!("pass task aborted: {e}");
            }
        }
    }

    async fn reap_finished(&self) {
        let mut passes = self.passes.lock().await;
        while let Some(joined) = passes.try_join_next() {
            if let Err(e) = joined {
                error!("pass task aborted: {e}");
            }
        }
    }

    async fn record_missed(&self, entity_id: &str, now: u64, interval_ms: u64) {
        warn!(entity = entity_id, "previous pass still running, skipping cycle");
        self.stats.missed.fetch_add(1, Ordering::Relaxed);
        emit(
            self.events.as_ref(),
            RuntimeEvent::MissedCycle {
                entity_id: entity_id.to_owned(),
            },
        );

        let id = entity_id.to_owned();
        let result = with_store(&self.store, move |s| {
            if let Some(mut task) = s.get_task(&id)? {
                task.next_due_at = now.saturating_add(interval_ms);
                s.update_task(&task)?;
            }
            s.bump_counter(&id, PassCounter::Missed)
        })
        .await;
        if let Err(e) = result {
            warn!(entity = entity_id, "cannot record missed cycle: {e}");
        }
    }

    async fn spawn_pass(
        &self,
        task: ScheduleTask,
        lease: LeaseGuard,
        permit: OwnedSemaphorePermit,
        timeout: Duration,
        retry: RetryPolicy,
    ) {
        let runner = Arc::clone(&self.runner);
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let stats = Arc::clone(&self.stats);
        let events = self.events.clone();
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);

        self.passes.lock().await.spawn(async move {
            let _permit = permit;
            let _lease = lease;
            let entity_id = task.entity_id.clone();
            debug!(entity = %entity_id, "pass started");

            let result = match tokio::time::timeout(timeout, runner.run_pass(&entity_id)).await {
                Ok(result) => result,
                Err(_) => {
                    stats.timed_out.fetch_add(1, Ordering::Relaxed);
                    Err(GuardianError::Scheduler(format!(
                        "pass timed out after {}s",
                        timeout.as_secs()
                    )))
                }
            };

            let committed = match &result {
                Ok(outcome @ PassOutcome::Committed { .. }) => Some(outcome.clone()),
                _ => None,
            };
            let now = clock.now_millis();
            settle(&store, &entity_id, result, now, retry, &stats, events.as_ref()).await;

            if let Some(outcome) = committed {
                runner.after_commit(&outcome).await;
            }
        });
    }
}

/// Record a finished pass on its task.
async fn settle(
    store: &Arc<dyn MonitorStore>,
    entity_id: &str,
    result: Result<PassOutcome>,
    now: u64,
    retry: RetryPolicy,
    stats: &StatCounters,
    events: Option<&EventSender>,
) {
    let id = entity_id.to_owned();
    let bookkeeping = match result {
        Ok(outcome) => {
            stats.completed.fetch_add(1, Ordering::Relaxed);
            if let PassOutcome::Discarded(reason) = &outcome {
                info!(entity = entity_id, "pass result discarded: {reason}");
            }
            with_store(store, move |s| {
                if let Some(task) = s.get_task(&id)?
                    && (task.retry_count > 0 || task.last_error.is_some())
                {
                    s.update_task(&retry.after_success(&task))?;
                }
                Ok(())
            })
            .await
        }
        Err(GuardianError::NotFound(missing)) => {
            warn!(entity = entity_id, "entity {missing} no longer exists, dropping task");
            with_store(store, move |s| s.remove_task(&id).map(|_| ())).await
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            let message = e.to_string();
            let msg = message.clone();
            let next = with_store(store, move |s| {
                let Some(task) = s.get_task(&id)? else {
                    return Ok(None);
                };
                let next = retry.after_failure(&task, now, &msg);
                s.update_task(&next)?;
                s.bump_counter(&id, PassCounter::Failed)?;
                Ok(Some(next))
            })
            .await;
            match next {
                Ok(Some(task)) => {
                    warn!(
                        entity = entity_id,
                        retry_count = task.retry_count,
                        next_due_at = task.next_due_at,
                        "pass failed: {message}"
                    );
                    emit(
                        events,
                        RuntimeEvent::PassFailed {
                            entity_id: entity_id.to_owned(),
                            error: message,
                            retry_count: task.retry_count,
                        },
                    );
                    Ok(())
                }
                Ok(None) => {
                    warn!(entity = entity_id, "pass failed after task removal: {message}");
                    Ok(())
                }
                Err(store_err) => Err(store_err),
            }
        }
    };

    if let Err(e) = bookkeeping {
        error!(entity = entity_id, "cannot update schedule after pass: {e}");
    }
}
