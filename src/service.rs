//! Background service: scheduler loop, delivery sweep and retention job
//! under one cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Monitor;
use crate::scheduler::{PassRunner, Scheduler};

/// Running background loops.
pub struct MonitorService {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl MonitorService {
    /// Spawn the scheduler, the delivery sweep and the retention loop.
    ///
    /// Loop intervals are read once here; pass-level settings follow
    /// [`Monitor::update_config`].
    pub fn start(monitor: Arc<Monitor>, cancel: CancellationToken) -> Self {
        let config = monitor.config();

        let mut scheduler = Scheduler::new(
            Arc::clone(monitor.store()),
            Arc::clone(&monitor) as Arc<dyn PassRunner>,
            monitor.shared_config(),
        )
        .with_clock(Arc::clone(monitor.clock()));
        if let Some(events) = monitor.events() {
            scheduler = scheduler.with_events(events.clone());
        }

        let sweep_every = Duration::from_secs(config.delivery.sweep_interval_seconds.max(1));
        let prune_every = Duration::from_secs(config.retention.prune_interval_seconds.max(1));

        let handles = vec![
            scheduler.run(cancel.child_token()),
            spawn_delivery_sweep(Arc::clone(&monitor), sweep_every, cancel.child_token()),
            spawn_retention(monitor, prune_every, cancel.child_token()),
        ];
        info!("monitor service started");
        Self { cancel, handles }
    }

    /// Token that stops every loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel all loops and wait for in-flight passes to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("service task ended abnormally: {e}");
            }
        }
        info!("monitor service stopped");
    }
}

fn spawn_delivery_sweep(
    monitor: Arc<Monitor>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => match monitor.redeliver_due().await {
                    Ok(0) => {}
                    Ok(n) => debug!(attempted = n, "delivery sweep"),
                    Err(e) => warn!("delivery sweep failed: {e}"),
                },
            }
        }
    })
}

fn spawn_retention(
    monitor: Arc<Monitor>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = monitor.prune_expired().await {
                        warn!("retention pruning failed: {e}");
                    }
                }
            }
        }
    })
}
