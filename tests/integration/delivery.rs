//! Notifier delivery, redelivery and recovery after restart.

use std::sync::Arc;

use guardian::runtime::RuntimeEvent;
use guardian::{DeliveryStatus, GuardianConfig, MonitorStore, SqliteStore};

use crate::helpers::{Harness, warning_payload};

#[tokio::test]
async fn failed_delivery_is_retried_once_and_then_delivered() {
    let h = Harness::new();
    h.register("cam").await;
    h.notifier.fail_next(1);

    h.report("cam", warning_payload());
    h.pass("cam").await.unwrap();

    let alert = h.monitor.alerts(None, 1).await.unwrap().remove(0);
    assert_eq!(alert.status, DeliveryStatus::Pending);
    assert_eq!(alert.attempts, 1);
    assert_eq!(alert.next_attempt_at, h.clock_now() + 60_000);

    // Not due yet.
    assert_eq!(h.monitor.redeliver_due().await.unwrap(), 0);

    h.clock.advance_secs(60);
    assert_eq!(h.monitor.redeliver_due().await.unwrap(), 1);

    let alert = h.monitor.alerts(None, 1).await.unwrap().remove(0);
    assert_eq!(alert.status, DeliveryStatus::Delivered);
    assert_eq!(alert.attempts, 2);
    assert_eq!(h.notifier.attempts().len(), 2);
}

#[tokio::test]
async fn second_failure_marks_alert_failed_and_keeps_it_queryable() {
    let mut h = Harness::new();
    h.register("cam").await;
    h.notifier.fail_next(2);

    h.report("cam", warning_payload());
    h.pass("cam").await.unwrap();
    h.clock.advance_secs(60);
    h.monitor.redeliver_due().await.unwrap();

    let alert = h.monitor.alerts(Some("cam"), 10).await.unwrap().remove(0);
    assert_eq!(alert.status, DeliveryStatus::Failed);
    assert_eq!(alert.attempts, 2);

    // No third attempt.
    h.clock.advance_secs(600);
    assert_eq!(h.monitor.redeliver_due().await.unwrap(), 0);
    assert_eq!(h.notifier.attempts().len(), 2);

    // Only the first attempt after the pass is reported; sweeps log instead.
    let finished: Vec<bool> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            RuntimeEvent::DeliveryFinished { delivered, .. } => Some(delivered),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![false]);
}

#[tokio::test]
async fn failed_delivery_does_not_roll_back_the_tier() {
    let h = Harness::new();
    h.register("cam").await;
    h.notifier.fail_next(2);

    h.report("cam", warning_payload());
    h.pass("cam").await.unwrap();
    h.clock.advance_secs(60);
    h.monitor.redeliver_due().await.unwrap();

    let entity = h.monitor.entity("cam").await.unwrap();
    assert_eq!(entity.tier, guardian::AlertTier::Warning);
}

#[tokio::test]
async fn pending_alerts_are_delivered_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    let alert_id = {
        let store: Arc<dyn MonitorStore> = Arc::new(SqliteStore::open(dir.path()).unwrap());
        let h = Harness::with(GuardianConfig::default(), store);
        h.register("cam").await;
        h.notifier.fail_next(1);
        h.report("cam", warning_payload());
        h.pass("cam").await.unwrap();
        h.monitor.alerts(None, 1).await.unwrap().remove(0).id
    };

    let store: Arc<dyn MonitorStore> = Arc::new(SqliteStore::open(dir.path()).unwrap());
    let h = Harness::with(GuardianConfig::default(), store);
    h.clock.advance_secs(180);
    assert_eq!(h.monitor.redeliver_due().await.unwrap(), 1);

    let attempts = h.notifier.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].id, alert_id);
    let alert = h.monitor.alerts(None, 1).await.unwrap().remove(0);
    assert_eq!(alert.status, DeliveryStatus::Delivered);
}
