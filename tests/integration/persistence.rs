//! Durable state across store reopen, and retention.

use std::sync::Arc;

use guardian::{AlertTier, DeliveryStatus, GuardianConfig, MonitorStore, SqliteStore};

use crate::helpers::{Harness, critical_payload, normal_payload, warning_payload};

#[tokio::test]
async fn entity_state_and_history_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let before = {
        let store: Arc<dyn MonitorStore> = Arc::new(SqliteStore::open(dir.path()).unwrap());
        let h = Harness::with(GuardianConfig::default(), store);
        h.register("camera").await;
        h.report("camera", critical_payload());
        h.pass("camera").await.unwrap();
        h.report("camera", normal_payload());
        h.pass("camera").await.unwrap();
        h.monitor.entity("camera").await.unwrap()
    };
    assert_eq!(before.tier, AlertTier::Critical);
    assert_eq!(before.tracking.lower_streak, 1);

    let reopened = SqliteStore::open(dir.path()).unwrap();
    assert_eq!(reopened.schema_version().unwrap(), Some(1));
    let store: Arc<dyn MonitorStore> = Arc::new(reopened);
    let h = Harness::with(GuardianConfig::default(), store);

    let after = h.monitor.entity("camera").await.unwrap();
    assert_eq!(after, before);
    assert_eq!(h.monitor.history("camera", 10).await.unwrap().len(), 2);

    // The restored lower streak keeps counting.
    h.clock.advance_secs(120);
    for _ in 0..2 {
        h.report("camera", normal_payload());
        h.pass("camera").await.unwrap();
    }
    assert_eq!(
        h.monitor.entity("camera").await.unwrap().tier,
        AlertTier::Normal
    );
}

#[tokio::test]
async fn registration_is_idempotent() {
    let h = Harness::new();
    let first = h.register("cam").await;
    h.report("cam", warning_payload());
    h.pass("cam").await.unwrap();

    let again = h.register("cam").await;
    assert_ne!(again, first);
    assert_eq!(again.tier, AlertTier::Warning);
    assert_eq!(h.monitor.list_entities().await.unwrap().len(), 1);
}

#[tokio::test]
async fn retention_archives_settled_alerts_and_keeps_latest_record() {
    let h = Harness::new();
    h.register("cam").await;
    h.report("cam", warning_payload());
    h.pass("cam").await.unwrap();
    h.report("cam", warning_payload());
    h.pass("cam").await.unwrap();

    h.clock.advance_secs(31 * 24 * 60 * 60);
    let report = h.monitor.prune_expired().await.unwrap();
    assert_eq!(report.alerts_archived, 1);
    assert_eq!(report.evaluations_deleted, 1);

    assert!(h.monitor.alerts(None, 10).await.unwrap().is_empty());
    let history = h.monitor.history("cam", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].resulting_tier, AlertTier::Warning);
}

#[tokio::test]
async fn retention_keeps_pending_alerts() {
    let h = Harness::new();
    h.register("cam").await;
    h.notifier.fail_next(1);
    h.report("cam", warning_payload());
    h.pass("cam").await.unwrap();

    h.clock.advance_secs(31 * 24 * 60 * 60);
    let report = h.monitor.prune_expired().await.unwrap();
    assert_eq!(report.alerts_archived, 0);
    let alerts = h.monitor.alerts(None, 10).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, DeliveryStatus::Pending);
}
