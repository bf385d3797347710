//! Missing, stale and unclassifiable signals.

use guardian::{AlertTier, GuardianError, SignalFetch, SignalSnapshot, SignalTier};
use serde_json::json;

use crate::helpers::{Harness, normal_payload, snapshot_at};

#[tokio::test]
async fn three_unavailable_readings_raise_a_single_warning() {
    let h = Harness::new();
    h.register("thermostat").await;

    for _ in 0..2 {
        h.pass("thermostat").await.unwrap();
        let entity = h.monitor.entity("thermostat").await.unwrap();
        assert_eq!(entity.tier, AlertTier::Normal);
    }
    assert!(h.monitor.alerts(None, 10).await.unwrap().is_empty());

    h.pass("thermostat").await.unwrap();
    let entity = h.monitor.entity("thermostat").await.unwrap();
    assert_eq!(entity.tier, AlertTier::Warning);
    assert_eq!(entity.tracking.unknown_streak, 3);

    // Staying silent keeps reporting Warning without new alerts.
    h.pass("thermostat").await.unwrap();
    let alerts = h.monitor.alerts(None, 10).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].tier, AlertTier::Warning);
    assert!(alerts[0].rationale.contains("consecutive"));

    let history = h.monitor.history("thermostat", 10).await.unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(|r| r.snapshot.is_none()));
    assert_eq!(history[3].reported_tier, SignalTier::Unknown);
    assert_eq!(history[0].reported_tier, SignalTier::Warning);
}

#[tokio::test]
async fn stale_snapshot_is_treated_as_unknown() {
    let h = Harness::new();
    h.register("thermostat").await;

    let captured = h.clock_now() - 300_000;
    h.signals
        .set("thermostat", snapshot_at(captured, json!({ "breaches": [] })));
    h.pass("thermostat").await.unwrap();

    let record = &h.monitor.history("thermostat", 1).await.unwrap()[0];
    assert_eq!(record.reported_tier, SignalTier::Unknown);
    assert!(record.rationale.contains("stale"));
    assert!(record.snapshot.is_some());
}

#[tokio::test]
async fn usable_reading_resets_the_unknown_streak() {
    let h = Harness::new();
    h.register("thermostat").await;

    h.signals.set(
        "thermostat",
        SignalFetch::Unavailable("collector offline".to_owned()),
    );
    h.pass("thermostat").await.unwrap();
    h.pass("thermostat").await.unwrap();
    assert_eq!(
        h.monitor.entity("thermostat").await.unwrap().tracking.unknown_streak,
        2
    );

    h.report("thermostat", normal_payload());
    h.pass("thermostat").await.unwrap();
    let entity = h.monitor.entity("thermostat").await.unwrap();
    assert_eq!(entity.tracking.unknown_streak, 0);
    assert_eq!(entity.tier, AlertTier::Normal);
}

#[tokio::test]
async fn unsupported_schema_fails_the_pass_without_writing() {
    let h = Harness::new();
    let before = h.register("thermostat").await;

    h.signals.set(
        "thermostat",
        SignalFetch::Snapshot(SignalSnapshot {
            schema_version: 9,
            captured_at: h.clock_now(),
            payload: json!({}),
        }),
    );
    let err = h.pass("thermostat").await.unwrap_err();
    assert!(matches!(err, GuardianError::Evaluation(_)));

    let after = h.monitor.entity("thermostat").await.unwrap();
    assert_eq!(after.version, before.version);
    assert!(h.monitor.history("thermostat", 10).await.unwrap().is_empty());
}
