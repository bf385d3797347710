//! Tier transitions driven end to end through `Monitor::evaluate_entity`.

use guardian::runtime::RuntimeEvent;
use guardian::{AlertTier, DeliveryStatus, GuardianError, PassOutcome, SignalTier};

use crate::helpers::{Harness, critical_payload, normal_payload, warning_payload};

async fn tier_of(h: &Harness, id: &str) -> AlertTier {
    h.monitor.entity(id).await.unwrap().tier
}

#[tokio::test]
async fn escalating_breach_emits_one_alert_per_tier_increase() {
    let mut h = Harness::new();
    h.register("com.example.flashlight").await;

    let script = [
        (normal_payload(), AlertTier::Normal),
        (warning_payload(), AlertTier::Warning),
        (warning_payload(), AlertTier::Warning),
        (critical_payload(), AlertTier::Critical),
    ];
    for (payload, expected) in script {
        h.report("com.example.flashlight", payload);
        h.pass("com.example.flashlight").await.unwrap();
        assert_eq!(tier_of(&h, "com.example.flashlight").await, expected);
    }

    let alerts = h.monitor.alerts(Some("com.example.flashlight"), 10).await.unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].tier, AlertTier::Critical);
    assert_eq!(alerts[1].tier, AlertTier::Warning);
    assert!(alerts.iter().all(|a| a.status == DeliveryStatus::Delivered));
    assert_eq!(h.notifier.attempts().len(), 2);

    let emitted = h
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, RuntimeEvent::AlertEmitted { .. }))
        .count();
    assert_eq!(emitted, 2);
}

#[tokio::test]
async fn pass_outcome_carries_the_alert_id() {
    let h = Harness::new();
    h.register("cam").await;
    h.report("cam", warning_payload());

    let outcome = h.pass("cam").await.unwrap();
    let PassOutcome::Committed { tier, alert_id } = outcome else {
        panic!("expected a committed pass");
    };
    assert_eq!(tier, AlertTier::Warning);
    let alert_id = alert_id.expect("escalation should emit an alert");
    let alerts = h.monitor.alerts(None, 10).await.unwrap();
    assert_eq!(alerts[0].id, alert_id);
}

#[tokio::test]
async fn critical_holds_until_three_consecutive_lower_readings() {
    let h = Harness::new();
    h.register("mic").await;

    h.report("mic", critical_payload());
    h.pass("mic").await.unwrap();

    for _ in 0..2 {
        h.report("mic", normal_payload());
        h.pass("mic").await.unwrap();
        assert_eq!(tier_of(&h, "mic").await, AlertTier::Critical);
    }

    // Third lower reading completes the streak; the highest tier seen in the
    // streak wins.
    h.report("mic", warning_payload());
    h.pass("mic").await.unwrap();
    assert_eq!(tier_of(&h, "mic").await, AlertTier::Warning);

    // De-escalation never alerts.
    assert_eq!(h.monitor.alerts(Some("mic"), 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn higher_reading_breaks_the_lower_streak() {
    let h = Harness::new();
    h.register("mic").await;

    h.report("mic", critical_payload());
    h.pass("mic").await.unwrap();
    for payload in [normal_payload(), normal_payload(), critical_payload(), normal_payload()] {
        h.report("mic", payload);
        h.pass("mic").await.unwrap();
    }
    assert_eq!(tier_of(&h, "mic").await, AlertTier::Critical);
    assert_eq!(h.monitor.entity("mic").await.unwrap().tracking.lower_streak, 1);
}

#[tokio::test]
async fn critical_bypasses_cooldown_but_warning_is_held() {
    let h = Harness::new();
    h.register("gps").await;

    h.report("gps", critical_payload());
    h.pass("gps").await.unwrap();
    for _ in 0..3 {
        h.report("gps", normal_payload());
        h.pass("gps").await.unwrap();
    }
    let entity = h.monitor.entity("gps").await.unwrap();
    assert_eq!(entity.tier, AlertTier::Normal);
    assert_eq!(entity.tracking.cooldown_remaining, 3);

    h.report("gps", warning_payload());
    h.pass("gps").await.unwrap();
    assert_eq!(tier_of(&h, "gps").await, AlertTier::Normal);

    h.report("gps", critical_payload());
    h.pass("gps").await.unwrap();
    let entity = h.monitor.entity("gps").await.unwrap();
    assert_eq!(entity.tier, AlertTier::Critical);
    assert_eq!(entity.tracking.cooldown_remaining, 0);

    let alerts = h.monitor.alerts(Some("gps"), 10).await.unwrap();
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.tier == AlertTier::Critical));
}

#[tokio::test]
async fn warning_allowed_again_after_cooldown_elapses() {
    let h = Harness::new();
    h.register("gps").await;

    h.report("gps", warning_payload());
    h.pass("gps").await.unwrap();
    for _ in 0..3 {
        h.report("gps", normal_payload());
        h.pass("gps").await.unwrap();
    }
    // Three held readings drain the cool-down.
    for _ in 0..3 {
        h.report("gps", warning_payload());
        h.pass("gps").await.unwrap();
        assert_eq!(tier_of(&h, "gps").await, AlertTier::Normal);
    }
    h.report("gps", warning_payload());
    h.pass("gps").await.unwrap();
    assert_eq!(tier_of(&h, "gps").await, AlertTier::Warning);
    assert_eq!(h.monitor.alerts(Some("gps"), 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn suppression_silences_alerts_until_the_window_ends() {
    let h = Harness::new();
    h.register("contacts").await;

    h.report("contacts", warning_payload());
    h.pass("contacts").await.unwrap();

    let acked = h.monitor.acknowledge("contacts", 600).await.unwrap();
    assert_eq!(acked.tier, AlertTier::Suppressed);
    assert_eq!(
        acked.tracking.suppressed_until,
        Some(h.clock_now() + 600_000)
    );

    h.report("contacts", critical_payload());
    h.pass("contacts").await.unwrap();
    assert_eq!(tier_of(&h, "contacts").await, AlertTier::Suppressed);
    assert_eq!(h.monitor.alerts(Some("contacts"), 10).await.unwrap().len(), 1);

    let latest = h.monitor.history("contacts", 1).await.unwrap();
    assert_eq!(latest[0].reported_tier, SignalTier::Critical);
    assert_eq!(latest[0].resulting_tier, AlertTier::Suppressed);

    // Past the window the entity restarts from Normal and the current
    // reading applies fresh.
    h.clock.advance_secs(600);
    h.report("contacts", critical_payload());
    h.pass("contacts").await.unwrap();
    let entity = h.monitor.entity("contacts").await.unwrap();
    assert_eq!(entity.tier, AlertTier::Critical);
    assert_eq!(entity.tracking.suppressed_until, None);

    let alerts = h.monitor.alerts(Some("contacts"), 10).await.unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].tier, AlertTier::Critical);
}

#[tokio::test]
async fn acknowledge_rejects_zero_duration_and_unknown_entities() {
    let h = Harness::new();
    h.register("cam").await;

    assert!(matches!(
        h.monitor.acknowledge("cam", 0).await,
        Err(GuardianError::InvalidRequest(_))
    ));
    assert!(matches!(
        h.monitor.acknowledge("nope", 60).await,
        Err(GuardianError::NotFound(_))
    ));
    assert_eq!(tier_of(&h, "cam").await, AlertTier::Normal);
}

#[tokio::test]
async fn acknowledge_default_uses_configured_window() {
    let h = Harness::new();
    h.register("cam").await;

    let acked = h.monitor.acknowledge_default("cam").await.unwrap();
    assert_eq!(
        acked.tracking.suppressed_until,
        Some(h.clock_now() + 3_600_000)
    );
}

#[tokio::test]
async fn history_is_newest_first_and_bounded() {
    let h = Harness::new();
    h.register("cam").await;

    for payload in [normal_payload(), warning_payload(), critical_payload()] {
        h.report("cam", payload);
        h.pass("cam").await.unwrap();
    }

    let history = h.monitor.history("cam", 2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].evaluated_at > history[1].evaluated_at);
    assert_eq!(history[0].resulting_tier, AlertTier::Critical);
    assert_eq!(history[1].resulting_tier, AlertTier::Warning);
    assert!(history[0].snapshot.is_some());

    assert!(matches!(
        h.monitor.history("nope", 10).await,
        Err(GuardianError::NotFound(_))
    ));
}

#[tokio::test]
async fn identical_inputs_produce_identical_histories() {
    let script = [
        normal_payload(),
        warning_payload(),
        critical_payload(),
        normal_payload(),
        normal_payload(),
        warning_payload(),
    ];

    let mut runs = Vec::new();
    for _ in 0..2 {
        let h = Harness::new();
        h.register("app").await;
        for payload in &script {
            h.report("app", payload.clone());
            h.pass("app").await.unwrap();
        }
        let trace: Vec<_> = h
            .monitor
            .history("app", 100)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.evaluated_at, r.reported_tier, r.resulting_tier, r.rationale))
            .collect();
        runs.push(trace);
    }
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn config_update_applies_from_next_pass() {
    let h = Harness::new();
    h.register("cam").await;

    let mut config = (*h.monitor.config()).clone();
    config.monitor.cooldown_evaluation_count = 1;
    h.monitor.update_config(config).unwrap();

    h.report("cam", warning_payload());
    h.pass("cam").await.unwrap();
    h.report("cam", normal_payload());
    h.pass("cam").await.unwrap();
    assert_eq!(tier_of(&h, "cam").await, AlertTier::Normal);

    let mut bad = (*h.monitor.config()).clone();
    bad.monitor.evaluation_interval_seconds = 0;
    assert!(matches!(
        h.monitor.update_config(bad),
        Err(GuardianError::ConfigInvalid(_))
    ));
    assert_eq!(h.monitor.config().monitor.evaluation_interval_seconds, 60);
}
