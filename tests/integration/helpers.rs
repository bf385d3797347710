//! Shared fixtures for integration tests: scripted signal source, recording
//! notifier, a store that can be made to fail, and a monitor harness.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use guardian::clock::ManualClock;
use guardian::runtime::RuntimeEvent;
use guardian::store::{CommitOutcome, CycleCommit, DeliveryUpdate, PruneReport};
use guardian::types::{PassCounter, ScheduleTask};
use guardian::{
    AlertEvent, DeliveryResult, EntityKind, EvaluationRecord, GuardedEntity, GuardianConfig,
    GuardianError, Monitor, MonitorStore, NotifierGateway, Result, SignalFetch, SignalSnapshot,
    SignalSource, SqliteStore,
};
use serde_json::{Value, json};
use tokio::sync::{Semaphore, mpsc};

/// Harness start time: 2023-11-14T22:13:20Z.
pub(crate) const T0: u64 = 1_700_000_000_000;

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Payload the rule evaluator classifies as `Normal`.
pub(crate) fn normal_payload() -> Value {
    json!({ "permissions": ["android.permission.INTERNET"] })
}

/// Payload the rule evaluator classifies as `Warning`.
pub(crate) fn warning_payload() -> Value {
    json!({ "permissions_added": ["android.permission.ACCESS_FINE_LOCATION"] })
}

/// Payload the rule evaluator classifies as `Critical`.
pub(crate) fn critical_payload() -> Value {
    json!({ "breaches": [{ "code": "root_detected", "severity": "critical" }] })
}

pub(crate) fn snapshot_at(captured_at: u64, payload: Value) -> SignalFetch {
    SignalFetch::Snapshot(SignalSnapshot {
        schema_version: 1,
        captured_at,
        payload,
    })
}

/// Signal source whose readings are set per entity by the test. The latest
/// `set` value is returned on every fetch; `block` makes fetches for an
/// entity wait until `release` is called; `set_latency` slows every fetch.
#[derive(Default)]
pub(crate) struct ScriptedSignals {
    readings: Mutex<HashMap<String, SignalFetch>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    latency: Mutex<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    fetches: AtomicUsize,
}

impl ScriptedSignals {
    pub(crate) fn set(&self, entity_id: &str, reading: SignalFetch) {
        self.readings
            .lock()
            .unwrap()
            .insert(entity_id.to_owned(), reading);
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub(crate) fn block(&self, entity_id: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(entity_id.to_owned(), Arc::new(Semaphore::new(0)));
    }

    /// Let one blocked fetch for `entity_id` proceed.
    pub(crate) fn release(&self, entity_id: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(entity_id) {
            gate.add_permits(1);
        }
    }

    /// Resolves once some fetch is waiting on a gate or running.
    pub(crate) async fn wait_started(&self) {
        while self.active.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once.
    pub(crate) fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalSource for ScriptedSignals {
    async fn fetch_snapshot(&self, entity_id: &str) -> SignalFetch {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let gate = self.gates.lock().unwrap().get(entity_id).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        let latency = *self.latency.lock().unwrap();
        tokio::time::sleep(latency).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.readings
            .lock()
            .unwrap()
            .get(entity_id)
            .cloned()
            .unwrap_or_else(|| SignalFetch::Unavailable("no reading scripted".to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Records every attempt. Scripted results are consumed in order; once the
/// script runs out every attempt succeeds.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    script: Mutex<VecDeque<DeliveryResult>>,
    attempts: Mutex<Vec<AlertEvent>>,
    latency: Mutex<Duration>,
}

impl RecordingNotifier {
    pub(crate) fn fail_next(&self, times: usize) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..times {
            script.push_back(DeliveryResult::Failed("gateway unreachable".to_owned()));
        }
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub(crate) fn attempts(&self) -> Vec<AlertEvent> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifierGateway for RecordingNotifier {
    async fn deliver(&self, alert: &AlertEvent) -> DeliveryResult {
        self.attempts.lock().unwrap().push(alert.clone());
        let latency = *self.latency.lock().unwrap();
        tokio::time::sleep(latency).await;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DeliveryResult::Delivered)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// SQLite store whose entity reads and cycle commits can be switched to fail.
/// Task bookkeeping keeps working so the scheduler can record backoff.
pub(crate) struct FlakyStore {
    inner: SqliteStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            failing: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GuardianError::StorageUnavailable("disk I/O error".to_owned()));
        }
        Ok(())
    }
}

impl MonitorStore for FlakyStore {
    fn get_entity(&self, id: &str) -> Result<Option<GuardedEntity>> {
        self.check()?;
        MonitorStore::get_entity(&self.inner, id)
    }
    fn upsert_entity(&self, entity: &GuardedEntity) -> Result<()> {
        MonitorStore::upsert_entity(&self.inner, entity)
    }
    fn list_entities(&self) -> Result<Vec<GuardedEntity>> {
        MonitorStore::list_entities(&self.inner)
    }
    fn compare_and_swap_entity(&self, entity: &GuardedEntity, expected: u64) -> Result<bool> {
        self.check()?;
        MonitorStore::compare_and_swap_entity(&self.inner, entity, expected)
    }
    fn set_monitoring(&self, id: &str, enabled: bool, task: Option<&ScheduleTask>) -> Result<()> {
        MonitorStore::set_monitoring(&self.inner, id, enabled, task)
    }
    fn bump_counter(&self, id: &str, counter: PassCounter) -> Result<()> {
        MonitorStore::bump_counter(&self.inner, id, counter)
    }
    fn append_evaluation(&self, record: &EvaluationRecord) -> Result<i64> {
        self.check()?;
        MonitorStore::append_evaluation(&self.inner, record)
    }
    fn append_alert(&self, alert: &AlertEvent) -> Result<()> {
        self.check()?;
        MonitorStore::append_alert(&self.inner, alert)
    }
    fn commit_cycle(&self, commit: &CycleCommit) -> Result<CommitOutcome> {
        self.check()?;
        MonitorStore::commit_cycle(&self.inner, commit)
    }
    fn history(&self, id: &str, limit: usize) -> Result<Vec<EvaluationRecord>> {
        MonitorStore::history(&self.inner, id, limit)
    }
    fn alerts(&self, entity_id: Option<&str>, limit: usize) -> Result<Vec<AlertEvent>> {
        MonitorStore::alerts(&self.inner, entity_id, limit)
    }
    fn get_alert(&self, id: &str) -> Result<Option<AlertEvent>> {
        MonitorStore::get_alert(&self.inner, id)
    }
    fn pending_alerts_due(&self, now_ms: u64) -> Result<Vec<AlertEvent>> {
        MonitorStore::pending_alerts_due(&self.inner, now_ms)
    }
    fn mark_delivered(&self, update: &DeliveryUpdate) -> Result<()> {
        MonitorStore::mark_delivered(&self.inner, update)
    }
    fn list_due_tasks(&self, now_ms: u64) -> Result<Vec<ScheduleTask>> {
        MonitorStore::list_due_tasks(&self.inner, now_ms)
    }
    fn get_task(&self, entity_id: &str) -> Result<Option<ScheduleTask>> {
        MonitorStore::get_task(&self.inner, entity_id)
    }
    fn upsert_task(&self, task: &ScheduleTask) -> Result<()> {
        MonitorStore::upsert_task(&self.inner, task)
    }
    fn update_task(&self, task: &ScheduleTask) -> Result<bool> {
        MonitorStore::update_task(&self.inner, task)
    }
    fn remove_task(&self, entity_id: &str) -> Result<bool> {
        MonitorStore::remove_task(&self.inner, entity_id)
    }
    fn prune(
        &self,
        alert_cutoff: Option<u64>,
        evaluation_cutoff: Option<u64>,
        now_ms: u64,
    ) -> Result<PruneReport> {
        MonitorStore::prune(&self.inner, alert_cutoff, evaluation_cutoff, now_ms)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A monitor wired to scripted doubles and a manual clock.
pub(crate) struct Harness {
    pub monitor: Arc<Monitor>,
    pub store: Arc<dyn MonitorStore>,
    pub signals: Arc<ScriptedSignals>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: ManualClock,
    pub events: mpsc::UnboundedReceiver<RuntimeEvent>,
}

impl Harness {
    /// Default config over an in-memory store.
    pub(crate) fn new() -> Self {
        Self::with(GuardianConfig::default(), in_memory_store())
    }

    pub(crate) fn with(config: GuardianConfig, store: Arc<dyn MonitorStore>) -> Self {
        let signals = Arc::new(ScriptedSignals::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = ManualClock::new(T0);
        let (tx, events) = mpsc::unbounded_channel();
        let monitor = Monitor::new(
            Arc::clone(&store),
            Arc::clone(&signals) as Arc<dyn SignalSource>,
            Arc::clone(&notifier) as Arc<dyn NotifierGateway>,
            config,
        )
        .unwrap()
        .with_clock(Arc::new(clock.clone()))
        .with_events(tx);
        Self {
            monitor: Arc::new(monitor),
            store,
            signals,
            notifier,
            clock,
            events,
        }
    }

    pub(crate) async fn register(&self, entity_id: &str) -> GuardedEntity {
        self.monitor
            .register_entity(entity_id, EntityKind::Application)
            .await
            .unwrap()
    }

    /// Script a fresh snapshot captured now.
    pub(crate) fn report(&self, entity_id: &str, payload: Value) {
        self.signals
            .set(entity_id, snapshot_at(self.clock_now(), payload));
    }

    pub(crate) fn clock_now(&self) -> u64 {
        use guardian::Clock;
        self.clock.now_millis()
    }

    /// Advance one evaluation interval, then run a pass.
    pub(crate) async fn pass(&self, entity_id: &str) -> Result<guardian::PassOutcome> {
        self.clock.advance_secs(60);
        self.monitor.evaluate_entity(entity_id).await
    }

    pub(crate) fn drain_events(&mut self) -> Vec<RuntimeEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub(crate) fn in_memory_store() -> Arc<dyn MonitorStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}
