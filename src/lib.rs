//! Guardian: background monitoring scheduler and alert-state engine.
//!
//! The crate periodically evaluates guarded entities (applications, sensors,
//! devices) and turns their signals into alert tiers:
//! Signal source → Evaluator → Alert state machine → Store → Notifier
//!
//! # Architecture
//!
//! - **Scheduler**: drives at most one pass per entity, with per-entity
//!   backoff, missed-cycle skipping and a pass timeout
//! - **Evaluator**: pure classification of a signal snapshot into a tier
//! - **Alert state machine**: cool-down, Critical bypass and suppression
//! - **Store**: SQLite persistence with versioned compare-and-swap commits
//! - **Notifier**: alert delivery with one redelivery before `Failed`

pub mod alerts;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod guardian_dirs;
pub mod notifier;
pub mod runtime;
pub mod scheduler;
pub mod service;
pub mod signals;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GuardianConfig, SharedConfig};
pub use engine::Monitor;
pub use error::{GuardianError, Result};
pub use evaluator::{ConditionEvaluator, RuleEvaluator, Verdict};
pub use notifier::{DeliveryResult, LogNotifier, NotifierGateway};
pub use runtime::RuntimeEvent;
pub use scheduler::{PassOutcome, PassRunner, Scheduler};
pub use service::MonitorService;
pub use signals::{FileSignalSource, SignalFetch, SignalSource};
pub use store::{MonitorStore, SqliteStore};
pub use types::{
    AlertEvent, AlertTier, DeliveryStatus, EntityKind, EvaluationRecord, GuardedEntity,
    SignalSnapshot, SignalTier,
};
