//! Periodic evaluation scheduling.
//!
//! - `backoff`: retry delays and task rescheduling rules
//! - `lease`: per-entity mutual exclusion for passes
//! - `runner`: the tick loop and worker pool

pub mod backoff;
pub mod lease;
pub mod runner;

pub use backoff::{RetryPolicy, backoff_delay_ms};
pub use lease::{LeaseGuard, LeaseTable};
pub use runner::{PassOutcome, PassRunner, Scheduler, SchedulerStats, TickReport};
