//! Retry backoff for failed passes.

use crate::config::MonitorConfig;
use crate::types::ScheduleTask;

/// Delay before retry number `retry_count` (1-based): `base * 2^(n-1)`,
/// capped at `max_ms`. Zero retries means no delay.
#[must_use]
pub fn backoff_delay_ms(retry_count: u32, base_ms: u64, max_ms: u64) -> u64 {
    if retry_count == 0 {
        return 0;
    }
    let shift = (retry_count - 1).min(32);
    base_ms.saturating_mul(1_u64 << shift).min(max_ms)
}

/// Rescheduling rules applied after each pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval_ms: u64,
    pub base_ms: u64,
    pub max_ms: u64,
    pub max_retries: u32,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            interval_ms: config.evaluation_interval_seconds.saturating_mul(1000),
            base_ms: config.retry_base_seconds.saturating_mul(1000),
            max_ms: config.max_backoff_seconds.saturating_mul(1000),
            max_retries: config.max_retries,
        }
    }

    /// Task state after a failed pass. Once retries are exhausted the task
    /// falls back to the normal interval with a fresh retry budget.
    #[must_use]
    pub fn after_failure(&self, task: &ScheduleTask, now_ms: u64, error: &str) -> ScheduleTask {
        let retry_count = task.retry_count.saturating_add(1);
        let mut next = task.clone();
        next.last_error = Some(error.to_owned());
        if retry_count > self.max_retries {
            next.retry_count = 0;
            next.backoff_until = None;
            next.next_due_at = now_ms.saturating_add(self.interval_ms);
        } else {
            let until = now_ms.saturating_add(backoff_delay_ms(retry_count, self.base_ms, self.max_ms));
            next.retry_count = retry_count;
            next.backoff_until = Some(until);
            next.next_due_at = until;
        }
        next
    }

    /// Task state after a successful pass. `next_due_at` was already advanced
    /// when the pass started.
    #[must_use]
    pub fn after_success(&self, task: &ScheduleTask) -> ScheduleTask {
        let mut next = task.clone();
        next.retry_count = 0;
        next.backoff_until = None;
        next.last_error = None;
        next
    }
}
