//! Alert state: tier transitions and their policy.

pub mod state_machine;

pub use state_machine::{Transition, TransitionKind, acknowledge, apply};

use crate::config::MonitorConfig;

/// Thresholds for the alert state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    /// Consecutive lower readings before de-escalating, and the number of
    /// evaluations a `Warning` escalation is held after a de-escalation.
    pub cooldown_evaluation_count: u32,
}

impl AlertPolicy {
    #[must_use]
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            cooldown_evaluation_count: config.cooldown_evaluation_count,
        }
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}
