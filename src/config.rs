//! Configuration for the monitoring engine.
//!
//! Loaded from TOML. Every section uses `#[serde(default)]`, so a partial
//! file only overrides what it names. [`GuardianConfig::validate`] rejects
//! values the engine cannot run with; callers treat that as fatal.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::error::{GuardianError, Result};
use crate::types::EntityKind;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    /// Evaluation cadence, backoff and alert-state thresholds.
    pub monitor: MonitorConfig,
    /// Notifier gateway delivery policy.
    pub delivery: DeliveryConfig,
    /// Alert archiving and evaluation-history pruning.
    pub retention: RetentionConfig,
    /// Persistence store location.
    pub store: StoreConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Entities registered at start-up.
    pub entities: Vec<EntityConfig>,
}

/// Scheduler and state-machine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between evaluation passes of one entity.
    pub evaluation_interval_seconds: u64,
    /// Upper bound for the retry backoff after failed passes.
    pub max_backoff_seconds: u64,
    /// Delay after the first failed pass; doubles per consecutive failure.
    pub retry_base_seconds: u64,
    /// Consecutive failures before falling back to the normal interval.
    pub max_retries: u32,
    /// Consecutive lower readings required to de-escalate, and the hold
    /// window (in evaluations) after a de-escalation.
    pub cooldown_evaluation_count: u32,
    /// Default acknowledgement window.
    pub suppression_window_seconds: u64,
    /// Snapshots older than this are treated as unknown.
    pub stale_unknown_threshold_seconds: u64,
    /// Consecutive unknown readings before raising `Warning`.
    pub unknown_escalation_count: u32,
    /// Hard bound for one pass (fetch, evaluate, commit). Alert delivery
    /// runs after the pass under its own `delivery_timeout_seconds`.
    pub pass_timeout_seconds: u64,
    /// Bound for one signal fetch. A fetch that runs over reads as unavailable.
    pub signal_fetch_timeout_seconds: u64,
    /// Maximum passes running concurrently across entities.
    pub worker_count: usize,
    /// How often the scheduler scans for due tasks.
    pub tick_interval_millis: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_seconds: 60,
            max_backoff_seconds: 900,
            retry_base_seconds: 30,
            max_retries: 5,
            cooldown_evaluation_count: 3,
            suppression_window_seconds: 3_600,
            stale_unknown_threshold_seconds: 300,
            unknown_escalation_count: 3,
            pass_timeout_seconds: 30,
            signal_fetch_timeout_seconds: 10,
            worker_count: 4,
            tick_interval_millis: 1_000,
        }
    }
}

/// Notifier delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Wait before the single redelivery of a failed alert.
    pub redelivery_delay_seconds: u64,
    /// Bound for one gateway call.
    pub delivery_timeout_seconds: u64,
    /// How often pending alerts are swept for (re)delivery.
    pub sweep_interval_seconds: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            redelivery_delay_seconds: 60,
            delivery_timeout_seconds: 10,
            sweep_interval_seconds: 15,
        }
    }
}

/// Retention settings. A value of 0 days keeps data forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Settled alerts older than this move to the archive table.
    pub alert_retention_days: u32,
    /// Evaluation records older than this are deleted.
    pub evaluation_retention_days: u32,
    /// How often the retention job runs.
    pub prune_interval_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            alert_retention_days: 30,
            evaluation_retention_days: 30,
            prune_interval_seconds: 3_600,
        }
    }
}

/// Store location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `guardian.db`.
    pub root_dir: PathBuf,
    /// Directory holding `<entity>.json` signal snapshots.
    pub signals_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: crate::guardian_dirs::store_dir(),
            signals_dir: crate::guardian_dirs::signals_dir(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// When set, logs also roll daily into this directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "guardian=info".to_owned(),
            log_dir: None,
        }
    }
}

/// An entity declared in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub id: String,
    pub kind: EntityKind,
    /// Per-entity monitoring toggle.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl MonitorConfig {
    /// Reject values the scheduler and state machine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.evaluation_interval_seconds == 0 {
            return Err(invalid("monitor.evaluation_interval_seconds must be > 0"));
        }
        if self.retry_base_seconds == 0 {
            return Err(invalid("monitor.retry_base_seconds must be > 0"));
        }
        if self.max_backoff_seconds < self.retry_base_seconds {
            return Err(invalid(
                "monitor.max_backoff_seconds must be >= monitor.retry_base_seconds",
            ));
        }
        if self.cooldown_evaluation_count == 0 {
            return Err(invalid("monitor.cooldown_evaluation_count must be > 0"));
        }
        if self.suppression_window_seconds == 0 {
            return Err(invalid("monitor.suppression_window_seconds must be > 0"));
        }
        if self.stale_unknown_threshold_seconds == 0 {
            return Err(invalid("monitor.stale_unknown_threshold_seconds must be > 0"));
        }
        if self.unknown_escalation_count == 0 {
            return Err(invalid("monitor.unknown_escalation_count must be > 0"));
        }
        if self.pass_timeout_seconds == 0 {
            return Err(invalid("monitor.pass_timeout_seconds must be > 0"));
        }
        if self.signal_fetch_timeout_seconds == 0 {
            return Err(invalid("monitor.signal_fetch_timeout_seconds must be > 0"));
        }
        if self.worker_count == 0 {
            return Err(invalid("monitor.worker_count must be > 0"));
        }
        if self.tick_interval_millis == 0 {
            return Err(invalid("monitor.tick_interval_millis must be > 0"));
        }
        Ok(())
    }
}

impl DeliveryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.delivery_timeout_seconds == 0 {
            return Err(invalid("delivery.delivery_timeout_seconds must be > 0"));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(invalid("delivery.sweep_interval_seconds must be > 0"));
        }
        Ok(())
    }
}

impl GuardianConfig {
    /// Validate every section and the entity list.
    ///
    /// # Errors
    ///
    /// Returns [`GuardianError::ConfigInvalid`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        self.monitor.validate()?;
        self.delivery.validate()?;
        if self.retention.prune_interval_seconds == 0 {
            return Err(invalid("retention.prune_interval_seconds must be > 0"));
        }
        let mut seen = std::collections::HashSet::new();
        for entity in &self.entities {
            if entity.id.trim().is_empty() {
                return Err(invalid("entities[].id must not be empty"));
            }
            if !seen.insert(entity.id.as_str()) {
                return Err(invalid(&format!("duplicate entity id '{}'", entity.id)));
            }
        }
        Ok(())
    }

    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| GuardianError::ConfigInvalid(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| GuardianError::ConfigInvalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::guardian_dirs::config_file()
    }
}

/// Live configuration handle. Passes take a snapshot at start, so a
/// replacement applies from the next pass on.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<GuardianConfig>>>,
}

impl SharedConfig {
    /// # Errors
    ///
    /// Returns [`GuardianError::ConfigInvalid`] if `config` fails validation.
    pub fn new(config: GuardianConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    /// Current configuration.
    #[must_use]
    pub fn snapshot(&self) -> Arc<GuardianConfig> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Validate and swap in a new configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GuardianError::ConfigInvalid`] and keeps the old config if
    /// `config` fails validation.
    pub fn replace(&self, config: GuardianConfig) -> Result<()> {
        config.validate()?;
        let next = Arc::new(config);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> GuardianError {
    GuardianError::ConfigInvalid(msg.to_owned())
}
