//! Error types for the guardian monitoring core.

/// Top-level error type for monitoring, alerting and delivery.
#[derive(Debug, thiserror::Error)]
pub enum GuardianError {
    /// The durable store could not be read or written. Retryable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The signal source produced no usable snapshot.
    #[error("signal unavailable: {0}")]
    SignalUnavailable(String),

    /// The notifier gateway rejected or timed out an alert.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// Configuration failed validation. Fatal at start-up.
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    /// A snapshot could not be classified (unsupported schema, malformed payload).
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Optimistic-concurrency conflict on an entity write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown entity or alert.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller supplied an invalid argument.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Scheduler error (lease handling, pass execution, timeouts).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardianError {
    /// Whether a failed pass with this error should be retried with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_)
                | Self::Conflict(_)
                | Self::Scheduler(_)
                | Self::Evaluation(_)
                | Self::Io(_)
        )
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, GuardianError>;
