use thiserror::Error;

/// Structured error taxonomy for the engine (§7). Distinct from `anyhow`,
/// which is used for ambient propagation inside individual operations —
/// `RalphError` is what crosses the engine/CLI boundary and what drives
/// retry/escalation decisions in the execution loop.
#[derive(Debug, Error)]
pub enum RalphError {
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("environment error: {0}")]
    EnvironmentError(String),

    #[error("quota warning for {provider}: {details}")]
    QuotaWarning { provider: String, details: String },

    #[error("acceptance test failed: {0}")]
    TestFailure(String),

    #[error("timeout exceeded after {0:?}")]
    TimeoutExceeded(std::time::Duration),

    #[error("runtime anomaly: {0}")]
    RuntimeAnomaly(String),

    #[error("persistence error: {0}")]
    PersistenceError(#[from] std::io::Error),
}

impl RalphError {
    /// Whether this class of failure should trigger a retry of the current
    /// story (§7's recovery matrix) rather than aborting the whole run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RalphError::TestFailure(_)
                | RalphError::TimeoutExceeded(_)
                | RalphError::RuntimeAnomaly(_)
        )
    }
}
