#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use thiserror::Error;

pub type LoadResult<T> = Result<T, LoadError>;

/// Failures surfaced by the load-emulation engine.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Malformed workload parameters. Client error, never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The per-thread CPU time facility could not be queried.
    #[error("cpu accounting unavailable: {0}")]
    AccountingUnavailable(String),

    /// Store connectivity failure or pool exhaustion.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Requested or randomly chosen record is absent (or expired).
    #[error("not found: {0}")]
    NotFound(String),

    /// The burn was abandoned because its caller went away.
    #[error("burn cancelled after {iterations} work units")]
    Cancelled { iterations: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl LoadError {
    /// Short label used for metrics and structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::InvalidInput(_) => "invalid_input",
            LoadError::AccountingUnavailable(_) => "accounting_unavailable",
            LoadError::BackendUnavailable(_) => "backend_unavailable",
            LoadError::NotFound(_) => "not_found",
            LoadError::Cancelled { .. } => "cancelled",
            LoadError::Internal(_) => "internal",
        }
    }
}
