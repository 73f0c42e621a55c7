//! Error taxonomy for stability-selection runs
//!
//! Fatal errors (invalid configuration, a pool that never drains, an
//! ensemble with zero surviving runs) surface to the caller. Per-task
//! failures are recovered inside the worker pool and reported as counts,
//! never as errors.

use thiserror::Error;

/// Errors surfaced by aggregation runs
#[derive(Error, Debug)]
pub enum StabilityError {
    /// Invalid configuration; raised before any task is launched.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A run result referenced a variable absent from the canonical set.
    ///
    /// Inside an ensemble this is recovered as a task failure; it is only
    /// returned directly when the caller aligns graphs by hand.
    #[error("variable '{name}' has no canonical counterpart")]
    MissingVariable { name: String },

    /// The worker pool failed to drain within its time budget.
    #[error("worker pool failed to drain within {waited_secs}s")]
    PoolTimeout { waited_secs: u64 },

    /// Every run in the ensemble failed; there is nothing to aggregate.
    #[error("all {attempted} ensemble runs failed; no results to aggregate")]
    EmptyEnsemble { attempted: usize },

    /// A structure-discovery invocation failed outside the pool.
    #[error("structure search failed: {0}")]
    Search(String),
}

pub type Result<T> = std::result::Result<T, StabilityError>;

impl StabilityError {
    /// Shorthand for configuration failures.
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        StabilityError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
