//! Application-wide error types using thiserror
//!
//! All errors that can end a tick are wrapped in AppError so the strategy
//! loop can log them and append an `Error` record to the state log.

use thiserror::Error;

use crate::adapters::errors::VenueError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or missing configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A remote call failed after exhausting its retries
    #[error("Venue error: {0}")]
    Venue(#[from] VenueError),

    /// One or more snapshot sub-queries failed; nothing was persisted
    #[error("Partial snapshot failure: {}", failures.join("; "))]
    PartialSnapshot { failures: Vec<String> },

    /// A plan stopped at `step` after `completed` actions
    #[error("Plan execution failed at step {step} ({completed} completed): {reason}")]
    PlanExecution {
        step: usize,
        completed: usize,
        reason: String,
    },

    /// Not enough funding samples for a verdict
    #[error("Insufficient data: {samples} samples, need at least {required}")]
    InsufficientData { samples: usize, required: usize },

    #[error("Store error: {0}")]
    Store(#[from] crate::core::store::StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Errors that must reach the operator at `error!` level
    pub fn is_operator_visible(&self) -> bool {
        matches!(self, AppError::PlanExecution { .. } | AppError::Config(_))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
