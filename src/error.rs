//! Error types for progress-relay
//!
//! This module defines the error hierarchy that covers:
//! - Cooperative cancellation (`StopRequested`)
//! - Recoverable work-item failures routed through the error rendezvous
//! - Failures raised by the external phase callback
//! - Worker pool and configuration errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Keep the cancellation signal a distinct type so it can propagate
//!   through every blocking operation without being confused with a
//!   recoverable failure
//! - Preserve error chains for debugging

use thiserror::Error;

/// Cooperative cancellation signal.
///
/// Produced by any interruptible wait or checkpoint once a stop has been
/// requested. It unwinds through all scoped reporters so they reconcile
/// totals to "work actually attempted".
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("stop requested")]
pub struct StopRequested;

/// Recoverable failure produced by a work item.
///
/// Carries the user-visible message handed to the external callback via
/// the error rendezvous; the user decides whether to retry or ignore.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TaskError {
    /// User-visible description of what failed
    pub message: String,
}

impl TaskError {
    /// Create a new task error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure raised by the external phase callback.
///
/// Any of these aborts the run: the drive loop propagates it out of the
/// executor and the remaining workers unwind via cancellation.
#[derive(Error, Debug)]
pub enum CallbackError {
    /// The user cancelled the operation from the observer side
    #[error("operation cancelled")]
    Cancelled,

    /// The observer failed for reasons of its own
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    /// Spawning an OS thread for the pool failed
    #[error("failed to spawn worker thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid per-device worker count
    #[error("invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid UI refresh interval
    #[error("invalid refresh interval {millis} ms: must be nonzero")]
    InvalidRefreshInterval { millis: u128 },
}

/// Top-level error type for a mass-parallel run
#[derive(Error, Debug)]
pub enum ExecuteError {
    /// The external phase callback raised an error
    #[error(transparent)]
    Callback(#[from] CallbackError),

    /// A device worker pool could not be created
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Result type alias for ExecuteError
pub type ExecuteResult<T> = std::result::Result<T, ExecuteError>;
