//! The two reporting surfaces of the core
//!
//! [`PhaseCallback`] is the external observer (UI, logger) consumed from
//! the environment and driven from the main thread only. [`ProgressSink`]
//! is the worker-facing surface implemented by
//! [`AsyncCallback`](crate::status::AsyncCallback); scoped reporters and
//! the retry wrapper are generic over it so tests can substitute mocks.

use crate::error::{CallbackError, StopRequested};
use chrono::{DateTime, Utc};

/// A recoverable error presented to the user for resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// User-visible description of the failure
    pub message: String,

    /// When the failure was observed
    pub occurred_at: DateTime<Utc>,

    /// How many times this action has already been retried
    pub retry_number: usize,
}

impl ErrorInfo {
    /// Create an error info stamped with the current time
    pub fn new(message: impl Into<String>, retry_number: usize) -> Self {
        Self {
            message: message.into(),
            occurred_at: Utc::now(),
            retry_number,
        }
    }
}

/// The user's decision on a recoverable error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorResponse {
    /// Skip the failed action; the caller logs the message as a skipped
    /// outcome and continues
    Ignore,

    /// Run the failed action again
    Retry,
}

/// The external observer a run reports into.
///
/// All methods are invoked from the main thread. The data updates are
/// purely additive and must not fail; the remaining operations may fail
/// to abort the whole run.
pub trait PhaseCallback {
    /// Add to the processed items/bytes counters. Deltas may be negative.
    fn update_data_processed(&mut self, items_delta: i64, bytes_delta: i64);

    /// Add to the total (expected workload) counters. Deltas may be
    /// negative, e.g. when a file turned out smaller than estimated.
    fn update_data_total(&mut self, items_delta: i64, bytes_delta: i64);

    /// Show a transient status line
    fn update_status(&mut self, text: &str) -> Result<(), CallbackError>;

    /// Append a persistent log entry
    fn log_info(&mut self, text: &str) -> Result<(), CallbackError>;

    /// Present a recoverable error and return the user's decision
    fn report_error(&mut self, info: &ErrorInfo) -> Result<ErrorResponse, CallbackError>;
}

/// The worker-facing reporting surface.
///
/// Counter updates never block and never fail. The text operations are
/// interruption checkpoints: they fail with [`StopRequested`] once
/// cancellation is signaled, and `log_info`/`report_error` may suspend
/// the calling worker until the main thread accepts the request.
pub trait ProgressSink {
    /// Add to the pending processed deltas (lock-free, non-blocking)
    fn update_data_processed(&self, items_delta: i64, bytes_delta: i64);

    /// Add to the pending total deltas (lock-free, non-blocking)
    fn update_data_total(&self, items_delta: i64, bytes_delta: i64);

    /// Replace this worker's status text. Lossy: an unread previous
    /// status is overwritten.
    fn update_status(&self, msg: String) -> Result<(), StopRequested>;

    /// Queue a log line for the main thread. Blocks while a previous
    /// line is still unaccepted, which is what serializes workers behind
    /// a paused main thread.
    fn log_info(&self, msg: String) -> Result<(), StopRequested>;

    /// Log a line and mirror it as this worker's status
    fn report_info(&self, msg: String) -> Result<(), StopRequested> {
        self.log_info(msg.clone())?;
        self.update_status(msg)
    }

    /// Hand a recoverable error to the user and wait for the decision
    fn report_error(&self, info: ErrorInfo) -> Result<ErrorResponse, StopRequested>;
}
