//! Retry/ignore loop around a fallible action
//!
//! The loop has no retry cap on purpose: the user decides through the
//! error rendezvous, as often as they like.

use crate::error::{StopRequested, TaskError};
use crate::phase::{ErrorInfo, ErrorResponse, ProgressSink};
use tracing::warn;

/// How a [`try_reporting`] loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryOutcome<T> {
    /// The action succeeded, possibly after retries
    Completed(T),

    /// The user chose to skip; the message is returned so the caller
    /// can log the skipped outcome
    Ignored(String),
}

impl<T> TryOutcome<T> {
    /// The ignored message, if the user skipped
    pub fn ignored_message(&self) -> Option<&str> {
        match self {
            TryOutcome::Completed(_) => None,
            TryOutcome::Ignored(message) => Some(message),
        }
    }
}

/// Run `action` until it succeeds or the user gives up on it.
///
/// Every failure is handed to the sink's error rendezvous together with
/// its retry count; `Retry` loops, `Ignore` returns the message. A stop
/// request during the rendezvous propagates unchanged.
pub fn try_reporting<T, S, F>(mut action: F, sink: &S) -> Result<TryOutcome<T>, StopRequested>
where
    S: ProgressSink + ?Sized,
    F: FnMut() -> Result<T, TaskError>,
{
    let mut retry_number = 0;
    loop {
        match action() {
            Ok(value) => return Ok(TryOutcome::Completed(value)),
            Err(error) => {
                warn!(retry_number, error = %error, "work item failed, consulting user");
                let message = error.message;
                match sink.report_error(ErrorInfo::new(message.clone(), retry_number))? {
                    ErrorResponse::Retry => retry_number += 1,
                    ErrorResponse::Ignore => return Ok(TryOutcome::Ignored(message)),
                }
            }
        }
    }
}
