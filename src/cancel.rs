//! Cooperative cancellation
//!
//! Workers are never killed; they are asked to stop. A [`StopToken`] is
//! a cloneable flag shared between the party requesting the stop and
//! every worker honoring it. Workers discover the request either while
//! blocked on a bounded wait or at an explicit [`StopToken::checkpoint`]
//! after a non-blocking update.

use crate::error::StopRequested;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on how long a blocked worker can miss a stop request.
///
/// Interruptible waits are condition-variable waits sliced to this
/// interval; every wake re-checks the token.
pub(crate) const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared stop flag for cooperative cancellation.
///
/// The flag is monotonic: once requested, a stop cannot be withdrawn.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    /// Create a new token with no stop requested
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask all holders of this token to stop at their next checkpoint
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    /// Check whether a stop has been requested
    pub fn is_stop_requested(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Interruption checkpoint: fails once a stop has been requested
    pub fn checkpoint(&self) -> Result<(), StopRequested> {
        if self.is_stop_requested() {
            Err(StopRequested)
        } else {
            Ok(())
        }
    }
}
