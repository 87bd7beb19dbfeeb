//! The shared actor workers report through
//!
//! `AsyncCallback` bundles the lock-free stat deltas, the per-thread
//! status registry and the request rendezvous behind one object. Worker
//! pools hold a shared reference for the duration of a run; the main
//! thread drives [`AsyncCallback::wait_until_done`], which forwards
//! everything to the external phase callback at a bounded rate.

use crate::cancel::StopToken;
use crate::error::{CallbackError, StopRequested};
use crate::phase::{ErrorInfo, ErrorResponse, PhaseCallback, ProgressSink};
use crate::status::channel::{RequestChannel, ServiceOutcome};
use crate::status::registry::StatusRegistry;
use crate::status::stats::StatDeltas;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Actor object bridging many worker threads and one main thread.
#[derive(Debug)]
pub struct AsyncCallback {
    stats: StatDeltas,
    registry: StatusRegistry,
    channel: RequestChannel,
    stop: StopToken,
}

impl AsyncCallback {
    /// Create a callback whose blocking operations honor `stop`
    pub fn new(stop: StopToken) -> Self {
        Self {
            stats: StatDeltas::new(),
            registry: StatusRegistry::new(),
            channel: RequestChannel::new(),
            stop,
        }
    }

    /// The stop token this callback's waits honor
    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Register the calling worker under a status priority.
    /// Worker context; pair with [`AsyncCallback::notify_task_end`].
    pub fn notify_task_begin(&self, priority: usize) {
        self.registry.notify_task_begin(priority);
    }

    /// Unregister the calling worker. Worker context.
    pub fn notify_task_end(&self) {
        self.registry.notify_task_end();
    }

    /// Signal that no further requests will arrive. Idempotent.
    pub fn notify_all_done(&self) {
        self.channel.notify_all_done();
    }

    /// Representative status line for the UI. Main context.
    pub fn current_status(&self) -> String {
        self.registry.current_status()
    }

    /// Number of worker tasks currently registered.
    pub fn active_task_count(&self) -> usize {
        self.registry.active_task_count()
    }

    /// Drive loop: service worker requests without delay and refresh the
    /// UI every `tick_interval` until all workers signal completion.
    /// Main context.
    ///
    /// A failure from `cb` propagates immediately; pending deltas are
    /// drained one final time on the normal path so nothing is lost.
    pub fn wait_until_done(
        &self,
        tick_interval: Duration,
        cb: &mut dyn PhaseCallback,
    ) -> Result<(), CallbackError> {
        loop {
            let deadline = Instant::now() + tick_interval;
            match self.channel.service_requests(deadline, cb)? {
                ServiceOutcome::Finished => {
                    debug!("all workers done, draining final statistics");
                    // one last drain for accurate final statistics
                    self.report_stats(cb);
                    return Ok(());
                }
                ServiceOutcome::TimedOut => {
                    trace!("ui tick");
                    cb.update_status(&self.registry.current_status())?;
                    self.report_stats(cb);
                }
            }
        }
    }

    /// Drain pending deltas and forward the non-zero ones. Main context.
    fn report_stats(&self, cb: &mut dyn PhaseCallback) {
        let (items, bytes) = self.stats.drain_processed();
        if items != 0 || bytes != 0 {
            cb.update_data_processed(items, bytes);
        }
        let (items, bytes) = self.stats.drain_total();
        if items != 0 || bytes != 0 {
            cb.update_data_total(items, bytes);
        }
    }
}

impl ProgressSink for AsyncCallback {
    fn update_data_processed(&self, items_delta: i64, bytes_delta: i64) {
        self.stats.add_processed(items_delta, bytes_delta);
    }

    fn update_data_total(&self, items_delta: i64, bytes_delta: i64) {
        self.stats.add_total(items_delta, bytes_delta);
    }

    fn update_status(&self, msg: String) -> Result<(), StopRequested> {
        self.registry.update_status(msg);
        self.stop.checkpoint()
    }

    fn log_info(&self, msg: String) -> Result<(), StopRequested> {
        self.channel.log_info(msg, &self.stop)
    }

    fn report_error(&self, info: ErrorInfo) -> Result<ErrorResponse, StopRequested> {
        self.channel.report_error(info, &self.stop)
    }
}
