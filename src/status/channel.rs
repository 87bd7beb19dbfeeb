//! Main/worker request rendezvous
//!
//! One mutex, three condition variables. Workers post log lines and
//! error queries; the main thread services them without delay and
//! otherwise times out at its UI deadline. `log_info` deliberately
//! blocks while a previous line is unaccepted: when the main thread
//! stops draining (pause), every worker queues up behind this choke
//! point on its next log call.
//!
//! All worker-side waits are interruptible: they are sliced to
//! [`STOP_POLL_INTERVAL`](crate::cancel) and re-check the stop token on
//! every wake, the same shutdown-flag polling the rest of the crate
//! uses for blocked workers.

use crate::cancel::{StopToken, STOP_POLL_INTERVAL};
use crate::error::{CallbackError, StopRequested};
use crate::phase::{ErrorInfo, ErrorResponse, PhaseCallback};
use parking_lot::{Condvar, Mutex};
use std::time::Instant;

#[derive(Debug, Default)]
struct PendingRequests {
    log_info: Option<String>,
    error_request: Option<ErrorInfo>,
    error_response: Option<ErrorResponse>,
    finish_now: bool,
}

/// What a main-side service round ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// The finish flag was consumed; no further requests will arrive
    Finished,

    /// The deadline passed; time for a UI tick
    TimedOut,
}

/// The main↔worker communication channel.
#[derive(Debug, Default)]
pub struct RequestChannel {
    state: Mutex<PendingRequests>,
    /// Signaled when a request slot frees up
    ready_for_new_request: Condvar,
    /// Signaled when a worker posts or the finisher fires
    new_request: Condvar,
    /// Signaled when the main thread fills the error response
    have_response: Condvar,
}

impl RequestChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a log line for the main thread, blocking while the slot is
    /// occupied. Worker context.
    pub fn log_info(&self, msg: String, stop: &StopToken) -> Result<(), StopRequested> {
        let mut pending = self.state.lock();
        stop.checkpoint()?;
        while pending.log_info.is_some() {
            self.ready_for_new_request
                .wait_for(&mut pending, STOP_POLL_INTERVAL);
            stop.checkpoint()?;
        }

        pending.log_info = Some(msg);

        drop(pending);
        self.new_request.notify_all();
        Ok(())
    }

    /// Post a recoverable error and wait for the user's decision.
    /// Worker context; strict rendezvous with the main thread.
    pub fn report_error(
        &self,
        info: ErrorInfo,
        stop: &StopToken,
    ) -> Result<ErrorResponse, StopRequested> {
        let mut pending = self.state.lock();
        stop.checkpoint()?;
        while pending.error_request.is_some() || pending.error_response.is_some() {
            self.ready_for_new_request
                .wait_for(&mut pending, STOP_POLL_INTERVAL);
            stop.checkpoint()?;
        }

        pending.error_request = Some(info);
        self.new_request.notify_all();

        let response = loop {
            if let Some(response) = pending.error_response.take() {
                pending.error_request = None;
                break response;
            }
            self.have_response.wait_for(&mut pending, STOP_POLL_INTERVAL);
            stop.checkpoint()?;
        };

        drop(pending);
        // may spuriously wake a log_info waiter; it re-checks its slot
        self.ready_for_new_request.notify_all();
        Ok(response)
    }

    /// Raise the finish flag. Idempotent: calling again is a no-op.
    pub fn notify_all_done(&self) {
        let mut pending = self.state.lock();
        if pending.finish_now {
            return;
        }
        pending.finish_now = true;
        drop(pending);
        self.new_request.notify_all();
    }

    /// Service worker requests until `deadline`. Main context.
    ///
    /// Errors and log lines are forwarded to `cb` as they arrive; a
    /// failure from `cb` propagates immediately, releasing the request
    /// lock on the way out.
    pub fn service_requests(
        &self,
        deadline: Instant,
        cb: &mut dyn PhaseCallback,
    ) -> Result<ServiceOutcome, CallbackError> {
        let mut pending = self.state.lock();
        loop {
            if pending.error_response.is_none() {
                if let Some(info) = pending.error_request.clone() {
                    debug_assert!(!pending.finish_now, "error pending after finish");
                    let response = cb.report_error(&info)?;
                    pending.error_response = Some(response);
                    self.have_response.notify_all();
                }
            }

            if let Some(msg) = pending.log_info.take() {
                cb.log_info(&msg)?;
                // may spuriously wake an error poster; it re-checks
                self.ready_for_new_request.notify_all();
            }

            if pending.finish_now {
                return Ok(ServiceOutcome::Finished);
            }

            if Instant::now() >= deadline {
                return Ok(ServiceOutcome::TimedOut);
            }
            self.new_request.wait_until(&mut pending, deadline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedCallback {
        logs: Vec<String>,
        errors: Vec<ErrorInfo>,
        responses: VecDeque<ErrorResponse>,
    }

    impl PhaseCallback for ScriptedCallback {
        fn update_data_processed(&mut self, _items: i64, _bytes: i64) {}
        fn update_data_total(&mut self, _items: i64, _bytes: i64) {}

        fn update_status(&mut self, _text: &str) -> Result<(), CallbackError> {
            Ok(())
        }

        fn log_info(&mut self, text: &str) -> Result<(), CallbackError> {
            self.logs.push(text.to_owned());
            Ok(())
        }

        fn report_error(&mut self, info: &ErrorInfo) -> Result<ErrorResponse, CallbackError> {
            self.errors.push(info.clone());
            Ok(self.responses.pop_front().unwrap_or(ErrorResponse::Ignore))
        }
    }

    fn drive_until_finished(channel: &RequestChannel, cb: &mut ScriptedCallback) {
        loop {
            let outcome = channel
                .service_requests(Instant::now() + Duration::from_millis(20), cb)
                .expect("callback never fails here");
            if outcome == ServiceOutcome::Finished {
                return;
            }
        }
    }

    #[test]
    fn test_log_info_serialization() {
        let channel = Arc::new(RequestChannel::new());
        let stop = StopToken::new();

        let mut workers = Vec::new();
        for msg in ["alpha", "beta"] {
            let channel = Arc::clone(&channel);
            let stop = stop.clone();
            workers.push(thread::spawn(move || {
                channel.log_info(msg.to_owned(), &stop).expect("not stopped")
            }));
        }

        let finisher = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                // wait for the loggers before raising the finish flag
                thread::sleep(Duration::from_millis(100));
                channel.notify_all_done();
            })
        };

        let mut cb = ScriptedCallback::default();
        drive_until_finished(&channel, &mut cb);

        for worker in workers {
            worker.join().expect("worker panicked");
        }
        finisher.join().expect("finisher panicked");

        let mut logs = cb.logs.clone();
        logs.sort();
        assert_eq!(logs, vec!["alpha".to_owned(), "beta".to_owned()]);
    }

    #[test]
    fn test_error_rendezvous_matches_responses() {
        let channel = Arc::new(RequestChannel::new());
        let stop = StopToken::new();

        // the callback answers retry to the first query, ignore to the
        // second; each worker must receive the answer to its own query
        struct MappingCallback;
        impl PhaseCallback for MappingCallback {
            fn update_data_processed(&mut self, _items: i64, _bytes: i64) {}
            fn update_data_total(&mut self, _items: i64, _bytes: i64) {}
            fn update_status(&mut self, _text: &str) -> Result<(), CallbackError> {
                Ok(())
            }
            fn log_info(&mut self, _text: &str) -> Result<(), CallbackError> {
                Ok(())
            }
            fn report_error(&mut self, info: &ErrorInfo) -> Result<ErrorResponse, CallbackError> {
                Ok(if info.message == "please retry" {
                    ErrorResponse::Retry
                } else {
                    ErrorResponse::Ignore
                })
            }
        }

        let mut workers = Vec::new();
        for (msg, expected) in [
            ("please retry", ErrorResponse::Retry),
            ("please ignore", ErrorResponse::Ignore),
        ] {
            let channel = Arc::clone(&channel);
            let stop = stop.clone();
            workers.push(thread::spawn(move || {
                let response = channel
                    .report_error(ErrorInfo::new(msg, 0), &stop)
                    .expect("not stopped");
                assert_eq!(response, expected);
            }));
        }

        let finisher = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                channel.notify_all_done();
            })
        };

        let mut cb = MappingCallback;
        loop {
            let outcome = channel
                .service_requests(Instant::now() + Duration::from_millis(20), &mut cb)
                .expect("callback never fails here");
            if outcome == ServiceOutcome::Finished {
                break;
            }
        }

        for worker in workers {
            worker.join().expect("worker panicked");
        }
        finisher.join().expect("finisher panicked");
    }

    #[test]
    fn test_blocked_log_info_wakes_on_stop() {
        let channel = Arc::new(RequestChannel::new());
        let stop = StopToken::new();

        // first line fills the slot; nobody is draining
        channel
            .log_info("occupies the slot".into(), &stop)
            .expect("slot was free");

        let blocked = {
            let channel = Arc::clone(&channel);
            let stop = stop.clone();
            thread::spawn(move || channel.log_info("stuck behind it".into(), &stop))
        };

        thread::sleep(Duration::from_millis(50));
        stop.request_stop();

        assert_eq!(blocked.join().expect("worker panicked"), Err(StopRequested));
    }

    #[test]
    fn test_notify_all_done_is_idempotent() {
        let channel = RequestChannel::new();
        channel.notify_all_done();
        channel.notify_all_done();

        let mut cb = ScriptedCallback::default();
        let outcome = channel
            .service_requests(Instant::now() + Duration::from_millis(10), &mut cb)
            .expect("callback never fails here");
        assert_eq!(outcome, ServiceOutcome::Finished);
    }

    #[test]
    fn test_callback_failure_propagates() {
        struct FailingCallback;
        impl PhaseCallback for FailingCallback {
            fn update_data_processed(&mut self, _items: i64, _bytes: i64) {}
            fn update_data_total(&mut self, _items: i64, _bytes: i64) {}
            fn update_status(&mut self, _text: &str) -> Result<(), CallbackError> {
                Ok(())
            }
            fn log_info(&mut self, _text: &str) -> Result<(), CallbackError> {
                Err(CallbackError::Cancelled)
            }
            fn report_error(&mut self, _info: &ErrorInfo) -> Result<ErrorResponse, CallbackError> {
                Ok(ErrorResponse::Ignore)
            }
        }

        let channel = RequestChannel::new();
        let stop = StopToken::new();
        channel.log_info("doomed".into(), &stop).expect("slot free");

        let mut cb = FailingCallback;
        let result = channel.service_requests(Instant::now() + Duration::from_millis(10), &mut cb);
        assert!(matches!(result, Err(CallbackError::Cancelled)));
    }
}
