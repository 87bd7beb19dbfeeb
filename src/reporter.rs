//! Scoped per-item statistics reporting
//!
//! [`ItemStatReporter`] manages the counters for a single work item and
//! reconciles the workload estimate when the item's scope ends, so the
//! UI fraction stays meaningful whether the item finished, failed or
//! was cancelled. [`PercentReporter`] layers a debounced percent/ETA
//! status display on top, with hysteresis so tiny or short transfers
//! never flicker a percentage at the user.

use crate::error::StopRequested;
use crate::phase::ProgressSink;
use crate::speed::SpeedEstimator;
use humansize::{format_size, BINARY};
use std::time::{Duration, Instant};
use tracing::debug;

/// Minimum elapsed time before a percent display is even considered
pub const PERCENT_DELAY: Duration = Duration::from_secs(2);

/// Transfers estimated to finish sooner than this never show a percent
pub const PERCENT_MIN_DURATION: Duration = Duration::from_secs(3);

/// Desired display-change rate; picks the decimal precision
pub const PERCENT_MIN_CHANGES_PER_SEC: u32 = 2;

/// Sliding-window width of the bytes/sec estimator
pub const PERCENT_SPEED_WINDOW: Duration = Duration::from_secs(10);

/// Half the ambient UI tick ([`crate::config::UI_UPDATE_INTERVAL`])
const PERCENT_REFRESH_INTERVAL: Duration = Duration::from_millis(50);

/// Statistics scope for one item of work.
///
/// Forwards processed deltas as they happen and corrects the total
/// estimate when the scope ends. The scope defaults to the failure
/// branch; call [`ItemStatReporter::complete`] at the end of the happy
/// path.
///
/// On a completed scope the total is adjusted by `reported - expected`
/// (negative for smaller-than-estimated files, or files that shrank in
/// flight). On a failed or cancelled scope the reported amount is added
/// to the total instead: the work already done becomes extra workload
/// while the original estimate stays accounted.
#[derive(Debug)]
pub struct ItemStatReporter<'a, S: ProgressSink + ?Sized> {
    items_expected: i64,
    bytes_expected: i64,
    items_reported: i64,
    bytes_reported: i64,
    completed: bool,
    sink: &'a S,
}

impl<'a, S: ProgressSink + ?Sized> ItemStatReporter<'a, S> {
    pub fn new(items_expected: i64, bytes_expected: i64, sink: &'a S) -> Self {
        Self {
            items_expected,
            bytes_expected,
            items_reported: 0,
            bytes_reported: 0,
            completed: false,
            sink,
        }
    }

    /// Pass a status line through to the sink
    pub fn update_status(&self, msg: String) -> Result<(), StopRequested> {
        self.sink.update_status(msg)
    }

    /// Report progress on this item. Never blocks, never fails.
    ///
    /// Amounts beyond the expected value also grow the total estimate
    /// immediately, keeping the displayed fraction at or below 100%
    /// while the scope is still live.
    pub fn report_delta(&mut self, items_delta: i64, bytes_delta: i64) {
        self.sink.update_data_processed(items_delta, bytes_delta);
        self.items_reported += items_delta;
        self.bytes_reported += bytes_delta;

        if self.items_reported > self.items_expected {
            self.sink
                .update_data_total(self.items_reported - self.items_expected, 0);
            self.items_reported = self.items_expected;
        }
        if self.bytes_reported > self.bytes_expected {
            self.sink
                .update_data_total(0, self.bytes_reported - self.bytes_expected);
            self.bytes_reported = self.bytes_expected;
        }
    }

    /// Bytes reported so far, clamped to the expected amount
    pub fn bytes_reported(&self) -> i64 {
        self.bytes_reported
    }

    /// The expected byte count captured at construction
    pub fn bytes_expected(&self) -> i64 {
        self.bytes_expected
    }

    /// Mark the happy-path exit; the drop reconciliation then corrects
    /// the total by the actual-vs-estimated difference
    pub fn complete(mut self) {
        self.completed = true;
    }
}

impl<S: ProgressSink + ?Sized> Drop for ItemStatReporter<'_, S> {
    fn drop(&mut self) {
        if self.completed {
            self.sink.update_data_total(
                self.items_reported - self.items_expected,
                self.bytes_reported - self.bytes_expected,
            );
        } else {
            self.sink
                .update_data_total(self.items_reported, self.bytes_reported);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PercentDisplay {
    /// Still deciding whether a percentage is worth showing
    Pending,
    /// Latched on: refresh the percent string every interval
    Shown,
    /// Latched off for the rest of this item
    Suppressed,
}

/// Percent/ETA status display for a single `(1 item, n bytes)` transfer.
///
/// The percentage only appears once the transfer has run for
/// [`PERCENT_DELAY`] *and* is estimated to keep running longer than
/// [`PERCENT_MIN_DURATION`]; short transfers finish without one. The
/// decision latches either way.
#[derive(Debug)]
pub struct PercentReporter<'a, S: ProgressSink + ?Sized> {
    msg_prefix: String,
    display: PercentDisplay,
    start_time: Option<Instant>,
    last_refresh: Option<Instant>,
    speed: SpeedEstimator,
    stats: ItemStatReporter<'a, S>,
}

impl<'a, S: ProgressSink + ?Sized> PercentReporter<'a, S> {
    /// Post `status_msg` immediately and begin tracking a transfer of
    /// `bytes_expected` bytes
    pub fn new(
        status_msg: String,
        bytes_expected: i64,
        sink: &'a S,
    ) -> Result<Self, StopRequested> {
        let stats = ItemStatReporter::new(1, bytes_expected, sink);
        stats.update_status(status_msg.clone())?;

        Ok(Self {
            msg_prefix: format!("{status_msg}... "),
            display: PercentDisplay::Pending,
            start_time: None,
            last_refresh: None,
            speed: SpeedEstimator::new(PERCENT_SPEED_WINDOW),
            stats,
        })
    }

    /// Report progress and refresh the status display when due
    pub fn report_delta(
        &mut self,
        items_delta: i64,
        bytes_delta: i64,
    ) -> Result<(), StopRequested> {
        self.stats.report_delta(items_delta, bytes_delta);
        self.refresh(Instant::now())
    }

    /// Replace the status line, e.g. for a sub-step of the transfer
    pub fn update_status(&self, msg: String) -> Result<(), StopRequested> {
        self.stats.update_status(msg)
    }

    /// Mark the happy-path exit of the underlying stat scope
    pub fn complete(self) {
        self.stats.complete();
    }

    fn refresh(&mut self, now: Instant) -> Result<(), StopRequested> {
        if self
            .last_refresh
            .is_some_and(|last| now < last + PERCENT_REFRESH_INTERVAL)
        {
            return Ok(());
        }
        self.last_refresh = Some(now);

        let bytes_copied = self.stats.bytes_reported();
        let bytes_total = self.stats.bytes_expected();

        // two independent checks: when the first one latches the display
        // on, the second already runs on this same refresh
        if self.display == PercentDisplay::Pending && bytes_copied > 0 {
            match self.start_time {
                None => {
                    // timing from the first observed byte gives cleaner
                    // rates than timing from construction
                    self.start_time = Some(now);
                    self.speed.add_sample(Duration::ZERO, 0, bytes_copied);
                }
                Some(start) => {
                    let elapsed = now - start;
                    if elapsed >= PERCENT_DELAY {
                        self.speed.add_sample(elapsed, 0, bytes_copied);
                        if let Some(remaining) =
                            self.speed.remaining_secs(0, bytes_total - bytes_copied)
                        {
                            if remaining > PERCENT_MIN_DURATION.as_secs_f64() {
                                debug!(remaining_secs = remaining, "showing percent display");
                                self.display = PercentDisplay::Shown;
                                self.speed.clear(); // warm-up numbers are noise
                            } else {
                                debug!(remaining_secs = remaining, "suppressing percent display");
                                self.display = PercentDisplay::Suppressed;
                            }
                        }
                    }
                }
            }
        }
        if self.display == PercentDisplay::Shown {
            if let Some(start) = self.start_time {
                self.speed.add_sample(now - start, 0, bytes_copied);
            }
            let bytes_per_sec = self.speed.bytes_per_sec().unwrap_or(0.0);
            let fraction = if bytes_total > 0 {
                (bytes_copied as f64 / bytes_total as f64).min(1.0)
            } else {
                1.0
            };
            let status = format!(
                "{}{}",
                self.msg_prefix,
                format_percent(fraction, bytes_per_sec, bytes_total)
            );
            self.stats.update_status(status)?;
        }
        Ok(())
    }
}

/// Pick the decimal count so the displayed value changes at roughly
/// [`PERCENT_MIN_CHANGES_PER_SEC`] at the current throughput.
fn format_percent(fraction: f64, bytes_per_sec: f64, bytes_total: i64) -> String {
    let total_secs = if bytes_per_sec > 0.0 {
        bytes_total as f64 / bytes_per_sec
    } else {
        0.0
    };
    let expected_steps = total_secs * f64::from(PERCENT_MIN_CHANGES_PER_SEC);

    let decimals = if expected_steps <= 100.0 {
        0
    } else if expected_steps <= 1000.0 {
        1
    } else if expected_steps <= 10_000.0 {
        2
    } else {
        3
    };

    format!(
        "{:.*}% ({}/s)",
        decimals,
        fraction * 100.0,
        format_size(bytes_per_sec.max(0.0) as u64, BINARY)
    )
}
