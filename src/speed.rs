//! Sliding-window throughput estimation
//!
//! Feeds the percent/ETA display. The estimator never looks at the
//! clock itself: callers supply elapsed time with each sample, which
//! keeps the arithmetic deterministic under test.

use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct Sample {
    elapsed: Duration,
    items: i64,
    bytes: i64,
}

/// Windowed bytes/items rate estimator.
///
/// Rates are computed between the oldest and newest retained sample;
/// samples falling out of the window are discarded as new ones arrive,
/// so a stalling transfer stops being flattered by its fast start.
#[derive(Debug)]
pub struct SpeedEstimator {
    window: Duration,
    samples: VecDeque<Sample>,
}

impl SpeedEstimator {
    /// Create an estimator keeping samples for the given window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Record cumulative progress observed `elapsed` after the start
    /// of measurement
    pub fn add_sample(&mut self, elapsed: Duration, items: i64, bytes: i64) {
        self.samples.push_back(Sample {
            elapsed,
            items,
            bytes,
        });

        let cutoff = elapsed.saturating_sub(self.window);
        while self.samples.len() > 1 {
            match self.samples.front() {
                Some(oldest) if oldest.elapsed < cutoff => {
                    self.samples.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Current throughput in bytes per second, if measurable
    pub fn bytes_per_sec(&self) -> Option<f64> {
        self.rate(|sample| sample.bytes)
    }

    /// Current throughput in items per second, if measurable
    pub fn items_per_sec(&self) -> Option<f64> {
        self.rate(|sample| sample.items)
    }

    /// Estimated seconds until the given remaining work completes.
    ///
    /// With both dimensions outstanding the larger estimate wins; `None`
    /// while a needed rate is unavailable or zero.
    pub fn remaining_secs(&self, items_remaining: i64, bytes_remaining: i64) -> Option<f64> {
        if items_remaining <= 0 && bytes_remaining <= 0 {
            return Some(0.0);
        }

        let mut estimate: Option<f64> = None;
        if bytes_remaining > 0 {
            let rate = self.bytes_per_sec()?;
            if rate <= 0.0 {
                return None;
            }
            estimate = Some(bytes_remaining as f64 / rate);
        }
        if items_remaining > 0 {
            let rate = self.items_per_sec()?;
            if rate <= 0.0 {
                return None;
            }
            let secs = items_remaining as f64 / rate;
            estimate = Some(estimate.map_or(secs, |current| current.max(secs)));
        }
        estimate
    }

    /// Discard all samples, e.g. to drop warm-up noise
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    fn rate(&self, value: impl Fn(&Sample) -> i64) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let oldest = self.samples.front()?;
        let newest = self.samples.back()?;
        let dt = newest.elapsed.checked_sub(oldest.elapsed)?.as_secs_f64();
        if dt <= 0.0 {
            return None;
        }
        Some((value(newest) - value(oldest)) as f64 / dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_needs_two_samples() {
        let mut speed = SpeedEstimator::new(secs(10));
        assert_eq!(speed.bytes_per_sec(), None);

        speed.add_sample(secs(0), 0, 0);
        assert_eq!(speed.bytes_per_sec(), None);

        speed.add_sample(secs(2), 0, 200);
        assert_eq!(speed.bytes_per_sec(), Some(100.0));
    }

    #[test]
    fn test_window_trims_old_samples() {
        let mut speed = SpeedEstimator::new(secs(10));
        // fast start, then a stall
        speed.add_sample(secs(0), 0, 1_000_000);
        speed.add_sample(secs(12), 0, 1_000_050);
        speed.add_sample(secs(20), 0, 1_000_100);

        // the burst at t=0 has left the window; only the stall remains
        let rate = speed.bytes_per_sec().unwrap();
        assert!(rate < 10.0, "stale burst still visible: {rate}");
    }

    #[test]
    fn test_remaining_secs_bytes_only() {
        let mut speed = SpeedEstimator::new(secs(10));
        speed.add_sample(secs(0), 0, 0);
        speed.add_sample(secs(4), 0, 400);

        assert_eq!(speed.remaining_secs(0, 1000), Some(10.0));
        assert_eq!(speed.remaining_secs(0, 0), Some(0.0));
    }

    #[test]
    fn test_remaining_secs_takes_slower_dimension() {
        let mut speed = SpeedEstimator::new(secs(10));
        speed.add_sample(secs(0), 0, 0);
        speed.add_sample(secs(10), 10, 1000);

        // 100 items at 1/s = 100 s; 1000 bytes at 100/s = 10 s
        assert_eq!(speed.remaining_secs(100, 1000), Some(100.0));
    }

    #[test]
    fn test_zero_rate_is_unknown() {
        let mut speed = SpeedEstimator::new(secs(10));
        speed.add_sample(secs(0), 0, 100);
        speed.add_sample(secs(5), 0, 100);
        assert_eq!(speed.remaining_secs(0, 1000), None);
    }

    #[test]
    fn test_clear() {
        let mut speed = SpeedEstimator::new(secs(10));
        speed.add_sample(secs(0), 0, 0);
        speed.add_sample(secs(1), 0, 50);
        speed.clear();
        assert_eq!(speed.bytes_per_sec(), None);
    }
}
