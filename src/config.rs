//! Runtime configuration for a mass-parallel run
//!
//! This module defines:
//! - The ambient UI tick interval shared by the drive loop and the
//!   percent reporter
//! - `ExecConfig`, the validated executor options

use crate::cancel::StopToken;
use crate::error::ConfigError;
use std::time::Duration;

/// Ambient UI refresh interval. The executor drives the main loop at
/// half this interval, as does the percent reporter's refresh clock.
pub const UI_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum reasonable per-device worker count
const MAX_WORKERS_PER_DEVICE: usize = 64;

/// Options for [`run_workload`](crate::executor::run_workload).
///
/// Valid by construction: the setters reject out-of-range values, so an
/// `ExecConfig` handed to the executor never needs re-validation.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    ui_refresh: Duration,
    workers_per_device: usize,
    stop: StopToken,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            ui_refresh: UI_UPDATE_INTERVAL,
            workers_per_device: 1,
            stop: StopToken::new(),
        }
    }
}

impl ExecConfig {
    /// Create a config with default settings: one worker per device
    /// (serialized device I/O) and the ambient UI tick
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the UI refresh interval. Rejects a zero interval.
    pub fn with_ui_refresh(mut self, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidRefreshInterval {
                millis: interval.as_millis(),
            });
        }
        self.ui_refresh = interval;
        Ok(self)
    }

    /// Set how many worker threads each device pool runs.
    ///
    /// One per device serializes I/O on that device; more is a policy
    /// choice for devices that tolerate concurrent access.
    pub fn with_workers_per_device(mut self, count: usize) -> Result<Self, ConfigError> {
        if count == 0 || count > MAX_WORKERS_PER_DEVICE {
            return Err(ConfigError::InvalidWorkerCount {
                count,
                max: MAX_WORKERS_PER_DEVICE,
            });
        }
        self.workers_per_device = count;
        Ok(self)
    }

    /// Use a caller-held stop token so the run can be cancelled from
    /// outside
    pub fn with_stop_token(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    /// The UI refresh interval
    pub fn ui_refresh(&self) -> Duration {
        self.ui_refresh
    }

    /// Worker threads per device pool
    pub fn workers_per_device(&self) -> usize {
        self.workers_per_device
    }

    /// The stop token governing this run
    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }
}
