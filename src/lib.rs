//! progress-relay - Concurrent Progress and Error Reporting Core
//!
//! The layer between many parallel I/O worker threads and a single
//! user-facing observer. Workers stream processed-item counters,
//! per-thread status text, log messages and recoverable-error queries
//! into a shared actor; the main thread drains it at a controlled rate,
//! refreshes the UI, and answers error queries with the user's
//! retry/ignore decision.
//!
//! # Features
//!
//! - **Lock-free counters**: workers post signed deltas into atomics;
//!   the main thread drains them without ever losing a concurrent
//!   increment.
//!
//! - **Bounded UI rate**: the main thread wakes at least once per tick
//!   to refresh status and statistics, while log and error requests are
//!   serviced without delay.
//!
//! - **Per-device scheduling**: a workload fans out to one worker pool
//!   per target device, serializing I/O on each device by default.
//!
//! - **Honest totals**: scoped per-item reporters reconcile the
//!   workload estimate on success, failure and cancellation, so the
//!   displayed fraction never lies past 100%.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Worker Pools (per device)                │
//! │  ┌──────────┐      ┌──────────┐            ┌──────────┐      │
//! │  │ device A │      │ device B │    ...     │ device N │      │
//! │  └────┬─────┘      └────┬─────┘            └────┬─────┘      │
//! │       │ counters / status / log / error         │            │
//! │       ▼                 ▼                       ▼            │
//! │  ┌────────────────────────────────────────────────────┐      │
//! │  │                   AsyncCallback                    │      │
//! │  │  StatDeltas (atomics) · StatusRegistry (lock) ·    │      │
//! │  │  RequestChannel (condition variables)              │      │
//! │  └─────────────────────────┬──────────────────────────┘      │
//! └────────────────────────────┼─────────────────────────────────┘
//!                              │ wait_until_done (tick loop)
//!                              ▼
//!                    ┌──────────────────┐
//!                    │  PhaseCallback   │
//!                    │  (UI / logger)   │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use progress_relay::{
//!     run_workload, DeviceKey, ExecConfig, ItemPath, ProgressSink, Workload,
//! };
//! # use progress_relay::{CallbackError, ErrorInfo, ErrorResponse, PhaseCallback};
//! # struct Ui;
//! # impl PhaseCallback for Ui {
//! #     fn update_data_processed(&mut self, _: i64, _: i64) {}
//! #     fn update_data_total(&mut self, _: i64, _: i64) {}
//! #     fn update_status(&mut self, _: &str) -> Result<(), CallbackError> { Ok(()) }
//! #     fn log_info(&mut self, _: &str) -> Result<(), CallbackError> { Ok(()) }
//! #     fn report_error(&mut self, _: &ErrorInfo) -> Result<ErrorResponse, CallbackError> {
//! #         Ok(ErrorResponse::Ignore)
//! #     }
//! # }
//!
//! let workload: Workload = vec![(
//!     ItemPath::new(DeviceKey::new("usb:1"), "/photos/a.jpg"),
//!     Box::new(|ctx| {
//!         ctx.acb.update_data_processed(1, 2048);
//!         ctx.acb.log_info(format!("synced {}", ctx.item_path))
//!     }),
//! )];
//!
//! let mut ui = Ui;
//! run_workload(workload, "sync", &mut ui, &ExecConfig::new())?;
//! # Ok::<(), progress_relay::ExecuteError>(())
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod executor;
pub mod phase;
pub mod pool;
pub mod reporter;
pub mod retry;
pub mod speed;
pub mod status;

pub use cancel::StopToken;
pub use config::{ExecConfig, UI_UPDATE_INTERVAL};
pub use error::{
    CallbackError, ConfigError, ExecuteError, ExecuteResult, PoolError, StopRequested, TaskError,
};
pub use executor::{
    run_workload, DeviceKey, ItemPath, ParallelContext, ParallelWorkItem, Workload,
};
pub use phase::{ErrorInfo, ErrorResponse, PhaseCallback, ProgressSink};
pub use pool::{parallel_scope, WorkerPool};
pub use reporter::{ItemStatReporter, PercentReporter};
pub use retry::{try_reporting, TryOutcome};
pub use speed::SpeedEstimator;
pub use status::AsyncCallback;
