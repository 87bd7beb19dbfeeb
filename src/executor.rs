//! Mass-parallel execution across devices
//!
//! Fans a workload out to one worker pool per target device (I/O on a
//! device is serialized by default) and drives the shared
//! [`AsyncCallback`] from the calling thread until every pool has
//! drained. Device buckets keep their first-seen order, which also
//! fixes each pool's status priority: the earliest device's status wins
//! the UI line.

use crate::config::ExecConfig;
#[cfg(test)]
use crate::cancel::StopToken;
use crate::error::{ExecuteError, StopRequested};
use crate::phase::PhaseCallback;
use crate::pool::WorkerPool;
use crate::status::AsyncCallback;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Opaque device key supplied by the I/O layer; used only for grouping
/// and for naming the per-device worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of a work item: the device it lives on plus the device-relative
/// path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPath {
    pub device: DeviceKey,
    pub rel_path: String,
}

impl ItemPath {
    pub fn new(device: DeviceKey, rel_path: impl Into<String>) -> Self {
        Self {
            device,
            rel_path: rel_path.into(),
        }
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.device, self.rel_path)
    }
}

/// What a work item gets to run with: its own path and the shared
/// reporting actor.
pub struct ParallelContext {
    pub item_path: ItemPath,
    pub acb: Arc<AsyncCallback>,
}

/// A single unit of parallel work. Recoverable failures are the item's
/// own business (see [`try_reporting`](crate::retry::try_reporting));
/// only the cancellation signal escapes.
pub type ParallelWorkItem = Box<dyn FnOnce(ParallelContext) -> Result<(), StopRequested> + Send>;

/// The full workload of a run
pub type Workload = Vec<(ItemPath, ParallelWorkItem)>;

/// Pairs `notify_task_begin` with a guaranteed `notify_task_end`, on
/// cancellation unwinds included.
struct TaskGuard<'a> {
    acb: &'a AsyncCallback,
}

impl<'a> TaskGuard<'a> {
    fn begin(acb: &'a AsyncCallback, priority: usize) -> Self {
        acb.notify_task_begin(priority);
        Self { acb }
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.acb.notify_task_end();
    }
}

/// Run a workload with one worker pool per device, reporting through
/// `callback` until everything has drained.
///
/// The calling thread becomes the main thread of the run: it services
/// log and error requests without delay and refreshes the UI at half
/// the configured interval. An error raised by `callback` aborts the
/// run; the remaining workers unwind via the stop token and are joined
/// before the error is returned.
pub fn run_workload(
    workload: Workload,
    group_name: &str,
    callback: &mut dyn PhaseCallback,
    config: &ExecConfig,
) -> Result<(), ExecuteError> {
    let mut per_device: Vec<(DeviceKey, Vec<(ItemPath, ParallelWorkItem)>)> = Vec::new();
    for (item_path, work) in workload {
        match per_device
            .iter_mut()
            .find(|(device, _)| *device == item_path.device)
        {
            Some((_, items)) => items.push((item_path, work)),
            None => {
                let device = item_path.device.clone();
                per_device.push((device, vec![(item_path, work)]));
            }
        }
    }

    if per_device.is_empty() {
        return Ok(()); // nothing would ever raise the finish flag
    }

    let stop = config.stop_token().clone();
    let acb = Arc::new(AsyncCallback::new(stop.clone()));
    let active_devices = Arc::new(AtomicUsize::new(per_device.len()));

    info!(
        group = group_name,
        devices = per_device.len(),
        "starting per-device worker pools"
    );

    let mut pools = Vec::with_capacity(per_device.len());
    for (priority, (device, items)) in per_device.into_iter().enumerate() {
        let pool_name = format!("{group_name} {device}");
        debug!(device = %device, priority, items = items.len(), "spawning device pool");

        let acb_for_hook = Arc::clone(&acb);
        let active_for_hook = Arc::clone(&active_devices);
        let created = WorkerPool::new(
            config.workers_per_device(),
            &pool_name,
            stop.clone(),
            move || {
                if active_for_hook.fetch_sub(1, Ordering::SeqCst) == 1 {
                    acb_for_hook.notify_all_done();
                }
            },
        );
        let mut pool = match created {
            Ok(pool) => pool,
            Err(err) => {
                stop.request_stop();
                // the pools created so far join on drop
                return Err(err.into());
            }
        };

        for (item_path, work) in items {
            let acb_for_task = Arc::clone(&acb);
            pool.submit(Box::new(move || {
                let _task = TaskGuard::begin(&acb_for_task, priority);
                work(ParallelContext {
                    item_path,
                    acb: Arc::clone(&acb_for_task),
                })
            }));
        }
        pool.close();
        pools.push(pool);
    }

    let tick = (config.ui_refresh() / 2).max(Duration::from_millis(1));
    let result = acb.wait_until_done(tick, callback);
    if result.is_err() {
        // unblock workers still waiting on the rendezvous
        stop.request_stop();
    }
    for pool in pools {
        pool.join();
    }
    result.map_err(ExecuteError::Callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallbackError;
    use crate::phase::{ErrorInfo, ErrorResponse, ProgressSink};
    use parking_lot::Mutex;
    use std::thread;
    use std::time::Instant;

    #[derive(Default)]
    struct RecordingCallback {
        processed: Vec<(i64, i64)>,
        statuses: Vec<String>,
        logs: Vec<String>,
        fail_status_updates: bool,
    }

    impl PhaseCallback for RecordingCallback {
        fn update_data_processed(&mut self, items: i64, bytes: i64) {
            self.processed.push((items, bytes));
        }

        fn update_data_total(&mut self, _items: i64, _bytes: i64) {}

        fn update_status(&mut self, text: &str) -> Result<(), CallbackError> {
            if self.fail_status_updates {
                return Err(CallbackError::Cancelled);
            }
            self.statuses.push(text.to_owned());
            Ok(())
        }

        fn log_info(&mut self, text: &str) -> Result<(), CallbackError> {
            self.logs.push(text.to_owned());
            Ok(())
        }

        fn report_error(&mut self, _info: &ErrorInfo) -> Result<ErrorResponse, CallbackError> {
            Ok(ErrorResponse::Ignore)
        }
    }

    fn item(
        device: &str,
        rel_path: &str,
        work: impl FnOnce(ParallelContext) -> Result<(), StopRequested> + Send + 'static,
    ) -> (ItemPath, ParallelWorkItem) {
        (
            ItemPath::new(DeviceKey::new(device), rel_path),
            Box::new(work),
        )
    }

    #[test]
    fn test_empty_workload_returns_immediately() {
        let mut cb = RecordingCallback::default();
        let started = Instant::now();
        run_workload(Vec::new(), "sync", &mut cb, &ExecConfig::new()).expect("empty workload");

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(cb.processed.is_empty());
        assert!(cb.statuses.is_empty());
        assert!(cb.logs.is_empty());
    }

    #[test]
    fn test_same_device_runs_serially() {
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let order_a1 = Arc::clone(&order);
        let order_a2 = Arc::clone(&order);
        let order_b1 = Arc::clone(&order);
        let workload: Workload = vec![
            item("usb:1", "/a1", move |_ctx| {
                order_a1.lock().push("a1");
                thread::sleep(Duration::from_millis(40));
                order_a1.lock().push("a1 done");
                Ok(())
            }),
            item("usb:1", "/a2", move |_ctx| {
                order_a2.lock().push("a2");
                Ok(())
            }),
            item("nas:9", "/b1", move |_ctx| {
                order_b1.lock().push("b1");
                Ok(())
            }),
        ];

        let mut cb = RecordingCallback::default();
        run_workload(workload, "sync", &mut cb, &ExecConfig::new()).expect("run failed");

        let order = order.lock();
        let position = |tag: &str| order.iter().position(|entry| *entry == tag).unwrap();
        // device usb:1 is serialized: a2 only starts after a1 finished
        assert!(position("a1 done") < position("a2"), "order: {order:?}");
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_counters_and_logs_reach_the_callback() {
        let workload: Workload = vec![item("usb:1", "/f", |ctx| {
            ctx.acb.update_data_processed(3, 100);
            ctx.acb.update_data_processed(2, 50);
            ctx.acb.log_info(format!("synced {}", ctx.item_path))?;
            Ok(())
        })];

        let mut cb = RecordingCallback::default();
        run_workload(workload, "sync", &mut cb, &ExecConfig::new()).expect("run failed");

        let (items, bytes) = cb
            .processed
            .iter()
            .fold((0, 0), |(i, b), (di, db)| (i + di, b + db));
        assert_eq!((items, bytes), (5, 150));
        assert_eq!(cb.logs, vec!["synced usb:1/f".to_owned()]);
    }

    #[test]
    fn test_callback_failure_aborts_and_unwinds_workers() {
        let stop = StopToken::new();
        let workload: Workload = vec![item("usb:1", "/slow", |ctx| {
            loop {
                ctx.acb.update_status("still going".into())?;
                thread::sleep(Duration::from_millis(5));
            }
        })];

        let mut cb = RecordingCallback {
            fail_status_updates: true,
            ..RecordingCallback::default()
        };
        let config = ExecConfig::new().with_stop_token(stop.clone());
        let result = run_workload(workload, "sync", &mut cb, &config);

        assert!(matches!(
            result,
            Err(ExecuteError::Callback(CallbackError::Cancelled))
        ));
        // run_workload requested the stop to unwind the looping worker
        assert!(stop.is_stop_requested());
    }

    #[test]
    fn test_external_stop_cancels_the_run() {
        let stop = StopToken::new();
        let canceller = {
            let stop = stop.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                stop.request_stop();
            })
        };

        let workload: Workload = vec![item("usb:1", "/endless", |ctx| {
            loop {
                ctx.acb.update_status("copying forever".into())?;
                thread::sleep(Duration::from_millis(5));
            }
        })];

        let mut cb = RecordingCallback::default();
        let config = ExecConfig::new().with_stop_token(stop.clone());
        run_workload(workload, "sync", &mut cb, &config).expect("cancellation is not an error");
        canceller.join().expect("canceller panicked");
    }
}
