//! Named worker-thread pools
//!
//! Each device in a mass-parallel run gets one pool. Tasks are queued
//! over a channel, workers poll it with a bounded timeout so a stop
//! request is never missed for long, and the last worker to exit fires
//! the pool's drained hook exactly once. The hook is registered at
//! construction so no exit path can slip past it.

use crate::cancel::{StopToken, STOP_POLL_INTERVAL};
use crate::error::{PoolError, StopRequested};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// A unit of work submitted to a pool. Returning `Err(StopRequested)`
/// retires the worker that ran it.
pub type PoolTask = Box<dyn FnOnce() -> Result<(), StopRequested> + Send + 'static>;

type DrainedHook = Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>;

/// Fixed-size group of named worker threads over a task queue.
pub struct WorkerPool {
    name: String,
    task_tx: Option<Sender<PoolTask>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads named `"<name> [idx]"`.
    ///
    /// `on_drained` runs on the last worker thread to exit, whether the
    /// queue drained normally or cancellation abandoned it.
    pub fn new(
        workers: usize,
        name: &str,
        stop: StopToken,
        on_drained: impl FnOnce() + Send + 'static,
    ) -> Result<Self, PoolError> {
        let (task_tx, task_rx) = unbounded::<PoolTask>();
        let live_workers = Arc::new(AtomicUsize::new(0));
        let drained: DrainedHook = Arc::new(Mutex::new(Some(Box::new(on_drained))));

        let mut pool = Self {
            name: name.to_owned(),
            task_tx: Some(task_tx),
            handles: Vec::with_capacity(workers),
        };

        for idx in 0..workers {
            let thread_name = format!("{name} [{idx}]");
            live_workers.fetch_add(1, Ordering::SeqCst);

            let task_rx = task_rx.clone();
            let stop = stop.clone();
            let live_workers_for_worker = Arc::clone(&live_workers);
            let drained = Arc::clone(&drained);

            let spawned = thread::Builder::new().name(thread_name.clone()).spawn(
                move || worker_loop(task_rx, stop, live_workers_for_worker, drained),
            );
            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(source) => {
                    live_workers.fetch_sub(1, Ordering::SeqCst);
                    // joins the already-running workers via Drop
                    return Err(PoolError::Spawn {
                        name: thread_name,
                        source,
                    });
                }
            }
        }

        debug!(pool = name, workers, "worker pool started");
        Ok(pool)
    }

    /// Queue a task. Sending only fails when every worker has already
    /// bailed out on a stop request, in which case the task is moot.
    pub fn submit(&self, task: PoolTask) {
        if let Some(task_tx) = &self.task_tx {
            let _ = task_tx.send(task);
        }
    }

    /// Seal the queue: workers finish what is pending and exit.
    pub fn close(&mut self) {
        self.task_tx = None;
    }

    /// Wait for all workers to exit.
    pub fn join(mut self) {
        self.join_workers();
    }

    fn join_workers(&mut self) {
        self.task_tx = None;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!(pool = %self.name, "worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.join_workers();
    }
}

fn worker_loop(
    task_rx: Receiver<PoolTask>,
    stop: StopToken,
    live_workers: Arc<AtomicUsize>,
    drained: DrainedHook,
) {
    trace!("worker started");
    loop {
        match task_rx.recv_timeout(STOP_POLL_INTERVAL) {
            Ok(task) => {
                if task().is_err() {
                    debug!("worker retiring on stop request");
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if stop.is_stop_requested() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if live_workers.fetch_sub(1, Ordering::SeqCst) == 1 {
        if let Some(hook) = drained.lock().take() {
            hook();
        }
    }
    trace!("worker finished");
}

/// Temporarily release a caller-held single-thread lock around a
/// (potentially parallel) sub-operation.
///
/// Callers that serialize workers through `single_thread` use this to
/// enter a genuinely parallel region without deadlocking behind the
/// log-info choke point. The lock is re-acquired before returning on
/// every path; failures travel inside `value` as `Result`s.
pub fn parallel_scope<'a, T>(
    single_thread: &'a Mutex<()>,
    guard: MutexGuard<'a, ()>,
    scoped: impl FnOnce() -> T,
) -> (MutexGuard<'a, ()>, T) {
    drop(guard);
    let value = scoped();
    (single_thread.lock(), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tasks_run_and_drained_hook_fires_once() {
        let ran = Arc::new(AtomicUsize::new(0));
        let drained = Arc::new(AtomicUsize::new(0));

        let drained_count = Arc::clone(&drained);
        let mut pool = WorkerPool::new(2, "test pool", StopToken::new(), move || {
            drained_count.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn failed");

        for _ in 0..8 {
            let ran = Arc::clone(&ran);
            pool.submit(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        pool.close();
        pool.join();

        assert_eq!(ran.load(Ordering::SeqCst), 8);
        assert_eq!(drained.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_idle_workers_exit_on_stop() {
        let stop = StopToken::new();
        let drained = Arc::new(AtomicUsize::new(0));

        let drained_count = Arc::clone(&drained);
        let pool = WorkerPool::new(1, "idle pool", stop.clone(), move || {
            drained_count.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn failed");

        // queue stays open; the worker is idle-polling
        thread::sleep(Duration::from_millis(30));
        stop.request_stop();
        pool.join();

        assert_eq!(drained.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_requested_task_retires_worker() {
        let after = Arc::new(AtomicUsize::new(0));
        let mut pool =
            WorkerPool::new(1, "stopping pool", StopToken::new(), || {}).expect("spawn failed");

        pool.submit(Box::new(|| Err(StopRequested)));
        let after_count = Arc::clone(&after);
        pool.submit(Box::new(move || {
            after_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        pool.close();
        pool.join();

        // the queued task behind the stop never ran
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_parallel_scope_releases_and_reacquires() {
        let single_thread = Mutex::new(());
        let guard = single_thread.lock();

        let (guard, value) = parallel_scope(&single_thread, guard, || {
            // the lock is free inside the scope
            assert!(single_thread.try_lock().is_some());
            7
        });
        assert_eq!(value, 7);

        // and held again afterwards
        assert!(single_thread.try_lock().is_none());
        drop(guard);
        assert!(single_thread.try_lock().is_some());
    }
}
