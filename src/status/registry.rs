//! Per-thread status registry
//!
//! Each active worker task owns one status slot, grouped into priority
//! buckets so the representative message shown to the user follows the
//! natural processing order (bucket 0 first). The worker count is small,
//! so every lookup is a linear scan and the lock region stays tiny: no
//! user code, no I/O, no allocation beyond the slot itself.

use parking_lot::Mutex;
use std::thread::{self, ThreadId};

#[derive(Debug)]
struct ThreadStatus {
    thread_id: ThreadId,
    status_msg: String,
}

/// Priority-ordered collection of per-worker status slots.
///
/// A bucket is "active" iff non-empty; a given thread appears in at most
/// one bucket at a time.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    buckets: Mutex<Vec<Vec<ThreadStatus>>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the calling thread under the given priority bucket,
    /// growing the bucket vector as needed.
    pub fn notify_task_begin(&self, priority: usize) {
        let thread_id = thread::current().id();
        let mut buckets = self.buckets.lock();
        debug_assert!(
            find_entry(&mut buckets, thread_id).is_none(),
            "task begin while already registered"
        );

        if buckets.len() < priority + 1 {
            buckets.resize_with(priority + 1, Vec::new);
        }
        buckets[priority].push(ThreadStatus {
            thread_id,
            status_msg: String::new(),
        });
    }

    /// Remove the calling thread's slot.
    pub fn notify_task_end(&self) {
        let thread_id = thread::current().id();
        let mut buckets = self.buckets.lock();

        for bucket in buckets.iter_mut() {
            if let Some(idx) = bucket
                .iter()
                .position(|entry| entry.thread_id == thread_id)
            {
                bucket.swap_remove(idx);
                return;
            }
        }
        debug_assert!(false, "task end without matching begin");
    }

    /// Overwrite the calling thread's status text.
    ///
    /// Silently drops the message when the thread has no slot; that race
    /// with task-end is benign and expected.
    pub fn update_status(&self, msg: String) {
        let thread_id = thread::current().id();
        let mut buckets = self.buckets.lock();
        if let Some(entry) = find_entry(&mut buckets, thread_id) {
            entry.status_msg = msg;
        }
    }

    /// Representative status for the UI: the first non-empty message in
    /// priority order, prefixed with the active-thread count when two or
    /// more buckets are busy.
    pub fn current_status(&self) -> String {
        let (parallel_ops, status_msg) = {
            let buckets = self.buckets.lock();

            let parallel_ops = buckets.iter().filter(|bucket| !bucket.is_empty()).count();
            let status_msg = buckets
                .iter()
                .flatten()
                .find(|entry| !entry.status_msg.is_empty())
                .map(|entry| entry.status_msg.clone())
                .unwrap_or_default();
            (parallel_ops, status_msg)
        };

        if parallel_ops >= 2 {
            format!("[{parallel_ops} threads] {status_msg}")
        } else {
            status_msg
        }
    }

    /// Number of registered tasks across all buckets.
    pub fn active_task_count(&self) -> usize {
        self.buckets.lock().iter().map(Vec::len).sum()
    }
}

fn find_entry(buckets: &mut [Vec<ThreadStatus>], thread_id: ThreadId) -> Option<&mut ThreadStatus> {
    buckets
        .iter_mut()
        .flatten()
        .find(|entry| entry.thread_id == thread_id)
}
