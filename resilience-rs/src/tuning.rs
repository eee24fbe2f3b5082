//! Process-wide tuning parameters adjusted by recovery actions.
//!
//! Both values are atomics: recovery writes them in place and every
//! generation/search invocation reads the live value.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use metrics::gauge;
use serde::Serialize;

#[derive(Debug)]
pub struct TuningState {
    search_timeout_secs: AtomicU64,
    worker_threads: AtomicUsize,
}

/// Point-in-time copy of [`TuningState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TuningSnapshot {
    pub search_timeout_secs: u64,
    pub worker_threads: usize,
}

impl TuningState {
    /// The worker count is floored at one.
    pub fn new(search_timeout_secs: u64, worker_threads: usize) -> Self {
        Self {
            search_timeout_secs: AtomicU64::new(search_timeout_secs),
            worker_threads: AtomicUsize::new(worker_threads.max(1)),
        }
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs())
    }

    pub fn search_timeout_secs(&self) -> u64 {
        self.search_timeout_secs.load(Ordering::SeqCst)
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads.load(Ordering::SeqCst)
    }

    /// Adds `secs` to the search timeout, returning the new value
    pub fn extend_search_timeout(&self, secs: u64) -> u64 {
        let updated = self.search_timeout_secs.fetch_add(secs, Ordering::SeqCst) + secs;
        gauge!("resilience_search_timeout_seconds", updated as f64);
        updated
    }

    /// Drops one worker thread, never below one. Returns the new value.
    pub fn shed_worker_thread(&self) -> usize {
        let previous = self
            .worker_threads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1).max(1)))
            .unwrap_or_else(|current| current);
        let updated = previous.saturating_sub(1).max(1);
        gauge!("resilience_worker_threads", updated as f64);
        updated
    }

    pub fn snapshot(&self) -> TuningSnapshot {
        TuningSnapshot {
            search_timeout_secs: self.search_timeout_secs(),
            worker_threads: self.worker_threads(),
        }
    }
}
