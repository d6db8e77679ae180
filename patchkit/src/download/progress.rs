//! Progress accounting for download sessions.
//!
//! Counters are atomics so in-flight requests can report streamed bytes
//! without going through the scheduler loop.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Point-in-time view of a session's progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionProgress {
    pub downloaded_count: usize,
    pub total_task_count: usize,
    /// Bytes of completed files plus bytes streamed by requests in flight.
    pub downloaded_bytes: u64,
    pub total_task_size: u64,
}

impl SessionProgress {
    /// Whether the session has anything to fetch.
    pub fn needs_download(&self) -> bool {
        self.total_task_count > 0
    }

    /// Progress as a percentage.
    ///
    /// Falls back to file-based progress if the total size is unknown.
    pub fn percent(&self) -> f64 {
        if self.total_task_size == 0 {
            if self.total_task_count == 0 {
                100.0
            } else {
                (self.downloaded_count as f64 / self.total_task_count as f64) * 100.0
            }
        } else {
            let bytes = self.downloaded_bytes.min(self.total_task_size);
            (bytes as f64 / self.total_task_size as f64) * 100.0
        }
    }
}

/// Progress callback invoked as bytes arrive and as files complete.
pub type ProgressCallback = Arc<dyn Fn(&SessionProgress) + Send + Sync>;

/// Shared progress counters for a session.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    total_task_count: AtomicUsize,
    total_task_size: AtomicU64,
    downloaded_count: AtomicUsize,
    completed_bytes: AtomicU64,
    in_flight_bytes: AtomicU64,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new session with the given totals.
    pub fn reset(&self, total_task_count: usize, total_task_size: u64) {
        self.total_task_count
            .store(total_task_count, Ordering::SeqCst);
        self.total_task_size.store(total_task_size, Ordering::SeqCst);
        self.downloaded_count.store(0, Ordering::SeqCst);
        self.completed_bytes.store(0, Ordering::SeqCst);
        self.in_flight_bytes.store(0, Ordering::SeqCst);
    }

    pub fn add_in_flight(&self, bytes: u64) {
        self.in_flight_bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Forgets bytes streamed by a request that has ended.
    pub fn remove_in_flight(&self, bytes: u64) {
        let _ = self
            .in_flight_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    /// Records a completed file.
    pub fn record_success(&self, bytes: u64) {
        self.downloaded_count.fetch_add(1, Ordering::SeqCst);
        self.completed_bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> SessionProgress {
        SessionProgress {
            downloaded_count: self.downloaded_count.load(Ordering::SeqCst),
            total_task_count: self.total_task_count.load(Ordering::SeqCst),
            downloaded_bytes: self.completed_bytes.load(Ordering::SeqCst)
                + self.in_flight_bytes.load(Ordering::SeqCst),
            total_task_size: self.total_task_size.load(Ordering::SeqCst),
        }
    }
}
