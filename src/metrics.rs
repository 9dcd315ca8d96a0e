// src/metrics.rs

//! Metric sink consumed by the worker pool.
//!
//! The loader maintains two integer counters for its host: the number of
//! live worker threads and the number of workers currently inside a job
//! function. The host creates the [`Gauge`]s, hands them to
//! [`crate::AsyncLoader::new`], and reads them whenever it likes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A shared integer counter.
///
/// Cloning a `Gauge` yields another handle to the same counter. Reads and
/// updates are atomic and safe from any thread.
#[derive(Debug, Clone, Default)]
pub struct Gauge(Arc<AtomicUsize>);

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter value.
    pub fn value(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
