//! Sub-batch progress of a cached query run.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared counter of sub-batches finished by the current (or last) run.
///
/// Cloning the `Arc` returned by
/// [`CachedQueryInterface::progress`](super::CachedQueryInterface::progress)
/// lets another task watch a long `complete_prompts` call.
#[derive(Debug, Default)]
pub struct BatchProgress {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl BatchProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.completed() >= self.total()
    }

    pub(crate) fn start(&self, total: usize) {
        self.completed.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
    }

    pub(crate) fn advance(&self) -> usize {
        self.completed.fetch_add(1, Ordering::AcqRel) + 1
    }
}
