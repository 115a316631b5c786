use crate::dispatch::Work;

use parking_lot::Mutex;

use std::collections::VecDeque;

/// A per-worker local queue.
///
/// The owning worker pushes and pops at the back (LIFO), which keeps
/// recently queued continuations hot in that worker's cache. Other workers
/// steal from the front (FIFO).
pub(crate) struct LocalQueue {
    inner: Mutex<VecDeque<Work>>,
}

impl LocalQueue {
    /// Creates an empty queue.
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Pushes work at the back. Owner only.
    pub(crate) fn push(&self, work: Work) {
        self.inner.lock().push_back(work);
    }

    /// Pops the most recently pushed work. Owner only.
    pub(crate) fn pop(&self) -> Option<Work> {
        self.inner.lock().pop_back()
    }

    /// Takes the oldest work, for a worker that ran out of its own.
    pub(crate) fn steal(&self) -> Option<Work> {
        self.inner.lock().pop_front()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Removes and returns everything still queued.
    pub(crate) fn drain(&self) -> Vec<Work> {
        self.inner.lock().drain(..).collect()
    }
}
