use super::core::Shared;
use crate::dispatch::Work;

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

thread_local! {
    /// The pool and queue index of the worker running on this thread.
    ///
    /// Lets `queue_work_item(.., prefer_local = true)` find the caller's
    /// local queue without passing handles around.
    static CURRENT_WORKER: RefCell<Option<(Arc<Shared>, usize)>> = const { RefCell::new(None) };
}

/// Pushes `work` onto the calling worker's local queue if the caller is a
/// worker of the pool identified by `pool_id`.
///
/// Hands the work back otherwise.
pub(crate) fn try_push_local(pool_id: usize, work: Work) -> Result<(), Work> {
    CURRENT_WORKER.with(|cell| match cell.borrow().as_ref() {
        Some((shared, index)) if shared.id == pool_id => {
            shared.locals[*index].push(work);
            shared.injector.notify();
            Ok(())
        }
        _ => Err(work),
    })
}

/// Returns `true` if the calling thread is a worker of the pool identified
/// by `pool_id`.
pub(crate) fn is_worker_of(pool_id: usize) -> bool {
    CURRENT_WORKER.with(|cell| {
        cell.borrow()
            .as_ref()
            .is_some_and(|(shared, _)| shared.id == pool_id)
    })
}

/// A worker thread of a [`ThreadPool`](super::ThreadPool).
///
/// The execution order is:
/// 1. Pop from the local queue
/// 2. Steal from the global injector
/// 3. Steal from other workers
/// 4. Park if no work is available
pub(crate) struct Worker {
    /// Index of this worker's local queue.
    id: usize,

    /// State shared by all workers of the pool.
    shared: Arc<Shared>,
}

impl Worker {
    /// Creates the worker owning local queue `id` of `shared`.
    ///
    /// # Arguments
    ///
    /// * `id` - Index of the worker, and of its local queue.
    /// * `shared` - State shared with the pool handle and the other workers.
    pub(crate) fn new(id: usize, shared: Arc<Shared>) -> Self {
        Self { id, shared }
    }

    /// Runs the worker loop until the pool shuts down.
    pub(crate) fn run(self) {
        CURRENT_WORKER.with(|cell| *cell.borrow_mut() = Some((self.shared.clone(), self.id)));

        tracing::debug!(pool = self.shared.id, worker = self.id, "worker started");

        while !self.shared.injector.is_shutdown() {
            let next = self.shared.locals[self.id]
                .pop()
                .or_else(|| self.shared.injector.steal())
                .or_else(|| self.try_steal());

            match next {
                Some(work) => self.execute(work),
                None => self.shared.injector.park(),
            }
        }

        CURRENT_WORKER.with(|cell| *cell.borrow_mut() = None);

        tracing::debug!(pool = self.shared.id, worker = self.id, "worker stopped");
    }

    /// Runs one work item, containing any panic to that item.
    fn execute(&self, work: Work) {
        if panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
            tracing::error!(
                pool = self.shared.id,
                worker = self.id,
                "work item panicked; worker continues"
            );
        }
    }

    /// Attempts to steal from another worker's local queue.
    ///
    /// Victims are visited round-robin starting after this worker, so
    /// that idle workers spread their steals.
    fn try_steal(&self) -> Option<Work> {
        let len = self.shared.locals.len();

        if len <= 1 {
            return None;
        }

        (1..len)
            .map(|offset| (self.id + offset) % len)
            .find_map(|victim| self.shared.locals[victim].steal())
    }
}
