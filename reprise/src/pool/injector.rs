use crate::dispatch::Work;

use parking_lot::{Condvar, Mutex};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long an idle worker sleeps before looking for work again.
const PARK_TIMEOUT: Duration = Duration::from_millis(1);

/// Global work queue of a thread pool.
///
/// Work queued from outside the pool lands here before a worker picks it
/// up. The injector also parks idle workers on a condition variable tied
/// to the queue lock, so a push between "queue is empty" and "go to sleep"
/// cannot be missed.
pub(crate) struct Injector {
    /// Globally injected work.
    queue: Mutex<VecDeque<Work>>,

    /// Wakes parked workers.
    condvar: Condvar,

    /// Set once the pool starts shutting down.
    shutdown: AtomicBool,
}

impl Injector {
    /// Creates an empty injector that is not shut down.
    pub(crate) fn new() -> Self {
        Injector {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Signals shutdown and wakes every parked worker.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);

        let _queue = self.queue.lock();
        self.condvar.notify_all();
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Pushes work to the back of the queue and wakes one worker.
    pub(crate) fn push(&self, work: Work) {
        self.queue.lock().push_back(work);
        self.condvar.notify_one();
    }

    /// Wakes one parked worker so it can steal from a local queue.
    pub(crate) fn notify(&self) {
        let _queue = self.queue.lock();
        self.condvar.notify_one();
    }

    /// Parks the calling worker until work arrives, shutdown is signalled,
    /// or the park timeout elapses.
    pub(crate) fn park(&self) {
        let mut queue = self.queue.lock();

        if self.is_shutdown() || !queue.is_empty() {
            return;
        }

        let _ = self.condvar.wait_for(&mut queue, PARK_TIMEOUT);
    }

    /// Takes work from the front of the queue.
    pub(crate) fn steal(&self) -> Option<Work> {
        self.queue.lock().pop_front()
    }

    /// Removes and returns everything still queued.
    pub(crate) fn drain(&self) -> Vec<Work> {
        self.queue.lock().drain(..).collect()
    }
}
