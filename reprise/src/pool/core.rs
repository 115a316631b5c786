use super::WorkPool;
use super::injector::Injector;
use super::queue::LocalQueue;
use super::worker::{self, Worker};
use crate::dispatch::{Scheduler, Work};

use parking_lot::Mutex;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

/// State shared by a pool handle and its workers.
pub(crate) struct Shared {
    /// Process-unique pool identifier, used to match a worker to its pool.
    pub(crate) id: usize,

    /// Global queue for work queued from outside the pool.
    pub(crate) injector: Injector,

    /// One local queue per worker.
    pub(crate) locals: Vec<LocalQueue>,
}

/// A multi-threaded, work-stealing pool.
///
/// `ThreadPool` is responsible for:
/// - spawning its worker threads,
/// - routing queued work to the global injector or, for local-preferring
///   work queued from a worker, to that worker's own queue,
/// - containing panics raised by work items,
/// - orderly shutdown and thread joining when dropped.
///
/// Build one with [`ThreadPoolBuilder`](super::ThreadPoolBuilder).
pub struct ThreadPool {
    /// State shared with the workers.
    shared: Arc<Shared>,

    /// Join handles for worker threads.
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Creates a pool and spawns `threads` workers named `{name}-{index}`.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn a worker thread.
    pub(crate) fn new(threads: usize, name: &str) -> Self {
        static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(1);

        let shared = Arc::new(Shared {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            injector: Injector::new(),
            locals: (0..threads).map(|_| LocalQueue::new()).collect(),
        });

        let handles = (0..threads)
            .map(|index| {
                let worker = Worker::new(index, shared.clone());

                thread::Builder::new()
                    .name(format!("{name}-{index}"))
                    .spawn(move || worker.run())
                    .expect("failed to spawn thread pool worker")
            })
            .collect();

        tracing::debug!(pool = shared.id, threads, "thread pool started");

        Self {
            shared,
            handles: Mutex::new(handles),
        }
    }

    /// Number of worker threads.
    pub fn worker_threads(&self) -> usize {
        self.shared.locals.len()
    }

    /// Returns `true` when called from one of this pool's workers.
    pub fn is_worker_thread(&self) -> bool {
        worker::is_worker_of(self.shared.id)
    }

    /// Stops the workers and waits for them to exit.
    ///
    /// Work still queued is discarded. Work queued afterwards is dropped
    /// without running. Both are logged at `warn`. Called automatically on
    /// drop.
    ///
    /// A discarded continuation never resumes its state machine, so the
    /// machine's completion operation never completes. Keep the pool alive
    /// until every machine scheduled on it has finished.
    pub fn shutdown(&self) {
        self.shared.injector.shutdown();

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let current = thread::current().id();

        for handle in handles {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }

        let discarded = self.shared.injector.drain().len()
            + self
                .shared
                .locals
                .iter()
                .map(|local| local.drain().len())
                .sum::<usize>();

        if discarded > 0 {
            tracing::warn!(pool = self.shared.id, discarded, "discarded queued work on shutdown");
        }
    }
}

impl WorkPool for ThreadPool {
    fn queue_work_item(&self, work: Work, prefer_local: bool) {
        if self.shared.injector.is_shutdown() {
            tracing::warn!(pool = self.shared.id, "work queued after shutdown dropped");
            return;
        }

        let work = if prefer_local {
            match worker::try_push_local(self.shared.id, work) {
                Ok(()) => return,
                Err(work) => work,
            }
        } else {
            work
        };

        self.shared.injector.push(work);
    }
}

impl Scheduler for ThreadPool {
    fn enqueue(&self, work: Work) {
        self.queue_work_item(work, false);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
