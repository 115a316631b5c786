//! Work pool.
//!
//! The continuation scheduler falls back to a [`WorkPool`] when a raw
//! continuation could not be attached because its operation had already
//! completed. The pool is injected into the scheduler rather than reached
//! through global state.
//!
//! [`ThreadPool`] is the provided implementation: a fixed set of worker
//! threads sharing a global injector queue, each with a local queue that
//! other workers steal from when idle.

mod builder;
mod core;
mod injector;
mod queue;
mod worker;

pub use builder::ThreadPoolBuilder;
pub use self::core::ThreadPool;

use crate::dispatch::Work;

/// Executes queued work asynchronously.
///
/// Queued work is expected to run. A pool that stops, and drops work
/// instead, leaves the state machines behind that work suspended forever:
/// their completion operations never complete and waiting on them blocks.
/// Callers keep a pool running until the machines scheduled on it finish.
pub trait WorkPool: Send + Sync {
    /// Queues `work` for execution.
    ///
    /// `prefer_local` is a locality hint: when the caller is itself a
    /// worker of this pool, the work should stay on the caller's thread if
    /// feasible. It never affects correctness.
    fn queue_work_item(&self, work: Work, prefer_local: bool);
}
