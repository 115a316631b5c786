//! Dispatch contexts and schedulers.
//!
//! Both are placement targets for a continuation: a [`DispatchContext`]
//! marshals work onto a specific logical thread or queue, while a
//! [`Scheduler`] places work according to its own policy. The continuation
//! scheduler prefers a dispatch context over a scheduler when both are
//! active.
//!
//! Implementations provided here:
//! - [`SerialContext`]: one dedicated thread draining posts in FIFO order,
//! - [`PooledContext`]: the default context, posting to a work pool.

mod pooled;
mod serial;

pub use pooled::PooledContext;
pub use serial::{SerialContext, SerialLoop};

/// A unit of work handed to a context, scheduler or pool.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Marshals work onto a particular execution context.
///
/// As with [`WorkPool`](crate::pool::WorkPool), posted work is expected to
/// run. A context that has stopped drops what is posted to it, and any
/// state machine resumed through that work stays suspended for good.
pub trait DispatchContext: Send + Sync {
    /// Queues `work` to run asynchronously on this context.
    ///
    /// Posts from one thread to one context instance run in FIFO order;
    /// nothing is guaranteed relative to posts from unrelated sources.
    fn post(&self, work: Work);

    /// Returns `true` for a context that adds no marshaling of its own.
    ///
    /// A default context is treated as if no context were active: the
    /// continuation scheduler attaches continuations directly instead of
    /// routing them through it.
    fn is_default(&self) -> bool {
        false
    }
}

/// Places work according to a scheduling policy.
///
/// The same contract as [`DispatchContext`] holds: enqueued work must
/// eventually run for the machines it resumes to finish.
pub trait Scheduler: Send + Sync {
    /// Queues `work` for execution.
    fn enqueue(&self, work: Work);

    /// Returns `true` for the process default scheduler.
    ///
    /// As with [`DispatchContext::is_default`], a default scheduler is
    /// ignored by the continuation scheduler.
    fn is_default(&self) -> bool {
        false
    }
}
