//! Thread-local ambient execution context.
//!
//! Each thread carries an optional current [`DispatchContext`] and an
//! optional current [`Scheduler`]. Dispatch contexts install themselves
//! while running posted work; state machines may change them during a
//! step. The state-machine box snapshots both around every step with
//! [`AmbientContext`] so that changes never leak past a suspension point.

use crate::dispatch::{DispatchContext, Scheduler};

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

thread_local! {
    /// Dispatch context continuations should marshal back to.
    static CURRENT_DISPATCH_CONTEXT: RefCell<Option<Arc<dyn DispatchContext>>> =
        const { RefCell::new(None) };

    /// Scheduler continuations should be placed on when no dispatch context
    /// applies.
    static CURRENT_SCHEDULER: RefCell<Option<Arc<dyn Scheduler>>> =
        const { RefCell::new(None) };
}

/// Returns the current thread's dispatch context, if any.
pub fn current_dispatch_context() -> Option<Arc<dyn DispatchContext>> {
    CURRENT_DISPATCH_CONTEXT.with(|cell| cell.borrow().clone())
}

/// Replaces the current thread's dispatch context, returning the previous
/// one.
pub fn set_dispatch_context(
    context: Option<Arc<dyn DispatchContext>>,
) -> Option<Arc<dyn DispatchContext>> {
    CURRENT_DISPATCH_CONTEXT.with(|cell| cell.replace(context))
}

/// Returns the current thread's scheduler, if any.
pub fn current_scheduler() -> Option<Arc<dyn Scheduler>> {
    CURRENT_SCHEDULER.with(|cell| cell.borrow().clone())
}

/// Replaces the current thread's scheduler, returning the previous one.
pub fn set_scheduler(scheduler: Option<Arc<dyn Scheduler>>) -> Option<Arc<dyn Scheduler>> {
    CURRENT_SCHEDULER.with(|cell| cell.replace(scheduler))
}

/// Runs `f` with `context` installed as the current dispatch context.
///
/// The previous ambient context is restored afterwards, including when `f`
/// panics.
pub fn enter_dispatch_context<R>(context: Arc<dyn DispatchContext>, f: impl FnOnce() -> R) -> R {
    let _scope = ContextScope::enter();
    set_dispatch_context(Some(context));
    f()
}

/// Runs `f` with `scheduler` installed as the current scheduler.
///
/// The previous ambient context is restored afterwards, including when `f`
/// panics.
pub fn enter_scheduler<R>(scheduler: Arc<dyn Scheduler>, f: impl FnOnce() -> R) -> R {
    let _scope = ContextScope::enter();
    set_scheduler(Some(scheduler));
    f()
}

/// Snapshot of the thread's dispatch context and scheduler.
#[derive(Clone, Default)]
pub struct AmbientContext {
    dispatch: Option<Arc<dyn DispatchContext>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl AmbientContext {
    /// Captures the current thread's ambient context.
    pub fn capture() -> Self {
        Self {
            dispatch: current_dispatch_context(),
            scheduler: current_scheduler(),
        }
    }

    /// Installs this snapshot as the current thread's ambient context.
    pub fn restore(self) {
        set_dispatch_context(self.dispatch);
        set_scheduler(self.scheduler);
    }

    /// The captured dispatch context.
    pub fn dispatch_context(&self) -> Option<&Arc<dyn DispatchContext>> {
        self.dispatch.as_ref()
    }

    /// The captured scheduler.
    pub fn scheduler(&self) -> Option<&Arc<dyn Scheduler>> {
        self.scheduler.as_ref()
    }

    /// Returns `true` if both snapshots refer to the same context objects.
    pub fn same_as(&self, other: &AmbientContext) -> bool {
        same_instance(&self.dispatch, &other.dispatch)
            && same_instance(&self.scheduler, &other.scheduler)
    }
}

impl fmt::Debug for AmbientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmbientContext")
            .field("dispatch", &self.dispatch.as_ref().map(Arc::as_ptr))
            .field("scheduler", &self.scheduler.as_ref().map(Arc::as_ptr))
            .finish()
    }
}

fn same_instance<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Restores the ambient context captured at construction when dropped.
///
/// Dropping happens on every exit path, unwinding included, which makes
/// this the try/finally region around a state-machine step. The common
/// case is that nothing changed, in which case no thread-local is written.
pub(crate) struct ContextScope {
    previous: Option<AmbientContext>,
}

impl ContextScope {
    /// Snapshots the current ambient context, to be restored on drop.
    pub(crate) fn enter() -> Self {
        Self {
            previous: Some(AmbientContext::capture()),
        }
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if !previous.same_as(&AmbientContext::capture()) {
                previous.restore();
            }
        }
    }
}

/// Where a continuation should run, captured at suspension time.
#[derive(Clone)]
pub enum CapturedContext {
    /// Post through this non-default dispatch context.
    Dispatch(Arc<dyn DispatchContext>),

    /// Enqueue on this non-default scheduler.
    Scheduler(Arc<dyn Scheduler>),

    /// No marshaling: attach directly, or fall back to the work pool.
    None,
}

impl CapturedContext {
    /// Captures the placement target for a continuation suspended on the
    /// current thread.
    ///
    /// Without `continue_on_captured_context` nothing is captured. Otherwise
    /// a non-default dispatch context wins over a non-default scheduler;
    /// default instances of either are ignored.
    pub fn capture(continue_on_captured_context: bool) -> Self {
        if !continue_on_captured_context {
            return CapturedContext::None;
        }

        if let Some(context) = current_dispatch_context() {
            if !context.is_default() {
                return CapturedContext::Dispatch(context);
            }
        }

        match current_scheduler() {
            Some(scheduler) if !scheduler.is_default() => CapturedContext::Scheduler(scheduler),
            _ => CapturedContext::None,
        }
    }
}

impl fmt::Debug for CapturedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapturedContext::Dispatch(_) => f.write_str("Dispatch"),
            CapturedContext::Scheduler(_) => f.write_str("Scheduler"),
            CapturedContext::None => f.write_str("None"),
        }
    }
}
