use super::Continuation;
use crate::machine::{StateMachineBox, StateMachineDescriptor};
use crate::operation::OperationRef;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// How a wrapper runs its inner continuation.
///
/// Receives the inner continuation and the operation the wrapper is about,
/// if known.
pub type DispatchFn = Box<dyn Fn(Continuation, Option<OperationRef>) + Send + Sync>;

/// One link in a chain of deferred calls.
///
/// A wrapper does not run its continuation itself; it hands it to a
/// dispatch function (post to a context, enqueue on a scheduler, emit wait
/// events first, ...). Wrappers may nest, and each one remembers the
/// awaited operation it belongs to so tooling can reconstruct what a
/// continuation is waiting on.
pub struct ContinuationWrapper {
    /// Called with the inner continuation when the wrapper fires.
    dispatch: DispatchFn,

    /// The continuation this wrapper defers to. Possibly another wrapper.
    continuation: Continuation,

    /// The awaited operation this link is logically about, if any.
    operation: Option<OperationRef>,
}

impl ContinuationWrapper {
    /// Wraps `continuation` behind `dispatch`.
    ///
    /// If `operation` is `None`, the operation is inherited from
    /// `continuation` when that continuation is itself a wrapper. It is
    /// never looked up through any other kind of continuation.
    pub fn wrap<F>(continuation: Continuation, dispatch: F, operation: Option<OperationRef>) -> Continuation
    where
        F: Fn(Continuation, Option<OperationRef>) + Send + Sync + 'static,
    {
        let operation = operation.or_else(|| continuation_operation(&continuation));

        Continuation::Wrapped(Arc::new(Self {
            dispatch: Box::new(dispatch),
            continuation,
            operation,
        }))
    }

    /// Fires the wrapper: calls the dispatch function with the inner
    /// continuation and the operation.
    pub fn invoke(&self) {
        (self.dispatch)(self.continuation.clone(), self.operation.clone())
    }

    /// The continuation this wrapper defers to.
    pub fn inner(&self) -> &Continuation {
        &self.continuation
    }

    /// The awaited operation this wrapper is about, if known.
    pub fn operation(&self) -> Option<&OperationRef> {
        self.operation.as_ref()
    }
}

impl fmt::Debug for ContinuationWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationWrapper")
            .field("operation", &self.operation.as_ref().map(|op| op.id()))
            .field("continuation", &self.continuation)
            .finish()
    }
}

/// Returns the operation `continuation` is about, if it is a wrapper that
/// knows one.
pub fn continuation_operation(continuation: &Continuation) -> Option<OperationRef> {
    match continuation {
        Continuation::Wrapped(wrapper) => wrapper.operation().cloned(),
        _ => None,
    }
}

/// Walks nested wrappers down to the state machine that started the chain.
///
/// Returns `None` if the chain bottoms out in a plain action. The walk is
/// iterative and visits each link once; chains cannot be cyclic because a
/// wrapper can only be built around a continuation that already exists.
pub fn unwrap_to_origin(continuation: &Continuation) -> Option<Arc<StateMachineBox>> {
    let mut current = continuation;

    loop {
        match current {
            Continuation::StateMachine(machine) => return Some(machine.clone()),
            Continuation::Action(_) => return None,
            Continuation::Wrapped(wrapper) => current = wrapper.inner(),
        }
    }
}

/// Describes the state machine at the origin of `continuation`.
///
/// Best-effort: returns `None` when there is no originating state machine,
/// when the machine is busy executing a step, or when its descriptor
/// panics.
pub fn describe_origin(continuation: &Continuation) -> Option<StateMachineDescriptor> {
    let origin = unwrap_to_origin(continuation)?;

    match panic::catch_unwind(AssertUnwindSafe(|| origin.describe())) {
        Ok(descriptor) => descriptor,
        Err(_) => {
            tracing::debug!(machine = %origin.id(), "state machine descriptor panicked");
            None
        }
    }
}
