//! Continuations and continuation wrappers.
//!
//! A [`Continuation`] is "what runs next" once an awaited operation
//! completes. It is a tagged variant rather than an opaque callback so that
//! diagnostics can tell a state-machine resumption apart from a wrapper or
//! a plain action without inspecting types at runtime.
//!
//! Wrappers form a strictly forward chain: a wrapper only ever references
//! continuations that existed before it, so walking the chain always
//! terminates.

mod wrapper;

pub use wrapper::{
    ContinuationWrapper, DispatchFn, continuation_operation, describe_origin, unwrap_to_origin,
};

use crate::machine::StateMachineBox;

use std::fmt;
use std::sync::Arc;

/// A shared, repeatedly invokable callback.
pub type Action = Arc<dyn Fn() + Send + Sync>;

/// What runs once an awaited operation completes.
#[derive(Clone)]
pub enum Continuation {
    /// Resumes a boxed state machine.
    StateMachine(Arc<StateMachineBox>),

    /// Runs an arbitrary action with no state machine behind it.
    Action(Action),

    /// Runs an inner continuation through a dispatch function.
    Wrapped(Arc<ContinuationWrapper>),
}

impl Continuation {
    /// Builds a [`Continuation::Action`] from a closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Continuation::Action(Arc::new(f))
    }

    /// Runs the continuation on the current thread.
    ///
    /// For a state machine this runs the box's cached resume action while
    /// this continuation keeps the box alive. For a wrapper this calls the
    /// wrapper's dispatch function, which decides where the inner
    /// continuation actually runs.
    pub fn invoke(&self) {
        match self {
            Continuation::StateMachine(machine) => (machine.move_next_action())(),
            Continuation::Action(action) => action(),
            Continuation::Wrapped(wrapper) => wrapper.invoke(),
        }
    }

    /// Returns `true` if this continuation is a wrapper.
    pub fn is_wrapped(&self) -> bool {
        matches!(self, Continuation::Wrapped(_))
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Continuation::StateMachine(machine) => {
                f.debug_tuple("StateMachine").field(&machine.id()).finish()
            }
            Continuation::Action(_) => f.write_str("Action"),
            Continuation::Wrapped(wrapper) => f.debug_tuple("Wrapped").field(wrapper).finish(),
        }
    }
}
