//! Awaited operations.
//!
//! An awaited operation is anything a state machine can suspend on: it will
//! eventually complete, and until then it offers a single slot into which
//! one continuation can be attached.
//!
//! This module defines:
//! - [`Awaitable`], the type-erased side used by the scheduler,
//! - [`AwaitedOperation`], which adds typed result retrieval,
//! - [`OperationId`], the identifier shared by operations and state machines
//!   for diagnostics,
//! - [`Operation`], a completion source implementing both traits.

mod source;

pub use source::Operation;

use crate::continuation::Continuation;
use crate::error::OperationError;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared, type-erased reference to an awaited operation.
pub type OperationRef = Arc<dyn Awaitable>;

/// Process-unique identifier of an operation or a boxed state machine.
///
/// Identifiers are allocated from a single counter so that causality
/// events from operations and from state machines never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    /// Allocates a fresh identifier.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);

        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The scheduler-facing side of an awaited operation.
///
/// # Contract
///
/// `try_attach_continuation` must behave as an atomic compare-and-set
/// against the operation's own completion path: either the continuation is
/// stored and will be invoked exactly once when the operation completes,
/// or the operation has already completed and the continuation is handed
/// back untouched. An operation holds at most one continuation at a time.
pub trait Awaitable: Send + Sync {
    /// Identifier used by diagnostics and causality events.
    fn id(&self) -> OperationId;

    /// Returns `true` once the operation has reached a terminal state
    /// (succeeded, faulted or cancelled).
    fn is_completed(&self) -> bool;

    /// Attempts to attach `continuation` to the operation.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the continuation was attached; the operation now owns it.
    /// - `Err(continuation)` if the operation completed first; ownership is
    ///   returned so the caller can dispatch it another way.
    fn try_attach_continuation(&self, continuation: Continuation) -> Result<(), Continuation>;
}

/// An awaited operation that produces a typed result.
pub trait AwaitedOperation: Awaitable {
    /// Value produced on success.
    type Output;

    /// Returns the outcome of the operation.
    ///
    /// Fails with [`OperationError::Pending`] if called before completion.
    fn get_result(&self) -> Result<Self::Output, OperationError>;
}
