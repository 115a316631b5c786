use crate::operation::OperationId;

use thiserror::Error;

/// Errors raised by the scheduling layer itself.
///
/// These are contract violations: they indicate a caller handed the
/// subsystem something it cannot work with, and are reported before any
/// work is scheduled.
#[derive(Debug, Error)]
pub enum ContinuationError {
    /// A state machine was boxed after it had already reached a terminal
    /// status, so there is nothing left to resume.
    #[error("cannot box state machine `{type_name}`: it is already in a terminal state")]
    InvalidStateMachine { type_name: &'static str },
}

/// The failure side of an awaited operation.
///
/// `Clone` so that an outcome can be observed more than once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The operation completed with a failure.
    #[error("operation faulted: {0}")]
    Faulted(String),

    /// The operation was cancelled before producing a value.
    #[error("operation was cancelled")]
    Canceled,

    /// The result was requested before the operation completed.
    #[error("operation {0} has not completed yet")]
    Pending(OperationId),

    /// A completion was attempted on an operation that already has one.
    #[error("operation {0} has already completed")]
    AlreadyCompleted(OperationId),
}
