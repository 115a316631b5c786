use crate::operation::OperationId;

use std::fmt;

/// A diagnostic event describing a scheduling relationship.
///
/// Events are fire-and-forget and never influence what gets scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CausalityEvent {
    /// The operation or state machine the event is about.
    pub operation: OperationId,

    /// What happened.
    pub kind: CausalityEventKind,
}

impl CausalityEvent {
    /// Creates an event.
    ///
    /// # Arguments
    ///
    /// * `operation` - Identifier of the operation or state machine the
    ///   event is about.
    /// * `kind` - What happened to it.
    pub fn new(operation: OperationId, kind: CausalityEventKind) -> Self {
        Self { operation, kind }
    }
}

impl fmt::Display for CausalityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.operation, self.kind)
    }
}

/// What a [`CausalityEvent`] reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CausalityEventKind {
    /// An operation or state machine started.
    OperationBegin { name: String },

    /// An operation was related to the one that continues it.
    OperationRelation { relation: CausalityRelation },

    /// An operation or state machine reached a terminal state.
    OperationEnd { status: CausalityStatus },

    /// Synchronous work on behalf of the operation started.
    SynchronousWorkBegin { work: SynchronousWork },

    /// Synchronous work on behalf of the operation ended.
    SynchronousWorkEnd { work: SynchronousWork },

    /// A continuation was placed on the operation or dispatched for it.
    ContinuationScheduled { continuation_of: Option<OperationId> },

    /// A state machine started waiting on the operation.
    WaitBegin { behavior: WaitBehavior },

    /// The wait on the operation ended.
    WaitEnd,
}

/// How one operation relates to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalityRelation {
    /// The operation hands its completion over to a continuation, as when a
    /// state machine suspends on it.
    AssignDelegate,

    /// The operation completes once all of several others have.
    Join,

    /// The operation completes once any of several others has.
    Choice,

    /// The operation was cancelled by another.
    Cancel,

    /// The operation failed because of another.
    Error,
}

/// Terminal status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalityStatus {
    /// Still running.
    Started,

    /// Finished successfully.
    Completed,

    /// Finished without a result after cancellation.
    Canceled,

    /// Finished with a fault.
    Error,
}

/// Kind of synchronous work performed for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynchronousWork {
    /// Running a continuation.
    TaskContinuation,

    /// Running a step of a state machine.
    Execution,
}

/// Whether a wait blocks a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitBehavior {
    /// The waiter blocks its thread.
    Synchronous,

    /// The waiter suspends and is resumed by a continuation.
    Asynchronous,
}
