//! The continuation scheduler.
//!
//! When a state machine suspends on an awaited operation, the scheduler
//! decides where its continuation will run and places it there, in one of
//! two ways:
//! - the continuation is *attached* to the still-pending operation, which
//!   runs it when it completes,
//! - or the operation had already completed, and the continuation is
//!   dispatched right away.
//!
//! Attaching hands the continuation to the operation by value and only gets
//! it back on failure, so exactly one of the two happens.

use crate::causality::{Causality, CausalityRelation, SynchronousWork, WaitBehavior};
use crate::context::CapturedContext;
use crate::continuation::{Continuation, ContinuationWrapper, unwrap_to_origin};
use crate::error::ContinuationError;
use crate::machine::{StateMachine, StateMachineBox};
use crate::operation::OperationRef;
use crate::pool::WorkPool;

use std::fmt;
use std::sync::Arc;

/// Where a continuation ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Attached to the operation; will be posted to the captured dispatch
    /// context on completion.
    AttachedToContext,

    /// The operation had completed; posted to the captured dispatch context.
    PostedToContext,

    /// Attached to the operation; will be enqueued on the captured scheduler
    /// on completion.
    AttachedToScheduler,

    /// The operation had completed; enqueued on the captured scheduler.
    EnqueuedToScheduler,

    /// Attached to the operation; will run on the completing thread.
    Attached,

    /// The operation had completed; queued to the work pool.
    QueuedToPool,
}

impl Placement {
    /// Returns `true` if the continuation was attached to a pending
    /// operation rather than dispatched immediately.
    pub fn is_attached(self) -> bool {
        matches!(
            self,
            Placement::AttachedToContext | Placement::AttachedToScheduler | Placement::Attached
        )
    }
}

/// Places continuations of suspended state machines.
///
/// # Examples
///
/// ```rust,ignore
/// let pool = Arc::new(ThreadPoolBuilder::new().worker_threads(2).build());
/// let scheduler = ContinuationScheduler::new(pool).with_causality(Causality::default());
///
/// let machine = scheduler.start(MyMachine::new())?;
/// machine.completion().wait();
/// ```
pub struct ContinuationScheduler {
    /// Receives continuations whose operation completed before they could
    /// be attached, when no context was captured.
    pool: Arc<dyn WorkPool>,

    causality: Causality,
}

impl ContinuationScheduler {
    /// Creates a scheduler reporting to the default causality sink.
    ///
    /// # Arguments
    ///
    /// * `pool` - Runs continuations whose operation had already completed
    ///   when no dispatch context or scheduler was captured.
    pub fn new(pool: Arc<dyn WorkPool>) -> Self {
        Self {
            pool,
            causality: Causality::default(),
        }
    }

    /// Reports causality events through `causality` instead of the default
    /// sink. Applies to this scheduler and to machines it starts.
    pub fn with_causality(mut self, causality: Causality) -> Self {
        self.causality = causality;
        self
    }

    /// The handle this scheduler and the machines it starts report through.
    pub fn causality(&self) -> &Causality {
        &self.causality
    }

    /// Boxes `machine` and runs its first step on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`ContinuationError::InvalidStateMachine`] if the machine
    /// already reports a terminal status.
    pub fn start<M: StateMachine>(&self, machine: M) -> Result<Arc<StateMachineBox>, ContinuationError> {
        let machine = StateMachineBox::with_causality(machine, self.causality.clone())?;

        tracing::trace!(machine = %machine.id(), type_name = machine.type_name(), "starting state machine");
        if self.causality.is_enabled() {
            self.causality.operation_begin(machine.id(), machine.type_name());
        }

        machine.advance();
        Ok(machine)
    }

    /// Suspends `machine` on `operation`.
    ///
    /// Called by a state machine from inside its step, right before
    /// returning. With `continue_on_captured_context`, the machine resumes
    /// through the current dispatch context or scheduler, if a non-default
    /// one is active.
    ///
    /// With causality tracing enabled, the wait is reported and the
    /// resumption is bracketed by events. Placement does not depend on it.
    pub fn await_on_completed(
        &self,
        operation: OperationRef,
        machine: &Arc<StateMachineBox>,
        continue_on_captured_context: bool,
    ) -> Placement {
        let continuation = if self.causality.is_enabled() {
            self.wait_events(&operation, machine)
        } else {
            machine.continuation()
        };

        self.set_continuation_for_await(operation, continuation, continue_on_captured_context)
    }

    /// Places `continuation` so that it runs once `operation` completes.
    ///
    /// The continuation runs exactly once:
    /// - through the captured dispatch context or scheduler if
    ///   `continue_on_captured_context` and one is active; if the operation
    ///   already completed it is posted or enqueued immediately, never run
    ///   inline,
    /// - otherwise on the thread completing the operation; if the operation
    ///   already completed it is queued to the work pool, preferring the
    ///   current worker.
    pub fn set_continuation_for_await(
        &self,
        operation: OperationRef,
        continuation: Continuation,
        continue_on_captured_context: bool,
    ) -> Placement {
        let origin = unwrap_to_origin(&continuation).map(|machine| machine.id());

        let placement = match CapturedContext::capture(continue_on_captured_context) {
            CapturedContext::Dispatch(context) => {
                let wrapped = ContinuationWrapper::wrap(
                    continuation,
                    move |inner, _| context.post(Box::new(move || inner.invoke())),
                    None,
                );

                match operation.try_attach_continuation(wrapped) {
                    Ok(()) => Placement::AttachedToContext,
                    Err(wrapped) => {
                        wrapped.invoke();
                        Placement::PostedToContext
                    }
                }
            }
            CapturedContext::Scheduler(scheduler) => {
                let wrapped = ContinuationWrapper::wrap(
                    continuation,
                    move |inner, _| scheduler.enqueue(Box::new(move || inner.invoke())),
                    None,
                );

                match operation.try_attach_continuation(wrapped) {
                    Ok(()) => Placement::AttachedToScheduler,
                    Err(wrapped) => {
                        wrapped.invoke();
                        Placement::EnqueuedToScheduler
                    }
                }
            }
            CapturedContext::None => match operation.try_attach_continuation(continuation) {
                Ok(()) => Placement::Attached,
                Err(continuation) => {
                    self.pool
                        .queue_work_item(Box::new(move || continuation.invoke()), true);
                    Placement::QueuedToPool
                }
            },
        };

        tracing::trace!(
            operation = %operation.id(),
            machine = ?origin,
            ?placement,
            "continuation placed"
        );

        if self.causality.is_enabled() {
            self.causality.continuation_scheduled(operation.id(), origin);
        }

        placement
    }

    /// Wraps the machine's continuation so that its resumption is reported.
    ///
    /// Only called with tracing enabled. The flag is read again when the
    /// continuation runs, since it may have been switched off meanwhile.
    fn wait_events(&self, operation: &OperationRef, machine: &Arc<StateMachineBox>) -> Continuation {
        let machine_id = machine.id();

        self.causality
            .wait_begin(operation.id(), WaitBehavior::Asynchronous);
        self.causality
            .operation_relation(machine_id, CausalityRelation::AssignDelegate);

        let causality = self.causality.clone();

        ContinuationWrapper::wrap(
            machine.continuation(),
            move |inner, operation| {
                if !causality.is_enabled() {
                    inner.invoke();
                    return;
                }

                if let Some(operation) = &operation {
                    causality.wait_end(operation.id());
                }

                causality.synchronous_work_begin(machine_id, SynchronousWork::TaskContinuation);
                inner.invoke();
                causality.synchronous_work_end(machine_id, SynchronousWork::TaskContinuation);
            },
            Some(operation.clone()),
        )
    }
}

impl fmt::Debug for ContinuationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationScheduler")
            .field("causality", &self.causality)
            .finish_non_exhaustive()
    }
}
