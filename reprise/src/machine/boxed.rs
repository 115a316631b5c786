use super::state::{IDLE, NOTIFIED, RUNNING};
use super::{MachineStatus, StateMachine, StateMachineDescriptor};
use crate::causality::{Causality, CausalityStatus, SynchronousWork};
use crate::context::ContextScope;
use crate::continuation::{Action, Continuation};
use crate::error::ContinuationError;
use crate::operation::{Awaitable, Operation, OperationId};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Exclusive owner of a state machine, and the target of its continuations.
///
/// A box is always handled through an `Arc`: continuations parked on
/// awaited operations hold strong references to it, while the memoized
/// resume action only holds a weak one. Once the machine is terminal and
/// no continuation refers to the box, it is dropped.
///
/// Steps never overlap. A resume that arrives while a step is still
/// running, from any thread, does not wait for it: it is recorded, and the
/// thread running the step runs the next one as soon as the current one
/// returns. A machine may therefore complete, from inside its own step, an
/// operation it is suspended on, directly or through other machines.
pub struct StateMachineBox {
    /// Identifier used in logs and causality events.
    id: OperationId,

    /// Type name of the boxed machine.
    type_name: &'static str,

    /// Step state: `IDLE`, `RUNNING` or `NOTIFIED`.
    state: AtomicUsize,

    /// The computation. Only locked by the thread holding `RUNNING`, or
    /// tried while describing.
    machine: Mutex<Box<dyn StateMachine>>,

    /// Resume action, built on first request.
    action: OnceCell<Action>,

    /// Completed when the machine reaches a terminal status or a step panics.
    completion: Arc<Operation<()>>,

    causality: Causality,
}

impl StateMachineBox {
    /// Boxes `machine`, reporting causality events to the default sink.
    ///
    /// # Errors
    ///
    /// Returns [`ContinuationError::InvalidStateMachine`] if the machine
    /// already reports a terminal status.
    pub fn new<M: StateMachine>(machine: M) -> Result<Arc<Self>, ContinuationError> {
        Self::with_causality(machine, Causality::default())
    }

    /// Boxes `machine`, reporting causality events through `causality`.
    ///
    /// # Errors
    ///
    /// Returns [`ContinuationError::InvalidStateMachine`] if the machine
    /// already reports a terminal status.
    pub fn with_causality<M: StateMachine>(
        machine: M,
        causality: Causality,
    ) -> Result<Arc<Self>, ContinuationError> {
        let type_name = std::any::type_name::<M>();

        if machine.status().is_terminal() {
            return Err(ContinuationError::InvalidStateMachine { type_name });
        }

        Ok(Arc::new(Self {
            id: OperationId::next(),
            type_name,
            state: AtomicUsize::new(IDLE),
            machine: Mutex::new(Box::new(machine)),
            action: OnceCell::new(),
            completion: Operation::pending(),
            causality,
        }))
    }

    /// Identifier of the box, unique among operations and boxes.
    ///
    /// Logs and causality events name the machine by it.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Type name of the boxed machine, as given by [`std::any::type_name`].
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The operation completed when the machine finishes.
    ///
    /// It carries `Ok(())` on success, [`OperationError::Faulted`] when the
    /// machine faulted or a step panicked, and [`OperationError::Canceled`]
    /// when the machine was cancelled.
    ///
    /// [`OperationError::Faulted`]: crate::OperationError::Faulted
    /// [`OperationError::Canceled`]: crate::OperationError::Canceled
    pub fn completion(&self) -> &Arc<Operation<()>> {
        &self.completion
    }

    /// Returns `true` once the machine has finished.
    pub fn is_completed(&self) -> bool {
        self.completion.is_completed()
    }

    /// A continuation that resumes this machine.
    pub fn continuation(self: &Arc<Self>) -> Continuation {
        Continuation::StateMachine(self.clone())
    }

    /// Returns the action that resumes this machine.
    ///
    /// The action is built on first use and the same one is returned on
    /// every later call. It only holds a weak reference to the box: if the
    /// box is gone by the time the action runs, nothing happens.
    pub fn move_next_action(self: &Arc<Self>) -> Action {
        self.action
            .get_or_init(|| {
                let this = Arc::downgrade(self);

                Arc::new(move || {
                    if let Some(this) = this.upgrade() {
                        this.advance();
                    }
                })
            })
            .clone()
    }

    /// Runs one step of the machine.
    ///
    /// The ambient dispatch context and scheduler in effect before the step
    /// are back in effect after it, whether the step returned or panicked.
    /// A panic is not propagated: it faults the completion operation.
    ///
    /// If a step is already running, on this thread or another, the call
    /// returns at once and that step is followed by another one.
    pub fn advance(self: &Arc<Self>) {
        if self.is_completed() {
            tracing::trace!(machine = %self.id, "advance on a finished state machine ignored");
            return;
        }

        if !self.claim() {
            return;
        }

        loop {
            // A resume may have been recorded while the machine finished.
            if self.is_completed() {
                self.state.store(IDLE, Ordering::Release);
                return;
            }

            let status = self.step();
            self.finish(status);

            if self
                .state
                .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }

            tracing::trace!(machine = %self.id, "resumed while running, stepping again");
            self.state.store(RUNNING, Ordering::Release);
        }
    }

    /// Moves the box to `RUNNING`.
    ///
    /// Returns `false` if a step is already running, after recording the
    /// resume for it.
    fn claim(&self) -> bool {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return true;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        tracing::trace!(machine = %self.id, "resume deferred to the running step");
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }

    /// Runs the machine once and reads its status.
    ///
    /// Only called while holding `RUNNING`, so the lock is uncontended
    /// except by [`describe`](Self::describe).
    fn step(self: &Arc<Self>) -> MachineStatus {
        let mut machine = self.machine.lock();
        let traced = self.causality.is_enabled();

        if traced {
            self.causality
                .synchronous_work_begin(self.id, SynchronousWork::Execution);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _scope = ContextScope::enter();
            machine.advance(self);
        }));

        let status = match outcome {
            Ok(()) => machine.status(),
            Err(payload) => {
                let message = panic_message(payload.as_ref());

                tracing::warn!(
                    machine = %self.id,
                    type_name = self.type_name,
                    message = %message,
                    "state machine step panicked"
                );

                MachineStatus::Faulted(message)
            }
        };

        drop(machine);

        if traced {
            self.causality
                .synchronous_work_end(self.id, SynchronousWork::Execution);
        }

        status
    }

    /// Describes the boxed machine.
    ///
    /// Best-effort: returns `None` while a step is running.
    pub fn describe(&self) -> Option<StateMachineDescriptor> {
        self.machine.try_lock().map(|machine| machine.describe())
    }

    fn finish(&self, status: MachineStatus) {
        let (completed, traced) = match status {
            MachineStatus::Running => return,
            MachineStatus::Completed => (self.completion.try_set_result(()), CausalityStatus::Completed),
            MachineStatus::Faulted(message) => {
                (self.completion.try_set_faulted(message), CausalityStatus::Error)
            }
            MachineStatus::Canceled => (self.completion.try_set_canceled(), CausalityStatus::Canceled),
        };

        if !completed {
            return;
        }

        tracing::trace!(machine = %self.id, status = ?traced, "state machine finished");

        if self.causality.is_enabled() {
            self.causality.operation_end(self.id, traced);
        }
    }
}

impl fmt::Debug for StateMachineBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachineBox")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("state machine step panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{self, AmbientContext};
    use crate::dispatch::{DispatchContext, Work};
    use crate::error::OperationError;
    use crate::operation::AwaitedOperation;

    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Inline;

    impl DispatchContext for Inline {
        fn post(&self, work: Work) {
            work();
        }
    }

    struct Steps {
        remaining: usize,
        runs: Arc<AtomicUsize>,
    }

    impl StateMachine for Steps {
        fn advance(&mut self, _this: &Arc<StateMachineBox>) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.remaining -= 1;
        }

        fn status(&self) -> MachineStatus {
            if self.remaining == 0 {
                MachineStatus::Completed
            } else {
                MachineStatus::Running
            }
        }

        fn describe(&self) -> StateMachineDescriptor {
            StateMachineDescriptor::new("Steps").field("remaining", &self.remaining)
        }
    }

    /// Installs a fresh dispatch context during its step, then optionally panics.
    struct Swapper {
        panic: bool,
    }

    impl StateMachine for Swapper {
        fn advance(&mut self, _this: &Arc<StateMachineBox>) {
            context::set_dispatch_context(Some(Arc::new(Inline)));

            if self.panic {
                panic!("step failed");
            }
        }
    }

    struct Introspect {
        seen: Arc<AtomicUsize>,
    }

    impl StateMachine for Introspect {
        fn advance(&mut self, this: &Arc<StateMachineBox>) {
            if this.describe().is_none() {
                self.seen.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Resumes itself from inside its first step.
    struct Eager {
        runs: Arc<AtomicUsize>,
    }

    impl StateMachine for Eager {
        fn advance(&mut self, this: &Arc<StateMachineBox>) {
            if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
                this.advance();
                assert_eq!(self.runs.load(Ordering::SeqCst), 1);
            }
        }

        fn status(&self) -> MachineStatus {
            if self.runs.load(Ordering::SeqCst) == 2 {
                MachineStatus::Completed
            } else {
                MachineStatus::Running
            }
        }
    }

    fn steps(remaining: usize) -> (Arc<StateMachineBox>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let machine = StateMachineBox::new(Steps {
            remaining,
            runs: runs.clone(),
        })
        .unwrap();

        (machine, runs)
    }

    #[test]
    fn test_terminal_machine_is_rejected() {
        let err = StateMachineBox::new(Steps {
            remaining: 0,
            runs: Arc::new(AtomicUsize::new(0)),
        })
        .unwrap_err();

        assert!(matches!(err, ContinuationError::InvalidStateMachine { .. }));
        assert!(err.to_string().contains("Steps"));
    }

    #[test]
    fn test_action_is_memoized() {
        let (machine, _) = steps(3);

        let first = machine.move_next_action();
        let second = machine.move_next_action();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_action_advances_until_completed() {
        let (machine, runs) = steps(2);
        let action = machine.move_next_action();

        action();
        assert!(!machine.is_completed());

        action();
        assert!(machine.is_completed());
        assert_eq!(machine.completion().get_result(), Ok(()));

        action();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_action_does_not_keep_box_alive() {
        let (machine, runs) = steps(5);
        let action = machine.move_next_action();

        drop(machine);
        action();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_context_restored_after_step() {
        let before = AmbientContext::capture();
        let machine = StateMachineBox::new(Swapper { panic: false }).unwrap();

        machine.advance();

        assert!(AmbientContext::capture().same_as(&before));
    }

    #[test]
    fn test_context_restored_after_panic() {
        let before = AmbientContext::capture();
        let machine = StateMachineBox::new(Swapper { panic: true }).unwrap();

        machine.advance();

        assert!(AmbientContext::capture().same_as(&before));
        assert_eq!(
            machine.completion().get_result(),
            Err(OperationError::Faulted(String::from("step failed")))
        );
    }

    #[test]
    fn test_describe_is_absent_while_running() {
        let seen = Arc::new(AtomicUsize::new(0));
        let machine = StateMachineBox::new(Introspect { seen: seen.clone() }).unwrap();

        machine.advance();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(machine.describe().is_some());
    }

    #[test]
    fn test_describe_uses_machine_fields() {
        let (machine, _) = steps(4);
        let descriptor = machine.describe().unwrap();

        assert_eq!(descriptor.type_name(), "Steps");
        assert_eq!(descriptor.to_string(), "Steps\n    remaining: 4\n");
    }

    #[test]
    fn test_resume_inside_step_runs_after_it() {
        let runs = Arc::new(AtomicUsize::new(0));
        let machine = StateMachineBox::new(Eager { runs: runs.clone() }).unwrap();

        machine.advance();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(machine.completion().get_result(), Ok(()));
        assert_eq!(machine.state.load(Ordering::SeqCst), IDLE);
    }
}
