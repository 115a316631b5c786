//! # Reprise
//!
//! **Reprise** is the continuation-scheduling layer of the **Nebula** ecosystem.
//! It binds a suspended state machine to the action that resumes it, decides
//! where that action runs once the awaited operation completes, and performs
//! the resumption while keeping the thread's ambient context intact.
//!
//! It provides:
//!
//! - A **state-machine box** that advances a computation one step at a time and
//!   restores the ambient dispatch context / scheduler around every step
//! - A **continuation scheduler** that either attaches a continuation to a
//!   pending operation or, if the operation won the race and completed first,
//!   dispatches it right away, never both and never neither
//! - **Continuation wrappers** that marshal a resumption through a dispatch
//!   context or scheduler and can be unwound back to the originating state
//!   machine for diagnostics
//! - A **causality façade** for optional diagnostic events, costing a single
//!   flag check when disabled
//! - A small **work-stealing thread pool**, a **completion source** and two
//!   **dispatch contexts** to host all of the above
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reprise::{
//!     AwaitedOperation, ContinuationScheduler, MachineStatus, Operation, StateMachine,
//!     StateMachineBox,
//! };
//! use reprise::pool::ThreadPoolBuilder;
//! use std::sync::Arc;
//!
//! struct Doubler {
//!     scheduler: Arc<ContinuationScheduler>,
//!     input: Arc<Operation<u32>>,
//!     output: Option<u32>,
//!     suspended: bool,
//! }
//!
//! impl StateMachine for Doubler {
//!     fn advance(&mut self, this: &Arc<StateMachineBox>) {
//!         if !self.suspended {
//!             self.suspended = true;
//!             self.scheduler.await_on_completed(self.input.clone(), this, true);
//!             return;
//!         }
//!         self.output = self.input.get_result().ok().map(|v| v * 2);
//!     }
//!
//!     fn status(&self) -> MachineStatus {
//!         if self.output.is_some() { MachineStatus::Completed } else { MachineStatus::Running }
//!     }
//! }
//!
//! let pool = Arc::new(ThreadPoolBuilder::new().worker_threads(2).build());
//! let scheduler = Arc::new(ContinuationScheduler::new(pool));
//! let input = Operation::pending();
//!
//! let machine = scheduler.start(Doubler {
//!     scheduler: scheduler.clone(),
//!     input: input.clone(),
//!     output: None,
//!     suspended: false,
//! })?;
//!
//! input.try_set_result(21);
//! machine.completion().wait();
//! ```
//!
//! ## Modules
//!
//! - [`causality`]: Diagnostic event hooks and the process-wide tracing flag
//! - [`context`]: Thread-local ambient dispatch context and scheduler
//! - [`continuation`]: Continuations, wrappers, and origin diagnostics
//! - [`dispatch`]: Dispatch context and scheduler abstractions
//! - [`machine`]: State machines and their boxes
//! - [`operation`]: Awaited operations and the [`Operation`] completion source
//! - [`pool`]: The work pool abstraction and a work-stealing thread pool
//! - [`scheduler`]: The continuation scheduler

pub mod causality;
pub mod context;
pub mod continuation;
pub mod dispatch;
pub mod machine;
pub mod operation;
pub mod pool;
pub mod scheduler;

mod error;

pub use continuation::{Action, Continuation, ContinuationWrapper};
pub use error::{ContinuationError, OperationError};
pub use machine::{MachineStatus, StateMachine, StateMachineBox, StateMachineDescriptor};
pub use operation::{Awaitable, AwaitedOperation, Operation, OperationId};
pub use scheduler::{ContinuationScheduler, Placement};
