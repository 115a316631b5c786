//! State machines and their boxes.
//!
//! A [`StateMachine`] is a resumable computation: each call to
//! [`advance`](StateMachine::advance) runs it until it either finishes or
//! suspends on an awaited operation. The machine never resumes itself; it
//! hands the continuation of its [`StateMachineBox`] to the scheduler and
//! returns.
//!
//! The box owns the machine exclusively and is what continuations point
//! at. It:
//! - memoizes the action that resumes the machine,
//! - restores the thread's ambient context after every step,
//! - contains panics raised by a step and surfaces them on its completion
//!   operation,
//! - answers best-effort diagnostic queries about the machine.

mod boxed;
mod descriptor;
mod state;

pub use boxed::StateMachineBox;
pub use descriptor::StateMachineDescriptor;

use std::sync::Arc;

/// A computation that can be advanced one step at a time.
///
/// # Examples
///
/// ```rust,ignore
/// struct Countdown(u32);
///
/// impl StateMachine for Countdown {
///     fn advance(&mut self, _this: &Arc<StateMachineBox>) {
///         self.0 -= 1;
///     }
///
///     fn status(&self) -> MachineStatus {
///         if self.0 == 0 { MachineStatus::Completed } else { MachineStatus::Running }
///     }
/// }
/// ```
pub trait StateMachine: Send + 'static {
    /// Runs the machine until it completes or suspends.
    ///
    /// `this` is the box that owns the machine. To suspend, pass it to
    /// [`ContinuationScheduler::await_on_completed`] and return.
    ///
    /// [`ContinuationScheduler::await_on_completed`]: crate::ContinuationScheduler::await_on_completed
    fn advance(&mut self, this: &Arc<StateMachineBox>);

    /// Reports where the machine is in its lifecycle.
    ///
    /// Read after every step; a terminal status completes the box.
    fn status(&self) -> MachineStatus {
        MachineStatus::Running
    }

    /// Describes the machine for diagnostics.
    ///
    /// The default lists only the type name. Override it to expose the
    /// fields worth seeing when inspecting a suspended computation.
    fn describe(&self) -> StateMachineDescriptor {
        StateMachineDescriptor::new(std::any::type_name::<Self>())
    }
}

/// Lifecycle of a state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineStatus {
    /// Not finished yet; more steps will follow.
    Running,

    /// Finished successfully.
    Completed,

    /// Finished with a failure.
    Faulted(String),

    /// Finished without producing a result.
    Canceled,
}

impl MachineStatus {
    /// Returns `true` for every status except [`Running`](Self::Running).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MachineStatus::Running)
    }
}
