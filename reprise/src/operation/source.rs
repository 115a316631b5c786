use super::{Awaitable, AwaitedOperation, OperationId};
use crate::continuation::Continuation;
use crate::error::OperationError;

use parking_lot::{Condvar, Mutex};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A completion source: an awaited operation completed by hand.
///
/// An `Operation` starts pending and is completed exactly once, either with
/// a value, a failure, or a cancellation. A single continuation may be
/// attached while it is pending; the thread that completes the operation
/// invokes that continuation after publishing the outcome.
///
/// The outcome and the continuation slot live behind one lock, which makes
/// attaching and completing mutually linearizable: whichever side takes the
/// lock first wins, and the loser observes the winner's effect.
pub struct Operation<T> {
    /// Identifier used in diagnostics.
    id: OperationId,

    /// Lock-free view of "an outcome has been published".
    completed: AtomicBool,

    /// Outcome and continuation slot.
    inner: Mutex<Inner<T>>,

    /// Signalled once the outcome is published.
    condvar: Condvar,
}

struct Inner<T> {
    outcome: Option<Result<T, OperationError>>,
    continuation: Option<Continuation>,
}

impl<T: Send + 'static> Operation<T> {
    /// Creates a pending operation.
    pub fn pending() -> Arc<Self> {
        Arc::new(Self::new(None))
    }

    /// Creates an operation that has already succeeded with `value`.
    pub fn completed(value: T) -> Arc<Self> {
        Arc::new(Self::new(Some(Ok(value))))
    }

    /// Creates an operation that has already faulted.
    pub fn faulted(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(Some(Err(OperationError::Faulted(message.into())))))
    }

    /// Creates an operation that has already been cancelled.
    pub fn canceled() -> Arc<Self> {
        Arc::new(Self::new(Some(Err(OperationError::Canceled))))
    }

    fn new(outcome: Option<Result<T, OperationError>>) -> Self {
        Self {
            id: OperationId::next(),
            completed: AtomicBool::new(outcome.is_some()),
            inner: Mutex::new(Inner {
                outcome,
                continuation: None,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Completes the operation successfully.
    ///
    /// Returns `false` if the operation had already completed.
    pub fn try_set_result(&self, value: T) -> bool {
        self.try_complete(Ok(value))
    }

    /// Completes the operation successfully.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AlreadyCompleted`] if the operation had
    /// already completed.
    pub fn set_result(&self, value: T) -> Result<(), OperationError> {
        if self.try_set_result(value) {
            Ok(())
        } else {
            Err(OperationError::AlreadyCompleted(self.id))
        }
    }

    /// Completes the operation with a failure.
    ///
    /// Returns `false` if the operation had already completed.
    pub fn try_set_faulted(&self, message: impl Into<String>) -> bool {
        self.try_complete(Err(OperationError::Faulted(message.into())))
    }

    /// Completes the operation as cancelled.
    ///
    /// Returns `false` if the operation had already completed.
    pub fn try_set_canceled(&self) -> bool {
        self.try_complete(Err(OperationError::Canceled))
    }

    /// Publishes `outcome` and fires the attached continuation, if any.
    ///
    /// The slot is emptied under the same lock that publishes the outcome,
    /// so a concurrent attach either lands before (and is fired here) or
    /// after (and is refused).
    fn try_complete(&self, outcome: Result<T, OperationError>) -> bool {
        let continuation = {
            let mut inner = self.inner.lock();

            if inner.outcome.is_some() {
                return false;
            }

            inner.outcome = Some(outcome);
            self.completed.store(true, Ordering::Release);

            inner.continuation.take()
        };

        self.condvar.notify_all();

        if let Some(continuation) = continuation {
            continuation.invoke();
        }

        true
    }
}

impl<T> Operation<T> {
    /// Blocks the current thread until the operation completes.
    pub fn wait(&self) {
        let mut inner = self.inner.lock();

        while inner.outcome.is_none() {
            self.condvar.wait(&mut inner);
        }
    }

    /// Blocks the current thread until the operation completes or
    /// `timeout` elapses.
    ///
    /// Returns `true` if the operation completed in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();

        while inner.outcome.is_none() {
            if self.condvar.wait_until(&mut inner, deadline).timed_out() {
                return inner.outcome.is_some();
            }
        }

        true
    }

    /// Returns `true` while a continuation is attached and not yet fired.
    pub fn has_continuation(&self) -> bool {
        self.inner.lock().continuation.is_some()
    }
}

impl<T: Send + 'static> Awaitable for Operation<T> {
    fn id(&self) -> OperationId {
        self.id
    }

    fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// # Panics
    ///
    /// Panics if a continuation is already attached. Operations expose a
    /// single slot; attaching twice is a programming error.
    fn try_attach_continuation(&self, continuation: Continuation) -> Result<(), Continuation> {
        let mut inner = self.inner.lock();

        if inner.outcome.is_some() {
            return Err(continuation);
        }

        assert!(
            inner.continuation.is_none(),
            "operation {} already has a continuation attached",
            self.id
        );

        inner.continuation = Some(continuation);
        Ok(())
    }
}

impl<T: Clone + Send + 'static> AwaitedOperation for Operation<T> {
    type Output = T;

    fn get_result(&self) -> Result<T, OperationError> {
        match &self.inner.lock().outcome {
            Some(outcome) => outcome.clone(),
            None => Err(OperationError::Pending(self.id)),
        }
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("completed", &self.completed.load(Ordering::Acquire))
            .finish()
    }
}
