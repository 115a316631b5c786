//! Causality tracing.
//!
//! When enabled, the scheduler and state machines report how operations
//! relate to the continuations that resume them: which machine waited on
//! which operation, when a continuation was placed, when a step ran.
//!
//! Tracing is controlled by a process-wide flag that is read at each
//! decision point. Enabling it never changes what gets scheduled or where;
//! it only adds events and, for awaits, an extra wrapper layer that carries
//! the awaited operation.
//!
//! Events go to a [`CausalitySink`]. The default sink forwards them to
//! `tracing` under the `reprise::causality` target.

mod event;
mod sink;

pub use event::{
    CausalityEvent, CausalityEventKind, CausalityRelation, CausalityStatus, SynchronousWork,
    WaitBehavior,
};
pub use sink::{CausalitySink, MemorySink, NoopSink, TracingSink};

use crate::operation::OperationId;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static TRACING_ENABLED: AtomicBool = AtomicBool::new(false);

/// Returns whether causality tracing is currently enabled.
pub fn is_enabled() -> bool {
    TRACING_ENABLED.load(Ordering::Acquire)
}

/// Enables or disables causality tracing for the whole process.
pub fn set_enabled(enabled: bool) {
    TRACING_ENABLED.store(enabled, Ordering::Release);
}

/// Handle used by the scheduler and state machines to report events.
///
/// Hooks record unconditionally. Callers check [`is_enabled`](Self::is_enabled)
/// first and skip the call entirely while tracing is disabled. A sink that
/// panics is contained here: the event is lost and scheduling proceeds.
#[derive(Clone)]
pub struct Causality {
    sink: Arc<dyn CausalitySink>,
}

impl Causality {
    /// Creates a handle reporting to `sink`.
    ///
    /// # Arguments
    ///
    /// * `sink` - Receives every event reported through this handle and its
    ///   clones.
    pub fn new(sink: Arc<dyn CausalitySink>) -> Self {
        Self { sink }
    }

    /// Returns whether events should be reported right now.
    ///
    /// Reads the process-wide flag; see [`set_enabled`].
    pub fn is_enabled(&self) -> bool {
        is_enabled()
    }

    /// Reports that `operation` started. `name` identifies what runs, such
    /// as the type name of a state machine.
    pub fn operation_begin(&self, operation: OperationId, name: impl Into<String>) {
        self.emit(operation, CausalityEventKind::OperationBegin { name: name.into() });
    }

    /// Reports how `operation` relates to the work around it.
    pub fn operation_relation(&self, operation: OperationId, relation: CausalityRelation) {
        self.emit(operation, CausalityEventKind::OperationRelation { relation });
    }

    /// Reports that `operation` finished with `status`.
    pub fn operation_end(&self, operation: OperationId, status: CausalityStatus) {
        self.emit(operation, CausalityEventKind::OperationEnd { status });
    }

    /// Reports that synchronous `work` on behalf of `operation` began.
    ///
    /// Always paired with [`synchronous_work_end`](Self::synchronous_work_end)
    /// for the same operation and work.
    pub fn synchronous_work_begin(&self, operation: OperationId, work: SynchronousWork) {
        self.emit(operation, CausalityEventKind::SynchronousWorkBegin { work });
    }

    /// Reports that synchronous `work` on behalf of `operation` ended.
    pub fn synchronous_work_end(&self, operation: OperationId, work: SynchronousWork) {
        self.emit(operation, CausalityEventKind::SynchronousWorkEnd { work });
    }

    /// Reports that a continuation was placed for `operation`.
    ///
    /// `continuation_of` names the state machine being resumed, when known.
    pub fn continuation_scheduled(
        &self,
        operation: OperationId,
        continuation_of: Option<OperationId>,
    ) {
        self.emit(
            operation,
            CausalityEventKind::ContinuationScheduled { continuation_of },
        );
    }

    /// Reports that something started waiting on `operation`.
    pub fn wait_begin(&self, operation: OperationId, behavior: WaitBehavior) {
        self.emit(operation, CausalityEventKind::WaitBegin { behavior });
    }

    /// Reports that the wait on `operation` is over and its continuation
    /// is about to run.
    pub fn wait_end(&self, operation: OperationId) {
        self.emit(operation, CausalityEventKind::WaitEnd);
    }

    fn emit(&self, operation: OperationId, kind: CausalityEventKind) {
        let event = CausalityEvent::new(operation, kind);
        let sink = &self.sink;

        if panic::catch_unwind(AssertUnwindSafe(|| sink.record(event))).is_err() {
            tracing::debug!(
                operation = operation.as_u64(),
                "causality sink panicked; event dropped"
            );
        }
    }
}

impl Default for Causality {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl fmt::Debug for Causality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Causality")
            .field("enabled", &is_enabled())
            .finish_non_exhaustive()
    }
}
