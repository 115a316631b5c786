use super::CausalityEvent;

use parking_lot::Mutex;

/// Receives causality events.
///
/// Implementations must be cheap and must not block; they run on the
/// scheduling path. A panicking sink is contained by the
/// [`Causality`](super::Causality) façade.
pub trait CausalitySink: Send + Sync {
    fn record(&self, event: CausalityEvent);
}

/// Emits every event through `tracing` at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl CausalitySink for TracingSink {
    fn record(&self, event: CausalityEvent) {
        tracing::trace!(
            target: "reprise::causality",
            operation = event.operation.as_u64(),
            kind = ?event.kind,
            "causality event"
        );
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl CausalitySink for NoopSink {
    fn record(&self, _event: CausalityEvent) {}
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<CausalityEvent>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the events recorded so far.
    pub fn events(&self) -> Vec<CausalityEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns the events recorded so far.
    pub fn take(&self) -> Vec<CausalityEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl CausalitySink for MemorySink {
    fn record(&self, event: CausalityEvent) {
        self.events.lock().push(event);
    }
}
