use super::{DispatchContext, Work};
use crate::pool::WorkPool;

use std::sync::Arc;

/// The default dispatch context: posts straight to a work pool.
///
/// It performs no marshaling of its own, so it reports itself as default
/// and the continuation scheduler treats it exactly as if no dispatch
/// context were installed.
pub struct PooledContext {
    pool: Arc<dyn WorkPool>,
}

impl PooledContext {
    /// Creates a context posting to `pool`.
    pub fn new(pool: Arc<dyn WorkPool>) -> Self {
        Self { pool }
    }
}

impl DispatchContext for PooledContext {
    fn post(&self, work: Work) {
        self.pool.queue_work_item(work, false);
    }

    fn is_default(&self) -> bool {
        true
    }
}
