/// No step is running.
///
/// The next resume runs a step on the calling thread.
pub(crate) const IDLE: usize = 0;

/// A step is running.
///
/// At most one thread may observe this state at a time.
pub(crate) const RUNNING: usize = 1;

/// A resume arrived while a step was running.
///
/// The thread running the step runs another one once the current step
/// returns, instead of the resuming thread waiting for it.
pub(crate) const NOTIFIED: usize = 2;
