use super::{DispatchContext, Work};
use crate::context::{enter_dispatch_context, set_dispatch_context};

use once_cell::sync::OnceCell;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle, ThreadId};

enum Command {
    Run(Work),
    Shutdown,
}

/// A dispatch context backed by one dedicated thread.
///
/// Posted work runs in FIFO order on the loop thread, with this context
/// installed as the thread's current dispatch context, so continuations
/// resumed here keep marshaling back here.
///
/// Obtain one from [`SerialLoop::start`].
pub struct SerialContext {
    /// Sender side of the command channel.
    sender: Sender<Command>,

    /// Identifier of the loop thread.
    thread_id: OnceCell<ThreadId>,

    /// Number of accepted posts.
    posted: AtomicUsize,

    /// Name of the loop thread.
    name: String,
}

impl SerialContext {
    /// Identifier of the thread this context runs work on.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.thread_id.get().copied()
    }

    /// Returns `true` when called from the loop thread.
    pub fn is_current(&self) -> bool {
        self.thread_id() == Some(thread::current().id())
    }

    /// Number of posts accepted so far.
    pub fn posted(&self) -> usize {
        self.posted.load(Ordering::Acquire)
    }

    /// Name of the loop thread.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DispatchContext for SerialContext {
    fn post(&self, work: Work) {
        if self.sender.send(Command::Run(work)).is_err() {
            tracing::warn!(context = %self.name, "post to a stopped serial context dropped");
            return;
        }

        self.posted.fetch_add(1, Ordering::AcqRel);
    }
}

/// Owner of a [`SerialContext`] and its thread.
///
/// Dropping the loop stops the thread once the work already posted has
/// run, and waits for it to exit.
pub struct SerialLoop {
    /// Shared context handed out to callers.
    context: Arc<SerialContext>,

    /// Loop thread.
    handle: Option<JoinHandle<()>>,
}

impl SerialLoop {
    /// Starts a loop thread called `name`.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn the thread.
    pub fn start(name: impl Into<String>) -> Self {
        let name = name.into();
        let (sender, receiver) = channel();

        let context = Arc::new(SerialContext {
            sender,
            thread_id: OnceCell::new(),
            posted: AtomicUsize::new(0),
            name: name.clone(),
        });

        let loop_context = context.clone();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(loop_context, receiver))
            .expect("failed to spawn serial context thread");

        let _ = context.thread_id.set(handle.thread().id());

        Self {
            context,
            handle: Some(handle),
        }
    }

    /// The dispatch context served by this loop.
    pub fn context(&self) -> Arc<SerialContext> {
        self.context.clone()
    }
}

impl Drop for SerialLoop {
    fn drop(&mut self) {
        let _ = self.context.sender.send(Command::Shutdown);

        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// Loop thread body: drain commands until shutdown.
fn run(context: Arc<SerialContext>, receiver: Receiver<Command>) {
    let current: Arc<dyn DispatchContext> = context.clone();
    set_dispatch_context(Some(current.clone()));

    tracing::debug!(context = %context.name, "serial context started");

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Run(work) => enter_dispatch_context(current.clone(), || {
                if panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
                    tracing::error!(context = %context.name, "work posted to serial context panicked");
                }
            }),
            Command::Shutdown => break,
        }
    }

    set_dispatch_context(None);

    tracing::debug!(context = %context.name, "serial context stopped");
}
