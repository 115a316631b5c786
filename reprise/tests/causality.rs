use reprise::causality::{
    self, Causality, CausalityEvent, CausalityEventKind, CausalityRelation, CausalitySink,
    CausalityStatus, MemorySink, SynchronousWork, WaitBehavior,
};
use reprise::context;
use reprise::dispatch::SerialLoop;
use reprise::pool::ThreadPoolBuilder;
use reprise::{
    Awaitable, AwaitedOperation, ContinuationScheduler, MachineStatus, Operation, OperationError,
    Placement, StateMachine, StateMachineBox,
};

use parking_lot::{Mutex, MutexGuard, const_mutex};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Serializes tests that flip the process-wide tracing flag.
static FLAG: Mutex<()> = const_mutex(());

struct Tracing {
    _guard: MutexGuard<'static, ()>,
}

impl Tracing {
    fn set(enabled: bool) -> Self {
        let guard = FLAG.lock();
        causality::set_enabled(enabled);

        Self { _guard: guard }
    }
}

impl Drop for Tracing {
    fn drop(&mut self) {
        causality::set_enabled(false);
    }
}

struct Echo {
    scheduler: Arc<ContinuationScheduler>,
    input: Arc<Operation<u32>>,
    continue_on_captured_context: bool,
    placement: Arc<Mutex<Option<Placement>>>,
    output: Arc<Mutex<Option<Result<u32, OperationError>>>>,
    suspended: bool,
}

impl StateMachine for Echo {
    fn advance(&mut self, this: &Arc<StateMachineBox>) {
        if !self.suspended {
            self.suspended = true;

            let placement = self.scheduler.await_on_completed(
                self.input.clone(),
                this,
                self.continue_on_captured_context,
            );
            *self.placement.lock() = Some(placement);
            return;
        }

        *self.output.lock() = Some(self.input.get_result());
    }

    fn status(&self) -> MachineStatus {
        if self.output.lock().is_some() {
            MachineStatus::Completed
        } else {
            MachineStatus::Running
        }
    }
}

/// Runs one `Echo` to completion and reports where it was placed and what
/// it observed.
fn run_echo(
    scheduler: &Arc<ContinuationScheduler>,
    input: Arc<Operation<u32>>,
    continue_on_captured_context: bool,
) -> (Placement, Result<u32, OperationError>, Arc<StateMachineBox>) {
    let placement = Arc::new(Mutex::new(None));
    let output = Arc::new(Mutex::new(None));

    let machine = scheduler
        .start(Echo {
            scheduler: scheduler.clone(),
            input: input.clone(),
            continue_on_captured_context,
            placement: placement.clone(),
            output: output.clone(),
            suspended: false,
        })
        .unwrap();

    input.try_set_result(42);
    assert!(machine.completion().wait_timeout(Duration::from_secs(5)));

    let placement = placement.lock().take().unwrap();
    let output = output.lock().take().unwrap();

    (placement, output, machine)
}

fn scheduler_with(sink: Arc<dyn CausalitySink>) -> Arc<ContinuationScheduler> {
    let pool = Arc::new(ThreadPoolBuilder::new().worker_threads(2).build());

    Arc::new(ContinuationScheduler::new(pool).with_causality(Causality::new(sink)))
}

fn placements(
    scheduler: &Arc<ContinuationScheduler>,
) -> Vec<(Placement, Result<u32, OperationError>)> {
    let serial = SerialLoop::start("causality-test");
    let mut observed = Vec::new();

    for completed in [false, true] {
        for with_context in [false, true] {
            let input = if completed {
                Operation::completed(42)
            } else {
                Operation::pending()
            };

            let (placement, output, _) = if with_context {
                context::enter_dispatch_context(serial.context(), || {
                    run_echo(scheduler, input, true)
                })
            } else {
                run_echo(scheduler, input, true)
            };

            observed.push((placement, output));
        }
    }

    observed
}

#[test]
fn test_placements_do_not_depend_on_tracing() {
    let scheduler = scheduler_with(Arc::new(MemorySink::new()));

    let disabled = {
        let _tracing = Tracing::set(false);
        placements(&scheduler)
    };
    let enabled = {
        let _tracing = Tracing::set(true);
        placements(&scheduler)
    };

    assert_eq!(disabled, enabled);
    assert_eq!(
        disabled.iter().map(|(placement, _)| *placement).collect::<Vec<_>>(),
        vec![
            Placement::Attached,
            Placement::AttachedToContext,
            Placement::QueuedToPool,
            Placement::PostedToContext,
        ]
    );
    assert!(disabled.iter().all(|(_, output)| *output == Ok(42)));
}

#[test]
fn test_await_is_traced_in_order() {
    let _tracing = Tracing::set(true);
    let sink = Arc::new(MemorySink::new());
    let scheduler = scheduler_with(sink.clone());
    let input = Operation::<u32>::pending();
    let input_id = input.id();

    let (placement, _, machine) = run_echo(&scheduler, input, false);
    let machine_id = machine.id();

    assert_eq!(placement, Placement::Attached);

    let expected = vec![
        CausalityEvent::new(
            machine_id,
            CausalityEventKind::OperationBegin {
                name: machine.type_name().to_string(),
            },
        ),
        CausalityEvent::new(
            machine_id,
            CausalityEventKind::SynchronousWorkBegin {
                work: SynchronousWork::Execution,
            },
        ),
        CausalityEvent::new(
            input_id,
            CausalityEventKind::WaitBegin {
                behavior: WaitBehavior::Asynchronous,
            },
        ),
        CausalityEvent::new(
            machine_id,
            CausalityEventKind::OperationRelation {
                relation: CausalityRelation::AssignDelegate,
            },
        ),
        CausalityEvent::new(
            input_id,
            CausalityEventKind::ContinuationScheduled {
                continuation_of: Some(machine_id),
            },
        ),
        CausalityEvent::new(
            machine_id,
            CausalityEventKind::SynchronousWorkEnd {
                work: SynchronousWork::Execution,
            },
        ),
        CausalityEvent::new(input_id, CausalityEventKind::WaitEnd),
        CausalityEvent::new(
            machine_id,
            CausalityEventKind::SynchronousWorkBegin {
                work: SynchronousWork::TaskContinuation,
            },
        ),
        CausalityEvent::new(
            machine_id,
            CausalityEventKind::SynchronousWorkBegin {
                work: SynchronousWork::Execution,
            },
        ),
        CausalityEvent::new(
            machine_id,
            CausalityEventKind::SynchronousWorkEnd {
                work: SynchronousWork::Execution,
            },
        ),
        CausalityEvent::new(
            machine_id,
            CausalityEventKind::OperationEnd {
                status: CausalityStatus::Completed,
            },
        ),
        CausalityEvent::new(
            machine_id,
            CausalityEventKind::SynchronousWorkEnd {
                work: SynchronousWork::TaskContinuation,
            },
        ),
    ];

    assert_eq!(sink.events(), expected);
}

#[test]
fn test_disabled_tracing_records_nothing() {
    let _tracing = Tracing::set(false);
    let sink = Arc::new(MemorySink::new());
    let scheduler = scheduler_with(sink.clone());

    run_echo(&scheduler, Operation::pending(), false);
    run_echo(&scheduler, Operation::completed(1), false);

    assert!(sink.events().is_empty());
}

#[derive(Default)]
struct Counting {
    records: AtomicUsize,
}

impl CausalitySink for Counting {
    fn record(&self, _event: CausalityEvent) {
        self.records.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_disabled_tracing_skips_every_hook_call() {
    let _tracing = Tracing::set(false);
    let sink = Arc::new(Counting::default());
    let causality = Causality::new(sink.clone());
    let pool = Arc::new(ThreadPoolBuilder::new().worker_threads(2).build());
    let scheduler = Arc::new(ContinuationScheduler::new(pool.clone()).with_causality(causality.clone()));

    let mut seen: Vec<Placement> = placements(&scheduler)
        .into_iter()
        .map(|(placement, _)| placement)
        .collect();

    for input in [Operation::pending(), Operation::completed(42)] {
        let (placement, output, _) =
            context::enter_scheduler(pool.clone(), || run_echo(&scheduler, input, true));

        assert_eq!(output, Ok(42));
        seen.push(placement);
    }

    let failing = scheduler.start(Failing { stepped: false }).unwrap();
    assert!(failing.completion().get_result().is_err());

    assert_eq!(seen.len(), 6);
    assert!(seen.contains(&Placement::AttachedToScheduler));
    assert!(seen.contains(&Placement::EnqueuedToScheduler));
    assert_eq!(sink.records.load(Ordering::SeqCst), 0);

    // Hooks themselves do not consult the flag.
    causality.wait_end(failing.id());
    assert_eq!(sink.records.load(Ordering::SeqCst), 1);
}

struct Exploding;

impl CausalitySink for Exploding {
    fn record(&self, _event: CausalityEvent) {
        panic!("sink failure");
    }
}

#[test]
fn test_panicking_sink_does_not_disturb_scheduling() {
    let _tracing = Tracing::set(true);
    let scheduler = scheduler_with(Arc::new(Exploding));

    let (placement, output, machine) = run_echo(&scheduler, Operation::pending(), false);

    assert_eq!(placement, Placement::Attached);
    assert_eq!(output, Ok(42));
    assert_eq!(machine.completion().get_result(), Ok(()));
}

/// Faults on its first step.
struct Failing {
    stepped: bool,
}

impl StateMachine for Failing {
    fn advance(&mut self, _this: &Arc<StateMachineBox>) {
        self.stepped = true;
    }

    fn status(&self) -> MachineStatus {
        if self.stepped {
            MachineStatus::Faulted(String::from("no luck"))
        } else {
            MachineStatus::Running
        }
    }
}

#[test]
fn test_faulted_machine_traces_error_status() {
    let _tracing = Tracing::set(true);
    let sink = Arc::new(MemorySink::new());
    let scheduler = scheduler_with(sink.clone());

    let machine = scheduler.start(Failing { stepped: false }).unwrap();

    assert_eq!(
        machine.completion().get_result(),
        Err(OperationError::Faulted(String::from("no luck")))
    );
    assert_eq!(
        sink.take().last(),
        Some(&CausalityEvent::new(
            machine.id(),
            CausalityEventKind::OperationEnd {
                status: CausalityStatus::Error,
            },
        ))
    );
}

#[test]
fn test_default_sink_emits_through_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();

    let _tracing = Tracing::set(true);
    let pool = Arc::new(ThreadPoolBuilder::new().worker_threads(1).build());
    let scheduler = Arc::new(ContinuationScheduler::new(pool));

    let (placement, output, _) = run_echo(&scheduler, Operation::completed(42), false);

    assert_eq!(placement, Placement::QueuedToPool);
    assert_eq!(output, Ok(42));
}
