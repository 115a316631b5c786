use reprise::continuation::{continuation_operation, describe_origin, unwrap_to_origin};
use reprise::operation::OperationRef;
use reprise::{
    Continuation, ContinuationWrapper, Operation, StateMachine, StateMachineBox,
    StateMachineDescriptor,
};

use proptest::prelude::*;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Idle {
    steps: Arc<AtomicUsize>,
}

impl StateMachine for Idle {
    fn advance(&mut self, _this: &Arc<StateMachineBox>) {
        self.steps.fetch_add(1, Ordering::SeqCst);
    }

    fn describe(&self) -> StateMachineDescriptor {
        StateMachineDescriptor::new("Idle").field("steps", &self.steps.load(Ordering::SeqCst))
    }
}

struct Opaque;

impl StateMachine for Opaque {
    fn advance(&mut self, _this: &Arc<StateMachineBox>) {}

    fn describe(&self) -> StateMachineDescriptor {
        panic!("descriptor unavailable");
    }
}

fn idle() -> (Arc<StateMachineBox>, Arc<AtomicUsize>) {
    let steps = Arc::new(AtomicUsize::new(0));
    let machine = StateMachineBox::new(Idle {
        steps: steps.clone(),
    })
    .unwrap();

    (machine, steps)
}

fn passthrough(continuation: Continuation, operation: Option<OperationRef>) -> Continuation {
    ContinuationWrapper::wrap(continuation, |inner, _| inner.invoke(), operation)
}

proptest! {
    #[test]
    fn unwrap_terminates_at_any_depth(depth in 0usize..=1000, rooted in any::<bool>()) {
        let (machine, _) = idle();

        let mut continuation = if rooted {
            machine.continuation()
        } else {
            Continuation::from_fn(|| {})
        };

        for _ in 0..depth {
            continuation = passthrough(continuation, None);
        }

        let origin = unwrap_to_origin(&continuation).map(|origin| origin.id());
        prop_assert_eq!(origin, rooted.then(|| machine.id()));
    }

    #[test]
    fn operation_is_inherited_through_any_depth(depth in 1usize..=200) {
        let (machine, _) = idle();
        let awaited: OperationRef = Operation::<u8>::pending();
        let awaited_id = awaited.id();

        let mut continuation = passthrough(machine.continuation(), Some(awaited));
        for _ in 1..depth {
            continuation = passthrough(continuation, None);
        }

        let inherited = continuation_operation(&continuation).map(|operation| operation.id());
        prop_assert_eq!(inherited, Some(awaited_id));
    }
}

#[test]
fn test_invoking_chain_advances_origin_once() {
    let (machine, steps) = idle();

    let mut continuation = machine.continuation();
    for _ in 0..100 {
        continuation = passthrough(continuation, None);
    }

    continuation.invoke();
    assert_eq!(steps.load(Ordering::SeqCst), 1);
}

#[test]
fn test_describe_origin_through_wrappers() {
    let (machine, _) = idle();
    let continuation = passthrough(passthrough(machine.continuation(), None), None);

    let descriptor = describe_origin(&continuation).unwrap();
    assert_eq!(descriptor.to_string(), "Idle\n    steps: 0\n");
}

#[test]
fn test_describe_origin_contains_panics() {
    let machine = StateMachineBox::new(Opaque).unwrap();
    let continuation = passthrough(machine.continuation(), None);

    assert!(describe_origin(&continuation).is_none());
}

#[test]
fn test_action_chain_has_no_origin() {
    let continuation = passthrough(Continuation::from_fn(|| {}), None);

    assert!(unwrap_to_origin(&continuation).is_none());
    assert!(describe_origin(&continuation).is_none());
}
