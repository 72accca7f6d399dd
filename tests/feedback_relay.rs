//! End-to-end coverage of the one-tick-delay feedback relay (§8 invariant 5,
//! scenario S2), driven through the real [`Evaluator`] rather than by hand.
//!
//! A pull-source ticks a plain counter every microsecond; a feedback relay
//! subscribes to it. Because the relay's own deferred-commit lands on
//! exactly the tick the source's next scheduled event also fires, the two
//! coalesce and the relay always sees the source's fresh write before it
//! promotes its own captured value — so its output always lags the source's
//! by exactly one tick.

use std::time::Duration;

use tsflow::config::EvaluatorConfig;
use tsflow::error::{EvalError, WiringError};
use tsflow::evaluator::Evaluator;
use tsflow::feedback::FeedbackNode;
use tsflow::node::{EvalContext, NodeId, NodeKind, NodeOps, NodeState};
use tsflow::pull_source::{FnGenerator, PullSourceNode};
use tsflow::time::EngineTime;
use tsflow::ts::core::{ErasedTs, TimeSeriesOutput};

/// Wires a [`FeedbackNode`] to its upstream source during `start`, the same
/// "pending source, bound lazily" pattern the nested operators use for
/// sub-graph outputs that aren't known until the engine is already running.
struct FeedbackRelay {
    inner: FeedbackNode<i64>,
    pending_source: Option<TimeSeriesOutput<i64>>,
}

impl NodeOps for FeedbackRelay {
    fn kind(&self) -> NodeKind {
        self.inner.kind()
    }
    fn state(&self) -> NodeState {
        self.inner.state()
    }
    fn start(&mut self, ctx: &mut EvalContext) -> Result<(), WiringError> {
        if let Some(source) = self.pending_source.take() {
            self.inner.connect(ctx, true, source);
        }
        self.inner.start(ctx)
    }
    fn is_eligible(&self, now: EngineTime) -> bool {
        self.inner.is_eligible(now)
    }
    fn eval(&mut self, ctx: &mut EvalContext) -> Result<(), EvalError> {
        self.inner.eval(ctx)
    }
    fn stop(&mut self, ctx: &mut EvalContext) {
        self.inner.stop(ctx)
    }
}

#[test]
fn relay_output_lags_source_by_exactly_one_tick() {
    let mut ev = Evaluator::new(EvaluatorConfig::simulation());
    let root = ev.root();

    let source_id = NodeId::new(root, 0);
    let relay_id = NodeId::new(root, 1);

    let mut remaining = vec![10, 20, 30];
    remaining.reverse();
    let source = PullSourceNode::new(
        source_id,
        FnGenerator(move || remaining.pop().map(|v| (Duration::from_micros(1), v))),
    );
    let source_output = source.output();

    let relay = FeedbackRelay {
        inner: FeedbackNode::new(relay_id),
        pending_source: Some(source_output.clone()),
    };
    let relay_output = relay.inner.output();

    assert_eq!(ev.add_node(Box::new(source)), source_id);
    assert_eq!(ev.add_node(Box::new(relay)), relay_id);

    let report = ev.run().unwrap();

    assert_eq!(source_output.value(), Some(30));
    assert_eq!(relay_output.value(), Some(30));
    // The relay's final commit lands one tick after the source's final
    // write: the source stops at t=3us, the relay flushes its last capture
    // at the manufactured t=4us tick.
    assert_eq!(source_output.last_modified_time(), EngineTime::from_micros(3));
    assert_eq!(relay_output.last_modified_time(), EngineTime::from_micros(4));
    assert_eq!(report.ticks, 4);
}
