//! Feedback edges: a one-tick-delayed connection that permits cycles (§4.6, §8 invariant 5).
//!
//! A feedback node sits on the back-edge of a cycle. Per §9's arena-indices
//! resolution this is "a normal index with a delay-by-one-tick flag" rather
//! than a native reference cycle: the node captures its input's value when
//! the input ticks, but only commits (and thus only notifies subscribers)
//! once the evaluator has moved on to a strictly later tick — achieved via
//! [`crate::scheduler::Scheduler`]'s deferred-notify queue rather than by
//! guessing the next tick's absolute time in advance.

use crate::error::{EvalError, WiringError};
use crate::node::{EvalContext, NodeId, NodeKind, NodeOps, NodeState};
use crate::time::EngineTime;
use crate::ts::core::TimeSeriesInput;
use crate::ts::core::TimeSeriesOutput;

/// A one-tick-delay relay: `output` at tick `T'` equals `input` at the
/// latest tick `T < T'` at which `input` ticked.
pub struct FeedbackNode<T: Clone> {
    state: NodeState,
    input: TimeSeriesInput<T>,
    output: TimeSeriesOutput<T>,
    pending: Option<T>,
}

impl<T: Clone> FeedbackNode<T> {
    /// Builds an unbound feedback relay owned by `owner`.
    pub fn new(owner: NodeId) -> Self {
        FeedbackNode {
            state: NodeState::New,
            input: TimeSeriesInput::new(owner),
            output: TimeSeriesOutput::new(owner),
            pending: None,
        }
    }

    /// Connects the loop body's output as this feedback edge's input
    /// (`handle.connect_loop`-style wiring, per the teacher's own feedback operator).
    pub fn connect(&mut self, ctx: &mut EvalContext, started: bool, body_output: TimeSeriesOutput<T>) {
        self.input.make_active();
        self.input.bind(ctx, started, body_output);
    }

    /// The delayed output the loop body (and anything else) reads from.
    pub fn output(&self) -> TimeSeriesOutput<T> {
        self.output.clone()
    }
}

impl<T: Clone + 'static> NodeOps for FeedbackNode<T> {
    fn kind(&self) -> NodeKind {
        NodeKind::Compute
    }
    fn state(&self) -> NodeState {
        self.state
    }
    fn name(&self) -> &str {
        "feedback"
    }

    fn start(&mut self, _ctx: &mut EvalContext) -> Result<(), WiringError> {
        self.state = NodeState::Started;
        Ok(())
    }

    fn is_eligible(&self, _now: EngineTime) -> bool {
        // Membership in the pending set already proves "active input ticked
        // or a self-event fired" (§4.2); a feedback relay has no further
        // valid/all_valid precondition of its own.
        true
    }

    fn eval(&mut self, ctx: &mut EvalContext) -> Result<(), EvalError> {
        // Promote first: `pending` was captured at a strictly earlier tick
        // (we only got here because that capture deferred a notify that just
        // fired), so this commit is the "next tick" the input's write becomes
        // visible at (§8 invariant 5).
        if let Some(value) = self.pending.take() {
            self.output.apply_result(ctx, value)?;
        }
        if self.input.modified(ctx.now) {
            if let Some(value) = self.input.value() {
                self.pending = Some(value);
                ctx.scheduler.notify_deferred(ctx.node);
            }
        }
        ctx.report_eval(self.pending.is_none());
        Ok(())
    }

    fn stop(&mut self, ctx: &mut EvalContext) {
        self.state = NodeState::Stopped;
        ctx.scheduler.discard_node(ctx.node);
    }
}
