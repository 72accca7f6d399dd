//! Pull-source nodes: produce ticks from an internal generator the scheduler
//! re-arms on every fire (§4.2, §9 "coroutine pull-sources").
//!
//! Grounded on the same resumable-state-object resolution §9 prescribes in
//! place of a genuine coroutine: the generator is a plain `step()` method the
//! node calls once per fire, mirroring how the teacher's own periodic
//! operators (`timely`'s `to_stream`/`Capture` sources) re-arm themselves via
//! an explicit "produce next, schedule its delivery" step rather than an
//! `async` generator.

use std::time::Duration;

use crate::error::{EvalError, WiringError};
use crate::node::{EvalContext, NodeId, NodeKind, NodeOps, NodeState};
use crate::time::EngineTime;
use crate::ts::core::TimeSeriesOutput;

/// A resumable generator a pull-source node owns. `step` yields the delay
/// until the next value and the value itself, or `None` once exhausted.
pub trait PullGenerator<T> {
    /// Produces the next `(delta_t, value)` pair, or `None` if the source has
    /// nothing further to emit.
    fn step(&mut self) -> Option<(Duration, T)>;
}

/// Adapts a plain closure into a [`PullGenerator`]; convenient for tests and
/// small embedded sources that don't warrant their own named type.
pub struct FnGenerator<F>(pub F);

impl<T, F: FnMut() -> Option<(Duration, T)>> PullGenerator<T> for FnGenerator<F> {
    fn step(&mut self) -> Option<(Duration, T)> {
        (self.0)()
    }
}

/// A node producing ticks from an internal generator (§4.2 "Pull-source").
pub struct PullSourceNode<T: Clone, G> {
    state: NodeState,
    generator: G,
    output: TimeSeriesOutput<T>,
    pending: Option<T>,
    /// Whether re-arm events should be paced against wall-clock time in
    /// real-time mode (§4.3 `schedule(..., on_wall_clock)`).
    on_wall_clock: bool,
}

impl<T: Clone, G: PullGenerator<T>> PullSourceNode<T, G> {
    /// Builds a pull-source node owned by `owner`, driven by `generator`.
    pub fn new(owner: NodeId, generator: G) -> Self {
        PullSourceNode {
            state: NodeState::New,
            generator,
            output: TimeSeriesOutput::new(owner),
            pending: None,
            on_wall_clock: false,
        }
    }

    /// Marks this source's re-arm events as wall-clock-paced (§4.3); use for
    /// sources meant to fire at real intervals under `EvalMode::RealTime`.
    pub fn with_wall_clock_pacing(mut self) -> Self {
        self.on_wall_clock = true;
        self
    }

    /// The output this source writes ticks to.
    pub fn output(&self) -> TimeSeriesOutput<T> {
        self.output.clone()
    }

    fn arm(&mut self, ctx: &mut EvalContext) {
        if let Some((delta, value)) = self.generator.step() {
            self.pending = Some(value);
            let next = ctx.now.saturating_add(delta);
            ctx.scheduler.schedule(ctx.node, next, ctx.now, self.on_wall_clock);
        }
    }
}

impl<T: Clone + 'static, G: PullGenerator<T> + 'static> NodeOps for PullSourceNode<T, G> {
    fn kind(&self) -> NodeKind {
        NodeKind::PullSource
    }
    fn state(&self) -> NodeState {
        self.state
    }
    fn name(&self) -> &str {
        "pull_source"
    }

    fn start(&mut self, ctx: &mut EvalContext) -> Result<(), WiringError> {
        self.state = NodeState::Started;
        self.arm(ctx);
        Ok(())
    }

    fn is_eligible(&self, _now: EngineTime) -> bool {
        // Only ever pending because the scheduler fired a self-event it
        // armed itself (§4.3); no further precondition.
        true
    }

    fn eval(&mut self, ctx: &mut EvalContext) -> Result<(), EvalError> {
        let produced = self.pending.is_some();
        if let Some(value) = self.pending.take() {
            self.output.apply_result(ctx, value)?;
        }
        self.arm(ctx);
        ctx.report_eval(produced);
        Ok(())
    }

    fn stop(&mut self, ctx: &mut EvalContext) {
        self.state = NodeState::Stopped;
        ctx.scheduler.discard_node(ctx.node);
    }
}
