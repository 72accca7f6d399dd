//! Try/except: runs a sub-graph, isolating it from the rest of the run by
//! catching any eval error raised inside it (§4.5 "Try/Except", §7).

use crate::drive;
use crate::error::{EvalError, WiringError};
use crate::graph::GraphArena;
use crate::node::{EvalContext, GraphId, NodeId, NodeKind, NodeOps, NodeState};
use crate::scheduler::Scheduler;
use crate::time::EngineTime;
use crate::ts::core::{TimeSeriesInput, TimeSeriesOutput};

/// Builds the guarded sub-graph, given the upstream output to feed it (the
/// try/except node's own `input_source`, re-handed on every (re)attempt).
pub type TryBody<VIn, VOut> =
    Box<dyn Fn(&mut GraphArena, &mut Scheduler, GraphId, TimeSeriesOutput<VIn>) -> TimeSeriesOutput<VOut>>;

/// A snapshot of the eval error that tripped a try/except boundary,
/// published on its `exception` output (§4.5, §7).
#[derive(Clone, Debug)]
pub struct ExceptionRecord {
    /// Path of the node whose eval raised.
    pub node: NodeId,
    /// Engine time of the failing tick.
    pub time: EngineTime,
    /// Human-readable description, copied from the originating [`EvalError`].
    pub message: String,
}

impl From<&EvalError> for ExceptionRecord {
    fn from(err: &EvalError) -> Self {
        ExceptionRecord { node: err.node, time: err.time, message: err.message.clone() }
    }
}

/// A node running a guarded sub-graph: while the sub-graph is healthy, `out`
/// mirrors its output; if any node inside raises, the sub-graph is stopped,
/// `out` goes invalid, and the error is published on `exception`. The
/// sub-graph is rebuilt only when `reset` ticks (§4.5).
pub struct TryExceptNode<VIn: Clone, VOut: Clone> {
    state: NodeState,
    body: TryBody<VIn, VOut>,
    input_source: TimeSeriesOutput<VIn>,
    reset: TimeSeriesInput<bool>,
    pending_reset_source: Option<TimeSeriesOutput<bool>>,
    sub_nodes: Option<Vec<NodeId>>,
    out_input: TimeSeriesInput<VOut>,
    out: TimeSeriesOutput<VOut>,
    exception: TimeSeriesOutput<ExceptionRecord>,
    failed: bool,
}

impl<VIn: Clone, VOut: Clone> TryExceptNode<VIn, VOut> {
    /// Builds a try/except node owned by `owner`, wrapping `body`, fed from
    /// `input_source` and re-armed by `reset`.
    pub fn new(
        owner: NodeId,
        input_source: TimeSeriesOutput<VIn>,
        reset: TimeSeriesOutput<bool>,
        body: TryBody<VIn, VOut>,
    ) -> Self {
        let mut reset_input = TimeSeriesInput::new(owner);
        reset_input.make_active();
        let mut out_input = TimeSeriesInput::new(owner);
        out_input.make_active();
        TryExceptNode {
            state: NodeState::New,
            body,
            input_source,
            reset: reset_input,
            pending_reset_source: Some(reset),
            sub_nodes: None,
            out_input,
            out: TimeSeriesOutput::new(owner),
            exception: TimeSeriesOutput::new(owner),
            failed: false,
        }
    }

    /// The output mirroring the guarded sub-graph's own output while healthy;
    /// invalid whenever the sub-graph has tripped.
    pub fn out(&self) -> TimeSeriesOutput<VOut> {
        self.out.clone()
    }

    /// The output carrying the most recent [`ExceptionRecord`], if the
    /// sub-graph has ever tripped.
    pub fn exception(&self) -> TimeSeriesOutput<ExceptionRecord> {
        self.exception.clone()
    }

    /// Whether the guarded sub-graph is currently tripped, awaiting `reset`.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    fn attempt(&mut self, ctx: &mut EvalContext) -> Result<(), EvalError> {
        let graph = ctx.arena.new_graph(Some(ctx.node));
        let sub_output = (self.body)(ctx.arena, ctx.scheduler, graph, self.input_source.clone());
        let node_ids: Vec<NodeId> = ctx.arena.nodes_in(graph).map(|(i, _)| NodeId::new(graph, i)).collect();
        for &id in &node_ids {
            drive::start_node(ctx.arena, ctx.scheduler, ctx.observers, ctx.now, ctx.wall_now, id)
                .map_err(|e| EvalError::new(ctx.node, ctx.now, format!("try/except sub-graph start failed: {e}")))?;
        }
        self.out_input.unbind();
        self.out_input.bind(ctx, true, sub_output);
        self.sub_nodes = Some(node_ids);
        self.failed = false;
        Ok(())
    }

    fn teardown(&mut self, ctx: &mut EvalContext) {
        if let Some(ids) = self.sub_nodes.take() {
            for id in ids.into_iter().rev() {
                drive::stop_node(ctx.arena, ctx.scheduler, ctx.observers, ctx.now, ctx.wall_now, id);
            }
        }
        self.out_input.unbind();
    }
}

impl<VIn: Clone + 'static, VOut: Clone + 'static> NodeOps for TryExceptNode<VIn, VOut> {
    fn kind(&self) -> NodeKind {
        NodeKind::Nested
    }
    fn state(&self) -> NodeState {
        self.state
    }
    fn name(&self) -> &str {
        "try_except"
    }

    fn start(&mut self, ctx: &mut EvalContext) -> Result<(), WiringError> {
        self.state = NodeState::Started;
        if let Some(source) = self.pending_reset_source.take() {
            self.reset.bind(ctx, true, source);
        }
        self.attempt(ctx).map_err(|e| WiringError::Schema(e.to_string()))
    }

    fn is_eligible(&self, _now: EngineTime) -> bool {
        true
    }

    fn eval(&mut self, ctx: &mut EvalContext) -> Result<(), EvalError> {
        let now = ctx.now;
        if self.failed {
            if self.reset.modified(now) {
                crate::logging::try_except_event(ctx.node, now, "reset");
                self.attempt(ctx)?;
            }
        } else if self.out_input.modified(now) {
            if let Some(v) = self.out_input.value() {
                self.out.apply_result(ctx, v)?;
            }
        }
        ctx.report_eval(!self.failed);
        Ok(())
    }

    fn stop(&mut self, ctx: &mut EvalContext) {
        self.state = NodeState::Stopped;
        self.teardown(ctx);
        ctx.scheduler.discard_node(ctx.node);
    }

    fn is_error_boundary(&self) -> bool {
        true
    }

    fn catch_error(&mut self, ctx: &mut EvalContext, err: &EvalError) {
        self.teardown(ctx);
        self.failed = true;
        self.out.mark_invalid(ctx);
        let record = ExceptionRecord::from(err);
        // The exception output itself cannot fail this write: nothing else
        // writes to it this tick, and `can_apply_result` only ever rejects a
        // second write in the same tick.
        let _ = self.exception.apply_result(ctx, record);
        crate::logging::try_except_event(ctx.node, ctx.now, "trip");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphArena;
    use crate::observer::ObserverRegistry;
    use crate::scheduler::Scheduler;

    /// A sub-graph node that raises whenever its input carries a negative value.
    struct Risky {
        state: NodeState,
        source: TimeSeriesOutput<i64>,
        input: TimeSeriesInput<i64>,
        output: TimeSeriesOutput<i64>,
    }
    impl NodeOps for Risky {
        fn kind(&self) -> NodeKind {
            NodeKind::Compute
        }
        fn state(&self) -> NodeState {
            self.state
        }
        fn start(&mut self, ctx: &mut EvalContext) -> Result<(), WiringError> {
            self.state = NodeState::Started;
            self.input.make_active();
            self.input.bind(ctx, true, self.source.clone());
            Ok(())
        }
        fn is_eligible(&self, now: EngineTime) -> bool {
            self.input.modified(now)
        }
        fn eval(&mut self, ctx: &mut EvalContext) -> Result<(), EvalError> {
            if let Some(v) = self.input.value() {
                if v < 0 {
                    return Err(EvalError::new(ctx.node, ctx.now, "negative input"));
                }
                self.output.apply_result(ctx, v)?;
            }
            ctx.report_eval(true);
            Ok(())
        }
        fn stop(&mut self, ctx: &mut EvalContext) {
            self.state = NodeState::Stopped;
            ctx.scheduler.discard_node(ctx.node);
        }
    }

    fn risky_body() -> TryBody<i64, i64> {
        Box::new(|arena, scheduler, graph, source| {
            let node = Risky {
                state: NodeState::New,
                source,
                input: TimeSeriesInput::new(NodeId::new(graph, 0)),
                output: TimeSeriesOutput::new(NodeId::new(graph, 0)),
            };
            let out = node.output.clone();
            drive::add_and_rank(arena, scheduler, graph, Box::new(node));
            out
        })
    }

    fn ctx<'a>(
        node: NodeId,
        now: EngineTime,
        scheduler: &'a mut Scheduler,
        observers: &'a ObserverRegistry,
        arena: &'a mut GraphArena,
    ) -> EvalContext<'a> {
        EvalContext { node, now, wall_now: now, scheduler, observers, arena }
    }

    #[test]
    fn catches_error_and_reattempts_only_on_reset() {
        let (mut arena, root) = GraphArena::new();
        let guard_id = NodeId::new(root, 0);
        let source_owner = NodeId::new(root, 1);
        let reset_owner = NodeId::new(root, 2);
        let mut sched = Scheduler::new();
        sched.assign_rank(guard_id, 0);
        sched.assign_rank(source_owner, 1);
        sched.assign_rank(reset_owner, 2);
        let observers = ObserverRegistry::new();

        let source: TimeSeriesOutput<i64> = TimeSeriesOutput::new(source_owner);
        let reset: TimeSeriesOutput<bool> = TimeSeriesOutput::new(reset_owner);
        let mut node = TryExceptNode::new(guard_id, source.clone(), reset.clone(), risky_body());

        let t0 = EngineTime::from_micros(0);
        {
            let mut c = ctx(guard_id, t0, &mut sched, &observers, &mut arena);
            node.start(&mut c).unwrap();
        }

        let t1 = EngineTime::from_micros(1);
        {
            let mut c = ctx(source_owner, t1, &mut sched, &observers, &mut arena);
            source.apply_result(&mut c, 5).unwrap();
        }
        // Drive the sub-graph's own node directly (as the evaluator would).
        let sub_id = NodeId::new(1, 0);
        {
            let mut c = ctx(sub_id, t1, &mut sched, &observers, &mut arena);
            drive::eval_node(c.arena, c.scheduler, c.observers, c.now, c.wall_now, sub_id).unwrap();
        }
        {
            let mut c = ctx(guard_id, t1, &mut sched, &observers, &mut arena);
            node.eval(&mut c).unwrap();
        }
        assert_eq!(node.out().value(), Some(5));
        assert!(!node.is_failed());

        let t2 = EngineTime::from_micros(2);
        {
            let mut c = ctx(source_owner, t2, &mut sched, &observers, &mut arena);
            source.apply_result(&mut c, -1).unwrap();
        }
        let err = {
            let mut c = ctx(sub_id, t2, &mut sched, &observers, &mut arena);
            drive::eval_node(c.arena, c.scheduler, c.observers, c.now, c.wall_now, sub_id).unwrap_err()
        };
        {
            let mut c = ctx(guard_id, t2, &mut sched, &observers, &mut arena);
            node.catch_error(&mut c, &err);
        }
        assert!(node.is_failed());
        assert_eq!(node.exception().value().map(|r| r.message), Some("negative input".to_string()));

        // No reset yet: a later tick with a healthy value still does nothing.
        let t3 = EngineTime::from_micros(3);
        {
            let mut c = ctx(guard_id, t3, &mut sched, &observers, &mut arena);
            node.eval(&mut c).unwrap();
        }
        assert!(node.is_failed());

        let t4 = EngineTime::from_micros(4);
        {
            let mut c = ctx(reset_owner, t4, &mut sched, &observers, &mut arena);
            reset.apply_result(&mut c, true).unwrap();
        }
        {
            let mut c = ctx(guard_id, t4, &mut sched, &observers, &mut arena);
            node.eval(&mut c).unwrap();
        }
        assert!(!node.is_failed());
    }
}
