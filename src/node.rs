//! The per-node state machine and its addressing scheme (§3, §4.2).
//!
//! Nodes are addressable as a path of integer indices from the root graph
//! (`node_id = (graph_id..., node_ndx)`, §3). Rather than store the full path
//! on every node, a [`NodeId`] is a cheap `(graph, index)` pair into the
//! evaluator's graph arena (`graph.rs`); the full path is reconstructed on
//! demand by walking parent links, matching the "arena indices, no native
//! cycles" resolution in §9's design notes.

use std::fmt;

use crate::error::{EvalError, WiringError};
use crate::graph::GraphArena;
use crate::observer::ObserverRegistry;
use crate::scheduler::Scheduler;
use crate::time::EngineTime;

/// Index of a graph in the evaluator's graph arena.
pub type GraphId = usize;

/// Address of a node: the graph that owns it, plus its position within that
/// graph's build order.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// The graph this node lives in.
    pub graph: GraphId,
    /// Index of the node within `graph`'s node list (its build-order rank).
    pub index: usize,
}

impl NodeId {
    /// Constructs a node id directly; used by [`crate::graph::GraphArena::add_node`].
    pub fn new(graph: GraphId, index: usize) -> Self {
        NodeId { graph, index }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node(g{}, #{})", self.graph, self.index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What kind of producer/consumer role a node plays (§4.2).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NodeKind {
    /// Produces ticks from an internal generator, re-armed by the scheduler.
    PullSource,
    /// Fed from an external thread via a bounded queue.
    PushSource,
    /// Reads inputs, writes one output.
    Compute,
    /// Reads inputs, produces no output.
    Sink,
    /// Wraps and drives an inner graph as part of this node's own evaluation.
    Nested,
}

/// Lifecycle state of a node (§3 "Lifecycle").
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NodeState {
    /// Constructed, not yet started.
    New,
    /// Started; eligible to evaluate.
    Started,
    /// Stopped; no longer evaluated, scheduled events discarded.
    Stopped,
}

/// Context handed to a node's lifecycle and eval hooks.
///
/// Carries everything a node needs to interact with the rest of the engine
/// without holding a reference to another node directly — outputs are
/// reached through bound `Rc<RefCell<_>>` cells, never through `ctx`. This
/// mirrors the "pass an evaluator context object down the call chain, no
/// process-wide singletons" resolution in §9.
pub struct EvalContext<'a> {
    /// The node this context was created for.
    pub node: NodeId,
    /// The engine's logical clock for the current tick (`evaluation_time`, §4.7).
    pub now: EngineTime,
    /// Wall-clock reading for the current tick (real-time mode only; equal to
    /// `now` in simulation, per §4.7's `EvaluationClock::now`).
    pub wall_now: EngineTime,
    /// The scheduler, for self re-arming (pull-sources) and notifications.
    pub scheduler: &'a mut Scheduler,
    /// Pluggable observers (§6.4); never influence evaluation order.
    pub observers: &'a ObserverRegistry,
    /// The graph arena, for nested nodes (§4.5) to build/tear down inner
    /// graphs during their own evaluation. Safe to hand out here because the
    /// evaluator always swaps the currently-evaluating node out of the arena
    /// before constructing its `EvalContext` (§9 "arena indices").
    pub arena: &'a mut GraphArena,
}

impl<'a> EvalContext<'a> {
    /// Emits an observer callback and a structured log event reporting this
    /// node's evaluation (§4.8); called by every `NodeOps::eval` implementation.
    pub fn report_eval(&self, produced_output: bool) {
        self.observers.on_node_eval(self.node, self.now, produced_output);
        crate::logging::node_evaluated(self.node, self.now, produced_output);
    }
}

/// The operations every node kind implements (§4.2).
///
/// `eval` commits its own output(s) by calling `apply_result` on the node's
/// owned [`crate::ts::core::TimeSeriesOutput`] cell(s); there is no separate
/// "return the update" path; not writing is simply not calling
/// `apply_result`, matching "Result `None` means do not commit".
pub trait NodeOps {
    /// Which role this node plays.
    fn kind(&self) -> NodeKind;

    /// Current lifecycle state.
    fn state(&self) -> NodeState;

    /// Human-readable name for logging; defaults to the kind's debug name.
    fn name(&self) -> &str {
        "node"
    }

    /// Called once, in build order, when the engine starts the graph.
    fn start(&mut self, ctx: &mut EvalContext) -> Result<(), WiringError>;

    /// Whether this node should be given a chance to evaluate at `ctx.now`
    /// (§4.2 "eligible to evaluate"): started, at least one active input
    /// modified or a self-event raised, and the `valid`/`all_valid`
    /// preconditions hold. Each node type knows its own input set and
    /// implements this directly; `true` here does not guarantee a write —
    /// `eval` may still choose not to call `apply_result`.
    fn is_eligible(&self, now: EngineTime) -> bool;

    /// For push-source nodes: drains externally delivered values into
    /// internal state and reports whether at least one is now waiting to be
    /// applied (§4.2, §5). Default: not a push-source, nothing to drain.
    fn poll_external(&mut self) -> bool {
        false
    }

    /// Evaluate at the current tick. Implementations read their bound
    /// inputs and, if they choose to produce a value, call `apply_result`
    /// on their own output cell(s).
    fn eval(&mut self, ctx: &mut EvalContext) -> Result<(), EvalError>;

    /// Called once, in reverse build order, when the engine stops.
    fn stop(&mut self, ctx: &mut EvalContext);

    /// Whether this node catches eval errors raised by nodes in the inner
    /// graph it owns (§4.5 try/except, §7 "unwind to the nearest try/except
    /// wrapper"). Default: not a boundary.
    fn is_error_boundary(&self) -> bool {
        false
    }

    /// Delivers an eval error raised by a node somewhere inside this node's
    /// owned sub-graph; only called when `is_error_boundary` is `true`.
    /// Default: unreachable, since non-boundaries are never asked.
    fn catch_error(&mut self, _ctx: &mut EvalContext, _err: &EvalError) {}
}
