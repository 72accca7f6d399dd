//! Shared node-lifecycle driver (§4.4, §9 "arena indices").
//!
//! Every caller that invokes a node's `start`/`eval`/`stop` hook needs to
//! hand that hook a `&mut GraphArena` of its own (so nested nodes can build
//! or tear down their inner graph during the call), while the node itself
//! still lives inside that same arena. Rust's aliasing rules forbid holding
//! both at once, so the node is removed from its arena slot for the
//! duration of the call and restored immediately after. This dance is
//! needed identically by the top-level [`crate::evaluator::Evaluator`] and
//! by nested graph operators driving their own inner graphs, so it lives
//! here rather than being duplicated in both places.

use crate::error::{EvalError, WiringError};
use crate::graph::GraphArena;
use crate::node::{EvalContext, GraphId, NodeId, NodeOps};
use crate::observer::ObserverRegistry;
use crate::scheduler::Scheduler;
use crate::time::EngineTime;

/// Adds `node` to `graph` and assigns it the build-order rank the arena hands
/// back, in one step (§4.3) — every nested graph operator builds its
/// sub-graph nodes this way, the same two calls the top-level graph builder
/// makes for root-level nodes.
pub(crate) fn add_and_rank(
    arena: &mut GraphArena,
    scheduler: &mut Scheduler,
    graph: GraphId,
    node: Box<dyn NodeOps>,
) -> NodeId {
    let (id, rank) = arena.add_node(graph, node);
    scheduler.assign_rank(id, rank);
    id
}

/// Drives `node`'s `start` hook.
pub(crate) fn start_node(
    arena: &mut GraphArena,
    scheduler: &mut Scheduler,
    observers: &ObserverRegistry,
    now: EngineTime,
    wall_now: EngineTime,
    node: NodeId,
) -> Result<(), WiringError> {
    let mut n = arena.remove_node(node).expect("start_node: node missing from arena");
    let result = {
        let mut ctx = EvalContext { node, now, wall_now, scheduler, observers, arena: &mut *arena };
        n.start(&mut ctx)
    };
    arena.restore_node(node, n);
    if result.is_ok() {
        observers.on_node_start(node, now);
        crate::logging::node_started(node, now);
    }
    result
}

/// Drives `node`'s `eval` hook. Returns whatever the node's `eval` returns;
/// the node itself is responsible for calling `ctx.report_eval` (§4.8).
pub(crate) fn eval_node(
    arena: &mut GraphArena,
    scheduler: &mut Scheduler,
    observers: &ObserverRegistry,
    now: EngineTime,
    wall_now: EngineTime,
    node: NodeId,
) -> Result<(), EvalError> {
    let mut n = arena.remove_node(node).expect("eval_node: node missing from arena");
    let result = {
        let mut ctx = EvalContext { node, now, wall_now, scheduler, observers, arena: &mut *arena };
        n.eval(&mut ctx)
    };
    arena.restore_node(node, n);
    result
}

/// Drives `node`'s `stop` hook. Infallible per [`crate::node::NodeOps::stop`].
pub(crate) fn stop_node(
    arena: &mut GraphArena,
    scheduler: &mut Scheduler,
    observers: &ObserverRegistry,
    now: EngineTime,
    wall_now: EngineTime,
    node: NodeId,
) {
    let mut n = arena.remove_node(node).expect("stop_node: node missing from arena");
    {
        let mut ctx = EvalContext { node, now, wall_now, scheduler, observers, arena: &mut *arena };
        n.stop(&mut ctx);
    }
    arena.restore_node(node, n);
    observers.on_node_stop(node, now);
    crate::logging::node_stopped(node, now);
}

/// Drives `node`'s `poll_external` hook (push-sources only; default `false`
/// for every other kind, §4.2).
pub(crate) fn poll_external(arena: &mut GraphArena, node: NodeId) -> bool {
    arena.node_mut(node).poll_external()
}

/// Whether `node` is currently eligible to evaluate, per its own `is_eligible` (§4.2).
pub(crate) fn is_eligible(arena: &GraphArena, node: NodeId, now: EngineTime) -> bool {
    arena.node(node).is_eligible(now)
}

/// Delivers an eval error to the try/except boundary `node` (§4.5, §7).
pub(crate) fn catch_error(
    arena: &mut GraphArena,
    scheduler: &mut Scheduler,
    observers: &ObserverRegistry,
    now: EngineTime,
    wall_now: EngineTime,
    node: NodeId,
    err: &EvalError,
) {
    let mut n = arena.remove_node(node).expect("catch_error: node missing from arena");
    {
        let mut ctx = EvalContext { node, now, wall_now, scheduler, observers, arena: &mut *arena };
        n.catch_error(&mut ctx, err);
    }
    arena.restore_node(node, n);
}
