//! Structured log events emitted during a run (§4.8).
//!
//! The teacher's own event registry (`logging/src/lib.rs`'s `Registry`/
//! `Logger<T>`) predates `dyn Trait` and nothing else in the retrieved corpus
//! reaches for it, so this reimplements the same "emit named events the host
//! process may or may not be subscribed to" idea over `tracing`, the way the
//! rest of the corpus instruments long-running engines
//! (`examples/seanchatmangpt-knhk/rust/chicago-tdd-tools/src/otel.rs`).
//! Emission here is pure observability: it must never affect evaluation
//! order or timing, matching the Observer interface's own guarantee (§6.4).

use crate::node::NodeId;
use crate::time::EngineTime;

/// Emits a `tracing` event for a node starting.
pub fn node_started(node: NodeId, time: EngineTime) {
    tracing::debug!(target: "tsflow::node", ?node, ?time, "node started");
}

/// Emits a `tracing` event for a node stopping.
pub fn node_stopped(node: NodeId, time: EngineTime) {
    tracing::debug!(target: "tsflow::node", ?node, ?time, "node stopped");
}

/// Emits a `tracing` event for one node evaluation.
pub fn node_evaluated(node: NodeId, time: EngineTime, produced_output: bool) {
    tracing::trace!(target: "tsflow::eval", ?node, ?time, produced_output, "node evaluated");
}

/// Emits a `tracing` event when the scheduler coalesces simultaneous events into one tick.
pub fn tick_begin(time: EngineTime, pending: usize) {
    tracing::trace!(target: "tsflow::scheduler", ?time, pending, "tick begin");
}

/// Emits a `tracing` event for a reference input rebinding to a new target.
pub fn reference_rebound(node: NodeId, time: EngineTime) {
    tracing::debug!(target: "tsflow::reference", ?node, ?time, "reference input rebound");
}

/// Emits a `tracing` event for a map-over-TSD key lifecycle transition.
pub fn map_key_event(node: NodeId, time: EngineTime, key: &str, event: &'static str) {
    tracing::debug!(target: "tsflow::nested::map", ?node, ?time, key, event, "map key event");
}

/// Emits a `tracing` event for a switch node's active-branch transition.
pub fn switch_transition(node: NodeId, time: EngineTime, branch: &str) {
    tracing::debug!(target: "tsflow::nested::switch", ?node, ?time, branch, "switch transition");
}

/// Emits a `tracing` event for a try/except node tripping or resetting.
pub fn try_except_event(node: NodeId, time: EngineTime, event: &'static str) {
    tracing::warn!(target: "tsflow::nested::try_except", ?node, ?time, event, "try/except event");
}

/// Emits a `tracing` event for a push-source queue overflow (§7 `ResourceError`).
pub fn resource_error(node: NodeId, dropped: u64) {
    tracing::warn!(target: "tsflow::resource", ?node, dropped, "push-source queue overflow");
}
