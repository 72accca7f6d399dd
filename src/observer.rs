//! The debug/inspector collaborator's read-only view into a running graph (§6.4).
//!
//! Grounded on the teacher's pluggable logging registry (`log_register` in
//! `timely`'s core, which lets an external sink subscribe to a stream of
//! named events without the producer depending on what's on the other end).
//! Observers never influence evaluation order or timing — they are called
//! from [`crate::evaluator::Evaluator`] after scheduling decisions are
//! already made.

use crate::node::NodeId;
use crate::time::EngineTime;

/// Callbacks the (external) debug/inspector collaborator implements.
///
/// Every method has a no-op default so an observer only needs to implement
/// the events it cares about.
pub trait Observer {
    /// A node finished evaluating at `time`; `produced_output` reports
    /// whether it called `apply_result` on any of its outputs.
    fn on_node_eval(&self, _node: NodeId, _time: EngineTime, _produced_output: bool) {}
    /// A node transitioned to `Started`.
    fn on_node_start(&self, _node: NodeId, _time: EngineTime) {}
    /// A node transitioned to `Stopped`.
    fn on_node_stop(&self, _node: NodeId, _time: EngineTime) {}
    /// The scheduler coalesced one or more simultaneous future events into `time`.
    fn on_tick_begin(&self, _time: EngineTime) {}
    /// A push-source's queue overflowed; `dropped` is the running counter.
    fn on_resource_error(&self, _node: NodeId, _dropped: u64) {}
}

/// A registry of observers subscribed at the graph or node level (§6.4).
///
/// Subscriptions are scoped by [`NodeId`] (graphs are themselves addressed
/// through their owning nested node, so `subscribe_graph` and
/// `subscribe_node` share one table).
#[derive(Default)]
pub struct ObserverRegistry {
    global: Vec<Box<dyn Observer>>,
    scoped: std::collections::HashMap<NodeId, Vec<Box<dyn Observer>>>,
}

impl ObserverRegistry {
    /// A registry with no observers; every callback is a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes an observer to every node in the graph rooted at `root`.
    pub fn subscribe_graph(&mut self, root: NodeId, observer: Box<dyn Observer>) {
        self.scoped.entry(root).or_default().push(observer);
    }

    /// Subscribes an observer to a single node.
    pub fn subscribe_node(&mut self, node: NodeId, observer: Box<dyn Observer>) {
        self.scoped.entry(node).or_default().push(observer);
    }

    /// Subscribes an observer to every event the engine emits.
    pub fn subscribe_all(&mut self, observer: Box<dyn Observer>) {
        self.global.push(observer);
    }

    /// Drops every observer scoped to `node` (used by `unsubscribe_node`/`unsubscribe_graph`).
    pub fn unsubscribe(&mut self, node: NodeId) {
        self.scoped.remove(&node);
    }

    fn for_each(&self, node: NodeId, mut f: impl FnMut(&dyn Observer)) {
        for obs in &self.global {
            f(obs.as_ref());
        }
        if let Some(obs) = self.scoped.get(&node) {
            for o in obs {
                f(o.as_ref());
            }
        }
    }

    pub(crate) fn on_node_eval(&self, node: NodeId, time: EngineTime, produced_output: bool) {
        self.for_each(node, |o| o.on_node_eval(node, time, produced_output));
    }

    pub(crate) fn on_node_start(&self, node: NodeId, time: EngineTime) {
        self.for_each(node, |o| o.on_node_start(node, time));
    }

    pub(crate) fn on_node_stop(&self, node: NodeId, time: EngineTime) {
        self.for_each(node, |o| o.on_node_stop(node, time));
    }

    pub(crate) fn on_tick_begin(&self, time: EngineTime) {
        for obs in &self.global {
            obs.on_tick_begin(time);
        }
    }

    pub(crate) fn on_resource_error(&self, node: NodeId, dropped: u64) {
        self.for_each(node, |o| o.on_resource_error(node, dropped));
    }
}
