//! Map over TSD[K, V]: one inner graph per key (§4.5, §8 S3).

use std::collections::BTreeMap;
use std::fmt;

use crate::drive;
use crate::error::{EvalError, WiringError};
use crate::graph::GraphArena;
use crate::node::{EvalContext, GraphId, NodeId, NodeKind, NodeOps, NodeState};
use crate::time::EngineTime;
use crate::ts::core::TimeSeriesOutput;
use crate::ts::tsd::Tsd;

/// Builds the sub-graph for one key: adds whatever nodes it needs to
/// `graph` (via `arena`/`scheduler`, ranked the same way the top-level graph
/// builder ranks root nodes) and returns the output to publish under that key.
pub type MapBody<K, VIn, VOut> = Box<
    dyn Fn(&mut GraphArena, &mut crate::scheduler::Scheduler, GraphId, &K, TimeSeriesOutput<VIn>) -> TimeSeriesOutput<VOut>,
>;

struct SubGraph {
    graph: GraphId,
    node_ids: Vec<NodeId>,
}

/// A node maintaining one inner graph per key of an input [`Tsd`], mirroring
/// the keys onto an output `Tsd` (§4.5 "Map over TSD").
pub struct MapNode<K: Ord + Clone + fmt::Debug, VIn: Clone, VOut: Clone> {
    state: NodeState,
    input: Tsd<K, VIn>,
    output: Tsd<K, VOut>,
    body: MapBody<K, VIn, VOut>,
    subgraphs: BTreeMap<K, SubGraph>,
}

impl<K: Ord + Clone + fmt::Debug, VIn: Clone, VOut: Clone> MapNode<K, VIn, VOut> {
    /// Builds a map node owned by `owner`, reading keys from `input` and
    /// publishing one sub-graph output per key onto `output`.
    pub fn new(owner: NodeId, input: Tsd<K, VIn>, body: MapBody<K, VIn, VOut>) -> Self {
        MapNode { state: NodeState::New, input, output: Tsd::new(owner), body, subgraphs: BTreeMap::new() }
    }

    /// The keyed output this node mirrors the live sub-graphs onto.
    pub fn output(&self) -> Tsd<K, VOut> {
        self.output.clone()
    }

    fn start_subgraph_nodes(&self, ctx: &mut EvalContext, ids: &[NodeId]) -> Result<(), EvalError> {
        for &id in ids {
            drive::start_node(ctx.arena, ctx.scheduler, ctx.observers, ctx.now, ctx.wall_now, id)
                .map_err(|e| EvalError::new(ctx.node, ctx.now, format!("map sub-graph start failed: {e}")))?;
        }
        Ok(())
    }

    fn stop_subgraph_nodes(ctx: &mut EvalContext, ids: Vec<NodeId>) {
        for id in ids.into_iter().rev() {
            drive::stop_node(ctx.arena, ctx.scheduler, ctx.observers, ctx.now, ctx.wall_now, id);
        }
    }
}

impl<K: Ord + Clone + fmt::Debug + 'static, VIn: Clone + 'static, VOut: Clone + 'static> NodeOps
    for MapNode<K, VIn, VOut>
{
    fn kind(&self) -> NodeKind {
        NodeKind::Nested
    }
    fn state(&self) -> NodeState {
        self.state
    }
    fn name(&self) -> &str {
        "map"
    }

    fn start(&mut self, ctx: &mut EvalContext) -> Result<(), WiringError> {
        self.state = NodeState::Started;
        self.input.subscribe_node(ctx.node);
        Ok(())
    }

    fn is_eligible(&self, _now: EngineTime) -> bool {
        // Membership in the pending set already proves the TSD changed or
        // this node raised its own self-event; no further precondition.
        true
    }

    fn eval(&mut self, ctx: &mut EvalContext) -> Result<(), EvalError> {
        let now = ctx.now;

        for key in self.input.removed_keys(now) {
            if let Some(sub) = self.subgraphs.remove(&key) {
                Self::stop_subgraph_nodes(ctx, sub.node_ids);
                self.output.remove(ctx, &key);
                crate::logging::map_key_event(ctx.node, now, &format!("{key:?}"), "stop");
            }
        }

        for key in self.input.added_keys(now) {
            let Some(per_key_input) = self.input.get(&key) else { continue };
            let graph = ctx.arena.new_graph(Some(ctx.node));
            let sub_output = (self.body)(ctx.arena, ctx.scheduler, graph, &key, per_key_input);
            let node_ids: Vec<NodeId> =
                ctx.arena.nodes_in(graph).map(|(i, _)| NodeId::new(graph, i)).collect();
            self.start_subgraph_nodes(ctx, &node_ids)?;
            self.output.insert_output(ctx, key.clone(), sub_output);
            self.subgraphs.insert(key.clone(), SubGraph { graph, node_ids });
            crate::logging::map_key_event(ctx.node, now, &format!("{key:?}"), "start");
        }

        // modified_keys need no action here: the sub-graph's own nodes are
        // already woken directly by the flat scheduler via their own
        // subscriptions, and the output TSD aliases their output cells.
        ctx.report_eval(true);
        Ok(())
    }

    fn stop(&mut self, ctx: &mut EvalContext) {
        self.state = NodeState::Stopped;
        let keys: Vec<K> = self.subgraphs.keys().cloned().collect();
        for key in keys {
            if let Some(sub) = self.subgraphs.remove(&key) {
                Self::stop_subgraph_nodes(ctx, sub.node_ids);
            }
        }
        ctx.scheduler.discard_node(ctx.node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphArena;
    use crate::observer::ObserverRegistry;
    use crate::scheduler::Scheduler;
    use crate::ts::core::TimeSeriesInput;

    /// A trivial sub-graph node: doubles whatever its per-key input carries.
    /// Binding happens in `start`, the way a real wiring front-end's
    /// generated node would, once the node has its own `NodeId`.
    struct Doubler {
        state: NodeState,
        per_key_input: TimeSeriesOutput<i64>,
        input: TimeSeriesInput<i64>,
        output: TimeSeriesOutput<i64>,
    }
    impl NodeOps for Doubler {
        fn kind(&self) -> NodeKind {
            NodeKind::Compute
        }
        fn state(&self) -> NodeState {
            self.state
        }
        fn start(&mut self, ctx: &mut EvalContext) -> Result<(), WiringError> {
            self.state = NodeState::Started;
            self.input.make_active();
            self.input.bind(ctx, true, self.per_key_input.clone());
            Ok(())
        }
        fn is_eligible(&self, now: EngineTime) -> bool {
            self.input.modified(now)
        }
        fn eval(&mut self, ctx: &mut EvalContext) -> Result<(), EvalError> {
            if let Some(v) = self.input.value() {
                self.output.apply_result(ctx, v * 2)?;
            }
            ctx.report_eval(true);
            Ok(())
        }
        fn stop(&mut self, ctx: &mut EvalContext) {
            self.state = NodeState::Stopped;
            ctx.scheduler.discard_node(ctx.node);
        }
    }

    fn double_body() -> MapBody<String, i64, i64> {
        Box::new(|arena, scheduler, graph, _key, per_key_input| {
            let doubler = Doubler {
                state: NodeState::New,
                per_key_input,
                input: TimeSeriesInput::new(NodeId::new(graph, 0)),
                output: TimeSeriesOutput::new(NodeId::new(graph, 0)),
            };
            let out = doubler.output.clone();
            drive::add_and_rank(arena, scheduler, graph, Box::new(doubler));
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

    /// §8 S3: keys `{a:1}` at t=1, `{a:2,b:3}` at t=2, `{a:REMOVE}` at t=3;
    /// inner graphs started {a} at t=1, {b} at t=2; stopped {a} at t=3.
    #[test]
    fn scenario_s3_inner_graphs_start_and_stop_on_key_churn() {
        let (mut arena, root) = GraphArena::new();
        let map_id = NodeId::new(root, 0);
        let upstream = NodeId::new(root, 1);
        let mut sched = Scheduler::new();
        sched.assign_rank(map_id, 0);
        sched.assign_rank(upstream, 1);
        let observers = ObserverRegistry::new();

        let input: Tsd<String, i64> = Tsd::new(upstream);
        let mut map = MapNode::new(map_id, input.clone(), double_body());

        let t1 = EngineTime::from_micros(1);
        {
            let mut c = ctx(upstream, t1, &mut sched, &observers, &mut arena);
            input.set(&mut c, "a".to_string(), 1).unwrap();
        }
        {
            let mut c = ctx(map_id, t1, &mut sched, &observers, &mut arena);
            map.start(&mut c).unwrap();
            map.eval(&mut c).unwrap();
        }
        assert_eq!(map.subgraphs.len(), 1);
        assert!(map.output.get(&"a".to_string()).is_some());

        let t2 = EngineTime::from_micros(2);
        {
            let mut c = ctx(upstream, t2, &mut sched, &observers, &mut arena);
            input.set(&mut c, "a".to_string(), 2).unwrap();
            input.set(&mut c, "b".to_string(), 3).unwrap();
        }
        {
            let mut c = ctx(map_id, t2, &mut sched, &observers, &mut arena);
            map.eval(&mut c).unwrap();
        }
        assert_eq!(map.subgraphs.len(), 2);

        let t3 = EngineTime::from_micros(3);
        {
            let mut c = ctx(upstream, t3, &mut sched, &observers, &mut arena);
            input.remove(&mut c, &"a".to_string());
        }
        {
            let mut c = ctx(map_id, t3, &mut sched, &observers, &mut arena);
            map.eval(&mut c).unwrap();
        }
        assert_eq!(map.subgraphs.len(), 1);
        assert!(map.subgraphs.contains_key(&"b".to_string()));
        assert!(map.output.get(&"a".to_string()).is_none());
    }
}
