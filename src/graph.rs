//! The graph arena: nodes live in `Vec`-backed slots, edges are indices (§3, §9).
//!
//! Nested graphs (map/switch/try-except, §4.5) are built and torn down at
//! runtime, so graphs themselves live in an arena on the [`crate::evaluator::Evaluator`]
//! rather than as a fixed tree, per the "arena indices; no native reference
//! cycles" resolution in §9.

use crate::node::{GraphId, NodeId, NodeOps};

/// One graph: an ordered list of nodes plus parent linkage (§3).
pub struct Graph {
    /// The nested node that owns this graph, if it is not the root.
    pub owner: Option<NodeId>,
    pub(crate) nodes: Vec<Option<Box<dyn NodeOps>>>,
}

impl Graph {
    fn new(owner: Option<NodeId>) -> Self {
        Graph { owner, nodes: Vec::new() }
    }
}

/// Owns every [`Graph`] created during a run, root and nested alike.
#[derive(Default)]
pub struct GraphArena {
    graphs: Vec<Graph>,
    /// Global build-order counter; assigning it at node-add time is what
    /// makes nested-graph nodes interleave by parent order (§4.3) — a nested
    /// graph is only ever built while its owning node is itself being built
    /// or evaluated, so its nodes always receive the next counter values.
    next_rank: u64,
}

impl GraphArena {
    /// Creates the arena with an empty root graph and returns its id.
    pub fn new() -> (Self, GraphId) {
        let mut arena = GraphArena { graphs: Vec::new(), next_rank: 0 };
        let root = arena.new_graph(None);
        (arena, root)
    }

    /// Allocates a new (initially empty) graph, owned by `owner` if this is a nested graph.
    pub fn new_graph(&mut self, owner: Option<NodeId>) -> GraphId {
        self.graphs.push(Graph::new(owner));
        self.graphs.len() - 1
    }

    /// Adds a node to `graph`, returning its id and the build-order rank it was assigned.
    pub fn add_node(&mut self, graph: GraphId, node: Box<dyn NodeOps>) -> (NodeId, u64) {
        let index = self.graphs[graph].nodes.len();
        self.graphs[graph].nodes.push(Some(node));
        let id = NodeId::new(graph, index);
        let rank = self.next_rank;
        self.next_rank += 1;
        (id, rank)
    }

    /// Removes a node from its graph's build-order slot, returning it.
    ///
    /// Used by nested-map key removal (§4.5): the slot is left empty (a
    /// tombstone) so every other node's `NodeId` stays valid. Only nodes
    /// built inside the removed node's own nested graph, or the node itself
    /// when it owns no children, should ever be torn down this way.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Box<dyn NodeOps>> {
        self.graphs[id.graph].nodes.get_mut(id.index).and_then(|slot| slot.take())
    }

    /// Puts a node back into the slot it was `remove_node`d from.
    ///
    /// Used by the evaluator around a node's own `eval`/`start`/`stop` call:
    /// a nested node (§4.5) needs `&mut GraphArena` in its own `EvalContext`
    /// to build or tear down its inner graph, which Rust's aliasing rules
    /// forbid while that same node is borrowed out of the arena. The
    /// evaluator works around this by removing the node first, driving its
    /// hook with the now-unaliased arena, then restoring it here. Panics if
    /// `id`'s slot is already occupied.
    pub fn restore_node(&mut self, id: NodeId, node: Box<dyn NodeOps>) {
        let slot = &mut self.graphs[id.graph].nodes[id.index];
        assert!(slot.is_none(), "restore_node: slot {:?} already occupied", id);
        *slot = Some(node);
    }

    /// Mutable access to one node. Panics if the node was removed.
    pub fn node_mut(&mut self, id: NodeId) -> &mut dyn NodeOps {
        self.graphs[id.graph].nodes[id.index].as_deref_mut().expect("node was removed")
    }

    /// Shared access to one node. Panics if the node was removed.
    pub fn node(&self, id: NodeId) -> &dyn NodeOps {
        self.graphs[id.graph].nodes[id.index].as_deref().expect("node was removed")
    }

    /// Nodes still present in a graph, in build order, as `(index, &dyn NodeOps)` pairs.
    pub fn nodes_in(&self, graph: GraphId) -> impl Iterator<Item = (usize, &dyn NodeOps)> {
        self.graphs[graph].nodes.iter().enumerate()
            .filter_map(|(i, n)| n.as_deref().map(|n| (i, n)))
    }

    /// Number of graphs currently in the arena (root plus every nested graph ever built).
    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    /// Reconstructs a node's full path from the root, per §3
    /// (`node_id = (graph_id..., node_ndx)`), by walking parent links.
    pub fn path(&self, id: NodeId) -> Vec<usize> {
        let mut prefix = match self.graphs[id.graph].owner {
            Some(owner) => self.path(owner),
            None => Vec::new(),
        };
        prefix.push(id.index);
        prefix
    }

    /// The owning node of a nested graph, if any.
    pub fn owner_of(&self, graph: GraphId) -> Option<NodeId> {
        self.graphs[graph].owner
    }

    /// Walks upward from `graph` through nested-graph ownership, returning
    /// the nearest ancestor node that catches eval errors (§4.5 try/except,
    /// §7), if any. Used by the evaluator to route an eval error to the
    /// nearest enclosing try/except wrapper instead of halting the run.
    pub fn error_boundary(&self, graph: GraphId) -> Option<NodeId> {
        let mut g = graph;
        loop {
            let owner = self.owner_of(g)?;
            if self.node(owner).is_error_boundary() {
                return Some(owner);
            }
            g = owner.graph;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EvalError, WiringError};
    use crate::node::{EvalContext, NodeKind, NodeState};
    use crate::time::EngineTime;

    struct Stub;
    impl NodeOps for Stub {
        fn kind(&self) -> NodeKind {
            NodeKind::Sink
        }
        fn state(&self) -> NodeState {
            NodeState::New
        }
        fn start(&mut self, _ctx: &mut EvalContext) -> Result<(), WiringError> {
            Ok(())
        }
        fn is_eligible(&self, _now: EngineTime) -> bool {
            false
        }
        fn eval(&mut self, _ctx: &mut EvalContext) -> Result<(), EvalError> {
            Ok(())
        }
        fn stop(&mut self, _ctx: &mut EvalContext) {}
    }
    #[test]
    fn nested_path_prepends_owner_path() {
        let (mut arena, root) = GraphArena::new();
        let (owner_id, _) = arena.add_node(root, Box::new(Stub));
        let inner = arena.new_graph(Some(owner_id));
        let (child_id, _) = arena.add_node(inner, Box::new(Stub));
        assert_eq!(arena.path(owner_id), vec![0]);
        assert_eq!(arena.path(child_id), vec![0, 0]);
    }
}
