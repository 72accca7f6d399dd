//! Switch: one-of-many sub-graph templates, keyed by the current value of a
//! selector input (§4.5 "Switch").

use std::collections::BTreeMap;
use std::fmt;

use crate::drive;
use crate::error::{EvalError, WiringError};
use crate::graph::GraphArena;
use crate::node::{EvalContext, GraphId, NodeId, NodeKind, NodeOps, NodeState};
use crate::scheduler::Scheduler;
use crate::time::EngineTime;
use crate::ts::core::{TimeSeriesInput, TimeSeriesOutput};

/// Builds the sub-graph for one branch, the same shape as [`crate::nested::map::MapBody`]
/// but with no per-key input to thread through — a switch branch only needs
/// its own graph slot to build into.
pub type SwitchBody<VOut> = Box<dyn Fn(&mut GraphArena, &mut Scheduler, GraphId) -> TimeSeriesOutput<VOut>>;

struct ActiveBranch<S> {
    selector: S,
    node_ids: Vec<NodeId>,
}

/// A node holding a selector → sub-graph-template mapping; exactly one
/// branch is live at a time, matching whatever the selector input last ticked to.
pub struct SwitchNode<S: Ord + Clone + fmt::Debug, VOut: Clone> {
    state: NodeState,
    selector: TimeSeriesInput<S>,
    /// Bound in `start`, once binding can notify through a real `EvalContext`.
    pending_selector_source: Option<TimeSeriesOutput<S>>,
    templates: BTreeMap<S, SwitchBody<VOut>>,
    active: Option<ActiveBranch<S>>,
    branch_output: TimeSeriesInput<VOut>,
    output: TimeSeriesOutput<VOut>,
}

impl<S: Ord + Clone + fmt::Debug, VOut: Clone> SwitchNode<S, VOut> {
    /// Builds a switch node owned by `owner`, reading its selector from
    /// `selector`, dispatching to one of `templates`.
    pub fn new(owner: NodeId, selector: TimeSeriesOutput<S>, templates: BTreeMap<S, SwitchBody<VOut>>) -> Self {
        let mut selector_input = TimeSeriesInput::new(owner);
        selector_input.make_active();
        let mut branch_output = TimeSeriesInput::new(owner);
        branch_output.make_active();
        SwitchNode {
            state: NodeState::New,
            selector: selector_input,
            pending_selector_source: Some(selector),
            templates,
            active: None,
            branch_output,
            output: TimeSeriesOutput::new(owner),
        }
    }

    /// The output mirroring whichever branch is currently active.
    pub fn output(&self) -> TimeSeriesOutput<VOut> {
        self.output.clone()
    }

    fn stop_active(ctx: &mut EvalContext, branch: ActiveBranch<S>) {
        for id in branch.node_ids.into_iter().rev() {
            drive::stop_node(ctx.arena, ctx.scheduler, ctx.observers, ctx.now, ctx.wall_now, id);
        }
    }

    fn start_branch(&mut self, ctx: &mut EvalContext, selector: S) -> Result<(), EvalError> {
        let Some(body) = self.templates.get(&selector) else {
            return Ok(());
        };
        let graph = ctx.arena.new_graph(Some(ctx.node));
        let sub_output = body(ctx.arena, ctx.scheduler, graph);
        let node_ids: Vec<NodeId> = ctx.arena.nodes_in(graph).map(|(i, _)| NodeId::new(graph, i)).collect();
        for &id in &node_ids {
            drive::start_node(ctx.arena, ctx.scheduler, ctx.observers, ctx.now, ctx.wall_now, id)
                .map_err(|e| EvalError::new(ctx.node, ctx.now, format!("switch branch start failed: {e}")))?;
        }
        self.branch_output.unbind();
        self.branch_output.bind(ctx, true, sub_output);
        crate::logging::switch_transition(ctx.node, ctx.now, &format!("{selector:?}"));
        self.active = Some(ActiveBranch { selector, node_ids });
        Ok(())
    }
}

impl<S: Ord + Clone + fmt::Debug + 'static, VOut: Clone + 'static> NodeOps for SwitchNode<S, VOut> {
    fn kind(&self) -> NodeKind {
        NodeKind::Nested
    }
    fn state(&self) -> NodeState {
        self.state
    }
    fn name(&self) -> &str {
        "switch"
    }

    fn start(&mut self, ctx: &mut EvalContext) -> Result<(), WiringError> {
        self.state = NodeState::Started;
        if let Some(source) = self.pending_selector_source.take() {
            self.selector.bind(ctx, true, source);
        }
        Ok(())
    }

    fn is_eligible(&self, _now: EngineTime) -> bool {
        true
    }

    fn eval(&mut self, ctx: &mut EvalContext) -> Result<(), EvalError> {
        let now = ctx.now;
        if self.selector.modified(now) {
            if let Some(sel) = self.selector.value() {
                let changed = self.active.as_ref().map(|b| b.selector != sel).unwrap_or(true);
                if changed {
                    if let Some(old) = self.active.take() {
                        Self::stop_active(ctx, old);
                        self.branch_output.unbind();
                    }
                    self.start_branch(ctx, sel)?;
                }
            }
        }
        if self.branch_output.modified(now) {
            if let Some(v) = self.branch_output.value() {
                self.output.apply_result(ctx, v)?;
            }
        }
        ctx.report_eval(true);
        Ok(())
    }

    fn stop(&mut self, ctx: &mut EvalContext) {
        self.state = NodeState::Stopped;
        if let Some(branch) = self.active.take() {
            Self::stop_active(ctx, branch);
        }
        ctx.scheduler.discard_node(ctx.node);
    }
}
