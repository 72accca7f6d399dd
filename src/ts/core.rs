//! Scalar time-series outputs and inputs: the cell at the bottom of every
//! composite container (§3, §4.1).

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::EvalError;
use crate::node::{EvalContext, NodeId};
use crate::time::EngineTime;

/// Most outputs have only a handful of subscribers; inline storage for the
/// common case avoids a heap allocation per cell (teacher already depends on
/// `smallvec` for the same reason on its own small edge-fan-out lists).
type SubscriberList = SmallVec<[NodeId; 4]>;

/// Type-erased view of a time-series cell, used to aggregate validity and
/// modification across heterogeneous fields (TSB) or collection items
/// (TSD/TSL) without knowing their concrete `T` (§9 "heterogeneous
/// collections of inputs/outputs ... dispatch via method tables").
pub trait ErasedTs {
    /// Has this cell ever been written.
    fn valid(&self) -> bool;
    /// For composite cells, whether every leaf is valid; scalars equal `valid()`.
    fn all_valid(&self) -> bool;
    /// The tick this cell was last written at.
    fn last_modified_time(&self) -> EngineTime;
    /// Whether this cell changed at `now`.
    fn modified(&self, now: EngineTime) -> bool {
        self.last_modified_time() == now
    }
}

struct OutputCell<T> {
    value: Option<T>,
    delta: Option<T>,
    last_modified_time: EngineTime,
    valid: bool,
    subscribers: SubscriberList,
}

impl<T> OutputCell<T> {
    fn new() -> Self {
        OutputCell {
            value: None,
            delta: None,
            last_modified_time: EngineTime::MIN_DT,
            valid: false,
            subscribers: SmallVec::new(),
        }
    }
}

/// A typed, timestamped output cell produced by exactly one node (§3 TSO).
///
/// Cheap to clone — clones share the same backing cell, which is how a
/// binding is represented: an input holds a clone of the output it is bound to.
pub struct TimeSeriesOutput<T: Clone> {
    owner: NodeId,
    cell: Rc<RefCell<OutputCell<T>>>,
}

impl<T: Clone> Clone for TimeSeriesOutput<T> {
    fn clone(&self) -> Self {
        TimeSeriesOutput { owner: self.owner, cell: Rc::clone(&self.cell) }
    }
}

impl<T: Clone> TimeSeriesOutput<T> {
    /// Creates a fresh, invalid output cell owned by `owner`.
    pub fn new(owner: NodeId) -> Self {
        TimeSeriesOutput { owner, cell: Rc::new(RefCell::new(OutputCell::new())) }
    }

    /// The node that owns (and is the sole writer of) this output.
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// The committed value, if any write has ever landed.
    pub fn value(&self) -> Option<T> {
        self.cell.borrow().value.clone()
    }

    /// The change since the previous tick that modified this output; for
    /// scalars this equals `value` (§3).
    pub fn delta_value(&self) -> Option<T> {
        self.cell.borrow().delta.clone()
    }

    /// Whether `apply_result` may be called again this tick (§4.1
    /// "at-most-one-write-per-tick-per-output", the default `can_apply_result`).
    pub fn can_apply_result(&self, now: EngineTime) -> bool {
        self.cell.borrow().last_modified_time != now
    }

    /// Commits a new value. Notifies every subscriber by inserting it into
    /// the evaluator's pending set for the current tick (§4.1).
    ///
    /// Returns an `EvalError` if `can_apply_result` does not hold — the
    /// at-most-one-write invariant is enforced here, not left to callers.
    pub fn apply_result(&self, ctx: &mut EvalContext, value: T) -> Result<(), EvalError> {
        if !self.can_apply_result(ctx.now) {
            return Err(EvalError::new(
                self.owner,
                ctx.now,
                "output already written this tick (at-most-one-write violated)",
            ));
        }
        {
            let mut cell = self.cell.borrow_mut();
            cell.delta = Some(value.clone());
            cell.value = Some(value);
            cell.last_modified_time = ctx.now;
            cell.valid = true;
        }
        self.notify_subscribers(ctx);
        Ok(())
    }

    /// Re-stamps `last_modified_time` to now without changing the value,
    /// used internally (e.g. by reference rebinding's re-delivery step).
    /// Idempotent within a tick.
    pub fn mark_modified(&self, ctx: &mut EvalContext) {
        let already = self.cell.borrow().last_modified_time == ctx.now;
        if already {
            return;
        }
        self.cell.borrow_mut().last_modified_time = ctx.now;
        self.notify_subscribers(ctx);
    }

    /// Clears the value and marks this cell invalid; subscribers are
    /// notified and stay subscribed (§4.1).
    pub fn mark_invalid(&self, ctx: &mut EvalContext) {
        {
            let mut cell = self.cell.borrow_mut();
            cell.value = None;
            cell.delta = None;
            cell.valid = false;
            cell.last_modified_time = ctx.now;
        }
        self.notify_subscribers(ctx);
    }

    fn notify_subscribers(&self, ctx: &mut EvalContext) {
        let subs: SubscriberList = self.cell.borrow().subscribers.clone();
        for node in subs {
            ctx.scheduler.notify(node);
        }
    }

    /// Adds `node` to the subscriber set if it is not already present (§4.1, invariant 1).
    pub fn subscribe_node(&self, node: NodeId) {
        let mut cell = self.cell.borrow_mut();
        if !cell.subscribers.contains(&node) {
            cell.subscribers.push(node);
        }
    }

    /// Removes `node` from the subscriber set, if present.
    pub fn un_subscribe_node(&self, node: NodeId) {
        let mut cell = self.cell.borrow_mut();
        cell.subscribers.retain(|n| *n != node);
    }

    /// Whether `node` currently subscribes to this output.
    pub fn has_subscriber(&self, node: NodeId) -> bool {
        self.cell.borrow().subscribers.contains(&node)
    }
}

impl<T: Clone> ErasedTs for TimeSeriesOutput<T> {
    fn valid(&self) -> bool {
        self.cell.borrow().valid
    }
    fn all_valid(&self) -> bool {
        self.valid()
    }
    fn last_modified_time(&self) -> EngineTime {
        self.cell.borrow().last_modified_time
    }
}

/// The reader end of a time-series connection (§3 TSI).
pub struct TimeSeriesInput<T: Clone> {
    owner: NodeId,
    bound: Option<TimeSeriesOutput<T>>,
    active: bool,
    sample_time: EngineTime,
}

impl<T: Clone> TimeSeriesInput<T> {
    /// An unbound, passive input owned by `owner`.
    pub fn new(owner: NodeId) -> Self {
        TimeSeriesInput { owner, bound: None, active: false, sample_time: EngineTime::MIN_DT }
    }

    /// Whether this input currently has a bound output.
    pub fn bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Whether this node wakes up when the bound output changes.
    pub fn active(&self) -> bool {
        self.active
    }

    /// Binds a new output. If the input is active and already bound to a
    /// different output, the subscription is transferred. If `output` is
    /// already valid and the owning node has started with this input
    /// active, a notification is scheduled at the current time (§3, invariant 3).
    pub fn bind(&mut self, ctx: &mut EvalContext, started: bool, output: TimeSeriesOutput<T>) {
        if let Some(old) = &self.bound {
            if self.active {
                old.un_subscribe_node(self.owner);
            }
        }
        if self.active {
            output.subscribe_node(self.owner);
        }
        let already_valid = output.valid();
        self.bound = Some(output);
        if self.active && started && already_valid {
            self.sample_time = ctx.now;
            ctx.scheduler.notify(self.owner);
        }
    }

    /// Unbinds the current output, if any, dropping any subscription.
    pub fn unbind(&mut self) {
        if let Some(old) = self.bound.take() {
            if self.active {
                old.un_subscribe_node(self.owner);
            }
        }
    }

    /// Marks this input active: the owning node wakes up on the bound
    /// output's changes. Idempotent.
    pub fn make_active(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        if let Some(out) = &self.bound {
            out.subscribe_node(self.owner);
        }
    }

    /// Marks this input passive: the value stays readable but no longer wakes the node. Idempotent.
    pub fn make_passive(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(out) = &self.bound {
            out.un_subscribe_node(self.owner);
        }
    }

    /// Records a direct sample delivery at the current tick, independent of
    /// the bound output's own modification (§3 `sample_time`; OQ1).
    pub fn mark_sampled(&mut self, now: EngineTime) {
        self.sample_time = now;
    }

    /// The bound output's current value, if bound and valid.
    pub fn value(&self) -> Option<T> {
        self.bound.as_ref().and_then(|o| o.value())
    }

    /// The bound output's delta value.
    pub fn delta_value(&self) -> Option<T> {
        self.bound.as_ref().and_then(|o| o.delta_value())
    }

    /// Whether this input is valid (bound and the bound output has ever been written).
    pub fn valid(&self) -> bool {
        self.bound.as_ref().is_some_and(|o| o.valid())
    }

    /// `last_modified_time` delegated to the bound output, merged with `sample_time` (§3).
    pub fn last_modified_time(&self) -> EngineTime {
        let bound_time = self.bound.as_ref().map_or(EngineTime::MIN_DT, |o| o.last_modified_time());
        self.sample_time.max(bound_time)
    }

    /// True iff the bound output was modified this tick OR a direct sample
    /// was delivered at this tick (§3, resolved by OQ1: the two conditions OR
    /// together, there is no precedence conflict).
    pub fn modified(&self, now: EngineTime) -> bool {
        self.sample_time == now || self.bound.as_ref().is_some_and(|o| o.modified(now))
    }

    /// A clone of the bound output handle, for nested graphs that need to
    /// pass the *same* output further down (e.g. map-over-TSD per-key wiring).
    pub fn bound_output(&self) -> Option<TimeSeriesOutput<T>> {
        self.bound.clone()
    }
}

impl<T: Clone> ErasedTs for TimeSeriesInput<T> {
    fn valid(&self) -> bool {
        self.valid()
    }
    fn all_valid(&self) -> bool {
        self.valid()
    }
    fn last_modified_time(&self) -> EngineTime {
        self.last_modified_time()
    }
    fn modified(&self, now: EngineTime) -> bool {
        self.modified(now)
    }
}

/// `true` iff any of `inputs` is active and modified at `now` (§4.2 eligibility).
pub fn any_active_modified(inputs: &[(&dyn ErasedTs, bool)], now: EngineTime) -> bool {
    inputs.iter().any(|(i, active)| *active && i.modified(now))
}

/// `true` iff every one of `inputs` is valid (§4.2 `valid` precondition).
pub fn all_valid(inputs: &[&dyn ErasedTs]) -> bool {
    inputs.iter().all(|i| i.valid())
}

/// `true` iff every one of `inputs` is fully valid, recursing into composites (§4.2 `all_valid`).
pub fn all_fully_valid(inputs: &[&dyn ErasedTs]) -> bool {
    inputs.iter().all(|i| i.all_valid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphArena;
    use crate::observer::ObserverRegistry;
    use crate::scheduler::Scheduler;

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
    fn apply_result_notifies_active_subscribers() {
        let (mut arena, root) = GraphArena::new();
        let producer = NodeId::new(root, 0);
        let consumer = NodeId::new(root, 1);
        let mut sched = Scheduler::new();
        sched.assign_rank(producer, 0);
        sched.assign_rank(consumer, 1);
        let observers = ObserverRegistry::new();

        let out: TimeSeriesOutput<i64> = TimeSeriesOutput::new(producer);
        let mut input: TimeSeriesInput<i64> = TimeSeriesInput::new(consumer);
        let now = EngineTime::from_micros(0);
        {
            let mut c = ctx(consumer, now, &mut sched, &observers, &mut arena);
            input.make_active();
            input.bind(&mut c, true, out.clone());
        }
        assert!(!sched.is_scheduled_now(consumer));

        let t1 = EngineTime::from_micros(1);
        {
            let mut c = ctx(producer, t1, &mut sched, &observers, &mut arena);
            out.apply_result(&mut c, 42).unwrap();
        }
        assert!(sched.is_scheduled_now(consumer));
        assert_eq!(input.value(), Some(42));
        assert!(input.modified(t1));
    }

    #[test]
    fn at_most_one_write_per_tick_is_rejected() {
        let (mut arena, root) = GraphArena::new();
        let producer = NodeId::new(root, 0);
        let mut sched = Scheduler::new();
        sched.assign_rank(producer, 0);
        let observers = ObserverRegistry::new();
        let out: TimeSeriesOutput<i64> = TimeSeriesOutput::new(producer);
        let now = EngineTime::from_micros(5);
        let mut c = ctx(producer, now, &mut sched, &observers, &mut arena);
        out.apply_result(&mut c, 1).unwrap();
        assert!(out.apply_result(&mut c, 2).is_err());
    }

    #[test]
    fn make_passive_drops_subscription_but_keeps_value_readable() {
        let (mut arena, root) = GraphArena::new();
        let producer = NodeId::new(root, 0);
        let consumer = NodeId::new(root, 1);
        let mut sched = Scheduler::new();
        sched.assign_rank(producer, 0);
        sched.assign_rank(consumer, 1);
        let observers = ObserverRegistry::new();
        let out: TimeSeriesOutput<i64> = TimeSeriesOutput::new(producer);
        let mut input: TimeSeriesInput<i64> = TimeSeriesInput::new(consumer);
        let t0 = EngineTime::from_micros(0);
        {
            let mut c = ctx(consumer, t0, &mut sched, &observers, &mut arena);
            input.make_active();
            input.bind(&mut c, true, out.clone());
        }
        assert!(out.has_subscriber(consumer));
        input.make_passive();
        assert!(!out.has_subscriber(consumer));

        let t1 = EngineTime::from_micros(1);
        let mut c = ctx(producer, t1, &mut sched, &observers, &mut arena);
        out.apply_result(&mut c, 7).unwrap();
        assert!(!sched.is_scheduled_now(consumer));
        assert_eq!(input.value(), Some(7));
    }
}
