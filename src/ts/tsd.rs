//! TSD: a dynamically keyed mapping with per-tick add/modify/remove tracking (§3, §4.5).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::EvalError;
use crate::node::{EvalContext, NodeId};
use crate::time::EngineTime;
use crate::ts::core::{ErasedTs, TimeSeriesOutput};

/// A TSD is typically watched by a handful of nodes; inline storage avoids a
/// heap allocation for the common case (same rationale as the scalar TSO's
/// own subscriber list in `ts/core.rs`).
type SubscriberList = SmallVec<[NodeId; 4]>;

struct TsdState<K: Ord + Clone, V: Clone> {
    owner: NodeId,
    items: BTreeMap<K, TimeSeriesOutput<V>>,
    tick: EngineTime,
    last_modified_time: EngineTime,
    added: Vec<K>,
    modified: Vec<K>,
    removed: Vec<K>,
    subscribers: SubscriberList,
    ever_written: bool,
}

/// A dynamic `K -> V` mapping. Keys are ordered (`BTreeMap`) so iteration —
/// and therefore the order nested sub-graphs are built/torn down in — is
/// deterministic. Cheap to clone: clones share the same backing state, the
/// same way [`TimeSeriesOutput`] bindings work, so a nested map operator can
/// hold a read-only handle to an upstream-owned TSD.
pub struct Tsd<K: Ord + Clone, V: Clone> {
    cell: Rc<RefCell<TsdState<K, V>>>,
}

impl<K: Ord + Clone, V: Clone> Clone for Tsd<K, V> {
    fn clone(&self) -> Self {
        Tsd { cell: Rc::clone(&self.cell) }
    }
}

impl<K: Ord + Clone, V: Clone> Tsd<K, V> {
    /// An empty, invalid TSD owned by `owner`.
    pub fn new(owner: NodeId) -> Self {
        Tsd {
            cell: Rc::new(RefCell::new(TsdState {
                owner,
                items: BTreeMap::new(),
                tick: EngineTime::MIN_DT,
                last_modified_time: EngineTime::MIN_DT,
                added: Vec::new(),
                modified: Vec::new(),
                removed: Vec::new(),
                subscribers: SmallVec::new(),
                ever_written: false,
            })),
        }
    }

    fn roll(&self, now: EngineTime) {
        let mut s = self.cell.borrow_mut();
        if s.tick != now {
            s.added.clear();
            s.modified.clear();
            s.removed.clear();
            s.tick = now;
        }
    }

    /// Inserts or updates `key`'s value. Adding then removing the same key
    /// within one tick collapses to neither a start nor a stop (§8, invariant 7);
    /// that collapse is implemented in `remove`, which checks `added` here.
    pub fn set(&self, ctx: &mut EvalContext, key: K, value: V) -> Result<(), EvalError> {
        self.roll(ctx.now);
        let owner = self.cell.borrow().owner;
        let existing = self.cell.borrow().items.get(&key).cloned();
        if let Some(existing) = existing {
            existing.apply_result(ctx, value)?;
        } else {
            let out = TimeSeriesOutput::new(owner);
            out.apply_result(ctx, value)?;
            let mut s = self.cell.borrow_mut();
            s.items.insert(key.clone(), out);
            s.added.push(key.clone());
        }
        {
            let mut s = self.cell.borrow_mut();
            s.last_modified_time = ctx.now;
            s.ever_written = true;
            if !s.modified.contains(&key) {
                s.modified.push(key);
            }
        }
        self.notify_subscribers(ctx);
        Ok(())
    }

    /// Publishes `output` under `key` directly, aliasing it rather than
    /// copying a sampled value — used by the map operator (§4.5) to expose a
    /// sub-graph's own output cell as the TSD's entry for that key, so a
    /// subscriber sees every subsequent tick of the sub-graph's output
    /// without the map operator re-publishing each one itself.
    pub fn insert_output(&self, ctx: &mut EvalContext, key: K, output: TimeSeriesOutput<V>) {
        self.roll(ctx.now);
        {
            let mut s = self.cell.borrow_mut();
            let is_new = !s.items.contains_key(&key);
            s.items.insert(key.clone(), output);
            s.last_modified_time = ctx.now;
            s.ever_written = true;
            if is_new {
                s.added.push(key.clone());
            }
            if !s.modified.contains(&key) {
                s.modified.push(key);
            }
        }
        self.notify_subscribers(ctx);
    }

    /// Removes `key`, if present.
    pub fn remove(&self, ctx: &mut EvalContext, key: &K) {
        self.roll(ctx.now);
        let mut s = self.cell.borrow_mut();
        s.last_modified_time = ctx.now;
        if let Some(pos) = s.added.iter().position(|k| k == key) {
            // Added and removed within the same tick: collapse (§8, invariant 7).
            s.added.remove(pos);
            s.modified.retain(|k| k != key);
            s.items.remove(key);
        } else if s.items.remove(key).is_some() {
            s.modified.retain(|k| k != key);
            s.removed.push(key.clone());
        } else {
            return;
        }
        drop(s);
        self.notify_subscribers(ctx);
    }

    fn notify_subscribers(&self, ctx: &mut EvalContext) {
        let subs: SubscriberList = self.cell.borrow().subscribers.clone();
        for node in subs {
            ctx.scheduler.notify(node);
        }
    }

    /// Keys added at `now` (after rolling any stale per-tick state).
    pub fn added_keys(&self, now: EngineTime) -> Vec<K> {
        self.roll(now);
        self.cell.borrow().added.clone()
    }

    /// Keys whose sub-series changed at `now`, added keys included.
    pub fn modified_keys(&self, now: EngineTime) -> Vec<K> {
        self.roll(now);
        self.cell.borrow().modified.clone()
    }

    /// Keys removed at `now`.
    pub fn removed_keys(&self, now: EngineTime) -> Vec<K> {
        self.roll(now);
        self.cell.borrow().removed.clone()
    }

    /// `(key, sub-series)` pairs for every key that changed at `now`.
    pub fn modified_items(&self, now: EngineTime) -> Vec<(K, TimeSeriesOutput<V>)> {
        self.roll(now);
        let s = self.cell.borrow();
        s.modified.iter().filter_map(|k| s.items.get(k).map(|v| (k.clone(), v.clone()))).collect()
    }

    /// The sub-series bound to `key`, if present.
    pub fn get(&self, key: &K) -> Option<TimeSeriesOutput<V>> {
        self.cell.borrow().items.get(key).cloned()
    }

    /// Current keys, in order.
    pub fn keys(&self) -> Vec<K> {
        self.cell.borrow().items.keys().cloned().collect()
    }

    /// Number of keys currently present.
    pub fn len(&self) -> usize {
        self.cell.borrow().items.len()
    }

    /// Whether no keys are currently present.
    pub fn is_empty(&self) -> bool {
        self.cell.borrow().items.is_empty()
    }

    /// Registers `node` as an aggregate ("the TSD's shape changed") subscriber.
    pub fn subscribe_node(&self, node: NodeId) {
        let mut s = self.cell.borrow_mut();
        if !s.subscribers.contains(&node) {
            s.subscribers.push(node);
        }
    }

    /// Removes `node` from the aggregate subscriber set.
    pub fn un_subscribe_node(&self, node: NodeId) {
        self.cell.borrow_mut().subscribers.retain(|n| *n != node);
    }
}

impl<K: Ord + Clone, V: Clone> ErasedTs for Tsd<K, V> {
    fn valid(&self) -> bool {
        self.cell.borrow().ever_written
    }
    fn all_valid(&self) -> bool {
        self.cell.borrow().items.values().all(|v| v.valid())
    }
    fn last_modified_time(&self) -> EngineTime {
        self.cell.borrow().last_modified_time
    }
    fn modified(&self, now: EngineTime) -> bool {
        self.cell.borrow().last_modified_time == now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphArena;
    use crate::observer::ObserverRegistry;
    use crate::scheduler::Scheduler;

    fn ctx<'a>(node: NodeId, now: EngineTime, sched: &'a mut Scheduler, obs: &'a ObserverRegistry, arena: &'a mut GraphArena) -> EvalContext<'a> {
        EvalContext { node, now, wall_now: now, scheduler: sched, observers: obs, arena }
    }

    #[test]
    fn add_then_remove_same_tick_collapses() {
        let (mut arena, root) = GraphArena::new();
        let owner = NodeId::new(root, 0);
        let mut sched = Scheduler::new();
        sched.assign_rank(owner, 0);
        let observers = ObserverRegistry::new();
        let tsd: Tsd<String, i64> = Tsd::new(owner);

        let t1 = EngineTime::from_micros(1);
        {
            let mut c = ctx(owner, t1, &mut sched, &observers, &mut arena);
            tsd.set(&mut c, "a".to_string(), 1).unwrap();
            tsd.remove(&mut c, &"a".to_string());
        }
        assert!(tsd.added_keys(t1).is_empty());
        assert!(tsd.removed_keys(t1).is_empty());
        assert!(tsd.is_empty());
    }

    #[test]
    fn churn_across_distinct_ticks_is_one_start_one_stop() {
        let (mut arena, root) = GraphArena::new();
        let owner = NodeId::new(root, 0);
        let mut sched = Scheduler::new();
        sched.assign_rank(owner, 0);
        let observers = ObserverRegistry::new();
        let tsd: Tsd<String, i64> = Tsd::new(owner);

        let t1 = EngineTime::from_micros(1);
        {
            let mut c = ctx(owner, t1, &mut sched, &observers, &mut arena);
            tsd.set(&mut c, "a".to_string(), 1).unwrap();
        }
        assert_eq!(tsd.added_keys(t1), vec!["a".to_string()]);

        let t2 = EngineTime::from_micros(2);
        {
            let mut c = ctx(owner, t2, &mut sched, &observers, &mut arena);
            tsd.remove(&mut c, &"a".to_string());
        }
        assert_eq!(tsd.removed_keys(t2), vec!["a".to_string()]);
        assert!(tsd.added_keys(t2).is_empty());
    }

    /// §8 S3: keys `{a:1}` at t=1, `{a:2,b:3}` at t=2, `{a:REMOVE}` at t=3.
    #[test]
    fn scenario_s3_key_churn() {
        let (mut arena, root) = GraphArena::new();
        let owner = NodeId::new(root, 0);
        let mut sched = Scheduler::new();
        sched.assign_rank(owner, 0);
        let observers = ObserverRegistry::new();
        let tsd: Tsd<String, i64> = Tsd::new(owner);

        let t1 = EngineTime::from_micros(1);
        {
            let mut c = ctx(owner, t1, &mut sched, &observers, &mut arena);
            tsd.set(&mut c, "a".to_string(), 1).unwrap();
        }
        assert_eq!(tsd.added_keys(t1), vec!["a".to_string()]);

        let t2 = EngineTime::from_micros(2);
        {
            let mut c = ctx(owner, t2, &mut sched, &observers, &mut arena);
            tsd.set(&mut c, "a".to_string(), 2).unwrap();
            tsd.set(&mut c, "b".to_string(), 3).unwrap();
        }
        assert_eq!(tsd.added_keys(t2), vec!["b".to_string()]);
        let mut modified_t2 = tsd.modified_keys(t2);
        modified_t2.sort();
        assert_eq!(modified_t2, vec!["a".to_string(), "b".to_string()]);

        let t3 = EngineTime::from_micros(3);
        {
            let mut c = ctx(owner, t3, &mut sched, &observers, &mut arena);
            tsd.remove(&mut c, &"a".to_string());
        }
        assert_eq!(tsd.removed_keys(t3), vec!["a".to_string()]);
        assert_eq!(tsd.keys(), vec!["b".to_string()]);
    }
}
