//! BUFF: a sliding window over a scalar stream (§3, §4.1, OQ2/OQ3).

use std::collections::VecDeque;

use smallvec::SmallVec;

use crate::error::EvalError;
use crate::node::{EvalContext, NodeId};
use crate::time::{EngineTime, WindowSize};
use crate::ts::core::ErasedTs;

/// Same small-subscriber-set rationale as the scalar TSO (`ts/core.rs`).
type SubscriberList = SmallVec<[NodeId; 4]>;

/// A sliding window of scalar samples, sized by tick count or duration.
pub struct Buffer<T: Clone> {
    owner: NodeId,
    size: WindowSize,
    min_size: WindowSize,
    samples: VecDeque<(EngineTime, T)>,
    last_modified_time: EngineTime,
    /// OQ2: tracks which tick already appended a sample, distinct from
    /// `last_modified_time` so a future extend-style write model could reuse
    /// the same field without conflating "wrote" with "appended".
    appended_at: EngineTime,
    subscribers: SubscriberList,
}

impl<T: Clone> Buffer<T> {
    /// A fresh, empty buffer windowed by `size`/`min_size`, owned by `owner`.
    pub fn new(owner: NodeId, size: WindowSize, min_size: WindowSize) -> Self {
        Buffer {
            owner,
            size,
            min_size,
            samples: VecDeque::new(),
            last_modified_time: EngineTime::MIN_DT,
            appended_at: EngineTime::MIN_DT,
            subscribers: SmallVec::new(),
        }
    }

    /// Whether `apply_result` may append again this tick (OQ2: a buffer may
    /// be written at most once per tick, same as any other output).
    pub fn can_apply_result(&self, now: EngineTime) -> bool {
        self.appended_at != now
    }

    /// Appends one sample timestamped at `ctx.now` (§4.1 "apply_result(v)
    /// appends one sample with timestamp engine.now").
    pub fn apply_result(&mut self, ctx: &mut EvalContext, value: T) -> Result<(), EvalError> {
        if !self.can_apply_result(ctx.now) {
            return Err(EvalError::new(self.owner, ctx.now, "buffer already appended this tick"));
        }
        self.samples.push_back((ctx.now, value));
        self.appended_at = ctx.now;
        self.last_modified_time = ctx.now;
        self.roll(ctx.now);
        for node in &self.subscribers {
            ctx.scheduler.notify(*node);
        }
        Ok(())
    }

    fn roll(&mut self, now: EngineTime) {
        match self.size {
            WindowSize::Ticks(cap) => {
                while self.samples.len() > cap {
                    self.samples.pop_front();
                }
            }
            WindowSize::Duration(window) => {
                while let Some((t, _)) = self.samples.front() {
                    if now.as_micros().saturating_sub(t.as_micros()) as u128 * 1000
                        > window.as_nanos()
                    {
                        self.samples.pop_front();
                    } else {
                        break;
                    }
                }
            }
        }
    }

    fn min_len_satisfied(&self) -> bool {
        match self.min_size {
            WindowSize::Ticks(min) => self.samples.len() >= min,
            WindowSize::Duration(window) => {
                if self.samples.is_empty() {
                    return false;
                }
                let span = self.samples.back().unwrap().0 - self.samples.front().unwrap().0;
                span >= window
            }
        }
    }

    /// The windowed values in insertion order, or `None` until `length >= min_size` (§4.1, §8 S4).
    pub fn value(&mut self, now: EngineTime) -> Option<Vec<T>> {
        self.roll(now);
        if !self.min_len_satisfied() {
            return None;
        }
        Some(self.samples.iter().map(|(_, v)| v.clone()).collect())
    }

    /// The timestamps parallel to `value`, or `None` under the same condition.
    pub fn value_times(&mut self, now: EngineTime) -> Option<Vec<EngineTime>> {
        self.roll(now);
        if !self.min_len_satisfied() {
            return None;
        }
        Some(self.samples.iter().map(|(t, _)| *t).collect())
    }

    /// Number of samples currently retained.
    pub fn length(&self) -> usize {
        self.samples.len()
    }

    /// Timestamp of the oldest live entry, resolving OQ3 ("the timestamp of
    /// the oldest live entry") for a partially filled integer-sized buffer.
    pub fn first_modified_time(&self) -> EngineTime {
        self.samples.front().map(|(t, _)| *t).unwrap_or(EngineTime::MIN_DT)
    }

    /// Registers `node` to be woken on every append.
    pub fn subscribe_node(&mut self, node: NodeId) {
        if !self.subscribers.contains(&node) {
            self.subscribers.push(node);
        }
    }

    /// Removes `node` from the subscriber set.
    pub fn un_subscribe_node(&mut self, node: NodeId) {
        self.subscribers.retain(|n| *n != node);
    }
}

impl<T: Clone> ErasedTs for Buffer<T> {
    fn valid(&self) -> bool {
        self.min_len_satisfied()
    }
    fn all_valid(&self) -> bool {
        self.valid()
    }
    fn last_modified_time(&self) -> EngineTime {
        self.last_modified_time
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

    /// §8 S4: size=3, min_size=2, writes 10,20,30,40 at t=1..4.
    #[test]
    fn integer_buffer_matches_scenario_s4() {
        let (mut arena, root) = GraphArena::new();
        let owner = NodeId::new(root, 0);
        let mut sched = Scheduler::new();
        sched.assign_rank(owner, 0);
        let observers = ObserverRegistry::new();
        let mut buf: Buffer<i64> = Buffer::new(owner, WindowSize::Ticks(3), WindowSize::Ticks(2));

        let t1 = EngineTime::from_micros(1);
        {
            let mut c = ctx(owner, t1, &mut sched, &observers, &mut arena);
            buf.apply_result(&mut c, 10).unwrap();
        }
        assert_eq!(buf.value(t1), None);

        let t2 = EngineTime::from_micros(2);
        {
            let mut c = ctx(owner, t2, &mut sched, &observers, &mut arena);
            buf.apply_result(&mut c, 20).unwrap();
        }
        assert_eq!(buf.value(t2), Some(vec![10, 20]));

        let t3 = EngineTime::from_micros(3);
        {
            let mut c = ctx(owner, t3, &mut sched, &observers, &mut arena);
            buf.apply_result(&mut c, 30).unwrap();
        }
        let t4 = EngineTime::from_micros(4);
        {
            let mut c = ctx(owner, t4, &mut sched, &observers, &mut arena);
            buf.apply_result(&mut c, 40).unwrap();
        }
        assert_eq!(buf.value(t4), Some(vec![20, 30, 40]));
        assert_eq!(buf.value_times(t4), Some(vec![t2, t3, t4]));
    }

    #[test]
    fn cannot_append_twice_in_one_tick() {
        let (mut arena, root) = GraphArena::new();
        let owner = NodeId::new(root, 0);
        let mut sched = Scheduler::new();
        sched.assign_rank(owner, 0);
        let observers = ObserverRegistry::new();
        let mut buf: Buffer<i64> = Buffer::new(owner, WindowSize::Ticks(3), WindowSize::Ticks(1));
        let t1 = EngineTime::from_micros(1);
        let mut c = ctx(owner, t1, &mut sched, &observers, &mut arena);
        buf.apply_result(&mut c, 1).unwrap();
        assert!(buf.apply_result(&mut c, 2).is_err());
    }
}
