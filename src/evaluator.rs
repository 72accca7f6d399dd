//! The graph runtime: the per-tick loop described in §4.4 (C6).
//!
//! Grounded on the teacher's own `Worker::step`/`step_or_park`
//! (`timely/src/worker.rs`): one method advances exactly one round of work,
//! draining whatever became ready, and the difference between "run once" and
//! "run until done" is just calling that method in a loop. `tsflow` folds
//! the two clock disciplines (§4.4 `SIMULATION`/`REAL_TIME`) into the same
//! loop rather than the teacher's single always-real-time `step`, since the
//! engine must support both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::config::{EvalMode, EvaluatorConfig};
use crate::drive;
use crate::error::{EngineError, EvalError, WiringError};
use crate::graph::GraphArena;
use crate::node::{GraphId, NodeId, NodeOps};
use crate::observer::ObserverRegistry;
use crate::push_source::PUSH_POLL_INTERVAL;
use crate::scheduler::Scheduler;
use crate::time::EngineTime;

/// A cooperative, externally-checked stop signal (§5 "Cancellation &
/// timeouts" — "the evaluator exposes a stop signal checked between ticks").
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests a shutdown; takes effect at the next tick boundary, once the
    /// in-flight tick (if any) has completed.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether a shutdown has been requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Summary of a completed run, returned on clean termination (§7
/// "User-visible: ... clean termination at the stop criterion").
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Number of distinct ticks the engine advanced through.
    pub ticks: u64,
    /// Engine time of the last tick processed, if any.
    pub last_time: Option<EngineTime>,
}

/// The graph evaluation engine (C6). Owns the node arena, the scheduler, and
/// the observer registry; drives nodes through their `start -> eval* -> stop`
/// lifecycle per §3 and §4.4.
pub struct Evaluator {
    arena: GraphArena,
    scheduler: Scheduler,
    observers: ObserverRegistry,
    root: GraphId,
    now: EngineTime,
    config: EvaluatorConfig,
    wall_start: Instant,
    stop: StopHandle,
}

impl Evaluator {
    /// Builds an evaluator with an empty root graph, ready to receive nodes
    /// via [`Evaluator::add_node`] from the (external) wiring front-end.
    pub fn new(config: EvaluatorConfig) -> Self {
        let (arena, root) = GraphArena::new();
        let now = config.start_time.unwrap_or(EngineTime::from_micros(0));
        Evaluator {
            arena,
            scheduler: Scheduler::new(),
            observers: ObserverRegistry::new(),
            root,
            now,
            config,
            wall_start: Instant::now(),
            stop: StopHandle(Arc::new(AtomicBool::new(false))),
        }
    }

    /// The id of the root graph, for collaborators that need to address root-level nodes.
    pub fn root(&self) -> GraphId {
        self.root
    }

    /// Adds a node to the root graph, assigning it the next build-order rank
    /// (§4.3 "build order within a graph").
    pub fn add_node(&mut self, node: Box<dyn NodeOps>) -> NodeId {
        drive::add_and_rank(&mut self.arena, &mut self.scheduler, self.root, node)
    }

    /// Mutable access to the observer registry, for the (external) debug
    /// collaborator to subscribe before the run starts (§6.4).
    pub fn observers_mut(&mut self) -> &mut ObserverRegistry {
        &mut self.observers
    }

    /// A handle the embedding collaborator can use to request shutdown from
    /// another thread (§5).
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The engine's current logical time.
    pub fn now(&self) -> EngineTime {
        self.now
    }

    fn wall_now(&self) -> EngineTime {
        EngineTime::from_micros(self.wall_start.elapsed().as_micros().min(i64::MAX as u128) as i64)
    }

    /// Walks every node currently in the arena, across every graph (root and
    /// nested), polling push-sources for newly delivered values and marking
    /// any that have some pending as notified for the current tick (§4.4
    /// step 1, §5). A no-op for every other node kind.
    fn poll_push_sources(&mut self) -> bool {
        let mut any = false;
        for g in 0..self.arena.graph_count() {
            let ids: Vec<NodeId> = self.arena.nodes_in(g).map(|(i, _)| NodeId::new(g, i)).collect();
            for id in ids {
                if drive::poll_external(&mut self.arena, id) {
                    any = true;
                    self.scheduler.notify(id);
                }
            }
        }
        any
    }

    /// Starts every root-level node in build order (§3 "Start"). Nested
    /// graphs are built and started lazily during their owning node's own
    /// `eval`, not here.
    fn start_all(&mut self) -> Result<(), WiringError> {
        let ids: Vec<NodeId> =
            self.arena.nodes_in(self.root).map(|(i, _)| NodeId::new(self.root, i)).collect();
        for id in ids {
            drive::start_node(&mut self.arena, &mut self.scheduler, &self.observers, self.now, self.wall_now(), id)?;
        }
        if let Some(end) = self.config.end_time {
            self.scheduler.discard_events_after(end);
        }
        Ok(())
    }

    /// Stops every root-level node in reverse build order (§3 "Stop").
    fn stop_all(&mut self) {
        let ids: Vec<NodeId> =
            self.arena.nodes_in(self.root).map(|(i, _)| NodeId::new(self.root, i)).collect();
        for id in ids.into_iter().rev() {
            drive::stop_node(&mut self.arena, &mut self.scheduler, &self.observers, self.now, self.wall_now(), id);
        }
    }

    /// Determines the time of the next tick, per the clock discipline in
    /// `config.mode` (§4.4 step 1). `None` means the run has nothing further
    /// to do (simulation with an empty future set and no push activity).
    fn next_tick_time(&mut self) -> Option<EngineTime> {
        match self.config.mode {
            EvalMode::Simulation => {
                if let Some(t) = self.scheduler.next_event_time() {
                    Some(t)
                } else if self.poll_push_sources() {
                    Some(self.now)
                } else if self.scheduler.has_deferred() {
                    // Nothing else would ever produce a "next tick" for a
                    // feedback-only cycle to deliver into (§4.6) — manufacture
                    // the smallest possible strictly-later tick instead of
                    // stalling forever with deferred work outstanding.
                    Some(self.now.saturating_add(std::time::Duration::from_micros(1)))
                } else {
                    None
                }
            }
            EvalMode::RealTime => loop {
                if self.poll_push_sources() {
                    return Some(self.wall_now());
                }
                match self.scheduler.next_event_time() {
                    None => {
                        if self.stop.is_stopped() {
                            return None;
                        }
                        thread::sleep(PUSH_POLL_INTERVAL);
                    }
                    Some(t) => {
                        let wall = self.wall_now();
                        if self.scheduler.next_event_is_wall_clock() {
                            if wall >= t {
                                return Some(t);
                            }
                            let remaining = t - wall;
                            thread::sleep(remaining.min(PUSH_POLL_INTERVAL));
                        } else {
                            // Not paced against wall-clock: deliver as soon as it's due.
                            return Some(t);
                        }
                    }
                }
            },
        }
    }

    fn advance_to(&mut self, t: EngineTime) {
        self.now = t;
        self.scheduler.promote_deferred();
        self.scheduler.drain_events_at(t);
        self.observers.on_tick_begin(t);
        crate::logging::tick_begin(t, 0);
    }

    /// Drains `pending_now` for the current tick, evaluating each node in
    /// rank order (§4.3 tie-breaks, §4.4 step 4). Returns the failing node's
    /// error if an eval error escapes every enclosing try/except boundary.
    fn drain_and_evaluate(&mut self) -> Result<(), EvalError> {
        // A node may be re-notified after it has already evaluated this tick
        // (e.g. a feedback edge's delivery waking a producer, which in turn
        // wakes the feedback node again) — §8 invariant 3 bounds every node to
        // at most one eval per tick, so a repeat notification is simply
        // dropped; the node picks it up again whenever it's next legitimately
        // woken.
        let mut evaluated = std::collections::HashSet::new();
        while let Some(node) = self.scheduler.pop_pending() {
            if evaluated.contains(&node) {
                continue;
            }
            if !drive::is_eligible(&self.arena, node, self.now) {
                continue;
            }
            evaluated.insert(node);
            let wall_now = self.wall_now();
            let result =
                drive::eval_node(&mut self.arena, &mut self.scheduler, &self.observers, self.now, wall_now, node);
            if let Err(err) = result {
                match self.arena.error_boundary(node.graph) {
                    Some(boundary) => {
                        drive::catch_error(
                            &mut self.arena,
                            &mut self.scheduler,
                            &self.observers,
                            self.now,
                            wall_now,
                            boundary,
                            &err,
                        );
                    }
                    None => return Err(err),
                }
            }
        }
        self.scheduler.end_tick();
        Ok(())
    }

    /// Runs until the stop criterion is reached: an explicit `end_time`, an
    /// empty future-event set in simulation mode, or an external
    /// [`StopHandle::stop`] (§4.4 "Termination").
    pub fn run(&mut self) -> Result<RunReport, EngineError> {
        self.start_all()?;
        let mut ticks = 0u64;
        let mut last_time = None;
        // `start` can itself leave work pending at the initial time — e.g.
        // binding an active input to an already-valid output schedules a
        // notification at the current engine time (§3 invariant 3). Drain
        // that before looking for the next *future* event.
        if self.scheduler.has_pending() {
            self.observers.on_tick_begin(self.now);
            crate::logging::tick_begin(self.now, 0);
            if let Err(err) = self.drain_and_evaluate() {
                self.stop_all();
                return Err(EngineError::Eval(err));
            }
            ticks += 1;
            last_time = Some(self.now);
        }
        loop {
            if self.stop.is_stopped() {
                break;
            }
            let Some(t) = self.next_tick_time() else { break };
            if let Some(end) = self.config.end_time {
                if t > end {
                    break;
                }
            }
            self.advance_to(t);
            if let Err(err) = self.drain_and_evaluate() {
                self.stop_all();
                return Err(EngineError::Eval(err));
            }
            ticks += 1;
            last_time = Some(t);
        }
        self.stop_all();
        Ok(RunReport { ticks, last_time })
    }
}
