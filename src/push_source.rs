//! Push-source nodes: external threads deliver values through a bounded,
//! thread-safe FIFO (§4.2, §5, §6 "Source adapter interface").
//!
//! Grounded on the teacher's preference for a plain channel-like primitive
//! for same-process delivery (`communication/src/allocator/thread.rs` uses
//! `Rc<RefCell<VecDeque<T>>>` push/pull pairs) — but a push-source genuinely
//! crosses a thread boundary here, unlike the teacher's same-thread
//! allocator channel, so this uses `std::sync::mpsc::sync_channel` instead
//! (§EXP-1).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::Duration;

/// How often the real-time evaluator re-checks push-source queues while
/// waiting for the next scheduled wall-clock event (§4.4 step 1).
pub const PUSH_POLL_INTERVAL: Duration = Duration::from_millis(5);

use crate::error::{EvalError, ResourceError, WiringError};
use crate::node::{EvalContext, NodeId, NodeKind, NodeOps, NodeState};
use crate::ts::core::TimeSeriesOutput;

/// The handle a foreign thread calls to deliver one value (§6 "Source
/// adapter interface"). Bounded with a drop-newest overflow policy: a full
/// queue silently drops the new value and increments a counter surfaced via
/// [`PushSender::dropped_count`] and, once the owning node evaluates, the
/// observer interface (§7 `ResourceError`).
pub struct PushSender<T> {
    node: NodeId,
    tx: SyncSender<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for PushSender<T> {
    fn clone(&self) -> Self {
        PushSender { node: self.node, tx: self.tx.clone(), dropped: Arc::clone(&self.dropped) }
    }
}

impl<T> PushSender<T> {
    /// Delivers one value. Never blocks: a full queue drops the value and
    /// returns a [`ResourceError`] the caller may log or ignore. The
    /// evaluator notices new values by polling (§4.4, `PUSH_POLL_INTERVAL`
    /// in real-time mode), not through a wakeup signal from this call.
    pub fn send(&self, value: T) -> Result<(), ResourceError> {
        match self.tx.try_send(value) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                crate::logging::resource_error(self.node, dropped);
                Err(ResourceError { node: self.node, dropped })
            }
        }
    }

    /// Running count of values dropped under queue overflow.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A node fed from an external thread via a bounded queue (§4.2 "Push-source").
pub struct PushSourceNode<T: Clone> {
    state: NodeState,
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
    last_reported_dropped: u64,
    buffer: VecDeque<T>,
    output: TimeSeriesOutput<T>,
}

impl<T: Clone> PushSourceNode<T> {
    /// Builds a push-source node and the [`PushSender`] its foreign thread will call.
    ///
    /// `capacity` is the bounded queue depth (§5, §EXP `EvaluatorConfig::push_queue_capacity`).
    pub fn new(owner: NodeId, capacity: usize) -> (Self, PushSender<T>) {
        let (tx, rx) = sync_channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let output = TimeSeriesOutput::new(owner);
        let node = PushSourceNode {
            state: NodeState::New,
            rx,
            dropped: Arc::clone(&dropped),
            last_reported_dropped: 0,
            buffer: VecDeque::new(),
            output,
        };
        let sender = PushSender { node: owner, tx, dropped };
        (node, sender)
    }

    /// The output this push source writes ticks to.
    pub fn output(&self) -> TimeSeriesOutput<T> {
        self.output.clone()
    }

    /// Running count of values dropped on this source's queue (shared with every [`PushSender`] clone).
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T: Clone + 'static> NodeOps for PushSourceNode<T> {
    fn kind(&self) -> NodeKind {
        NodeKind::PushSource
    }
    fn state(&self) -> NodeState {
        self.state
    }
    fn name(&self) -> &str {
        "push_source"
    }

    fn start(&mut self, _ctx: &mut EvalContext) -> Result<(), WiringError> {
        self.state = NodeState::Started;
        Ok(())
    }

    fn is_eligible(&self, _now: crate::time::EngineTime) -> bool {
        self.state == NodeState::Started && !self.buffer.is_empty()
    }

    fn poll_external(&mut self) -> bool {
        while let Ok(v) = self.rx.try_recv() {
            self.buffer.push_back(v);
        }
        !self.buffer.is_empty()
    }

    fn eval(&mut self, ctx: &mut EvalContext) -> Result<(), EvalError> {
        if let Some(value) = self.buffer.pop_front() {
            self.output.apply_result(ctx, value)?;
            if !self.buffer.is_empty() {
                // Preserve FIFO within the source: re-arm one microsecond
                // later so the remaining values each get their own distinct
                // tick (§5 "preserves FIFO within a source").
                let next = ctx.now.saturating_add(Duration::from_micros(1));
                ctx.scheduler.schedule(ctx.node, next, ctx.now, false);
            }
        }
        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped != self.last_reported_dropped {
            self.last_reported_dropped = dropped;
            ctx.observers.on_resource_error(ctx.node, dropped);
        }
        ctx.report_eval(true);
        Ok(())
    }

    fn stop(&mut self, ctx: &mut EvalContext) {
        self.state = NodeState::Stopped;
        ctx.scheduler.discard_node(ctx.node);
    }
}
