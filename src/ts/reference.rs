//! Reference values: an immutable handle to a TSO, and the rebindable input
//! that follows one (§3, §4.1, §4.6, §8 S6).

use crate::node::{EvalContext, NodeId};
use crate::time::EngineTime;
use crate::ts::core::{ErasedTs, TimeSeriesInput, TimeSeriesOutput};

/// An immutable handle identifying a TSO, or an unbound placeholder.
///
/// A *reference output* is simply `TimeSeriesOutput<Reference<T>>` — the
/// reference value reuses the same scalar output machinery as any other
/// cell, since `Reference<T>` is itself `Clone`.
#[derive(Clone)]
pub struct Reference<T: Clone> {
    target: Option<TimeSeriesOutput<T>>,
}

impl<T: Clone> Reference<T> {
    /// An unbound placeholder reference.
    pub fn unbound() -> Self {
        Reference { target: None }
    }

    /// A reference pointing at `target`.
    pub fn to(target: TimeSeriesOutput<T>) -> Self {
        Reference { target: Some(target) }
    }

    /// The referenced output, if bound.
    pub fn target(&self) -> Option<&TimeSeriesOutput<T>> {
        self.target.as_ref()
    }
}

/// A reference input: observes a reference output and rebinds its followed
/// value whenever the reference's target changes (§4.1 "Reference
/// rebinding").
pub struct ReferenceInput<T: Clone> {
    owner: NodeId,
    ref_in: TimeSeriesInput<Reference<T>>,
    followed: TimeSeriesInput<T>,
}

impl<T: Clone> ReferenceInput<T> {
    /// An unbound reference input owned by `owner`. The followed value starts
    /// active so the owning node keeps waking up on the current target's
    /// ticks, not just on rebinds; call `make_followed_active`/pass through
    /// `make_passive` on the returned handle if passive following is wanted.
    pub fn new(owner: NodeId) -> Self {
        let mut followed = TimeSeriesInput::new(owner);
        followed.make_active();
        ReferenceInput { owner, ref_in: TimeSeriesInput::new(owner), followed }
    }

    /// Binds to the reference output `R` and activates the owning node on its changes.
    pub fn bind_reference(&mut self, ctx: &mut EvalContext, started: bool, output: TimeSeriesOutput<Reference<T>>) {
        self.ref_in.make_active();
        self.ref_in.bind(ctx, started, output);
    }

    /// Marks the followed value active: the owning node wakes up when the
    /// currently-targeted output changes, in addition to waking on rebinds.
    pub fn make_followed_active(&mut self) {
        self.followed.make_active();
    }

    /// Must be called once per tick, before reading `value()`: if the
    /// reference output ticked to a new target this tick, unbinds from the
    /// old target and binds to the new one, re-delivering any prior valid
    /// value by scheduling a self-tick at the current time (§4.1, §4.6).
    pub fn refresh(&mut self, ctx: &mut EvalContext) {
        if !self.ref_in.modified(ctx.now) {
            return;
        }
        let Some(r) = self.ref_in.value() else { return };
        let Some(target) = r.target else {
            self.followed.unbind();
            return;
        };
        let already_valid = target.valid();
        let started = true;
        self.followed.bind(ctx, started, target);
        if already_valid {
            self.followed.mark_sampled(ctx.now);
            ctx.scheduler.notify(self.owner);
        }
        crate::logging::reference_rebound(self.owner, ctx.now);
    }

    /// The value of whatever the reference currently targets.
    pub fn value(&self) -> Option<T> {
        self.followed.value()
    }

    /// Whether the followed target has ever been written.
    pub fn valid(&self) -> bool {
        self.followed.valid()
    }

    /// Whether the followed value changed at `now` — either because the
    /// target itself ticked, or because the reference just rebound to an
    /// already-valid target (re-delivery, OQ1).
    pub fn modified(&self, now: EngineTime) -> bool {
        self.followed.modified(now)
    }
}

impl<T: Clone> ErasedTs for ReferenceInput<T> {
    fn valid(&self) -> bool {
        self.valid()
    }
    fn all_valid(&self) -> bool {
        self.valid()
    }
    fn last_modified_time(&self) -> EngineTime {
        self.followed.last_modified_time()
    }
    fn modified(&self, now: EngineTime) -> bool {
        self.modified(now)
    }
}
