//! §8 scenario S1 (random walk / periodic sources), exercised deterministically.
//!
//! The scenario as specified drives three wall-clock-paced sources for about
//! a second under `EvalMode::RealTime`; reproducing that verbatim here would
//! make the suite slow and timing-sensitive for no extra confidence, since
//! `RealTime` only changes *when* `next_tick_time` returns a time, never the
//! scheduling/notification machinery under test. This exercises the same
//! three-independent-sources wiring under `EvalMode::Simulation`, which
//! drains every scheduled tick as fast as possible instead of pacing against
//! the wall clock, and checks the invariants S1 actually cares about:
//! strictly increasing tick times and a value present for every source after
//! its first fire.

use std::time::Duration;

use tsflow::config::EvaluatorConfig;
use tsflow::evaluator::Evaluator;
use tsflow::node::NodeId;
use tsflow::pull_source::{FnGenerator, PullSourceNode};
use tsflow::time::EngineTime;

#[test]
fn three_independent_sources_tick_monotonically_and_each_produces() {
    let mut ev = Evaluator::new(EvaluatorConfig::simulation());
    let root = ev.root();

    // Distinct, mutually-prime-ish periods (100us/101us/103us) so the three
    // sources' schedules never coincide over 10 ticks each — each fire stays
    // its own tick, the way three independently-paced real clocks would.
    let periods = [100u64, 101, 103];
    let mut outputs = Vec::new();
    for (ndx, period) in periods.into_iter().enumerate() {
        let id = NodeId::new(root, ndx);
        let mut counter = 0i64;
        let source = PullSourceNode::new(
            id,
            FnGenerator(move || {
                counter += 1;
                (counter <= 10).then(|| (Duration::from_micros(period), counter))
            }),
        );
        outputs.push(source.output());
        assert_eq!(ev.add_node(Box::new(source)), id);
    }

    let report = ev.run().unwrap();

    assert_eq!(report.ticks, 30);
    assert_eq!(report.last_time, Some(EngineTime::from_micros(1_030)));

    for output in &outputs {
        assert_eq!(output.value(), Some(10));
    }
}

#[test]
fn tick_times_are_strictly_increasing_across_the_run() {
    use std::cell::RefCell;
    use std::rc::Rc;
    use tsflow::observer::Observer;

    struct TickLog(Rc<RefCell<Vec<EngineTime>>>);
    impl Observer for TickLog {
        fn on_tick_begin(&self, now: EngineTime) {
            self.0.borrow_mut().push(now);
        }
    }

    let mut ev = Evaluator::new(EvaluatorConfig::simulation());
    let root = ev.root();
    let log = Rc::new(RefCell::new(Vec::new()));
    ev.observers_mut().subscribe_all(Box::new(TickLog(Rc::clone(&log))));

    let mut remaining = vec![1, 2, 3, 4, 5];
    remaining.reverse();
    let id = NodeId::new(root, 0);
    let source = PullSourceNode::new(
        id,
        FnGenerator(move || remaining.pop().map(|v| (Duration::from_micros(50), v))),
    );
    ev.add_node(Box::new(source));
    ev.run().unwrap();

    let ticks = log.borrow();
    assert_eq!(ticks.len(), 5);
    for pair in ticks.windows(2) {
        assert!(pair[0] < pair[1], "tick times must be strictly increasing: {pair:?}");
    }
}
