//! tsflow is a time-driven functional reactive dataflow evaluation engine.
//!
//! A program is a directed graph of typed nodes exchanging time-series
//! values along connected edges. The engine holds a monotonically
//! non-decreasing logical clock; on each tick it delivers scheduled updates
//! and evaluates the nodes they woke, in topological (build) order, so that
//! a node never observes a stale value from something it depends on.
//!
//! This crate is the CORE graph evaluation engine only: the time-series
//! value model ([`ts`]), node activation/scheduling ([`node`], [`scheduler`]),
//! nested graphs ([`nested`]), and the real-time/simulation clocks
//! ([`evaluator`]). A wiring front-end that builds the graph declaratively,
//! adaptors (HTTP, spreadsheet-style publish/subscribe), a debug/inspector
//! UI, and CLI/serialization all live outside this crate; they are
//! collaborators that hand the engine a finished graph and consume the
//! events it emits through the [`observer`] and [`logging`] interfaces.
//!
//! # Example
//!
//! A pull-source node produces three ticks one microsecond apart; the
//! evaluator (in simulation mode) drains them and stops once its future-event
//! set empties.
//!
//! ```
//! use std::time::Duration;
//! use tsflow::config::EvaluatorConfig;
//! use tsflow::evaluator::Evaluator;
//! use tsflow::pull_source::{FnGenerator, PullSourceNode};
//! use tsflow::time::EngineTime;
//!
//! let mut ev = Evaluator::new(EvaluatorConfig::simulation());
//! let root = ev.root();
//! let mut remaining = vec![1, 2, 3];
//! remaining.reverse();
//! let source = PullSourceNode::new(
//!     tsflow::node::NodeId::new(root, 0),
//!     FnGenerator(move || remaining.pop().map(|v| (Duration::from_micros(1), v))),
//! );
//! let output = source.output();
//! ev.add_node(Box::new(source));
//!
//! let report = ev.run().unwrap();
//! assert_eq!(report.ticks, 3);
//! assert_eq!(output.value(), Some(3));
//! ```

pub mod config;
pub mod drive;
pub mod error;
pub mod evaluator;
pub mod feedback;
pub mod graph;
pub mod logging;
pub mod nested;
pub mod node;
pub mod observer;
pub mod pull_source;
pub mod push_source;
pub mod scheduler;
pub mod time;
pub mod ts;

pub use error::EngineError;
pub use evaluator::{Evaluator, RunReport, StopHandle};
pub use time::EngineTime;
