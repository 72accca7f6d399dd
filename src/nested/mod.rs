//! Nested graphs: map, switch, try/except (§4.5, C7).
//!
//! All three share one trick: a nested node owns a [`crate::graph::GraphId`]
//! (or several, for map) built and torn down during its own `eval`/`start`,
//! and relies on the flat, rank-ordered scheduler (§4.3) to drive its
//! sub-graph's own nodes on later ticks exactly like any root-level node —
//! nested nodes only ever handle the *structural* events (a key appearing,
//! the selector changing, an error tripping), never the sub-graph's routine
//! per-tick evaluation.

pub mod map;
pub mod switch;
pub mod try_except;
