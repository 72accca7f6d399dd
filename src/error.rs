//! Error types for the engine, per §7.
//!
//! Grounded on the `thiserror` layered-enum style used by `formualizer-eval`
//! and `knhk`'s `EngineError` (`examples/seanchatmangpt-knhk/rust/docs/yawl/code/src_error.rs`):
//! one `#[derive(thiserror::Error)]` enum per failure domain, `#[from]` to
//! chain causes, and a top-level enum the public entry points return.

use thiserror::Error;

use crate::node::NodeId;
use crate::time::EngineTime;

/// Malformed graph, caught before evaluation starts (§7).
#[derive(Error, Debug, Clone)]
pub enum WiringError {
    /// Two time-series of incompatible types were connected.
    #[error("type mismatch binding {input} to {output}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Path of the input being bound.
        input: String,
        /// Path of the output being bound.
        output: String,
        /// Type name the input expects.
        expected: String,
        /// Type name the output actually carries.
        found: String,
    },
    /// A required input was never bound to an output.
    #[error("missing binding for required input {0}")]
    MissingBinding(String),
    /// A name resolved to more than one candidate (e.g. overloaded operator).
    #[error("ambiguous binding for {0}: {1} candidates")]
    AmbiguousOverload(String, usize),
    /// A TSL was built with the wrong arity, or a TSB field name does not exist.
    #[error("schema error: {0}")]
    Schema(String),
}

/// An exception raised during a node's `eval` (§7).
///
/// §7 and SPEC_FULL §4.9 describe a `TypeCheckError` the original's
/// dynamically-typed `apply_result` can raise at runtime. `TimeSeriesOutput<T>::apply_result`
/// here is generic over `T`, so a mismatched value is a compile error, not a
/// possible runtime outcome — there is no call site that could ever produce
/// one. Rust's static typing subsumes that error kind rather than needing it
/// reimplemented; see DESIGN.md.
#[derive(Error, Debug, Clone)]
#[error("eval failed at {node} (t={time}): {message}")]
pub struct EvalError {
    /// Node whose eval raised.
    pub node: NodeId,
    /// Engine time of the failing tick.
    pub time: EngineTime,
    /// Human-readable description.
    pub message: String,
}

impl EvalError {
    /// Builds an eval error.
    pub fn new(node: NodeId, time: EngineTime, message: impl Into<String>) -> Self {
        EvalError { node, time, message: message.into() }
    }
}

/// Push-source queue overflow (§7). Counted by the evaluator, not necessarily fatal.
#[derive(Error, Debug, Clone)]
#[error("push-source queue overflow at {node}: {dropped} value(s) dropped")]
pub struct ResourceError {
    /// The push-source node whose queue overflowed.
    pub node: NodeId,
    /// Values dropped so far under the drop-newest policy.
    pub dropped: u64,
}

/// The top-level failure an evaluator run can return (§7 "User-visible").
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Graph construction/validation failed before the run started.
    #[error(transparent)]
    Wiring(#[from] WiringError),
    /// A node eval raised outside of any enclosing try/except.
    #[error(transparent)]
    Eval(#[from] EvalError),
    /// A push-source dropped values; surfaced only if the caller treats it as fatal.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}
