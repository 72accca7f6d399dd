//! TSB: a named, fixed schema bundle of sub-time-series (§3, §4).
//!
//! Per the design note on dynamic schemas (§9), a TSB's schema is known at
//! build time and encoded as a genuine Rust struct; `Bundle` is the
//! descriptor a node's input/output struct implements so the engine can
//! aggregate validity/modification across its fields and resolve a field by
//! name for the (external) wiring front-end, without the engine needing to
//! know the field types.

use crate::ts::core::{all_fully_valid, all_valid, ErasedTs};
use crate::time::EngineTime;

/// Implemented by a node's own input/output struct to describe its named,
/// fixed-at-build-time set of sub-time-series.
///
/// A typical implementation simply lists `&self.field` for every field:
///
/// ```ignore
/// struct Quote { bid: TimeSeriesOutput<f64>, ask: TimeSeriesOutput<f64> }
/// impl Bundle for Quote {
///     fn fields(&self) -> Vec<(&'static str, &dyn ErasedTs)> {
///         vec![("bid", &self.bid), ("ask", &self.ask)]
///     }
/// }
/// ```
pub trait Bundle {
    /// The bundle's fields, in schema-declaration order.
    fn fields(&self) -> Vec<(&'static str, &dyn ErasedTs)>;

    /// Resolves a field by name (runtime name→slot resolution happens only
    /// at build time, per §9; this is that resolution).
    fn field(&self, name: &str) -> Option<&dyn ErasedTs> {
        self.fields().into_iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Whether every leaf time-series in the bundle is valid (§3 `all_valid`).
    fn all_valid(&self) -> bool {
        all_fully_valid(&self.fields().into_iter().map(|(_, v)| v).collect::<Vec<_>>())
    }

    /// Whether every leaf has been written at least once.
    fn valid(&self) -> bool {
        all_valid(&self.fields().into_iter().map(|(_, v)| v).collect::<Vec<_>>())
    }

    /// Whether any field changed at `now`.
    fn modified(&self, now: EngineTime) -> bool {
        self.fields().into_iter().any(|(_, v)| v.modified(now))
    }

    /// The most recent modification time across every field.
    fn last_modified_time(&self) -> EngineTime {
        self.fields()
            .into_iter()
            .map(|(_, v)| v.last_modified_time())
            .max()
            .unwrap_or(EngineTime::MIN_DT)
    }
}
