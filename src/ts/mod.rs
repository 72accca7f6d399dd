//! The time-series value model (§3, §4.1): scalar cells and the composite
//! containers built on top of them.

pub mod buff;
pub mod core;
pub mod reference;
pub mod tsb;
pub mod tsd;
pub mod tsl;

pub use core::{ErasedTs, TimeSeriesInput, TimeSeriesOutput};
