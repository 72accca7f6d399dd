//! TSL: a fixed-length vector of sub-time-series (§3).

use crate::node::NodeId;
use crate::time::EngineTime;
use crate::ts::core::{ErasedTs, TimeSeriesOutput};

/// A fixed-length (`N`, checked at construction) vector of scalar outputs.
pub struct Tsl<T: Clone> {
    items: Vec<TimeSeriesOutput<T>>,
}

impl<T: Clone> Tsl<T> {
    /// Builds a TSL of exactly `len` fresh, invalid outputs owned by `owner`.
    pub fn new(owner: NodeId, len: usize) -> Self {
        Tsl { items: (0..len).map(|_| TimeSeriesOutput::new(owner)).collect() }
    }

    /// Fixed length of this TSL.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this TSL has zero elements.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The sub-time-series at `index`.
    pub fn get(&self, index: usize) -> &TimeSeriesOutput<T> {
        &self.items[index]
    }

    /// Iterates over `(index, &sub-time-series)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &TimeSeriesOutput<T>)> {
        self.items.iter().enumerate()
    }
}

impl<T: Clone> ErasedTs for Tsl<T> {
    fn valid(&self) -> bool {
        self.items.iter().all(|i| i.valid())
    }
    fn all_valid(&self) -> bool {
        self.valid()
    }
    fn last_modified_time(&self) -> EngineTime {
        self.items.iter().map(|i| i.last_modified_time()).max().unwrap_or(EngineTime::MIN_DT)
    }
    fn modified(&self, now: EngineTime) -> bool {
        self.items.iter().any(|i| i.modified(now))
    }
}
