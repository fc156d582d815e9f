//! Rate slot data model (§3, §4.1). Grounded on
//! `examples/original_source/api/rates_test.go`: a `Rates` sequence sorts
//! descending by start so the planner scans latest-first without resorting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RateSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub price: f64,
}

impl RateSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, price: f64) -> Self {
        Self { start, end, price }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// Clip this slot to `[lower, upper]`, returning `None` if the result is
    /// empty or inverted.
    pub fn clip(&self, lower: DateTime<Utc>, upper: DateTime<Utc>) -> Option<Self> {
        let start = self.start.max(lower);
        let end = self.end.min(upper);
        if start < end {
            Some(Self {
                start,
                end,
                price: self.price,
            })
        } else {
            None
        }
    }
}

/// Descending-by-start ordering with later start first, matching the
/// original source's `sort.Sort(Rates)`.
impl Eq for RateSlot {}

impl Ord for RateSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        other.start.cmp(&self.start)
    }
}

impl PartialOrd for RateSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A sorted sequence of non-overlapping rate slots, descending by start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rates(pub Vec<RateSlot>);

impl Rates {
    pub fn new(mut slots: Vec<RateSlot>) -> Self {
        slots.sort();
        Self(slots)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RateSlot> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
