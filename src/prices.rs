//! Wholesale market price series.

use chrono::{NaiveDateTime, TimeDelta};

use crate::error::SeriesError;
use crate::series::{TimeIndexed, validate_index};

/// Regular, timestamp-indexed energy prices.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketPrices {
    timestamps: Vec<NaiveDateTime>,
    sample_rate: TimeDelta,
    prices: Vec<f64>,
}

impl MarketPrices {
    /// # Errors
    ///
    /// Returns a [`SeriesError`] under the same index rules as a demand
    /// series, or when prices and timestamps differ in length.
    pub fn new(
        timestamps: Vec<NaiveDateTime>,
        sample_rate: TimeDelta,
        prices: Vec<f64>,
    ) -> Result<Self, SeriesError> {
        validate_index(&timestamps, sample_rate)?;
        if prices.len() != timestamps.len() {
            return Err(SeriesError::ValueCount {
                expected: timestamps.len(),
                found: prices.len(),
            });
        }
        Ok(Self {
            timestamps,
            sample_rate,
            prices,
        })
    }

    pub fn sample_rate(&self) -> TimeDelta {
        self.sample_rate
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// True when `t` lies inside one of the price intervals.
    pub fn covers(&self, t: NaiveDateTime) -> bool {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => *first <= t && t < *last + self.sample_rate,
            _ => false,
        }
    }

    /// Timestamps in `range` ordered from cheapest to dearest.
    ///
    /// Ties keep chronological order.
    pub fn ranked(&self, range: std::ops::Range<usize>) -> Vec<NaiveDateTime> {
        let mut idx: Vec<usize> = range.filter(|i| *i < self.prices.len()).collect();
        idx.sort_by(|a, b| self.prices[*a].total_cmp(&self.prices[*b]));
        idx.into_iter().map(|i| self.timestamps[i]).collect()
    }
}

impl TimeIndexed for MarketPrices {
    fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }
}
