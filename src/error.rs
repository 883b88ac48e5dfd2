//! Error types for demand series construction, scenario configuration and the dispatch run.

use chrono::{NaiveDateTime, TimeDelta};
use thiserror::Error;

use crate::series::Channel;
use crate::sim::dispatch_schedule::SetpointSlot;

/// Rejections raised while building a [`DemandSeries`](crate::series::DemandSeries).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("demand series is empty")]
    Empty,

    #[error("timestamps not strictly increasing at index {index} ({timestamp})")]
    Unordered {
        index: usize,
        timestamp: NaiveDateTime,
    },

    #[error("sample interval at index {index} is {found}, expected {expected}")]
    IrregularInterval {
        index: usize,
        expected: TimeDelta,
        found: TimeDelta,
    },

    #[error("sample rate must be at least 1 ms, got {0}")]
    InvalidSampleRate(TimeDelta),

    #[error("channel {channel} has {found} values, expected {expected}")]
    LengthMismatch {
        channel: Channel,
        expected: usize,
        found: usize,
    },

    #[error("series has {found} values for {expected} timestamps")]
    ValueCount { expected: usize, found: usize },

    #[error("required channel {0} is missing")]
    MissingChannel(Channel),

    #[error("power factor at index {index} must be in (0, 1], got {value}")]
    InvalidPowerFactor { index: usize, value: f64 },
}

/// A scenario field that failed parsing or validation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g. `"equipment.storage_capacity"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Data-integrity failures of a realized dispatch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("negative dispatch (charge={charge}, discharge={discharge})")]
    NegativeDispatch { charge: f64, discharge: f64 },

    #[error("simultaneous charge {charge} and discharge {discharge}")]
    SimultaneousChargeDischarge { charge: f64, discharge: f64 },

    #[error("charge of {0} outside the permitted charge window")]
    ChargeOutsideSchedule(f64),

    #[error("discharge of {0} outside the permitted discharge window")]
    DischargeOutsideSchedule(f64),
}

/// Umbrella error for building and running a dispatch simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("strategy needs at least one {0} recomputation event")]
    MissingSetpointEvents(SetpointSlot),

    #[error("charge capacity {charge} differs from discharge capacity {discharge}")]
    CapacityMismatch { charge: f64, discharge: f64 },

    #[error("price series does not cover demand timestamp {0}")]
    PricesDoNotCover(NaiveDateTime),

    #[error("price sample rate {prices} differs from demand sample rate {demand}")]
    SampleRateMismatch { prices: TimeDelta, demand: TimeDelta },

    #[error("invariant violated at {timestamp}: {violation}")]
    Invariant {
        timestamp: NaiveDateTime,
        #[source]
        violation: InvariantViolation,
    },
}

/// Failures while reading a demand series from CSV.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: cannot parse timestamp \"{value}\"")]
    Timestamp { row: usize, value: String },

    #[error("row {row}: column {column} is not a number: \"{value}\"")]
    Value {
        row: usize,
        column: String,
        value: String,
    },

    #[error("csv has no {0} column")]
    MissingColumn(String),

    #[error("csv needs at least two rows to infer the sample rate")]
    TooShort,

    #[error(transparent)]
    Series(#[from] SeriesError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
