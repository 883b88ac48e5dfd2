//! Timestamp-indexed demand series consumed by the dispatch engine.
//!
//! A [`DemandSeries`] is validated once at construction: non-empty, strictly
//! increasing timestamps spaced exactly one `sample_rate` apart, and every
//! channel the same length as the index. Derived channels (`balance_energy`)
//! are computed eagerly so the series stays immutable afterwards.

use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::SeriesError;

/// Named numeric channel of a demand series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    DemandEnergy,
    DemandPower,
    DemandApparent,
    PowerFactor,
    GenerationEnergy,
    SubloadEnergy,
    /// `demand_energy - subload_energy`, derived at construction.
    BalanceEnergy,
}

impl Channel {
    /// Channels that must be supplied to [`DemandSeries::new`].
    pub const REQUIRED: [Channel; 5] = [
        Channel::DemandEnergy,
        Channel::DemandPower,
        Channel::DemandApparent,
        Channel::PowerFactor,
        Channel::GenerationEnergy,
    ];

    /// Column name used in CSV files and scenario configuration.
    pub const fn name(self) -> &'static str {
        match self {
            Channel::DemandEnergy => "demand_energy",
            Channel::DemandPower => "demand_power",
            Channel::DemandApparent => "demand_apparent",
            Channel::PowerFactor => "power_factor",
            Channel::GenerationEnergy => "generation_energy",
            Channel::SubloadEnergy => "subload_energy",
            Channel::BalanceEnergy => "balance_energy",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Anything indexed by a sorted timestamp vector (demand, prices).
pub trait TimeIndexed {
    /// Strictly increasing observation timestamps.
    fn timestamps(&self) -> &[NaiveDateTime];
}

/// Converts a sample interval to fractional hours.
pub fn hours(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 3_600_000.0
}

/// Builds `count` timestamps starting at `start`, spaced `sample_rate` apart.
pub fn regular_timestamps(
    start: NaiveDateTime,
    sample_rate: TimeDelta,
    count: usize,
) -> Vec<NaiveDateTime> {
    let mut out = Vec::with_capacity(count);
    let mut t = start;
    for _ in 0..count {
        out.push(t);
        t += sample_rate;
    }
    out
}

/// Shortest sample interval a series may use, in milliseconds.
pub const MIN_SAMPLE_RATE_MS: i64 = 1;

/// Checks the index invariants shared by every time-indexed series.
pub(crate) fn validate_index(
    timestamps: &[NaiveDateTime],
    sample_rate: TimeDelta,
) -> Result<(), SeriesError> {
    if sample_rate < TimeDelta::milliseconds(MIN_SAMPLE_RATE_MS) {
        return Err(SeriesError::InvalidSampleRate(sample_rate));
    }
    if timestamps.is_empty() {
        return Err(SeriesError::Empty);
    }
    for (index, pair) in timestamps.windows(2).enumerate() {
        let step = pair[1] - pair[0];
        if step <= TimeDelta::zero() {
            return Err(SeriesError::Unordered {
                index: index + 1,
                timestamp: pair[1],
            });
        }
        if step != sample_rate {
            return Err(SeriesError::IrregularInterval {
                index: index + 1,
                expected: sample_rate,
                found: step,
            });
        }
    }
    Ok(())
}

/// Raw meter channels handed to [`DemandSeries::new`].
///
/// `None` marks a channel the meter did not supply. Only `subload_energy`
/// is optional; it defaults to zeros.
#[derive(Debug, Clone, Default)]
pub struct MeterChannels {
    pub demand_energy: Option<Vec<f64>>,
    pub demand_power: Option<Vec<f64>>,
    pub demand_apparent: Option<Vec<f64>>,
    pub power_factor: Option<Vec<f64>>,
    pub generation_energy: Option<Vec<f64>>,
    pub subload_energy: Option<Vec<f64>>,
}

/// Immutable, regular, timestamp-indexed demand observations.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandSeries {
    timestamps: Vec<NaiveDateTime>,
    sample_rate: TimeDelta,
    demand_energy: Vec<f64>,
    demand_power: Vec<f64>,
    demand_apparent: Vec<f64>,
    power_factor: Vec<f64>,
    generation_energy: Vec<f64>,
    subload_energy: Vec<f64>,
    balance_energy: Vec<f64>,
}

impl DemandSeries {
    /// Validates meter channels and builds a series.
    ///
    /// # Errors
    ///
    /// Returns a [`SeriesError`] if the sample rate is under
    /// [`MIN_SAMPLE_RATE_MS`], the index is empty, unordered or irregular, a
    /// required channel is missing, a channel length differs
    /// from the index, or a power factor lies outside `(0, 1]`.
    pub fn new(
        timestamps: Vec<NaiveDateTime>,
        sample_rate: TimeDelta,
        channels: MeterChannels,
    ) -> Result<Self, SeriesError> {
        validate_index(&timestamps, sample_rate)?;
        let n = timestamps.len();

        let take = |values: Option<Vec<f64>>, channel: Channel| -> Result<Vec<f64>, SeriesError> {
            let values = values.ok_or(SeriesError::MissingChannel(channel))?;
            if values.len() != n {
                return Err(SeriesError::LengthMismatch {
                    channel,
                    expected: n,
                    found: values.len(),
                });
            }
            Ok(values)
        };

        let demand_energy = take(channels.demand_energy, Channel::DemandEnergy)?;
        let demand_power = take(channels.demand_power, Channel::DemandPower)?;
        let demand_apparent = take(channels.demand_apparent, Channel::DemandApparent)?;
        let power_factor = take(channels.power_factor, Channel::PowerFactor)?;
        let generation_energy = take(channels.generation_energy, Channel::GenerationEnergy)?;
        let subload_energy = take(
            Some(channels.subload_energy.unwrap_or_else(|| vec![0.0; n])),
            Channel::SubloadEnergy,
        )?;

        if let Some((index, &value)) = power_factor
            .iter()
            .enumerate()
            .find(|(_, pf)| !(**pf > 0.0 && **pf <= 1.0))
        {
            return Err(SeriesError::InvalidPowerFactor { index, value });
        }

        let balance_energy = balance(&demand_energy, &subload_energy);

        Ok(Self {
            timestamps,
            sample_rate,
            demand_energy,
            demand_power,
            demand_apparent,
            power_factor,
            generation_energy,
            subload_energy,
            balance_energy,
        })
    }

    /// Builds a series from interval energy and a constant power factor.
    ///
    /// Power is `energy / Δt_hours`, apparent power is `power / pf`, and
    /// generation is zero.
    ///
    /// # Errors
    ///
    /// Same as [`DemandSeries::new`].
    pub fn from_energy(
        timestamps: Vec<NaiveDateTime>,
        sample_rate: TimeDelta,
        energy: Vec<f64>,
        power_factor: f64,
    ) -> Result<Self, SeriesError> {
        let dt_h = hours(sample_rate);
        let n = energy.len();
        let power: Vec<f64> = if dt_h > 0.0 {
            energy.iter().map(|e| e / dt_h).collect()
        } else {
            vec![0.0; n]
        };
        let apparent = power.iter().map(|p| p / power_factor).collect();
        Self::new(
            timestamps,
            sample_rate,
            MeterChannels {
                demand_energy: Some(energy),
                demand_power: Some(power),
                demand_apparent: Some(apparent),
                power_factor: Some(vec![power_factor; n]),
                generation_energy: Some(vec![0.0; n]),
                subload_energy: None,
            },
        )
    }

    /// Replaces the sub-load channel and re-derives the balance.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::LengthMismatch`] if `subload` has the wrong length.
    pub fn with_sub_load(mut self, subload: Vec<f64>) -> Result<Self, SeriesError> {
        if subload.len() != self.len() {
            return Err(SeriesError::LengthMismatch {
                channel: Channel::SubloadEnergy,
                expected: self.len(),
                found: subload.len(),
            });
        }
        self.balance_energy = balance(&self.demand_energy, &subload);
        self.subload_energy = subload;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Always `false`; construction rejects empty series.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn sample_rate(&self) -> TimeDelta {
        self.sample_rate
    }

    /// Sample interval in hours.
    pub fn sample_hours(&self) -> f64 {
        hours(self.sample_rate)
    }

    /// First observation instant.
    pub fn start(&self) -> NaiveDateTime {
        self.timestamps[0]
    }

    /// Values of one channel, aligned with [`TimeIndexed::timestamps`].
    pub fn values(&self, channel: Channel) -> &[f64] {
        match channel {
            Channel::DemandEnergy => &self.demand_energy,
            Channel::DemandPower => &self.demand_power,
            Channel::DemandApparent => &self.demand_apparent,
            Channel::PowerFactor => &self.power_factor,
            Channel::GenerationEnergy => &self.generation_energy,
            Channel::SubloadEnergy => &self.subload_energy,
            Channel::BalanceEnergy => &self.balance_energy,
        }
    }

    /// Index of an exact timestamp, if present.
    pub fn position(&self, t: NaiveDateTime) -> Option<usize> {
        self.timestamps.binary_search(&t).ok()
    }

    /// Multiplies every channel except `exclude` by `factor`.
    ///
    /// The power factor is dimensionless and never scaled; the balance
    /// channel is re-derived from the scaled energy and sub-load.
    pub fn scaled(&self, factor: f64, exclude: &[Channel]) -> Self {
        let scale = |values: &[f64], channel: Channel| -> Vec<f64> {
            if exclude.contains(&channel) {
                values.to_vec()
            } else {
                values.iter().map(|v| v * factor).collect()
            }
        };

        let demand_energy = scale(&self.demand_energy, Channel::DemandEnergy);
        let subload_energy = scale(&self.subload_energy, Channel::SubloadEnergy);
        Self {
            timestamps: self.timestamps.clone(),
            sample_rate: self.sample_rate,
            demand_power: scale(&self.demand_power, Channel::DemandPower),
            demand_apparent: scale(&self.demand_apparent, Channel::DemandApparent),
            power_factor: self.power_factor.clone(),
            generation_energy: scale(&self.generation_energy, Channel::GenerationEnergy),
            balance_energy: balance(&demand_energy, &subload_energy),
            demand_energy,
            subload_energy,
        }
    }

    /// Derives the flexed series after removing `net` energy at each step.
    ///
    /// Energy drops by `net`; power and apparent power drop by the matching
    /// `net / Δt_hours` and `net / Δt_hours / pf`, using the unmodified power
    /// factor. With `reduce_sub_load` the sub-load channel absorbs the same
    /// change. A step with zero net is returned unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `net` does not have one value per timestamp.
    pub fn flexed(&self, net: &[f64], reduce_sub_load: bool) -> Self {
        assert_eq!(net.len(), self.len(), "net dispatch must align with series");
        let dt_h = self.sample_hours();

        let demand_energy: Vec<f64> = self
            .demand_energy
            .iter()
            .zip(net)
            .map(|(e, n)| e - n)
            .collect();
        let demand_power: Vec<f64> = self
            .demand_power
            .iter()
            .zip(net)
            .map(|(p, n)| p - n / dt_h)
            .collect();
        let demand_apparent = self
            .demand_apparent
            .iter()
            .zip(net)
            .zip(&self.power_factor)
            .map(|((s, n), pf)| s - n / dt_h / pf)
            .collect();
        let subload_energy = if reduce_sub_load {
            self.subload_energy
                .iter()
                .zip(net)
                .map(|(s, n)| s - n)
                .collect()
        } else {
            self.subload_energy.clone()
        };

        Self {
            timestamps: self.timestamps.clone(),
            sample_rate: self.sample_rate,
            balance_energy: balance(&demand_energy, &subload_energy),
            demand_energy,
            demand_power,
            demand_apparent,
            power_factor: self.power_factor.clone(),
            generation_energy: self.generation_energy.clone(),
            subload_energy,
        }
    }
}

impl TimeIndexed for DemandSeries {
    fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }
}

fn balance(energy: &[f64], subload: &[f64]) -> Vec<f64> {
    energy.iter().zip(subload).map(|(e, s)| e - s).collect()
}
