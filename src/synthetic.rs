//! Seeded synthetic daily profiles for demo runs and tests.

use chrono::{NaiveDateTime, TimeDelta, Timelike};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::error::SeriesError;
use crate::prices::MarketPrices;
use crate::series::{DemandSeries, hours, regular_timestamps};

/// A daily cosine curve with Gaussian noise.
///
/// The curve peaks at `peak_hour` with value `base + amplitude` and bottoms
/// out twelve hours later at `base - amplitude`. Values never go negative.
///
/// # Examples
///
/// ```
/// use chrono::{NaiveDate, TimeDelta};
/// use flex_dispatch::synthetic::DailyProfile;
///
/// let profile = DailyProfile::new(40.0, 20.0, 18.0, 0.0);
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1)
///     .and_then(|d| d.and_hms_opt(0, 0, 0))
///     .expect("valid date");
/// let series = profile
///     .demand_series(start, TimeDelta::hours(1), 24, 0.95, 0.0, 7)
///     .expect("valid series");
/// assert_eq!(series.len(), 24);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyProfile {
    /// Mean level (power units).
    pub base: f64,
    /// Half the peak-to-trough swing.
    pub amplitude: f64,
    /// Hour of day (fractional) at which the curve peaks.
    pub peak_hour: f64,
    /// Standard deviation of the additive noise.
    pub noise_std: f64,
}

impl DailyProfile {
    pub fn new(base: f64, amplitude: f64, peak_hour: f64, noise_std: f64) -> Self {
        Self {
            base,
            amplitude,
            peak_hour,
            noise_std,
        }
    }

    /// Profile value at `t`, before noise.
    pub fn level(&self, t: NaiveDateTime) -> f64 {
        let hour = t.hour() as f64 + t.minute() as f64 / 60.0;
        let angle = 2.0 * std::f64::consts::PI * (hour - self.peak_hour) / 24.0;
        self.base + self.amplitude * angle.cos()
    }

    /// Noisy profile value at `t`, clamped at zero.
    pub fn sample(&self, rng: &mut StdRng, t: NaiveDateTime) -> f64 {
        let noise = if self.noise_std > 0.0 {
            // Box-Muller
            let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
            let u2: f64 = rng.random::<f64>();
            let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            z0 * self.noise_std
        } else {
            0.0
        };
        (self.level(t) + noise).max(0.0)
    }

    /// Samples the profile at every timestamp with a fresh seeded generator.
    pub fn values(&self, timestamps: &[NaiveDateTime], seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        timestamps.iter().map(|t| self.sample(&mut rng, *t)).collect()
    }

    /// Builds a demand series whose power follows the profile.
    ///
    /// # Arguments
    ///
    /// * `start` - First timestamp
    /// * `sample_rate` - Interval length
    /// * `count` - Number of samples
    /// * `power_factor` - Constant power factor in (0, 1]
    /// * `sub_load_fraction` - Share of energy that is flexible sub-load
    /// * `seed` - Noise seed
    ///
    /// # Errors
    ///
    /// Returns a [`SeriesError`] for an empty series, a non-positive sample
    /// rate or an out-of-range power factor.
    pub fn demand_series(
        &self,
        start: NaiveDateTime,
        sample_rate: TimeDelta,
        count: usize,
        power_factor: f64,
        sub_load_fraction: f64,
        seed: u64,
    ) -> Result<DemandSeries, SeriesError> {
        let timestamps = regular_timestamps(start, sample_rate, count);
        let dt_h = hours(sample_rate);
        let energy: Vec<f64> = self
            .values(&timestamps, seed)
            .into_iter()
            .map(|p| p * dt_h)
            .collect();
        let sub_load = energy.iter().map(|e| e * sub_load_fraction).collect();
        DemandSeries::from_energy(timestamps, sample_rate, energy, power_factor)?
            .with_sub_load(sub_load)
    }

    /// Builds a price series following the profile at the given timestamps.
    ///
    /// # Errors
    ///
    /// Returns a [`SeriesError`] under the same index rules as a demand series.
    pub fn price_series(
        &self,
        timestamps: &[NaiveDateTime],
        sample_rate: TimeDelta,
        seed: u64,
    ) -> Result<MarketPrices, SeriesError> {
        MarketPrices::new(
            timestamps.to_vec(),
            sample_rate,
            self.values(timestamps, seed),
        )
    }
}
