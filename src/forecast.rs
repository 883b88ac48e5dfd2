//! Perfect-foresight forecasting over already-known series.

use std::ops::Range;

use chrono::{NaiveDateTime, TimeDelta};

use crate::series::TimeIndexed;

/// Perfect-foresight forecaster: the future is read straight from the series.
///
/// The look-ahead covers `[t, t + window]`, inclusive at both ends. A window
/// that runs past the end of the series is truncated; callers at the tail of
/// a run see a shorter forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfectForecaster {
    window: TimeDelta,
}

impl PerfectForecaster {
    pub fn new(window: TimeDelta) -> Self {
        Self { window }
    }

    /// Builds a forecaster from a window length in (possibly fractional) hours.
    pub fn from_hours(hours: f64) -> Self {
        Self::new(TimeDelta::milliseconds((hours * 3_600_000.0).round() as i64))
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    pub fn set_window(&mut self, window: TimeDelta) {
        self.window = window;
    }

    /// Index range of the observations visible from `t`.
    ///
    /// # Arguments
    ///
    /// * `series` - Any time-indexed series (demand, prices)
    /// * `t` - Reference instant; the observation at `t` is included
    ///
    /// # Returns
    ///
    /// A possibly empty range into the series' observation vectors.
    pub fn look_ahead<S: TimeIndexed + ?Sized>(&self, series: &S, t: NaiveDateTime) -> Range<usize> {
        let timestamps = series.timestamps();
        let end_time = t + self.window;
        let start = timestamps.partition_point(|ts| *ts < t);
        let end = timestamps.partition_point(|ts| *ts <= end_time);
        start..end.max(start)
    }
}

/// One forecaster per setpoint slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetpointForecasters {
    pub charge: PerfectForecaster,
    pub discharge: PerfectForecaster,
    pub universal: PerfectForecaster,
}

impl SetpointForecasters {
    pub fn from_hours(charge: f64, discharge: f64, universal: f64) -> Self {
        Self {
            charge: PerfectForecaster::from_hours(charge),
            discharge: PerfectForecaster::from_hours(discharge),
            universal: PerfectForecaster::from_hours(universal),
        }
    }
}

impl Default for SetpointForecasters {
    fn default() -> Self {
        Self::from_hours(24.0, 24.0, 24.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{DemandSeries, regular_timestamps};
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date")
    }

    fn series(n: usize) -> DemandSeries {
        DemandSeries::from_energy(
            regular_timestamps(t0(), TimeDelta::hours(1), n),
            TimeDelta::hours(1),
            (0..n).map(|i| i as f64).collect(),
            1.0,
        )
        .expect("valid series")
    }

    #[test]
    fn window_is_inclusive_at_both_ends() {
        let f = PerfectForecaster::from_hours(3.0);
        let s = series(10);
        assert_eq!(f.look_ahead(&s, t0() + TimeDelta::hours(2)), 2..6);
    }

    #[test]
    fn window_truncates_at_series_end() {
        let f = PerfectForecaster::from_hours(5.0);
        let s = series(10);
        assert_eq!(f.look_ahead(&s, t0() + TimeDelta::hours(8)), 8..10);
    }

    #[test]
    fn reference_past_end_is_empty() {
        let f = PerfectForecaster::from_hours(5.0);
        let s = series(4);
        assert!(f.look_ahead(&s, t0() + TimeDelta::hours(12)).is_empty());
    }

    #[test]
    fn window_can_be_swapped() {
        let mut f = PerfectForecaster::from_hours(1.0);
        let s = series(10);
        assert_eq!(f.look_ahead(&s, t0()).len(), 2);
        f.set_window(TimeDelta::hours(4));
        assert_eq!(f.look_ahead(&s, t0()).len(), 5);
    }

    #[test]
    fn zero_window_sees_only_the_current_sample() {
        let f = PerfectForecaster::from_hours(0.0);
        assert_eq!(f.look_ahead(&series(3), t0()), 0..1);
    }
}
