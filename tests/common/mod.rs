//! Shared test fixtures for integration tests.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use flex_dispatch::equipment::Battery;
use flex_dispatch::forecast::SetpointForecasters;
use flex_dispatch::series::{DemandSeries, regular_timestamps};
use flex_dispatch::sim::controller::Controller;
use flex_dispatch::sim::dispatch_schedule::DispatchSchedule;
use flex_dispatch::sim::schedule::{EventOccurrence, EventSchedule};
use flex_dispatch::sim::setpoint::SetterSchedule;

/// Midnight, 1 January 2024 (a Monday).
pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid datetime")
}

/// Hourly series starting at [`t0`] with unit power factor.
pub fn hourly_series(energy: Vec<f64>) -> DemandSeries {
    DemandSeries::from_energy(
        regular_timestamps(t0(), TimeDelta::hours(1), energy.len()),
        TimeDelta::hours(1),
        energy,
        1.0,
    )
    .expect("valid series")
}

/// Indices of the three peak hours in [`single_peak_day`].
pub const PEAK_HOURS: [usize; 3] = [16, 17, 18];

/// 24 hourly samples at 5 with three consecutive peak hours at 20.
pub fn single_peak_day() -> DemandSeries {
    let mut energy = vec![5.0; 24];
    for i in PEAK_HOURS {
        energy[i] = 20.0;
    }
    hourly_series(energy)
}

/// Full 30 kWh battery, 10 kW each way, lossless.
pub fn full_battery() -> Battery {
    Battery::new(30.0, 10.0, 10.0, 1.0, 1.0)
}

/// Controller with a single universal recomputation at [`t0`] and a 24 h
/// forecast for every slot.
pub fn once_at_start() -> Controller {
    Controller::new(
        SetterSchedule {
            universal: EventSchedule::new().with(EventOccurrence::specific([t0()])),
            ..Default::default()
        },
        SetpointForecasters::from_hours(24.0, 24.0, 24.0),
        DispatchSchedule::unrestricted(),
    )
}

/// Controller recomputing every slot daily from [`t0`].
pub fn daily(dispatch_schedule: DispatchSchedule) -> Controller {
    let every_day = || EventSchedule::new().with(EventOccurrence::periodic(t0(), TimeDelta::hours(24)));
    Controller::new(
        SetterSchedule {
            charge: every_day(),
            discharge: every_day(),
            universal: every_day(),
            ..Default::default()
        },
        SetpointForecasters::from_hours(24.0, 24.0, 24.0),
        dispatch_schedule,
    )
}
