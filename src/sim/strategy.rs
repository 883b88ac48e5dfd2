//! Setpoint recomputation strategies.
//!
//! A [`Strategy`] decides, at each instant the setter schedule marks as due,
//! which setpoints to propose from the forecast visible at that instant. The
//! resulting proposal is committed through the strategy's
//! [`SetpointPolicy`].

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use tracing::{debug, warn};

use super::controller::Controller;
use super::dispatch_schedule::{ScheduledDispatch, SetpointSlot};
use super::optimizer::{
    SubLoadRow, SubLoadShortfall, ThresholdSearch, peak_shave_threshold, sub_load_peak_shave_limit,
    tou_charge_setpoint, tou_discharge_setpoint,
};
use super::schedule::{EventOccurrence, Period};
use super::setpoint::{SetpointPolicy, SetpointProposal};
use crate::equipment::{Equipment, HeatPump, Setting};
use crate::error::{DispatchError, Result};
use crate::forecast::PerfectForecaster;
use crate::prices::MarketPrices;
use crate::series::{Channel, DemandSeries, TimeIndexed, hours};

/// Price arbitrage in fixed-size energy tranches.
///
/// Each universal event ranks the forecast prices and schedules full-rate
/// charging in the cheapest samples and full-rate discharging in the dearest.
#[derive(Debug, Clone, PartialEq)]
pub struct WholesaleTranche {
    prices: MarketPrices,
    tranche_energy: f64,
    number_tranches: usize,
}

impl WholesaleTranche {
    /// Sizes the tranches for `equipment` at the price sample rate.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::CapacityMismatch`] when the charge and
    /// discharge capacities differ.
    pub fn new(prices: MarketPrices, equipment: &impl Equipment) -> Result<Self> {
        let charge = equipment.charge_capacity();
        let discharge = equipment.discharge_capacity();
        if charge != discharge {
            return Err(DispatchError::CapacityMismatch { charge, discharge });
        }
        let tranche_energy = charge.min(discharge) * hours(prices.sample_rate());
        let number_tranches = if tranche_energy > 0.0 {
            let n = (equipment.storage_capacity() / tranche_energy).floor() as usize;
            n - n % 2
        } else {
            0
        };
        Ok(Self {
            prices,
            tranche_energy,
            number_tranches,
        })
    }

    pub fn prices(&self) -> &MarketPrices {
        &self.prices
    }

    /// Energy moved per scheduled sample.
    pub fn tranche_energy(&self) -> f64 {
        self.tranche_energy
    }

    /// Tranches that fit in storage, always even.
    pub fn number_tranches(&self) -> usize {
        self.number_tranches
    }

    /// Charge and discharge windows for the price forecast seen from `t`.
    pub fn windows(
        &self,
        forecaster: &PerfectForecaster,
        t: NaiveDateTime,
    ) -> (Vec<Period>, Vec<Period>) {
        let range = forecaster.look_ahead(&self.prices, t);
        let pairs = (range.len() / 2).min(self.number_tranches / 2);
        let ranked = self.prices.ranked(range);
        let span = self.prices.sample_rate();
        let charge = ranked.iter().take(pairs).map(|t| window(*t, span)).collect();
        let discharge = ranked.iter().rev().take(pairs).map(|t| window(*t, span)).collect();
        (charge, discharge)
    }
}

/// Daily time-of-day band, inclusive at both ends. Wraps past midnight
/// when `from` is later than `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepaySlot {
    pub from: NaiveTime,
    pub to: NaiveTime,
}

impl RepaySlot {
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        let time = t.time();
        if self.from <= self.to {
            self.from <= time && time <= self.to
        } else {
            time >= self.from || time <= self.to
        }
    }
}

/// Market-optimised shed-and-repay scheduling for a settings adjustment.
///
/// Each universal event sheds for one resolution step at the dearest price
/// in the forecast, then repays at the cheapest price after the shed ends,
/// optionally restricted to a daily repay slot. Windows accumulate across
/// events and a repay window overrides any shed window it overlaps.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsMarketDispatch {
    prices: MarketPrices,
    resolution: TimeDelta,
    repay_ratio: f64,
    repay_slot: Option<RepaySlot>,
}

impl SettingsMarketDispatch {
    /// # Arguments
    ///
    /// * `prices` - Market prices to optimise against
    /// * `setting` - Setting being dispatched; fixes the repay duration
    /// * `resolution` - Length of one shed window
    /// * `repay_slot` - Daily band repayment must fall in, if any
    pub fn new(
        prices: MarketPrices,
        setting: &Setting,
        resolution: TimeDelta,
        repay_slot: Option<RepaySlot>,
    ) -> Self {
        Self {
            prices,
            resolution,
            repay_ratio: setting.repay_duration_ratio(),
            repay_slot,
        }
    }

    pub fn prices(&self) -> &MarketPrices {
        &self.prices
    }

    /// Repay window length relative to the shed window.
    pub fn repay_ratio(&self) -> f64 {
        self.repay_ratio
    }

    /// Length of one repay window, never shorter than a millisecond.
    pub fn repay_duration(&self) -> TimeDelta {
        let ms = (self.resolution.num_milliseconds() as f64 * self.repay_ratio).round() as i64;
        TimeDelta::milliseconds(ms.max(1))
    }

    /// Shed and repay windows for the price forecast seen from `t`.
    ///
    /// Returns `None` when the forecast is empty or leaves nowhere to repay.
    pub fn windows(&self, forecaster: &PerfectForecaster, t: NaiveDateTime) -> Option<(Period, Period)> {
        let range = forecaster.look_ahead(&self.prices, t);
        let timestamps = self.prices.timestamps();
        let prices = self.prices.prices();

        let shed = range
            .clone()
            .reduce(|best, i| if prices[i] > prices[best] { i } else { best })?;
        let shed_end = timestamps[shed] + self.resolution;
        let repay = range
            .filter(|i| timestamps[*i] >= shed_end)
            .filter(|i| self.repay_slot.is_none_or(|slot| slot.contains(timestamps[*i])))
            .reduce(|best, i| if prices[i] < prices[best] { i } else { best })?;

        Some((
            window(timestamps[shed], self.resolution),
            window(timestamps[repay], self.repay_duration()),
        ))
    }
}

/// Fuel-fired thermal supply a heat pump can stand in for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalSupply {
    pub raw_cost_of_energy: f64,
    pub efficiency: f64,
}

impl ThermalSupply {
    /// Cost per unit of delivered heat.
    pub fn dispatch_cost(&self) -> f64 {
        self.raw_cost_of_energy / self.efficiency
    }
}

/// Runs a heat pump wherever electricity undercuts the base thermal supply.
///
/// Each universal event averages the forecast prices into `resolution`
/// buckets aligned to midnight and rewrites the charge windows to every
/// bucket priced below [`HeatPumpSubstitution::price_signal`].
#[derive(Debug, Clone, PartialEq)]
pub struct HeatPumpSubstitution {
    prices: MarketPrices,
    base_supply: ThermalSupply,
    cop: f64,
    thermal_capacity: f64,
    resolution: TimeDelta,
}

impl HeatPumpSubstitution {
    pub fn new(
        prices: MarketPrices,
        base_supply: ThermalSupply,
        heat_pump: &HeatPump,
        resolution: TimeDelta,
    ) -> Self {
        Self {
            prices,
            base_supply,
            cop: heat_pump.cop,
            thermal_capacity: heat_pump.thermal_capacity,
            resolution,
        }
    }

    pub fn prices(&self) -> &MarketPrices {
        &self.prices
    }

    /// Electricity price below which the heat pump is the cheaper supply.
    pub fn price_signal(&self) -> f64 {
        self.base_supply.dispatch_cost() * self.cop
    }

    /// Mean price per resolution bucket over `range`, in time order.
    fn bucket_means(&self, range: std::ops::Range<usize>) -> Vec<(NaiveDateTime, f64)> {
        let timestamps = self.prices.timestamps();
        let prices = self.prices.prices();
        if self.prices.sample_rate() == self.resolution {
            return range.map(|i| (timestamps[i], prices[i])).collect();
        }
        let Some(first) = timestamps.get(range.start) else {
            return Vec::new();
        };
        let origin = first.date().and_time(NaiveTime::MIN);
        let step = self.resolution.num_milliseconds();

        let mut means = Vec::new();
        let mut open: Option<(NaiveDateTime, f64, usize)> = None;
        for i in range {
            let k = (timestamps[i] - origin).num_milliseconds().div_euclid(step);
            let start = origin + TimeDelta::milliseconds(k * step);
            open = match open {
                Some((s, sum, n)) if s == start => Some((s, sum + prices[i], n + 1)),
                previous => {
                    if let Some((s, sum, n)) = previous {
                        means.push((s, sum / n as f64));
                    }
                    Some((start, prices[i], 1))
                }
            };
        }
        if let Some((s, sum, n)) = open {
            means.push((s, sum / n as f64));
        }
        means
    }

    /// Charge windows for the price forecast seen from `t`.
    pub fn windows(&self, forecaster: &PerfectForecaster, t: NaiveDateTime) -> Vec<Period> {
        let signal = self.price_signal();
        self.bucket_means(forecaster.look_ahead(&self.prices, t))
            .into_iter()
            .filter(|(_, mean)| *mean < signal)
            .map(|(start, _)| window(start, self.resolution))
            .collect()
    }
}

/// Inclusive window covering `[from, from + length)` at millisecond grain.
fn window(from: NaiveDateTime, length: TimeDelta) -> Period {
    Period::DateRange {
        from,
        to: from + length - TimeDelta::milliseconds(1),
    }
}

/// Rejects prices that end before or start after the demand series.
fn check_price_coverage(prices: &MarketPrices, series: &DemandSeries) -> Result<()> {
    let timestamps = series.timestamps();
    for t in [timestamps.first(), timestamps.last()].into_iter().flatten() {
        if !prices.covers(*t) {
            return Err(DispatchError::PricesDoNotCover(*t));
        }
    }
    Ok(())
}

/// Closed set of setpoint recomputation policies.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Universal threshold that spends the available energy on the forecast peak.
    PeakShave { search: ThresholdSearch },
    /// Peak shaving that never targets below the flexed peak already reached.
    ConservativePeakShave { search: ThresholdSearch },
    /// Separate charge and discharge thresholds shifting energy off-peak.
    TouShift { search: ThresholdSearch },
    /// TOU shifting whose charge threshold is capped at the flexed peak.
    TouPeakShaveCombo { search: ThresholdSearch },
    /// Peak shaving where only the sub-load can be flexed.
    SubLoadPeakShave { shortfall: SubLoadShortfall },
    WholesaleTranche(WholesaleTranche),
    /// Shed at price peaks and repay at price troughs through a setting change.
    SettingsMarket(SettingsMarketDispatch),
    HeatPumpSubstitution(HeatPumpSubstitution),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::PeakShave { .. } => "peak_shave",
            Strategy::ConservativePeakShave { .. } => "conservative_peak_shave",
            Strategy::TouShift { .. } => "tou_shift",
            Strategy::TouPeakShaveCombo { .. } => "tou_peak_shave_combo",
            Strategy::SubLoadPeakShave { .. } => "sub_load_peak_shave",
            Strategy::WholesaleTranche(_) => "wholesale_tranche",
            Strategy::SettingsMarket(_) => "settings_market",
            Strategy::HeatPumpSubstitution(_) => "heat_pump_substitution",
        }
    }

    /// Commit policy used for this strategy's proposals.
    pub fn policy(&self) -> SetpointPolicy {
        match self {
            Strategy::ConservativePeakShave { .. } => SetpointPolicy::CONSERVATIVE_PEAK_SHAVE,
            Strategy::TouPeakShaveCombo { .. } => SetpointPolicy::TOU_PEAK_SHAVE_COMBO,
            _ => SetpointPolicy::GENERIC,
        }
    }

    /// Whether consolidation also reduces the sub-load channel.
    pub fn reduces_sub_load(&self) -> bool {
        matches!(self, Strategy::SubLoadPeakShave { .. })
    }

    /// Validates the setup and registers the first-timestamp events.
    ///
    /// Called once before the first step. Discharge-floor settings already on
    /// the controller's policy are kept.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::MissingSetpointEvents`] - plain peak shaving with
    ///   no universal recomputation events configured
    /// * [`DispatchError::PricesDoNotCover`] - market prices end before
    ///   or start after the demand series
    /// * [`DispatchError::SampleRateMismatch`] - wholesale tranche prices
    ///   sampled at a different rate from demand
    pub fn prepare(&self, controller: &mut Controller, series: &DemandSeries) -> Result<()> {
        let floor_discharge_by_min = controller.policy.floor_discharge_by_min;
        controller.policy = SetpointPolicy {
            floor_discharge_by_min,
            ..self.policy()
        };
        let start = series.start();
        let schedule = &mut controller.setter_schedule;
        match self {
            Strategy::PeakShave { .. } => {
                if schedule.universal.is_empty() {
                    return Err(DispatchError::MissingSetpointEvents(SetpointSlot::Universal));
                }
                schedule.universal.add(EventOccurrence::specific([start]));
            }
            Strategy::ConservativePeakShave { .. } | Strategy::SubLoadPeakShave { .. } => {
                schedule.universal.add(EventOccurrence::specific([start]));
            }
            Strategy::TouShift { .. } | Strategy::TouPeakShaveCombo { .. } => {
                schedule.charge.add(EventOccurrence::specific([start]));
                schedule.discharge.add(EventOccurrence::specific([start]));
            }
            Strategy::WholesaleTranche(tranche) => {
                if tranche.prices.sample_rate() != series.sample_rate() {
                    return Err(DispatchError::SampleRateMismatch {
                        prices: tranche.prices.sample_rate(),
                        demand: series.sample_rate(),
                    });
                }
                check_price_coverage(&tranche.prices, series)?;
                controller.scheduled_only = true;
                controller.scheduled_dispatch.charge_energy = tranche.tranche_energy;
                controller.scheduled_dispatch.discharge_energy = tranche.tranche_energy;
                schedule.universal.add(EventOccurrence::specific([start]));
            }
            Strategy::SettingsMarket(settings) => {
                check_price_coverage(&settings.prices, series)?;
                controller.scheduled_only = true;
                controller.scheduled_dispatch =
                    ScheduledDispatch::new(f64::INFINITY, f64::INFINITY).with_charge_priority();
                schedule.universal.add(EventOccurrence::specific([start]));
            }
            Strategy::HeatPumpSubstitution(substitution) => {
                check_price_coverage(&substitution.prices, series)?;
                controller.scheduled_only = true;
                controller.scheduled_dispatch =
                    ScheduledDispatch::new(substitution.thermal_capacity * series.sample_hours(), 0.0);
                schedule.universal.add(EventOccurrence::specific([start]));
            }
        }
        Ok(())
    }

    /// Recomputes whatever the setter schedule marks due at `t`.
    ///
    /// Queries the setter schedule exactly once, so periodic cursors advance
    /// once per step.
    pub fn recompute(
        &self,
        t: NaiveDateTime,
        controller: &mut Controller,
        series: &DemandSeries,
        dispatch_on: Channel,
        equipment: &impl Equipment,
    ) {
        let due = controller.setter_schedule.due(t);
        if !due.any() {
            return;
        }
        let forecasters = controller.forecasters;
        let demand = series.values(dispatch_on);
        let mut proposal = SetpointProposal::default();

        match self {
            Strategy::PeakShave { search } | Strategy::ConservativePeakShave { search } => {
                if due.universal {
                    let window = forecast(&forecasters.universal, series, demand, t);
                    proposal.universal =
                        peak_shave_threshold(window, equipment.available_energy(), *search);
                }
            }
            Strategy::TouShift { search } | Strategy::TouPeakShaveCombo { search } => {
                if due.charge {
                    let window = forecast(&forecasters.charge, series, demand, t);
                    proposal.charge =
                        tou_charge_setpoint(window, equipment.available_storage(), *search);
                }
                if due.discharge {
                    let window = forecast(&forecasters.discharge, series, demand, t);
                    proposal.discharge =
                        tou_discharge_setpoint(window, equipment.available_energy(), *search);
                }
            }
            Strategy::SubLoadPeakShave { shortfall } => {
                if due.universal {
                    let range = forecasters.universal.look_ahead(series, t);
                    let sub_load = series.values(Channel::SubloadEnergy);
                    let rows: Vec<SubLoadRow> = range
                        .map(|i| SubLoadRow {
                            gross: demand[i],
                            sub_load: sub_load[i],
                        })
                        .collect();
                    proposal.universal =
                        sub_load_peak_shave_limit(&rows, equipment.available_energy(), *shortfall);
                }
            }
            Strategy::WholesaleTranche(tranche) => {
                if due.universal {
                    let (charge, discharge) = tranche.windows(&forecasters.universal, t);
                    debug!(
                        %t,
                        charge_windows = charge.len(),
                        discharge_windows = discharge.len(),
                        "wholesale windows rewritten"
                    );
                    controller.scheduled_dispatch.replace_windows(charge, discharge);
                }
                return;
            }
            Strategy::SettingsMarket(settings) => {
                if due.universal {
                    match settings.windows(&forecasters.universal, t) {
                        Some((shed, repay)) => {
                            debug!(%t, ?shed, ?repay, "settings windows added");
                            controller.scheduled_dispatch.append_windows([repay], [shed]);
                        }
                        None => debug!(%t, "no repay opportunity in forecast"),
                    }
                }
                return;
            }
            Strategy::HeatPumpSubstitution(substitution) => {
                if due.universal {
                    let charge = substitution.windows(&forecasters.universal, t);
                    debug!(
                        %t,
                        price_signal = substitution.price_signal(),
                        charge_windows = charge.len(),
                        "heat pump windows rewritten"
                    );
                    controller.scheduled_dispatch.replace_windows(charge, []);
                }
                return;
            }
        }

        if proposal.is_empty() {
            return;
        }
        controller.commit(&proposal, t);
        debug!(
            %t,
            strategy = self.name(),
            charge = controller.setpoints.charge(),
            discharge = controller.setpoints.discharge(),
            universal = controller.setpoints.universal(),
            "setpoints recomputed"
        );
    }
}

/// Forecast slice of `values` seen from `t`.
fn forecast<'s>(
    forecaster: &PerfectForecaster,
    series: &DemandSeries,
    values: &'s [f64],
    t: NaiveDateTime,
) -> &'s [f64] {
    let range = forecaster.look_ahead(series, t);
    let expected =
        forecaster.window().num_milliseconds() / series.sample_rate().num_milliseconds() + 1;
    if (range.len() as i64) < expected {
        warn!(%t, visible = range.len(), expected, "forecast window truncated");
    }
    &values[range]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equipment::Battery;
    use crate::forecast::SetpointForecasters;
    use crate::series::regular_timestamps;
    use crate::sim::dispatch_schedule::DispatchSchedule;
    use crate::sim::schedule::EventSchedule;
    use crate::sim::setpoint::SetterSchedule;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid datetime")
    }

    fn series(energy: &[f64]) -> DemandSeries {
        DemandSeries::from_energy(
            regular_timestamps(t0(), TimeDelta::hours(1), energy.len()),
            TimeDelta::hours(1),
            energy.to_vec(),
            1.0,
        )
        .expect("valid series")
    }

    fn controller(universal: EventSchedule) -> Controller {
        Controller::new(
            SetterSchedule {
                universal,
                ..Default::default()
            },
            SetpointForecasters::from_hours(4.0, 4.0, 4.0),
            DispatchSchedule::unrestricted(),
        )
    }

    fn full_battery(capacity: f64) -> Battery {
        Battery::new(capacity, 10.0, 10.0, 1.0, 1.0)
    }

    #[test]
    fn peak_shave_requires_universal_events() {
        let s = series(&[5.0, 10.0]);
        let mut c = controller(EventSchedule::new());
        let err = Strategy::PeakShave {
            search: ThresholdSearch::Step,
        }
        .prepare(&mut c, &s);
        assert_eq!(
            err,
            Err(DispatchError::MissingSetpointEvents(SetpointSlot::Universal))
        );
    }

    #[test]
    fn conservative_adds_first_event_without_configured_events() {
        let s = series(&[10.0, 8.0, 6.0, 4.0, 2.0]);
        let mut c = controller(EventSchedule::new());
        let strategy = Strategy::ConservativePeakShave {
            search: ThresholdSearch::Step,
        };
        strategy.prepare(&mut c, &s).expect("prepared");
        assert_eq!(c.policy, SetpointPolicy::CONSERVATIVE_PEAK_SHAVE);
        strategy.recompute(t0(), &mut c, &s, Channel::DemandEnergy, &full_battery(6.0));
        assert_eq!(c.setpoints.universal(), 6.0);
    }

    #[test]
    fn peak_shave_skips_instants_that_are_not_due() {
        let s = series(&[10.0, 8.0, 6.0, 4.0, 2.0]);
        let mut c = controller(EventSchedule::new().with(EventOccurrence::specific([t0()])));
        let strategy = Strategy::PeakShave {
            search: ThresholdSearch::Step,
        };
        strategy.prepare(&mut c, &s).expect("prepared");
        strategy.recompute(
            t0() + TimeDelta::hours(1),
            &mut c,
            &s,
            Channel::DemandEnergy,
            &full_battery(6.0),
        );
        assert_eq!(c.setpoints.universal(), 0.0);
    }

    #[test]
    fn tou_sets_charge_and_discharge() {
        let s = series(&[2.0, 2.0, 10.0, 10.0, 2.0]);
        let mut c = controller(EventSchedule::new());
        let strategy = Strategy::TouShift {
            search: ThresholdSearch::Interpolated,
        };
        strategy.prepare(&mut c, &s).expect("prepared");
        let battery = Battery::new(8.0, 10.0, 10.0, 1.0, 0.5);
        strategy.recompute(t0(), &mut c, &s, Channel::DemandEnergy, &battery);
        assert!(c.setpoints.discharge() < 10.0);
        assert!(c.setpoints.charge() > 2.0);
        assert_eq!(c.setpoints.universal(), 0.0);
    }

    #[test]
    fn sub_load_limit_uses_sub_load_channel() {
        let s = series(&[10.0, 8.0, 6.0, 4.0, 2.0])
            .with_sub_load(vec![4.0, 4.0, 0.0, 0.0, 0.0])
            .expect("sub-load fits");
        let mut c = controller(EventSchedule::new());
        let strategy = Strategy::SubLoadPeakShave {
            shortfall: SubLoadShortfall::Zero,
        };
        assert!(strategy.reduces_sub_load());
        strategy.prepare(&mut c, &s).expect("prepared");
        strategy.recompute(t0(), &mut c, &s, Channel::DemandEnergy, &full_battery(2.0));
        assert!(c.setpoints.universal() >= 8.0);
    }

    fn prices(values: &[f64]) -> MarketPrices {
        MarketPrices::new(
            regular_timestamps(t0(), TimeDelta::hours(1), values.len()),
            TimeDelta::hours(1),
            values.to_vec(),
        )
        .expect("valid prices")
    }

    #[test]
    fn wholesale_rejects_unequal_capacities() {
        let battery = Battery::new(20.0, 5.0, 10.0, 1.0, 0.5);
        let err = WholesaleTranche::new(prices(&[1.0, 2.0]), &battery);
        assert_eq!(
            err,
            Err(DispatchError::CapacityMismatch {
                charge: 5.0,
                discharge: 10.0
            })
        );
    }

    #[test]
    fn wholesale_tranche_count_is_even() {
        let battery = Battery::new(35.0, 10.0, 10.0, 1.0, 0.5);
        let tranche = WholesaleTranche::new(prices(&[1.0, 2.0]), &battery).expect("sized");
        assert_eq!(tranche.tranche_energy(), 10.0);
        assert_eq!(tranche.number_tranches(), 2);
    }

    #[test]
    fn wholesale_windows_pick_cheapest_and_dearest() {
        let battery = Battery::new(40.0, 10.0, 10.0, 1.0, 0.5);
        let tranche = WholesaleTranche::new(prices(&[50.0, 10.0, 90.0, 30.0, 70.0]), &battery)
            .expect("sized");
        let (charge, discharge) = tranche.windows(&PerfectForecaster::from_hours(4.0), t0());
        let at = |h: i64| t0() + TimeDelta::hours(h);
        assert_eq!(charge.len(), 2);
        assert!(charge[0].is_active(at(1)) && charge[1].is_active(at(3)));
        assert!(discharge[0].is_active(at(2)) && discharge[1].is_active(at(4)));
        assert!(!charge[0].is_active(at(2)));
    }

    #[test]
    fn wholesale_prepare_checks_price_coverage() {
        let s = series(&[5.0; 6]);
        let battery = Battery::new(40.0, 10.0, 10.0, 1.0, 0.5);
        let strategy = Strategy::WholesaleTranche(
            WholesaleTranche::new(prices(&[1.0, 2.0, 3.0]), &battery).expect("sized"),
        );
        let mut c = controller(EventSchedule::new());
        assert_eq!(
            strategy.prepare(&mut c, &s),
            Err(DispatchError::PricesDoNotCover(t0() + TimeDelta::hours(5)))
        );
    }

    #[test]
    fn wholesale_prepare_switches_controller_to_scheduled_only() {
        let s = series(&[5.0; 3]);
        let battery = Battery::new(40.0, 10.0, 10.0, 1.0, 0.5);
        let strategy = Strategy::WholesaleTranche(
            WholesaleTranche::new(prices(&[1.0, 2.0, 3.0]), &battery).expect("sized"),
        );
        let mut c = controller(EventSchedule::new());
        assert_eq!(strategy.prepare(&mut c, &s), Ok(()));
        assert!(c.scheduled_only);
        assert_eq!(c.scheduled_dispatch.charge_energy, 10.0);
        assert!(c.proposal(t0(), 5.0).is_idle());
    }

    #[test]
    fn wholesale_prepare_rejects_mismatched_sample_rates() {
        let s = DemandSeries::from_energy(
            regular_timestamps(t0(), TimeDelta::minutes(30), 6),
            TimeDelta::minutes(30),
            vec![5.0; 6],
            1.0,
        )
        .expect("valid series");
        let battery = Battery::new(40.0, 10.0, 10.0, 1.0, 0.5);
        let strategy = Strategy::WholesaleTranche(
            WholesaleTranche::new(prices(&[1.0, 2.0, 3.0]), &battery).expect("sized"),
        );
        let mut c = controller(EventSchedule::new());
        assert_eq!(
            strategy.prepare(&mut c, &s),
            Err(DispatchError::SampleRateMismatch {
                prices: TimeDelta::hours(1),
                demand: TimeDelta::minutes(30),
            })
        );
    }

    #[test]
    fn forecast_handles_sub_second_rates() {
        let rate = TimeDelta::milliseconds(500);
        let s = DemandSeries::from_energy(
            regular_timestamps(t0(), rate, 8),
            rate,
            vec![1.0; 8],
            1.0,
        )
        .expect("valid series");
        let forecaster = PerfectForecaster::new(TimeDelta::seconds(2));
        let window = forecast(&forecaster, &s, s.values(Channel::DemandEnergy), t0());
        assert_eq!(window.len(), 5);
    }

    #[test]
    fn wholesale_windows_cover_sub_second_samples() {
        let rate = TimeDelta::milliseconds(500);
        let p = MarketPrices::new(regular_timestamps(t0(), rate, 4), rate, vec![3.0, 1.0, 4.0, 2.0])
            .expect("valid prices");
        let battery = Battery::new(10.0, 3600.0, 3600.0, 1.0, 0.5);
        let tranche = WholesaleTranche::new(p, &battery).expect("sized");
        let (charge, discharge) =
            tranche.windows(&PerfectForecaster::new(TimeDelta::seconds(2)), t0());
        let at = |ms: i64| t0() + TimeDelta::milliseconds(ms);
        assert!(charge[0].is_active(at(500)) && charge[0].is_active(at(999)));
        assert!(!charge[0].is_active(at(1000)));
        assert!(discharge[0].is_active(at(1000)) && !discharge[0].is_active(at(1500)));
    }

    fn compressor() -> Setting {
        Setting::CompressorSuctionPressure {
            baseline_cop: 3.0,
            low_pressure_cop: 2.5,
            high_pressure_cop: 4.0,
        }
    }

    fn time(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).expect("valid time")
    }

    #[test]
    fn repay_slot_wraps_midnight() {
        let slot = RepaySlot {
            from: time(22),
            to: time(4),
        };
        let at = |h: i64| t0() + TimeDelta::hours(h);
        assert!(slot.contains(at(23)) && slot.contains(at(2)) && slot.contains(at(4)));
        assert!(!slot.contains(at(12)));
    }

    #[test]
    fn settings_shed_at_peak_and_repay_at_later_trough() {
        let dispatch = SettingsMarketDispatch::new(
            prices(&[1.0, 5.0, 9.0, 4.0, 2.0, 3.0]),
            &compressor(),
            TimeDelta::hours(1),
            None,
        );
        let (shed, repay) = dispatch
            .windows(&PerfectForecaster::from_hours(5.0), t0())
            .expect("repay found");
        let at = |h: i64| t0() + TimeDelta::hours(h);
        assert!(shed.is_active(at(2)) && !shed.is_active(at(3)));
        // cheapest after the shed is hour 4; the ratio doubles its length
        assert!(repay.is_active(at(4)) && repay.is_active(at(5)));
        assert!(!repay.is_active(at(6)) && !repay.is_active(at(0)));
    }

    #[test]
    fn settings_repay_honours_slot() {
        let dispatch = SettingsMarketDispatch::new(
            prices(&[1.0, 9.0, 2.0, 3.0, 5.0]),
            &Setting::FanThrottle { throttle_rate: 0.2 },
            TimeDelta::hours(1),
            Some(RepaySlot {
                from: time(4),
                to: time(6),
            }),
        );
        let (_, repay) = dispatch
            .windows(&PerfectForecaster::from_hours(4.0), t0())
            .expect("repay found");
        assert!(repay.is_active(t0() + TimeDelta::hours(4)));
        assert!(!repay.is_active(t0() + TimeDelta::hours(2)));
    }

    #[test]
    fn settings_skip_when_peak_is_last() {
        let dispatch = SettingsMarketDispatch::new(
            prices(&[1.0, 2.0, 9.0]),
            &compressor(),
            TimeDelta::hours(1),
            None,
        );
        assert_eq!(dispatch.windows(&PerfectForecaster::from_hours(2.0), t0()), None);
    }

    #[test]
    fn settings_prepare_gives_repay_priority() {
        let s = series(&[5.0; 3]);
        let strategy = Strategy::SettingsMarket(SettingsMarketDispatch::new(
            prices(&[1.0, 2.0, 3.0]),
            &compressor(),
            TimeDelta::hours(1),
            None,
        ));
        let mut c = controller(EventSchedule::new());
        strategy.prepare(&mut c, &s).expect("prepared");
        assert!(c.scheduled_only);
        assert!(c.scheduled_dispatch.charge_overrides_discharge);
        assert!(c.scheduled_dispatch.discharge_energy.is_infinite());
    }

    fn substitution(values: &[f64], resolution: TimeDelta) -> HeatPumpSubstitution {
        let p = MarketPrices::new(
            regular_timestamps(t0(), TimeDelta::minutes(30), values.len()),
            TimeDelta::minutes(30),
            values.to_vec(),
        )
        .expect("valid prices");
        HeatPumpSubstitution::new(
            p,
            ThermalSupply {
                raw_cost_of_energy: 40.0,
                efficiency: 0.8,
            },
            &HeatPump::new(10.0, 3.0),
            resolution,
        )
    }

    #[test]
    fn heat_pump_signal_scales_supply_cost_by_cop() {
        let hp = substitution(&[0.0], TimeDelta::minutes(30));
        assert_eq!(hp.price_signal(), 150.0);
    }

    #[test]
    fn heat_pump_windows_use_bucket_means() {
        // hourly means: 140, 160, 100
        let hp = substitution(&[100.0, 180.0, 150.0, 170.0, 90.0, 110.0], TimeDelta::hours(1));
        let windows = hp.windows(&PerfectForecaster::from_hours(3.0), t0());
        let at = |m: i64| t0() + TimeDelta::minutes(m);
        assert_eq!(windows.len(), 2);
        assert!(windows[0].is_active(at(0)) && windows[0].is_active(at(59)));
        assert!(!windows[0].is_active(at(60)));
        assert!(windows[1].is_active(at(120)) && windows[1].is_active(at(150)));
    }

    #[test]
    fn heat_pump_windows_keep_native_resolution() {
        let hp = substitution(&[100.0, 180.0, 120.0], TimeDelta::minutes(30));
        let windows = hp.windows(&PerfectForecaster::from_hours(1.0), t0());
        assert_eq!(windows.len(), 2);
        assert!(!windows.iter().any(|w| w.is_active(t0() + TimeDelta::minutes(30))));
    }
}
