//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::Deserialize;

use crate::equipment::{
    Battery, HeatPump, PcmExchanger, RateModel, Setting, SettingsAdjustment, StorageUnit,
    ThermalStorage,
};
use crate::error::{ConfigError, DispatchError, SeriesError};
use crate::forecast::SetpointForecasters;
use crate::series::{Channel, DemandSeries, TimeIndexed};
use crate::sim::constraints::{ConstraintPipeline, DispatchConstraint, EconomicThrottle};
use crate::sim::controller::Controller;
use crate::sim::dispatch_schedule::DispatchSchedule;
use crate::sim::engine::Engine;
use crate::sim::optimizer::{SubLoadShortfall, ThresholdSearch};
use crate::sim::schedule::{
    DailyHours, DaySet, EventOccurrence, EventSchedule, HourSet, Period, PeriodSchedule,
};
use crate::sim::setpoint::{SetpointCap, SetpointCaps, SetterSchedule};
use crate::sim::strategy::{
    HeatPumpSubstitution, RepaySlot, SettingsMarketDispatch, Strategy, ThermalSupply,
    WholesaleTranche,
};
use crate::synthetic::DailyProfile;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Run timing and the dispatch channel.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Synthetic demand profile used when no meter data is supplied.
    #[serde(default)]
    pub demand: DemandConfig,
    /// Synthetic wholesale price profile.
    #[serde(default)]
    pub prices: PriceConfig,
    #[serde(default)]
    pub equipment: EquipmentConfig,
    /// Forecast window per setpoint slot.
    #[serde(default)]
    pub forecast: ForecastConfig,
    /// Setpoint recomputation events.
    #[serde(default)]
    pub events: EventsConfig,
    /// Permitted charge/discharge windows.
    #[serde(default)]
    pub windows: WindowsConfig,
    #[serde(default)]
    pub constraints: ConstraintsConfig,
    /// Hour-of-day setpoint caps.
    #[serde(default)]
    pub caps: CapsConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

/// Run timing and the dispatch channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// First timestamp of a synthetic series.
    pub start: NaiveDateTime,
    /// Sample interval in minutes (must be > 0).
    pub sample_minutes: i64,
    /// Number of days to simulate (must be > 0).
    pub days: usize,
    /// Master random seed.
    pub seed: u64,
    /// Demand channel driving dispatch decisions.
    pub dispatch_on: Channel,
}

impl SimulationConfig {
    pub fn sample_rate(&self) -> TimeDelta {
        TimeDelta::minutes(self.sample_minutes)
    }

    /// Number of samples covering `days`.
    pub fn total_steps(&self) -> usize {
        if self.sample_minutes <= 0 {
            return 0;
        }
        self.days * (24 * 60 / self.sample_minutes as usize)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            sample_minutes: 60,
            days: 7,
            seed: 42,
            dispatch_on: Channel::DemandEnergy,
        }
    }
}

/// Synthetic demand profile parameters (power units).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemandConfig {
    pub base: f64,
    pub amplitude: f64,
    /// Hour of day at which demand peaks.
    pub peak_hour: f64,
    /// Gaussian noise standard deviation.
    pub noise_std: f64,
    /// Constant power factor in (0, 1].
    pub power_factor: f64,
    /// Share of demand that is flexible sub-load, in [0, 1].
    pub sub_load_fraction: f64,
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            base: 40.0,
            amplitude: 20.0,
            peak_hour: 18.0,
            noise_std: 2.0,
            power_factor: 0.95,
            sub_load_fraction: 0.0,
        }
    }
}

impl DemandConfig {
    pub fn profile(&self) -> DailyProfile {
        DailyProfile::new(self.base, self.amplitude, self.peak_hour, self.noise_std)
    }
}

/// Synthetic wholesale price profile (currency per energy unit).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PriceConfig {
    pub base: f64,
    pub amplitude: f64,
    pub peak_hour: f64,
    pub noise_std: f64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base: 80.0,
            amplitude: 40.0,
            peak_hour: 19.0,
            noise_std: 5.0,
        }
    }
}

impl PriceConfig {
    pub fn profile(&self) -> DailyProfile {
        DailyProfile::new(self.base, self.amplitude, self.peak_hour, self.noise_std)
    }
}

/// Equipment variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentKind {
    #[default]
    Battery,
    Thermal,
    /// One-way heat pump; `charge_capacity` is its thermal output rate and
    /// `charging_cop` its COP.
    HeatPump,
    /// Operating-setting adjustment described by `setting`.
    Setting,
}

impl EquipmentKind {
    /// Whether the kind keeps a state of charge.
    pub fn stores_energy(self) -> bool {
        matches!(self, EquipmentKind::Battery | EquipmentKind::Thermal)
    }
}

/// Storage equipment parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EquipmentConfig {
    pub kind: EquipmentKind,
    /// Usable energy capacity.
    pub storage_capacity: f64,
    /// Maximum charge power.
    pub charge_capacity: f64,
    /// Maximum discharge power; replaced by the PCM model when `pcm` is set.
    pub discharge_capacity: f64,
    /// Round-trip efficiency in (0, 1].
    pub round_trip_efficiency: f64,
    /// Initial state of charge in [0, 1].
    pub initial_soc: f64,
    /// Charging coefficient of performance (thermal and heat pump).
    pub charging_cop: f64,
    /// COP of the load a thermal discharge displaces; defaults to
    /// `charging_cop`.
    pub load_cop: Option<f64>,
    /// Phase-change-material discharge model (thermal only).
    pub pcm: Option<PcmConfig>,
    /// Setting adjusted by `setting` equipment.
    pub setting: Option<Setting>,
}

impl Default for EquipmentConfig {
    fn default() -> Self {
        Self {
            kind: EquipmentKind::Battery,
            storage_capacity: 100.0,
            charge_capacity: 25.0,
            discharge_capacity: 25.0,
            round_trip_efficiency: 0.9,
            initial_soc: 0.5,
            charging_cop: 3.0,
            load_cop: None,
            pcm: None,
            setting: None,
        }
    }
}

/// Phase-change-material heat exchanger parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PcmConfig {
    pub inlet_temperature: f64,
    pub outlet_temperature: f64,
    pub melt_temperature: f64,
    pub density: f64,
    pub specific_heat: f64,
    pub design_flow_rate: f64,
}

impl From<PcmConfig> for PcmExchanger {
    fn from(c: PcmConfig) -> Self {
        PcmExchanger {
            inlet_temperature: c.inlet_temperature,
            outlet_temperature: c.outlet_temperature,
            melt_temperature: c.melt_temperature,
            density: c.density,
            specific_heat: c.specific_heat,
            design_flow_rate: c.design_flow_rate,
        }
    }
}

impl EquipmentConfig {
    /// Builds the configured equipment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `setting` equipment has no setting.
    ///
    /// # Panics
    ///
    /// Panics on out-of-range parameters; call
    /// [`ScenarioConfig::validate`] first.
    pub fn build(&self) -> Result<StorageUnit, ConfigError> {
        let unit = match self.kind {
            EquipmentKind::Battery => Battery::new(
                self.storage_capacity,
                self.charge_capacity,
                self.discharge_capacity,
                self.round_trip_efficiency,
                self.initial_soc,
            )
            .into(),
            EquipmentKind::Thermal => {
                let discharge_model = match self.pcm {
                    Some(pcm) => RateModel::Pcm(pcm.into()),
                    None => RateModel::Nominal(self.discharge_capacity),
                };
                ThermalStorage::new(
                    self.storage_capacity,
                    RateModel::Nominal(self.charge_capacity),
                    discharge_model,
                    self.round_trip_efficiency,
                    self.initial_soc,
                    self.charging_cop,
                )
                .with_load_cop(self.load_cop.unwrap_or(self.charging_cop))
                .into()
            }
            EquipmentKind::HeatPump => HeatPump::new(self.charge_capacity, self.charging_cop).into(),
            EquipmentKind::Setting => {
                let setting = self.setting.ok_or_else(|| {
                    ConfigError::new("equipment.setting", "required for setting equipment")
                })?;
                SettingsAdjustment::new(setting).into()
            }
        };
        Ok(unit)
    }
}

/// Forecast window per setpoint slot, in hours.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    pub charge_hours: f64,
    pub discharge_hours: f64,
    pub universal_hours: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            charge_hours: 24.0,
            discharge_hours: 24.0,
            universal_hours: 24.0,
        }
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateWindow {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl DateWindow {
    pub fn period(&self) -> Period {
        Period::DateRange {
            from: self.from,
            to: self.to,
        }
    }
}

/// Setpoint recomputation events.
///
/// Periodic events are anchored at the first timestamp of the series.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
    pub universal_every_hours: Option<f64>,
    pub charge_every_hours: Option<f64>,
    pub discharge_every_hours: Option<f64>,
    /// Explicit universal recomputation instants.
    pub universal_at: Vec<NaiveDateTime>,
    /// Hours of the day (every day) at which the universal setpoint is recomputed.
    pub universal_top_of_hour: Vec<u32>,
    /// Periods during which no setpoint is recomputed.
    pub pauses: Vec<DateWindow>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            universal_every_hours: Some(24.0),
            charge_every_hours: None,
            discharge_every_hours: None,
            universal_at: Vec::new(),
            universal_top_of_hour: Vec::new(),
            pauses: Vec::new(),
        }
    }
}

/// Longest accepted event period or forecast window, in hours (100 years).
const MAX_HOURS: f64 = 100.0 * 365.25 * 24.0;

/// Whole milliseconds in `hours`, if that is a usable positive duration.
fn hours_to_millis(hours: f64) -> Option<i64> {
    if !(hours > 0.0 && hours <= MAX_HOURS) {
        return None;
    }
    let ms = (hours * 3_600_000.0).round() as i64;
    (ms >= 1).then_some(ms)
}

impl EventsConfig {
    fn periodic(start: NaiveDateTime, every_hours: Option<f64>) -> EventSchedule {
        let mut schedule = EventSchedule::new();
        if let Some(ms) = every_hours.and_then(hours_to_millis) {
            schedule.add(EventOccurrence::periodic(start, TimeDelta::milliseconds(ms)));
        }
        schedule
    }

    /// Builds the setter schedule for a series starting at `start`.
    pub fn setter_schedule(&self, start: NaiveDateTime) -> SetterSchedule {
        let mut universal = Self::periodic(start, self.universal_every_hours);
        if !self.universal_at.is_empty() {
            universal.add(EventOccurrence::specific(self.universal_at.iter().copied()));
        }
        if !self.universal_top_of_hour.is_empty() {
            universal.add(EventOccurrence::TopOfHour(DailyHours::new(
                DaySet::ALL,
                HourSet::from_hours(self.universal_top_of_hour.iter().copied()),
            )));
        }
        let mut pauses = PeriodSchedule::new();
        for pause in &self.pauses {
            pauses.add_period(pause.period());
        }
        SetterSchedule {
            charge: Self::periodic(start, self.charge_every_hours),
            discharge: Self::periodic(start, self.discharge_every_hours),
            universal,
            pauses,
        }
    }

    fn has_universal(&self) -> bool {
        self.universal_every_hours.is_some()
            || !self.universal_at.is_empty()
            || !self.universal_top_of_hour.is_empty()
    }
}

/// Day groups for recurring windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaySelection {
    #[default]
    All,
    Weekdays,
    Weekends,
}

impl DaySelection {
    pub fn days(self) -> DaySet {
        match self {
            DaySelection::All => DaySet::ALL,
            DaySelection::Weekdays => DaySet::WEEKDAYS,
            DaySelection::Weekends => DaySet::WEEKENDS,
        }
    }
}

/// Recurring `[start, end)` hour window; wraps past midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HourWindow {
    pub start: u32,
    pub end: u32,
    #[serde(default)]
    pub days: DaySelection,
}

impl HourWindow {
    pub fn period(&self) -> Period {
        Period::Daily(DailyHours::new(
            self.days.days(),
            HourSet::range(self.start, self.end),
        ))
    }
}

/// Permitted charge/discharge windows. An empty list permits all times.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowsConfig {
    pub charge: Vec<HourWindow>,
    pub discharge: Vec<HourWindow>,
    pub allow_non_scheduled_dispatch: bool,
}

impl WindowsConfig {
    fn schedule(windows: &[HourWindow]) -> PeriodSchedule {
        if windows.is_empty() {
            return PeriodSchedule::always();
        }
        let mut schedule = PeriodSchedule::new();
        schedule.add_periods(windows.iter().map(HourWindow::period));
        schedule
    }

    pub fn dispatch_schedule(&self) -> DispatchSchedule {
        let mut schedule =
            DispatchSchedule::new(Self::schedule(&self.charge), Self::schedule(&self.discharge));
        schedule.allow_non_scheduled_dispatch = self.allow_non_scheduled_dispatch;
        schedule
    }
}

/// Constraint pipeline, applied in field order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConstraintsConfig {
    pub no_charge_hours: Vec<u32>,
    pub no_discharge_hours: Vec<u32>,
    pub no_charge_periods: Vec<DateWindow>,
    pub no_discharge_periods: Vec<DateWindow>,
    /// Per-interval charge energy limit.
    pub charge_limit: Option<f64>,
    /// Per-interval discharge energy limit.
    pub discharge_limit: Option<f64>,
    /// Enables the economic throttle when set.
    pub demand_charge_rate: Option<f64>,
    /// TOU saving per shifted energy unit.
    pub tou_spread: f64,
}

impl ConstraintsConfig {
    pub fn pipeline(&self) -> ConstraintPipeline {
        let mut pipeline = ConstraintPipeline::default();
        if !self.no_charge_hours.is_empty() || !self.no_discharge_hours.is_empty() {
            pipeline.push(DispatchConstraint::HourInhibit {
                no_charge: HourSet::from_hours(self.no_charge_hours.iter().copied()),
                no_discharge: HourSet::from_hours(self.no_discharge_hours.iter().copied()),
            });
        }
        if !self.no_charge_periods.is_empty() || !self.no_discharge_periods.is_empty() {
            let periods = |windows: &[DateWindow]| {
                let mut schedule = PeriodSchedule::new();
                schedule.add_periods(windows.iter().map(DateWindow::period));
                schedule
            };
            pipeline.push(DispatchConstraint::PeriodInhibit {
                no_charge: periods(&self.no_charge_periods),
                no_discharge: periods(&self.no_discharge_periods),
            });
        }
        if self.charge_limit.is_some() || self.discharge_limit.is_some() {
            pipeline.push(DispatchConstraint::AbsoluteLimit {
                charge: self.charge_limit.unwrap_or(f64::INFINITY),
                discharge: self.discharge_limit.unwrap_or(f64::INFINITY),
            });
        }
        if let Some(rate) = self.demand_charge_rate {
            pipeline.push(DispatchConstraint::EconomicThrottle(EconomicThrottle {
                demand_charge_rate: rate,
                tou_spread: self.tou_spread,
            }));
        }
        pipeline
    }
}

/// Cap on one setpoint slot during listed hours of the day.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapConfig {
    pub hours: Vec<u32>,
    pub cap: f64,
}

impl CapConfig {
    fn cap(&self) -> SetpointCap {
        SetpointCap {
            hours: HourSet::from_hours(self.hours.iter().copied()),
            cap: self.cap,
        }
    }
}

/// Hour-of-day setpoint caps applied before the commit policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapsConfig {
    pub charge: Option<CapConfig>,
    pub discharge: Option<CapConfig>,
    pub universal: Option<CapConfig>,
}

impl CapsConfig {
    pub fn caps(&self) -> SetpointCaps {
        SetpointCaps {
            charge: self.charge.as_ref().map(CapConfig::cap),
            discharge: self.discharge.as_ref().map(CapConfig::cap),
            universal: self.universal.as_ref().map(CapConfig::cap),
        }
    }

    fn entries(&self) -> [(&'static str, Option<&CapConfig>); 3] {
        [
            ("caps.charge", self.charge.as_ref()),
            ("caps.discharge", self.discharge.as_ref()),
            ("caps.universal", self.universal.as_ref()),
        ]
    }
}

/// Strategy variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    PeakShave,
    ConservativePeakShave,
    TouShift,
    TouPeakShaveCombo,
    SubLoadPeakShave,
    WholesaleTranche,
    SettingsMarket,
    HeatPumpSubstitution,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    /// Threshold search used by the peak-shave and TOU strategies.
    pub search: ThresholdSearch,
    /// Sub-load search result when the budget is never reached.
    pub shortfall: SubLoadShortfall,
    /// Floor the discharge setpoint at the lowest flexed demand so far.
    pub floor_discharge_by_min: bool,
    /// Shed window length (settings) or price averaging bucket (heat pump).
    pub resolution_minutes: i64,
    /// Start of the daily band settings repayment must fall in.
    pub repay_from: Option<NaiveTime>,
    /// End of the daily repay band, inclusive.
    pub repay_to: Option<NaiveTime>,
    /// Raw cost of the fuel the heat pump substitutes for.
    pub base_supply_cost: f64,
    /// Conversion efficiency of the substituted supply, in (0, 1].
    pub base_supply_efficiency: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::default(),
            search: ThresholdSearch::default(),
            shortfall: SubLoadShortfall::default(),
            floor_discharge_by_min: false,
            resolution_minutes: 30,
            repay_from: None,
            repay_to: None,
            base_supply_cost: 40.0,
            base_supply_efficiency: 0.85,
        }
    }
}

impl StrategyConfig {
    pub fn resolution(&self) -> TimeDelta {
        TimeDelta::minutes(self.resolution_minutes)
    }

    pub fn repay_slot(&self) -> Option<RepaySlot> {
        Some(RepaySlot {
            from: self.repay_from?,
            to: self.repay_to?,
        })
    }

    pub fn base_supply(&self) -> ThermalSupply {
        ThermalSupply {
            raw_cost_of_energy: self.base_supply_cost,
            efficiency: self.base_supply_efficiency,
        }
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: daily peak shaving with a battery.
    pub fn baseline() -> Self {
        Self {
            strategy: StrategyConfig {
                search: ThresholdSearch::Interpolated,
                ..StrategyConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the TOU preset: overnight charging, evening discharging.
    pub fn tou_shift() -> Self {
        Self {
            events: EventsConfig {
                universal_every_hours: None,
                charge_every_hours: Some(24.0),
                discharge_every_hours: Some(24.0),
                ..EventsConfig::default()
            },
            windows: WindowsConfig {
                charge: vec![HourWindow {
                    start: 0,
                    end: 7,
                    days: DaySelection::All,
                }],
                discharge: vec![HourWindow {
                    start: 16,
                    end: 21,
                    days: DaySelection::All,
                }],
                allow_non_scheduled_dispatch: false,
            },
            strategy: StrategyConfig {
                kind: StrategyKind::TouShift,
                search: ThresholdSearch::Interpolated,
                ..StrategyConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the conservative preset: hourly peak-shave recomputation that
    /// never chases below the reached peak, with an economic charge throttle.
    pub fn conservative() -> Self {
        Self {
            equipment: EquipmentConfig {
                storage_capacity: 60.0,
                charge_capacity: 15.0,
                discharge_capacity: 15.0,
                ..EquipmentConfig::default()
            },
            events: EventsConfig {
                universal_every_hours: Some(1.0),
                ..EventsConfig::default()
            },
            constraints: ConstraintsConfig {
                demand_charge_rate: Some(12.0),
                tou_spread: 0.05,
                ..ConstraintsConfig::default()
            },
            strategy: StrategyConfig {
                kind: StrategyKind::ConservativePeakShave,
                search: ThresholdSearch::Interpolated,
                ..StrategyConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "tou_shift", "conservative"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "tou_shift" => Ok(Self::tou_shift()),
            "conservative" => Ok(Self::conservative()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError::new(field, message));
            }
        };

        let s = &self.simulation;
        check(s.sample_minutes > 0, "simulation.sample_minutes", "must be > 0");
        check(
            s.sample_minutes <= 0 || (24 * 60) % s.sample_minutes == 0,
            "simulation.sample_minutes",
            "must divide a day evenly",
        );
        check(s.days > 0, "simulation.days", "must be > 0");
        check(
            !matches!(s.dispatch_on, Channel::PowerFactor),
            "simulation.dispatch_on",
            "must be a demand channel",
        );

        let d = &self.demand;
        check(
            d.power_factor > 0.0 && d.power_factor <= 1.0,
            "demand.power_factor",
            "must be in (0.0, 1.0]",
        );
        check(
            (0.0..=1.0).contains(&d.sub_load_fraction),
            "demand.sub_load_fraction",
            "must be in [0.0, 1.0]",
        );
        check(d.noise_std >= 0.0, "demand.noise_std", "must be >= 0");
        check(self.prices.noise_std >= 0.0, "prices.noise_std", "must be >= 0");

        let e = &self.equipment;
        check(e.charge_capacity >= 0.0, "equipment.charge_capacity", "must be >= 0");
        check(e.discharge_capacity >= 0.0, "equipment.discharge_capacity", "must be >= 0");
        if e.kind.stores_energy() {
            check(e.storage_capacity > 0.0, "equipment.storage_capacity", "must be > 0");
            check(
                e.round_trip_efficiency > 0.0 && e.round_trip_efficiency <= 1.0,
                "equipment.round_trip_efficiency",
                "must be in (0.0, 1.0]",
            );
            check(
                (0.0..=1.0).contains(&e.initial_soc),
                "equipment.initial_soc",
                "must be in [0.0, 1.0]",
            );
        }
        if matches!(e.kind, EquipmentKind::Thermal | EquipmentKind::HeatPump) {
            check(e.charging_cop > 0.0, "equipment.charging_cop", "must be > 0");
        }
        if e.kind == EquipmentKind::Thermal {
            check(
                e.load_cop.is_none_or(|cop| cop > 0.0),
                "equipment.load_cop",
                "must be > 0",
            );
            if let Some(pcm) = &e.pcm {
                check(
                    pcm.inlet_temperature != pcm.melt_temperature,
                    "equipment.pcm.melt_temperature",
                    "must differ from equipment.pcm.inlet_temperature",
                );
            }
        } else {
            check(e.pcm.is_none(), "equipment.pcm", "only valid for thermal equipment");
            check(e.load_cop.is_none(), "equipment.load_cop", "only valid for thermal equipment");
        }
        match (e.kind, &e.setting) {
            (EquipmentKind::Setting, None) => {
                check(false, "equipment.setting", "required for setting equipment");
            }
            (EquipmentKind::Setting, Some(setting)) => {
                if let Err(reason) = setting.validate() {
                    check(false, "equipment.setting", reason.as_str());
                }
            }
            (_, Some(_)) => {
                check(false, "equipment.setting", "only valid for setting equipment");
            }
            (_, None) => {}
        }

        let f = &self.forecast;
        for (field, hours) in [
            ("forecast.charge_hours", f.charge_hours),
            ("forecast.discharge_hours", f.discharge_hours),
            ("forecast.universal_hours", f.universal_hours),
        ] {
            check(
                hours_to_millis(hours).is_some(),
                field,
                "must be a positive finite number of hours, at most 100 years",
            );
        }

        let ev = &self.events;
        for (field, every) in [
            ("events.universal_every_hours", ev.universal_every_hours),
            ("events.charge_every_hours", ev.charge_every_hours),
            ("events.discharge_every_hours", ev.discharge_every_hours),
        ] {
            check(
                every.is_none_or(|h| hours_to_millis(h).is_some()),
                field,
                "must be between 1 ms and 100 years",
            );
        }
        check(
            ev.universal_top_of_hour.iter().all(|h| *h < 24),
            "events.universal_top_of_hour",
            "hours must be in 0..24",
        );
        check(
            ev.pauses.iter().all(|p| p.from <= p.to),
            "events.pauses",
            "from must be <= to",
        );

        let w = &self.windows;
        check(
            w.charge.iter().chain(&w.discharge).all(|h| h.start < 24 && h.end <= 24),
            "windows",
            "start must be in 0..24 and end in 0..=24",
        );

        let c = &self.constraints;
        check(
            c.no_charge_hours.iter().chain(&c.no_discharge_hours).all(|h| *h < 24),
            "constraints.no_charge_hours",
            "hours must be in 0..24",
        );
        check(
            c.charge_limit.is_none_or(|v| v >= 0.0),
            "constraints.charge_limit",
            "must be >= 0",
        );
        check(
            c.discharge_limit.is_none_or(|v| v >= 0.0),
            "constraints.discharge_limit",
            "must be >= 0",
        );
        check(
            c.demand_charge_rate.is_none_or(|v| v > 0.0),
            "constraints.demand_charge_rate",
            "must be > 0",
        );

        for (field, cap) in self.caps.entries() {
            if let Some(cap) = cap {
                check(cap.hours.iter().all(|h| *h < 24), field, "hours must be in 0..24");
                check(cap.cap.is_finite(), field, "cap must be finite");
            }
        }

        let st = &self.strategy;
        match st.kind {
            StrategyKind::PeakShave => check(
                ev.has_universal(),
                "events",
                "peak_shave needs at least one universal recomputation event",
            ),
            StrategyKind::WholesaleTranche => check(
                e.kind == EquipmentKind::Battery && e.charge_capacity == e.discharge_capacity,
                "strategy.kind",
                "wholesale_tranche needs a battery with equal charge and discharge capacity",
            ),
            StrategyKind::SettingsMarket => check(
                e.kind == EquipmentKind::Setting,
                "strategy.kind",
                "settings_market needs setting equipment",
            ),
            StrategyKind::HeatPumpSubstitution => {
                check(
                    e.kind == EquipmentKind::HeatPump,
                    "strategy.kind",
                    "heat_pump_substitution needs heat_pump equipment",
                );
                check(
                    st.base_supply_cost >= 0.0,
                    "strategy.base_supply_cost",
                    "must be >= 0",
                );
                check(
                    st.base_supply_efficiency > 0.0 && st.base_supply_efficiency <= 1.0,
                    "strategy.base_supply_efficiency",
                    "must be in (0.0, 1.0]",
                );
            }
            _ => {}
        }
        match e.kind {
            EquipmentKind::Setting => check(
                st.kind == StrategyKind::SettingsMarket,
                "equipment.kind",
                "setting equipment needs the settings_market strategy",
            ),
            EquipmentKind::HeatPump => check(
                st.kind == StrategyKind::HeatPumpSubstitution,
                "equipment.kind",
                "heat_pump equipment needs the heat_pump_substitution strategy",
            ),
            _ => {}
        }
        if matches!(
            st.kind,
            StrategyKind::SettingsMarket | StrategyKind::HeatPumpSubstitution
        ) {
            check(
                st.resolution_minutes > 0 && (24 * 60) % st.resolution_minutes == 0,
                "strategy.resolution_minutes",
                "must be > 0 and divide a day evenly",
            );
        }
        check(
            st.repay_from.is_some() == st.repay_to.is_some(),
            "strategy.repay_from",
            "repay_from and repay_to must be set together",
        );

        errors
    }

    /// Generates the synthetic demand series described by the scenario.
    ///
    /// # Errors
    ///
    /// Returns a [`SeriesError`] when the timing or profile is invalid.
    pub fn demand_series(&self) -> Result<DemandSeries, SeriesError> {
        let s = &self.simulation;
        self.demand.profile().demand_series(
            s.start,
            s.sample_rate(),
            s.total_steps(),
            self.demand.power_factor,
            self.demand.sub_load_fraction,
            s.seed,
        )
    }

    /// Validates the scenario and builds an engine over `series`.
    ///
    /// # Errors
    ///
    /// Returns the first validation error as [`DispatchError::Config`], or a
    /// construction error from the strategy.
    pub fn build_engine<'a>(&self, series: &'a DemandSeries) -> Result<Engine<'a>, DispatchError> {
        if let Some(err) = self.validate().into_iter().next() {
            return Err(err.into());
        }

        let equipment = self.equipment.build()?;
        let f = &self.forecast;
        let mut controller = Controller::new(
            self.events.setter_schedule(series.start()),
            SetpointForecasters::from_hours(f.charge_hours, f.discharge_hours, f.universal_hours),
            self.windows.dispatch_schedule(),
        );
        controller.policy.floor_discharge_by_min = self.strategy.floor_discharge_by_min;
        controller.caps = self.caps.caps();

        let prices = || {
            self.prices.profile().price_series(
                series.timestamps(),
                series.sample_rate(),
                self.simulation.seed.wrapping_add(PRICE_SEED_OFFSET),
            )
        };
        let search = self.strategy.search;
        let strategy = match self.strategy.kind {
            StrategyKind::PeakShave => Strategy::PeakShave { search },
            StrategyKind::ConservativePeakShave => Strategy::ConservativePeakShave { search },
            StrategyKind::TouShift => Strategy::TouShift { search },
            StrategyKind::TouPeakShaveCombo => Strategy::TouPeakShaveCombo { search },
            StrategyKind::SubLoadPeakShave => Strategy::SubLoadPeakShave {
                shortfall: self.strategy.shortfall,
            },
            StrategyKind::WholesaleTranche => {
                Strategy::WholesaleTranche(WholesaleTranche::new(prices()?, &equipment)?)
            }
            StrategyKind::SettingsMarket => {
                let StorageUnit::Setting(adjustment) = &equipment else {
                    return Err(ConfigError::new(
                        "strategy.kind",
                        "settings_market needs setting equipment",
                    )
                    .into());
                };
                Strategy::SettingsMarket(SettingsMarketDispatch::new(
                    prices()?,
                    &adjustment.setting,
                    self.strategy.resolution(),
                    self.strategy.repay_slot(),
                ))
            }
            StrategyKind::HeatPumpSubstitution => {
                let StorageUnit::HeatPump(heat_pump) = &equipment else {
                    return Err(ConfigError::new(
                        "strategy.kind",
                        "heat_pump_substitution needs heat_pump equipment",
                    )
                    .into());
                };
                Strategy::HeatPumpSubstitution(HeatPumpSubstitution::new(
                    prices()?,
                    self.strategy.base_supply(),
                    heat_pump,
                    self.strategy.resolution(),
                ))
            }
        };

        Engine::new(
            series,
            equipment,
            controller,
            self.constraints.pipeline(),
            strategy,
            self.simulation.dispatch_on,
        )
    }
}

/// Seed offset for the price RNG to avoid correlation with demand noise.
const PRICE_SEED_OFFSET: u64 = 57;
