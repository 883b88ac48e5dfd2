//! Common types and traits for dispatchable equipment.

use std::fmt;

use chrono::TimeDelta;

use crate::series::hours;
use crate::sim::dispatch::Dispatch;

/// Snapshot of equipment state recorded alongside every dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquipmentStatus {
    /// State of charge after the step (0.0 to 1.0).
    pub state_of_charge: f64,
    pub available_energy: f64,
    pub available_storage: f64,
    /// Cumulative state-of-charge increase.
    pub cycle_count: f64,
    /// Current charge rate limit (power units).
    pub charge_capacity: f64,
    /// Current discharge rate limit (power units).
    pub discharge_capacity: f64,
    /// Charging coefficient of performance; thermal equipment only.
    pub charging_cop: Option<f64>,
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SoC={:.1}% avail={:.2} room={:.2} cycles={:.3}",
            self.state_of_charge * 100.0,
            self.available_energy,
            self.available_storage,
            self.cycle_count
        )?;
        if let Some(cop) = self.charging_cop {
            write!(f, " cop={cop:.2}")?;
        }
        Ok(())
    }
}

/// Step information handed to equipment with every dispatch request.
///
/// # Fields
///
/// * `sample_rate` - Interval length
/// * `demand` - Demand on the dispatch channel during the interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchContext {
    pub sample_rate: TimeDelta,
    pub demand: f64,
}

impl DispatchContext {
    /// Creates a context with no demand attached.
    pub fn new(sample_rate: TimeDelta) -> Self {
        Self {
            sample_rate,
            demand: 0.0,
        }
    }

    pub fn with_demand(sample_rate: TimeDelta, demand: f64) -> Self {
        Self {
            sample_rate,
            demand,
        }
    }

    /// Interval length in hours.
    pub fn hours(&self) -> f64 {
        hours(self.sample_rate)
    }
}

/// Trait defining a storage or load-modifying asset driven by the dispatch loop.
///
/// State changes only through [`Equipment::dispatch_request`].
pub trait Equipment {
    /// Clips a proposal to physical limits, updates state, and returns the
    /// realized dispatch.
    ///
    /// # Arguments
    ///
    /// * `proposal` - Desired charge/discharge energy for the interval
    /// * `context` - Interval length and the demand seen during it
    ///
    /// # Returns
    ///
    /// The dispatch actually performed, in the equipment's own energy units.
    /// Callers must use this value, not the proposal, for all downstream
    /// bookkeeping.
    fn dispatch_request(&mut self, proposal: Dispatch, context: &DispatchContext) -> Dispatch;

    /// Converts a realized dispatch into its effect on metered electrical
    /// energy.
    ///
    /// Electrical equipment returns the dispatch unchanged.
    fn to_electrical(&self, dispatch: Dispatch) -> Dispatch {
        dispatch
    }

    /// Current state snapshot.
    fn status(&self) -> EquipmentStatus;

    /// Energy that can still be discharged.
    fn available_energy(&self) -> f64;

    /// Energy that can still be absorbed.
    fn available_storage(&self) -> f64;

    /// Current charge rate limit (power units).
    fn charge_capacity(&self) -> f64;

    /// Current discharge rate limit (power units).
    fn discharge_capacity(&self) -> f64;

    fn storage_capacity(&self) -> f64;

    /// Returns a human-readable type name for the equipment.
    fn equipment_type(&self) -> &'static str;
}

/// State-of-charge bookkeeping shared by every storage variant.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StorageState {
    pub storage_capacity: f64,
    pub round_trip_efficiency: f64,
    pub state_of_charge: f64,
    pub cycle_count: f64,
}

impl StorageState {
    pub fn new(storage_capacity: f64, round_trip_efficiency: f64, state_of_charge: f64) -> Self {
        assert!(storage_capacity > 0.0, "storage capacity must be > 0");
        assert!(
            round_trip_efficiency > 0.0 && round_trip_efficiency <= 1.0,
            "round trip efficiency must be in (0, 1]"
        );
        assert!(
            (0.0..=1.0).contains(&state_of_charge),
            "state of charge must be in [0, 1]"
        );
        Self {
            storage_capacity,
            round_trip_efficiency,
            state_of_charge,
            cycle_count: 0.0,
        }
    }

    pub fn available_energy(&self) -> f64 {
        self.state_of_charge * self.storage_capacity
    }

    pub fn available_storage(&self) -> f64 {
        self.storage_capacity * (1.0 - self.state_of_charge)
    }

    /// Clips each leg against its rate and state limits and applies it.
    ///
    /// Efficiency loss is charged on the way in only.
    pub fn apply(
        &mut self,
        proposal: Dispatch,
        charge_rate: f64,
        discharge_rate: f64,
        context: &DispatchContext,
    ) -> Dispatch {
        let dt_h = context.hours();

        let charge = proposal
            .charge
            .max(0.0)
            .min(charge_rate * dt_h)
            .min(self.available_storage())
            .max(0.0);
        let discharge = proposal
            .discharge
            .max(0.0)
            .min(discharge_rate * dt_h)
            .min(self.available_energy())
            .max(0.0);

        let delta_soc =
            (self.round_trip_efficiency * charge - discharge) / self.storage_capacity;
        self.state_of_charge = (self.state_of_charge + delta_soc).clamp(0.0, 1.0);
        if delta_soc > 0.0 {
            self.cycle_count += delta_soc;
        }

        Dispatch { charge, discharge }
    }
}
