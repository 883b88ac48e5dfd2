//! Thermal energy storage with state-dependent rate limits.
//!
//! Charge and discharge rates come from a [`RateModel`] evaluated against
//! the current state of charge before each request. The phase-change
//! material (PCM) model derives the discharge rate from a heat-exchange
//! effectiveness and an empirical normalised-flow regression.
//!
//! The store keeps its books in thermal energy. The metered electrical
//! effect of a dispatch goes through two coefficients of performance: the
//! charging plant's for energy put in, and that of the plant whose load a
//! discharge displaces for energy taken out.

use super::types::{DispatchContext, Equipment, EquipmentStatus, StorageState};
use crate::sim::dispatch::Dispatch;

/// Regression coefficients for normalised flow as a function of
/// effectiveness and state of charge.
const FLOW_C0: f64 = 0.728269761;
const FLOW_C1: f64 = 3.252826183;
const FLOW_C2: f64 = -0.262047961;
const FLOW_C3: f64 = -0.086927382;
const FLOW_C4: f64 = -14.54832594;
const FLOW_C5: f64 = 21.21098192;
const FLOW_C6: f64 = -9.407503243;

const MIN_NORMALISED_FLOW: f64 = 0.2;
const MAX_NORMALISED_FLOW: f64 = 1.25;

/// Phase-change-material heat exchanger parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcmExchanger {
    /// Heat transfer fluid inlet temperature.
    pub inlet_temperature: f64,
    /// Heat transfer fluid outlet temperature.
    pub outlet_temperature: f64,
    /// PCM melt temperature.
    pub melt_temperature: f64,
    /// Fluid density.
    pub density: f64,
    /// Fluid specific heat capacity.
    pub specific_heat: f64,
    /// Design volumetric flow rate.
    pub design_flow_rate: f64,
}

impl PcmExchanger {
    /// Heat-exchange effectiveness `(T_in - T_out) / (T_in - T_pcm)`.
    pub fn effectiveness(&self) -> f64 {
        (self.inlet_temperature - self.outlet_temperature)
            / (self.inlet_temperature - self.melt_temperature)
    }

    /// Actual-over-design flow ratio needed to hold the effectiveness at a
    /// given state of charge, throttled to `[0.2, 1.25]`.
    pub fn normalised_flow(&self, state_of_charge: f64) -> f64 {
        let f = state_of_charge;
        let base = FLOW_C0 + FLOW_C1 * f + FLOW_C4 * f.powi(2) + FLOW_C5 * f.powi(3) + FLOW_C6 * f.powi(4);
        let n = (self.effectiveness() - base) / (FLOW_C2 + FLOW_C3 * f);
        n.clamp(MIN_NORMALISED_FLOW, MAX_NORMALISED_FLOW)
    }

    /// Maximum heat-exchange rate at a given state of charge.
    pub fn max_rate(&self, state_of_charge: f64) -> f64 {
        let flow = self.design_flow_rate * self.normalised_flow(state_of_charge);
        let rate = self.effectiveness()
            * flow
            * self.density
            * self.specific_heat
            * (self.inlet_temperature - self.melt_temperature);
        rate.max(0.0)
    }
}

/// How a rate limit is derived from equipment state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateModel {
    /// Fixed rate independent of state.
    Nominal(f64),
    /// PCM exchanger rate evaluated at the current state of charge.
    Pcm(PcmExchanger),
}

impl RateModel {
    pub fn rate(&self, state_of_charge: f64) -> f64 {
        match self {
            RateModel::Nominal(rate) => *rate,
            RateModel::Pcm(exchanger) => exchanger.max_rate(state_of_charge),
        }
    }
}

/// Thermal energy store with electrical conversion on both legs.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalStorage {
    pub charge_model: RateModel,
    pub discharge_model: RateModel,
    /// Coefficient of performance of the charging plant.
    pub charging_cop: f64,
    /// Coefficient of performance of the plant whose load a discharge
    /// displaces.
    pub load_cop: f64,
    state: StorageState,
}

impl ThermalStorage {
    /// Creates a new thermal store.
    ///
    /// The displaced load is assumed to run at `charging_cop`; use
    /// [`ThermalStorage::with_load_cop`] when it differs.
    ///
    /// # Panics
    ///
    /// Panics if capacity, efficiency or state of charge are out of range,
    /// if `charging_cop` is not positive, or if a PCM model has equal inlet
    /// and melt temperatures.
    pub fn new(
        storage_capacity: f64,
        charge_model: RateModel,
        discharge_model: RateModel,
        round_trip_efficiency: f64,
        state_of_charge: f64,
        charging_cop: f64,
    ) -> Self {
        assert!(charging_cop > 0.0, "charging COP must be > 0");
        for model in [&charge_model, &discharge_model] {
            match model {
                RateModel::Nominal(rate) => assert!(*rate >= 0.0, "rate must be >= 0"),
                RateModel::Pcm(exchanger) => assert!(
                    exchanger.inlet_temperature != exchanger.melt_temperature,
                    "inlet and melt temperatures must differ"
                ),
            }
        }
        Self {
            charge_model,
            discharge_model,
            charging_cop,
            load_cop: charging_cop,
            state: StorageState::new(storage_capacity, round_trip_efficiency, state_of_charge),
        }
    }

    /// Sets the coefficient of performance of the displaced load.
    ///
    /// # Panics
    ///
    /// Panics if `load_cop` is not positive.
    pub fn with_load_cop(mut self, load_cop: f64) -> Self {
        assert!(load_cop > 0.0, "load COP must be > 0");
        self.load_cop = load_cop;
        self
    }

    pub fn state_of_charge(&self) -> f64 {
        self.state.state_of_charge
    }
}

impl Equipment for ThermalStorage {
    fn dispatch_request(&mut self, proposal: Dispatch, context: &DispatchContext) -> Dispatch {
        let charge_rate = self.charge_capacity();
        let discharge_rate = self.discharge_capacity();
        self.state
            .apply(proposal, charge_rate, discharge_rate, context)
    }

    fn to_electrical(&self, dispatch: Dispatch) -> Dispatch {
        Dispatch {
            charge: dispatch.charge / self.charging_cop,
            discharge: dispatch.discharge / self.load_cop,
        }
    }

    fn status(&self) -> EquipmentStatus {
        EquipmentStatus {
            state_of_charge: self.state.state_of_charge,
            available_energy: self.state.available_energy(),
            available_storage: self.state.available_storage(),
            cycle_count: self.state.cycle_count,
            charge_capacity: self.charge_capacity(),
            discharge_capacity: self.discharge_capacity(),
            charging_cop: Some(self.charging_cop),
        }
    }

    fn available_energy(&self) -> f64 {
        self.state.available_energy()
    }

    fn available_storage(&self) -> f64 {
        self.state.available_storage()
    }

    fn charge_capacity(&self) -> f64 {
        self.charge_model.rate(self.state.state_of_charge)
    }

    fn discharge_capacity(&self) -> f64 {
        self.discharge_model.rate(self.state.state_of_charge)
    }

    fn storage_capacity(&self) -> f64 {
        self.state.storage_capacity
    }

    fn equipment_type(&self) -> &'static str {
        "ThermalStorage"
    }
}
