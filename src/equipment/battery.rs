use super::types::{DispatchContext, Equipment, EquipmentStatus, StorageState};
use crate::sim::dispatch::Dispatch;

/// A battery energy storage system with constant nominal charge/discharge rates.
///
/// Requests are clipped to `rate × Δt_hours` and to the energy (or room)
/// left in the battery. Round-trip efficiency is applied on charge.
#[derive(Debug, Clone, PartialEq)]
pub struct Battery {
    /// Maximum charge power.
    pub nominal_charge_capacity: f64,
    /// Maximum discharge power.
    pub nominal_discharge_capacity: f64,
    state: StorageState,
}

impl Battery {
    /// Creates a new battery.
    ///
    /// # Arguments
    ///
    /// * `storage_capacity` - Usable energy capacity (must be > 0)
    /// * `nominal_charge_capacity` - Maximum charge power (must be >= 0)
    /// * `nominal_discharge_capacity` - Maximum discharge power (must be >= 0)
    /// * `round_trip_efficiency` - Efficiency in (0, 1]
    /// * `state_of_charge` - Initial state of charge in [0, 1]
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero/negative, a rate is negative, the
    /// efficiency is outside (0, 1], or the state of charge is out of range.
    pub fn new(
        storage_capacity: f64,
        nominal_charge_capacity: f64,
        nominal_discharge_capacity: f64,
        round_trip_efficiency: f64,
        state_of_charge: f64,
    ) -> Self {
        assert!(nominal_charge_capacity >= 0.0 && nominal_discharge_capacity >= 0.0);
        Self {
            nominal_charge_capacity,
            nominal_discharge_capacity,
            state: StorageState::new(storage_capacity, round_trip_efficiency, state_of_charge),
        }
    }

    pub fn state_of_charge(&self) -> f64 {
        self.state.state_of_charge
    }

    pub fn round_trip_efficiency(&self) -> f64 {
        self.state.round_trip_efficiency
    }

    pub fn cycle_count(&self) -> f64 {
        self.state.cycle_count
    }
}

impl Equipment for Battery {
    fn dispatch_request(&mut self, proposal: Dispatch, context: &DispatchContext) -> Dispatch {
        self.state.apply(
            proposal,
            self.nominal_charge_capacity,
            self.nominal_discharge_capacity,
            context,
        )
    }

    fn status(&self) -> EquipmentStatus {
        EquipmentStatus {
            state_of_charge: self.state.state_of_charge,
            available_energy: self.state.available_energy(),
            available_storage: self.state.available_storage(),
            cycle_count: self.state.cycle_count,
            charge_capacity: self.nominal_charge_capacity,
            discharge_capacity: self.nominal_discharge_capacity,
            charging_cop: None,
        }
    }

    fn available_energy(&self) -> f64 {
        self.state.available_energy()
    }

    fn available_storage(&self) -> f64 {
        self.state.available_storage()
    }

    fn charge_capacity(&self) -> f64 {
        self.nominal_charge_capacity
    }

    fn discharge_capacity(&self) -> f64 {
        self.nominal_discharge_capacity
    }

    fn storage_capacity(&self) -> f64 {
        self.state.storage_capacity
    }

    fn equipment_type(&self) -> &'static str {
        "Battery"
    }
}
