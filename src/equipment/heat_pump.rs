//! One-way heat pump substituting for a fuel-fired thermal supply.

use super::types::{DispatchContext, Equipment, EquipmentStatus};
use crate::sim::dispatch::Dispatch;

/// Heat pump that can only add load. Dispatch is tracked in thermal energy
/// delivered; the meter sees it divided by the COP.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatPump {
    /// Thermal output rate limit (power units).
    pub thermal_capacity: f64,
    pub cop: f64,
}

impl HeatPump {
    /// # Panics
    ///
    /// Panics if `thermal_capacity` is negative or `cop` is not positive.
    pub fn new(thermal_capacity: f64, cop: f64) -> Self {
        assert!(thermal_capacity >= 0.0, "thermal capacity must be >= 0");
        assert!(cop > 0.0, "COP must be > 0");
        Self {
            thermal_capacity,
            cop,
        }
    }
}

impl Equipment for HeatPump {
    fn dispatch_request(&mut self, proposal: Dispatch, context: &DispatchContext) -> Dispatch {
        let charge = proposal
            .charge
            .max(0.0)
            .min(self.thermal_capacity * context.hours());
        Dispatch::charge(charge)
    }

    fn to_electrical(&self, dispatch: Dispatch) -> Dispatch {
        Dispatch {
            charge: dispatch.charge / self.cop,
            discharge: 0.0,
        }
    }

    fn status(&self) -> EquipmentStatus {
        EquipmentStatus {
            state_of_charge: 0.0,
            available_energy: 0.0,
            available_storage: 0.0,
            cycle_count: 0.0,
            charge_capacity: self.thermal_capacity,
            discharge_capacity: 0.0,
            charging_cop: Some(self.cop),
        }
    }

    fn available_energy(&self) -> f64 {
        0.0
    }

    fn available_storage(&self) -> f64 {
        0.0
    }

    fn charge_capacity(&self) -> f64 {
        self.thermal_capacity
    }

    fn discharge_capacity(&self) -> f64 {
        0.0
    }

    fn storage_capacity(&self) -> f64 {
        0.0
    }

    fn equipment_type(&self) -> &'static str {
        "HeatPump"
    }
}
