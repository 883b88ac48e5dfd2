//! Dispatchable equipment models.

/// Constant-rate battery storage model.
pub mod battery;
pub mod heat_pump;
pub mod settings;
pub mod thermal;
pub mod types;

pub use battery::Battery;
pub use heat_pump::HeatPump;
pub use settings::{Setting, SettingsAdjustment};
pub use thermal::{PcmExchanger, RateModel, ThermalStorage};
pub use types::{DispatchContext, Equipment, EquipmentStatus};

use crate::sim::dispatch::Dispatch;

/// Closed set of equipment driven by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageUnit {
    Battery(Battery),
    Thermal(ThermalStorage),
    HeatPump(HeatPump),
    Setting(SettingsAdjustment),
}

impl StorageUnit {
    fn inner(&self) -> &dyn Equipment {
        match self {
            StorageUnit::Battery(b) => b,
            StorageUnit::Thermal(t) => t,
            StorageUnit::HeatPump(h) => h,
            StorageUnit::Setting(s) => s,
        }
    }
}

impl Equipment for StorageUnit {
    fn dispatch_request(&mut self, proposal: Dispatch, context: &DispatchContext) -> Dispatch {
        match self {
            StorageUnit::Battery(b) => b.dispatch_request(proposal, context),
            StorageUnit::Thermal(t) => t.dispatch_request(proposal, context),
            StorageUnit::HeatPump(h) => h.dispatch_request(proposal, context),
            StorageUnit::Setting(s) => s.dispatch_request(proposal, context),
        }
    }

    fn to_electrical(&self, dispatch: Dispatch) -> Dispatch {
        self.inner().to_electrical(dispatch)
    }

    fn status(&self) -> EquipmentStatus {
        self.inner().status()
    }

    fn available_energy(&self) -> f64 {
        self.inner().available_energy()
    }

    fn available_storage(&self) -> f64 {
        self.inner().available_storage()
    }

    fn charge_capacity(&self) -> f64 {
        self.inner().charge_capacity()
    }

    fn discharge_capacity(&self) -> f64 {
        self.inner().discharge_capacity()
    }

    fn storage_capacity(&self) -> f64 {
        self.inner().storage_capacity()
    }

    fn equipment_type(&self) -> &'static str {
        self.inner().equipment_type()
    }
}

impl From<Battery> for StorageUnit {
    fn from(battery: Battery) -> Self {
        StorageUnit::Battery(battery)
    }
}

impl From<ThermalStorage> for StorageUnit {
    fn from(store: ThermalStorage) -> Self {
        StorageUnit::Thermal(store)
    }
}

impl From<HeatPump> for StorageUnit {
    fn from(heat_pump: HeatPump) -> Self {
        StorageUnit::HeatPump(heat_pump)
    }
}

impl From<SettingsAdjustment> for StorageUnit {
    fn from(adjustment: SettingsAdjustment) -> Self {
        StorageUnit::Setting(adjustment)
    }
}
