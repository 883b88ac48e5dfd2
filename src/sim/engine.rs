//! Time-stepped dispatch loop driving one equipment unit over a demand series.

use tracing::{info, trace};

use super::constraints::{ConstraintPipeline, DemandScenario};
use super::controller::Controller;
use super::meter::{DispatchRecord, DispatchReport, SetpointSnapshot};
use super::strategy::Strategy;
use crate::equipment::{DispatchContext, Equipment, StorageUnit};
use crate::error::{DispatchError, Result};
use crate::series::{Channel, DemandSeries, TimeIndexed};

/// Simulation engine owning the equipment, controller, and constraints.
///
/// Borrows the demand series read-only; every other piece of state is owned
/// exclusively and mutated only by [`Engine::step`]. Steps must be executed
/// in timestamp order because periodic recomputation events are stateful.
pub struct Engine<'a> {
    series: &'a DemandSeries,
    equipment: StorageUnit,
    controller: Controller,
    constraints: ConstraintPipeline,
    strategy: Strategy,
    dispatch_on: Channel,
}

impl<'a> Engine<'a> {
    /// Creates a new engine and prepares the strategy.
    ///
    /// # Arguments
    ///
    /// * `series` - Demand series to replay
    /// * `equipment` - Storage unit being dispatched
    /// * `controller` - Setpoints, schedules, and forecasters
    /// * `constraints` - Pipeline applied between proposal and equipment
    /// * `strategy` - Setpoint recomputation policy
    /// * `dispatch_on` - Demand channel driving dispatch decisions
    ///
    /// # Errors
    ///
    /// Returns a configuration error raised by [`Strategy::prepare`].
    pub fn new(
        series: &'a DemandSeries,
        equipment: StorageUnit,
        mut controller: Controller,
        constraints: ConstraintPipeline,
        strategy: Strategy,
        dispatch_on: Channel,
    ) -> Result<Self> {
        strategy.prepare(&mut controller, series)?;
        Ok(Self {
            series,
            equipment,
            controller,
            constraints,
            strategy,
            dispatch_on,
        })
    }

    /// Executes one step and returns its record.
    ///
    /// # Arguments
    ///
    /// * `index` - Sample index into the demand series
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Invariant`] if the realized dispatch carries a
    /// negative or simultaneous leg, or dispatches outside its window.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn step(&mut self, index: usize) -> Result<DispatchRecord> {
        let t = self.series.timestamps()[index];
        let demand = self.series.values(self.dispatch_on)[index];

        // 1. Recompute due setpoints
        self.strategy.recompute(
            t,
            &mut self.controller,
            self.series,
            self.dispatch_on,
            &self.equipment,
        );

        // 2. Scheduled or setpoint-derived proposal
        let proposal = self.controller.proposal(t, demand);

        // 3. Constraint pipeline
        let scenario = DemandScenario {
            timestamp: t,
            demand,
            balance_energy: self.series.values(Channel::BalanceEnergy)[index],
            historical_peak: self.controller.setpoints.historical_peak_demand(),
        };
        let constrained = self.constraints.apply(&scenario, proposal);

        // 4. Equipment realization
        let context = DispatchContext::with_demand(self.series.sample_rate(), demand);
        let realized = self.equipment.dispatch_request(constrained, &context);

        // 5. Validation
        realized
            .validate()
            .and_then(|()| {
                self.controller
                    .dispatch_schedule
                    .validate_dispatch(&realized, t)
            })
            .map_err(|violation| DispatchError::Invariant {
                timestamp: t,
                violation,
            })?;

        // 6. Record
        let electrical = self.equipment.to_electrical(realized);
        let flexed_demand = demand - electrical.net_value();
        let record = DispatchRecord {
            timestamp: t,
            dispatch: realized,
            electrical,
            demand,
            flexed_demand,
            setpoints: SetpointSnapshot::capture(
                &self.controller.setpoints,
                self.controller.slot_at(t),
            ),
            status: self.equipment.status(),
        };

        // 7. Historical extremes
        self.controller.setpoints.record_flexed_demand(flexed_demand);

        trace!(
            %t,
            demand,
            proposed = proposal.net_value(),
            realized = realized.net_value(),
            electrical = electrical.net_value(),
            soc = record.status.state_of_charge,
            "step"
        );
        Ok(record)
    }

    /// Executes every step and consolidates the flexed series.
    ///
    /// # Errors
    ///
    /// Stops at the first invariant violation; see [`Engine::step`].
    pub fn run(&mut self) -> Result<DispatchReport> {
        info!(
            strategy = self.strategy.name(),
            equipment = self.equipment.equipment_type(),
            dispatch_on = %self.dispatch_on,
            steps = self.series.len(),
            "dispatch run started"
        );
        let mut records = Vec::with_capacity(self.series.len());
        for index in 0..self.series.len() {
            records.push(self.step(index)?);
        }
        let report =
            DispatchReport::consolidate(self.series, records, self.strategy.reduces_sub_load());
        info!(
            total_charge = report.total_charge(),
            total_discharge = report.total_discharge(),
            "dispatch run finished"
        );
        Ok(report)
    }

    pub fn series(&self) -> &DemandSeries {
        self.series
    }

    pub fn equipment(&self) -> &StorageUnit {
        &self.equipment
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn dispatch_on(&self) -> Channel {
        self.dispatch_on
    }
}
