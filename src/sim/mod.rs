pub mod constraints;
pub mod controller;
/// Realized charge/discharge pairs.
pub mod dispatch;
pub mod dispatch_schedule;
pub mod engine;
pub mod kpi;
pub mod meter;
pub mod optimizer;
/// Event and period schedules.
pub mod schedule;
pub mod setpoint;
pub mod strategy;
