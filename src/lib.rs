//! Dispatch simulation for behind-the-meter energy storage.
//!
//! Replays a metered demand series step by step, recomputing charge and
//! discharge setpoints on a schedule and dispatching a battery or thermal
//! store against them under a configurable constraint pipeline.

pub mod config;
pub mod equipment;
pub mod error;
pub mod forecast;
pub mod io;
pub mod prices;
pub mod series;
/// Engine, controller, strategies, schedules, and constraints.
pub mod sim;
pub mod synthetic;
