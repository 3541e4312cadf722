//! elevator-planner
//!
//! Scheduling and routing engine for a bank of elevators: per-car stop
//! ordering, fleet-wide hall-call dispatch and a step-driven event loop.

pub mod direction;
pub mod route;
pub mod elevator;
pub mod passenger;
pub mod floor_index;
pub mod traits;
pub mod system;
pub mod simulation;
