//! # Orchestration
//!
//! Planning and driving of node decommissions.
//!
//! - **RangeOwnershipPlanner**: works out which ranges must move where
//! - **DecommissionService**: administrative entry point that admits one
//!   attempt per node and runs it through the state machine

pub mod decommission_service;
pub mod range_planner;

pub use decommission_service::{DecommissionService, DecommissionStatus};
pub use range_planner::{compute_stream_plan, RangeOwnershipPlanner};
