// src/fleet/mod.rs

//! Fleet topology and fleet-wide sweeps.

pub mod registry;
pub mod sweep;

pub use registry::{Node, NodeRegistry, RunOptions};
pub use sweep::{for_each_node, FleetOutcome, NodeFailure, OrderPolicy};
