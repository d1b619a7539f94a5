// src/lifecycle/mod.rs

//! Fleet-level lifecycle verbs.
//!
//! [`Orchestrator`] composes the per-node primitives in [`crate::process`]
//! with the sweep in [`crate::fleet`] into deploy, start, stop, restart,
//! force-kill, cleanup and status. Every verb takes a [`crate::FleetScope`]
//! and reports a [`crate::fleet::FleetOutcome`] instead of failing fast.

mod orchestrator;
mod status;

pub use orchestrator::Orchestrator;
pub use status::{render_status_table, NodeReport};
