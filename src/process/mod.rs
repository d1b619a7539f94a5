// src/process/mod.rs

//! Operations on a single node's managed container.
//!
//! - [`docker`] builds the Docker CLI commands.
//! - [`parse`] turns Docker's text output into typed results.
//! - [`handle`] implements the idempotent per-node operations on top of the
//!   remote gateway.

pub mod docker;
pub mod handle;
pub mod parse;

pub use handle::{ProcessOps, ProcessTiming};
