// src/config/mod.rs

//! Configuration loading and validation for fleetctl.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Parse duration strings like `"3s"` (`duration.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it into an immutable [`NodeRegistry`] plus [`Settings`]
//!   (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod settings;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::RawFleetConfig;
pub use settings::{RetrySettings, Settings, TimingSettings, TunableSettings};

use crate::fleet::NodeRegistry;

/// Validated configuration: the fleet topology and the orchestrator's
/// tunables.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub registry: NodeRegistry,
    pub settings: Settings,
}
