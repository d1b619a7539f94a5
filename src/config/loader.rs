// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::FleetConfig;
use crate::config::model::RawFleetConfig;
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawFleetConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawFleetConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawFleetConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Resolves per-node settings against role and fleet defaults.
/// - Checks hosts, attempt counts, durations and the tunable key.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<FleetConfig> {
    let raw_config = load_from_path(&path)?;
    let config = FleetConfig::try_from(raw_config)?;
    Ok(config)
}

/// `fleet.toml` in the current working directory, unless `FLEETCTL_CONFIG`
/// points elsewhere.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("FLEETCTL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("fleet.toml"))
}
