// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! The variants follow the failure taxonomy the orchestrator reasons about:
//! transport failures are retried by the gateway, command failures never are,
//! convergence failures are retried by the callers that own the operation,
//! and partial fleet failures carry the set of nodes that did not make it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// The node could not be reached (or the connection dropped) on every
    /// allowed attempt.
    #[error("transport failure on {node} after {attempts} attempt(s): {reason}")]
    Transport {
        node: String,
        attempts: u32,
        reason: String,
    },

    /// The remote command ran and returned a non-zero exit code.
    #[error("command `{command}` failed on {node} (exit {exit_code}): {output}")]
    Command {
        node: String,
        command: String,
        exit_code: i32,
        output: String,
    },

    /// A verify step never observed the expected terminal state.
    #[error("{node}: {what} did not converge after {attempts} attempt(s)")]
    Convergence {
        node: String,
        what: String,
        attempts: u32,
    },

    #[error("{} node(s) failed: {}", failed.len(), failed.join(", "))]
    PartialFleet { failed: Vec<String> },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FleetError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FleetError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
