// src/types.rs

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Deserialize;

/// Role of a node in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Aggregator,
    Worker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Aggregator => f.write_str("aggregator"),
            Role::Worker => f.write_str("worker"),
        }
    }
}

/// Which part of the fleet a verb applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FleetScope {
    #[default]
    All,
    #[value(name = "aggregator-only", alias = "aggregator")]
    AggregatorOnly,
    #[value(name = "workers-only", alias = "workers")]
    WorkersOnly,
}

impl FleetScope {
    pub fn includes_aggregator(self) -> bool {
        matches!(self, FleetScope::All | FleetScope::AggregatorOnly)
    }

    pub fn includes_workers(self) -> bool {
        matches!(self, FleetScope::All | FleetScope::WorkersOnly)
    }
}

impl fmt::Display for FleetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetScope::All => f.write_str("all"),
            FleetScope::AggregatorOnly => f.write_str("aggregator-only"),
            FleetScope::WorkersOnly => f.write_str("workers-only"),
        }
    }
}

impl FromStr for FleetScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(FleetScope::All),
            "aggregator" | "aggregator-only" => Ok(FleetScope::AggregatorOnly),
            "workers" | "workers-only" => Ok(FleetScope::WorkersOnly),
            other => Err(format!(
                "invalid fleet scope: {other} (expected \"all\", \"aggregator-only\" or \"workers-only\")"
            )),
        }
    }
}

/// Observed state of a node's managed container.
///
/// Never persisted: every value is the result of a fresh query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Absent,
    Stopped,
    Running,
}

impl ProcessState {
    pub fn exists(self) -> bool {
        !matches!(self, ProcessState::Absent)
    }
}

/// Result of a graceful stop with retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The container is stopped (or was already gone).
    Converged,
    /// The container ignored every stop and the final kill.
    Zombie,
}

/// Result of a log capture attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogCapture {
    Saved(PathBuf),
    /// The container did not exist, so there was nothing to capture.
    Skipped,
}

/// Per-node status as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Running,
    StoppedButExists,
    Absent,
    ConnectionFailed,
}

impl From<ProcessState> for NodeStatus {
    fn from(state: ProcessState) -> Self {
        match state {
            ProcessState::Running => NodeStatus::Running,
            ProcessState::Stopped => NodeStatus::StoppedButExists,
            ProcessState::Absent => NodeStatus::Absent,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Running => "RUNNING",
            NodeStatus::StoppedButExists => "STOPPED-BUT-EXISTS",
            NodeStatus::Absent => "ABSENT",
            NodeStatus::ConnectionFailed => "CONNECTION-FAILED",
        };
        f.write_str(s)
    }
}
