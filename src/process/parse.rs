// src/process/parse.rs

//! Text adapters for the container runtime and scp.
//!
//! The Docker CLI only reports some conditions (zombie containers, missing
//! objects) as text. All of that matching lives here so the control flow in
//! [`super::handle`] only ever sees typed results.

use crate::remote::CommandOutput;
use crate::types::ProcessState;

/// Docker's message when a container did not die after the stop signal.
const ZOMBIE_MARKERS: &[&str] = &["did not receive an exit event"];

const MISSING_MARKERS: &[&str] = &["no such container", "no such object", "no such image"];

const SCP_TRANSPORT_MARKERS: &[&str] = &[
    "connection refused",
    "connection timed out",
    "connection closed",
    "connection reset",
    "lost connection",
    "could not resolve hostname",
    "no route to host",
    "network is unreachable",
    "operation timed out",
    "broken pipe",
];

/// Classified result of `docker stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReport {
    Stopped,
    AlreadyAbsent,
    /// The container did not honour the stop signal in time.
    Zombie,
    Failed,
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    let lower = text.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

/// Markers are searched on both streams; Docker writes its errors to stderr.
fn reports(out: &CommandOutput, markers: &[&str]) -> bool {
    contains_any(&out.stderr, markers) || contains_any(&out.stdout, markers)
}

/// True when the runtime says the container or image does not exist.
pub fn is_missing_object(out: &CommandOutput) -> bool {
    !out.success() && reports(out, MISSING_MARKERS)
}

pub fn classify_stop(out: &CommandOutput) -> StopReport {
    if out.success() {
        // Docker may still print the zombie warning with a zero exit code.
        if reports(out, ZOMBIE_MARKERS) {
            return StopReport::Zombie;
        }
        return StopReport::Stopped;
    }
    if reports(out, ZOMBIE_MARKERS) {
        StopReport::Zombie
    } else if is_missing_object(out) {
        StopReport::AlreadyAbsent
    } else {
        StopReport::Failed
    }
}

/// Parse the output of `docker inspect --format {{.State.Running}}`.
///
/// Only stdout carries the value. Returns `None` when the output is neither
/// a state nor a missing-object report (daemon down, permission denied, ...).
pub fn parse_state(out: &CommandOutput) -> Option<ProcessState> {
    if out.success() {
        match out.stdout.trim().lines().last().map(str::trim) {
            Some("true") => Some(ProcessState::Running),
            Some("false") => Some(ProcessState::Stopped),
            _ => None,
        }
    } else if is_missing_object(out) {
        Some(ProcessState::Absent)
    } else {
        None
    }
}

/// Whether a failed scp run failed at the connection level.
///
/// scp exits with 1 for every kind of failure, so its stderr is all we have.
pub fn scp_failure_is_transport(stderr: &str) -> bool {
    contains_any(stderr, SCP_TRANSPORT_MARKERS)
}
