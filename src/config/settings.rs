// src/config/settings.rs

//! Validated tunables handed to the orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use crate::process::ProcessTiming;
use crate::remote::SshOptions;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    /// Transport-level retries in the gateway.
    pub transport: RetryPolicy,
    /// Graceful stop attempts while the container is a zombie.
    pub stop: RetryPolicy,
    /// Kill + remove + verify cycles.
    pub kill: RetryPolicy,
    /// Force-converge attempts of the recovery workflow.
    pub cleanup: RetryPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            transport: RetryPolicy::new(3, Duration::from_secs(2)),
            stop: RetryPolicy::new(5, Duration::from_secs(5)),
            kill: RetryPolicy::new(3, Duration::from_secs(3)),
            cleanup: RetryPolicy::new(3, Duration::from_secs(10)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSettings {
    pub stop_timeout: Duration,
    pub kill_settle: Duration,
    pub startup_grace: Duration,
    pub restart_delay: Duration,
    pub inter_node_delay: Duration,
    pub config_settle: Duration,
}

impl TimingSettings {
    pub fn process_timing(&self) -> ProcessTiming {
        ProcessTiming {
            stop_timeout: self.stop_timeout,
            kill_settle: self.kill_settle,
        }
    }

    /// Every wait set to zero. Useful for dry tests.
    pub fn immediate() -> Self {
        Self {
            stop_timeout: Duration::ZERO,
            kill_settle: Duration::ZERO,
            startup_grace: Duration::ZERO,
            restart_delay: Duration::ZERO,
            inter_node_delay: Duration::ZERO,
            config_settle: Duration::ZERO,
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(30),
            kill_settle: Duration::from_secs(2),
            startup_grace: Duration::from_secs(10),
            restart_delay: Duration::from_secs(5),
            inter_node_delay: Duration::ZERO,
            config_settle: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunableSettings {
    pub key: String,
    pub normal_value: Option<String>,
    pub retry_value: Option<String>,
}

impl Default for TunableSettings {
    fn default() -> Self {
        Self {
            key: "CHUNK_SIZE".to_string(),
            normal_value: None,
            retry_value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Settings {
    pub retry: RetrySettings,
    pub timing: TimingSettings,
    pub tunable: TunableSettings,
    pub ssh: SshOptions,
    pub log_dir: PathBuf,
}
