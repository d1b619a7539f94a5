// src/config/model.rs

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [fleet]
/// remote_dir = "/opt/prover"
/// runtime_config = "prover.env"
///
/// [ssh]
/// user = "ubuntu"
/// identity_file = "~/.ssh/fleet"
///
/// [aggregator]
/// host = "10.0.0.10"
/// image = "prover-aggregator:latest"
/// artifact = "dist/aggregator.tar"
///
/// [workers]
/// image = "prover-worker:latest"
/// artifact = "dist/worker.tar"
///
/// [[worker]]
/// host = "10.0.0.11"
/// cpuset_cpus = "0-63"
/// cpuset_mems = "0"
///
/// [tunable]
/// key = "CHUNK_SIZE"
/// normal_value = "64"
/// retry_value = "16"
/// ```
///
/// This is the unvalidated form; see [`super::FleetConfig`] for the checked
/// version the rest of the crate uses.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFleetConfig {
    #[serde(default)]
    pub fleet: FleetSection,

    #[serde(default)]
    pub ssh: SshSection,

    pub aggregator: NodeEntry,

    /// Defaults shared by every `[[worker]]`.
    #[serde(default)]
    pub workers: WorkerDefaults,

    /// One entry per worker, in fleet order.
    #[serde(default)]
    pub worker: Vec<NodeEntry>,

    #[serde(default)]
    pub runtime: RuntimeSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub timing: TimingSection,

    #[serde(default)]
    pub tunable: TunableSection,
}

/// `[fleet]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FleetSection {
    /// Default remote working directory.
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    /// Runtime configuration file name, relative to the remote dir unless
    /// absolute.
    #[serde(default = "default_runtime_config")]
    pub runtime_config: String,

    /// Local directory for captured logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

fn default_remote_dir() -> String {
    "/opt/fleet".to_string()
}

fn default_runtime_config() -> String {
    "runtime.env".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            remote_dir: default_remote_dir(),
            runtime_config: default_runtime_config(),
            log_dir: default_log_dir(),
        }
    }
}

/// `[ssh]` section: connection defaults for every node.
#[derive(Debug, Clone, Deserialize)]
pub struct SshSection {
    /// Empty means "whatever ssh picks" (usually the local user).
    #[serde(default)]
    pub user: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default)]
    pub identity_file: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// Reuse one connection per node via `ControlMaster`.
    #[serde(default = "default_true")]
    pub multiplex: bool,

    #[serde(default)]
    pub control_dir: Option<String>,

    #[serde(default = "default_control_persist")]
    pub control_persist: String,

    /// Alternative `ssh` / `scp` binaries.
    #[serde(default)]
    pub ssh_program: Option<String>,

    #[serde(default)]
    pub scp_program: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

fn default_control_persist() -> String {
    "60s".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            user: String::new(),
            port: default_ssh_port(),
            identity_file: None,
            connect_timeout: default_connect_timeout(),
            multiplex: true,
            control_dir: None,
            control_persist: default_control_persist(),
            ssh_program: None,
            scp_program: None,
        }
    }
}

/// `[aggregator]` or one `[[worker]]` entry.
///
/// Everything except `host` falls back to the role or fleet defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeEntry {
    pub host: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub identity_file: Option<String>,

    #[serde(default)]
    pub remote_dir: Option<String>,

    /// Only honoured on `[aggregator]`; workers share `[workers].process_name`.
    #[serde(default)]
    pub process_name: Option<String>,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub artifact: Option<String>,

    #[serde(default)]
    pub cpuset_cpus: Option<String>,

    #[serde(default)]
    pub cpuset_mems: Option<String>,

    #[serde(default)]
    pub gpus: Option<String>,

    /// Replaces `[runtime].devices` for this node when set.
    #[serde(default)]
    pub devices: Option<Vec<String>>,

    /// Appended to `[runtime].env`.
    #[serde(default)]
    pub env: Vec<String>,
}

/// `[workers]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerDefaults {
    #[serde(default = "default_worker_process_name")]
    pub process_name: String,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub artifact: Option<String>,
}

fn default_worker_process_name() -> String {
    "worker".to_string()
}

impl Default for WorkerDefaults {
    fn default() -> Self {
        Self {
            process_name: default_worker_process_name(),
            image: None,
            artifact: None,
        }
    }
}

pub(crate) fn default_aggregator_process_name() -> String {
    "aggregator".to_string()
}

/// `[runtime]` section: `docker run` parameters shared by every node.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    #[serde(default)]
    pub devices: Vec<String>,

    #[serde(default)]
    pub gpus: Option<String>,

    #[serde(default)]
    pub mounts: Vec<String>,

    #[serde(default)]
    pub env: Vec<String>,

    #[serde(default)]
    pub network: Option<String>,

    /// Where the runtime config file appears inside the container.
    #[serde(default = "default_config_mount")]
    pub config_mount: String,

    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_config_mount() -> String {
    "/app/runtime.env".to_string()
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            gpus: None,
            mounts: Vec::new(),
            env: Vec::new(),
            network: None,
            config_mount: default_config_mount(),
            extra_args: Vec::new(),
        }
    }
}

/// `[retry]` section. Counts are total attempts; delays are duration
/// strings like `"3s"`.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_transport_attempts")]
    pub transport_attempts: u32,
    #[serde(default = "default_transport_delay")]
    pub transport_delay: String,

    #[serde(default = "default_stop_retries")]
    pub stop_retries: u32,
    #[serde(default = "default_stop_delay")]
    pub stop_delay: String,

    #[serde(default = "default_kill_retries")]
    pub kill_retries: u32,
    #[serde(default = "default_kill_delay")]
    pub kill_delay: String,

    #[serde(default = "default_cleanup_retries")]
    pub cleanup_retries: u32,
    #[serde(default = "default_cleanup_delay")]
    pub cleanup_delay: String,
}

fn default_transport_attempts() -> u32 {
    3
}
fn default_transport_delay() -> String {
    "2s".to_string()
}
fn default_stop_retries() -> u32 {
    5
}
fn default_stop_delay() -> String {
    "5s".to_string()
}
fn default_kill_retries() -> u32 {
    3
}
fn default_kill_delay() -> String {
    "3s".to_string()
}
fn default_cleanup_retries() -> u32 {
    3
}
fn default_cleanup_delay() -> String {
    "10s".to_string()
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            transport_attempts: default_transport_attempts(),
            transport_delay: default_transport_delay(),
            stop_retries: default_stop_retries(),
            stop_delay: default_stop_delay(),
            kill_retries: default_kill_retries(),
            kill_delay: default_kill_delay(),
            cleanup_retries: default_cleanup_retries(),
            cleanup_delay: default_cleanup_delay(),
        }
    }
}

/// `[timing]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingSection {
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: String,
    #[serde(default = "default_kill_settle")]
    pub kill_settle: String,
    /// Wait between starting the aggregator and starting workers.
    #[serde(default = "default_startup_grace")]
    pub startup_grace: String,
    /// Wait between stop and start during a restart.
    #[serde(default = "default_restart_delay")]
    pub restart_delay: String,
    /// Throttle between worker operations in a sweep.
    #[serde(default = "default_inter_node_delay")]
    pub inter_node_delay: String,
    /// Wait after rewriting runtime config files.
    #[serde(default = "default_config_settle")]
    pub config_settle: String,
}

fn default_stop_timeout() -> String {
    "30s".to_string()
}
fn default_kill_settle() -> String {
    "2s".to_string()
}
fn default_startup_grace() -> String {
    "10s".to_string()
}
fn default_restart_delay() -> String {
    "5s".to_string()
}
fn default_inter_node_delay() -> String {
    "0s".to_string()
}
fn default_config_settle() -> String {
    "5s".to_string()
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            stop_timeout: default_stop_timeout(),
            kill_settle: default_kill_settle(),
            startup_grace: default_startup_grace(),
            restart_delay: default_restart_delay(),
            inter_node_delay: default_inter_node_delay(),
            config_settle: default_config_settle(),
        }
    }
}

/// `[tunable]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TunableSection {
    #[serde(default = "default_tunable_key")]
    pub key: String,

    /// Value restored by `reset-tunable`.
    #[serde(default)]
    pub normal_value: Option<String>,

    /// Smaller value written by the recovery workflow.
    #[serde(default)]
    pub retry_value: Option<String>,
}

fn default_tunable_key() -> String {
    "CHUNK_SIZE".to_string()
}

impl Default for TunableSection {
    fn default() -> Self {
        Self {
            key: default_tunable_key(),
            normal_value: None,
            retry_value: None,
        }
    }
}
