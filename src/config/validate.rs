// src/config/validate.rs

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{default_aggregator_process_name, NodeEntry, RawFleetConfig};
use crate::config::settings::{RetrySettings, Settings, TimingSettings, TunableSettings};
use crate::config::{parse_duration, FleetConfig};
use crate::errors::{FleetError, Result};
use crate::fleet::registry::join_remote;
use crate::fleet::{Node, NodeRegistry, RunOptions};
use crate::remote::SshOptions;
use crate::retry::RetryPolicy;
use crate::tunable::validate_key;
use crate::types::Role;

impl TryFrom<RawFleetConfig> for FleetConfig {
    type Error = FleetError;

    fn try_from(raw: RawFleetConfig) -> std::result::Result<Self, Self::Error> {
        ensure_has_workers(&raw)?;
        validate_hosts(&raw)?;
        validate_tunable(&raw)?;

        let registry = build_registry(&raw)?;
        let settings = build_settings(&raw)?;
        Ok(FleetConfig { registry, settings })
    }
}

fn ensure_has_workers(cfg: &RawFleetConfig) -> Result<()> {
    if cfg.worker.is_empty() {
        return Err(FleetError::ConfigError(
            "config must contain at least one [[worker]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_hosts(cfg: &RawFleetConfig) -> Result<()> {
    if cfg.aggregator.host.trim().is_empty() {
        return Err(FleetError::ConfigError(
            "[aggregator].host must not be empty".to_string(),
        ));
    }

    // Workers share one container name, so two workers on the same endpoint
    // would fight over the same container.
    let mut seen = HashSet::new();
    for (idx, worker) in cfg.worker.iter().enumerate() {
        if worker.host.trim().is_empty() {
            return Err(FleetError::ConfigError(format!(
                "[[worker]] #{idx} has an empty host"
            )));
        }
        if worker.process_name.is_some() {
            return Err(FleetError::ConfigError(format!(
                "[[worker]] #{idx} sets process_name; use [workers].process_name instead"
            )));
        }
        let port = worker.port.unwrap_or(cfg.ssh.port);
        if !seen.insert((worker.host.trim().to_string(), port)) {
            return Err(FleetError::ConfigError(format!(
                "worker endpoint {}:{} is listed more than once",
                worker.host, port
            )));
        }
    }
    Ok(())
}

fn validate_tunable(cfg: &RawFleetConfig) -> Result<()> {
    validate_key(&cfg.tunable.key)?;
    for (name, value) in [
        ("normal_value", &cfg.tunable.normal_value),
        ("retry_value", &cfg.tunable.retry_value),
    ] {
        if let Some(v) = value {
            if v.contains('\n') {
                return Err(FleetError::ConfigError(format!(
                    "[tunable].{name} must be a single line"
                )));
            }
        }
    }
    Ok(())
}

fn duration(section: &str, field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| FleetError::ConfigError(format!("[{section}].{field}: {e}")))
}

fn attempts(field: &str, value: u32) -> Result<u32> {
    if value == 0 {
        return Err(FleetError::ConfigError(format!(
            "[retry].{field} must be >= 1 (got 0)"
        )));
    }
    Ok(value)
}

/// Expand a leading `~/` using `$HOME`.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

fn build_registry(cfg: &RawFleetConfig) -> Result<NodeRegistry> {
    let agg = &cfg.aggregator;
    let aggregator = build_node(
        cfg,
        agg,
        Role::Aggregator,
        "aggregator".to_string(),
        None,
        agg.process_name
            .clone()
            .unwrap_or_else(default_aggregator_process_name),
        agg.image.clone(),
        agg.artifact.clone(),
    )?;

    let mut workers = Vec::with_capacity(cfg.worker.len());
    for (idx, entry) in cfg.worker.iter().enumerate() {
        workers.push(build_node(
            cfg,
            entry,
            Role::Worker,
            format!("worker-{idx}"),
            Some(idx),
            cfg.workers.process_name.clone(),
            entry.image.clone().or_else(|| cfg.workers.image.clone()),
            entry
                .artifact
                .clone()
                .or_else(|| cfg.workers.artifact.clone()),
        )?);
    }

    Ok(NodeRegistry::new(aggregator, workers))
}

#[allow(clippy::too_many_arguments)]
fn build_node(
    cfg: &RawFleetConfig,
    entry: &NodeEntry,
    role: Role,
    id: String,
    worker_index: Option<usize>,
    process_name: String,
    image: Option<String>,
    artifact: Option<String>,
) -> Result<Node> {
    let image = image.filter(|i| !i.trim().is_empty()).ok_or_else(|| {
        FleetError::ConfigError(format!("{id}: no image configured for role {role}"))
    })?;
    let artifact = artifact.filter(|a| !a.trim().is_empty()).ok_or_else(|| {
        FleetError::ConfigError(format!("{id}: no artifact configured for role {role}"))
    })?;

    let remote_dir = entry
        .remote_dir
        .clone()
        .unwrap_or_else(|| cfg.fleet.remote_dir.clone());
    let runtime_config = join_remote(&remote_dir, &cfg.fleet.runtime_config);

    let mut env = cfg.runtime.env.clone();
    env.extend(entry.env.iter().cloned());

    let run = RunOptions {
        cpuset_cpus: entry.cpuset_cpus.clone(),
        cpuset_mems: entry.cpuset_mems.clone(),
        devices: entry
            .devices
            .clone()
            .unwrap_or_else(|| cfg.runtime.devices.clone()),
        gpus: entry.gpus.clone().or_else(|| cfg.runtime.gpus.clone()),
        mounts: cfg.runtime.mounts.clone(),
        env,
        network: cfg.runtime.network.clone(),
        config_mount: cfg.runtime.config_mount.clone(),
        extra_args: cfg.runtime.extra_args.clone(),
    };

    Ok(Node {
        id,
        role,
        host: entry.host.trim().to_string(),
        user: entry.user.clone().unwrap_or_else(|| cfg.ssh.user.clone()),
        port: entry.port.unwrap_or(cfg.ssh.port),
        identity_file: entry
            .identity_file
            .as_deref()
            .or(cfg.ssh.identity_file.as_deref())
            .map(expand_home),
        remote_dir,
        process_name,
        image,
        artifact: PathBuf::from(artifact),
        runtime_config,
        worker_index,
        run,
    })
}

fn build_settings(cfg: &RawFleetConfig) -> Result<Settings> {
    let r = &cfg.retry;
    let retry = RetrySettings {
        transport: RetryPolicy::new(
            attempts("transport_attempts", r.transport_attempts)?,
            duration("retry", "transport_delay", &r.transport_delay)?,
        ),
        stop: RetryPolicy::new(
            attempts("stop_retries", r.stop_retries)?,
            duration("retry", "stop_delay", &r.stop_delay)?,
        ),
        kill: RetryPolicy::new(
            attempts("kill_retries", r.kill_retries)?,
            duration("retry", "kill_delay", &r.kill_delay)?,
        ),
        cleanup: RetryPolicy::new(
            attempts("cleanup_retries", r.cleanup_retries)?,
            duration("retry", "cleanup_delay", &r.cleanup_delay)?,
        ),
    };

    let t = &cfg.timing;
    let timing = TimingSettings {
        stop_timeout: duration("timing", "stop_timeout", &t.stop_timeout)?,
        kill_settle: duration("timing", "kill_settle", &t.kill_settle)?,
        startup_grace: duration("timing", "startup_grace", &t.startup_grace)?,
        restart_delay: duration("timing", "restart_delay", &t.restart_delay)?,
        inter_node_delay: duration("timing", "inter_node_delay", &t.inter_node_delay)?,
        config_settle: duration("timing", "config_settle", &t.config_settle)?,
    };

    let defaults = SshOptions::default();
    let ssh = SshOptions {
        ssh_program: cfg
            .ssh
            .ssh_program
            .as_deref()
            .map(expand_home)
            .unwrap_or(defaults.ssh_program),
        scp_program: cfg
            .ssh
            .scp_program
            .as_deref()
            .map(expand_home)
            .unwrap_or(defaults.scp_program),
        connect_timeout: duration("ssh", "connect_timeout", &cfg.ssh.connect_timeout)?,
        multiplex: cfg.ssh.multiplex,
        control_dir: cfg
            .ssh
            .control_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or(defaults.control_dir),
        control_persist: duration("ssh", "control_persist", &cfg.ssh.control_persist)?,
    };

    Ok(Settings {
        retry,
        timing,
        tunable: TunableSettings {
            key: cfg.tunable.key.clone(),
            normal_value: cfg.tunable.normal_value.clone(),
            retry_value: cfg.tunable.retry_value.clone(),
        },
        ssh,
        log_dir: PathBuf::from(&cfg.fleet.log_dir),
    })
}
