// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod fleet;
pub mod fs;
pub mod lifecycle;
pub mod logging;
pub mod process;
pub mod recovery;
pub mod remote;
pub mod retry;
pub mod tunable;
pub mod types;

pub use types::FleetScope;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::cli::{CliArgs, Verb};
use crate::config::{default_config_path, load_and_validate};
use crate::errors::FleetError;
use crate::fleet::FleetOutcome;
use crate::fs::RealFileSystem;
use crate::lifecycle::{render_status_table, Orchestrator};
use crate::recovery::ChunkRetryWorkflow;
use crate::remote::SshBackend;
use crate::retry::cancellation;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the SSH backend and orchestrator
/// - Ctrl-C handling
/// - the final status table
///
/// Returns `Ok(true)` when every targeted node reached the requested state.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = args
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    info!(
        config = %config_path.display(),
        workers = cfg.registry.workers().len(),
        "fleet loaded"
    );

    let (cancel_handle, cancel) = cancellation();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        warn!("interrupt received; cancelling");
        cancel_handle.cancel();
    });

    let backend = Arc::new(SshBackend::new(cfg.settings.ssh.clone()));
    let orchestrator = Orchestrator::new(
        cfg.registry,
        cfg.settings,
        backend,
        Arc::new(RealFileSystem),
        cancel,
    )?;

    let scope = args.scope;
    let ok = match &args.verb {
        Verb::Deploy => report(orchestrator.deploy(scope).await),
        Verb::Start => report(orchestrator.start(scope).await),
        Verb::Stop { save_logs } => report(orchestrator.stop(scope, *save_logs).await),
        Verb::ForceKill => report(orchestrator.force_kill(scope).await),
        Verb::Restart { save_logs } => report(orchestrator.restart(scope, *save_logs).await),
        Verb::Cleanup => report(orchestrator.cleanup(scope).await),
        Verb::Logs { reason } => report(orchestrator.capture_logs(scope, reason).await),
        Verb::ResetTunable { value } => match value {
            Some(v) => report(orchestrator.set_tunable(scope, v).await),
            None => report(orchestrator.reset_tunable(scope).await?),
        },
        Verb::Retry { value, attempts } => {
            if scope != FleetScope::All {
                warn!(%scope, "retry always applies to the whole fleet; ignoring --scope");
            }
            let value = value
                .clone()
                .or_else(|| orchestrator.settings().tunable.retry_value.clone())
                .ok_or_else(|| {
                    FleetError::ConfigError(
                        "no retry value: pass --value or set [tunable].retry_value".to_string(),
                    )
                })?;
            let mut workflow = ChunkRetryWorkflow::new(&orchestrator, value);
            if let Some(n) = attempts {
                workflow = workflow.with_attempts(*n);
            }
            let outcome = workflow.run().await;
            let phases: Vec<String> = outcome.phases.iter().map(|p| p.to_string()).collect();
            info!(phases = %phases.join(" -> "), "recovery trace");
            if let Some(reason) = &outcome.failure {
                error!(reason = %reason, "recovery failed");
            }
            outcome.succeeded()
        }
        // Status has nothing to do beyond the table printed below.
        Verb::Status => true,
    };

    let status_scope = match args.verb {
        Verb::Retry { .. } => FleetScope::All,
        _ => scope,
    };
    let reports = orchestrator.status(status_scope).await;
    print!("{}", render_status_table(&reports));

    let status_ok = match args.verb {
        Verb::Status => reports
            .iter()
            .all(|r| r.status != types::NodeStatus::ConnectionFailed),
        _ => true,
    };
    Ok(ok && status_ok)
}

fn report(outcome: FleetOutcome) -> bool {
    if outcome.is_success() {
        info!(%outcome, "all nodes succeeded");
    } else {
        error!(%outcome, "some nodes failed");
    }
    outcome.is_success()
}
