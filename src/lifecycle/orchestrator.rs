// src/lifecycle/orchestrator.rs

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::Local;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::errors::{FleetError, Result};
use crate::fleet::{for_each_node, FleetOutcome, Node, NodeRegistry, OrderPolicy};
use crate::fs::FileSystem;
use crate::process::{ProcessOps, ProcessTiming};
use crate::remote::{RemoteBackend, RemoteGateway};
use crate::retry::Cancellation;
use crate::tunable::{self, TunableEditor};
use crate::types::{FleetScope, LogCapture, NodeStatus, StopOutcome};

use super::status::NodeReport;

/// Drives lifecycle verbs across the fleet, one node at a time.
///
/// Owns its registry and settings; nothing is shared with other instances.
pub struct Orchestrator {
    registry: NodeRegistry,
    settings: Settings,
    ops: ProcessOps,
    editor: TunableEditor,
    cancel: Cancellation,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("nodes", &self.registry.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        registry: NodeRegistry,
        settings: Settings,
        backend: Arc<dyn RemoteBackend>,
        fs: Arc<dyn FileSystem>,
        cancel: Cancellation,
    ) -> Result<Self> {
        let editor = TunableEditor::new(&settings.tunable.key)?;
        let gateway = RemoteGateway::new(backend, settings.retry.transport, cancel.clone());
        let timing: ProcessTiming = settings.timing.process_timing();
        let ops = ProcessOps::new(gateway, fs, timing);
        Ok(Self {
            registry,
            settings,
            ops,
            editor,
            cancel,
        })
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn ops(&self) -> &ProcessOps {
        &self.ops
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    async fn sweep<'a, F, Fut>(&'a self, nodes: &[&'a Node], op: F) -> FleetOutcome
    where
        F: FnMut(&'a Node) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        for_each_node(
            nodes,
            OrderPolicy::AggregatorFirst,
            self.settings.timing.inter_node_delay,
            &self.cancel,
            op,
        )
        .await
    }

    fn cancelled(nodes: &[&Node]) -> FleetOutcome {
        let mut outcome = FleetOutcome::default();
        for node in nodes {
            outcome.fail(node, FleetError::Cancelled.to_string());
        }
        outcome
    }

    // ---------------------------------------------------------------------
    // Deploy
    // ---------------------------------------------------------------------

    /// Ship each node's image archive and load it, leaving the node with no
    /// container and the new image available.
    pub async fn deploy(&self, scope: FleetScope) -> FleetOutcome {
        info!(%scope, "deploying");
        let nodes = self.registry.select(scope);
        self.sweep(&nodes, |node| self.deploy_node(node)).await
    }

    async fn deploy_node(&self, node: &Node) -> Result<()> {
        let copied = if self.ops.fs().is_file(&node.artifact) {
            self.ops.copy_artifact(node).await
        } else {
            warn!(node = %node.id, artifact = ?node.artifact, "local artifact missing");
            Err(FleetError::Other(anyhow!(
                "local artifact {} does not exist",
                node.artifact.display()
            )))
        };
        if copied.as_ref().is_err_and(FleetError::is_cancelled) {
            return Err(FleetError::Cancelled);
        }

        // The old container and image go away whether or not the new
        // artifact arrived.
        self.stop_and_remove(node).await?;
        self.ops.remove_image(node, &node.image).await?;

        let archive = copied?;
        self.ops.load_image(node, &archive).await?;

        if self.ops.image_present(node, &node.image).await? {
            info!(node = %node.id, image = %node.image, "image deployed");
            Ok(())
        } else {
            Err(FleetError::Convergence {
                node: node.id.clone(),
                what: format!("load of image {}", node.image),
                attempts: 1,
            })
        }
    }

    /// Stop and remove the container, escalating to a verified force kill
    /// when the graceful path leaves a zombie.
    async fn stop_and_remove(&self, node: &Node) -> Result<()> {
        let name = node.process_name.as_str();
        let stop = self.settings.retry.stop;
        match self
            .ops
            .stop_with_retry(node, name, stop.max_attempts(), stop.delay())
            .await?
        {
            StopOutcome::Converged => self.ops.remove_after_stop(node, name).await,
            StopOutcome::Zombie => {
                let kill = self.settings.retry.kill;
                self.ops
                    .force_kill_with_verify(node, name, kill.max_attempts(), kill.delay())
                    .await
            }
        }
    }

    // ---------------------------------------------------------------------
    // Start / stop / restart
    // ---------------------------------------------------------------------

    /// Start the aggregator, wait `startup_grace`, then start workers.
    ///
    /// A failed aggregator does not keep workers from being started; it is
    /// reported with the rest.
    pub async fn start(&self, scope: FleetScope) -> FleetOutcome {
        info!(%scope, "starting");
        let mut outcome = FleetOutcome::default();

        if scope.includes_aggregator() {
            let aggregator = [self.registry.aggregator()];
            outcome.merge(self.sweep(&aggregator, |node| self.start_node(node)).await);

            if scope.includes_workers() {
                let grace = self.settings.timing.startup_grace;
                info!(grace_ms = grace.as_millis() as u64, "waiting for aggregator before starting workers");
                if self.cancel.sleep(grace).await.is_err() {
                    let workers: Vec<&Node> = self.registry.workers().iter().collect();
                    outcome.merge(Self::cancelled(&workers));
                    return outcome;
                }
            }
        }

        if scope.includes_workers() {
            let workers: Vec<&Node> = self.registry.workers().iter().collect();
            outcome.merge(self.sweep(&workers, |node| self.start_node(node)).await);
        }
        outcome
    }

    async fn start_node(&self, node: &Node) -> Result<()> {
        self.ops
            .start(node, &node.process_name, &node.runtime_config)
            .await
    }

    /// Graceful stop, optionally capturing logs first.
    pub async fn stop(&self, scope: FleetScope, capture_logs: bool) -> FleetOutcome {
        info!(%scope, capture_logs, "stopping");
        let nodes = self.registry.select(scope);
        self.sweep(&nodes, |node| self.stop_node(node, capture_logs))
            .await
    }

    async fn stop_node(&self, node: &Node, capture_logs: bool) -> Result<()> {
        let name = node.process_name.as_str();
        if capture_logs {
            match self.capture_node_logs(node, "stop").await {
                Ok(_) => {}
                Err(FleetError::Cancelled) => return Err(FleetError::Cancelled),
                Err(e) => warn!(node = %node.id, error = %e, "log capture failed; stopping anyway"),
            }
        }

        let stop = self.settings.retry.stop;
        match self
            .ops
            .stop_with_retry(node, name, stop.max_attempts(), stop.delay())
            .await?
        {
            StopOutcome::Converged => self.ops.remove_after_stop(node, name).await,
            StopOutcome::Zombie => Err(FleetError::Convergence {
                node: node.id.clone(),
                what: format!("stop of {name}"),
                attempts: stop.max_attempts(),
            }),
        }
    }

    /// Stop, wait `restart_delay`, start. A node that failed either half is
    /// reported failed.
    pub async fn restart(&self, scope: FleetScope, capture_logs: bool) -> FleetOutcome {
        let mut outcome = self.stop(scope, capture_logs).await;

        let delay = self.settings.timing.restart_delay;
        debug!(delay_ms = delay.as_millis() as u64, "waiting before start");
        if self.cancel.sleep(delay).await.is_err() {
            outcome.merge(Self::cancelled(&self.registry.select(scope)));
            return outcome;
        }

        outcome.merge(self.start(scope).await);
        outcome
    }

    // ---------------------------------------------------------------------
    // Force kill / cleanup / verification
    // ---------------------------------------------------------------------

    /// Kill and remove, verified by an independent existence check.
    pub async fn force_kill(&self, scope: FleetScope) -> FleetOutcome {
        info!(%scope, "force-killing");
        let nodes = self.registry.select(scope);
        self.sweep(&nodes, |node| self.force_kill_node(node)).await
    }

    async fn force_kill_node(&self, node: &Node) -> Result<()> {
        let kill = self.settings.retry.kill;
        self.ops
            .force_kill_with_verify(node, &node.process_name, kill.max_attempts(), kill.delay())
            .await
    }

    /// Force kill without diagnostics, to get a clean slate.
    pub async fn cleanup(&self, scope: FleetScope) -> FleetOutcome {
        info!(%scope, "cleaning up");
        self.force_kill(scope).await
    }

    /// Fails every node whose container still exists.
    pub async fn verify_absent(&self, scope: FleetScope) -> FleetOutcome {
        let nodes = self.registry.select(scope);
        self.sweep(&nodes, |node| async move {
            if self.ops.exists(node, &node.process_name).await? {
                Err(FleetError::Convergence {
                    node: node.id.clone(),
                    what: format!("removal of {}", node.process_name),
                    attempts: 1,
                })
            } else {
                Ok(())
            }
        })
        .await
    }

    // ---------------------------------------------------------------------
    // Status
    // ---------------------------------------------------------------------

    /// Probe every scoped node. Probe errors are reported as
    /// `CONNECTION-FAILED`, never as absent.
    pub async fn status(&self, scope: FleetScope) -> Vec<NodeReport> {
        let mut reports = Vec::new();
        for node in self.registry.select(scope) {
            let report = match self.probe(node).await {
                Ok(status) => NodeReport::new(node, status, None),
                Err(e) => {
                    warn!(node = %node.id, error = %e, "status probe failed");
                    NodeReport::new(node, NodeStatus::ConnectionFailed, Some(e.to_string()))
                }
            };
            reports.push(report);
        }
        reports
    }

    async fn probe(&self, node: &Node) -> Result<NodeStatus> {
        let name = node.process_name.as_str();
        if self.ops.is_running(node, name).await? {
            return Ok(NodeStatus::Running);
        }
        if self.ops.exists(node, name).await? {
            Ok(NodeStatus::StoppedButExists)
        } else {
            Ok(NodeStatus::Absent)
        }
    }

    // ---------------------------------------------------------------------
    // Logs
    // ---------------------------------------------------------------------

    /// Save the logs of every scoped node tagged with `reason`. Absent
    /// containers are skipped, not failed.
    pub async fn capture_logs(&self, scope: FleetScope, reason: &str) -> FleetOutcome {
        let nodes = self.registry.select(scope);
        self.sweep(&nodes, |node| async move {
            self.capture_node_logs(node, reason).await.map(|_| ())
        })
        .await
    }

    async fn capture_node_logs(&self, node: &Node, reason: &str) -> Result<LogCapture> {
        let path = self.log_path(node, reason);
        self.ops
            .save_logs(node, &node.process_name, &path)
            .await
    }

    /// `<log_dir>/<node>-<reason>-<YYYYmmdd-HHMMSS>.log`
    pub fn log_path(&self, node: &Node, reason: &str) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        self.settings
            .log_dir
            .join(format!("{}-{}-{}.log", node.id, reason, stamp))
    }

    // ---------------------------------------------------------------------
    // Tunable
    // ---------------------------------------------------------------------

    /// Write `value` for the tunable into every scoped node's runtime
    /// configuration file.
    pub async fn set_tunable(&self, scope: FleetScope, value: &str) -> FleetOutcome {
        info!(%scope, key = self.editor.key(), value, "setting tunable");
        let nodes = self.registry.select(scope);
        self.sweep(&nodes, |node| async move {
            tunable::set_on_node(self.ops.gateway(), node, &self.editor, value)
                .await
                .map(|_| ())
        })
        .await
    }

    /// Restore the configured normal value of the tunable.
    pub async fn reset_tunable(&self, scope: FleetScope) -> Result<FleetOutcome> {
        let value = self.settings.tunable.normal_value.as_deref().ok_or_else(|| {
            FleetError::ConfigError("[tunable].normal_value is not configured".to_string())
        })?;
        Ok(self.set_tunable(scope, value).await)
    }
}
