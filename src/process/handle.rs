// src/process/handle.rs

//! Primitive operations on one node's managed container.
//!
//! Every operation here is idempotent: when its target state already holds
//! (stopping an absent container, removing a removed one) it reports
//! success. Transport failures propagate as gateway errors.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::{FleetError, Result};
use crate::fleet::Node;
use crate::fs::FileSystem;
use crate::remote::gateway::command_failure;
use crate::remote::RemoteGateway;
use crate::retry::{RetryFailure, RetryPolicy};
use crate::types::{LogCapture, ProcessState, StopOutcome};

use super::docker;
use super::parse::{classify_stop, is_missing_object, parse_state, StopReport};

/// Fixed waits used by the stop and kill paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTiming {
    /// Grace period handed to `docker stop -t`.
    pub stop_timeout: Duration,
    /// Wait after a kill or forced removal before looking again.
    pub kill_settle: Duration,
}

impl Default for ProcessTiming {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(30),
            kill_settle: Duration::from_secs(2),
        }
    }
}

/// Outcome of one graceful stop attempt.
#[derive(Debug)]
enum StopAttempt {
    Zombie,
    Failed(FleetError),
}

/// Outcome of one kill + remove + verify cycle.
#[derive(Debug)]
enum KillAttempt {
    StillPresent,
    Failed(FleetError),
}

#[derive(Clone)]
pub struct ProcessOps {
    gateway: RemoteGateway,
    fs: Arc<dyn FileSystem>,
    timing: ProcessTiming,
}

impl std::fmt::Debug for ProcessOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessOps")
            .field("gateway", &self.gateway)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl ProcessOps {
    pub fn new(gateway: RemoteGateway, fs: Arc<dyn FileSystem>, timing: ProcessTiming) -> Self {
        Self { gateway, fs, timing }
    }

    pub fn gateway(&self) -> &RemoteGateway {
        &self.gateway
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    async fn settle(&self) -> Result<()> {
        self.gateway
            .cancellation()
            .sleep(self.timing.kill_settle)
            .await
    }

    /// Query the container's current state.
    pub async fn state(&self, node: &Node, name: &str) -> Result<ProcessState> {
        let cmd = docker::inspect_running(name);
        let out = self.gateway.execute(node, &cmd).await?;
        parse_state(&out).ok_or_else(|| command_failure(node, &cmd.to_shell_line(), &out))
    }

    /// True if the runtime knows the container, running or not.
    pub async fn exists(&self, node: &Node, name: &str) -> Result<bool> {
        Ok(self.state(node, name).await?.exists())
    }

    pub async fn is_running(&self, node: &Node, name: &str) -> Result<bool> {
        Ok(self.state(node, name).await? == ProcessState::Running)
    }

    /// Graceful stop, retried while the runtime reports a zombie.
    ///
    /// When every attempt ends in a zombie report, a single `SIGKILL` is sent
    /// and the result depends on whether the container is still running
    /// after `kill_settle`.
    pub async fn stop_with_retry(
        &self,
        node: &Node,
        name: &str,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<StopOutcome> {
        if !self.exists(node, name).await? {
            debug!(node = %node.id, container = name, "container absent; nothing to stop");
            return Ok(StopOutcome::Converged);
        }

        let policy = RetryPolicy::new(max_retries, retry_delay);
        let cmd = docker::stop(name, self.timing.stop_timeout);
        let cmd = &cmd;

        let result = policy
            .run(
                self.gateway.cancellation(),
                |attempt| {
                    async move {
                        info!(
                            node = %node.id,
                            container = name,
                            attempt,
                            max_attempts = policy.max_attempts(),
                            "stopping container"
                        );
                        let out = self
                            .gateway
                            .execute(node, cmd)
                            .await
                            .map_err(StopAttempt::Failed)?;
                        match classify_stop(&out) {
                            StopReport::Stopped | StopReport::AlreadyAbsent => Ok(()),
                            StopReport::Zombie => {
                                warn!(
                                    node = %node.id,
                                    container = name,
                                    attempt,
                                    "container did not honour stop (zombie)"
                                );
                                Err(StopAttempt::Zombie)
                            }
                            StopReport::Failed => Err(StopAttempt::Failed(command_failure(
                                node,
                                &cmd.to_shell_line(),
                                &out,
                            ))),
                        }
                    }
                },
                |e| matches!(e, StopAttempt::Zombie),
            )
            .await;

        match result {
            Ok(()) => Ok(StopOutcome::Converged),
            Err(RetryFailure::Fatal {
                error: StopAttempt::Failed(e),
                ..
            }) => Err(e),
            Err(RetryFailure::Cancelled) => Err(FleetError::Cancelled),
            Err(RetryFailure::Exhausted { attempts, .. })
            | Err(RetryFailure::Fatal { attempt: attempts, .. }) => {
                warn!(
                    node = %node.id,
                    container = name,
                    attempts,
                    "stop retries exhausted; escalating to SIGKILL"
                );
                self.send_kill(node, name).await?;
                self.settle().await?;
                if self.is_running(node, name).await? {
                    warn!(node = %node.id, container = name, "container still running after SIGKILL");
                    Ok(StopOutcome::Zombie)
                } else {
                    Ok(StopOutcome::Converged)
                }
            }
        }
    }

    /// Remove a stopped container. Already removed is fine.
    pub async fn remove_after_stop(&self, node: &Node, name: &str) -> Result<()> {
        let cmd = docker::remove(name);
        let out = self.gateway.execute(node, &cmd).await?;
        if out.success() || is_missing_object(&out) {
            debug!(node = %node.id, container = name, "container removed");
            Ok(())
        } else {
            Err(command_failure(node, &cmd.to_shell_line(), &out))
        }
    }

    /// Kill, force-remove and independently verify absence, retrying the
    /// whole cycle.
    ///
    /// The final existence check is what decides success; a kill or remove
    /// command reporting success proves nothing on its own.
    pub async fn force_kill_with_verify(
        &self,
        node: &Node,
        name: &str,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<()> {
        if !self.exists(node, name).await? {
            debug!(node = %node.id, container = name, "container absent; nothing to kill");
            return Ok(());
        }

        let policy = RetryPolicy::new(max_retries, retry_delay);
        let result = policy
            .run(
                self.gateway.cancellation(),
                |attempt| async move {
                    info!(
                        node = %node.id,
                        container = name,
                        attempt,
                        max_attempts = policy.max_attempts(),
                        "force-killing container"
                    );
                    self.kill_and_remove(node, name)
                        .await
                        .map_err(KillAttempt::Failed)?;
                    if self
                        .exists(node, name)
                        .await
                        .map_err(KillAttempt::Failed)?
                    {
                        warn!(node = %node.id, container = name, attempt, "container still present after force kill");
                        Err(KillAttempt::StillPresent)
                    } else {
                        Ok(())
                    }
                },
                |e| matches!(e, KillAttempt::StillPresent),
            )
            .await;

        match result {
            Ok(()) => {
                info!(node = %node.id, container = name, "container verified absent");
                Ok(())
            }
            Err(RetryFailure::Fatal {
                error: KillAttempt::Failed(e),
                ..
            }) => Err(e),
            Err(RetryFailure::Cancelled) => Err(FleetError::Cancelled),
            Err(RetryFailure::Exhausted { attempts, .. })
            | Err(RetryFailure::Fatal { attempt: attempts, .. }) => Err(FleetError::Convergence {
                node: node.id.clone(),
                what: format!("force kill of {name}"),
                attempts,
            }),
        }
    }

    async fn send_kill(&self, node: &Node, name: &str) -> Result<()> {
        let out = self.gateway.execute(node, &docker::kill(name)).await?;
        if !out.success() && !is_missing_object(&out) {
            warn!(node = %node.id, container = name, output = %out.text(), "kill reported failure");
        }
        Ok(())
    }

    async fn kill_and_remove(&self, node: &Node, name: &str) -> Result<()> {
        self.send_kill(node, name).await?;
        self.settle().await?;
        let out = self
            .gateway
            .execute(node, &docker::force_remove(name))
            .await?;
        if !out.success() && !is_missing_object(&out) {
            warn!(node = %node.id, container = name, output = %out.text(), "forced removal reported failure");
        }
        self.settle().await
    }

    /// Write the container's accumulated output to `destination`.
    ///
    /// A container that is already gone, including one that disappears
    /// between the existence check and the capture, yields `Skipped`.
    pub async fn save_logs(
        &self,
        node: &Node,
        name: &str,
        destination: &Path,
    ) -> Result<LogCapture> {
        if !self.exists(node, name).await? {
            debug!(node = %node.id, container = name, "container absent; skipping log capture");
            return Ok(LogCapture::Skipped);
        }

        let cmd = docker::logs(name);
        let out = self.gateway.execute(node, &cmd).await?;
        if is_missing_object(&out) {
            debug!(node = %node.id, container = name, "container vanished before log capture");
            return Ok(LogCapture::Skipped);
        }
        if !out.success() {
            return Err(command_failure(node, &cmd.to_shell_line(), &out));
        }

        // `docker logs` replays the container's stderr on stderr.
        let mut captured = out.stdout.into_bytes();
        captured.extend_from_slice(out.stderr.as_bytes());
        self.fs.write(destination, &captured)?;
        info!(node = %node.id, container = name, path = ?destination, "logs saved");
        Ok(LogCapture::Saved(destination.to_path_buf()))
    }

    /// Launch the container bound to `config_file`.
    ///
    /// Already running counts as success; a stopped leftover is removed so
    /// the new container picks up the current configuration.
    pub async fn start(&self, node: &Node, name: &str, config_file: &str) -> Result<()> {
        match self.state(node, name).await? {
            ProcessState::Running => {
                info!(node = %node.id, container = name, "container already running");
                return Ok(());
            }
            ProcessState::Stopped => {
                debug!(node = %node.id, container = name, "removing stopped container before start");
                self.remove_after_stop(node, name).await?;
            }
            ProcessState::Absent => {}
        }

        info!(node = %node.id, container = name, image = %node.image, "starting container");
        self.gateway
            .execute_checked(node, &docker::run(node, name, config_file))
            .await?;

        if self.is_running(node, name).await? {
            Ok(())
        } else {
            Err(FleetError::Convergence {
                node: node.id.clone(),
                what: format!("start of {name}"),
                attempts: 1,
            })
        }
    }

    /// Copy the node's local artifact into its remote working directory.
    pub async fn copy_artifact(&self, node: &Node) -> Result<String> {
        self.gateway
            .execute_checked(node, &docker::make_dir(&node.remote_dir))
            .await?;
        let remote = node.remote_artifact_path();
        self.gateway.copy(&node.artifact, node, &remote).await?;
        Ok(remote)
    }

    pub async fn load_image(&self, node: &Node, archive: &str) -> Result<()> {
        info!(node = %node.id, archive, "loading image");
        self.gateway
            .execute_checked(node, &docker::load_image(archive))
            .await
            .map(|_| ())
    }

    pub async fn image_present(&self, node: &Node, image: &str) -> Result<bool> {
        let cmd = docker::inspect_image(image);
        let out = self.gateway.execute(node, &cmd).await?;
        if out.success() {
            Ok(true)
        } else if is_missing_object(&out) {
            Ok(false)
        } else {
            Err(command_failure(node, &cmd.to_shell_line(), &out))
        }
    }

    /// Remove an image. Any command failure is only a warning.
    pub async fn remove_image(&self, node: &Node, image: &str) -> Result<()> {
        let out = self
            .gateway
            .execute(node, &docker::remove_image(image))
            .await?;
        if !out.success() {
            if is_missing_object(&out) {
                debug!(node = %node.id, image, "image not present; nothing to remove");
            } else {
                warn!(node = %node.id, image, output = %out.text(), "failed to remove image; continuing");
            }
        }
        Ok(())
    }
}
