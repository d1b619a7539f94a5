// src/remote/backend.rs

//! Pluggable transport backend abstraction.
//!
//! The gateway talks to a `RemoteBackend` instead of spawning `ssh` itself.
//! Production code uses [`SshBackend`]; tests provide an in-memory fleet that
//! interprets the same commands without touching the network.
//!
//! A backend reports two very different kinds of failure:
//! - `Err(TransportError)`: the node could not be reached or the connection
//!   dropped. The gateway may retry these.
//! - `Ok(CommandOutput)` with a non-zero exit code: the command ran and
//!   failed. This is returned as-is.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::fleet::Node;
use crate::process::parse::scp_failure_is_transport;

use super::command::{CommandOutput, RemoteCommand};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Connection-level failure: nothing is known about the remote side.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct TransportError {
    pub reason: String,
}

impl TransportError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Trait abstracting how commands reach a node.
pub trait RemoteBackend: Send + Sync {
    /// Run `command` on `node` once. No retries.
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        command: &'a RemoteCommand,
    ) -> BoxFuture<'a, Result<CommandOutput, TransportError>>;

    /// Copy a local file to `remote_path` on `node` once. No retries.
    fn copy<'a>(
        &'a self,
        local: &'a Path,
        node: &'a Node,
        remote_path: &'a str,
    ) -> BoxFuture<'a, Result<CommandOutput, TransportError>>;
}

/// ssh's own exit status for connection errors.
const SSH_TRANSPORT_EXIT: i32 = 255;

/// SSH connection options shared by every node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOptions {
    /// Client binaries, looked up on `PATH` unless absolute.
    pub ssh_program: PathBuf,
    pub scp_program: PathBuf,
    pub connect_timeout: Duration,
    /// Reuse one master connection per node (`ControlMaster=auto`).
    pub multiplex: bool,
    pub control_dir: PathBuf,
    pub control_persist: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            ssh_program: PathBuf::from("ssh"),
            scp_program: PathBuf::from("scp"),
            connect_timeout: Duration::from_secs(10),
            multiplex: true,
            control_dir: std::env::temp_dir().join("fleetctl-ssh"),
            control_persist: Duration::from_secs(60),
        }
    }
}

/// Real backend: `ssh` for commands, `scp` for copies.
#[derive(Debug, Clone, Default)]
pub struct SshBackend {
    options: SshOptions,
}

impl SshBackend {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    /// `-o` options common to ssh and scp.
    fn common_args(&self, node: &Node) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!(
                "ConnectTimeout={}",
                self.options.connect_timeout.as_secs().max(1)
            ),
        ];
        if self.options.multiplex {
            let control_path = self.options.control_dir.join("%r@%h:%p");
            args.extend([
                "-o".to_string(),
                "ControlMaster=auto".to_string(),
                "-o".to_string(),
                format!("ControlPath={}", control_path.display()),
                "-o".to_string(),
                format!("ControlPersist={}", self.options.control_persist.as_secs()),
            ]);
        }
        if let Some(ref key) = node.identity_file {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args
    }

    async fn ensure_control_dir(&self) -> anyhow::Result<()> {
        if self.options.multiplex {
            tokio::fs::create_dir_all(&self.options.control_dir)
                .await
                .with_context(|| {
                    format!("creating ssh control dir {:?}", self.options.control_dir)
                })?;
        }
        Ok(())
    }

    async fn run_ssh(
        &self,
        node: &Node,
        command: &RemoteCommand,
    ) -> Result<CommandOutput, TransportError> {
        self.ensure_control_dir()
            .await
            .map_err(|e| TransportError::new(format!("{e:#}")))?;

        let line = command.to_shell_line();
        let mut cmd = Command::new(&self.options.ssh_program);
        cmd.args(self.common_args(node))
            .arg("-p")
            .arg(node.port.to_string())
            .arg(node.destination())
            .arg("--")
            .arg(&line)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if command.stdin_bytes().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        trace!(node = %node.id, cmd = %line, "spawning ssh");

        let mut child = cmd
            .spawn()
            .map_err(|e| TransportError::new(format!("spawning ssh: {e}")))?;

        // Feed stdin concurrently so a chatty remote command cannot fill the
        // stdout pipe while we are still writing.
        let writer = match (command.stdin_bytes(), child.stdin.take()) {
            (Some(bytes), Some(mut stdin)) => {
                let bytes = bytes.to_vec();
                Some(tokio::spawn(async move {
                    stdin.write_all(&bytes).await?;
                    stdin.shutdown().await
                }))
            }
            _ => None,
        };

        let out = child
            .wait_with_output()
            .await
            .map_err(|e| TransportError::new(format!("waiting for ssh: {e}")))?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(TransportError::new(format!("writing ssh stdin: {e}")));
                }
                Err(e) => {
                    return Err(TransportError::new(format!("stdin writer task failed: {e}")));
                }
            }
        }

        let output = captured(&out);
        if output.exit_code == SSH_TRANSPORT_EXIT || out.status.code().is_none() {
            return Err(TransportError::new(format!(
                "ssh to {} exited with {}: {}",
                node.destination(),
                output.exit_code,
                output.stderr.trim()
            )));
        }

        debug!(node = %node.id, exit_code = output.exit_code, "remote command finished");
        Ok(output)
    }

    async fn run_scp(
        &self,
        local: &Path,
        node: &Node,
        remote_path: &str,
    ) -> Result<CommandOutput, TransportError> {
        self.ensure_control_dir()
            .await
            .map_err(|e| TransportError::new(format!("{e:#}")))?;

        let target = format!("{}:{}", node.destination(), remote_path);
        let out = Command::new(&self.options.scp_program)
            .args(self.common_args(node))
            .arg("-P")
            .arg(node.port.to_string())
            .arg(local)
            .arg(&target)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TransportError::new(format!("spawning scp: {e}")))?;

        let output = captured(&out);
        if !output.success() && scp_failure_is_transport(&output.stderr) {
            return Err(TransportError::new(format!(
                "scp to {target} failed: {}",
                output.stderr.trim()
            )));
        }
        Ok(output)
    }
}

/// Exit code and both streams of a finished ssh/scp child; -1 when it was
/// killed by a signal.
fn captured(out: &std::process::Output) -> CommandOutput {
    CommandOutput::new(
        out.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr),
    )
}

impl RemoteBackend for SshBackend {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        command: &'a RemoteCommand,
    ) -> BoxFuture<'a, Result<CommandOutput, TransportError>> {
        Box::pin(self.run_ssh(node, command))
    }

    fn copy<'a>(
        &'a self,
        local: &'a Path,
        node: &'a Node,
        remote_path: &'a str,
    ) -> BoxFuture<'a, Result<CommandOutput, TransportError>> {
        Box::pin(self.run_scp(local, node, remote_path))
    }
}
