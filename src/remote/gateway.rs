// src/remote/gateway.rs

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{FleetError, Result};
use crate::fleet::Node;
use crate::retry::{Cancellation, RetryFailure, RetryPolicy};

use super::backend::{RemoteBackend, TransportError};
use super::command::{CommandOutput, RemoteCommand};

/// Executes commands on nodes, retrying transport failures only.
///
/// A command that reached the node and failed is returned immediately:
/// re-running it could repeat a destructive effect. The gateway itself keeps
/// no state beyond its configuration.
#[derive(Clone)]
pub struct RemoteGateway {
    backend: Arc<dyn RemoteBackend>,
    policy: RetryPolicy,
    cancel: Cancellation,
}

impl std::fmt::Debug for RemoteGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteGateway")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RemoteGateway {
    pub fn new(backend: Arc<dyn RemoteBackend>, policy: RetryPolicy, cancel: Cancellation) -> Self {
        Self {
            backend,
            policy,
            cancel,
        }
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    /// Run `command` on `node` and return its exit code and output.
    pub async fn execute(&self, node: &Node, command: &RemoteCommand) -> Result<CommandOutput> {
        debug!(node = %node.id, cmd = %command, "executing remote command");

        let result = self
            .policy
            .run(
                &self.cancel,
                |attempt| async move {
                    let out = tokio::select! {
                        _ = self.cancel.cancelled() => return Err(Interrupted::Cancelled),
                        out = self.backend.execute(node, command) => out,
                    };
                    out.map_err(|e| {
                        warn!(
                            node = %node.id,
                            attempt,
                            max_attempts = self.policy.max_attempts(),
                            error = %e,
                            "transport failure"
                        );
                        Interrupted::Transport(e)
                    })
                },
                Interrupted::is_transport,
            )
            .await;

        self.finish(node, result)
    }

    /// Like [`execute`](Self::execute), but a non-zero exit becomes
    /// [`FleetError::Command`].
    pub async fn execute_checked(
        &self,
        node: &Node,
        command: &RemoteCommand,
    ) -> Result<CommandOutput> {
        let out = self.execute(node, command).await?;
        if out.success() {
            Ok(out)
        } else {
            Err(command_failure(node, &command.to_shell_line(), &out))
        }
    }

    /// Copy a local file to `remote_path` on `node`.
    pub async fn copy(&self, local: &Path, node: &Node, remote_path: &str) -> Result<()> {
        debug!(node = %node.id, local = ?local, remote = remote_path, "copying file");

        let result = self
            .policy
            .run(
                &self.cancel,
                |attempt| async move {
                    let out = tokio::select! {
                        _ = self.cancel.cancelled() => return Err(Interrupted::Cancelled),
                        out = self.backend.copy(local, node, remote_path) => out,
                    };
                    out.map_err(|e| {
                        warn!(node = %node.id, attempt, error = %e, "transport failure during copy");
                        Interrupted::Transport(e)
                    })
                },
                Interrupted::is_transport,
            )
            .await;

        let out = self.finish(node, result)?;
        if out.success() {
            Ok(())
        } else {
            let what = format!("copy {} -> {}", local.display(), remote_path);
            Err(command_failure(node, &what, &out))
        }
    }

    fn finish(
        &self,
        node: &Node,
        result: std::result::Result<CommandOutput, RetryFailure<Interrupted>>,
    ) -> Result<CommandOutput> {
        match result {
            Ok(out) => Ok(out),
            Err(RetryFailure::Exhausted {
                attempts,
                last: Interrupted::Transport(e),
            }) => Err(FleetError::Transport {
                node: node.id.clone(),
                attempts,
                reason: e.reason,
            }),
            Err(RetryFailure::Cancelled)
            | Err(RetryFailure::Exhausted {
                last: Interrupted::Cancelled,
                ..
            })
            | Err(RetryFailure::Fatal {
                error: Interrupted::Cancelled,
                ..
            }) => Err(FleetError::Cancelled),
            Err(RetryFailure::Fatal {
                attempt,
                error: Interrupted::Transport(e),
            }) => Err(FleetError::Transport {
                node: node.id.clone(),
                attempts: attempt,
                reason: e.reason,
            }),
        }
    }
}

/// Why a single gateway attempt did not produce output.
#[derive(Debug)]
enum Interrupted {
    Transport(TransportError),
    Cancelled,
}

impl Interrupted {
    fn is_transport(&self) -> bool {
        matches!(self, Interrupted::Transport(_))
    }
}

pub(crate) fn command_failure(node: &Node, command: &str, out: &CommandOutput) -> FleetError {
    FleetError::Command {
        node: node.id.clone(),
        command: command.to_string(),
        exit_code: out.exit_code,
        output: out.text(),
    }
}
