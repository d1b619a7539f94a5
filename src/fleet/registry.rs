// src/fleet/registry.rs

//! Static description of the fleet.
//!
//! A [`NodeRegistry`] is built once from configuration and handed to the
//! orchestrator by value. Nothing in the crate mutates it afterwards.

use std::path::PathBuf;

use crate::types::{FleetScope, Role};

/// Resource isolation and mount parameters passed to `docker run`.
///
/// These come straight from configuration and are opaque to the lifecycle
/// logic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub cpuset_cpus: Option<String>,
    pub cpuset_mems: Option<String>,
    pub devices: Vec<String>,
    pub gpus: Option<String>,
    /// `host:container[:mode]` bind mounts.
    pub mounts: Vec<String>,
    /// `KEY=value` environment entries.
    pub env: Vec<String>,
    pub network: Option<String>,
    /// Path inside the container where the runtime config file is mounted.
    pub config_mount: String,
    pub extra_args: Vec<String>,
}

/// One addressable machine in the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Stable identifier: `aggregator` or `worker-<index>`.
    pub id: String,
    pub role: Role,
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<PathBuf>,
    /// Remote working directory; artifacts and the runtime config live here.
    pub remote_dir: String,
    /// Container name, fixed per role.
    pub process_name: String,
    pub image: String,
    /// Local path of the image archive shipped by `deploy`.
    pub artifact: PathBuf,
    /// Remote path of the runtime configuration file.
    pub runtime_config: String,
    pub worker_index: Option<usize>,
    pub run: RunOptions,
}

impl Node {
    /// `user@host` as understood by ssh/scp.
    pub fn destination(&self) -> String {
        if self.user.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.user, self.host)
        }
    }

    /// Remote path of the artifact once copied to the node.
    pub fn remote_artifact_path(&self) -> String {
        let file_name = self
            .artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.tar", self.process_name));
        join_remote(&self.remote_dir, &file_name)
    }

    pub fn is_aggregator(&self) -> bool {
        self.role == Role::Aggregator
    }
}

/// Join a file name onto a remote (always POSIX) directory.
pub fn join_remote(dir: &str, file: &str) -> String {
    if file.starts_with('/') {
        return file.to_string();
    }
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{dir}/{file}")
    }
}

/// The aggregator plus every worker, in registry order.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    aggregator: Node,
    workers: Vec<Node>,
}

impl NodeRegistry {
    pub fn new(aggregator: Node, workers: Vec<Node>) -> Self {
        Self {
            aggregator,
            workers,
        }
    }

    pub fn aggregator(&self) -> &Node {
        &self.aggregator
    }

    pub fn workers(&self) -> &[Node] {
        &self.workers
    }

    /// Nodes covered by `scope`, aggregator first.
    pub fn select(&self, scope: FleetScope) -> Vec<&Node> {
        let mut nodes = Vec::with_capacity(self.workers.len() + 1);
        if scope.includes_aggregator() {
            nodes.push(&self.aggregator);
        }
        if scope.includes_workers() {
            nodes.extend(self.workers.iter());
        }
        nodes
    }

    pub fn all(&self) -> Vec<&Node> {
        self.select(FleetScope::All)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.all().into_iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.workers.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
