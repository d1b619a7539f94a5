#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fleetctl::config::{RetrySettings, Settings, TimingSettings, TunableSettings};
use fleetctl::fleet::{Node, NodeRegistry, RunOptions};
use fleetctl::fs::mock::MockFileSystem;
use fleetctl::lifecycle::Orchestrator;
use fleetctl::retry::{cancellation, CancelHandle, RetryPolicy};
use fleetctl::types::Role;

use crate::fake_fleet::FakeFleet;

pub const REMOTE_DIR: &str = "/opt/fleet";
pub const RUNTIME_CONFIG: &str = "/opt/fleet/runtime.env";
pub const LOG_DIR: &str = "logs";

/// Builder for a registry plus settings with no waiting anywhere.
pub struct FleetBuilder {
    workers: usize,
    settings: Settings,
}

impl FleetBuilder {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            settings: fast_settings(),
        }
    }

    pub fn with_transport_attempts(mut self, n: u32) -> Self {
        self.settings.retry.transport = RetryPolicy::new(n, Duration::ZERO);
        self
    }

    pub fn with_stop_retries(mut self, n: u32) -> Self {
        self.settings.retry.stop = RetryPolicy::new(n, Duration::ZERO);
        self
    }

    pub fn with_kill_retries(mut self, n: u32) -> Self {
        self.settings.retry.kill = RetryPolicy::new(n, Duration::ZERO);
        self
    }

    pub fn with_cleanup_retries(mut self, n: u32) -> Self {
        self.settings.retry.cleanup = RetryPolicy::new(n, Duration::ZERO);
        self
    }

    pub fn with_timing(mut self, timing: TimingSettings) -> Self {
        self.settings.timing = timing;
        self
    }

    pub fn with_tunable(mut self, key: &str, normal: &str, retry: &str) -> Self {
        self.settings.tunable = TunableSettings {
            key: key.to_string(),
            normal_value: Some(normal.to_string()),
            retry_value: Some(retry.to_string()),
        };
        self
    }

    pub fn registry(&self) -> NodeRegistry {
        let aggregator = node("aggregator", Role::Aggregator, None);
        let workers = (0..self.workers)
            .map(|i| node(&format!("worker-{i}"), Role::Worker, Some(i)))
            .collect();
        NodeRegistry::new(aggregator, workers)
    }

    pub fn settings(&self) -> Settings {
        self.settings.clone()
    }

    /// A provisioned fake fleet and an orchestrator wired to it.
    pub fn harness(self) -> FleetHarness {
        let registry = self.registry();
        let fleet = FakeFleet::provisioned(&registry);
        let fs = MockFileSystem::new();
        for node in registry.all() {
            fs.add_file(&node.artifact, "image archive");
        }
        let (cancel_handle, cancel) = cancellation();
        let orchestrator = Orchestrator::new(
            registry,
            self.settings,
            Arc::new(fleet.clone()),
            Arc::new(fs.clone()),
            cancel,
        )
        .expect("valid test settings");
        FleetHarness {
            fleet,
            fs,
            orchestrator,
            cancel_handle,
        }
    }
}

/// Everything a lifecycle test needs.
pub struct FleetHarness {
    pub fleet: FakeFleet,
    pub fs: MockFileSystem,
    pub orchestrator: Orchestrator,
    pub cancel_handle: CancelHandle,
}

impl FleetHarness {
    pub fn registry(&self) -> &NodeRegistry {
        self.orchestrator.registry()
    }

    pub fn node(&self, id: &str) -> Node {
        self.registry()
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("no node {id}"))
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.registry().all().iter().map(|n| n.id.clone()).collect()
    }
}

pub fn fast_settings() -> Settings {
    Settings {
        retry: RetrySettings {
            transport: RetryPolicy::new(3, Duration::ZERO),
            stop: RetryPolicy::new(5, Duration::ZERO),
            kill: RetryPolicy::new(3, Duration::ZERO),
            cleanup: RetryPolicy::new(3, Duration::ZERO),
        },
        timing: TimingSettings::immediate(),
        tunable: TunableSettings {
            key: "CHUNK_SIZE".to_string(),
            normal_value: Some("64".to_string()),
            retry_value: Some("16".to_string()),
        },
        ssh: Default::default(),
        log_dir: PathBuf::from(LOG_DIR),
    }
}

pub fn node(id: &str, role: Role, worker_index: Option<usize>) -> Node {
    let (process_name, image, artifact, last_octet) = match role {
        Role::Aggregator => ("aggregator", "fleet-aggregator:test", "dist/aggregator.tar", 10),
        Role::Worker => (
            "worker",
            "fleet-worker:test",
            "dist/worker.tar",
            11 + worker_index.unwrap_or(0),
        ),
    };
    Node {
        id: id.to_string(),
        role,
        host: format!("10.0.0.{last_octet}"),
        user: "fleet".to_string(),
        port: 22,
        identity_file: None,
        remote_dir: REMOTE_DIR.to_string(),
        process_name: process_name.to_string(),
        image: image.to_string(),
        artifact: PathBuf::from(artifact),
        runtime_config: RUNTIME_CONFIG.to_string(),
        worker_index,
        run: RunOptions {
            config_mount: "/app/runtime.env".to_string(),
            ..RunOptions::default()
        },
    }
}
