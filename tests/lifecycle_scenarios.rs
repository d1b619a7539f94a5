// tests/lifecycle_scenarios.rs

use std::sync::Arc;
use std::time::Duration;

use fleetctl::config::TimingSettings;
use fleetctl::fs::mock::MockFileSystem;
use fleetctl::lifecycle::{render_status_table, Orchestrator};
use fleetctl::retry::Cancellation;
use fleetctl::types::{FleetScope, NodeStatus};
use fleetctl_test_utils::builders::RUNTIME_CONFIG;
use fleetctl_test_utils::{init_tracing, FakeFleet, FleetBuilder};

#[tokio::test]
async fn test_normal_restart() {
    init_tracing();
    let h = FleetBuilder::new(2).harness();
    h.fleet.run_all(h.registry());

    let outcome = h.orchestrator.restart(FleetScope::All, true).await;
    assert!(outcome.is_success(), "{outcome}");

    // Logs captured for every node, before its stop.
    let logs: Vec<String> = h
        .fs
        .file_paths()
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| p.starts_with("logs/"))
        .collect();
    assert_eq!(logs.len(), 3);
    for id in h.node_ids() {
        assert!(logs.iter().any(|p| p.starts_with(&format!("logs/{id}-stop-"))));
        let commands = h.fleet.commands_for(&id);
        let logs_at = commands.iter().position(|c| c.starts_with("docker logs")).unwrap();
        let stop_at = commands.iter().position(|c| c.starts_with("docker stop")).unwrap();
        assert!(logs_at < stop_at, "{id}: logs must be captured before stop");
    }

    // Every node reached absent before anything was started again.
    let journal = h.fleet.journal();
    let last_removal = journal
        .iter()
        .rposition(|e| e.line().starts_with("docker rm "))
        .unwrap();
    let first_run = journal
        .iter()
        .position(|e| e.starts_with(&["docker", "run"]))
        .unwrap();
    assert!(last_removal < first_run);

    let reports = h.orchestrator.status(FleetScope::All).await;
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.status == NodeStatus::Running));
}

#[tokio::test(start_paused = true)]
async fn test_workers_start_after_aggregator_and_grace_period() {
    let grace = Duration::from_secs(10);
    let h = FleetBuilder::new(3)
        .with_timing(TimingSettings {
            startup_grace: grace,
            ..TimingSettings::immediate()
        })
        .harness();

    let outcome = h.orchestrator.start(FleetScope::All).await;
    assert!(outcome.is_success(), "{outcome}");

    let runs: Vec<_> = h
        .fleet
        .journal()
        .into_iter()
        .filter(|e| e.starts_with(&["docker", "run"]))
        .collect();
    assert_eq!(runs.len(), 4);
    assert_eq!(runs[0].node, "aggregator");
    for worker_run in &runs[1..] {
        assert!(worker_run.node.starts_with("worker-"));
        assert!(worker_run.at >= runs[0].at + grace);
    }
}

#[tokio::test]
async fn test_workers_are_started_even_if_aggregator_fails() {
    let h = FleetBuilder::new(2).harness();
    h.fleet.with_node("aggregator", |n| n.start_fails = true);

    let outcome = h.orchestrator.start(FleetScope::All).await;

    assert_eq!(outcome.failed_ids(), ["aggregator"]);
    assert_eq!(outcome.succeeded, ["worker-0", "worker-1"]);
    assert_eq!(h.fleet.container("worker-1", "worker"), Some(true));
}

#[tokio::test]
async fn test_stop_reports_unreachable_node_and_stops_the_rest() {
    let h = FleetBuilder::new(2).harness();
    h.fleet.run_all(h.registry());
    h.fleet.set_unreachable("worker-0", true);

    let outcome = h.orchestrator.stop(FleetScope::All, false).await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.failed_ids(), ["worker-0"]);
    assert_eq!(outcome.succeeded, ["aggregator", "worker-1"]);
    assert_eq!(h.fleet.container("aggregator", "aggregator"), None);
    assert_eq!(h.fleet.container("worker-1", "worker"), None);
    assert!(outcome.into_result().is_err());
}

#[tokio::test]
async fn test_stop_fails_node_left_as_zombie() {
    let h = FleetBuilder::new(1).with_stop_retries(2).harness();
    h.fleet.run_all(h.registry());
    h.fleet.with_node("worker-0", |n| {
        n.zombie_stops = 100;
        n.stubborn_kills = 100;
    });

    let outcome = h.orchestrator.stop(FleetScope::All, false).await;

    assert_eq!(outcome.failed_ids(), ["worker-0"]);
    assert!(outcome.failed[0].error.contains("did not converge"));
    assert_eq!(h.fleet.count("worker-0", &["docker", "rm"]), 0);
}

#[tokio::test]
async fn test_scope_limits_the_nodes_touched() {
    let h = FleetBuilder::new(2).harness();
    h.fleet.run_all(h.registry());

    let outcome = h.orchestrator.stop(FleetScope::WorkersOnly, false).await;

    assert_eq!(outcome.succeeded, ["worker-0", "worker-1"]);
    assert!(h.fleet.commands_for("aggregator").is_empty());
    assert_eq!(h.fleet.container("aggregator", "aggregator"), Some(true));
}

#[tokio::test]
async fn test_deploy_leaves_node_absent_with_new_image() {
    let h = FleetBuilder::new(2).harness();
    h.fleet.run_all(h.registry());

    let outcome = h.orchestrator.deploy(FleetScope::All).await;
    assert!(outcome.is_success(), "{outcome}");

    for node in h.registry().all() {
        assert_eq!(h.fleet.container(&node.id, &node.process_name), None);
        assert!(h.fleet.has_image(&node.id, &node.image));
        assert!(h.fleet.file(&node.id, &node.remote_artifact_path()).is_some());

        let commands = h.fleet.commands_for(&node.id);
        let at = |prefix: &str| commands.iter().position(|c| c.starts_with(prefix)).unwrap();
        assert!(at("scp") < at("docker stop"));
        assert!(at("docker rmi") < at("docker load"));
        assert!(at("docker load") < at("docker image inspect"));
        assert!(!commands.iter().any(|c| c.starts_with("docker run")));
    }
}

#[tokio::test]
async fn test_deploy_removes_old_process_even_without_artifact() {
    let builder = FleetBuilder::new(2);
    let registry = builder.registry();
    let fleet = FakeFleet::provisioned(&registry);
    fleet.run_all(&registry);
    let fs = MockFileSystem::new();
    fs.add_file("dist/aggregator.tar", "archive");

    let orchestrator = Orchestrator::new(
        registry,
        builder.settings(),
        Arc::new(fleet.clone()),
        Arc::new(fs),
        Cancellation::never(),
    )
    .unwrap();

    let outcome = orchestrator.deploy(FleetScope::All).await;

    assert_eq!(outcome.succeeded, ["aggregator"]);
    assert_eq!(outcome.failed_ids(), ["worker-0", "worker-1"]);
    for id in ["worker-0", "worker-1"] {
        assert_eq!(fleet.container(id, "worker"), None);
        assert!(!fleet.has_image(id, "fleet-worker:test"));
        assert_eq!(fleet.count(id, &["docker", "load"]), 0);
        assert_eq!(fleet.count(id, &["scp"]), 0);
    }
}

#[tokio::test]
async fn test_status_distinguishes_connection_failure_from_absent() {
    let h = FleetBuilder::new(3).harness();
    h.fleet.set_running("aggregator", "aggregator");
    h.fleet.set_stopped("worker-0", "worker");
    h.fleet.set_unreachable("worker-2", true);

    let reports = h.orchestrator.status(FleetScope::All).await;
    let statuses: Vec<NodeStatus> = reports.iter().map(|r| r.status).collect();

    assert_eq!(
        statuses,
        [
            NodeStatus::Running,
            NodeStatus::StoppedButExists,
            NodeStatus::Absent,
            NodeStatus::ConnectionFailed,
        ]
    );
    assert!(reports[3].detail.as_deref().unwrap().contains("Connection refused"));
    assert!(reports[2].detail.is_none());

    let table = render_status_table(&reports);
    assert!(table.contains("STOPPED-BUT-EXISTS"));
    assert!(table.contains("CONNECTION-FAILED"));
    assert_eq!(table.lines().count(), 5);
}

#[tokio::test]
async fn test_cleanup_converges_every_node() {
    let h = FleetBuilder::new(2).harness();
    h.fleet.run_all(h.registry());
    h.fleet.with_node("worker-1", |n| n.stubborn_kills = 1);

    let outcome = h.orchestrator.cleanup(FleetScope::All).await;
    assert!(outcome.is_success(), "{outcome}");
    assert!(h.orchestrator.verify_absent(FleetScope::All).await.is_success());
    assert!(h.fs.file_paths().iter().all(|p| !p.starts_with("logs")));
}

#[tokio::test]
async fn test_verify_absent_fails_present_nodes() {
    let h = FleetBuilder::new(2).harness();
    h.fleet.set_stopped("worker-1", "worker");

    let outcome = h.orchestrator.verify_absent(FleetScope::All).await;

    assert_eq!(outcome.failed_ids(), ["worker-1"]);
}

#[tokio::test]
async fn test_capture_logs_skips_absent_containers() {
    let h = FleetBuilder::new(2).harness();
    h.fleet.set_running("worker-0", "worker");

    let outcome = h.orchestrator.capture_logs(FleetScope::All, "manual").await;
    assert!(outcome.is_success());

    let logs: Vec<String> = h
        .fs
        .file_paths()
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| p.starts_with("logs/"))
        .collect();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with("logs/worker-0-manual-"));
    assert!(logs[0].ends_with(".log"));
}

#[tokio::test]
async fn test_set_and_reset_tunable() {
    let h = FleetBuilder::new(1).harness();
    h.fleet.put_file("worker-0", RUNTIME_CONFIG, "BATCH=8\nCHUNK_SIZE=64\n");

    let outcome = h.orchestrator.set_tunable(FleetScope::All, "16").await;
    assert!(outcome.is_success(), "{outcome}");
    assert_eq!(
        h.fleet.file("worker-0", RUNTIME_CONFIG).unwrap(),
        "BATCH=8\nCHUNK_SIZE=16\n"
    );
    assert_eq!(
        h.fleet.file("aggregator", RUNTIME_CONFIG).unwrap(),
        "# runtime configuration\nCHUNK_SIZE=16\n"
    );

    // Writing the same value again leaves the files alone.
    let tees = h.fleet.count("worker-0", &["tee"]);
    h.orchestrator.set_tunable(FleetScope::All, "16").await;
    assert_eq!(h.fleet.count("worker-0", &["tee"]), tees);

    let outcome = h.orchestrator.reset_tunable(FleetScope::All).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(
        h.fleet.file("worker-0", RUNTIME_CONFIG).unwrap(),
        "BATCH=8\nCHUNK_SIZE=64\n"
    );
}

#[tokio::test]
async fn test_reset_tunable_requires_normal_value() {
    let builder = FleetBuilder::new(1);
    let registry = builder.registry();
    let mut settings = builder.settings();
    settings.tunable.normal_value = None;
    let fleet = FakeFleet::provisioned(&registry);

    let orchestrator = Orchestrator::new(
        registry,
        settings,
        Arc::new(fleet.clone()),
        Arc::new(MockFileSystem::new()),
        Cancellation::never(),
    )
    .unwrap();

    assert!(orchestrator.reset_tunable(FleetScope::All).await.is_err());
    assert!(fleet.journal().is_empty());
}

#[tokio::test]
async fn test_missing_runtime_config_fails_the_node() {
    let h = FleetBuilder::new(1).harness();
    h.fleet.with_node("worker-0", |n| {
        n.files.remove(RUNTIME_CONFIG);
    });

    let outcome = h.orchestrator.set_tunable(FleetScope::All, "16").await;

    assert_eq!(outcome.failed_ids(), ["worker-0"]);
    assert_eq!(outcome.succeeded, ["aggregator"]);
}

#[test]
fn test_log_path_format() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");

    let path = h.orchestrator.log_path(&node, "retry");
    let name = path.file_name().unwrap().to_string_lossy().into_owned();

    assert!(path.starts_with("logs"));
    assert!(name.starts_with("worker-0-retry-"));
    assert!(name.ends_with(".log"));
    // YYYYmmdd-HHMMSS
    let stamp = &name["worker-0-retry-".len()..name.len() - ".log".len()];
    assert_eq!(stamp.len(), 15);
    assert_eq!(&stamp[8..9], "-");
}
