// tests/process_handle_ops.rs

use std::path::Path;
use std::time::Duration;

use fleetctl::errors::FleetError;
use fleetctl::fs::FileSystem;
use fleetctl::types::{LogCapture, StopOutcome};
use fleetctl_test_utils::{init_tracing, FleetBuilder};

const WORKER: &str = "worker";

#[tokio::test]
async fn test_zombie_stop_succeeds_on_third_attempt_without_kill() {
    init_tracing();
    let h = FleetBuilder::new(2).harness();
    let node = h.node("worker-0");
    h.fleet.set_running(&node.id, WORKER);
    h.fleet.with_node(&node.id, |n| n.zombie_stops = 2);

    let outcome = h
        .orchestrator
        .ops()
        .stop_with_retry(&node, WORKER, 5, Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(outcome, StopOutcome::Converged);
    assert_eq!(h.fleet.count(&node.id, &["docker", "stop"]), 3);
    assert_eq!(h.fleet.count(&node.id, &["docker", "kill"]), 0);
    assert_eq!(h.fleet.container(&node.id, WORKER), Some(false));
}

#[tokio::test]
async fn test_exhausted_zombie_stop_escalates_to_single_kill() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");
    h.fleet.set_running(&node.id, WORKER);
    h.fleet.with_node(&node.id, |n| n.zombie_stops = 100);

    let outcome = h
        .orchestrator
        .ops()
        .stop_with_retry(&node, WORKER, 3, Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(outcome, StopOutcome::Converged);
    assert_eq!(h.fleet.count(&node.id, &["docker", "stop"]), 3);
    assert_eq!(h.fleet.count(&node.id, &["docker", "kill"]), 1);
}

#[tokio::test]
async fn test_container_surviving_kill_is_reported_as_zombie() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");
    h.fleet.set_running(&node.id, WORKER);
    h.fleet.with_node(&node.id, |n| {
        n.zombie_stops = 100;
        n.stubborn_kills = 100;
    });

    let outcome = h
        .orchestrator
        .ops()
        .stop_with_retry(&node, WORKER, 2, Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(outcome, StopOutcome::Zombie);
    assert_eq!(h.fleet.container(&node.id, WORKER), Some(true));
}

#[tokio::test]
async fn test_stop_of_absent_container_short_circuits() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");

    let outcome = h
        .orchestrator
        .ops()
        .stop_with_retry(&node, WORKER, 5, Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(outcome, StopOutcome::Converged);
    assert_eq!(h.fleet.count(&node.id, &["docker", "stop"]), 0);
}

#[tokio::test]
async fn test_stop_twice_is_idempotent() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");
    let ops = h.orchestrator.ops();
    h.fleet.set_running(&node.id, WORKER);

    let first = ops.stop_with_retry(&node, WORKER, 3, Duration::ZERO).await.unwrap();
    let after_first = h.fleet.container(&node.id, WORKER);
    let second = ops.stop_with_retry(&node, WORKER, 3, Duration::ZERO).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.fleet.container(&node.id, WORKER), after_first);
    assert!(!ops.is_running(&node, WORKER).await.unwrap());
}

#[tokio::test]
async fn test_remove_after_stop_tolerates_missing_container() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");
    let ops = h.orchestrator.ops();
    h.fleet.set_stopped(&node.id, WORKER);

    ops.remove_after_stop(&node, WORKER).await.unwrap();
    assert_eq!(h.fleet.container(&node.id, WORKER), None);
    ops.remove_after_stop(&node, WORKER).await.unwrap();
}

#[tokio::test]
async fn test_force_kill_converges_and_is_idempotent() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");
    let ops = h.orchestrator.ops();
    h.fleet.set_running(&node.id, WORKER);

    ops.force_kill_with_verify(&node, WORKER, 3, Duration::ZERO)
        .await
        .unwrap();
    assert!(!ops.exists(&node, WORKER).await.unwrap());

    ops.force_kill_with_verify(&node, WORKER, 3, Duration::ZERO)
        .await
        .unwrap();
    assert!(!ops.exists(&node, WORKER).await.unwrap());
    assert_eq!(h.fleet.count(&node.id, &["docker", "rm", "-f"]), 1);
}

#[tokio::test]
async fn test_force_kill_does_not_trust_a_successful_remove() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");
    h.fleet.set_running(&node.id, WORKER);
    h.fleet.with_node(&node.id, |n| n.stubborn_kills = 2);

    h.orchestrator
        .ops()
        .force_kill_with_verify(&node, WORKER, 3, Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(h.fleet.count(&node.id, &["docker", "rm", "-f"]), 3);
    assert_eq!(h.fleet.container(&node.id, WORKER), None);
}

#[tokio::test]
async fn test_force_kill_reports_convergence_failure() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");
    h.fleet.set_running(&node.id, WORKER);
    h.fleet.with_node(&node.id, |n| n.stubborn_kills = 100);

    let err = h
        .orchestrator
        .ops()
        .force_kill_with_verify(&node, WORKER, 3, Duration::ZERO)
        .await
        .unwrap_err();

    match err {
        FleetError::Convergence { node: id, attempts, .. } => {
            assert_eq!(id, "worker-0");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected Convergence, got {other:?}"),
    }
    assert_eq!(h.fleet.container(&node.id, WORKER), Some(true));
}

#[tokio::test]
async fn test_save_logs_skips_absent_container() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");

    let capture = h
        .orchestrator
        .ops()
        .save_logs(&node, WORKER, Path::new("logs/worker-0.log"))
        .await
        .unwrap();

    assert_eq!(capture, LogCapture::Skipped);
    assert!(!h.fs.exists(Path::new("logs/worker-0.log")));
}

#[tokio::test]
async fn test_save_logs_writes_container_output() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");
    h.fleet.set_running(&node.id, WORKER);

    let dest = Path::new("logs/worker-0.log");
    let capture = h
        .orchestrator
        .ops()
        .save_logs(&node, WORKER, dest)
        .await
        .unwrap();

    assert_eq!(capture, LogCapture::Saved(dest.to_path_buf()));
    let saved = h.fs.read_to_string(dest).unwrap();
    assert!(saved.contains("processing chunk"));
}

#[tokio::test]
async fn test_start_reaches_running() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");
    let ops = h.orchestrator.ops();

    ops.start(&node, WORKER, &node.runtime_config).await.unwrap();
    assert!(ops.is_running(&node, WORKER).await.unwrap());

    // Already running: nothing new is launched.
    ops.start(&node, WORKER, &node.runtime_config).await.unwrap();
    assert_eq!(h.fleet.count(&node.id, &["docker", "run"]), 1);
}

#[tokio::test]
async fn test_start_replaces_stopped_leftover() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");
    h.fleet.set_stopped(&node.id, WORKER);

    h.orchestrator
        .ops()
        .start(&node, WORKER, &node.runtime_config)
        .await
        .unwrap();

    let commands = h.fleet.commands_for(&node.id);
    let rm = commands.iter().position(|c| c == "docker rm worker").unwrap();
    let run = commands.iter().position(|c| c.starts_with("docker run")).unwrap();
    assert!(rm < run);
    assert_eq!(h.fleet.container(&node.id, WORKER), Some(true));
}

#[tokio::test]
async fn test_start_binds_runtime_config_read_only() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");

    h.orchestrator
        .ops()
        .start(&node, WORKER, &node.runtime_config)
        .await
        .unwrap();

    let run = h
        .fleet
        .journal()
        .into_iter()
        .find(|e| e.starts_with(&["docker", "run"]))
        .unwrap();
    assert!(run
        .argv
        .contains(&"/opt/fleet/runtime.env:/app/runtime.env:ro".to_string()));
    assert_eq!(run.argv.last().map(String::as_str), Some("fleet-worker:test"));
}

#[tokio::test]
async fn test_failed_start_is_a_command_failure() {
    let h = FleetBuilder::new(1).harness();
    let node = h.node("worker-0");
    h.fleet.with_node(&node.id, |n| n.start_fails = true);

    let err = h
        .orchestrator
        .ops()
        .start(&node, WORKER, &node.runtime_config)
        .await
        .unwrap_err();

    assert!(matches!(err, FleetError::Command { exit_code: 125, .. }), "got {err:?}");
}
