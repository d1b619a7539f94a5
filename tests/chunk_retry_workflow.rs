// tests/chunk_retry_workflow.rs

use std::collections::BTreeMap;

use fleetctl::recovery::{ChunkRetryWorkflow, RecoveryPhase};
use fleetctl::types::{FleetScope, NodeStatus};
use fleetctl_test_utils::builders::RUNTIME_CONFIG;
use fleetctl_test_utils::{init_tracing, FleetBuilder, FleetHarness};

const ORIGINAL: &str = "# prover settings\nBATCH=8\nCHUNK_SIZE=64\nTHREADS=32\n";

fn seeded(workers: usize, cleanup_retries: u32) -> FleetHarness {
    let h = FleetBuilder::new(workers)
        .with_tunable("CHUNK_SIZE", "64", "16")
        .with_cleanup_retries(cleanup_retries)
        .with_kill_retries(1)
        .harness();
    for id in h.node_ids() {
        h.fleet.put_file(&id, RUNTIME_CONFIG, ORIGINAL);
    }
    h.fleet.run_all(h.registry());
    h
}

fn config_files(h: &FleetHarness) -> BTreeMap<String, Option<String>> {
    h.node_ids()
        .into_iter()
        .map(|id| {
            let contents = h.fleet.file(&id, RUNTIME_CONFIG);
            (id, contents)
        })
        .collect()
}

#[tokio::test]
async fn test_chunk_retry_success() {
    init_tracing();
    let h = seeded(2, 3);

    let report = ChunkRetryWorkflow::new(&h.orchestrator, "16").run().await;

    assert!(report.succeeded(), "{:?}", report.failure);
    assert_eq!(
        report.phases,
        [
            RecoveryPhase::CapturingLogs,
            RecoveryPhase::ForceConverging { attempt: 1 },
            RecoveryPhase::MutatingConfig,
            RecoveryPhase::Waiting,
            RecoveryPhase::Restarting,
            RecoveryPhase::Done,
        ]
    );
    assert_eq!(report.converge_attempts, 1);

    for (id, contents) in config_files(&h) {
        assert_eq!(
            contents.as_deref(),
            Some("# prover settings\nBATCH=8\nCHUNK_SIZE=16\nTHREADS=32\n"),
            "{id}"
        );
    }

    let reports = h.orchestrator.status(FleetScope::All).await;
    assert!(reports.iter().all(|r| r.status == NodeStatus::Running));

    let retry_logs = h
        .fs
        .file_paths()
        .iter()
        .filter(|p| p.to_string_lossy().contains("-retry-"))
        .count();
    assert_eq!(retry_logs, 3);
}

#[tokio::test]
async fn test_chunk_retry_abort_leaves_config_untouched() {
    let h = seeded(2, 3);
    h.fleet.with_node("worker-1", |n| n.stubborn_kills = 1_000);
    let before = config_files(&h);

    let report = ChunkRetryWorkflow::new(&h.orchestrator, "16").run().await;

    assert!(!report.succeeded());
    assert_eq!(report.phases.last(), Some(&RecoveryPhase::Failed));
    assert_eq!(report.converge_attempts, 3);
    assert!(!report.mutated_config());
    assert!(report.failure.as_deref().unwrap().contains("worker-1"));

    assert_eq!(config_files(&h), before);
    assert!(!h.fleet.any(&["tee"]));
    assert!(!h.fleet.any(&["docker", "run"]));
}

#[tokio::test]
async fn test_chunk_retry_converges_on_a_later_attempt() {
    let h = seeded(2, 3);
    // The first cleanup leaves worker-1 behind; the second removes it.
    h.fleet.with_node("worker-1", |n| n.stubborn_kills = 1);

    let report = ChunkRetryWorkflow::new(&h.orchestrator, "16").run().await;

    assert!(report.succeeded(), "{:?}", report.failure);
    assert_eq!(report.converge_attempts, 2);
    assert!(report
        .phases
        .contains(&RecoveryPhase::ForceConverging { attempt: 2 }));
}

#[tokio::test]
async fn test_attempt_override() {
    let h = seeded(1, 5);
    h.fleet.with_node("worker-0", |n| n.stubborn_kills = 1_000);

    let report = ChunkRetryWorkflow::new(&h.orchestrator, "16")
        .with_attempts(2)
        .run()
        .await;

    assert!(!report.succeeded());
    assert_eq!(report.converge_attempts, 2);
}

#[tokio::test]
async fn test_config_update_failure_does_not_restart() {
    let h = seeded(2, 3);
    h.fleet.with_node("worker-0", |n| {
        n.files.remove(RUNTIME_CONFIG);
    });

    let report = ChunkRetryWorkflow::new(&h.orchestrator, "16").run().await;

    assert!(!report.succeeded());
    assert!(report.mutated_config());
    assert!(!report.phases.contains(&RecoveryPhase::Restarting));
    assert_eq!(report.last_outcome.failed_ids(), ["worker-0"]);
    assert!(!h.fleet.any(&["docker", "run"]));
}

#[tokio::test]
async fn test_restart_failure_fails_the_workflow() {
    let h = seeded(2, 3);
    h.fleet.with_node("worker-1", |n| n.start_fails = true);

    let report = ChunkRetryWorkflow::new(&h.orchestrator, "16").run().await;

    assert!(!report.succeeded());
    assert!(report.phases.contains(&RecoveryPhase::Restarting));
    assert_eq!(report.last_outcome.failed_ids(), ["worker-1"]);
}

#[tokio::test]
async fn test_log_capture_failure_is_only_a_warning() {
    let h = seeded(2, 3);
    // The first call to worker-0 (the log capture's existence probe) fails
    // on every transport attempt; later calls get through.
    h.fleet.with_node("worker-0", |n| n.transport_failures = 3);

    let report = ChunkRetryWorkflow::new(&h.orchestrator, "16").run().await;

    assert!(report.succeeded(), "{:?}", report.failure);
}

#[tokio::test]
async fn test_cancelled_workflow_mutates_nothing() {
    let h = seeded(1, 3);
    h.cancel_handle.cancel();
    let before = config_files(&h);

    let report = ChunkRetryWorkflow::new(&h.orchestrator, "16").run().await;

    assert!(!report.succeeded());
    assert_eq!(config_files(&h), before);
    assert!(!h.fleet.any(&["docker", "run"]));
}
