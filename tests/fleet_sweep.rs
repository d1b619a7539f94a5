// tests/fleet_sweep.rs

use std::time::Duration;

use fleetctl::errors::FleetError;
use fleetctl::fleet::{for_each_node, FleetOutcome, Node, NodeFailure, OrderPolicy};
use fleetctl::retry::{cancellation, Cancellation};
use fleetctl::types::FleetScope;
use fleetctl_test_utils::FleetBuilder;

#[tokio::test]
async fn test_aggregator_is_visited_first() {
    let registry = FleetBuilder::new(3).registry();
    let mut nodes: Vec<&Node> = registry.workers().iter().collect();
    nodes.push(registry.aggregator());

    let mut visited = Vec::new();
    let outcome = for_each_node(
        &nodes,
        OrderPolicy::AggregatorFirst,
        Duration::ZERO,
        &Cancellation::never(),
        |node| {
            visited.push(node.id.clone());
            async { Ok::<_, FleetError>(()) }
        },
    )
    .await;

    assert!(outcome.is_success());
    assert_eq!(visited, ["aggregator", "worker-0", "worker-1", "worker-2"]);
}

#[tokio::test]
async fn test_as_given_keeps_order() {
    let registry = FleetBuilder::new(2).registry();
    let mut nodes: Vec<&Node> = registry.workers().iter().collect();
    nodes.push(registry.aggregator());

    let mut visited = Vec::new();
    for_each_node(
        &nodes,
        OrderPolicy::AsGiven,
        Duration::ZERO,
        &Cancellation::never(),
        |node| {
            visited.push(node.id.clone());
            async { Ok::<_, FleetError>(()) }
        },
    )
    .await;

    assert_eq!(visited, ["worker-0", "worker-1", "aggregator"]);
}

#[tokio::test]
async fn test_failure_does_not_stop_the_sweep() {
    let registry = FleetBuilder::new(3).registry();
    let nodes = registry.select(FleetScope::All);

    let outcome = for_each_node(
        &nodes,
        OrderPolicy::AggregatorFirst,
        Duration::ZERO,
        &Cancellation::never(),
        |node| async move {
            if node.id == "worker-1" {
                Err(FleetError::ConfigError("boom".to_string()))
            } else {
                Ok(())
            }
        },
    )
    .await;

    assert_eq!(outcome.succeeded, ["aggregator", "worker-0", "worker-2"]);
    assert_eq!(outcome.failed_ids(), ["worker-1"]);
    match outcome.into_result() {
        Err(FleetError::PartialFleet { failed }) => assert_eq!(failed, ["worker-1"]),
        other => panic!("expected PartialFleet, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_inter_node_delay_applies_between_workers_only() {
    let registry = FleetBuilder::new(3).registry();
    let nodes = registry.select(FleetScope::All);
    let start = tokio::time::Instant::now();

    let mut stamps = Vec::new();
    for_each_node(
        &nodes,
        OrderPolicy::AggregatorFirst,
        Duration::from_secs(10),
        &Cancellation::never(),
        |node| {
            stamps.push((node.id.clone(), start.elapsed()));
            async { Ok::<_, FleetError>(()) }
        },
    )
    .await;

    assert_eq!(stamps[0], ("aggregator".to_string(), Duration::ZERO));
    assert_eq!(stamps[1].1, Duration::ZERO);
    assert!(stamps[2].1 >= Duration::from_secs(10));
    assert!(stamps[3].1 >= Duration::from_secs(20));
    assert!(start.elapsed() < Duration::from_secs(30));
}

#[tokio::test]
async fn test_cancellation_marks_remaining_nodes_failed() {
    let registry = FleetBuilder::new(2).registry();
    let nodes = registry.select(FleetScope::All);
    let (handle, cancel) = cancellation();
    handle.cancel();

    let mut calls = 0;
    let outcome = for_each_node(
        &nodes,
        OrderPolicy::AggregatorFirst,
        Duration::ZERO,
        &cancel,
        |_| {
            calls += 1;
            async { Ok::<_, FleetError>(()) }
        },
    )
    .await;

    assert_eq!(calls, 0);
    assert_eq!(outcome.failed_ids(), ["aggregator", "worker-0", "worker-1"]);
    assert!(outcome.failed.iter().all(|f| f.error == "operation cancelled"));
}

#[test]
fn test_merge_keeps_a_node_failed_once_it_failed() {
    let mut outcome = FleetOutcome {
        succeeded: vec!["aggregator".to_string(), "worker-0".to_string()],
        failed: vec![NodeFailure {
            node: "worker-1".to_string(),
            error: "stop failed".to_string(),
        }],
    };
    outcome.merge(FleetOutcome {
        succeeded: vec!["aggregator".to_string(), "worker-1".to_string()],
        failed: vec![NodeFailure {
            node: "worker-0".to_string(),
            error: "start failed".to_string(),
        }],
    });

    assert_eq!(outcome.succeeded, ["aggregator"]);
    let mut failed = outcome.failed_ids();
    failed.sort();
    assert_eq!(failed, ["worker-0", "worker-1"]);
}

#[test]
fn test_outcome_display_lists_failures() {
    let outcome = FleetOutcome {
        succeeded: vec!["aggregator".to_string()],
        failed: vec![NodeFailure {
            node: "worker-0".to_string(),
            error: "unreachable".to_string(),
        }],
    };
    assert_eq!(
        outcome.to_string(),
        "1 succeeded, 1 failed\n  worker-0: unreachable"
    );
}
