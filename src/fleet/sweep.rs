// src/fleet/sweep.rs

//! Apply one per-node operation across a set of nodes.
//!
//! A sweep never stops at the first failing node: one unreachable worker must
//! not block the rest of the fleet from converging. Failures are collected
//! and reported together.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::{FleetError, Result};
use crate::fleet::Node;
use crate::retry::Cancellation;

/// Order in which a sweep visits nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderPolicy {
    /// The aggregator before any worker, workers in registry order.
    #[default]
    AggregatorFirst,
    /// Exactly the order given.
    AsGiven,
}

/// A node that did not complete the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub node: String,
    pub error: String,
}

/// Partition of the swept nodes into succeeded and failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<NodeFailure>,
}

impl FleetOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.node.clone()).collect()
    }

    pub fn record(&mut self, node: &Node, result: Result<()>) {
        match result {
            Ok(()) => self.succeeded.push(node.id.clone()),
            Err(e) => self.fail(node, e.to_string()),
        }
    }

    pub fn fail(&mut self, node: &Node, error: impl Into<String>) {
        self.failed.push(NodeFailure {
            node: node.id.clone(),
            error: error.into(),
        });
    }

    /// Fold another outcome into this one.
    ///
    /// A node that failed in either outcome ends up failed only, so a node
    /// that failed to stop but later started is still reported.
    pub fn merge(&mut self, other: FleetOutcome) {
        for failure in other.failed {
            self.succeeded.retain(|id| *id != failure.node);
            self.failed.push(failure);
        }
        for id in other.succeeded {
            let already_failed = self.failed.iter().any(|f| f.node == id);
            if !already_failed && !self.succeeded.contains(&id) {
                self.succeeded.push(id);
            }
        }
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(FleetError::PartialFleet {
                failed: self.failed_ids(),
            })
        }
    }
}

impl fmt::Display for FleetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed",
            self.succeeded.len(),
            self.failed.len()
        )?;
        for failure in &self.failed {
            write!(f, "\n  {}: {}", failure.node, failure.error)?;
        }
        Ok(())
    }
}

/// Run `op` on every node in `nodes`.
///
/// `inter_node_delay` is applied between consecutive *worker* operations
/// only. Once `cancel` fires, every node not yet visited is recorded as
/// failed and the sweep ends.
pub async fn for_each_node<'a, F, Fut>(
    nodes: &[&'a Node],
    order: OrderPolicy,
    inter_node_delay: Duration,
    cancel: &Cancellation,
    mut op: F,
) -> FleetOutcome
where
    F: FnMut(&'a Node) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut ordered: Vec<&'a Node> = nodes.to_vec();
    if order == OrderPolicy::AggregatorFirst {
        // Stable: workers keep their registry order.
        ordered.sort_by_key(|n| !n.is_aggregator());
    }

    let mut outcome = FleetOutcome::default();
    let mut workers_done = 0usize;

    for (idx, node) in ordered.iter().copied().enumerate() {
        if !node.is_aggregator() {
            if workers_done > 0 && cancel.sleep(inter_node_delay).await.is_err() {
                cancel_remaining(&mut outcome, &ordered[idx..]);
                break;
            }
            workers_done += 1;
        }

        if cancel.is_cancelled() {
            cancel_remaining(&mut outcome, &ordered[idx..]);
            break;
        }

        let result = op(node).await;
        match &result {
            Ok(()) => info!(node = %node.id, "node operation succeeded"),
            Err(e) => warn!(node = %node.id, error = %e, "node operation failed"),
        }
        let was_cancelled = result.as_ref().is_err_and(FleetError::is_cancelled);
        outcome.record(node, result);
        if was_cancelled {
            cancel_remaining(&mut outcome, &ordered[idx + 1..]);
            break;
        }
    }

    outcome
}

fn cancel_remaining(outcome: &mut FleetOutcome, rest: &[&Node]) {
    for node in rest {
        outcome.fail(node, FleetError::Cancelled.to_string());
    }
}
