// src/recovery/mod.rs

//! Chunked-retry recovery.
//!
//! When the managed process dies mid-task, the fleet is brought down,
//! verified absent, given a smaller value for the tunable and started again.
//! The configuration files are never touched unless every node was
//! verified absent first: an unconverged fleet must not be reconfigured and
//! restarted.
//!
//! The workflow has a single outward signal, [`RecoveryReport::succeeded`].
//! Putting the tunable back to its normal value is the caller's job.

use std::fmt;

use tracing::{error, info, warn};

use crate::fleet::FleetOutcome;
use crate::lifecycle::Orchestrator;
use crate::retry::{RetryFailure, RetryPolicy};
use crate::types::FleetScope;

/// Reason tag used for log files captured by the workflow.
pub const LOG_REASON: &str = "retry";

/// Phases the workflow walks through, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryPhase {
    CapturingLogs,
    ForceConverging { attempt: u32 },
    MutatingConfig,
    Waiting,
    Restarting,
    Done,
    Failed,
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryPhase::CapturingLogs => f.write_str("capturing-logs"),
            RecoveryPhase::ForceConverging { attempt } => {
                write!(f, "force-converging (attempt {attempt})")
            }
            RecoveryPhase::MutatingConfig => f.write_str("mutating-config"),
            RecoveryPhase::Waiting => f.write_str("waiting"),
            RecoveryPhase::Restarting => f.write_str("restarting"),
            RecoveryPhase::Done => f.write_str("done"),
            RecoveryPhase::Failed => f.write_str("failed"),
        }
    }
}

/// What happened during one run of the workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Every phase entered, in order; the last one is `Done` or `Failed`.
    pub phases: Vec<RecoveryPhase>,
    /// Number of force-converge attempts made.
    pub converge_attempts: u32,
    /// Outcome of the last fleet step that ran.
    pub last_outcome: FleetOutcome,
    /// Why the workflow failed, if it did.
    pub failure: Option<String>,
}

impl RecoveryReport {
    pub fn succeeded(&self) -> bool {
        self.phases.last() == Some(&RecoveryPhase::Done)
    }

    /// True if the workflow got as far as writing configuration files.
    pub fn mutated_config(&self) -> bool {
        self.phases.contains(&RecoveryPhase::MutatingConfig)
    }

    fn enter(&mut self, phase: RecoveryPhase) {
        info!(phase = %phase, "recovery phase");
        self.phases.push(phase);
    }

    fn fail(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        error!(reason = %reason, "recovery failed");
        self.failure = Some(reason);
        self.phases.push(RecoveryPhase::Failed);
        self
    }
}

/// Recovery workflow bound to one orchestrator.
#[derive(Debug)]
pub struct ChunkRetryWorkflow<'a> {
    orchestrator: &'a Orchestrator,
    retry_value: String,
    policy: RetryPolicy,
}

impl<'a> ChunkRetryWorkflow<'a> {
    /// Uses `[retry].cleanup_*` for the force-converge phase.
    pub fn new(orchestrator: &'a Orchestrator, retry_value: impl Into<String>) -> Self {
        Self {
            orchestrator,
            retry_value: retry_value.into(),
            policy: orchestrator.settings().retry.cleanup,
        }
    }

    /// Override the number of force-converge attempts.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.policy = RetryPolicy::new(attempts, self.policy.delay());
        self
    }

    pub fn retry_value(&self) -> &str {
        &self.retry_value
    }

    pub async fn run(&self) -> RecoveryReport {
        let orch = self.orchestrator;
        let mut report = RecoveryReport::default();

        report.enter(RecoveryPhase::CapturingLogs);
        let logs = orch.capture_logs(FleetScope::All, LOG_REASON).await;
        if !logs.is_success() {
            warn!(outcome = %logs, "log capture incomplete; continuing");
        }
        if orch.cancellation().is_cancelled() {
            return report.fail("cancelled");
        }

        match self.force_converge(&mut report).await {
            Ok(outcome) => report.last_outcome = outcome,
            Err(reason) => return report.fail(reason),
        }

        report.enter(RecoveryPhase::MutatingConfig);
        let mutated = orch
            .set_tunable(FleetScope::All, &self.retry_value)
            .await;
        let mutated_ok = mutated.is_success();
        let mutated_summary = mutated.to_string();
        report.last_outcome = mutated;
        if !mutated_ok {
            return report.fail(format!("configuration update failed: {mutated_summary}"));
        }

        report.enter(RecoveryPhase::Waiting);
        if orch
            .cancellation()
            .sleep(orch.settings().timing.config_settle)
            .await
            .is_err()
        {
            return report.fail("cancelled");
        }

        report.enter(RecoveryPhase::Restarting);
        let started = orch.start(FleetScope::All).await;
        let started_ok = started.is_success();
        let started_summary = started.to_string();
        report.last_outcome = started;
        if !started_ok {
            return report.fail(format!("restart failed: {started_summary}"));
        }

        report.enter(RecoveryPhase::Done);
        info!(value = %self.retry_value, "recovery complete");
        report
    }

    /// Cleanup then verify-absent, repeated until every node is gone or the
    /// attempts run out.
    async fn force_converge(
        &self,
        report: &mut RecoveryReport,
    ) -> Result<FleetOutcome, String> {
        let orch = self.orchestrator;
        let mut attempts_made = 0u32;

        let result = self
            .policy
            .run(
                orch.cancellation(),
                |attempt| {
                    attempts_made = attempt;
                    report.enter(RecoveryPhase::ForceConverging { attempt });
                    async move {
                        let killed = orch.cleanup(FleetScope::All).await;
                        if !killed.is_success() {
                            warn!(attempt, outcome = %killed, "force kill incomplete");
                        }
                        let verified = orch.verify_absent(FleetScope::All).await;
                        if verified.is_success() {
                            Ok(verified)
                        } else {
                            warn!(attempt, outcome = %verified, "fleet not verified absent");
                            Err(verified)
                        }
                    }
                },
                |_| !orch.cancellation().is_cancelled(),
            )
            .await;

        report.converge_attempts = attempts_made;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(RetryFailure::Cancelled) => Err("cancelled".to_string()),
            Err(RetryFailure::Exhausted { attempts, last }) => {
                let failed = last.failed_ids().join(", ");
                report.last_outcome = last;
                Err(format!(
                    "fleet did not converge to absent after {attempts} attempt(s); still present or unreachable: {failed}"
                ))
            }
            Err(RetryFailure::Fatal { error, .. }) => {
                report.last_outcome = error;
                Err("cancelled".to_string())
            }
        }
    }
}
