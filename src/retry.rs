// src/retry.rs

//! Retry policy and cancellation shared by every retrying operation.
//!
//! All the loops in the orchestrator (transport retries in the gateway,
//! zombie-stop retries, force-kill verification, the recovery workflow's
//! force-converge phase) go through [`RetryPolicy::run`]. Every wait goes
//! through [`Cancellation::sleep`], so an external cancellation aborts
//! mid-sleep instead of only between verbs.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::errors::{FleetError, Result};

/// Fixed-delay retry policy.
///
/// `max_attempts` counts every attempt, including the first one, and is
/// always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug)]
pub enum RetryFailure<E> {
    /// Every attempt failed with a retryable error; `last` is the final one.
    Exhausted { attempts: u32, last: E },
    /// An attempt failed with an error the predicate refused to retry.
    Fatal { attempt: u32, error: E },
    /// Cancellation fired while waiting between attempts.
    Cancelled,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Run `op` until it succeeds, fails fatally, or the attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Errors for which
    /// `is_retryable` returns false end the loop immediately.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        cancel: &Cancellation,
        mut op: F,
        is_retryable: P,
    ) -> std::result::Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !is_retryable(&error) => {
                    return Err(RetryFailure::Fatal { attempt, error });
                }
                Err(error) => {
                    if !self.allows_retry_after(attempt) {
                        return Err(RetryFailure::Exhausted {
                            attempts: attempt,
                            last: error,
                        });
                    }
                    debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        "retryable failure; waiting before next attempt"
                    );
                    if cancel.sleep(self.delay).await.is_err() {
                        return Err(RetryFailure::Cancelled);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Fires a [`Cancellation`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cheap, cloneable cancellation signal.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

/// Create a linked cancel handle and signal.
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

impl Cancellation {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_handle, cancel) = cancellation();
        cancel
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested. Never resolves for a
    /// signal whose handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `delay` unless cancelled first.
    pub async fn sleep(&self, delay: Duration) -> Result<()> {
        if self.is_cancelled() {
            return Err(FleetError::Cancelled);
        }
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.cancelled() => Err(FleetError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
