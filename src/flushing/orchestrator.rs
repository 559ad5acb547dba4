//! Bounded-retry flush: "flush, then wait for the gate to drain" as one unit
//! of work, bounded per attempt and retried with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::flushing::errors::{AttemptError, FlushError};
use crate::flushing::gate::{DrainStatus, FlushGate};
use crate::flushing::policy::{FlushAttempt, RetryPolicy};
use crate::transport::Transport;

/// Successful outcome of `flush_with_retry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Attempts used, including the successful one.
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Runs flushes against a shared transport and gate.
///
/// Each call to [`flush_with_retry`](Self::flush_with_retry) owns its own
/// loop; any number of calls may run concurrently.
///
/// An attempt that times out is not aborted. Its task keeps running in the
/// background and may still hold transport capacity after the caller moved
/// on to the next attempt.
pub struct RetryingFlushOrchestrator<T: Transport> {
    transport: Arc<T>,
    gate: Arc<FlushGate>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl<T: Transport> RetryingFlushOrchestrator<T> {
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        gate: Arc<FlushGate>,
        policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        RetryingFlushOrchestrator {
            transport,
            gate,
            policy,
            shutdown,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<FlushGate> {
        &self.gate
    }

    /// Flushes the transport and waits for every outstanding send to resolve,
    /// retrying on failure or timeout until the attempt budget is spent.
    pub async fn flush_with_retry(&self) -> Result<FlushReport, FlushError> {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts();
        let mut index = 0;

        loop {
            if self.shutdown.is_cancelled() {
                warn!("FLUSH | Shutting down, skipping flush attempt {}", index + 1);
                return Err(FlushError::ShuttingDown);
            }

            let mut attempt = FlushAttempt::start(index, &self.policy);
            debug!("FLUSH | Starting flush attempt {}/{max_attempts}", attempt.number());

            match self.run_attempt().await {
                Ok(()) => {
                    attempt.succeed();
                    let report = FlushReport {
                        attempts: attempt.number(),
                        elapsed: start.elapsed(),
                    };
                    info!(
                        "FLUSH | Flush completed successfully after {} attempt(s) in {}ms",
                        report.attempts,
                        report.elapsed.as_millis()
                    );
                    return Ok(report);
                }
                Err(AttemptError::Shutdown) => {
                    warn!(
                        "FLUSH | Flush attempt {}/{max_attempts} abandoned, shutting down",
                        attempt.number()
                    );
                    return Err(FlushError::ShuttingDown);
                }
                Err(cause) => {
                    warn!(
                        "FLUSH | Flush attempt {}/{max_attempts} failed: {cause}",
                        attempt.number()
                    );
                    attempt.fail(cause);
                }
            }

            let attempts = attempt.number();
            let Some(backoff) = attempt.backoff else {
                let last_cause = attempt
                    .into_cause()
                    .unwrap_or_else(|| AttemptError::Aborted("no cause recorded".to_string()));
                error!("FLUSH | Failed to flush after {attempts} attempts: {last_cause}");
                return Err(FlushError::RetriesExhausted {
                    attempts,
                    last_cause,
                });
            };

            debug!("FLUSH | Retrying in {}ms", backoff.as_millis());
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    warn!("FLUSH | Retry interrupted after {attempts} attempts");
                    return Err(FlushError::RetryInterrupted { attempts });
                }
                () = tokio::time::sleep(backoff) => {}
            }
            index += 1;
        }
    }

    /// Spawns one flush-and-drain unit and waits for it, for shutdown, or for
    /// the attempt timeout, whichever comes first.
    async fn run_attempt(&self) -> Result<(), AttemptError> {
        let timeout = self.policy.attempt_timeout();
        let transport = Arc::clone(&self.transport);
        let gate = Arc::clone(&self.gate);

        let unit = tokio::spawn(async move {
            transport.flush().await?;
            match gate.wait_drained(timeout).await {
                DrainStatus::Drained => Ok(()),
                DrainStatus::TimedOut => Err(AttemptError::Timeout(timeout)),
                DrainStatus::Closed => Err(AttemptError::Shutdown),
            }
        });

        // Dropping the handle detaches the unit, it is never aborted
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(AttemptError::Shutdown),
            joined = tokio::time::timeout(timeout, unit) => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(AttemptError::Aborted(e.to_string())),
                Err(_) => Err(AttemptError::Timeout(timeout)),
            },
        }
    }
}

impl<T: Transport> std::fmt::Debug for RetryingFlushOrchestrator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingFlushOrchestrator")
            .field("policy", &self.policy)
            .field("gate", &self.gate.stats())
            .finish_non_exhaustive()
    }
}
