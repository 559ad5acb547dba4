use std::time::Duration;

use crate::flushing::errors::AttemptError;

pub const BACKOFF_MULTIPLIER: u32 = 2;

/// Fixed retry schedule: `max_attempts` tries, attempt `n` followed by a
/// `initial_backoff * 2^n` pause, each try bounded by `attempt_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` below one is raised to one.
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff: Duration, attempt_timeout: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            attempt_timeout,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Pause after the 0-based `attempt` fails. Not capped; saturates
    /// instead of overflowing.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = BACKOFF_MULTIPLIER.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }

    #[must_use]
    pub fn is_last_attempt(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) >= self.max_attempts
    }

    /// Sum of the pauses taken when the first `failed` attempts fail.
    #[must_use]
    pub fn total_backoff(&self, failed: u32) -> Duration {
        (0..failed).fold(Duration::ZERO, |acc, attempt| {
            acc.saturating_add(self.backoff(attempt))
        })
    }
}

#[derive(Debug)]
pub enum AttemptOutcome {
    Pending,
    Succeeded,
    Failed(AttemptError),
    TimedOut(Duration),
}

/// One try of the flush loop. Only lives for the loop iteration.
#[derive(Debug)]
pub struct FlushAttempt {
    pub index: u32,
    /// Pause before the next attempt, `None` on the last one.
    pub backoff: Option<Duration>,
    pub outcome: AttemptOutcome,
}

impl FlushAttempt {
    #[must_use]
    pub fn start(index: u32, policy: &RetryPolicy) -> Self {
        let backoff = if policy.is_last_attempt(index) {
            None
        } else {
            Some(policy.backoff(index))
        };
        FlushAttempt {
            index,
            backoff,
            outcome: AttemptOutcome::Pending,
        }
    }

    /// 1-based attempt number, as logged.
    #[must_use]
    pub fn number(&self) -> u32 {
        self.index + 1
    }

    pub fn succeed(&mut self) {
        self.outcome = AttemptOutcome::Succeeded;
    }

    pub fn fail(&mut self, cause: AttemptError) {
        self.outcome = match cause {
            AttemptError::Timeout(timeout) => AttemptOutcome::TimedOut(timeout),
            cause => AttemptOutcome::Failed(cause),
        };
    }

    /// The failure cause, if the attempt failed.
    #[must_use]
    pub fn into_cause(self) -> Option<AttemptError> {
        match self.outcome {
            AttemptOutcome::Failed(cause) => Some(cause),
            AttemptOutcome::TimedOut(timeout) => Some(AttemptError::Timeout(timeout)),
            AttemptOutcome::Pending | AttemptOutcome::Succeeded => None,
        }
    }
}
