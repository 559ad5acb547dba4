//! Error types for `flushing` module

use std::time::Duration;

use crate::transport::TransportError;

/// Why a single flush attempt did not succeed. Handled inside the retry loop;
/// only escapes as the last cause of [`FlushError::RetriesExhausted`].
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// The transport refused or failed the flush.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Flush plus drain did not finish within the per-attempt bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The flush task panicked or was cancelled by the runtime.
    #[error("flush task aborted: {0}")]
    Aborted(String),
    /// Shutdown released the gate or cancelled the wait.
    #[error("shutdown in progress")]
    Shutdown,
}

/// Terminal result of `flush_with_retry`.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error("failed to flush after {attempts} attempts: {last_cause}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_cause: AttemptError,
    },
    /// Shutdown cancelled the pause between attempts.
    #[error("retry interrupted after {attempts} attempts")]
    RetryInterrupted { attempts: u32 },
    /// Shutdown began before or during an attempt.
    #[error("flush abandoned, shutting down")]
    ShuttingDown,
}
