//! Reliable flushing on top of a fire-and-forget transport.
//!
//! - [`FlushGate`] tracks sends that were enqueued but not yet resolved
//! - [`RetryPolicy`] and [`FlushAttempt`] describe the retry schedule
//! - [`RetryingFlushOrchestrator`] runs flush-and-drain attempts against both

mod errors;
mod gate;
mod orchestrator;
mod policy;

pub use errors::{AttemptError, FlushError};
pub use gate::{DrainStatus, FlushGate, GateStats};
pub use orchestrator::{FlushReport, RetryingFlushOrchestrator};
pub use policy::{AttemptOutcome, BACKOFF_MULTIPLIER, FlushAttempt, RetryPolicy};
