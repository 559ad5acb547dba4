//! Boundary between the flush orchestration and whatever ships records.
//!
//! A [`Transport`] queues records and pushes them when asked to flush. It
//! reports every record's terminal outcome to a [`SendListener`], which is how
//! the flush gate learns that a flush has drained.

pub mod batch;
pub mod constants;
pub mod http;

use async_trait::async_trait;

use crate::events::EventRecord;

pub use http::HttpTransport;

/// Terminal outcome of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    Failed,
}

/// Hook the transport calls once per record: when it is queued and when its
/// send resolves.
pub trait SendListener: Send + Sync {
    fn on_send_enqueued(&self);
    fn on_send_completed(&self, outcome: SendOutcome);
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is shut down")]
    Closed,
    #[error("record of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queues a record. Fire-and-forget: delivery problems surface later
    /// through the listener, not here.
    fn enqueue(&self, record: EventRecord) -> Result<(), TransportError>;

    /// Starts pushing everything queued so far. Returns once the sends are in
    /// flight, not when they have resolved.
    async fn flush(&self) -> Result<(), TransportError>;

    /// Stops accepting records. Records still queued are reported as failed.
    /// Idempotent.
    fn shutdown(&self);
}
