//! Gate that lets a flush wait for its sends to actually resolve.
//!
//! The transport's flush call only gets requests in flight. The gate counts
//! records that were enqueued but have not reached a terminal outcome, and
//! waiters block until that count drops to zero.
//!
//! The count is global: it does not track which flush enqueued which record,
//! so a waiter may be released by drainage of sends another caller started.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::trace;

use crate::transport::{SendListener, SendOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GateState {
    outstanding: u64,
    /// Bumped every time `outstanding` reaches zero.
    drain_generation: u64,
    closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    Drained,
    TimedOut,
    /// The gate was closed by shutdown while (or before) waiting.
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub outstanding: u64,
}

#[derive(Debug)]
pub struct FlushGate {
    state: watch::Sender<GateState>,
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl Default for FlushGate {
    fn default() -> Self {
        Self::new()
    }
}

impl FlushGate {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::default());
        FlushGate {
            state,
            enqueued: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.state.borrow().outstanding
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    #[must_use]
    pub fn stats(&self) -> GateStats {
        GateStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            outstanding: self.outstanding(),
        }
    }

    /// Waits until nothing is outstanding, returning `false` on timeout or if
    /// the gate is closed.
    pub async fn await_drained(&self, timeout: Duration) -> bool {
        self.wait_drained(timeout).await == DrainStatus::Drained
    }

    /// Waits until the outstanding count reaches zero, `timeout` elapses or
    /// the gate is closed.
    ///
    /// Returns `Drained` without suspending when nothing is outstanding. A
    /// drain that happens while waiting counts even if new records are
    /// enqueued before this waiter gets to run.
    pub async fn wait_drained(&self, timeout: Duration) -> DrainStatus {
        let mut rx = self.state.subscribe();
        let start = *rx.borrow_and_update();
        if start.closed {
            return DrainStatus::Closed;
        }
        if start.outstanding == 0 {
            return DrainStatus::Drained;
        }

        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| {
                state.closed
                    || state.outstanding == 0
                    || state.drain_generation != start.drain_generation
            }),
        )
        .await;

        match waited {
            Ok(Ok(state)) if state.closed => DrainStatus::Closed,
            Ok(Ok(_)) => DrainStatus::Drained,
            // The sender lives as long as the gate
            Ok(Err(_)) => DrainStatus::Closed,
            Err(_) => DrainStatus::TimedOut,
        }
    }

    /// Releases every current and future waiter with `Closed`. Idempotent.
    pub fn close(&self) {
        let closed_now = self.state.send_if_modified(|state| {
            if state.closed {
                return false;
            }
            state.closed = true;
            true
        });
        if closed_now {
            trace!("FLUSH | Gate closed with {} sends outstanding", self.outstanding());
        }
    }
}

impl SendListener for FlushGate {
    fn on_send_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        // Waiters only care about reaching zero
        self.state.send_if_modified(|state| {
            state.outstanding = state.outstanding.saturating_add(1);
            false
        });
    }

    fn on_send_completed(&self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Delivered => self.delivered.fetch_add(1, Ordering::Relaxed),
            SendOutcome::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        let drained = self.state.send_if_modified(|state| {
            // Completions beyond what was enqueued are ignored
            if state.outstanding == 0 {
                return false;
            }
            state.outstanding -= 1;
            if state.outstanding == 0 {
                state.drain_generation = state.drain_generation.wrapping_add(1);
                return true;
            }
            false
        });
        if drained {
            trace!("FLUSH | Gate drained");
        }
    }
}
