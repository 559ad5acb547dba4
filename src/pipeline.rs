//! Caller-facing entry point: turn a purchase into records, ship them and make
//! sure they left the process before returning.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::events::{EventError, EventRecord, Purchase};
use crate::flushing::{FlushError, FlushGate, FlushReport, GateStats, RetryingFlushOrchestrator};
use crate::transport::{HttpTransport, SendListener, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid purchase: {0}")]
    Event(#[from] EventError),
    #[error("failed to enqueue record: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Flush(#[from] FlushError),
    #[error("failed to read purchases: {0}")]
    Io(#[from] std::io::Error),
}

pub struct EventPipeline<T: Transport = HttpTransport> {
    config: Arc<Config>,
    gate: Arc<FlushGate>,
    transport: Arc<T>,
    orchestrator: RetryingFlushOrchestrator<T>,
    shutdown: CancellationToken,
    cleaned_up: AtomicBool,
}

impl EventPipeline<HttpTransport> {
    /// Wires an [`HttpTransport`] reporting to a fresh gate.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        let gate = Arc::new(FlushGate::new());
        let listener: Arc<dyn SendListener> = Arc::clone(&gate) as Arc<dyn SendListener>;
        let transport = Arc::new(HttpTransport::new(Arc::clone(&config), listener));
        Self::with_transport(config, gate, transport)
    }
}

impl<T: Transport> EventPipeline<T> {
    /// `gate` must be the listener `transport` reports to.
    #[must_use]
    pub fn with_transport(config: Arc<Config>, gate: Arc<FlushGate>, transport: Arc<T>) -> Self {
        let shutdown = CancellationToken::new();
        let orchestrator = RetryingFlushOrchestrator::new(
            Arc::clone(&transport),
            Arc::clone(&gate),
            config.retry_policy(),
            shutdown.clone(),
        );
        EventPipeline {
            config,
            gate,
            transport,
            orchestrator,
            shutdown,
            cleaned_up: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn stats(&self) -> GateStats {
        self.gate.stats()
    }

    /// Records the purchase as an identify and an `Order Completed` track,
    /// then flushes with retry.
    ///
    /// Unless `propagate_failures` is set, failures are logged and `Ok` is
    /// returned: losing analytics must not fail the purchase.
    pub async fn create_event(&self, purchase: &Purchase) -> Result<(), PipelineError> {
        match self.emit(purchase).await {
            Ok(report) => {
                debug!(
                    "PIPELINE | Order {} flushed in {} attempt(s)",
                    purchase.order_id, report.attempts
                );
                Ok(())
            }
            Err(e) if self.config.propagate_failures => Err(e),
            Err(e) => {
                error!(
                    "PIPELINE | Failed to record order {}: {e}",
                    purchase.order_id
                );
                Ok(())
            }
        }
    }

    async fn emit(&self, purchase: &Purchase) -> Result<FlushReport, PipelineError> {
        let identify = EventRecord::identify(purchase)?;
        let track = EventRecord::order_completed(purchase)?;
        self.transport.enqueue(identify)?;
        self.transport.enqueue(track)?;

        debug!("PIPELINE | Initiating flush for order {}", purchase.order_id);
        Ok(self.orchestrator.flush_with_retry().await?)
    }

    /// Feeds one JSON purchase per line to `create_event` until EOF or until
    /// `cleanup` runs. Blank and malformed lines are skipped. Returns the
    /// number of purchases handed to `create_event`.
    pub async fn consume<R>(&self, reader: R) -> Result<usize, PipelineError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut consumed = 0;
        while !self.is_shut_down() {
            let Some(line) = lines.next_line().await? else {
                debug!("PIPELINE | Reached end of input");
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let purchase: Purchase = match serde_json::from_str(line) {
                Ok(purchase) => purchase,
                Err(e) => {
                    error!("PIPELINE | Failed to parse purchase: {e}");
                    continue;
                }
            };
            self.create_event(&purchase).await?;
            consumed += 1;
        }
        Ok(consumed)
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cleaned_up.load(Ordering::Acquire)
    }

    /// Interrupts in-flight flushes, releases gate waiters and stops the
    /// transport. Idempotent.
    pub fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("PIPELINE | Shutting down");
        self.shutdown.cancel();
        self.gate.close();
        self.transport.shutdown();
        let stats = self.gate.stats();
        debug!(
            "PIPELINE | Shut down, {} delivered, {} failed, {} outstanding",
            stats.delivered, stats.failed, stats.outstanding
        );
    }
}

impl<T: Transport> std::fmt::Debug for EventPipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPipeline")
            .field("endpoint", &self.config.endpoint)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::transport::SendOutcome;

    /// Keeps records in memory and resolves them on flush.
    struct MemoryTransport {
        gate: Arc<FlushGate>,
        queued: Mutex<Vec<EventRecord>>,
        sent: Mutex<Vec<EventRecord>>,
        reachable: bool,
        /// Flush takes the records but never resolves them.
        stalled: AtomicBool,
        closed: AtomicBool,
    }

    impl MemoryTransport {
        fn new(gate: &Arc<FlushGate>, reachable: bool) -> Arc<Self> {
            Arc::new(MemoryTransport {
                gate: Arc::clone(gate),
                queued: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                reachable,
                stalled: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        fn enqueue(&self, record: EventRecord) -> Result<(), TransportError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            self.queued.lock().unwrap().push(record);
            self.gate.on_send_enqueued();
            Ok(())
        }

        async fn flush(&self) -> Result<(), TransportError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            if !self.reachable {
                return Err(TransportError::Unavailable("no route to host".to_string()));
            }
            let records: Vec<EventRecord> = self.queued.lock().unwrap().drain(..).collect();
            if self.stalled.load(Ordering::SeqCst) {
                return Ok(());
            }
            for _ in &records {
                self.gate.on_send_completed(SendOutcome::Delivered);
            }
            self.sent.lock().unwrap().extend(records);
            Ok(())
        }

        fn shutdown(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn config(propagate_failures: bool) -> Arc<Config> {
        Arc::new(Config {
            write_key: "wk".to_string(),
            flush_max_attempts: 2,
            flush_initial_backoff_ms: 10,
            flush_attempt_timeout: 1,
            propagate_failures,
            ..Config::default()
        })
    }

    fn pipeline(
        propagate_failures: bool,
        reachable: bool,
    ) -> (EventPipeline<MemoryTransport>, Arc<MemoryTransport>) {
        let gate = Arc::new(FlushGate::new());
        let transport = MemoryTransport::new(&gate, reachable);
        let pipeline =
            EventPipeline::with_transport(config(propagate_failures), gate, Arc::clone(&transport));
        (pipeline, transport)
    }

    fn purchase(user_id: &str) -> Purchase {
        serde_json::from_value(serde_json::json!({
            "order_id": "o-42",
            "user_id": user_id,
            "email": "jane@example.com",
            "total": 19.99,
            "products": [{ "product_id": "p-1", "name": "Mug", "price": 19.99 }]
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_event_ships_identify_and_track() {
        let (pipeline, transport) = pipeline(true, true);

        pipeline.create_event(&purchase("u-1")).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[0], EventRecord::Identify { .. }));
        assert!(matches!(
            &sent[1],
            EventRecord::Track { event, .. } if event == "Order Completed"
        ));
        assert_eq!(
            pipeline.stats(),
            GateStats {
                enqueued: 2,
                delivered: 2,
                failed: 0,
                outstanding: 0,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_purchase_is_swallowed_by_default() {
        let (pipeline, transport) = pipeline(false, true);
        pipeline.create_event(&purchase("")).await.unwrap();
        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(pipeline.stats().enqueued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_purchase_propagates_in_strict_mode() {
        let (pipeline, _) = pipeline(true, true);
        let err = pipeline.create_event(&purchase("")).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Event(EventError::MissingUserId(ref order)) if order == "o-42"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_transport_is_swallowed_by_default() {
        let (pipeline, _) = pipeline(false, false);
        pipeline.create_event(&purchase("u-1")).await.unwrap();
        assert_eq!(pipeline.stats().outstanding, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_transport_propagates_in_strict_mode() {
        let (pipeline, _) = pipeline(true, false);
        let err = pipeline.create_event(&purchase("u-1")).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Flush(FlushError::RetriesExhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent_and_rejects_new_events() {
        let (pipeline, _) = pipeline(true, true);

        pipeline.cleanup();
        pipeline.cleanup();

        let err = pipeline.create_event(&purchase("u-1")).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Transport(TransportError::Closed)
        ));
    }

    const INPUT: &[u8] = b"{\"order_id\":\"o-1\",\"user_id\":\"u-1\",\"total\":5.0}

not json
{\"order_id\":\"o-2\",\"user_id\":\"u-2\",\"total\":7.5}
";

    #[tokio::test(start_paused = true)]
    async fn test_consume_skips_blank_and_malformed_lines() {
        let (pipeline, transport) = pipeline(true, true);

        let consumed = pipeline.consume(INPUT).await.unwrap();

        assert_eq!(consumed, 2);
        assert_eq!(transport.sent.lock().unwrap().len(), 4);
        assert_eq!(pipeline.stats().delivered, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_releases_event_in_flight_and_stops_consume() {
        let (pipeline, transport) = pipeline(true, true);
        transport.stalled.store(true, Ordering::SeqCst);

        let (result, ()) = tokio::join!(pipeline.consume(INPUT), async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            pipeline.cleanup();
        });

        assert!(matches!(
            result,
            Err(PipelineError::Flush(FlushError::ShuttingDown))
        ));
        // the second purchase was never read
        assert_eq!(pipeline.stats().enqueued, 2);
        assert!(pipeline.is_shut_down());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_stops_consume_in_swallow_mode() {
        let (pipeline, transport) = pipeline(false, true);
        transport.stalled.store(true, Ordering::SeqCst);

        let (result, ()) = tokio::join!(pipeline.consume(INPUT), async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            pipeline.cleanup();
        });

        assert_eq!(result.unwrap(), 1);
        assert_eq!(pipeline.stats().enqueued, 2);
    }
}
