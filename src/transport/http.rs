use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, error, warn};
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::config::Config;
use crate::events::EventRecord;
use crate::http_client;
use crate::transport::batch::{Aggregator, Batch};
use crate::transport::constants::BATCH_PATH;
use crate::transport::{SendListener, SendOutcome, Transport, TransportError};
use crate::{LIBRARY_NAME, LIBRARY_VERSION};

/// Batching transport posting to the intake's batch endpoint.
///
/// Records wait in memory until `flush`; each batch is then sent on its own
/// task and every record in it is reported to the listener once the request
/// resolves. There is no retry at this level.
pub struct HttpTransport {
    write_key: String,
    url: String,
    client: reqwest::Client,
    config: Arc<Config>,
    aggregator: Mutex<Aggregator>,
    listener: Arc<dyn SendListener>,
    closed: AtomicBool,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: Arc<Config>, listener: Arc<dyn SendListener>) -> Self {
        let client = http_client::get_client(&config);
        HttpTransport {
            write_key: config.write_key.clone(),
            url: format!("{}{BATCH_PATH}", config.endpoint),
            client,
            config,
            aggregator: Mutex::new(Aggregator::default()),
            listener,
            closed: AtomicBool::new(false),
        }
    }

    /// Records queued and not yet handed to a send.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.lock_aggregator().len()
    }

    fn lock_aggregator(&self) -> std::sync::MutexGuard<'_, Aggregator> {
        // The queue holds plain strings, a panic mid-push leaves it usable
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn take_batches(aggregator: &mut Aggregator) -> Vec<Batch> {
        let mut batches = Vec::new();
        while let Some(batch) = aggregator.get_batch() {
            batches.push(batch);
        }
        batches
    }

    async fn send(
        client: reqwest::Client,
        write_key: String,
        url: String,
        batch: Batch,
        compression_enabled: bool,
        compression_level: u32,
    ) -> SendOutcome {
        let records = batch.records;
        let data = batch.payload;
        let size = data.len();
        debug!(
            "TRANSPORT | POST {url} request body: {}",
            String::from_utf8_lossy(&data)
        );
        let (body, compressed) = if compression_enabled {
            let result = (|| -> std::io::Result<Vec<u8>> {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::new(compression_level));
                encoder.write_all(&data)?;
                encoder.finish()
            })();

            match result {
                Ok(compressed_data) => (compressed_data, true),
                Err(e) => {
                    debug!("TRANSPORT | Failed to compress batch: {e}, sending uncompressed data");
                    (data, false)
                }
            }
        } else {
            (data, false)
        };

        let req = client
            .post(&url)
            .basic_auth(write_key, Some(""))
            .header("Content-Type", "application/json")
            .header("User-Agent", format!("{LIBRARY_NAME}/{LIBRARY_VERSION}"));
        let req = if compressed {
            req.header("Content-Encoding", "gzip")
        } else {
            req
        };

        let post_time = std::time::Instant::now();
        let resp = req.body(body).send().await;
        let elapsed = post_time.elapsed().as_millis();

        match resp {
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                debug!(
                    "TRANSPORT | POST {url} ({records} records, {size} bytes) -> {status} in {elapsed}ms, response body: {text}"
                );
                if status.is_success() {
                    SendOutcome::Delivered
                } else {
                    error!(
                        "TRANSPORT | Failed to send batch of {records} records: {status} {text}"
                    );
                    SendOutcome::Failed
                }
            }
            Err(e) => {
                error!("TRANSPORT | Failed to send batch of {records} records: {e}");
                SendOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn enqueue(&self, record: EventRecord) -> Result<(), TransportError> {
        let mut guard = self.lock_aggregator();
        // Checked under the lock so a concurrent shutdown cannot strand the record
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        guard.add(&record)?;
        // Counted while the queue is still locked so that no flush can
        // complete this record before it is known to be outstanding
        self.listener.on_send_enqueued();
        drop(guard);
        Ok(())
    }

    async fn flush(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let batches = Self::take_batches(&mut self.lock_aggregator());
        if batches.is_empty() {
            return Ok(());
        }
        debug!("TRANSPORT | Flushing {} batches", batches.len());

        for batch in batches {
            let client = self.client.clone();
            let write_key = self.write_key.clone();
            let url = self.url.clone();
            let listener = Arc::clone(&self.listener);
            let use_compression = self.config.use_compression;
            let compression_level = self.config.compression_level;
            tokio::spawn(async move {
                let records = batch.records;
                let outcome = Self::send(
                    client,
                    write_key,
                    url,
                    batch,
                    use_compression,
                    compression_level,
                )
                .await;
                for _ in 0..records {
                    listener.on_send_completed(outcome);
                }
            });
        }
        Ok(())
    }

    fn shutdown(&self) {
        let mut guard = self.lock_aggregator();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = Self::take_batches(&mut guard);
        drop(guard);
        let count: usize = dropped.iter().map(|b| b.records).sum();
        if count > 0 {
            warn!("TRANSPORT | Shutting down with {count} unflushed records, dropping them");
        }
        for _ in 0..count {
            self.listener.on_send_completed(SendOutcome::Failed);
        }
        debug!("TRANSPORT | Transport shut down");
    }
}
