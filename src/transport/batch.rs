use std::collections::VecDeque;

use chrono::{SecondsFormat, Utc};

use crate::events::EventRecord;
use crate::transport::TransportError;
use crate::transport::constants;

/// One request body plus the number of records packed into it.
#[derive(Debug)]
pub struct Batch {
    pub payload: Vec<u8>,
    pub records: usize,
}

#[derive(Default, Debug)]
pub struct Aggregator {
    messages: VecDeque<String>,
}

impl Aggregator {
    pub fn add(&mut self, record: &EventRecord) -> Result<(), TransportError> {
        let serialized = serde_json::to_string(record)?;
        if serialized.len() > constants::MAX_MESSAGE_SIZE_BYTES {
            return Err(TransportError::MessageTooLarge {
                size: serialized.len(),
                limit: constants::MAX_MESSAGE_SIZE_BYTES,
            });
        }
        self.messages.push_back(serialized);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Pops the next batch, `None` once the queue is empty.
    pub fn get_batch(&mut self) -> Option<Batch> {
        if self.messages.is_empty() {
            return None;
        }

        let sent_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let suffix = format!("],\"sentAt\":\"{sent_at}\"}}");
        let mut buffer: Vec<u8> = Vec::with_capacity(constants::MAX_BATCH_SIZE_BYTES);
        buffer.extend(b"{\"batch\":[");

        let mut records = 0;
        while records < constants::MAX_BATCH_ENTRIES_SIZE {
            let Some(message) = self.messages.pop_front() else {
                break;
            };
            // The first record always fits, records are capped well below the batch size
            if records > 0
                && buffer.len() + 1 + message.len() + suffix.len() > constants::MAX_BATCH_SIZE_BYTES
            {
                // Put the record back in the queue
                self.messages.push_front(message);
                break;
            }
            if records > 0 {
                buffer.push(b',');
            }
            buffer.extend(message.as_bytes());
            records += 1;
        }

        buffer.extend(suffix.as_bytes());
        Some(Batch {
            payload: buffer,
            records,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Map, Value};

    use super::*;
    use crate::events::{EventRecord, Purchase};

    fn record_with_padding(padding: usize) -> EventRecord {
        let purchase: Purchase =
            serde_json::from_str(r#"{"order_id":"o-1","user_id":"u-1","total":1.0}"#).unwrap();
        let mut record = EventRecord::identify(&purchase).unwrap();
        if let EventRecord::Identify { traits, .. } = &mut record {
            let mut padded = Map::new();
            padded.insert("note".to_string(), Value::from("x".repeat(padding)));
            *traits = padded;
        }
        record
    }

    fn parse(batch: &Batch) -> Value {
        serde_json::from_slice(&batch.payload).unwrap()
    }

    #[test]
    fn add() {
        let mut aggregator = Aggregator::default();
        let record = record_with_padding(10);
        aggregator.add(&record).unwrap();
        assert_eq!(aggregator.len(), 1);
        assert_eq!(
            aggregator.messages[0],
            serde_json::to_string(&record).unwrap()
        );
    }

    #[test]
    fn add_rejects_oversized_record() {
        let mut aggregator = Aggregator::default();
        let err = aggregator
            .add(&record_with_padding(constants::MAX_MESSAGE_SIZE_BYTES))
            .unwrap_err();
        assert!(matches!(err, TransportError::MessageTooLarge { .. }));
        assert!(aggregator.is_empty());
    }

    #[test]
    fn get_batch() {
        let mut aggregator = Aggregator::default();
        let record = record_with_padding(10);
        aggregator.add(&record).unwrap();

        let batch = aggregator.get_batch().unwrap();
        assert_eq!(batch.records, 1);
        let value = parse(&batch);
        assert_eq!(value["batch"][0], serde_json::to_value(&record).unwrap());
        assert!(value["sentAt"].is_string());
        assert!(aggregator.get_batch().is_none());
    }

    #[test]
    fn get_batch_respects_entry_limit() {
        let mut aggregator = Aggregator::default();
        for _ in 0..250 {
            aggregator.add(&record_with_padding(10)).unwrap();
        }

        let mut sizes = Vec::new();
        while let Some(batch) = aggregator.get_batch() {
            assert_eq!(parse(&batch)["batch"].as_array().unwrap().len(), batch.records);
            sizes.push(batch.records);
        }
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[test]
    fn get_batch_respects_size_limit() {
        let mut aggregator = Aggregator::default();
        for _ in 0..40 {
            aggregator.add(&record_with_padding(30 * 1_024)).unwrap();
        }

        let mut total = 0;
        while let Some(batch) = aggregator.get_batch() {
            assert!(batch.payload.len() <= constants::MAX_BATCH_SIZE_BYTES);
            assert!(batch.records < 40);
            parse(&batch);
            total += batch.records;
        }
        assert_eq!(total, 40);
    }
}
