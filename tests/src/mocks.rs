//! Mock implementations for testing.
//!
//! Each mock implements the same trait as its production counterpart, so
//! the ingest loop and the stream worker run their real code paths against
//! in-memory collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use chrono::NaiveDate;
use pipeline_core::{Error, JoinedRow, NormalizedRecord, RawRecord, Result, SinkBatch};
use redpanda::{decode_message, ConsumedBatch, RecordPublisher, RecordStream};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use worker::{RecordSource, SinkWriter, Translator};

/// In-memory stand-in for the topic: an append-only list of payloads.
#[derive(Clone, Default)]
pub struct TransportLog {
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl TransportLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a payload and returns its offset.
    pub fn append_raw(&self, payload: Vec<u8>) -> i64 {
        let mut messages = self.messages.lock();
        messages.push(payload);
        (messages.len() - 1) as i64
    }

    pub fn append(&self, record: &NormalizedRecord) -> i64 {
        let payload = serde_json::to_vec(record).expect("record serializes");
        self.append_raw(payload)
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every decodable record in offset order.
    pub fn records(&self) -> Vec<NormalizedRecord> {
        self.messages
            .lock()
            .iter()
            .filter_map(|payload| serde_json::from_slice(payload).ok())
            .collect()
    }

    fn range(&self, from: usize, max: usize) -> Vec<(i64, Vec<u8>)> {
        let messages = self.messages.lock();
        messages
            .iter()
            .enumerate()
            .skip(from)
            .take(max)
            .map(|(offset, payload)| (offset as i64, payload.clone()))
            .collect()
    }
}

/// Paginated source over a fixed dataset.
#[derive(Clone, Default)]
pub struct MockSource {
    records: Arc<Mutex<Vec<RawRecord>>>,
    requested: Arc<Mutex<Vec<(u64, u32)>>>,
    fail_next: Arc<AtomicUsize>,
}

impl MockSource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            ..Default::default()
        }
    }

    /// Makes the next `n` fetches fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Adds records that become visible on later pages.
    pub fn publish_more(&self, records: Vec<RawRecord>) {
        self.records.lock().extend(records);
    }

    /// Every (offset, limit) requested so far.
    pub fn requests(&self) -> Vec<(u64, u32)> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl RecordSource for MockSource {
    async fn fetch_page(&self, offset: u64, limit: u32) -> Result<Vec<RawRecord>> {
        self.requested.lock().push((offset, limit));

        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::source_fetch("mock source unavailable"));
        }

        let records = self.records.lock();
        Ok(records
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Publisher appending to a `TransportLog`.
#[derive(Clone)]
pub struct MockPublisher {
    log: TransportLog,
    fail_on: Arc<Mutex<HashSet<String>>>,
    attempts: Arc<AtomicUsize>,
}

impl MockPublisher {
    pub fn new(log: TransportLog) -> Self {
        Self {
            log,
            fail_on: Arc::new(Mutex::new(HashSet::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Rejects every publish of this reference sheet.
    pub fn fail_on(&self, reference_sheet: impl Into<String>) {
        self.fail_on.lock().insert(reference_sheet.into());
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordPublisher for MockPublisher {
    async fn publish(&self, record: &NormalizedRecord) -> Result<i64> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(sheet) = record.reference_sheet.as_deref() {
            if self.fail_on.lock().contains(sheet) {
                return Err(Error::publish(Some(sheet), "mock broker rejected record"));
            }
        }

        Ok(self.log.append(record))
    }
}

/// Translator backed by a small French → English dictionary.
///
/// Unknown text is returned unchanged.
#[derive(Clone)]
pub struct MockTranslator {
    dictionary: Arc<HashMap<String, String>>,
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<AtomicUsize>,
}

impl MockTranslator {
    pub fn new() -> Self {
        let dictionary = [
            ("Jouets", "Toys"),
            ("Alimentation", "Food"),
            ("Maison-habitat", "Home"),
            ("Remboursement", "Refund"),
        ]
        .into_iter()
        .map(|(fr, en)| (fr.to_string(), en.to_string()))
        .collect();

        Self {
            dictionary: Arc::new(dictionary),
            failing: Arc::new(Mutex::new(HashSet::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_on(&self, text: impl Into<String>) {
        self.failing.lock().insert(text.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockTranslator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(source_lang, "fr");
        assert_eq!(target_lang, "en");

        if self.failing.lock().contains(text) {
            return Err(Error::translation("mock quota exceeded"));
        }

        Ok(self
            .dictionary
            .get(text)
            .cloned()
            .unwrap_or_else(|| text.to_string()))
    }
}

/// Sink capturing every accepted batch.
#[derive(Clone, Default)]
pub struct MockSink {
    batches: Arc<Mutex<Vec<SinkBatch>>>,
    fail_next: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
    high_water_reads: Arc<AtomicUsize>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` writes fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<SinkBatch> {
        self.batches.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn high_water_reads(&self) -> usize {
        self.high_water_reads.load(Ordering::SeqCst)
    }

    /// Latest stored row per (category, month), the way a reader of the
    /// append-only table sees current totals.
    pub fn latest_rows(&self) -> Vec<JoinedRow> {
        let mut latest: BTreeMap<(NaiveDate, Option<String>), JoinedRow> = BTreeMap::new();
        for batch in self.batches.lock().iter() {
            for row in &batch.rows {
                latest.insert((row.month, row.product_category.clone()), row.clone());
            }
        }
        latest.into_values().collect()
    }
}

#[async_trait]
impl SinkWriter for MockSink {
    async fn write(&self, batch: &SinkBatch) -> Result<usize> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::sink("mock sink unavailable"));
        }

        self.batches.lock().push(batch.clone());
        Ok(batch.len())
    }

    async fn last_written_offset(&self) -> Result<Option<i64>> {
        self.high_water_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .batches
            .lock()
            .iter()
            .map(|batch| batch.batch_end_offset)
            .max())
    }
}

/// Consumer reading a `TransportLog` in offset order.
#[derive(Clone)]
pub struct MockStream {
    log: TransportLog,
    max_batch: usize,
    resets: Arc<AtomicUsize>,
}

impl MockStream {
    pub fn new(log: TransportLog, max_batch: usize) -> Self {
        Self {
            log,
            max_batch,
            resets: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStream for MockStream {
    async fn fetch_batch(&self, from_offset: i64) -> Result<ConsumedBatch> {
        let from = from_offset.max(0);
        let mut batch = ConsumedBatch {
            start_offset: from,
            next_offset: from,
            ..Default::default()
        };

        for (offset, payload) in self.log.range(from as usize, self.max_batch) {
            batch.next_offset = offset + 1;
            match decode_message(offset, &payload) {
                Ok(record) => batch.records.push(record),
                Err(_) => batch.decode_errors += 1,
            }
        }

        Ok(batch)
    }

    async fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_source_pages() {
        let records = (0..5)
            .map(|i| RawRecord {
                reference_fiche: Some(format!("ref-{}", i)),
                ..Default::default()
            })
            .collect();
        let source = MockSource::new(records);

        let page = source.fetch_page(3, 10).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].reference_fiche.as_deref(), Some("ref-3"));

        source.fail_next(1);
        assert!(source.fetch_page(0, 10).await.is_err());
        assert!(source.fetch_page(0, 10).await.is_ok());
        assert_eq!(source.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_publisher_feeds_stream() {
        let log = TransportLog::new();
        let publisher = MockPublisher::new(log.clone());
        let stream = MockStream::new(log.clone(), 10);

        let record = NormalizedRecord {
            reference_sheet: Some("2023-03-0001".into()),
            ..Default::default()
        };
        assert_eq!(publisher.publish(&record).await.unwrap(), 0);
        log.append_raw(b"not json".to_vec());

        let batch = stream.fetch_batch(0).await.unwrap();
        assert_eq!(batch.records, vec![record]);
        assert_eq!(batch.decode_errors, 1);
        assert_eq!(batch.next_offset, 2);

        assert!(stream.fetch_batch(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mock_sink_failures() {
        let sink = MockSink::new();
        sink.fail_next(2);

        let batch = SinkBatch {
            batch_start_offset: 0,
            batch_end_offset: 1,
            computed_at: chrono::Utc::now(),
            rows: vec![],
        };
        assert!(sink.write(&batch).await.is_err());
        assert!(sink.write(&batch).await.is_err());
        assert!(sink.write(&batch).await.is_ok());
        assert_eq!(sink.attempts(), 3);
        assert_eq!(sink.batches().len(), 1);
    }
}
