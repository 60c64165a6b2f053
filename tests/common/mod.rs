#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use pulse_telemetry::domain::{BatchRecord, Event};
use pulse_telemetry::engine::RetryConfig;
use pulse_telemetry::sender::BatchSender;
use pulse_telemetry::storage::{BatchStore, LedgerError, PendingLedger, StoreError};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub fn event(name: &str, n: i64) -> Event {
    Event::new(name, Map::new(), "2024-01-01T00:00:00+00:00".to_string(), n)
}

pub fn event_with_payload(name: &str, n: i64, payload_len: usize) -> Event {
    let mut data = Map::new();
    data.insert("payload".to_string(), Value::from("x".repeat(payload_len)));
    Event::new(name, data, "2024-01-01T00:00:00+00:00".to_string(), n)
}

/// Retry schedule compressed to test scale: base 20 ms, later attempts
/// around 50 ms.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        base_delay: Duration::from_millis(20),
        growth: 0.1,
        offset: 0.05,
        max_attempts: 10,
    }
}

pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Scripted sender: pops one outcome per send (defaulting to success once
/// the script runs dry), captures payloads, and tracks send concurrency.
#[derive(Clone, Default)]
pub struct StubSender {
    outcomes: Arc<Mutex<VecDeque<bool>>>,
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl StubSender {
    pub fn with_outcomes(outcomes: impl IntoIterator<Item = bool>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn sent_count(&self) -> usize {
        self.payloads.lock().len()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().clone()
    }

    /// Events of the n-th sent batch, decoded from its payload.
    pub fn sent_events(&self, index: usize) -> Vec<Event> {
        let payload = self.payloads.lock()[index].clone();
        let value: Value = serde_json::from_slice(&payload).unwrap();
        serde_json::from_value(value["events"].clone()).unwrap()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl BatchSender for StubSender {
    fn send_batch(&self, payload: Bytes) -> impl Future<Output = bool> + Send {
        let stub = self.clone();
        async move {
            let now = stub.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            stub.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if stub.delay > Duration::ZERO {
                tokio::time::sleep(stub.delay).await;
            }
            stub.payloads.lock().push(payload.to_vec());
            let outcome = stub.outcomes.lock().pop_front().unwrap_or(true);
            stub.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    fn set_user_token(&self, _token: Option<String>) {}
}

/// In-memory batch store with scriptable insert failure.
#[derive(Clone, Default)]
pub struct MemStore {
    records: Arc<Mutex<Vec<BatchRecord>>>,
    fail_inserts: Arc<AtomicBool>,
    insert_attempts: Arc<AtomicUsize>,
    removed: Arc<Mutex<Vec<String>>>,
}

impl MemStore {
    pub fn failing_inserts() -> Self {
        let store = Self::default();
        store.fail_inserts.store(true, Ordering::SeqCst);
        store
    }

    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Vec<BatchRecord> {
        self.records.lock().clone()
    }

    pub fn removed_ids(&self) -> Vec<String> {
        self.removed.lock().clone()
    }
}

impl BatchStore for MemStore {
    fn insert(&self, record: &BatchRecord) -> Result<(), StoreError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("no space left".to_string()));
        }
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn fetch_oldest(&self) -> Result<Option<BatchRecord>, StoreError> {
        Ok(self.records.lock().first().cloned())
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        match records.iter().position(|r| r.id == id) {
            Some(pos) => {
                records.remove(pos);
                self.removed.lock().push(id.to_string());
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }
}

/// In-memory pending ledger.
#[derive(Clone, Default)]
pub struct MemLedger {
    pending: Arc<Mutex<Vec<BatchRecord>>>,
    saves: Arc<AtomicUsize>,
}

impl MemLedger {
    pub fn with_pending(records: Vec<BatchRecord>) -> Self {
        Self {
            pending: Arc::new(Mutex::new(records)),
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn pending(&self) -> Vec<BatchRecord> {
        self.pending.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl PendingLedger for MemLedger {
    fn load_pending(&self) -> Vec<BatchRecord> {
        self.pending.lock().clone()
    }

    fn save_pending(&self, records: &[BatchRecord]) -> Result<(), LedgerError> {
        *self.pending.lock() = records.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
