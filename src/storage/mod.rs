//! Durable persistence for pending batches, plus the lightweight fallback
//! ledger, the process-durable counter, and the resource-pressure flag.

pub mod counter;
pub mod ledger;
pub mod pressure;
pub mod sled_store;

pub use counter::{Counter, MemoryCounter, SledCounter, keys};
pub use ledger::FileLedger;
pub use pressure::{MemoryPressure, PressureState};
pub use sled_store::SledBatchStore;

use crate::domain::BatchRecord;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("batch not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transactional persistence for pending batches, keyed by record identity.
///
/// `insert` must be atomic: a partially-written record must never become
/// visible to `fetch_oldest`. Ordering is creation order, oldest first.
pub trait BatchStore: Send + 'static {
    fn insert(&self, record: &BatchRecord) -> Result<(), StoreError>;
    fn fetch_oldest(&self) -> Result<Option<BatchRecord>, StoreError>;
    fn remove(&self, id: &str) -> Result<(), StoreError>;
}

/// Secondary crash-survivable store for batches the engine holds outside
/// the durable store. Loaded once at engine setup; written back whenever a
/// restored record is retired.
pub trait PendingLedger: Send + 'static {
    fn load_pending(&self) -> Vec<BatchRecord>;
    fn save_pending(&self, records: &[BatchRecord]) -> Result<(), LedgerError>;
}
