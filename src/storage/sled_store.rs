use super::{BatchStore, StoreError};
use crate::domain::BatchRecord;
use std::path::Path;

const BATCHES_TREE: &str = "batches";

/// Batch store backed by an embedded sled database.
///
/// Keys are sled's monotonic `generate_id` sequence, so iteration order is
/// insertion order and `fetch_oldest` never depends on wall clocks. Values
/// are JSON-encoded records: event parameters are arbitrary JSON, which
/// needs a self-describing codec.
pub struct SledBatchStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledBatchStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::with_db(db)
    }

    /// Attaches to an already-open database, e.g. one shared with the
    /// counter trees.
    pub fn with_db(db: sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree(BATCHES_TREE)?;
        Ok(Self { db, tree })
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn decode(value: &[u8]) -> Result<BatchRecord, StoreError> {
        Ok(serde_json::from_slice(value)?)
    }
}

impl BatchStore for SledBatchStore {
    fn insert(&self, record: &BatchRecord) -> Result<(), StoreError> {
        let seq = self.db.generate_id()?;
        let value = serde_json::to_vec(record)?;
        self.tree.insert(seq.to_be_bytes(), value)?;
        self.tree.flush()?;
        tracing::debug!("stored batch {} at seq {seq}", record.id);
        Ok(())
    }

    fn fetch_oldest(&self) -> Result<Option<BatchRecord>, StoreError> {
        match self.tree.first()? {
            Some((_, value)) => Ok(Some(Self::decode(&value)?)),
            None => Ok(None),
        }
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        for item in self.tree.iter() {
            let (key, value) = item?;
            let record = Self::decode(&value)?;
            if record.id == id {
                self.tree.remove(key)?;
                self.tree.flush()?;
                tracing::debug!("removed batch {id}");
                return Ok(());
            }
        }
        Err(StoreError::NotFound(id.to_string()))
    }
}
