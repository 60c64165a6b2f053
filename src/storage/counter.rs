use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

/// Keys the pipeline counts under.
pub mod keys {
    pub const BATCH_NUM: &str = "batch_num";
    pub const EVENT_NUM: &str = "event_num";
}

/// Monotonic counter namespaced by string key. Increment-and-return is
/// atomic, safe for concurrent callers across multiple engine instances.
pub trait Counter: Send + Sync + 'static {
    fn incremented_count(&self, key: &str) -> i64;
}

const COUNTERS_TREE: &str = "counters";

/// Counter persisted in a sled tree, surviving process restarts.
pub struct SledCounter {
    tree: sled::Tree,
}

impl SledCounter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Self::with_db(&db)
    }

    pub fn with_db(db: &sled::Db) -> Result<Self, sled::Error> {
        Ok(Self {
            tree: db.open_tree(COUNTERS_TREE)?,
        })
    }
}

fn decode_count(bytes: &[u8]) -> i64 {
    bytes.try_into().map(i64::from_be_bytes).unwrap_or(0)
}

impl Counter for SledCounter {
    fn incremented_count(&self, key: &str) -> i64 {
        let updated = self.tree.update_and_fetch(key, |old| {
            let next = old.map_or(0, decode_count) + 1;
            Some(next.to_be_bytes().to_vec())
        });
        match updated {
            Ok(Some(value)) => {
                let count = decode_count(&value);
                if let Err(e) = self.tree.flush() {
                    tracing::warn!("failed to flush counter {key}: {e}");
                }
                count
            }
            Ok(None) => 0,
            Err(e) => {
                tracing::error!("failed to increment counter {key}: {e}");
                0
            }
        }
    }
}

/// Non-durable counter for tests and previews.
#[derive(Default)]
pub struct MemoryCounter {
    counts: Mutex<HashMap<String, i64>>,
}

impl Counter for MemoryCounter {
    fn incremented_count(&self, key: &str) -> i64 {
        let mut counts = self.counts.lock();
        let count = counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn counts_are_independent_per_key() {
        let counter = MemoryCounter::default();
        assert_eq!(counter.incremented_count(keys::EVENT_NUM), 1);
        assert_eq!(counter.incremented_count(keys::EVENT_NUM), 2);
        assert_eq!(counter.incremented_count(keys::BATCH_NUM), 1);
    }

    #[test]
    fn sled_counter_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let counter = SledCounter::open(dir.path()).unwrap();
            assert_eq!(counter.incremented_count(keys::BATCH_NUM), 1);
            assert_eq!(counter.incremented_count(keys::BATCH_NUM), 2);
        }
        let counter = SledCounter::open(dir.path()).unwrap();
        assert_eq!(counter.incremented_count(keys::BATCH_NUM), 3);
    }
}
