use super::{LedgerError, PendingLedger};
use crate::domain::{Batch, BatchRecord};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const LEDGER_FILENAME: &str = "pending_batches.json";

/// Fallback ledger: a single JSON file mapping record id to batch. Used to
/// carry the engine's non-store backlog across process death. The file name
/// is prefixed with the API key so independent pipeline instances don't
/// clobber each other.
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(dir: impl AsRef<Path>, api_key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{api_key}_{LEDGER_FILENAME}")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PendingLedger for FileLedger {
    fn load_pending(&self) -> Vec<BatchRecord> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!("no pending-batches ledger at {:?}: {e}", self.path);
                return Vec::new();
            }
        };
        let saved: HashMap<String, Batch> = match serde_json::from_slice(&data) {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!("unreadable pending-batches ledger, dropping it: {e}");
                return Vec::new();
            }
        };

        let mut records: Vec<BatchRecord> = saved
            .into_iter()
            .map(|(id, batch)| BatchRecord {
                id,
                batch,
                synchronous: false,
            })
            .collect();
        // The on-disk map is unordered; drain oldest first.
        records.sort_by_key(|r| r.batch.batch_num().unwrap_or(i64::MAX));
        tracing::debug!("loaded {} pending batches from ledger", records.len());
        records
    }

    fn save_pending(&self, records: &[BatchRecord]) -> Result<(), LedgerError> {
        let map: HashMap<&str, &Batch> = records
            .iter()
            .map(|r| (r.id.as_str(), &r.batch))
            .collect();
        let data = serde_json::to_vec(&map)?;
        std::fs::write(&self.path, data)?;
        tracing::debug!("saved {} pending batches to ledger", records.len());
        Ok(())
    }
}
