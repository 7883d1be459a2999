//! RocksDB-backed fix memory.

use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};

use crate::escalation::FixOutcome;
use crate::memory::{
    rank_similar, upsert, FixMemory, MemoryError, RepairStrategy, DEFAULT_RETRIEVAL_LIMIT,
};
use crate::trace::ErrorDescription;

const STRATEGIES_CF: &str = "strategies";

/// Strategies keyed by fingerprint, values JSON-encoded.
pub struct RocksFixMemory {
    db: RwLock<DB>,
    path: PathBuf,
}

impl RocksFixMemory {
    /// Open or create the database at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![ColumnFamilyDescriptor::new(STRATEGIES_CF, Options::default())];
        let db = DB::open_cf_descriptors(&opts, &path, cfs)?;

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn get(db: &DB, key: &str) -> Result<Option<RepairStrategy>, MemoryError> {
        let cf = db
            .cf_handle(STRATEGIES_CF)
            .ok_or_else(|| MemoryError::Backend(format!("missing column family {STRATEGIES_CF}")))?;
        match db.get_cf(&cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FixMemory for RocksFixMemory {
    async fn retrieve_similar(
        &self,
        error: &ErrorDescription,
    ) -> Result<Vec<RepairStrategy>, MemoryError> {
        let db = self.db.read().map_err(|_| MemoryError::LockPoisoned)?;
        let cf = db
            .cf_handle(STRATEGIES_CF)
            .ok_or_else(|| MemoryError::Backend(format!("missing column family {STRATEGIES_CF}")))?;

        let mut candidates = Vec::new();
        for item in db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            let strategy: RepairStrategy = serde_json::from_slice(&value)?;
            if strategy.error_type == error.error_type {
                candidates.push(strategy);
            }
        }
        Ok(rank_similar(candidates, error, DEFAULT_RETRIEVAL_LIMIT))
    }

    async fn store(
        &self,
        error: &ErrorDescription,
        outcome: &FixOutcome,
    ) -> Result<(), MemoryError> {
        let key = self.fingerprint(error);
        // Write lock serializes the read-modify-write.
        let db = self.db.write().map_err(|_| MemoryError::LockPoisoned)?;
        let updated = upsert(Self::get(&db, &key)?, error, outcome);

        let cf = db
            .cf_handle(STRATEGIES_CF)
            .ok_or_else(|| MemoryError::Backend(format!("missing column family {STRATEGIES_CF}")))?;
        db.put_cf(&cf, key.as_bytes(), serde_json::to_vec(&updated)?)?;
        Ok(())
    }
}
