//! Durable fix memory backed by a single JSON document.
//!
//! The whole document is loaded at open and rewritten on every store:
//! write to `<path>.tmp`, then rename over the original.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::escalation::FixOutcome;
use crate::memory::{
    rank_similar, upsert, FixMemory, MemoryError, RepairStrategy, DEFAULT_RETRIEVAL_LIMIT,
};
use crate::trace::ErrorDescription;

/// Current on-disk document version.
pub const MEMORY_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct MemoryDocument {
    version: u32,
    strategies: Vec<RepairStrategy>,
}

/// JSON file store. Sessions in one process serialize through the writer
/// lock; across processes the last writer wins.
///
/// The in-memory map only changes after the document reached disk, so a
/// failed save leaves both sides at the previous state.
#[derive(Debug)]
pub struct JsonFileFixMemory {
    path: PathBuf,
    strategies: Mutex<HashMap<String, RepairStrategy>>,
    writer: tokio::sync::Mutex<()>,
}

impl JsonFileFixMemory {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file is an empty store; the file and its parent directory
    /// are created on the first store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();
        let strategies = load_document(&path)?;
        info!(path = %path.display(), strategies = strategies.len(), "Fix memory opened");
        Ok(Self {
            path,
            strategies: Mutex::new(strategies),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.strategies.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn load_document(path: &Path) -> Result<HashMap<String, RepairStrategy>, MemoryError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let json = std::fs::read_to_string(path)?;
    if json.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let doc: MemoryDocument = serde_json::from_str(&json)?;
    if doc.version > MEMORY_FORMAT_VERSION {
        return Err(MemoryError::VersionMismatch {
            found: doc.version,
            supported: MEMORY_FORMAT_VERSION,
        });
    }
    Ok(doc
        .strategies
        .into_iter()
        .map(|s| (s.fingerprint.clone(), s))
        .collect())
}

fn save_document(path: &Path, strategies: &HashMap<String, RepairStrategy>) -> Result<(), MemoryError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut ordered: Vec<RepairStrategy> = strategies.values().cloned().collect();
    ordered.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
    let doc = MemoryDocument {
        version: MEMORY_FORMAT_VERSION,
        strategies: ordered,
    };

    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, serde_json::to_string_pretty(&doc)?)?;
    std::fs::rename(&temp_path, path)?;
    debug!(path = %path.display(), strategies = doc.strategies.len(), "Fix memory saved");
    Ok(())
}

#[async_trait]
impl FixMemory for JsonFileFixMemory {
    async fn retrieve_similar(
        &self,
        error: &ErrorDescription,
    ) -> Result<Vec<RepairStrategy>, MemoryError> {
        let guard = self
            .strategies
            .lock()
            .map_err(|_| MemoryError::LockPoisoned)?;
        Ok(rank_similar(
            guard.values().cloned(),
            error,
            DEFAULT_RETRIEVAL_LIMIT,
        ))
    }

    async fn store(
        &self,
        error: &ErrorDescription,
        outcome: &FixOutcome,
    ) -> Result<(), MemoryError> {
        let _writer = self.writer.lock().await;

        let key = self.fingerprint(error);
        let mut next = self
            .strategies
            .lock()
            .map_err(|_| MemoryError::LockPoisoned)?
            .clone();
        let updated = upsert(next.get(&key).cloned(), error, outcome);
        next.insert(key, updated);

        let path = self.path.clone();
        let next = tokio::task::spawn_blocking(move || save_document(&path, &next).map(|()| next))
            .await
            .map_err(|e| MemoryError::Backend(format!("memory save task failed: {e}")))??;

        *self
            .strategies
            .lock()
            .map_err(|_| MemoryError::LockPoisoned)? = next;
        Ok(())
    }
}
