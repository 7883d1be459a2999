//! Process-local fix memory.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::escalation::FixOutcome;
use crate::memory::{
    rank_similar, upsert, FixMemory, MemoryError, RepairStrategy, DEFAULT_RETRIEVAL_LIMIT,
};
use crate::trace::ErrorDescription;

/// In-memory store; lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryFixMemory {
    strategies: RwLock<HashMap<String, RepairStrategy>>,
}

impl InMemoryFixMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing strategies, keyed by their own fingerprints.
    pub fn with_strategies(strategies: impl IntoIterator<Item = RepairStrategy>) -> Self {
        let map = strategies
            .into_iter()
            .map(|s| (s.fingerprint.clone(), s))
            .collect();
        Self {
            strategies: RwLock::new(map),
        }
    }

    pub fn len(&self) -> usize {
        self.strategies.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a single strategy by fingerprint.
    pub fn get(&self, fingerprint: &str) -> Option<RepairStrategy> {
        self.strategies.read().ok()?.get(fingerprint).cloned()
    }
}

#[async_trait]
impl FixMemory for InMemoryFixMemory {
    async fn retrieve_similar(
        &self,
        error: &ErrorDescription,
    ) -> Result<Vec<RepairStrategy>, MemoryError> {
        let guard = self
            .strategies
            .read()
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
        let key = self.fingerprint(error);
        let mut guard = self
            .strategies
            .write()
            .map_err(|_| MemoryError::LockPoisoned)?;
        let updated = upsert(guard.remove(&key), error, outcome);
        guard.insert(key, updated);
        Ok(())
    }
}
