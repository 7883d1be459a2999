//! Fix memory: learned repair strategies keyed by error fingerprint.
//!
//! # Modules
//!
//! - [`fingerprint`]: blake3 error fingerprints
//! - [`types`]: `RepairStrategy`, file patterns, ranking
//! - [`local`]: process-local store
//! - [`file_store`]: durable JSON document store
//! - [`rocks`]: RocksDB store (feature `rocksdb-store`)
//! - [`errors`]: backend error taxonomy

pub mod errors;
pub mod file_store;
pub mod fingerprint;
pub mod local;
#[cfg(feature = "rocksdb-store")]
pub mod rocks;
pub mod types;

use async_trait::async_trait;

use crate::escalation::FixOutcome;
use crate::trace::ErrorDescription;

pub use errors::MemoryError;
pub use file_store::JsonFileFixMemory;
pub use fingerprint::{fingerprint, fingerprint_parts};
pub use local::InMemoryFixMemory;
#[cfg(feature = "rocksdb-store")]
pub use rocks::RocksFixMemory;
pub use types::{file_pattern, rank_similar, upsert, RepairStrategy};

/// Maximum strategies returned by a lookup.
pub const DEFAULT_RETRIEVAL_LIMIT: usize = 5;

/// Persistent store of fixes that passed validation.
///
/// Implementations must be safe to share across concurrent sessions.
#[async_trait]
pub trait FixMemory: Send + Sync {
    /// Stable key for the error's (category, file, message) triple.
    fn fingerprint(&self, error: &ErrorDescription) -> String {
        fingerprint(error)
    }

    /// Strategies for the same error category, best first, at most
    /// [`DEFAULT_RETRIEVAL_LIMIT`].
    async fn retrieve_similar(
        &self,
        error: &ErrorDescription,
    ) -> Result<Vec<RepairStrategy>, MemoryError>;

    /// Record an outcome for the error's fingerprint.
    async fn store(&self, error: &ErrorDescription, outcome: &FixOutcome)
        -> Result<(), MemoryError>;
}
