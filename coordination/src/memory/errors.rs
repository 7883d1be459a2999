//! Fix memory error taxonomy.

use thiserror::Error;

/// Errors raised by fix memory backends.
///
/// The orchestrator never lets these end a session: a failed lookup is
/// treated as "no strategies", a failed store is logged.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("memory serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("memory file version {found} is newer than supported version {supported}")]
    VersionMismatch { found: u32, supported: u32 },

    #[error("memory lock poisoned")]
    LockPoisoned,

    #[error("memory backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "rocksdb-store")]
impl From<rocksdb::Error> for MemoryError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Backend(e.to_string())
    }
}
