//! Escalation: cost-aware repair ladder for one parsed error
//!
//! Cheap attempts come first; the expensive tier is only paid for when
//! everything cheaper has failed.
//!
//! # Escalation Ladder
//!
//! ```text
//! Parsing ── not parseable ──► Done (failure)
//!     │
//!     ▼
//! Relating ─► MemoryLookup ─► GenerateCheap
//!                                 │
//!         ┌───── candidate ───────┤
//!         ▼                       │ hard failure
//!   ValidateCheap                 ├─ strategies on hand ─► MemoryFallback
//!     │      │                    │                          │       │
//!  passed  failed                 │                       passed   failed
//!     │      │                    │                          │       │
//!     │      └────────────────────┴──────► GenerateSmart ◄───┼───────┘
//!     ▼                                     │       │        ▼
//!   store + Done                     candidate   hard failure  Done (memory)
//!                                       │       └──► Done (failure)
//!                                       ▼
//!                                 ValidateSmart ─ passed ─► store + Done
//!                                       └─ failed ─► Done (failure)
//! ```

pub mod collaborators;
pub mod diff;
pub mod orchestrator;
pub mod outcome;
pub mod prompt;
pub mod state;

use thiserror::Error;

pub use collaborators::{
    DependencyFile, FixGenerator, FixValidator, GenerationError, ValidationError,
    ValidationOutcome, ValidationRequest,
};
pub use diff::{changed_lines, line_diff};
pub use orchestrator::{EscalationConfig, HealingOrchestrator};
pub use outcome::FixOutcome;
pub use prompt::{build_prompt, extract_code};
pub use state::{GenerationTier, HealingPhase, ModelUsed, SessionState};

/// Faults that escape a session's own state machine.
#[derive(Debug, Error)]
pub enum HealError {
    #[error("healing session panicked: {0}")]
    Panicked(String),

    #[error("healing session was cancelled")]
    Cancelled,
}

impl From<tokio::task::JoinError> for HealError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            return Self::Cancelled;
        }
        let payload = e.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self::Panicked(message)
    }
}
