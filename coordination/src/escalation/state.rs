//! Escalation State: tiers, phases, and the per-session state machine

use serde::{Deserialize, Serialize};

use crate::escalation::outcome::FixOutcome;
use crate::memory::RepairStrategy;
use crate::trace::ErrorDescription;

/// Generation tiers, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTier {
    /// Low-cost model, tried first.
    Cheap,
    /// Higher-capability model, last resort.
    Smart,
}

impl GenerationTier {
    /// Default per-attempt cost in USD.
    pub fn default_cost(&self) -> f64 {
        match self {
            Self::Cheap => 0.0002,
            Self::Smart => 0.006,
        }
    }
}

impl std::fmt::Display for GenerationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cheap => write!(f, "cheap"),
            Self::Smart => write!(f, "smart"),
        }
    }
}

/// What produced a successful fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelUsed {
    Cheap,
    Smart,
    /// Replayed from fix memory, no model call.
    Memory,
}

impl From<GenerationTier> for ModelUsed {
    fn from(tier: GenerationTier) -> Self {
        match tier {
            GenerationTier::Cheap => Self::Cheap,
            GenerationTier::Smart => Self::Smart,
        }
    }
}

impl std::fmt::Display for ModelUsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cheap => write!(f, "cheap"),
            Self::Smart => write!(f, "smart"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Phases a healing session can visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingPhase {
    Parsing,
    Relating,
    MemoryLookup,
    GenerateCheap,
    ValidateCheap,
    MemoryFallback,
    GenerateSmart,
    ValidateSmart,
    Done,
}

impl std::fmt::Display for HealingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Parsing => "parsing",
            Self::Relating => "relating",
            Self::MemoryLookup => "memory_lookup",
            Self::GenerateCheap => "generate_cheap",
            Self::ValidateCheap => "validate_cheap",
            Self::MemoryFallback => "memory_fallback",
            Self::GenerateSmart => "generate_smart",
            Self::ValidateSmart => "validate_smart",
            Self::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// Session state with the data each phase needs.
#[derive(Debug)]
pub enum SessionState {
    Parsing {
        raw: String,
    },
    Relating {
        error: ErrorDescription,
    },
    MemoryLookup {
        error: ErrorDescription,
    },
    GenerateCheap {
        error: ErrorDescription,
        strategies: Vec<RepairStrategy>,
    },
    ValidateCheap {
        error: ErrorDescription,
        strategies: Vec<RepairStrategy>,
        candidate: String,
    },
    /// Entered only after a cheap-tier hard failure with strategies on hand.
    MemoryFallback {
        error: ErrorDescription,
        strategies: Vec<RepairStrategy>,
        reason: String,
    },
    GenerateSmart {
        error: ErrorDescription,
        strategies: Vec<RepairStrategy>,
        reason: String,
    },
    ValidateSmart {
        error: ErrorDescription,
        candidate: String,
    },
    Done(Box<FixOutcome>),
}

impl SessionState {
    pub fn phase(&self) -> HealingPhase {
        match self {
            Self::Parsing { .. } => HealingPhase::Parsing,
            Self::Relating { .. } => HealingPhase::Relating,
            Self::MemoryLookup { .. } => HealingPhase::MemoryLookup,
            Self::GenerateCheap { .. } => HealingPhase::GenerateCheap,
            Self::ValidateCheap { .. } => HealingPhase::ValidateCheap,
            Self::MemoryFallback { .. } => HealingPhase::MemoryFallback,
            Self::GenerateSmart { .. } => HealingPhase::GenerateSmart,
            Self::ValidateSmart { .. } => HealingPhase::ValidateSmart,
            Self::Done(_) => HealingPhase::Done,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn done(outcome: FixOutcome) -> Self {
        Self::Done(Box::new(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_costs() {
        assert_eq!(GenerationTier::Cheap.default_cost(), 0.0002);
        assert_eq!(GenerationTier::Smart.default_cost(), 0.006);
    }

    #[test]
    fn test_model_used_serialization() {
        let used: ModelUsed = GenerationTier::Smart.into();
        assert_eq!(used, ModelUsed::Smart);
        assert_eq!(serde_json::to_string(&ModelUsed::Memory).unwrap(), "\"memory\"");
        assert_eq!(ModelUsed::Cheap.to_string(), "cheap");
    }

    #[test]
    fn test_phase_tracking() {
        let state = SessionState::Parsing { raw: "x".into() };
        assert_eq!(state.phase(), HealingPhase::Parsing);
        assert!(!state.is_terminal());

        let done = SessionState::done(FixOutcome::failure("could not parse error"));
        assert_eq!(done.phase(), HealingPhase::Done);
        assert!(done.is_terminal());
        assert_eq!(HealingPhase::MemoryFallback.to_string(), "memory_fallback");
    }
}
