//! Session result reported to callers.

use serde::{Deserialize, Serialize};

use crate::escalation::state::{HealingPhase, ModelUsed};
use crate::trace::ErrorDescription;

/// Final outcome of one healing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixOutcome {
    pub success: bool,
    /// Failure reason; empty on success.
    #[serde(default)]
    pub message: String,
    /// Parsed error; present for every session that got past parsing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// Cost of the attempt that produced this outcome.
    pub cost: f64,
    /// Sum over every generation attempt in the session.
    pub total_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<ModelUsed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_strategy: Option<String>,
    /// Phases visited, in order.
    #[serde(default)]
    pub phases: Vec<HealingPhase>,
}

impl FixOutcome {
    pub fn success(model_used: ModelUsed, cost: f64) -> Self {
        Self {
            success: true,
            message: String::new(),
            error: None,
            fixed_code: None,
            diff: None,
            cost,
            total_cost: cost,
            model_used: Some(model_used),
            fix_strategy: None,
            phases: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: None,
            fixed_code: None,
            diff: None,
            cost: 0.0,
            total_cost: 0.0,
            model_used: None,
            fix_strategy: None,
            phases: Vec::new(),
        }
    }

    pub fn with_error(mut self, error: ErrorDescription) -> Self {
        self.error = Some(error);
        self
    }

    /// Failure-site `(file, line)` when the error was parsed.
    pub fn location(&self) -> Option<(&str, u32)> {
        self.error
            .as_ref()
            .map(|e| (e.file_path.as_str(), e.line_number))
    }
}
