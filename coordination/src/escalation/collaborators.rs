//! Collaborator seams: candidate generation and sandbox validation.
//!
//! Both are traits so the orchestrator can be driven by scripted fakes in
//! tests and by network clients in the binary.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::escalation::state::GenerationTier;
use crate::trace::{Dialect, ErrorDescription};

/// Hard failure of a generation call. Triggers escalation, never ends the
/// session on the cheap tier.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{tier} tier request failed: {message}")]
    Request {
        tier: GenerationTier,
        message: String,
    },

    #[error("{tier} tier returned an empty response")]
    EmptyResponse { tier: GenerationTier },

    #[error("{tier} tier timed out after {seconds}s")]
    Timeout { tier: GenerationTier, seconds: u64 },

    #[error("{tier} tier is not configured: {reason}")]
    NotConfigured {
        tier: GenerationTier,
        reason: String,
    },
}

/// Validation could not run. Counted as a failed validation by the
/// orchestrator.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("sandbox transport error: {0}")]
    Transport(String),

    #[error("sandbox protocol error: {0}")]
    Protocol(String),

    #[error("validation timed out after {0}s")]
    Timeout(u64),

    #[error("sandbox is not configured: {0}")]
    NotConfigured(String),
}

/// A related source file shipped alongside the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyFile {
    pub path: String,
    pub content: String,
}

/// Everything a validator needs to exercise one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Full replacement source for the failing file.
    pub candidate: String,
    /// Where the candidate is written, relative to the project root.
    pub target_path: String,
    pub dependencies: Vec<DependencyFile>,
    /// Category the probe checks for.
    pub error_type: String,
    pub function_name: Option<String>,
    pub language: String,
    pub dialect: Dialect,
}

impl ValidationRequest {
    pub fn new(error: &ErrorDescription, candidate: &str, dependencies: Vec<DependencyFile>) -> Self {
        Self {
            candidate: candidate.to_string(),
            target_path: error.file_path.clone(),
            dependencies,
            error_type: error.error_type.clone(),
            function_name: error.function_name.clone(),
            language: error.language().to_string(),
            dialect: error.dialect,
        }
    }

    /// Extension of the target file, without the dot.
    pub fn extension(&self) -> Option<&str> {
        crate::trace::file_extension(&self.target_path)
    }
}

/// Result of running a candidate in isolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "duration_secs")]
    pub execution_time: Duration,
}

impl ValidationOutcome {
    pub fn passed(output: impl Into<String>, execution_time: Duration) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            execution_time,
        }
    }

    pub fn failed(error: impl Into<String>, execution_time: Duration) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            execution_time,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

/// Produces a candidate replacement for the failing file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FixGenerator: Send + Sync {
    /// Raw model output for `prompt` on `tier`; fence stripping happens in
    /// the orchestrator.
    async fn generate(&self, prompt: &str, tier: GenerationTier) -> Result<String, GenerationError>;
}

/// Runs a candidate and reports whether the original error is gone.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FixValidator: Send + Sync {
    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationOutcome, ValidationError>;
}
