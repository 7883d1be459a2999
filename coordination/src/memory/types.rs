//! Learned repair strategies and their ranking.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::escalation::FixOutcome;
use crate::memory::fingerprint::fingerprint;
use crate::trace::{file_extension, ErrorDescription};

/// A fix that once passed validation, keyed by error fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairStrategy {
    pub fingerprint: String,
    pub error_type: String,
    /// `<first-dir>/*.<ext>` or `*.<ext>`.
    pub file_pattern: String,
    /// Short prose summary, fed back into later prompts.
    pub description: String,
    /// Validated replacement source, replayed by the memory fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    pub success_count: u32,
    pub failure_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl RepairStrategy {
    /// Build a fresh strategy from a session outcome.
    pub fn from_outcome(error: &ErrorDescription, outcome: &FixOutcome) -> Self {
        let now = Utc::now();
        Self {
            fingerprint: fingerprint(error),
            error_type: error.error_type.clone(),
            file_pattern: file_pattern(&error.file_path),
            description: describe(outcome),
            replacement: outcome.fixed_code.clone(),
            success_count: u32::from(outcome.success),
            failure_count: u32::from(!outcome.success),
            created_at: now,
            last_used: now,
        }
    }

    /// Fold another outcome for the same fingerprint into this record.
    ///
    /// Description and replacement follow the latest successful outcome.
    pub fn record(&mut self, outcome: &FixOutcome) {
        if outcome.success {
            self.success_count = self.success_count.saturating_add(1);
            self.description = describe(outcome);
            if outcome.fixed_code.is_some() {
                self.replacement = outcome.fixed_code.clone();
            }
        } else {
            self.failure_count = self.failure_count.saturating_add(1);
        }
        self.last_used = Utc::now();
    }

    /// success / (success + failure); 0.0 before any attempt.
    pub fn success_rate(&self) -> f64 {
        let total = u64::from(self.success_count) + u64::from(self.failure_count);
        if total == 0 {
            0.0
        } else {
            f64::from(self.success_count) / total as f64
        }
    }
}

/// Apply a new outcome to an optional existing record.
pub fn upsert(
    existing: Option<RepairStrategy>,
    error: &ErrorDescription,
    outcome: &FixOutcome,
) -> RepairStrategy {
    match existing {
        Some(mut strategy) => {
            strategy.record(outcome);
            strategy
        }
        None => RepairStrategy::from_outcome(error, outcome),
    }
}

/// Coarse location pattern for a failure-site path.
pub fn file_pattern(file_path: &str) -> String {
    let ext = file_extension(file_path).unwrap_or("*");
    match file_path.split_once('/') {
        Some((dir, _)) if !dir.is_empty() => format!("{dir}/*.{ext}"),
        _ => format!("*.{ext}"),
    }
}

fn describe(outcome: &FixOutcome) -> String {
    outcome
        .fix_strategy
        .clone()
        .unwrap_or_else(|| "Applied code fix".to_string())
}

/// Keep strategies for the error's category, best first, at most `limit`.
///
/// Order: success rate, then whether the file pattern matches the error,
/// then success count, then most recent use.
pub fn rank_similar(
    candidates: impl IntoIterator<Item = RepairStrategy>,
    error: &ErrorDescription,
    limit: usize,
) -> Vec<RepairStrategy> {
    let pattern = file_pattern(&error.file_path);
    let mut ranked: Vec<RepairStrategy> = candidates
        .into_iter()
        .filter(|s| s.error_type == error.error_type)
        .collect();

    ranked.sort_by(|a, b| {
        b.success_rate()
            .partial_cmp(&a.success_rate())
            .unwrap_or(Ordering::Equal)
            .then_with(|| (b.file_pattern == pattern).cmp(&(a.file_pattern == pattern)))
            .then_with(|| b.success_count.cmp(&a.success_count))
            .then_with(|| b.last_used.cmp(&a.last_used))
    });
    ranked.truncate(limit);
    ranked
}
