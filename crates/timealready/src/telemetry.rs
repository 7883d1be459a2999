//! Append-only session log.
//!
//! One JSON object per healing session in `telemetry.jsonl`, so cost and
//! tier usage can be analysed across runs.

use std::path::Path;

use chrono::{DateTime, Utc};
use coordination::escalation::{FixOutcome, HealingPhase, ModelUsed};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const TELEMETRY_FILE: &str = "telemetry.jsonl";

/// Summary of one healing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Trace dialect, or `None` when the input never parsed.
    pub dialect: Option<String>,
    pub error_type: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub phases: Vec<HealingPhase>,
    pub model_used: Option<ModelUsed>,
    pub total_cost: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl SessionRecord {
    pub fn from_outcome(outcome: &FixOutcome) -> Self {
        let error = outcome.error.as_ref();
        Self {
            timestamp: Utc::now(),
            success: outcome.success,
            dialect: error.map(|e| e.dialect.to_string()),
            error_type: error.map(|e| e.error_type.clone()),
            file: error.map(|e| e.file_path.clone()),
            line: error.map(|e| e.line_number),
            phases: outcome.phases.clone(),
            model_used: outcome.model_used,
            total_cost: outcome.total_cost,
            message: outcome.message.clone(),
        }
    }
}

/// Append `record` as one line of `path`. Failures are logged, never fatal.
pub fn append_session(record: &SessionRecord, path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Failed to create telemetry directory: {e}");
            return;
        }
    }
    match serde_json::to_string(record) {
        Ok(json) => {
            use std::io::Write;
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append telemetry: {e}");
                    } else {
                        info!(path = %path.display(), "Appended session telemetry");
                    }
                }
                Err(e) => warn!("Failed to open telemetry file: {e}"),
            }
        }
        Err(e) => warn!("Failed to serialize telemetry: {e}"),
    }
}
