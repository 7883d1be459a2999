//! Raw error text → [`ErrorDescription`]
//!
//! The parser never fails loudly: a report with no recognizable frames is
//! returned as [`NotParseable`], which callers treat as an expected outcome
//! (truncated logs, prose, unsupported formats) rather than a fault.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::trace::dialect::Dialect;
use crate::trace::types::ErrorDescription;

/// The report contained no frame the selected dialect could recognize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not parseable: no {dialect} stack frames found")]
pub struct NotParseable {
    /// Dialect whose signature was selected (`Fallback` for plain prose).
    pub dialect: Dialect,
}

/// Multi-dialect stack-trace parser.
#[derive(Debug, Clone, Default)]
pub struct TraceParser {
    codebase_root: PathBuf,
}

impl TraceParser {
    /// Create a parser that hydrates failing files relative to `codebase_root`.
    pub fn new(codebase_root: impl Into<PathBuf>) -> Self {
        Self {
            codebase_root: codebase_root.into(),
        }
    }

    pub fn codebase_root(&self) -> &Path {
        &self.codebase_root
    }

    /// Parse a raw error report.
    pub fn parse(&self, raw: &str) -> Result<ErrorDescription, NotParseable> {
        let mut desc = parse_structure(raw)?;
        desc.file_content = hydrate(&self.codebase_root, &desc.file_path);
        Ok(desc)
    }
}

/// Parse without touching the filesystem.
pub fn parse_structure(raw: &str) -> Result<ErrorDescription, NotParseable> {
    let text = raw.trim();
    let dialect = Dialect::detect(text);
    let lines: Vec<&str> = text.lines().collect();

    let frames = dialect.frames(&lines);
    let (error_type, error_message) = dialect.error_line(&lines);
    debug!(
        %dialect,
        frames = frames.len(),
        error_type = %error_type,
        "Trace dialect selected"
    );

    ErrorDescription::from_frames(error_type, error_message, frames, dialect)
        .ok_or(NotParseable { dialect })
}

/// Read the failing file; any failure leaves the content empty.
fn hydrate(root: &Path, file_path: &str) -> Option<String> {
    let path = root.join(file_path);
    match std::fs::read_to_string(&path) {
        Ok(content) => Some(content),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Failing file not readable; continuing without content");
            None
        }
    }
}
