//! Structured error types produced by the trace parser.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trace::dialect::Dialect;

/// A single call site in a stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    /// Source file path, always forward-slash normalized.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// Function or method name when the dialect reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Literal source line printed alongside the frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl StackFrame {
    pub fn new(file: &str, line: u32) -> Self {
        Self {
            file: normalize_path(file),
            line,
            function: None,
            code: None,
        }
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// `file:line` plus ` in func()` when known.
    pub fn location(&self) -> String {
        match &self.function {
            Some(func) => format!("{}:{} in {}()", self.file, self.line, func),
            None => format!("{}:{}", self.file, self.line),
        }
    }
}

/// Kind of edge between two files in the call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// The caller frame invoked the callee frame.
    Calls,
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Calls => write!(f, "calls"),
        }
    }
}

/// Directed caller → callee edge derived from adjacent frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRelation {
    /// Caller file.
    pub file: String,
    /// Caller line.
    pub line: u32,
    /// Callee file.
    pub depends_on: String,
    /// Callee line.
    pub depends_on_line: u32,
    pub relationship: RelationKind,
}

/// Structured description of a parsed error report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescription {
    /// Error category, e.g. the exception class name. `"Error"` when the
    /// dialect could not recover one.
    pub error_type: String,
    pub error_message: String,
    /// Failure-site file (last frame).
    pub file_path: String,
    /// Failure-site line (last frame).
    pub line_number: u32,
    /// Enclosing function of the failure site, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    /// Frames in the order they appear in the trace text.
    pub stack_trace: Vec<StackFrame>,
    /// Text of the failing file at parse time, when it could be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    /// Call-chain edges, filled in by the relation extractor.
    #[serde(default)]
    pub related_files: Vec<FileRelation>,
    /// Trace format that produced this description.
    pub dialect: Dialect,
    pub timestamp: DateTime<Utc>,
}

impl ErrorDescription {
    /// Build a description whose failure site is the last frame.
    ///
    /// Returns `None` for an empty frame list.
    pub fn from_frames(
        error_type: impl Into<String>,
        error_message: impl Into<String>,
        stack_trace: Vec<StackFrame>,
        dialect: Dialect,
    ) -> Option<Self> {
        let last = stack_trace.last()?.clone();
        Some(Self {
            error_type: error_type.into(),
            error_message: error_message.into(),
            file_path: last.file,
            line_number: last.line,
            function_name: last.function,
            stack_trace,
            file_content: None,
            related_files: Vec::new(),
            dialect,
            timestamp: Utc::now(),
        })
    }

    /// Extension of the failure-site file, without the dot.
    pub fn extension(&self) -> Option<&str> {
        file_extension(&self.file_path)
    }

    /// Human-readable language name for the failure-site file.
    pub fn language(&self) -> &'static str {
        self.extension().map(language_for_extension).unwrap_or("code")
    }

    /// Equality on every field except `timestamp`.
    pub fn eq_ignoring_timestamp(&self, other: &Self) -> bool {
        let mut other = other.clone();
        other.timestamp = self.timestamp;
        *self == other
    }
}

/// Rewrite backslashes to forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// `file` relative to `root` when it is an absolute path under it (as
/// printed by interpreters that report absolute paths); otherwise unchanged.
pub fn relative_to_root(root: &Path, file: &str) -> String {
    let path = Path::new(file);
    if !path.is_absolute() {
        return file.to_string();
    }
    let roots = [Some(root.to_path_buf()), std::fs::canonicalize(root).ok()];
    for base in roots.into_iter().flatten() {
        if let Ok(rel) = path.strip_prefix(&base) {
            if !rel.as_os_str().is_empty() {
                return normalize_path(&rel.to_string_lossy());
            }
        }
    }
    file.to_string()
}

/// Extension of the last path segment, if it has one.
pub fn file_extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Map a file extension to the language name used in prompts.
pub fn language_for_extension(ext: &str) -> &'static str {
    match ext {
        "py" => "Python",
        "js" | "mjs" | "cjs" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "java" => "Java",
        "cs" => "C#",
        "go" => "Go",
        "rs" => "Rust",
        "php" => "PHP",
        "rb" => "Ruby",
        "cpp" | "cc" | "hpp" => "C++",
        "c" | "h" => "C",
        "swift" => "Swift",
        "kt" => "Kotlin",
        _ => "code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_to_root() {
        let root = Path::new("/home/u/proj");
        assert_eq!(relative_to_root(root, "/home/u/proj/pkg/app.py"), "pkg/app.py");
        assert_eq!(relative_to_root(root, "pkg/app.py"), "pkg/app.py");
        assert_eq!(relative_to_root(root, "/usr/lib/python3/json.py"), "/usr/lib/python3/json.py");
        assert_eq!(relative_to_root(root, "/home/u/proj"), "/home/u/proj");
    }

    #[test]
    fn test_frame_path_is_normalized() {
        let frame = StackFrame::new(r"src\app\main.py", 3);
        assert_eq!(frame.file, "src/app/main.py");
    }

    #[test]
    fn test_from_frames_uses_last_frame() {
        let frames = vec![
            StackFrame::new("a.py", 1).with_function("outer"),
            StackFrame::new("b.py", 7).with_function("inner"),
        ];
        let desc =
            ErrorDescription::from_frames("KeyError", "'x'", frames, Dialect::Python).unwrap();
        assert_eq!(desc.file_path, "b.py");
        assert_eq!(desc.line_number, 7);
        assert_eq!(desc.function_name.as_deref(), Some("inner"));
    }

    #[test]
    fn test_from_frames_rejects_empty() {
        assert!(ErrorDescription::from_frames("E", "m", vec![], Dialect::Bare).is_none());
    }

    #[test]
    fn test_extension_and_language() {
        assert_eq!(file_extension("pkg/mod.rs"), Some("rs"));
        assert_eq!(file_extension("Makefile"), None);
        assert_eq!(file_extension("dir.d/.hidden"), None);
        assert_eq!(language_for_extension("kt"), "Kotlin");
        assert_eq!(language_for_extension("zig"), "code");
    }

    #[test]
    fn test_relation_kind_serializes_as_calls() {
        let json = serde_json::to_string(&RelationKind::Calls).unwrap();
        assert_eq!(json, "\"calls\"");
        assert_eq!(RelationKind::Calls.to_string(), "calls");
    }
}
