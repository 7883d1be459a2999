//! Stack-trace dialects
//!
//! Each dialect pairs a textual signature check with a single frame regex.
//! Dialects are tried in a fixed priority order and the first signature that
//! matches wins; formats share substrings (a Node trace can mention `.php:`,
//! a Python traceback can contain `at x:1:2`), so order is significant.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::trace::types::StackFrame;

/// Category label used when a dialect cannot recover the real one.
pub const GENERIC_ERROR_TYPE: &str = "Error";

static ERROR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s"'(])([A-Za-z_][\w.$\\]*(?:Error|Exception))\s*:\s*(.+?)\s*$"#).unwrap()
});

static PYTHON_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"File "([^"]+)", line (\d+)(?:, in ([^\s,]+))?"#).unwrap()
});

static JS_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*at\s+(?:(.+?)\s+\()?((?:[A-Za-z]:)?[^\s()]+?):(\d+):(\d+)\)?\s*$").unwrap()
});

static JAVA_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*at\s+([\w$.<>/]+)\(([^():]+\.\w+):(\d+)\)").unwrap()
});

static CSHARP_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*at\s+(.+?)\s+in\s+(.+?):line\s+(\d+)\s*$").unwrap());

static PHP_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:in\s+)?((?:[A-Za-z]:)?[^\s:()]*\.php)(?:\s+on\s+line\s+|:|\()(\d+)\)?(?::\s+([\w\\:>-]+)\()?",
    )
    .unwrap()
});

static RUBY_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:from\s+)?((?:[A-Za-z]:)?[^\s:]+\.rb):(\d+):in\s+[`']([^'`]+)'").unwrap()
});

static BARE_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"((?:[A-Za-z]:)?[\w./\\@+-]+\.(?:go|rs|cpp|cc|c|hpp|h|swift|zig)):(\d+)").unwrap()
});

static FALLBACK_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([^\s:()"'\[\]<>]+\.\w+):(\d+)"#).unwrap());

/// Trace formats the parser understands, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `File "<path>", line N, in func` tracebacks
    Python,
    /// `at func (path:line:col)` frames (Node, browsers, Deno)
    JavaScript,
    /// `at pkg.Class.method(File.java:N)` frames (JVM languages)
    Java,
    /// `at Ns.Class.Method() in path:line N` frames (.NET)
    CSharp,
    /// `in path.php on line N`, `path.php:N` and `#0 path.php(N): func()`
    Php,
    /// `from path.rb:N:in 'func'`
    Ruby,
    /// bare `path.ext:N` with no keyword marker (Go, Rust, C, C++, Swift, Zig)
    Bare,
    /// first `token.ext:N` anywhere in the text
    Fallback,
}

impl Dialect {
    /// Signature checks run in this order; the first match wins.
    pub const PRIORITY: [Dialect; 8] = [
        Self::Python,
        Self::JavaScript,
        Self::Java,
        Self::CSharp,
        Self::Php,
        Self::Ruby,
        Self::Bare,
        Self::Fallback,
    ];

    /// Select the dialect for a raw error text.
    pub fn detect(text: &str) -> Self {
        Self::PRIORITY
            .into_iter()
            .find(|d| d.matches_signature(text))
            .unwrap_or(Self::Fallback)
    }

    /// Whether the text carries this dialect's structural signature.
    pub fn matches_signature(&self, text: &str) -> bool {
        match self {
            Self::Python => text.contains("File \"") || text.contains("Traceback"),
            Self::JavaScript => text.lines().any(|l| JS_FRAME.is_match(l)),
            Self::Java => text.lines().any(|l| JAVA_FRAME.is_match(l)),
            Self::CSharp => text.lines().any(|l| CSHARP_FRAME.is_match(l)),
            Self::Php => {
                text.contains(".php on line") || text.contains(".php:") || text.contains(".php(")
            }
            Self::Ruby => text.contains(".rb:") && text.contains(":in "),
            Self::Bare => BARE_FRAME.is_match(text),
            Self::Fallback => true,
        }
    }

    /// Collect every frame this dialect recognizes, in text order.
    pub fn frames(&self, lines: &[&str]) -> Vec<StackFrame> {
        match self {
            Self::Python => python_frames(lines),
            Self::JavaScript => lines.iter().filter_map(|l| js_frame(l)).collect(),
            Self::Java => lines.iter().filter_map(|l| java_frame(l)).collect(),
            Self::CSharp => lines.iter().filter_map(|l| csharp_frame(l)).collect(),
            Self::Php => lines.iter().filter_map(|l| php_frame(l)).collect(),
            Self::Ruby => lines.iter().filter_map(|l| ruby_frame(l)).collect(),
            Self::Bare => lines
                .iter()
                .flat_map(|l| BARE_FRAME.captures_iter(l))
                .filter_map(|caps| {
                    let line = caps[2].parse().ok()?;
                    Some(StackFrame::new(&caps[1], line))
                })
                .collect(),
            Self::Fallback => lines
                .iter()
                .find_map(|l| {
                    let caps = FALLBACK_FRAME.captures(l)?;
                    let line = caps[2].parse().ok()?;
                    Some(StackFrame::new(&caps[1], line))
                })
                .into_iter()
                .collect(),
        }
    }

    /// Recover `(error_type, message)` for this dialect.
    ///
    /// Python reads the last matching line; the keyword dialects read the
    /// first line; bare and fallback traces never carry a category. Whenever
    /// nothing matches, the category degrades to [`GENERIC_ERROR_TYPE`] and
    /// the message is the raw line.
    pub fn error_line(&self, lines: &[&str]) -> (String, String) {
        let mut non_empty = lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty());
        match self {
            Self::Python => {
                let found = lines.iter().rev().find_map(|l| split_error_line(l));
                found.unwrap_or_else(|| {
                    let last = lines
                        .iter()
                        .rev()
                        .map(|l| l.trim())
                        .find(|l| !l.is_empty())
                        .unwrap_or_default();
                    generic(last)
                })
            }
            Self::Bare | Self::Fallback => generic(non_empty.next().unwrap_or_default()),
            _ => {
                let first = non_empty.next().unwrap_or_default();
                split_error_line(first).unwrap_or_else(|| generic(first))
            }
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::JavaScript => write!(f, "javascript"),
            Self::Java => write!(f, "java"),
            Self::CSharp => write!(f, "csharp"),
            Self::Php => write!(f, "php"),
            Self::Ruby => write!(f, "ruby"),
            Self::Bare => write!(f, "bare"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

fn generic(line: &str) -> (String, String) {
    (GENERIC_ERROR_TYPE.to_string(), line.to_string())
}

fn split_error_line(line: &str) -> Option<(String, String)> {
    let caps = ERROR_LINE.captures(line)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

fn python_frames(lines: &[&str]) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = PYTHON_FRAME.captures(line) else {
            continue;
        };
        let Ok(line_no) = caps[2].parse() else {
            continue;
        };
        let mut frame = StackFrame::new(&caps[1], line_no);
        if let Some(func) = caps.get(3) {
            frame = frame.with_function(func.as_str());
        }
        // The source line, when printed, is indented beneath the frame.
        if let Some(next) = lines.get(i + 1) {
            let code = next.trim();
            let indented = next.starts_with(char::is_whitespace);
            if indented && !code.is_empty() && !PYTHON_FRAME.is_match(next) {
                frame = frame.with_code(code);
            }
        }
        frames.push(frame);
    }
    frames
}

fn js_frame(line: &str) -> Option<StackFrame> {
    let caps = JS_FRAME.captures(line)?;
    let path = caps[2].trim_start_matches("file://");
    let mut frame = StackFrame::new(path, caps[3].parse().ok()?);
    if let Some(func) = caps.get(1) {
        let func = func.as_str().trim_start_matches("async ").trim();
        if !func.is_empty() {
            frame = frame.with_function(func);
        }
    }
    Some(frame)
}

fn java_frame(line: &str) -> Option<StackFrame> {
    let caps = JAVA_FRAME.captures(line)?;
    Some(StackFrame::new(&caps[2], caps[3].parse().ok()?).with_function(&caps[1]))
}

fn csharp_frame(line: &str) -> Option<StackFrame> {
    let caps = CSHARP_FRAME.captures(line)?;
    let method = caps[1].split('(').next().unwrap_or_default().trim();
    let mut frame = StackFrame::new(caps[2].trim(), caps[3].parse().ok()?);
    if !method.is_empty() {
        frame = frame.with_function(method);
    }
    Some(frame)
}

fn php_frame(line: &str) -> Option<StackFrame> {
    let caps = PHP_FRAME.captures(line)?;
    let mut frame = StackFrame::new(&caps[1], caps[2].parse().ok()?);
    if let Some(func) = caps.get(3) {
        frame = frame.with_function(func.as_str());
    }
    Some(frame)
}

fn ruby_frame(line: &str) -> Option<StackFrame> {
    let caps = RUBY_FRAME.captures(line)?;
    Some(StackFrame::new(&caps[1], caps[2].parse().ok()?).with_function(&caps[3]))
}
