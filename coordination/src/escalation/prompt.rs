//! Prompt construction and model-output cleanup.

use crate::memory::RepairStrategy;
use crate::trace::ErrorDescription;

/// Frames of call chain included in the prompt.
pub const CALL_CHAIN_FRAMES: usize = 3;
/// Strategies from memory included in the prompt.
pub const PROMPT_STRATEGIES: usize = 3;

/// Build the repair prompt for one error.
///
/// Deterministic: the same error and strategies always give the same text.
pub fn build_prompt(error: &ErrorDescription, strategies: &[RepairStrategy]) -> String {
    let language = error.language();
    let fence_tag = error.extension().unwrap_or("txt");

    let mut prompt = format!("Fix this {} error:\n\n", language);
    prompt.push_str(&format!("Error Type: {}\n", error.error_type));
    prompt.push_str(&format!("Error Message: {}\n", error.error_message));
    prompt.push_str(&format!("File: {}\n", error.file_path));
    prompt.push_str(&format!("Line: {}\n", error.line_number));
    if let Some(function) = &error.function_name {
        prompt.push_str(&format!("Function: {}\n", function));
    }

    if error.stack_trace.len() > 1 {
        prompt.push_str("\nCall chain (how we got here):\n");
        let skip = error.stack_trace.len().saturating_sub(CALL_CHAIN_FRAMES);
        for frame in &error.stack_trace[skip..] {
            prompt.push_str(&format!("  {}\n", frame.location()));
            if let Some(code) = &frame.code {
                prompt.push_str(&format!("    Code: {}\n", code));
            }
        }
    }

    if !strategies.is_empty() {
        prompt.push_str("\nPreviously learned fixes for similar errors:\n");
        for (i, strategy) in strategies.iter().take(PROMPT_STRATEGIES).enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, strategy.description));
        }
        prompt.push_str("\nApply these principles to fix the current error.\n");
    }

    match &error.file_content {
        Some(content) => prompt.push_str(&format!(
            "\nCurrent code in {}:\n```{}\n{}\n```\n",
            error.file_path, fence_tag, content
        )),
        None => prompt.push_str(&format!(
            "\nError occurred at line {}\n",
            error.line_number
        )),
    }

    prompt.push_str(&format!(
        "\nProvide the COMPLETE fixed file content. Return ONLY the {} code, no explanations, no markdown:",
        language
    ));
    prompt
}

/// Strip markdown fences from model output.
///
/// Prefers a fence tagged with the file's extension or language, then the
/// first fence of any kind (its info string dropped), then the trimmed text.
pub fn extract_code(output: &str, error: &ErrorDescription) -> String {
    let language = error.language().to_ascii_lowercase();
    let ext = error.extension().unwrap_or_default();
    let tagged = |info: &str| {
        !info.is_empty() && (info.eq_ignore_ascii_case(ext) || info.eq_ignore_ascii_case(&language))
    };

    find_fence(output, tagged)
        .or_else(|| find_fence(output, |_| true))
        .unwrap_or(output)
        .trim()
        .to_string()
}

/// Body of the first fence whose info string satisfies `accept`.
///
/// An unterminated fence runs to the end of the text.
fn find_fence(text: &str, accept: impl Fn(&str) -> bool) -> Option<&str> {
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let (info, body) = match after.find('\n') {
            Some(nl) => (after[..nl].trim(), &after[nl + 1..]),
            None => (after.trim(), ""),
        };
        let close = body.find("```");
        if accept(info) {
            return Some(match close {
                Some(end) => &body[..end],
                None => body,
            });
        }
        rest = &body[close? + 3..];
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{Dialect, StackFrame};
    use chrono::Utc;

    fn python_error(frames: Vec<StackFrame>, content: Option<&str>) -> ErrorDescription {
        let mut error =
            ErrorDescription::from_frames("KeyError", "'id'", frames, Dialect::Python).unwrap();
        error.file_content = content.map(String::from);
        error
    }

    fn strategy(description: &str) -> RepairStrategy {
        RepairStrategy {
            fingerprint: description.to_string(),
            error_type: "KeyError".into(),
            file_pattern: "*.py".into(),
            description: description.into(),
            replacement: None,
            success_count: 1,
            failure_count: 0,
            created_at: Utc::now(),
            last_used: Utc::now(),
        }
    }

    #[test]
    fn test_single_frame_prompt_has_no_call_chain() {
        let error = python_error(
            vec![StackFrame::new("app.py", 10).with_function("run")],
            Some("x = d['id']"),
        );
        let prompt = build_prompt(&error, &[]);
        assert!(prompt.starts_with("Fix this Python error:"));
        assert!(prompt.contains("Function: run\n"));
        assert!(!prompt.contains("Call chain"));
        assert!(prompt.contains("```py\nx = d['id']\n```"));
        assert!(prompt.ends_with("Return ONLY the Python code, no explanations, no markdown:"));
    }

    #[test]
    fn test_call_chain_uses_last_three_frames() {
        let frames = vec![
            StackFrame::new("a.py", 1),
            StackFrame::new("b.py", 2).with_function("two"),
            StackFrame::new("c.py", 3).with_code("three()"),
            StackFrame::new("d.py", 4),
        ];
        let prompt = build_prompt(&python_error(frames, None), &[]);
        assert!(!prompt.contains("a.py:1"));
        assert!(prompt.contains("  b.py:2 in two()\n"));
        assert!(prompt.contains("  c.py:3\n    Code: three()\n"));
        assert!(prompt.contains("Error occurred at line 4"));
    }

    #[test]
    fn test_prompt_lists_top_three_strategies() {
        let error = python_error(vec![StackFrame::new("app.py", 1)], None);
        let strategies: Vec<_> = ["one", "two", "three", "four"].map(strategy).into();
        let prompt = build_prompt(&error, &strategies);
        assert!(prompt.contains("1. one\n2. two\n3. three\n"));
        assert!(!prompt.contains("4. four"));
    }

    #[test]
    fn test_extract_prefers_tagged_fence() {
        let error = python_error(vec![StackFrame::new("app.py", 1)], None);
        let output = "Here:\n```text\nnotes\n```\n```python\nprint('fixed')\n```";
        assert_eq!(extract_code(output, &error), "print('fixed')");
    }

    #[test]
    fn test_extract_falls_back_to_first_fence() {
        let error = python_error(vec![StackFrame::new("app.py", 1)], None);
        assert_eq!(extract_code("```\nx = 1\n```", &error), "x = 1");
        assert_eq!(extract_code("```js\nlet y\n```", &error), "let y");
        assert_eq!(extract_code("  bare code \n", &error), "bare code");
    }

    #[test]
    fn test_extension_tag_matches_exactly() {
        let error = python_error(vec![StackFrame::new("app.py", 1)], None);
        // "```pyx" is not a python fence, so the generic rule applies.
        assert_eq!(extract_code("```pyx\ncdef int a\n```", &error), "cdef int a");
        assert_eq!(extract_code("```py\nok = True\n```", &error), "ok = True");
    }
}
