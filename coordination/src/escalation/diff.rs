//! Line-by-line change summaries.

/// Per-line diff between the original file and a candidate.
///
/// Each differing line `N` renders as `Line N:` followed by `- old` and
/// `+ new`; lines present on only one side show only that side. Returns the
/// candidate itself when there is no original.
pub fn line_diff(original: Option<&str>, candidate: &str) -> String {
    let original = match original {
        Some(text) if !text.is_empty() => text,
        _ => return candidate.to_string(),
    };

    let old: Vec<&str> = original.split('\n').collect();
    let new: Vec<&str> = candidate.split('\n').collect();

    let mut out = Vec::new();
    for i in 0..old.len().max(new.len()) {
        let (before, after) = (old.get(i), new.get(i));
        if before == after {
            continue;
        }
        out.push(format!("Line {}:", i + 1));
        if let Some(line) = before {
            out.push(format!("- {line}"));
        }
        if let Some(line) = after {
            out.push(format!("+ {line}"));
        }
    }

    if out.is_empty() {
        "No changes".to_string()
    } else {
        out.join("\n")
    }
}

/// 1-based numbers of the lines that differ.
pub fn changed_lines(original: Option<&str>, candidate: &str) -> Vec<usize> {
    let old: Vec<&str> = original.map(|t| t.split('\n').collect()).unwrap_or_default();
    let new: Vec<&str> = candidate.split('\n').collect();
    (0..old.len().max(new.len()))
        .filter(|&i| old.get(i) != new.get(i))
        .map(|i| i + 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_change() {
        let diff = line_diff(Some("a\nb\nc"), "a\nB\nc");
        assert_eq!(diff, "Line 2:\n- b\n+ B");
    }

    #[test]
    fn test_identical_is_no_changes() {
        assert_eq!(line_diff(Some("x\ny"), "x\ny"), "No changes");
    }

    #[test]
    fn test_no_original_returns_candidate() {
        assert_eq!(line_diff(None, "print(1)"), "print(1)");
        assert_eq!(line_diff(Some(""), "print(1)"), "print(1)");
    }

    #[test]
    fn test_unequal_lengths() {
        assert_eq!(line_diff(Some("a"), "a\nb"), "Line 2:\n+ b");
        assert_eq!(line_diff(Some("a\nb\nc"), "a"), "Line 2:\n- b\nLine 3:\n- c");
    }

    #[test]
    fn test_changed_lines() {
        assert_eq!(changed_lines(Some("a\nb\nc"), "a\nB\nc\nd"), vec![2, 4]);
        assert!(changed_lines(Some("same"), "same").is_empty());
    }
}
