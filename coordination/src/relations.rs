//! Call-chain relations
//!
//! A stack trace already encodes the exact call chain, so relations are read
//! straight off adjacent frames: frame i called frame i+1. No source analysis
//! and no I/O.

use crate::trace::{ErrorDescription, FileRelation, RelationKind, StackFrame};

/// One `Calls` edge per adjacent frame pair, in trace order.
///
/// A single-frame trace yields no relations; it still names a failure site.
pub fn extract(frames: &[StackFrame]) -> Vec<FileRelation> {
    frames
        .windows(2)
        .map(|pair| FileRelation {
            file: pair[0].file.clone(),
            line: pair[0].line,
            depends_on: pair[1].file.clone(),
            depends_on_line: pair[1].line,
            relationship: RelationKind::Calls,
        })
        .collect()
}

/// Extract relations from the description's own trace and attach them.
pub fn attach(error: &mut ErrorDescription) -> usize {
    error.related_files = extract(&error.stack_trace);
    error.related_files.len()
}

/// Distinct files referenced by the relations, callers before callees,
/// skipping `exclude`.
pub fn implicated_files<'a>(relations: &'a [FileRelation], exclude: &str) -> Vec<&'a str> {
    let mut files: Vec<&str> = Vec::new();
    for relation in relations {
        for file in [relation.file.as_str(), relation.depends_on.as_str()] {
            if file != exclude && !files.contains(&file) {
                files.push(file);
            }
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frames(specs: &[(&str, u32)]) -> Vec<StackFrame> {
        specs.iter().map(|(f, l)| StackFrame::new(f, *l)).collect()
    }

    #[test]
    fn test_two_frames_yield_one_relation() {
        let rels = extract(&frames(&[("a.py", 3), ("b.py", 9)]));
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].file, "a.py");
        assert_eq!(rels[0].line, 3);
        assert_eq!(rels[0].depends_on, "b.py");
        assert_eq!(rels[0].depends_on_line, 9);
        assert_eq!(rels[0].relationship, RelationKind::Calls);
    }

    #[test]
    fn test_single_and_empty_traces() {
        assert!(extract(&frames(&[("only.py", 1)])).is_empty());
        assert!(extract(&[]).is_empty());
    }

    #[test]
    fn test_implicated_files_dedupes_and_excludes() {
        let rels = extract(&frames(&[
            ("main.py", 1),
            ("svc.py", 2),
            ("svc.py", 8),
            ("db.py", 4),
        ]));
        assert_eq!(implicated_files(&rels, "db.py"), vec!["main.py", "svc.py"]);
    }

    proptest! {
        #[test]
        fn relation_count_and_order_follow_frames(
            specs in prop::collection::vec(("[a-z]{1,6}\\.py", 1u32..500), 0..12)
        ) {
            let input: Vec<StackFrame> =
                specs.iter().map(|(f, l)| StackFrame::new(f, *l)).collect();
            let rels = extract(&input);
            prop_assert_eq!(rels.len(), input.len().saturating_sub(1));
            for (i, rel) in rels.iter().enumerate() {
                prop_assert_eq!(&rel.file, &input[i].file);
                prop_assert_eq!(rel.line, input[i].line);
                prop_assert_eq!(&rel.depends_on, &input[i + 1].file);
                prop_assert_eq!(rel.depends_on_line, input[i + 1].line);
            }
        }
    }
}
