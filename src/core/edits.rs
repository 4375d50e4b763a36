//! Application of line-addressed edit batches to document text.

use crate::core::payload::{Command, EditOperation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Applied,
    /// Applied after clamping an out-of-range line number.
    Clamped,
    /// Nothing to act on; the range lies past the end of the document.
    OutOfRange,
    /// Its range overlaps an operation already applied from the same batch.
    Overlaps,
    /// Zero line number or an inverted range.
    Invalid,
}

impl OperationStatus {
    pub fn is_applied(self) -> bool {
        matches!(self, OperationStatus::Applied | OperationStatus::Clamped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub content: String,
    /// True when every operation in the batch was applied.
    pub success: bool,
    pub applied: usize,
    /// Per-operation status, in the order the operations were supplied.
    pub outcomes: Vec<OperationStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// Splits `text` into lines. A final line ending terminates the last line
/// rather than opening an empty one; the flag records whether it was there.
fn split_document(text: &str, ending: LineEnding) -> (Vec<&str>, bool) {
    if text.is_empty() {
        return (Vec::new(), false);
    }
    match text.strip_suffix(ending.as_str()) {
        Some(body) => (body.split(ending.as_str()).collect(), true),
        None => (text.split(ending.as_str()).collect(), false),
    }
}

/// The lines of `text` as they are numbered for edit operations.
pub fn document_lines(text: &str) -> Vec<&str> {
    split_document(text, LineEnding::detect(text)).0
}

fn content_lines(content: &str) -> Vec<String> {
    let content = content
        .strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(content);
    content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_owned())
        .collect()
}

/// Applies `ops` to `document`.
///
/// Line numbers are read against the document as given. Operations are
/// applied bottom-to-top regardless of supply order so that no operation
/// sees line shifts caused by another one in the batch.
pub fn apply_edits(document: &str, ops: &[EditOperation]) -> ApplyReport {
    let ending = LineEnding::detect(document);
    let (lines, trailing_newline) = split_document(document, ending);
    let mut lines: Vec<String> = lines.into_iter().map(str::to_owned).collect();
    let original_len = lines.len();

    let mut order: Vec<usize> = (0..ops.len()).collect();
    // Descending start line. At equal starts removals go first, then inserts
    // in reverse supply order so they read top-down in supply order.
    order.sort_by(|&a, &b| {
        ops[b]
            .start_line()
            .cmp(&ops[a].start_line())
            .then_with(|| ops[b].removes_lines().cmp(&ops[a].removes_lines()))
            .then_with(|| b.cmp(&a))
    });

    let mut outcomes = vec![OperationStatus::Invalid; ops.len()];
    // Lowest original line touched so far. Everything below it is unshifted.
    let mut lowest_anchor: Option<usize> = None;

    for index in order {
        let status = apply_one(&mut lines, &ops[index], original_len, lowest_anchor);
        if status.is_applied() {
            let anchor = ops[index].start_line().min(original_len + 1);
            lowest_anchor = Some(lowest_anchor.map_or(anchor, |low| low.min(anchor)));
        }
        outcomes[index] = status;
    }

    let applied = outcomes.iter().filter(|status| status.is_applied()).count();
    let mut content = lines.join(ending.as_str());
    if trailing_newline && !lines.is_empty() {
        content.push_str(ending.as_str());
    }
    ApplyReport {
        content,
        success: applied == ops.len(),
        applied,
        outcomes,
    }
}

fn apply_one(
    lines: &mut Vec<String>,
    op: &EditOperation,
    original_len: usize,
    lowest_anchor: Option<usize>,
) -> OperationStatus {
    let start = op.start_line();
    if start == 0 {
        return OperationStatus::Invalid;
    }
    let append_at = original_len.min(lines.len());

    match op {
        EditOperation::Insert { content, .. } => {
            if start > original_len + 1 {
                splice(lines, append_at, 0, content_lines(content));
                OperationStatus::Clamped
            } else {
                splice(lines, start - 1, 0, content_lines(content));
                OperationStatus::Applied
            }
        }
        EditOperation::Replace { end_line, .. } | EditOperation::Delete { end_line, .. } => {
            let end = *end_line;
            if end < start {
                return OperationStatus::Invalid;
            }
            let replacement = op.content().map(content_lines).unwrap_or_default();

            if start > original_len {
                if replacement.is_empty() {
                    return OperationStatus::OutOfRange;
                }
                splice(lines, append_at, 0, replacement);
                return OperationStatus::Clamped;
            }

            let clamped_end = end.min(original_len);
            if lowest_anchor.is_some_and(|anchor| anchor <= clamped_end) {
                return OperationStatus::Overlaps;
            }
            splice(lines, start - 1, clamped_end - start + 1, replacement);
            if clamped_end == end {
                OperationStatus::Applied
            } else {
                OperationStatus::Clamped
            }
        }
    }
}

fn splice(lines: &mut Vec<String>, at: usize, remove: usize, insert: Vec<String>) {
    let at = at.min(lines.len());
    let end = (at + remove).min(lines.len());
    lines.splice(at..end, insert);
}

/// Applies any command to `document`, reporting a whole-document write as a
/// single applied operation.
pub fn apply_command(document: &str, command: &Command) -> ApplyReport {
    match command {
        Command::WholeDocumentWrite { content, .. } => ApplyReport {
            content: content.clone(),
            success: true,
            applied: 1,
            outcomes: vec![OperationStatus::Applied],
        },
        Command::Edits(ops) => apply_edits(document, ops),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replace(start_line: usize, end_line: usize, content: &str) -> EditOperation {
        EditOperation::Replace {
            start_line,
            end_line,
            content: content.to_string(),
        }
    }

    fn insert(start_line: usize, content: &str) -> EditOperation {
        EditOperation::Insert {
            start_line,
            content: content.to_string(),
        }
    }

    fn delete(start_line: usize, end_line: usize) -> EditOperation {
        EditOperation::Delete {
            start_line,
            end_line,
        }
    }

    #[test]
    fn replace_range_with_multiple_lines() {
        let report = apply_edits("a\nb\nc\nd", &[replace(2, 3, "X\nY")]);
        assert_eq!(report.content, "a\nX\nY\nd");
        assert!(report.success);
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn insert_goes_before_the_target_line() {
        let report = apply_edits("a\nb\nc", &[insert(2, "Z")]);
        assert_eq!(report.content, "a\nZ\nb\nc");
    }

    #[test]
    fn delete_inclusive_range() {
        let report = apply_edits("a\nb\nc\nd", &[delete(2, 3)]);
        assert_eq!(report.content, "a\nd");
    }

    #[test]
    fn batch_result_is_independent_of_supply_order() {
        let forward = apply_edits("a\nb\nc\nd\ne", &[replace(2, 2, "X"), delete(4, 4)]);
        let backward = apply_edits("a\nb\nc\nd\ne", &[delete(4, 4), replace(2, 2, "X")]);
        assert_eq!(forward.content, "a\nX\nc\ne");
        assert_eq!(backward.content, "a\nX\nc\ne");
        assert_eq!(forward.outcomes, vec![OperationStatus::Applied; 2]);
    }

    #[test]
    fn line_numbers_refer_to_the_original_document() {
        let report = apply_edits(
            "1\n2\n3\n4\n5\n6",
            &[insert(2, "a\nb\nc"), replace(4, 4, "four"), delete(6, 6)],
        );
        assert_eq!(report.content, "1\na\nb\nc\n2\n3\nfour\n5");
        assert_eq!(report.applied, 3);
    }

    #[test]
    fn inserts_at_same_line_keep_supply_order() {
        let report = apply_edits("a\nb", &[insert(2, "first"), insert(2, "second")]);
        assert_eq!(report.content, "a\nfirst\nsecond\nb");
    }

    #[test]
    fn insert_and_replace_at_same_line_both_apply() {
        for ops in [
            vec![insert(2, "Z"), replace(2, 2, "X")],
            vec![replace(2, 2, "X"), insert(2, "Z")],
        ] {
            let report = apply_edits("a\nb\nc", &ops);
            assert_eq!(report.content, "a\nZ\nX\nc");
            assert!(report.success);
        }
    }

    #[test]
    fn start_beyond_end_clamps_to_append() {
        let report = apply_edits("a\nb", &[insert(10, "tail")]);
        assert_eq!(report.content, "a\nb\ntail");
        assert_eq!(report.outcomes, vec![OperationStatus::Clamped]);
        assert!(report.success);

        let report = apply_edits("a\nb", &[replace(7, 9, "more")]);
        assert_eq!(report.content, "a\nb\nmore");
        assert_eq!(report.outcomes, vec![OperationStatus::Clamped]);

        let report = apply_edits("a\nb", &[insert(3, "next")]);
        assert_eq!(report.outcomes, vec![OperationStatus::Applied]);
        assert_eq!(report.content, "a\nb\nnext");
    }

    #[test]
    fn end_beyond_document_is_clamped() {
        let report = apply_edits("a\nb\nc", &[delete(2, 99)]);
        assert_eq!(report.content, "a");
        assert_eq!(report.outcomes, vec![OperationStatus::Clamped]);
    }

    #[test]
    fn one_bad_operation_does_not_discard_the_batch() {
        let report = apply_edits(
            "a\nb\nc",
            &[delete(9, 9), replace(0, 1, "x"), delete(3, 2), replace(1, 1, "A")],
        );
        assert_eq!(report.content, "A\nb\nc");
        assert!(!report.success);
        assert_eq!(report.applied, 1);
        assert_eq!(
            report.outcomes,
            vec![
                OperationStatus::OutOfRange,
                OperationStatus::Invalid,
                OperationStatus::Invalid,
                OperationStatus::Applied,
            ]
        );
    }

    #[test]
    fn overlapping_ranges_are_skipped() {
        let report = apply_edits("a\nb\nc\nd\ne", &[replace(2, 4, "X"), delete(3, 3)]);
        assert_eq!(report.content, "a\nb\nd\ne");
        assert_eq!(
            report.outcomes,
            vec![OperationStatus::Overlaps, OperationStatus::Applied]
        );
    }

    #[test]
    fn empty_document_and_trailing_newlines() {
        assert_eq!(apply_edits("", &[insert(1, "Z")]).content, "Z");
        assert_eq!(apply_edits("", &[replace(1, 1, "X")]).content, "X");
        assert_eq!(
            apply_edits("a\nb\n", &[replace(1, 1, "A\n")]).content,
            "A\nb\n"
        );
        assert_eq!(apply_edits("a\nb", &[]).content, "a\nb");
    }

    #[test]
    fn final_newline_is_not_a_line() {
        let report = apply_edits("a\nb\n", &[insert(10, "Z")]);
        assert_eq!(report.content, "a\nb\nZ\n");
        assert_eq!(report.outcomes, vec![OperationStatus::Clamped]);

        let report = apply_edits("a\nb\n", &[insert(3, "Z")]);
        assert_eq!(report.content, "a\nb\nZ\n");
        assert_eq!(report.outcomes, vec![OperationStatus::Applied]);

        assert_eq!(
            apply_edits("a\nb\n", &[replace(7, 9, "more")]).content,
            "a\nb\nmore\n"
        );
        assert_eq!(apply_edits("a\nb\nc\n", &[delete(2, 99)]).content, "a\n");
        assert_eq!(apply_edits("a\nb\n", &[delete(3, 3)]).outcomes, vec![OperationStatus::OutOfRange]);
        assert_eq!(apply_edits("a\n", &[delete(1, 1)]).content, "");
        assert_eq!(
            apply_edits("a\r\nb\r\n", &[insert(9, "c")]).content,
            "a\r\nb\r\nc\r\n"
        );
    }

    #[test]
    fn document_lines_ignore_the_final_newline() {
        assert_eq!(document_lines("a\nb\n"), vec!["a", "b"]);
        assert_eq!(document_lines("a\nb"), vec!["a", "b"]);
        assert_eq!(document_lines("a\n\n"), vec!["a", ""]);
        assert_eq!(document_lines("\n"), vec![""]);
        assert!(document_lines("").is_empty());
    }

    #[test]
    fn crlf_documents_keep_their_line_endings() {
        let report = apply_edits("a\r\nb\r\nc", &[replace(2, 2, "X\r\nY")]);
        assert_eq!(report.content, "a\r\nX\r\nY\r\nc");
    }

    #[test]
    fn whole_document_write_replaces_everything() {
        let report = apply_command(
            "old",
            &Command::WholeDocumentWrite {
                name: None,
                content: "new\ntext".to_string(),
            },
        );
        assert_eq!(report.content, "new\ntext");
        assert_eq!(report.applied, 1);
    }
}
