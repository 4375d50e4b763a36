//! Delimiter recognition for marker regions in streamed model output.
//!
//! Two vocabularies are live at once: the author grammar models are prompted
//! to write (`[ADD_FILE]`, `[SURGICAL_EDIT]`) and the canonical grammar sent
//! to clients (`[MARKER_START:n]`, `[LINE_EDITS]`). Which opener appears in
//! the text decides how the enclosed payload is read.

use memchr::memmem;

pub const ADD_FILE_OPEN: &str = "[ADD_FILE]";
pub const ADD_FILE_CLOSE: &str = "[/ADD_FILE]";
pub const SURGICAL_EDIT_OPEN: &str = "[SURGICAL_EDIT]";
pub const SURGICAL_EDIT_CLOSE: &str = "[/SURGICAL_EDIT]";
/// Followed by the decimal edit target and `]`.
pub const MARKER_START_PREFIX: &str = "[MARKER_START:";
pub const MARKER_END: &str = "[MARKER_END]";
pub const LINE_EDITS_OPEN: &str = "[LINE_EDITS]";
pub const LINE_EDITS_CLOSE: &str = "[/LINE_EDITS]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarKind {
    /// `[ADD_FILE]{"name"?, "content"}[/ADD_FILE]`
    AddFile,
    /// `[SURGICAL_EDIT]<object or array>[/SURGICAL_EDIT]`
    SurgicalEdit,
    /// `[MARKER_START:n]raw content[MARKER_END]`
    CanonicalContent,
    /// `[LINE_EDITS]<array>[/LINE_EDITS]`
    CanonicalOperations,
}

impl GrammarKind {
    const FIXED_OPENERS: [(GrammarKind, &'static str); 3] = [
        (GrammarKind::AddFile, ADD_FILE_OPEN),
        (GrammarKind::SurgicalEdit, SURGICAL_EDIT_OPEN),
        (GrammarKind::CanonicalOperations, LINE_EDITS_OPEN),
    ];

    pub fn close_delimiter(self) -> &'static str {
        match self {
            GrammarKind::AddFile => ADD_FILE_CLOSE,
            GrammarKind::SurgicalEdit => SURGICAL_EDIT_CLOSE,
            GrammarKind::CanonicalContent => MARKER_END,
            GrammarKind::CanonicalOperations => LINE_EDITS_CLOSE,
        }
    }

    /// Whether the payload is JSON rather than raw document text.
    pub fn carries_json(self) -> bool {
        !matches!(self, GrammarKind::CanonicalContent)
    }
}

/// An opening delimiter that has been fully recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMarker {
    pub grammar: GrammarKind,
    /// Edit target from `[MARKER_START:n]`; zero for every other grammar.
    pub target: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan<'a> {
    /// Prose that can be emitted verbatim.
    pub text_before: &'a str,
    pub marker: Option<OpenMarker>,
    /// Text after the opener when one was found. Otherwise the tail that
    /// could still grow into an opener and must be held back.
    pub remainder: &'a str,
}

/// Byte range of a closing delimiter inside a region buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Close {
    pub start: usize,
    pub end: usize,
}

/// Finds the earliest complete opening delimiter in `buffer`.
pub fn scan(buffer: &str) -> Scan<'_> {
    let mut best: Option<(usize, usize, OpenMarker)> = None;

    for (grammar, opener) in GrammarKind::FIXED_OPENERS {
        if let Some(pos) = memmem::find(buffer.as_bytes(), opener.as_bytes()) {
            if best.is_none_or(|(best_pos, _, _)| pos < best_pos) {
                best = Some((
                    pos,
                    opener.len(),
                    OpenMarker { grammar, target: 0 },
                ));
            }
        }
    }

    if let Some((pos, len, target)) = find_marker_start(buffer) {
        if best.is_none_or(|(best_pos, _, _)| pos < best_pos) {
            best = Some((
                pos,
                len,
                OpenMarker {
                    grammar: GrammarKind::CanonicalContent,
                    target,
                },
            ));
        }
    }

    match best {
        Some((pos, len, marker)) => Scan {
            text_before: &buffer[..pos],
            marker: Some(marker),
            remainder: &buffer[pos + len..],
        },
        None => {
            let held = held_tail_len(buffer);
            let split = buffer.len() - held;
            Scan {
                text_before: &buffer[..split],
                marker: None,
                remainder: &buffer[split..],
            }
        }
    }
}

/// Locates the closing delimiter for `grammar` inside a region buffer,
/// looking only at matches that start at or after byte `from`.
pub fn find_close(buffer: &str, grammar: GrammarKind, from: usize) -> Option<Close> {
    let close = grammar.close_delimiter();
    let haystack = buffer.as_bytes().get(from..)?;
    memmem::find(haystack, close.as_bytes()).map(|offset| Close {
        start: from + offset,
        end: from + offset + close.len(),
    })
}

/// Returns `(position, opener length, target)` of the first well-formed
/// `[MARKER_START:n]`.
fn find_marker_start(buffer: &str) -> Option<(usize, usize, usize)> {
    let prefix = MARKER_START_PREFIX.as_bytes();
    for pos in memmem::find_iter(buffer.as_bytes(), prefix) {
        let digits_start = pos + prefix.len();
        let rest = &buffer[digits_start..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || rest.as_bytes().get(digits) != Some(&b']') {
            continue;
        }
        if let Ok(target) = rest[..digits].parse::<usize>() {
            return Some((pos, prefix.len() + digits + 1, target));
        }
    }
    None
}

/// Length of the buffer suffix that is an unfinished opening delimiter.
fn held_tail_len(buffer: &str) -> usize {
    // No opener contains a second '[', so only the last one can start a tail.
    let Some(pos) = memchr::memrchr(b'[', buffer.as_bytes()) else {
        return 0;
    };
    let tail = &buffer[pos..];
    if could_become_opener(tail) {
        tail.len()
    } else {
        0
    }
}

fn could_become_opener(tail: &str) -> bool {
    let fixed = GrammarKind::FIXED_OPENERS
        .iter()
        .any(|(_, opener)| opener.len() > tail.len() && opener.starts_with(tail));
    if fixed {
        return true;
    }

    if tail.len() <= MARKER_START_PREFIX.len() {
        return MARKER_START_PREFIX.starts_with(tail);
    }
    tail.strip_prefix(MARKER_START_PREFIX)
        .is_some_and(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_prose_is_flushed_entirely() {
        let scan = scan("Hello there, [not a marker] friend.");
        assert_eq!(scan.text_before, "Hello there, [not a marker] friend.");
        assert_eq!(scan.marker, None);
        assert_eq!(scan.remainder, "");
    }

    #[test]
    fn finds_author_opener_and_splits_around_it() {
        let scan = scan("Sure! [ADD_FILE]{\"content\":");
        assert_eq!(scan.text_before, "Sure! ");
        assert_eq!(
            scan.marker,
            Some(OpenMarker {
                grammar: GrammarKind::AddFile,
                target: 0
            })
        );
        assert_eq!(scan.remainder, "{\"content\":");
    }

    #[test]
    fn earliest_opener_wins() {
        let scan = scan("a [SURGICAL_EDIT] b [ADD_FILE]");
        assert_eq!(scan.text_before, "a ");
        assert_eq!(
            scan.marker.map(|m| m.grammar),
            Some(GrammarKind::SurgicalEdit)
        );
        assert_eq!(scan.remainder, " b [ADD_FILE]");
    }

    #[test]
    fn canonical_opener_carries_target() {
        let scan = scan("x[MARKER_START:12]body");
        assert_eq!(scan.text_before, "x");
        assert_eq!(
            scan.marker,
            Some(OpenMarker {
                grammar: GrammarKind::CanonicalContent,
                target: 12
            })
        );
        assert_eq!(scan.remainder, "body");
    }

    #[test]
    fn malformed_canonical_opener_is_prose() {
        let scan = scan("[MARKER_START:abc] and [MARKER_START:] done");
        assert_eq!(scan.marker, None);
        assert_eq!(scan.text_before, "[MARKER_START:abc] and [MARKER_START:] done");
    }

    #[test]
    fn partial_openers_are_held_back() {
        for (input, held) in [
            ("text [", "["),
            ("text [ADD_", "[ADD_"),
            ("text [SURGICAL_EDIT", "[SURGICAL_EDIT"),
            ("text [MARKER_START:", "[MARKER_START:"),
            ("text [MARKER_START:42", "[MARKER_START:42"),
            ("text [LINE", "[LINE"),
        ] {
            let scan = scan(input);
            assert_eq!(scan.marker, None, "{input}");
            assert_eq!(scan.text_before, "text ", "{input}");
            assert_eq!(scan.remainder, held, "{input}");
        }
    }

    #[test]
    fn non_opener_brackets_are_not_held() {
        for input in ["list [1", "see [/ADD_FILE", "[ADDX", "[MARKER_START:4x"] {
            let scan = scan(input);
            assert_eq!(scan.remainder, "", "{input}");
            assert_eq!(scan.text_before, input);
        }
    }

    #[test]
    fn find_close_reports_byte_range() {
        let buffer = "{\"content\":\"hi\"}[/ADD_FILE] tail";
        let close = find_close(buffer, GrammarKind::AddFile, 0).expect("close present");
        assert_eq!(&buffer[..close.start], "{\"content\":\"hi\"}");
        assert_eq!(&buffer[close.end..], " tail");
        assert_eq!(find_close(buffer, GrammarKind::SurgicalEdit, 0), None);

        assert_eq!(find_close(buffer, GrammarKind::AddFile, 10), Some(close));
        assert_eq!(find_close(buffer, GrammarKind::AddFile, close.start + 1), None);
        assert_eq!(find_close(buffer, GrammarKind::AddFile, buffer.len() + 5), None);
    }
}
