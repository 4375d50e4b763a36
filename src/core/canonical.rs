//! Encoders for the author grammar and a decoder for the canonical stream.
//!
//! Clients receive canonical text; [`decode`] turns it back into fragments
//! using the same scanner and parser the transcoder uses.

use serde_json::json;

use crate::core::markers::{
    ADD_FILE_CLOSE, ADD_FILE_OPEN, SURGICAL_EDIT_CLOSE, SURGICAL_EDIT_OPEN,
};
use crate::core::payload::{Command, EditOperation};
use crate::core::transcoder::{Fragment, StreamTranscoder};

/// Wraps a whole-document write in `[ADD_FILE]` markers.
pub fn encode_add_file(name: Option<&str>, content: &str) -> String {
    let payload = match name {
        Some(name) => json!({ "name": name, "content": content }),
        None => json!({ "content": content }),
    };
    format!("{ADD_FILE_OPEN}{payload}{ADD_FILE_CLOSE}")
}

/// Wraps an operation batch in `[SURGICAL_EDIT]` markers. A single
/// operation is written as a bare object.
pub fn encode_surgical_edit(ops: &[EditOperation]) -> String {
    let payload = match ops {
        [single] => serde_json::to_string(single),
        many => serde_json::to_string(many),
    }
    .unwrap_or_else(|_| "[]".to_string());
    format!("{SURGICAL_EDIT_OPEN}{payload}{SURGICAL_EDIT_CLOSE}")
}

/// Parses a complete canonical stream into fragments. Unterminated regions
/// at the end are dropped.
pub fn decode(text: &str) -> Vec<Fragment> {
    let mut transcoder = StreamTranscoder::new();
    let mut fragments = transcoder.push(text);
    let (tail, _) = transcoder.finish();
    fragments.extend(tail);
    fragments
}

/// Commands carried by a canonical stream, ignoring prose.
pub fn decode_commands(text: &str) -> Vec<Command> {
    decode(text).iter().filter_map(Fragment::command).collect()
}

/// Prose carried by a canonical stream, with every marker region removed.
pub fn decode_prose(text: &str) -> String {
    decode(text)
        .into_iter()
        .filter_map(|fragment| match fragment {
            Fragment::Prose(text) => Some(text),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surgical_edit_encoding_round_trips_through_decode() {
        let ops = vec![
            EditOperation::Insert {
                start_line: 1,
                content: "# Title".to_string(),
            },
            EditOperation::Delete {
                start_line: 4,
                end_line: 6,
            },
        ];
        let encoded = encode_surgical_edit(&ops);
        assert!(encoded.starts_with("[SURGICAL_EDIT][{"));
        assert_eq!(decode_commands(&encoded), vec![Command::Edits(ops)]);
    }

    #[test]
    fn single_operation_is_encoded_as_object() {
        let op = EditOperation::Delete {
            start_line: 2,
            end_line: 2,
        };
        assert_eq!(
            encode_surgical_edit(std::slice::from_ref(&op)),
            r#"[SURGICAL_EDIT]{"operation":"delete","startLine":2,"endLine":2}[/SURGICAL_EDIT]"#
        );
    }

    #[test]
    fn decode_separates_prose_and_commands() {
        let wire = "Updated.[MARKER_START:0]new body[MARKER_END] Anything else?";
        assert_eq!(
            decode_commands(wire),
            vec![Command::WholeDocumentWrite {
                name: None,
                content: "new body".to_string()
            }]
        );
        assert_eq!(decode_prose(wire), "Updated. Anything else?");
    }

    #[test]
    fn add_file_encoding_escapes_payload() {
        let encoded = encode_add_file(None, "a\n\"b\"");
        assert_eq!(encoded, r#"[ADD_FILE]{"content":"a\n\"b\""}[/ADD_FILE]"#);
    }
}
