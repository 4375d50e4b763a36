//! Extraction of edit commands from the JSON carried inside marker regions.
//!
//! Payloads are written by a language model, so they are frequently
//! truncated, wrapped in code fences, or only JSON-shaped. Strict parsing is
//! always attempted first. When it fails, the known fields are mined with
//! regular expressions and their escapes decoded by hand.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single line-addressed edit. Line numbers are 1-indexed and always refer
/// to the document as it was before the batch containing the edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum EditOperation {
    Replace {
        #[serde(rename = "startLine")]
        start_line: usize,
        #[serde(rename = "endLine")]
        end_line: usize,
        content: String,
    },
    /// Inserts `content` before `start_line`.
    Insert {
        #[serde(rename = "startLine")]
        start_line: usize,
        content: String,
    },
    Delete {
        #[serde(rename = "startLine")]
        start_line: usize,
        #[serde(rename = "endLine")]
        end_line: usize,
    },
}

impl EditOperation {
    pub fn start_line(&self) -> usize {
        match self {
            EditOperation::Replace { start_line, .. }
            | EditOperation::Insert { start_line, .. }
            | EditOperation::Delete { start_line, .. } => *start_line,
        }
    }

    /// Last line removed by the operation, or `None` for inserts.
    pub fn end_line(&self) -> Option<usize> {
        match self {
            EditOperation::Replace { end_line, .. } | EditOperation::Delete { end_line, .. } => {
                Some(*end_line)
            }
            EditOperation::Insert { .. } => None,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            EditOperation::Replace { content, .. } | EditOperation::Insert { content, .. } => {
                Some(content)
            }
            EditOperation::Delete { .. } => None,
        }
    }

    pub fn removes_lines(&self) -> bool {
        !matches!(self, EditOperation::Insert { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replaces the entire document. `name` is the optional file name the
    /// author grammar may carry; it is informational only.
    WholeDocumentWrite {
        name: Option<String>,
        content: String,
    },
    /// Operations in the order the payload listed them.
    Edits(Vec<EditOperation>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// The closing delimiter was observed; the text is authoritative.
    Final,
    /// The region is still open. A trailing unterminated `content` string is
    /// accepted so that previews can show text as it arrives.
    Speculative,
}

/// Why part of a payload produced no command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadIssue {
    UnknownOperation(String),
    MissingField(&'static str),
    InvalidLineNumber { field: &'static str, value: String },
    InvertedRange { start_line: usize, end_line: usize },
    /// An object carried neither an `operation` nor a `content` field.
    Unrecognized,
    /// Neither strict parsing nor field extraction found anything usable.
    Unparseable,
}

impl fmt::Display for PayloadIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadIssue::UnknownOperation(name) => write!(f, "unknown operation '{name}'"),
            PayloadIssue::MissingField(field) => write!(f, "missing required field '{field}'"),
            PayloadIssue::InvalidLineNumber { field, value } => {
                write!(f, "'{field}' must be a positive integer, got {value}")
            }
            PayloadIssue::InvertedRange {
                start_line,
                end_line,
            } => write!(f, "endLine {end_line} is before startLine {start_line}"),
            PayloadIssue::Unrecognized => write!(f, "object has no 'operation' or 'content'"),
            PayloadIssue::Unparseable => write!(f, "payload is not recoverable JSON"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    pub commands: Vec<Command>,
    pub issues: Vec<PayloadIssue>,
    /// True when the commands came from field extraction rather than JSON.
    pub recovered: bool,
}

impl ParseOutcome {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn unparseable() -> Self {
        Self {
            commands: Vec::new(),
            issues: vec![PayloadIssue::Unparseable],
            recovered: false,
        }
    }

    fn from_items(items: Vec<Result<Item, PayloadIssue>>, recovered: bool) -> Self {
        let mut outcome = ParseOutcome {
            recovered,
            ..Default::default()
        };
        for item in items {
            match item {
                Ok(Item::Operation(op)) => match outcome.commands.last_mut() {
                    Some(Command::Edits(ops)) => ops.push(op),
                    _ => outcome.commands.push(Command::Edits(vec![op])),
                },
                Ok(Item::Write { name, content }) => {
                    outcome
                        .commands
                        .push(Command::WholeDocumentWrite { name, content });
                }
                Err(issue) => outcome.issues.push(issue),
            }
        }
        outcome
    }
}

/// Parses the interior of one marker region into zero or more commands.
///
/// Never fails: an unusable payload is reported through
/// [`ParseOutcome::issues`] with an empty command list.
pub fn parse_payload(text: &str, mode: ParseMode) -> ParseOutcome {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return ParseOutcome::unparseable();
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(items) = items_from_value(&value) {
            return ParseOutcome::from_items(items, false);
        }
    }

    let items: Vec<_> = split_objects(body)
        .into_iter()
        .filter_map(|object| extract_fields(object, mode))
        .map(RawFields::into_item)
        .collect();

    if items.iter().all(Result::is_err) && !items.iter().any(is_specific_issue) {
        return ParseOutcome::unparseable();
    }
    ParseOutcome::from_items(items, true)
}

fn is_specific_issue(item: &Result<Item, PayloadIssue>) -> bool {
    matches!(item, Err(issue) if *issue != PayloadIssue::Unrecognized)
}

enum Item {
    Operation(EditOperation),
    Write {
        name: Option<String>,
        content: String,
    },
}

#[derive(Debug, Default)]
struct RawFields {
    operation: Option<String>,
    start_line: Option<String>,
    end_line: Option<String>,
    content: Option<String>,
    name: Option<String>,
}

impl RawFields {
    fn is_blank(&self) -> bool {
        self.operation.is_none()
            && self.start_line.is_none()
            && self.end_line.is_none()
            && self.content.is_none()
    }

    fn into_item(self) -> Result<Item, PayloadIssue> {
        let Some(operation) = self.operation else {
            return match self.content {
                Some(content) => Ok(Item::Write {
                    name: self.name,
                    content,
                }),
                None => Err(PayloadIssue::Unrecognized),
            };
        };

        let kind = operation.trim().to_ascii_lowercase();
        if !matches!(kind.as_str(), "replace" | "insert" | "delete") {
            return Err(PayloadIssue::UnknownOperation(operation));
        }

        let start_line = match self.start_line {
            Some(raw) => line_number("startLine", &raw)?,
            None => return Err(PayloadIssue::MissingField("startLine")),
        };
        let end_line = match self.end_line {
            Some(raw) if kind != "insert" => line_number("endLine", &raw)?,
            _ => start_line,
        };
        if end_line < start_line {
            return Err(PayloadIssue::InvertedRange {
                start_line,
                end_line,
            });
        }

        let op = match kind.as_str() {
            "replace" => EditOperation::Replace {
                start_line,
                end_line,
                content: self.content.ok_or(PayloadIssue::MissingField("content"))?,
            },
            "insert" => EditOperation::Insert {
                start_line,
                content: self.content.ok_or(PayloadIssue::MissingField("content"))?,
            },
            _ => EditOperation::Delete {
                start_line,
                end_line,
            },
        };
        Ok(Item::Operation(op))
    }
}

fn line_number(field: &'static str, raw: &str) -> Result<usize, PayloadIssue> {
    match raw.trim().parse::<usize>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(PayloadIssue::InvalidLineNumber {
            field,
            value: raw.to_string(),
        }),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (```json) up to the first newline.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => return text,
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

// Strict path

fn items_from_value(value: &Value) -> Option<Vec<Result<Item, PayloadIssue>>> {
    match value {
        Value::Object(map) => Some(vec![fields_from_map(map).into_item()]),
        Value::Array(entries) => Some(
            entries
                .iter()
                .map(|entry| match entry {
                    Value::Object(map) => fields_from_map(map).into_item(),
                    _ => Err(PayloadIssue::Unrecognized),
                })
                .collect(),
        ),
        _ => None,
    }
}

fn fields_from_map(map: &Map<String, Value>) -> RawFields {
    let field = |names: &[&str]| names.iter().find_map(|name| map.get(*name));

    RawFields {
        operation: field(&["operation"]).map(scalar_text),
        start_line: field(&["startLine", "start_line"]).map(scalar_text),
        end_line: field(&["endLine", "end_line"]).map(scalar_text),
        content: field(&["content"]).and_then(content_text),
        name: field(&["name"]).and_then(Value::as_str).map(str::to_owned),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn content_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        // Some models send content as an array of lines.
        Value::Array(lines) => lines
            .iter()
            .map(|line| line.as_str())
            .collect::<Option<Vec<_>>>()
            .map(|lines| lines.join("\n")),
        _ => None,
    }
}

// Fallback path

static OPERATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""operation"\s*:\s*"([A-Za-z_]*)""#).expect("valid regex"));
static START_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:startLine|start_line)"\s*:\s*"?(-?[0-9.]+)"#).expect("valid regex")
});
static END_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:endLine|end_line)"\s*:\s*"?(-?[0-9.]+)"#).expect("valid regex")
});
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)"name"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex"));
static CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"content"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex")
});
static OPEN_CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"content"\s*:\s*"((?:[^"\\]|\\.)*)\\?\z"#).expect("valid regex")
});

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn extract_fields(object: &str, mode: ParseMode) -> Option<RawFields> {
    let content = capture(&CONTENT_RE, object).or_else(|| match mode {
        ParseMode::Speculative => capture(&OPEN_CONTENT_RE, object),
        ParseMode::Final => None,
    });

    let fields = RawFields {
        operation: capture(&OPERATION_RE, object).map(str::to_owned),
        start_line: capture(&START_LINE_RE, object).map(str::to_owned),
        end_line: capture(&END_LINE_RE, object).map(str::to_owned),
        content: content.map(unescape_json_string),
        name: capture(&NAME_RE, object).map(unescape_json_string),
    };
    (!fields.is_blank()).then_some(fields)
}

/// Splits text into top-level `{...}` slices, honoring string literals. An
/// object still open at the end of the text is returned as-is.
fn split_objects(text: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = index;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    objects.push(&text[start..=index]);
                }
            }
            _ => {}
        }
    }

    if depth > 0 {
        objects.push(&text[start..]);
    }
    objects
}

/// Decodes JSON string escapes in text captured by the fallback patterns.
pub fn unescape_json_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('u') => match decode_unicode_escape(&mut chars) {
                Some(decoded) => out.push(decoded),
                None => out.push('\u{fffd}'),
            },
            // `\"`, `\\`, `\/` and anything unknown keep the escaped char.
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn decode_unicode_escape(chars: &mut std::str::Chars<'_>) -> Option<char> {
    let high = read_hex4(chars)?;
    if !(0xD800..0xDC00).contains(&high) {
        return char::from_u32(high);
    }

    let mut lookahead = chars.clone();
    if lookahead.next() == Some('\\') && lookahead.next() == Some('u') {
        if let Some(low) = read_hex4(&mut lookahead) {
            if (0xDC00..0xE000).contains(&low) {
                *chars = lookahead;
                return char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00));
            }
        }
    }
    None
}

fn read_hex4(chars: &mut std::str::Chars<'_>) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..4 {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_ops(outcome: ParseOutcome) -> Vec<EditOperation> {
        match outcome.commands.as_slice() {
            [Command::Edits(ops)] => ops.clone(),
            other => panic!("expected one edit batch, got {other:?}"),
        }
    }

    #[test]
    fn strict_object_with_content_is_a_document_write() {
        let outcome = parse_payload(
            r#"{"name": "notes.md", "content": "line one\nline \"two\""}"#,
            ParseMode::Final,
        );
        assert!(!outcome.recovered);
        assert_eq!(
            outcome.commands,
            vec![Command::WholeDocumentWrite {
                name: Some("notes.md".to_string()),
                content: "line one\nline \"two\"".to_string(),
            }]
        );
    }

    #[test]
    fn strict_array_keeps_supply_order() {
        let ops = single_ops(parse_payload(
            r#"[
                {"operation": "delete", "startLine": 4, "endLine": 5},
                {"operation": "insert", "startLine": 1, "content": "top"},
                {"operation": "replace", "startLine": 2, "content": "X"}
            ]"#,
            ParseMode::Final,
        ));
        assert_eq!(
            ops,
            vec![
                EditOperation::Delete {
                    start_line: 4,
                    end_line: 5
                },
                EditOperation::Insert {
                    start_line: 1,
                    content: "top".to_string()
                },
                EditOperation::Replace {
                    start_line: 2,
                    end_line: 2,
                    content: "X".to_string()
                },
            ]
        );
    }

    #[test]
    fn accepts_string_numbers_and_snake_case_fields() {
        let ops = single_ops(parse_payload(
            r#"{"operation": "Replace", "start_line": "3", "end_line": "4", "content": ["a", "b"]}"#,
            ParseMode::Final,
        ));
        assert_eq!(
            ops,
            vec![EditOperation::Replace {
                start_line: 3,
                end_line: 4,
                content: "a\nb".to_string()
            }]
        );
    }

    #[test]
    fn bad_operations_are_skipped_individually() {
        let outcome = parse_payload(
            r#"[
                {"operation": "rename", "startLine": 1},
                {"operation": "delete", "startLine": 0},
                {"operation": "delete", "startLine": 5, "endLine": 2},
                {"operation": "replace", "startLine": 2},
                {"operation": "delete", "startLine": 7}
            ]"#,
            ParseMode::Final,
        );
        assert_eq!(
            outcome.commands,
            vec![Command::Edits(vec![EditOperation::Delete {
                start_line: 7,
                end_line: 7
            }])]
        );
        assert_eq!(
            outcome.issues,
            vec![
                PayloadIssue::UnknownOperation("rename".to_string()),
                PayloadIssue::InvalidLineNumber {
                    field: "startLine",
                    value: "0".to_string()
                },
                PayloadIssue::InvertedRange {
                    start_line: 5,
                    end_line: 2
                },
                PayloadIssue::MissingField("content"),
            ]
        );
    }

    #[test]
    fn code_fences_are_ignored() {
        let outcome = parse_payload(
            "```json\n{\"content\": \"fenced\"}\n```",
            ParseMode::Final,
        );
        assert_eq!(
            outcome.commands,
            vec![Command::WholeDocumentWrite {
                name: None,
                content: "fenced".to_string()
            }]
        );
    }

    #[test]
    fn fallback_recovers_near_json() {
        // Raw newline inside a string and a trailing comma: invalid JSON.
        let outcome = parse_payload(
            "{\"operation\": \"replace\", \"startLine\": 2, \"endLine\": 3, \"content\": \"X\nY\\tZ \\\"q\\\"\",}",
            ParseMode::Final,
        );
        assert!(outcome.recovered);
        assert_eq!(
            single_ops(outcome),
            vec![EditOperation::Replace {
                start_line: 2,
                end_line: 3,
                content: "X\nY\tZ \"q\"".to_string()
            }]
        );
    }

    #[test]
    fn fallback_splits_arrays_with_braces_inside_strings() {
        let outcome = parse_payload(
            r#"[{"operation": "insert", "startLine": 1, "content": "fn main() {"},
               {"operation": "delete", "startLine": 9,}]"#,
            ParseMode::Final,
        );
        assert!(outcome.recovered);
        assert_eq!(
            single_ops(outcome),
            vec![
                EditOperation::Insert {
                    start_line: 1,
                    content: "fn main() {".to_string()
                },
                EditOperation::Delete {
                    start_line: 9,
                    end_line: 9
                },
            ]
        );
    }

    #[test]
    fn truncated_content_only_recovers_speculatively() {
        let partial = r#"{"name": "a.txt", "content": "hello\nwor"#;

        let final_outcome = parse_payload(partial, ParseMode::Final);
        assert!(final_outcome.is_empty());
        assert_eq!(final_outcome.issues, vec![PayloadIssue::Unparseable]);

        let preview = parse_payload(partial, ParseMode::Speculative);
        assert_eq!(
            preview.commands,
            vec![Command::WholeDocumentWrite {
                name: Some("a.txt".to_string()),
                content: "hello\nwor".to_string()
            }]
        );
    }

    #[test]
    fn speculative_parse_drops_dangling_escape() {
        let preview = parse_payload(r#"{"content": "tab\"#, ParseMode::Speculative);
        assert_eq!(
            preview.commands,
            vec![Command::WholeDocumentWrite {
                name: None,
                content: "tab".to_string()
            }]
        );
    }

    #[test]
    fn garbage_yields_no_commands() {
        for text in ["", "   ", "not json at all", "42", "{\"other\": 1}"] {
            let outcome = parse_payload(text, ParseMode::Final);
            assert!(outcome.is_empty(), "{text:?} produced commands");
            assert!(!outcome.issues.is_empty());
        }
    }

    #[test]
    fn unescape_handles_unicode_and_surrogates() {
        assert_eq!(unescape_json_string(r"caf\u00e9"), "café");
        assert_eq!(unescape_json_string(r"\u00E9t\u00e9"), "été");
        assert_eq!(unescape_json_string(r"\ud83d\ude00!"), "😀!");
        assert_eq!(unescape_json_string(r"a\/b\\c\q"), "a/b\\cq");
        assert_eq!(unescape_json_string(r"\ud83d"), "\u{fffd}");
        assert_eq!(unescape_json_string(r"\ud83dx"), "\u{fffd}x");
        assert_eq!(unescape_json_string(r"\ude00 low"), "\u{fffd} low");
        assert_eq!(unescape_json_string(r"\u12"), "\u{fffd}");
    }

    #[test]
    fn fallback_decodes_unicode_escapes() {
        // The trailing comma keeps strict parsing from succeeding.
        let outcome = parse_payload(
            r#"{"operation": "insert", "startLine": 1, "content": "caf\u00e9 \ud83d\ude00",}"#,
            ParseMode::Final,
        );
        assert!(outcome.recovered);
        assert_eq!(
            single_ops(outcome),
            vec![EditOperation::Insert {
                start_line: 1,
                content: "café 😀".to_string()
            }]
        );
    }

    #[test]
    fn operations_serialize_to_canonical_shape() {
        let json = serde_json::to_value(EditOperation::Replace {
            start_line: 2,
            end_line: 3,
            content: "X".to_string(),
        })
        .expect("serializable");
        assert_eq!(
            json,
            serde_json::json!({"operation": "replace", "startLine": 2, "endLine": 3, "content": "X"})
        );
    }
}
