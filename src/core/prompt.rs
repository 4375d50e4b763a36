//! System prompt that teaches the model the author edit grammar.

use crate::core::document::Document;
use crate::core::edits::document_lines;

const EDIT_INSTRUCTIONS: &str = "You are a writing and coding assistant working on a document the user has open.
Answer conversationally. When the user asks you to change the document, embed the change in your reply using one of these markers:

To replace the whole document:
[ADD_FILE]{\"name\": \"<file name>\", \"content\": \"<full new text>\"}[/ADD_FILE]

To change specific lines (line numbers refer to the document exactly as shown below):
[SURGICAL_EDIT][{\"operation\": \"replace\", \"startLine\": 3, \"endLine\": 4, \"content\": \"new text\"},
{\"operation\": \"insert\", \"startLine\": 1, \"content\": \"inserted before line 1\"},
{\"operation\": \"delete\", \"startLine\": 8, \"endLine\": 9}][/SURGICAL_EDIT]

Rules:
- The payload must be valid JSON. Escape newlines as \\n and quotes as \\\".
- Prefer SURGICAL_EDIT for small changes and ADD_FILE for rewrites.
- Never put markers inside code fences.";

/// Prefixes each line with its 1-based number, right-aligned.
pub fn number_lines(content: &str) -> String {
    let lines = document_lines(content);
    let width = lines.len().to_string().len();
    lines
        .iter()
        .enumerate()
        .map(|(index, line)| format!("{:>width$} | {line}", index + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_system_prompt(document: Option<&Document>) -> String {
    let mut prompt = EDIT_INSTRUCTIONS.to_string();
    match document {
        Some(document) => {
            let name = document.name().unwrap_or("untitled");
            prompt.push_str(&format!(
                "\n\nCurrent document ({name}, {} lines):\n",
                document.line_count()
            ));
            if document.content().is_empty() {
                prompt.push_str("(empty)");
            } else {
                prompt.push_str(&number_lines(document.content()));
            }
        }
        None => prompt.push_str("\n\nNo document is open yet; use ADD_FILE to create one."),
    }
    prompt
}
