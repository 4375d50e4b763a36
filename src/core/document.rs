//! Document state owned by one editing session.
//!
//! The model is the single writer while an edit is in progress: user edits
//! are rejected until the edit completes or is cancelled.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

use tracing::debug;

use crate::core::edits::{apply_command, apply_edits, document_lines, ApplyReport};
use crate::core::payload::{Command, EditOperation};
use crate::core::transcoder::Fragment;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    name: Option<String>,
    content: String,
    revision: u64,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            name: None,
            content: content.into(),
            revision: 0,
        }
    }

    pub fn named(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(content)
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of mutations applied since the document was opened.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn line_count(&self) -> usize {
        document_lines(&self.content).len()
    }

    fn commit(&mut self, report: &ApplyReport) {
        if report.applied > 0 {
            self.content.clone_from(&report.content);
            self.revision += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A user edit arrived while the model holds the document.
    ModelEditing { target_line: usize },
    AlreadyEditing { target_line: usize },
    NotEditing,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::ModelEditing { target_line } => write!(
                f,
                "The document is being edited by the model (target line {target_line}); try again when it finishes"
            ),
            SessionError::AlreadyEditing { target_line } => {
                write!(f, "A model edit targeting line {target_line} is already in progress")
            }
            SessionError::NotEditing => write!(f, "No model edit is in progress"),
        }
    }
}

impl Error for SessionError {}

#[derive(Debug, Clone)]
pub struct DocumentSession {
    document: Document,
    model_target_line: Option<usize>,
    is_model_editing: bool,
    pending: String,
}

impl DocumentSession {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            model_target_line: None,
            is_model_editing: false,
            pending: String::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn is_model_editing(&self) -> bool {
        self.is_model_editing
    }

    /// Last line targeted by the model. Kept after an edit completes.
    pub fn model_target_line(&self) -> Option<usize> {
        self.model_target_line
    }

    /// Begins a streamed model edit. Target 0 rewrites the whole document.
    pub fn start_edit(&mut self, line: usize) -> Result<(), SessionError> {
        if self.is_model_editing {
            return Err(SessionError::AlreadyEditing {
                target_line: self.model_target_line.unwrap_or(0),
            });
        }
        self.is_model_editing = true;
        self.model_target_line = Some(line);
        self.pending.clear();
        Ok(())
    }

    /// Buffers streamed content. The committed document is untouched.
    pub fn stream_chunk(&mut self, text: &str) -> Result<(), SessionError> {
        if !self.is_model_editing {
            return Err(SessionError::NotEditing);
        }
        self.pending.push_str(text);
        Ok(())
    }

    pub fn complete_edit(&mut self) -> Result<ApplyReport, SessionError> {
        if !self.is_model_editing {
            return Err(SessionError::NotEditing);
        }
        let content = std::mem::take(&mut self.pending);
        let command = edit_command(self.model_target_line.unwrap_or(0), content);
        self.is_model_editing = false;

        let report = apply_command(self.document.content(), &command);
        self.document.commit(&report);
        debug!(
            target_line = self.model_target_line,
            applied = report.applied,
            revision = self.document.revision(),
            "Completed model edit"
        );
        Ok(report)
    }

    pub fn cancel_edit(&mut self) {
        if self.is_model_editing {
            debug!(target_line = self.model_target_line, "Cancelled model edit");
        }
        self.pending.clear();
        self.is_model_editing = false;
    }

    pub fn apply_user_edit(&mut self, ops: &[EditOperation]) -> Result<ApplyReport, SessionError> {
        self.ensure_user_can_write()?;
        let report = apply_edits(self.document.content(), ops);
        self.document.commit(&report);
        Ok(report)
    }

    pub fn set_user_content(&mut self, content: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_user_can_write()?;
        let command = Command::WholeDocumentWrite {
            name: None,
            content: content.into(),
        };
        let report = apply_command(self.document.content(), &command);
        self.document.commit(&report);
        Ok(())
    }

    /// Applies a complete model command outside a streamed edit.
    pub fn apply_command(&mut self, command: &Command) -> Result<ApplyReport, SessionError> {
        if self.is_model_editing {
            return Err(SessionError::AlreadyEditing {
                target_line: self.model_target_line.unwrap_or(0),
            });
        }
        if let Command::WholeDocumentWrite {
            name: Some(name), ..
        } = command
        {
            if self.document.name.is_none() {
                self.document.name = Some(name.clone());
            }
        }
        let report = apply_command(self.document.content(), command);
        self.document.commit(&report);
        Ok(report)
    }

    /// Drives the session from one canonical fragment. Prose is ignored.
    pub fn apply_fragment(&mut self, fragment: &Fragment) -> Result<Option<ApplyReport>, SessionError> {
        match fragment {
            Fragment::Prose(_) => Ok(None),
            Fragment::Document { target, content } => {
                self.start_edit(*target)?;
                self.stream_chunk(content)?;
                self.complete_edit().map(Some)
            }
            Fragment::Operations(ops) => self.apply_command(&Command::Edits(ops.clone())).map(Some),
        }
    }

    /// Committed content with any in-flight model edit spliced in.
    pub fn preview(&self) -> Cow<'_, str> {
        if !self.is_model_editing {
            return Cow::Borrowed(self.document.content());
        }
        let command = edit_command(self.model_target_line.unwrap_or(0), self.pending.clone());
        Cow::Owned(apply_command(self.document.content(), &command).content)
    }

    fn ensure_user_can_write(&self) -> Result<(), SessionError> {
        if self.is_model_editing {
            return Err(SessionError::ModelEditing {
                target_line: self.model_target_line.unwrap_or(0),
            });
        }
        Ok(())
    }
}

fn edit_command(target_line: usize, content: String) -> Command {
    if target_line == 0 {
        Command::WholeDocumentWrite {
            name: None,
            content,
        }
    } else {
        Command::Edits(vec![EditOperation::Replace {
            start_line: target_line,
            end_line: target_line,
            content,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(content: &str) -> DocumentSession {
        DocumentSession::new(Document::named("notes.txt", content))
    }

    #[test]
    fn streamed_line_edit_replaces_target_line_on_completion() {
        let mut session = session("a\nb\nc");
        session.start_edit(2).expect("start");
        session.stream_chunk("B1\n").expect("chunk");
        session.stream_chunk("B2").expect("chunk");

        assert_eq!(session.document().content(), "a\nb\nc");
        assert_eq!(session.preview(), "a\nB1\nB2\nc");

        let report = session.complete_edit().expect("complete");
        assert_eq!(report.applied, 1);
        assert_eq!(session.document().content(), "a\nB1\nB2\nc");
        assert_eq!(session.document().revision(), 1);
        assert!(!session.is_model_editing());
        assert_eq!(session.model_target_line(), Some(2));
    }

    #[test]
    fn cancel_discards_buffer_without_touching_document() {
        let mut session = session("a\nb");
        session.start_edit(1).expect("start");
        session.stream_chunk("zzz").expect("chunk");
        session.cancel_edit();

        assert_eq!(session.document().content(), "a\nb");
        assert_eq!(session.document().revision(), 0);
        assert!(!session.is_model_editing());
        assert_eq!(session.complete_edit(), Err(SessionError::NotEditing));
    }

    #[test]
    fn user_edits_are_rejected_while_model_is_editing() {
        let mut session = session("a\nb");
        session.start_edit(0).expect("start");

        let op = EditOperation::Delete {
            start_line: 1,
            end_line: 1,
        };
        assert_eq!(
            session.apply_user_edit(std::slice::from_ref(&op)),
            Err(SessionError::ModelEditing { target_line: 0 })
        );
        assert!(session.set_user_content("x").is_err());
        assert_eq!(
            session.start_edit(3),
            Err(SessionError::AlreadyEditing { target_line: 0 })
        );

        session.cancel_edit();
        let report = session.apply_user_edit(&[op]).expect("user edit");
        assert_eq!(report.content, "b");
        assert_eq!(session.document().content(), "b");
    }

    #[test]
    fn whole_document_target_rewrites_everything() {
        let mut session = session("old");
        let report = session
            .apply_fragment(&Fragment::Document {
                target: 0,
                content: "brand\nnew".to_string(),
            })
            .expect("fragment")
            .expect("report");
        assert!(report.success);
        assert_eq!(session.document().content(), "brand\nnew");
        assert_eq!(session.document().line_count(), 2);
        assert_eq!(session.document().name(), Some("notes.txt"));
        assert_eq!(Document::new("brand\nnew\n").line_count(), 2);
    }

    #[test]
    fn operation_fragments_apply_as_a_batch() {
        let mut session = session("a\nb\nc\nd\ne");
        let fragment = Fragment::Operations(vec![
            EditOperation::Replace {
                start_line: 2,
                end_line: 2,
                content: "X".to_string(),
            },
            EditOperation::Delete {
                start_line: 4,
                end_line: 4,
            },
        ]);
        assert_eq!(session.apply_fragment(&Fragment::Prose("hi".into())), Ok(None));
        session.apply_fragment(&fragment).expect("apply");
        assert_eq!(session.document().content(), "a\nX\nc\ne");
    }

    #[test]
    fn failed_batches_leave_revision_unchanged() {
        let mut session = session("a");
        let report = session
            .apply_command(&Command::Edits(vec![EditOperation::Delete {
                start_line: 5,
                end_line: 6,
            }]))
            .expect("apply");
        assert_eq!(report.applied, 0);
        assert_eq!(session.document().content(), "a");
        assert_eq!(session.document().revision(), 0);
    }

    #[test]
    fn named_write_names_an_unnamed_document() {
        let mut session = DocumentSession::new(Document::new(""));
        session
            .apply_command(&Command::WholeDocumentWrite {
                name: Some("main.rs".to_string()),
                content: "fn main() {}".to_string(),
            })
            .expect("apply");
        assert_eq!(session.document().name(), Some("main.rs"));
        assert_eq!(session.into_document().content(), "fn main() {}");
    }
}
