//! Incremental conversion of raw model output into canonical fragments.
//!
//! [`transcode`] is a pure state transition: it takes one chunk and the
//! state left by the previous call and returns the fragments that became
//! final plus the next state. Prose outside markers is released as soon as
//! it cannot be the start of a delimiter; marker regions are held until
//! their closing delimiter arrives and only then become commands.

use tracing::{debug, warn};

use crate::core::markers::{
    self, GrammarKind, OpenMarker, LINE_EDITS_CLOSE, LINE_EDITS_OPEN, MARKER_END,
    MARKER_START_PREFIX,
};
use crate::core::payload::{parse_payload, Command, EditOperation, ParseMode};

/// One unit of the outgoing canonical stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Prose(String),
    /// Content replacement. Target 0 is the whole document; `n >= 1` is a
    /// single line.
    Document { target: usize, content: String },
    Operations(Vec<EditOperation>),
}

impl Fragment {
    /// Canonical wire text for this fragment.
    pub fn to_wire(&self) -> String {
        match self {
            Fragment::Prose(text) => text.clone(),
            Fragment::Document { target, content } => {
                format!("{MARKER_START_PREFIX}{target}]{content}{MARKER_END}")
            }
            Fragment::Operations(ops) => {
                let json = serde_json::to_string(ops).unwrap_or_else(|_| "[]".to_string());
                format!("{LINE_EDITS_OPEN}{json}{LINE_EDITS_CLOSE}")
            }
        }
    }

    /// The command this fragment carries, if any.
    pub fn command(&self) -> Option<Command> {
        match self {
            Fragment::Prose(_) => None,
            Fragment::Document { target: 0, content } => Some(Command::WholeDocumentWrite {
                name: None,
                content: content.clone(),
            }),
            Fragment::Document { target, content } => {
                Some(Command::Edits(vec![EditOperation::Replace {
                    start_line: *target,
                    end_line: *target,
                    content: content.clone(),
                }]))
            }
            Fragment::Operations(ops) => Some(Command::Edits(ops.clone())),
        }
    }
}

impl From<Command> for Fragment {
    fn from(command: Command) -> Self {
        match command {
            Command::WholeDocumentWrite { content, .. } => Fragment::Document { target: 0, content },
            Command::Edits(ops) => Fragment::Operations(ops),
        }
    }
}

/// Per-stream state. Created at stream start and dropped at stream end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscoderState {
    open: Option<OpenMarker>,
    /// Region interior while inside a marker; otherwise a held-back tail
    /// that may still become an opening delimiter.
    buffer: String,
}

impl TranscoderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inside_marker(&self) -> bool {
        self.open.is_some()
    }

    pub fn grammar(&self) -> Option<GrammarKind> {
        self.open.map(|marker| marker.grammar)
    }

    pub fn raw_buffer(&self) -> &str {
        &self.buffer
    }
}

/// A marker region still open when its stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscardedRegion {
    pub grammar: GrammarKind,
    pub buffered_bytes: usize,
}

#[derive(Default)]
struct FragmentSink {
    fragments: Vec<Fragment>,
}

impl FragmentSink {
    fn prose(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.fragments.last_mut() {
            Some(Fragment::Prose(existing)) => existing.push_str(text),
            _ => self.fragments.push(Fragment::Prose(text.to_string())),
        }
    }

    fn push(&mut self, fragment: Fragment) {
        match fragment {
            Fragment::Prose(text) => self.prose(&text),
            other => self.fragments.push(other),
        }
    }
}

/// Consumes one chunk. Must be called once per chunk, in arrival order, with
/// the state returned by the previous call.
pub fn transcode(chunk: &str, state: TranscoderState) -> (Vec<Fragment>, TranscoderState) {
    let TranscoderState {
        mut open,
        mut buffer,
    } = state;
    // A region carried over from the previous chunk was already searched
    // except for a possible delimiter prefix at its end.
    let mut search_from = open.map_or(0, |marker| {
        let close_len = marker.grammar.close_delimiter().len();
        buffer.len().saturating_sub(close_len - 1)
    });
    buffer.push_str(chunk);
    let mut sink = FragmentSink::default();

    loop {
        match open {
            Some(marker) => {
                let Some(close) = markers::find_close(&buffer, marker.grammar, search_from) else {
                    break;
                };
                for fragment in resolve_region(marker, &buffer[..close.start]) {
                    sink.push(fragment);
                }
                buffer.drain(..close.end);
                open = None;
            }
            None => {
                let scan = markers::scan(&buffer);
                sink.prose(scan.text_before);
                let consumed = buffer.len() - scan.remainder.len();
                let marker = scan.marker;
                buffer.drain(..consumed);
                match marker {
                    Some(marker) => {
                        open = Some(marker);
                        search_from = 0;
                    }
                    None => break,
                }
            }
        }
    }

    (sink.fragments, TranscoderState { open, buffer })
}

/// Ends a stream: releases held prose and discards any unclosed region.
pub fn finish(state: TranscoderState) -> (Vec<Fragment>, Option<DiscardedRegion>) {
    match state.open {
        Some(marker) => {
            warn!(
                grammar = ?marker.grammar,
                buffered_bytes = state.buffer.len(),
                "Discarding unterminated marker region at end of stream"
            );
            (
                Vec::new(),
                Some(DiscardedRegion {
                    grammar: marker.grammar,
                    buffered_bytes: state.buffer.len(),
                }),
            )
        }
        None if state.buffer.is_empty() => (Vec::new(), None),
        None => (vec![Fragment::Prose(state.buffer)], None),
    }
}

fn resolve_region(marker: OpenMarker, interior: &str) -> Vec<Fragment> {
    if !marker.grammar.carries_json() {
        return vec![Fragment::Document {
            target: marker.target,
            content: interior.to_string(),
        }];
    }

    let outcome = parse_payload(interior, ParseMode::Final);
    for issue in &outcome.issues {
        warn!(grammar = ?marker.grammar, %issue, "Skipping part of marker payload");
    }
    if outcome.is_empty() {
        debug!(
            grammar = ?marker.grammar,
            bytes = interior.len(),
            "Marker region produced no commands"
        );
    } else if outcome.recovered {
        debug!(grammar = ?marker.grammar, "Recovered commands from malformed payload");
    }

    outcome.commands.into_iter().map(Fragment::from).collect()
}

/// Owns a [`TranscoderState`] for callers that do not need to thread it.
#[derive(Debug, Default)]
pub struct StreamTranscoder {
    state: TranscoderState,
}

impl StreamTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<Fragment> {
        let (fragments, next) = transcode(chunk, std::mem::take(&mut self.state));
        self.state = next;
        fragments
    }

    pub fn finish(self) -> (Vec<Fragment>, Option<DiscardedRegion>) {
        finish(self.state)
    }

    pub fn state(&self) -> &TranscoderState {
        &self.state
    }

    /// Best-effort view of the region being buffered, for live display only.
    pub fn preview(&self) -> Option<Fragment> {
        let marker = self.state.open?;
        if !marker.grammar.carries_json() {
            return Some(Fragment::Document {
                target: marker.target,
                content: self.state.buffer.clone(),
            });
        }
        parse_payload(&self.state.buffer, ParseMode::Speculative)
            .commands
            .into_iter()
            .next()
            .map(Fragment::from)
    }
}
