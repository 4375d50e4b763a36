use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ChatMessage, ChatRequest, ChatResponse, NdjsonChunk};
use crate::core::transcoder::{Fragment, StreamTranscoder};
use crate::utils::url::chat_url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    Fragment(Fragment),
    Error(String),
    End,
}

pub type StreamSender = mpsc::UnboundedSender<(StreamMessage, u64)>;

/// Line framing used by a backend's streaming responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    /// `data: {...}` lines ending with `data: [DONE]`.
    Sse,
    /// One JSON object per line with a `done` flag.
    Ndjson,
}

impl WireFormat {
    pub fn from_mode(mode: Option<&str>) -> Self {
        match mode {
            Some(mode) if mode.eq_ignore_ascii_case("ollama") => WireFormat::Ndjson,
            _ => WireFormat::Sse,
        }
    }

    pub fn chat_endpoint(self) -> &'static str {
        match self {
            WireFormat::Sse => "chat/completions",
            WireFormat::Ndjson => "api/chat",
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct DecodedLine {
    delta: Option<String>,
    terminal: Option<Terminal>,
}

#[derive(Debug, PartialEq, Eq)]
enum Terminal {
    Done,
    Error(String),
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn decode_sse_line(line: &str) -> DecodedLine {
    let Some(payload) = extract_data_payload(line) else {
        return DecodedLine::default();
    };
    if payload == "[DONE]" {
        return DecodedLine {
            delta: None,
            terminal: Some(Terminal::Done),
        };
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => DecodedLine {
            delta: response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|content| !content.is_empty()),
            terminal: None,
        },
        Err(_) if payload.trim().is_empty() => DecodedLine::default(),
        Err(_) => DecodedLine {
            delta: None,
            terminal: Some(Terminal::Error(format_api_error(payload))),
        },
    }
}

fn decode_ndjson_line(line: &str) -> DecodedLine {
    if line.is_empty() {
        return DecodedLine::default();
    }
    match serde_json::from_str::<NdjsonChunk>(line) {
        Ok(chunk) => {
            if chunk.error.is_some() {
                return DecodedLine {
                    delta: None,
                    terminal: Some(Terminal::Error(format_api_error(line))),
                };
            }
            DecodedLine {
                delta: chunk
                    .delta()
                    .filter(|content| !content.is_empty())
                    .map(str::to_owned),
                terminal: chunk.done.then_some(Terminal::Done),
            }
        }
        Err(_) => DecodedLine {
            delta: None,
            terminal: Some(Terminal::Error(format_api_error(line))),
        },
    }
}

fn decode_line(line: &str, format: WireFormat) -> DecodedLine {
    match format {
        WireFormat::Sse => decode_sse_line(line),
        WireFormat::Ndjson => decode_ndjson_line(line),
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value).filter(|s| !s.is_empty()) {
                return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
            }
            return format!("API Error:\n```json\n{}\n```", pretty_json);
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error:\n```\n{}\n```", trimmed)
    }
}

fn decode_frame(bytes: &[u8], format: WireFormat, stream_id: u64) -> DecodedLine {
    match std::str::from_utf8(bytes) {
        Ok(line) => decode_line(line.trim(), format),
        Err(err) => {
            warn!(stream_id, %err, "Skipping line with invalid UTF-8");
            DecodedLine::default()
        }
    }
}

/// Per-stream consumer state: the transcoder plus the channel it reports to.
struct StreamSink<'a> {
    tx: &'a StreamSender,
    stream_id: u64,
    transcoder: StreamTranscoder,
}

impl StreamSink<'_> {
    fn send(&self, message: StreamMessage) {
        let _ = self.tx.send((message, self.stream_id));
    }

    fn push_delta(&mut self, delta: &str) {
        for fragment in self.transcoder.push(delta) {
            self.send(StreamMessage::Fragment(fragment));
        }
    }

    /// Releases held prose, drops any unclosed region and signals the end.
    fn close(self, error: Option<String>) {
        let Self {
            tx,
            stream_id,
            transcoder,
        } = self;
        let (tail, discarded) = transcoder.finish();
        for fragment in tail {
            let _ = tx.send((StreamMessage::Fragment(fragment), stream_id));
        }
        if let Some(region) = discarded {
            debug!(
                stream_id,
                grammar = ?region.grammar,
                bytes = region.buffered_bytes,
                "Stream ended inside a marker region; edit not applied"
            );
        }
        if let Some(message) = error {
            let _ = tx.send((StreamMessage::Error(message), stream_id));
        }
        let _ = tx.send((StreamMessage::End, stream_id));
    }
}

/// Reads a response body, frames it into lines and forwards transcoded
/// fragments. Returns without sending anything further when cancelled.
pub async fn pump_stream<S, B, E>(
    stream: S,
    format: WireFormat,
    tx: &StreamSender,
    stream_id: u64,
    cancel_token: &CancellationToken,
) where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut sink = StreamSink {
        tx,
        stream_id,
        transcoder: StreamTranscoder::new(),
    };
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        if cancel_token.is_cancelled() {
            debug!(stream_id, "Stream cancelled; discarding transcoder state");
            return;
        }

        let chunk_bytes = match chunk {
            Ok(bytes) => bytes,
            Err(err) => {
                sink.close(Some(format!("Stream interrupted: {err}")));
                return;
            }
        };
        buffer.extend_from_slice(chunk_bytes.as_ref());

        while let Some(newline_pos) = memchr(b'\n', &buffer) {
            let decoded = decode_frame(&buffer[..newline_pos], format, stream_id);
            buffer.drain(..=newline_pos);

            if let Some(delta) = decoded.delta {
                sink.push_delta(&delta);
            }
            match decoded.terminal {
                Some(Terminal::Done) => {
                    sink.close(None);
                    return;
                }
                Some(Terminal::Error(message)) => {
                    sink.close(Some(message));
                    return;
                }
                None => {}
            }
        }
    }

    // Servers may omit the newline after the final object.
    let decoded = decode_frame(&buffer, format, stream_id);
    if let Some(delta) = decoded.delta {
        sink.push_delta(&delta);
    }
    if let Some(Terminal::Error(message)) = decoded.terminal {
        sink.close(Some(message));
        return;
    }
    sink.close(None);
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: Option<String>,
    pub wire_format: WireFormat,
    pub model: String,
    pub api_messages: Vec<ChatMessage>,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: StreamSender,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx_clone = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                base_url,
                api_key,
                wire_format,
                model,
                api_messages,
                cancel_token,
                stream_id,
            } = params;

            let request = ChatRequest {
                model,
                messages: api_messages,
                stream: true,
            };

            tokio::select! {
                _ = async {
                    let url = chat_url(&base_url, wire_format);
                    debug!(stream_id, %url, ?wire_format, "Starting chat stream");
                    let http_request = client
                        .post(url)
                        .header("Content-Type", "application/json");
                    let http_request =
                        crate::utils::auth::add_auth_headers(http_request, api_key.as_deref());

                    match http_request.json(&request).send().await {
                        Ok(response) => {
                            if !response.status().is_success() {
                                let error_text = response
                                    .text()
                                    .await
                                    .unwrap_or_else(|_| "<no body>".to_string());
                                let formatted_error = format_api_error(&error_text);
                                let _ = tx_clone
                                    .send((StreamMessage::Error(formatted_error), stream_id));
                                let _ = tx_clone.send((StreamMessage::End, stream_id));
                                return;
                            }

                            pump_stream(
                                response.bytes_stream(),
                                wire_format,
                                &tx_clone,
                                stream_id,
                                &cancel_token,
                            )
                            .await;
                        }
                        Err(e) => {
                            let formatted_error = format_api_error(&e.to_string());
                            let _ = tx_clone
                                .send((StreamMessage::Error(formatted_error), stream_id));
                            let _ = tx_clone.send((StreamMessage::End, stream_id));
                        }
                    }
                } => {}
                _ = cancel_token.cancelled() => {
                    debug!(stream_id, "Chat stream cancelled");
                }
            }
        });
    }

    #[cfg(test)]
    pub fn sender(&self) -> &StreamSender {
        &self.tx
    }
}
