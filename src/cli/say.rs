//! Non-interactive "say" command

use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatMessage;
use crate::core::chat_stream::{ChatStreamService, StreamMessage, StreamParams};
use crate::core::config::io::write_atomically;
use crate::core::config::Config;
use crate::core::document::{Document, DocumentSession};
use crate::core::prompt::build_system_prompt;
use crate::core::providers::{resolve_session, EnvCredentials};
use crate::core::transcoder::Fragment;
use crate::utils::logging::TranscriptLog;

pub struct SayOptions {
    pub prompt: Vec<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub document: Option<PathBuf>,
    pub write: bool,
    pub transcript: Option<PathBuf>,
}

/// What a finished stream left behind.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub reply: String,
    pub edits_applied: usize,
    pub edits_skipped: usize,
    pub error: Option<String>,
}

fn load_document(path: Option<&Path>) -> Result<Document, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(Document::new(""));
    };
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    match fs::read_to_string(path) {
        Ok(content) => Ok(Document::named(name, content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Starting a new document");
            Ok(Document::named(name, ""))
        }
        Err(err) => Err(format!("Failed to read {}: {err}", path.display()).into()),
    }
}

/// Drains one stream: prose goes to `out`, edit fragments go to `session`.
pub async fn consume_stream<W: Write>(
    rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    stream_id: u64,
    session: &mut DocumentSession,
    out: &mut W,
) -> Result<StreamSummary, Box<dyn Error>> {
    let mut summary = StreamSummary::default();

    while let Some((message, id)) = rx.recv().await {
        if id != stream_id {
            continue;
        }
        match message {
            StreamMessage::Fragment(Fragment::Prose(text)) => {
                summary.reply.push_str(&text);
                write!(out, "{text}")?;
                out.flush()?;
            }
            StreamMessage::Fragment(fragment) => match session.apply_fragment(&fragment) {
                Ok(Some(report)) => {
                    summary.edits_applied += report.applied;
                    summary.edits_skipped += report.outcomes.len() - report.applied;
                    if !report.success {
                        warn!(outcomes = ?report.outcomes, "Some edit operations were skipped");
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(%err, "Edit rejected by document session");
                    summary.edits_skipped += 1;
                }
            },
            StreamMessage::Error(err) => {
                summary.error = Some(err);
            }
            StreamMessage::End => break,
        }
    }

    Ok(summary)
}

pub async fn run_say(options: SayOptions, config: &Config) -> Result<(), Box<dyn Error>> {
    let prompt = options.prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: inkstream say <prompt>");
        std::process::exit(1);
    }

    let session = match resolve_session(
        &EnvCredentials,
        config,
        options.provider.as_deref(),
        options.model.as_deref(),
    ) {
        Ok(session) => session,
        Err(provider_err) => {
            eprintln!("{}", provider_err);
            let fixes = provider_err.quick_fixes();
            if !fixes.is_empty() {
                eprintln!();
                eprintln!("💡 Quick fixes:");
                for fix in fixes {
                    eprintln!("  • {fix}");
                }
            }
            std::process::exit(provider_err.exit_code());
        }
    };

    let transcript = options
        .transcript
        .as_deref()
        .map(TranscriptLog::new)
        .transpose()?;

    let document = load_document(options.document.as_deref())?;
    let has_document = options.document.is_some();
    let api_messages = vec![
        ChatMessage::system(build_system_prompt(has_document.then_some(&document))),
        ChatMessage::user(prompt.clone()),
    ];
    let mut doc_session = DocumentSession::new(document);

    debug!(
        provider = %session.provider_id,
        model = %session.model,
        "Sending prompt"
    );

    let cancel_token = CancellationToken::new();
    let (stream_service, mut rx) = ChatStreamService::new();
    let stream_id = 1;
    stream_service.spawn_stream(StreamParams {
        client: reqwest::Client::new(),
        base_url: session.base_url.clone(),
        api_key: session.api_key.clone(),
        wire_format: session.wire_format,
        model: session.model.clone(),
        api_messages,
        cancel_token: cancel_token.clone(),
        stream_id,
    });

    let mut stdout = io::stdout();
    let summary = tokio::select! {
        summary = consume_stream(&mut rx, stream_id, &mut doc_session, &mut stdout) => summary?,
        _ = tokio::signal::ctrl_c() => {
            cancel_token.cancel();
            println!();
            eprintln!("⚠️  Cancelled; no further edits were applied");
            StreamSummary::default()
        }
    };
    println!();

    if summary.edits_applied > 0 || summary.edits_skipped > 0 {
        eprintln!(
            "✏️  Applied {} edit operation(s){}",
            summary.edits_applied,
            if summary.edits_skipped > 0 {
                format!(", skipped {}", summary.edits_skipped)
            } else {
                String::new()
            }
        );
    }

    if let Some(transcript) = &transcript {
        transcript.log_exchange(&session.model, &prompt, &summary.reply, summary.edits_applied)?;
    }

    let document = doc_session.into_document();
    if document.revision() > 0 {
        match options.document.as_deref() {
            Some(path) if options.write => {
                write_atomically(path, document.content().as_bytes())?;
                eprintln!("✅ Saved {}", path.display());
            }
            _ => {
                let name = document.name().unwrap_or("untitled");
                println!("--- {name} (revision {}) ---", document.revision());
                println!("{}", document.content());
            }
        }
    }

    if let Some(err) = summary.error {
        eprintln!("\n❌ Error: {}", err);
        std::process::exit(1);
    }

    Ok(())
}
