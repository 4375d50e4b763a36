//! Applies an operation batch from a file or stdin to a document on disk

use std::error::Error;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::core::config::io::write_atomically;
use crate::core::edits::{apply_command, ApplyReport, OperationStatus};
use crate::core::payload::{parse_payload, ParseMode};

/// Parses `ops_text` (a JSON object or array, optionally fenced) and applies
/// every command it yields to `document` in order.
pub fn apply_ops_text(document: &str, ops_text: &str) -> Result<ApplyReport, Box<dyn Error>> {
    let outcome = parse_payload(ops_text, ParseMode::Final);
    for issue in &outcome.issues {
        eprintln!("⚠️  Skipped part of the batch: {issue}");
    }
    if outcome.commands.is_empty() {
        return Err("No usable edit operations found in the input".into());
    }
    if outcome.recovered {
        tracing::debug!("Operations recovered from malformed JSON");
    }

    let mut report = ApplyReport {
        content: document.to_string(),
        success: true,
        applied: 0,
        outcomes: Vec::new(),
    };
    for command in &outcome.commands {
        let step = apply_command(&report.content, command);
        report.success &= step.success;
        report.applied += step.applied;
        report.outcomes.extend(step.outcomes);
        report.content = step.content;
    }
    Ok(report)
}

fn describe(report: &ApplyReport) -> String {
    let skipped: Vec<String> = report
        .outcomes
        .iter()
        .enumerate()
        .filter(|(_, status)| !status.is_applied())
        .map(|(index, status)| {
            let reason = match status {
                OperationStatus::OutOfRange => "out of range",
                OperationStatus::Overlaps => "overlaps another operation",
                OperationStatus::Invalid => "invalid line range",
                OperationStatus::Applied | OperationStatus::Clamped => "applied",
            };
            format!("#{} {reason}", index + 1)
        })
        .collect();

    let mut summary = format!(
        "Applied {} of {} operation(s)",
        report.applied,
        report.outcomes.len()
    );
    if !skipped.is_empty() {
        summary.push_str(&format!("; skipped {}", skipped.join(", ")));
    }
    summary
}

pub fn run_apply(document: &Path, ops: Option<&Path>, in_place: bool) -> Result<(), Box<dyn Error>> {
    let content = match fs::read_to_string(document) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(format!("Failed to read {}: {err}", document.display()).into()),
    };

    let ops_text = match ops {
        Some(path) => fs::read_to_string(path)
            .map_err(|err| format!("Failed to read {}: {err}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let report = apply_ops_text(&content, &ops_text)?;
    eprintln!("{}", describe(&report));

    if in_place {
        if report.applied > 0 {
            write_atomically(document, report.content.as_bytes())?;
            eprintln!("✅ Updated {}", document.display());
        }
    } else {
        let mut stdout = io::stdout().lock();
        stdout.write_all(report.content.as_bytes())?;
        stdout.flush()?;
    }
    Ok(())
}
