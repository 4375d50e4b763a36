use std::error::Error;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "INKSTREAM_LOG";
const DEFAULT_FILTER: &str = "warn";
const VERBOSE_FILTER: &str = "debug";

/// Picks the tracing directive: environment, then `-v`, then config.
fn filter_directive(env_value: Option<String>, config_filter: Option<&str>, verbose: bool) -> String {
    if let Some(value) = env_value.filter(|value| !value.trim().is_empty()) {
        return value;
    }
    if verbose {
        return VERBOSE_FILTER.to_string();
    }
    config_filter
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

/// Installs the global subscriber. Diagnostics go to stderr unless a log
/// file is given, so stdout stays reserved for command output.
pub fn init_tracing(
    config_filter: Option<&str>,
    verbose: bool,
    log_file: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let directive = filter_directive(std::env::var(LOG_FILTER_ENV).ok(), config_filter, verbose);
    let filter = EnvFilter::try_new(&directive)
        .map_err(|err| format!("Invalid log filter '{directive}': {err}"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    result.map_err(|err| err.to_string().into())
}

/// Plain-text record of prompts and prose replies.
pub struct TranscriptLog {
    file_path: PathBuf,
}

impl TranscriptLog {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, Box<dyn Error>> {
        let file_path = path.into();
        // Fail early rather than after the model has answered.
        Self::open(&file_path)?;
        Ok(Self { file_path })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn log_exchange(
        &self,
        model: &str,
        prompt: &str,
        reply: &str,
        applied_edits: usize,
    ) -> Result<(), Box<dyn Error>> {
        let mut writer = BufWriter::with_capacity(64 * 1024, Self::open(&self.file_path)?);

        writeln!(
            writer,
            "## {} ({model})",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        for line in format!("You: {prompt}").lines() {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer)?;
        for line in reply.lines() {
            writeln!(writer, "{line}")?;
        }
        if applied_edits > 0 {
            writeln!(writer)?;
            writeln!(writer, "## {applied_edits} document edit(s) applied")?;
        }
        writeln!(writer)?;

        writer.flush()?;
        Ok(())
    }

    fn open(path: &Path) -> std::io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }
}
