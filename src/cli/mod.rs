//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod apply;
pub mod provider_list;
pub mod say;
pub mod settings;
pub mod transcode;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::apply::run_apply;
use crate::cli::provider_list::list_providers;
use crate::cli::say::{run_say, SayOptions};
use crate::cli::settings::{set_value, unset_value};
use crate::cli::transcode::run_transcode;
use crate::core::config::Config;
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "inkstream")]
#[command(about = "Stream LLM replies that edit a document in place")]
#[command(
    long_about = "Inkstream sends a prompt to a chat model together with a line-numbered \
document, streams the reply, and applies the edits the model embeds in it.\n\n\
Edit markers understood in model output:\n\
  [ADD_FILE]{\"name\", \"content\"}[/ADD_FILE]        Replace the whole document\n\
  [SURGICAL_EDIT]{...} or [...][/SURGICAL_EDIT]      Line-addressed replace/insert/delete\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    API key used when no provider is selected\n\
  OPENAI_BASE_URL   Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\
  INKSTREAM_CONFIG  Path to an alternate config.toml\n\
  INKSTREAM_LOG     tracing filter directive, e.g. inkstream=debug"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Write diagnostics to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Show debug diagnostics
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a prompt and apply any edits in the reply to a document
    Say {
        /// Provider to use (see 'inkstream providers')
        #[arg(short = 'p', long)]
        provider: Option<String>,
        /// Model to use
        #[arg(short = 'm', long)]
        model: Option<String>,
        /// Document the model may edit; created if it does not exist
        #[arg(short = 'd', long, value_name = "FILE")]
        document: Option<PathBuf>,
        /// Save the edited document back to its file
        #[arg(short = 'w', long, requires = "document")]
        write: bool,
        /// Append the exchange to a transcript file
        #[arg(long, value_name = "FILE")]
        transcript: Option<PathBuf>,
        /// Prompt text
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        prompt: Vec<String>,
    },
    /// Rewrite raw model output into the canonical marker stream
    Transcode {
        /// File to read; stdin when omitted
        input: Option<PathBuf>,
        /// Feed the transcoder in chunks of this many bytes
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,
    },
    /// Apply a JSON batch of edit operations to a document
    Apply {
        /// Document to edit
        document: PathBuf,
        /// File holding the operations; stdin when omitted
        #[arg(long, value_name = "FILE")]
        ops: Option<PathBuf>,
        /// Overwrite the document instead of printing the result
        #[arg(short = 'i', long)]
        in_place: bool,
    },
    /// List built-in and custom providers
    Providers,
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key (provider and model for default-model)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
        /// Provider, for default-model
        value: Option<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let mut config = Config::load()?;

    init_tracing(
        config.log_filter.as_deref(),
        args.verbose,
        args.log_file.as_deref(),
    )?;

    match args.command {
        Commands::Say {
            provider,
            model,
            document,
            write,
            transcript,
            prompt,
        } => {
            run_say(
                SayOptions {
                    prompt,
                    provider,
                    model,
                    document,
                    write,
                    transcript,
                },
                &config,
            )
            .await
        }
        Commands::Transcode { input, chunk_size } => run_transcode(input.as_deref(), chunk_size),
        Commands::Apply {
            document,
            ops,
            in_place,
        } => run_apply(&document, ops.as_deref(), in_place),
        Commands::Providers => {
            list_providers(&config);
            Ok(())
        }
        Commands::Set { key, value } => {
            if value.is_empty() {
                config.print_all();
                return Ok(());
            }
            let message = set_value(&mut config, &key, &value)?;
            config.save()?;
            println!("✅ {message}");
            Ok(())
        }
        Commands::Unset { key, value } => {
            let message = unset_value(&mut config, &key, value.as_deref())?;
            config.save()?;
            println!("✅ {message}");
            Ok(())
        }
    }
}
