//! Inkstream lets a chat model edit a document while it streams its reply.
//!
//! Models embed edits in their prose using marker regions
//! (`[ADD_FILE]...[/ADD_FILE]`, `[SURGICAL_EDIT]...[/SURGICAL_EDIT]`). The
//! crate is organized in layers:
//! - [`core::markers`] and [`core::payload`] recognize marker regions and
//!   turn their JSON payloads into commands, tolerating malformed JSON.
//! - [`core::transcoder`] rewrites a chunked stream into canonical fragments
//!   with results that do not depend on where the chunks were split.
//! - [`core::edits`] applies line-addressed batches to document text, and
//!   [`core::document`] holds the per-session document state.
//! - [`core::chat_stream`] and [`core::providers`] talk to OpenAI-compatible
//!   and Ollama-style backends; [`api`] defines their payloads.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
