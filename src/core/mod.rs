pub mod builtin_providers;
pub mod canonical;
pub mod chat_stream;
pub mod config;
pub mod document;
pub mod edits;
pub mod markers;
pub mod payload;
pub mod prompt;
pub mod providers;
pub mod transcoder;
