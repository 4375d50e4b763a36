//! Offline transcoding of saved model output

use std::error::Error;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::core::transcoder::StreamTranscoder;

/// Splits `text` into pieces of at most `chunk_size` bytes without cutting
/// through a UTF-8 sequence. A piece always holds at least one character.
pub fn char_aligned_chunks(text: &str, chunk_size: usize) -> Vec<&str> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut cut = chunk_size.min(rest.len());
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

/// Runs `text` through the transcoder in `chunk_size` pieces and returns the
/// canonical stream.
pub fn transcode_text(text: &str, chunk_size: usize) -> String {
    let mut transcoder = StreamTranscoder::new();
    let mut output = String::with_capacity(text.len());
    for chunk in char_aligned_chunks(text, chunk_size) {
        for fragment in transcoder.push(chunk) {
            output.push_str(&fragment.to_wire());
        }
    }
    let (tail, discarded) = transcoder.finish();
    for fragment in tail {
        output.push_str(&fragment.to_wire());
    }
    if let Some(region) = discarded {
        eprintln!(
            "⚠️  Input ended inside an unterminated {:?} region ({} bytes dropped)",
            region.grammar, region.buffered_bytes
        );
    }
    output
}

pub fn run_transcode(input: Option<&Path>, chunk_size: usize) -> Result<(), Box<dyn Error>> {
    let text = match input {
        Some(path) => fs::read_to_string(path)
            .map_err(|err| format!("Failed to read {}: {err}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let mut stdout = io::stdout().lock();
    stdout.write_all(transcode_text(&text, chunk_size).as_bytes())?;
    stdout.flush()?;
    Ok(())
}
