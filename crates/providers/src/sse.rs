//! SSE line decoder — raw bytes in, complete event payloads out.
//!
//! The response body arrives as arbitrary byte chunks that can split a line
//! (or a multi-byte UTF-8 character) anywhere. The decoder buffers bytes and
//! splits on `\n` *before* UTF-8 conversion: a continuation byte can never
//! equal `\n`, so a split character simply stays in the carry-over buffer
//! until its line completes.

use tracing::warn;

/// Incremental decoder for an OpenAI-compatible `text/event-stream` body.
///
/// Holds exactly one partial-line buffer between feeds. Empty lines, `:`
/// comments, and lines without the `data: ` prefix are discarded. The
/// `[DONE]` sentinel ends the stream: once seen, further input is ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk of raw bytes, returning the complete `data:` payloads it
    /// unlocked (in order). Payloads are the JSON text after the prefix;
    /// `[DONE]` is consumed internally and flips [`SseDecoder::is_done`].
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }

        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = &line[..line.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            let Ok(line) = std::str::from_utf8(line) else {
                warn!("Skipping SSE line with invalid UTF-8");
                continue;
            };

            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                self.done = true;
                break;
            }

            payloads.push(data.to_string());
        }

        payloads
    }
}
