// ABOUTME: Line-assembling Server-Sent-Events decoder for the chat stream
// ABOUTME: Retains partial trailing lines across chunk boundaries before splitting
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # SSE Line Assembly
//!
//! The chat API streams `data: {...}` frames as UTF-8 text whose chunk
//! boundaries are set by the network, not by logical lines. [`SseLineBuffer`]
//! accumulates bytes and only releases the payloads of *complete* lines, so a
//! JSON frame split across two reads is reassembled instead of dropped. Lines
//! without the `data: ` prefix (comments, `event:`, `id:` fields, blank
//! separators) are ignored.

/// Prefix marking a payload-carrying SSE line
const DATA_PREFIX: &str = "data: ";

/// Stateful line assembler over an SSE byte stream
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    /// Bytes of the current, not-yet-terminated line
    buffer: String,
}

impl SseLineBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the payloads of every completed `data:` line
    ///
    /// Any trailing partial line stays buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim_end_matches('\r').to_owned();
            self.buffer.drain(..=newline);

            if let Some(payload) = Self::payload_of(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Drain the buffer when the stream ends, yielding a final unterminated
    /// `data:` line if one is pending
    pub fn flush(&mut self) -> Option<String> {
        let remainder = std::mem::take(&mut self.buffer);
        Self::payload_of(&remainder)
    }

    fn payload_of(line: &str) -> Option<String> {
        let payload = line.trim().strip_prefix(DATA_PREFIX)?.trim();
        if payload.is_empty() {
            None
        } else {
            Some(payload.to_owned())
        }
    }
}
