// src/io/serial/framer.rs
//
// Line assembly for serial streams. Bytes arrive in arbitrary chunks; complete
// '\n'-terminated lines are extracted, trimmed, and blank lines dropped.
// A line that grows past the limit is cut, and the rest of it is discarded
// up to the next '\n' so no tail fragment is decoded as a reading.

/// Longest line kept before a forced split
pub const MAX_LINE_LENGTH: usize = 1024;

/// Newline-delimited framer
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_length: usize,
    /// Skipping the remainder of an oversized line
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        LineFramer {
            buffer: Vec::with_capacity(64),
            max_length: max_length.max(1),
            discarding: false,
        }
    }

    /// Feed a chunk of bytes, returning every line completed by it.
    /// Returned lines are whitespace-trimmed and never empty.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in data {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else {
                    let raw = std::mem::take(&mut self.buffer);
                    push_line(&raw, &mut lines);
                }
                continue;
            }

            if self.discarding {
                continue;
            }

            self.buffer.push(byte);

            // Force split on max length
            if self.buffer.len() >= self.max_length {
                let raw = std::mem::take(&mut self.buffer);
                push_line(&raw, &mut lines);
                self.discarding = true;
            }
        }

        lines
    }
}

fn push_line(raw: &[u8], lines: &mut Vec<String>) {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        lines.push(trimmed.to_string());
    }
}
