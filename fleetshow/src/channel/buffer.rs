//! Capture buffer with incremental prompt search.
//!
//! Prompt literals are searched only over bytes that arrived since the last
//! search, plus enough overlap to catch a literal split across two chunks.
//! For large outputs (e.g., full routing tables) this keeps each search
//! proportional to the new data rather than to the whole capture.

use bytes::BytesMut;

use super::patterns::PromptSet;

/// Buffer for accumulating raw channel output.
#[derive(Debug)]
pub struct CaptureBuffer {
    /// The accumulated output buffer.
    buffer: BytesMut,

    /// Offset up to which the buffer has already been searched.
    scanned: usize,
}

impl CaptureBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            scanned: 0,
        }
    }

    /// Append raw bytes exactly as received.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Search the unsearched region for any of the prompts.
    ///
    /// Returns the index of the first prompt (in set order) found.
    pub fn search_new(&mut self, prompts: &PromptSet) -> Option<usize> {
        let overlap = prompts.longest().saturating_sub(1);
        let start = self.scanned.saturating_sub(overlap);
        self.scanned = self.buffer.len();
        prompts.find(&self.buffer[start..])
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the buffer, decoding it lossily.
    pub fn into_text(self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new()
    }
}
