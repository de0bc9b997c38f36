//! Bounded text buffer holding the host-protocol response for one line.
//!
//! Appends past capacity are silently dropped; a full response still ends in
//! a valid `ok` because the cursor never runs past the end.

use std::fmt;

/// Append-only response buffer with a fixed capacity.
#[derive(Debug)]
pub struct TranslationBuffer {
    text: String,
    capacity: usize,
}

impl TranslationBuffer {
    /// Matches the largest response the bridge produces (a full file
    /// listing) with headroom.
    pub const CAPACITY: usize = 4096;

    pub fn new() -> Self {
        Self::with_capacity(Self::CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            text: String::new(),
            capacity,
        }
    }

    /// Append formatted text, truncating silently once full. Returns the
    /// number of bytes actually appended.
    pub fn append(&mut self, args: fmt::Arguments<'_>) -> usize {
        let before = self.text.len();
        let _ = fmt::write(self, args);
        self.text.len() - before
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn ends_with_newline(&self) -> bool {
        self.text.ends_with('\n')
    }

    /// Drop one trailing newline if present, so the writer can append
    /// exactly one.
    pub fn strip_trailing_newline(&mut self) {
        if self.text.ends_with('\n') {
            self.text.pop();
        }
    }
}

impl Default for TranslationBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for TranslationBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = self.capacity.saturating_sub(self.text.len());
        if remaining == 0 {
            return Ok(());
        }
        if s.len() <= remaining {
            self.text.push_str(s);
        } else {
            let mut end = remaining;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            self.text.push_str(&s[..end]);
        }
        Ok(())
    }
}
