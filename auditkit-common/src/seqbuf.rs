//! Bounded, overflow-aware sequence buffer used by the message serializer.
//!
//! Mirrors the kernel audit subsystem's fixed-size scratch buffer: writes are
//! appended space-separated, and once capacity is exceeded the whole record
//! is considered lost rather than silently truncated.

use std::fmt::Write as _;

/// Error returned when a serialized record would not fit in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

impl std::fmt::Display for Overflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("audit record serialization overflow")
    }
}

impl std::error::Error for Overflow {}

/// A bounded text buffer that accumulates `key=value` tokens.
pub struct SeqBuf {
    capacity: usize,
    buf: String,
}

impl SeqBuf {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            buf: String::new(),
        }
    }

    /// Append a single already-formatted `key=value` token, space-separated
    /// from whatever precedes it.
    pub fn push_token(&mut self, token: &str) -> Result<(), Overflow> {
        let needed = token.len() + if self.buf.is_empty() { 0 } else { 1 };
        if self.buf.len() + needed > self.capacity {
            return Err(Overflow);
        }
        if !self.buf.is_empty() {
            self.buf.push(' ');
        }
        self.buf.push_str(token);
        Ok(())
    }

    /// Append a `key=value` pair built from a `Display` value.
    pub fn push_kv(&mut self, key: &str, value: impl std::fmt::Display) -> Result<(), Overflow> {
        let mut token = String::new();
        let _ = write!(token, "{key}={value}");
        self.push_token(&token)
    }

    /// Append a raw `key="value"` pair (used for the envelope fields whose
    /// payload itself contains space-separated `key=value` tokens).
    pub fn push_kv_quoted(&mut self, key: &str, value: &str) -> Result<(), Overflow> {
        let mut token = String::new();
        let _ = write!(token, "{key}=\"{value}\"");
        self.push_token(&token)
    }

    pub fn finish(self) -> String {
        self.buf
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
