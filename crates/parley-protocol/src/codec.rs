//! Field-level encoding: length-prefixed strings and raw bytes.
//!
//! A payload is a flat sequence of fields with no tags and no padding:
//!
//! ```text
//! ShortStr = [len: u8][utf-8 bytes; len]
//! LongStr  = [len: u16 big-endian][utf-8 bytes; len]
//! u8       = [byte]
//! ```
//!
//! [`PayloadWriter`] appends fields and [`PayloadReader`] consumes them in
//! the same order. Each typed request/response implements [`WireFormat`]
//! in terms of these two, so the field layout of a command lives in one
//! `encode`/`decode` pair.

use crate::ProtocolError;

/// Longest string a ShortStr can carry, in bytes.
pub const SHORT_STR_MAX: usize = u8::MAX as usize;

/// Longest string a LongStr can carry, in bytes.
pub const LONG_STR_MAX: usize = u16::MAX as usize;

/// A value with a fixed field layout on the wire.
pub trait WireFormat: Sized {
    /// Appends this value's fields to `w`.
    ///
    /// # Errors
    /// Returns `ProtocolError::StringTooLong` if a string field does not
    /// fit its length prefix. Nothing is sent in that case.
    fn encode(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError>;

    /// Reads this value's fields from `r`.
    ///
    /// # Errors
    /// Returns `ProtocolError::Truncated` or `InvalidUtf8` when the bytes
    /// don't match the layout.
    fn decode(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError>;
}

// ---------------------------------------------------------------------------
// PayloadWriter
// ---------------------------------------------------------------------------

/// Builds a payload field by field.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a ShortStr (1-byte length prefix).
    pub fn put_short_str(&mut self, s: &str) -> Result<(), ProtocolError> {
        let bytes = s.as_bytes();
        if bytes.len() > SHORT_STR_MAX {
            return Err(ProtocolError::StringTooLong {
                len: bytes.len(),
                max: SHORT_STR_MAX,
            });
        }
        self.buf.push(bytes.len() as u8);
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Appends a LongStr (2-byte big-endian length prefix).
    pub fn put_long_str(&mut self, s: &str) -> Result<(), ProtocolError> {
        let bytes = s.as_bytes();
        if bytes.len() > LONG_STR_MAX {
            return Err(ProtocolError::StringTooLong {
                len: bytes.len(),
                max: LONG_STR_MAX,
            });
        }
        self.buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Appends a single raw byte.
    pub fn put_u8(&mut self, b: u8) {
        self.buf.push(b);
    }

    /// Appends raw bytes with no length prefix.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer and returns the payload bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// ---------------------------------------------------------------------------
// PayloadReader
// ---------------------------------------------------------------------------

/// Consumes a payload field by field.
///
/// Borrows the payload; decoded strings are copied out so the frame can
/// be dropped right after decoding.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Looks at the next byte without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Reads a single raw byte.
    pub fn u8(&mut self, field: &'static str) -> Result<u8, ProtocolError> {
        Ok(self.take(1, field)?[0])
    }

    /// Reads `n` raw bytes.
    pub fn bytes(
        &mut self,
        n: usize,
        field: &'static str,
    ) -> Result<&'a [u8], ProtocolError> {
        self.take(n, field)
    }

    /// Reads a ShortStr.
    pub fn short_str(
        &mut self,
        field: &'static str,
    ) -> Result<String, ProtocolError> {
        let len = self.u8(field)? as usize;
        self.utf8(len, field)
    }

    /// Reads a LongStr.
    pub fn long_str(
        &mut self,
        field: &'static str,
    ) -> Result<String, ProtocolError> {
        let prefix = self.take(2, field)?;
        let len = u16::from_be_bytes([prefix[0], prefix[1]]) as usize;
        self.utf8(len, field)
    }

    /// Fails if any bytes are left over.
    pub fn finish(self) -> Result<(), ProtocolError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }

    fn utf8(
        &mut self,
        len: usize,
        field: &'static str,
    ) -> Result<String, ProtocolError> {
        let raw = self.take(len, field)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8(field))
    }

    fn take(
        &mut self,
        n: usize,
        field: &'static str,
    ) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated {
                field,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}
