use crate::wire::DecodeError;
use bytes::{Buf, BufMut, BytesMut};

/// ByteReader is a bounds-checked read cursor over a borrowed buffer. Each primitive read either
/// fully succeeds or returns `DecodeError::Truncated` without consuming anything. The underlying
/// buffer is never mutated.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.buf.len() < needed {
            return Err(DecodeError::Truncated {
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self) -> Result<u16, DecodeError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn u64(&mut self) -> Result<u64, DecodeError> {
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Read a u16 length-prefixed UTF-8 string. `what` names the field for error messages.
    pub(crate) fn short_string(&mut self, what: &'static str) -> Result<String, DecodeError> {
        let len = self.u16()? as usize;
        self.utf8(len, what)
    }

    /// Read a u32 length-prefixed UTF-8 string.
    pub(crate) fn long_string(&mut self, what: &'static str) -> Result<String, DecodeError> {
        let len = self.u32()? as usize;
        self.utf8(len, what)
    }

    fn utf8(&mut self, len: usize, what: &'static str) -> Result<String, DecodeError> {
        let raw = self.bytes(len)?;
        std::str::from_utf8(raw)
            .map(|s| s.to_string())
            .map_err(|_| DecodeError::InvalidUtf8(what))
    }

    /// Remaining bytes must be fully consumed by the caller's layout.
    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes(self.buf.len()))
        }
    }
}

/// Longest prefix of `s` that fits in `max_len` bytes without splitting a char.
fn clamp_to_char_boundary(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Write a u16 length-prefixed string. Strings longer than `u16::MAX` bytes are truncated at a
/// char boundary. `start_node` refuses cluster names that would be.
pub(crate) fn put_short_string(buf: &mut BytesMut, s: &str) {
    let s = clamp_to_char_boundary(s, u16::MAX as usize);
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

pub(crate) fn put_long_string(buf: &mut BytesMut, s: &str) {
    let s = clamp_to_char_boundary(s, u32::MAX as usize);
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}
