//! Big-endian primitives shared by the manifest and dependency graph formats.
//!
//! Strings are `[len:i32][utf8 bytes]`, blobs are `[len:i32][bytes]`.

use super::error::{ManifestError, ManifestResult};

/// Cursor over an encoded buffer.
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Bytes consumed so far.
    pub(crate) fn consumed(&self) -> &'a [u8] {
        &self.buf[..self.pos]
    }

    fn take(&mut self, n: usize) -> ManifestResult<&'a [u8]> {
        let remaining = self.buf.len() - self.pos;
        if n > remaining {
            return Err(ManifestError::Truncated {
                offset: self.pos,
                needed: n - remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn read_i32(&mut self) -> ManifestResult<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_i64(&mut self) -> ManifestResult<i64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(raw))
    }

    /// Reads a length prefix, rejecting negative values.
    pub(crate) fn read_len(&mut self) -> ManifestResult<usize> {
        let offset = self.pos;
        let len = self.read_i32()?;
        if len < 0 {
            return Err(ManifestError::NegativeLength { offset, len });
        }
        Ok(len as usize)
    }

    pub(crate) fn read_bytes(&mut self) -> ManifestResult<&'a [u8]> {
        let len = self.read_len()?;
        self.take(len)
    }

    pub(crate) fn read_string(&mut self) -> ManifestResult<String> {
        let offset = self.pos;
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ManifestError::InvalidUtf8 { offset })
    }
}

/// Growable output buffer.
#[derive(Default)]
pub(crate) struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a length prefix. Lengths beyond `i32::MAX` cannot be represented
    /// and are clamped, which the reader then reports as truncation.
    pub(crate) fn write_len(&mut self, len: usize) {
        self.write_i32(i32::try_from(len).unwrap_or(i32::MAX));
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_len(bytes.len());
        self.write_raw(bytes);
    }

    pub(crate) fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }
}
