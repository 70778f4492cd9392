//! Bounds-checked reads over a copied region

use crate::error::DecodeError;

/// Sequential little-endian reader over a byte slice
///
/// Every read is checked against the slice length and reports
/// [`DecodeError::TruncatedRegion`] instead of reading out of bounds.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Cursor positioned at the start of `bytes`
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Cursor positioned at `offset`
    pub fn at(bytes: &'a [u8], offset: usize) -> Self {
        Self { bytes, pos: offset }
    }

    /// Current position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to an absolute position
    pub fn seek(&mut self, offset: usize) {
        self.pos = offset;
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self
            .pos
            .checked_add(N)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(DecodeError::TruncatedRegion {
                needed: (self.pos as u64).saturating_add(N as u64),
                available: self.bytes.len(),
            })?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(out)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        self.take::<8>().map(i64::from_le_bytes)
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        self.take::<8>().map(f64::from_le_bytes)
    }

    /// Read a fixed-width, NUL-terminated single-byte string
    ///
    /// Bytes are mapped one-to-one onto Latin-1 code points, which keeps the
    /// producer's `°` (0xB0) intact.
    pub fn read_str(&mut self, len: usize) -> Result<String, DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(DecodeError::TruncatedRegion {
                needed: (self.pos as u64).saturating_add(len as u64),
                available: self.bytes.len(),
            })?;
        let field = &self.bytes[self.pos..end];
        self.pos = end;

        let text = field.split(|&b| b == 0).next().unwrap_or_default();
        Ok(text.iter().map(|&b| b as char).collect())
    }
}
