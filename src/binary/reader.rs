//! Primitive decoders mirroring [`Writer`](super::writer::Writer).
//!
//! A reader borrows finished bytes and decodes at absolute positions. It is
//! used by the loader and by tests, never on the write path.

use super::heap::Offset;
use crate::config::FormatConfig;
use crate::error::{MetaError, MetaResult};

/// Random-access decoder over heap bytes.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    config: FormatConfig,
}

impl<'a> Reader<'a> {
    /// Create a reader with the widths the bytes were written with.
    pub fn new(bytes: &'a [u8], config: FormatConfig) -> MetaResult<Self> {
        config.validate()?;
        Ok(Self { bytes, config })
    }

    /// The widths this reader decodes with.
    #[inline]
    pub fn config(&self) -> FormatConfig {
        self.config
    }

    /// The underlying bytes.
    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    fn slice(&self, at: Offset, len: usize) -> MetaResult<&'a [u8]> {
        let start = usize::try_from(at.get())
            .map_err(|_| MetaError::decode(at.get(), "position out of range"))?;
        start
            .checked_add(len)
            .and_then(|end| self.bytes.get(start..end))
            .ok_or_else(|| {
                MetaError::decode(
                    at.get(),
                    format!("need {} byte(s), heap is {} bytes", len, self.bytes.len()),
                )
            })
    }

    fn read_array<const N: usize>(&self, at: Offset) -> MetaResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(at, N)?);
        Ok(out)
    }

    // ========== Fixed-width integers ==========

    /// Read one byte.
    pub fn read_byte(&self, at: Offset) -> MetaResult<u8> {
        Ok(self.slice(at, 1)?[0])
    }

    /// Read a `u16`.
    pub fn read_short(&self, at: Offset) -> MetaResult<u16> {
        Ok(u16::from_le_bytes(self.read_array(at)?))
    }

    /// Read an `i16`.
    pub fn read_signed_short(&self, at: Offset) -> MetaResult<i16> {
        Ok(i16::from_le_bytes(self.read_array(at)?))
    }

    /// Read a `u32`.
    pub fn read_int(&self, at: Offset) -> MetaResult<u32> {
        Ok(u32::from_le_bytes(self.read_array(at)?))
    }

    /// Read a `u64`.
    pub fn read_long(&self, at: Offset) -> MetaResult<u64> {
        Ok(u64::from_le_bytes(self.read_array(at)?))
    }

    /// Read an unsigned integer of `width` bytes.
    pub fn read_uint(&self, at: Offset, width: u8) -> MetaResult<u64> {
        let raw = self.slice(at, usize::from(width))?;
        let mut buf = [0u8; 8];
        buf[..raw.len()].copy_from_slice(raw);
        Ok(u64::from_le_bytes(buf))
    }

    // ========== Strings ==========

    /// Read the nul-terminated string starting at `at`.
    pub fn read_string(&self, at: Offset) -> MetaResult<&'a str> {
        if at.is_null() {
            return Err(MetaError::decode(0, "null string offset"));
        }
        self.slice(at, 1)?;
        let start_idx = at.get() as usize;
        let len = self.bytes[start_idx..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| MetaError::decode(at.get(), "unterminated string"))?;
        std::str::from_utf8(&self.bytes[start_idx..start_idx + len])
            .map_err(|e| MetaError::decode(at.get(), format!("invalid UTF-8: {}", e)))
    }

    /// Read the string at `at`, or `None` when `at` is null.
    pub fn read_optional_string(&self, at: Offset) -> MetaResult<Option<&'a str>> {
        match at.non_null() {
            Some(at) => self.read_string(at).map(Some),
            None => Ok(None),
        }
    }

    // ========== Pointers and arrays ==========

    /// Read a pointer stored at `at`.
    pub fn read_pointer(&self, at: Offset) -> MetaResult<Offset> {
        self.read_uint(at, self.config.pointer_size).map(Offset::new)
    }

    /// Read an array count stored at `at`.
    pub fn read_array_count(&self, at: Offset) -> MetaResult<usize> {
        let count = self.read_uint(at, self.config.array_count_size)?;
        usize::try_from(count).map_err(|_| MetaError::decode(at.get(), "array count too large"))
    }

    /// Read the count-prefixed pointer array starting at `at`.
    pub fn read_binary_array(&self, at: Offset) -> MetaResult<Vec<Offset>> {
        let count = self.read_array_count(at)?;
        let mut cursor = self.advance(at, u64::from(self.config.array_count_size));
        let mut out = Vec::with_capacity(count.min(self.bytes.len()));
        for _ in 0..count {
            out.push(self.read_pointer(cursor)?);
            cursor = self.advance(cursor, u64::from(self.config.pointer_size));
        }
        Ok(out)
    }

    /// Read the array at `at`; a null offset reads as empty.
    pub fn read_optional_array(&self, at: Offset) -> MetaResult<Vec<Offset>> {
        match at.non_null() {
            Some(at) => self.read_binary_array(at),
            None => Ok(Vec::new()),
        }
    }

    /// `at + by`.
    #[inline]
    pub fn advance(&self, at: Offset, by: u64) -> Offset {
        Offset::new(at.get() + by)
    }

    /// `at` advanced past one pointer.
    #[inline]
    pub fn after_pointer(&self, at: Offset) -> Offset {
        self.advance(at, u64::from(self.config.pointer_size))
    }
}
