//! Primitive encoders over the heap.
//!
//! Every `push_*` method returns the offset at which its bytes became
//! addressable, so callers can chain the offsets of inner data into the
//! records that reference it. All integers are little-endian.

use ahash::AHashMap;

use super::heap::{Heap, Offset};
use crate::config::FormatConfig;
use crate::error::{MetaError, MetaResult};

/// Writes primitives, interned strings, pointers and arrays into a [`Heap`].
///
/// A writer exclusively owns its heap for the lifetime of one container.
/// String interning state is private to the writer.
#[derive(Debug)]
pub struct Writer {
    heap: Heap,
    config: FormatConfig,
    /// Maps string content to the offset of its first copy.
    interned: AHashMap<String, Offset>,
}

impl Writer {
    /// Create a writer over a fresh heap.
    pub fn new(config: FormatConfig) -> MetaResult<Self> {
        config.validate()?;
        Ok(Self {
            heap: Heap::new(),
            config,
            interned: AHashMap::new(),
        })
    }

    /// The widths this writer encodes with.
    #[inline]
    pub fn config(&self) -> FormatConfig {
        self.config
    }

    /// The heap written so far.
    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Offset of the next byte to be written.
    #[inline]
    pub fn current_offset(&self) -> Offset {
        self.heap.next_offset()
    }

    /// Number of distinct interned strings.
    pub fn interned_count(&self) -> usize {
        self.interned.len()
    }

    /// Finish writing and return the heap.
    pub fn into_heap(self) -> Heap {
        self.heap
    }

    // ========== Fixed-width integers ==========

    /// Write one byte.
    #[inline]
    pub fn push_byte(&mut self, value: u8) -> Offset {
        self.heap.append(&[value])
    }

    /// Write a `u16`.
    #[inline]
    pub fn push_short(&mut self, value: u16) -> Offset {
        self.heap.append(&value.to_le_bytes())
    }

    /// Write an `i16`.
    #[inline]
    pub fn push_signed_short(&mut self, value: i16) -> Offset {
        self.heap.append(&value.to_le_bytes())
    }

    /// Write a `u32`.
    #[inline]
    pub fn push_int(&mut self, value: u32) -> Offset {
        self.heap.append(&value.to_le_bytes())
    }

    /// Write a `u64`.
    #[inline]
    pub fn push_long(&mut self, value: u64) -> Offset {
        self.heap.append(&value.to_le_bytes())
    }

    // ========== Strings ==========

    /// Write a nul-terminated string, reusing an earlier identical copy.
    pub fn push_string(&mut self, s: &str) -> Offset {
        if let Some(&offset) = self.interned.get(s) {
            return offset;
        }
        let offset = self.push_string_uninterned(s);
        self.interned.insert(s.to_string(), offset);
        offset
    }

    /// Write a nul-terminated string without consulting or updating the
    /// interning table.
    pub fn push_string_uninterned(&mut self, s: &str) -> Offset {
        let offset = self.heap.append(s.as_bytes());
        self.heap.append(&[0]);
        offset
    }

    // ========== Pointers and arrays ==========

    /// Write `target` in the configured pointer width.
    ///
    /// Returns the position of the pointer itself, not `target`.
    pub fn push_pointer(&mut self, target: Offset) -> MetaResult<Offset> {
        let width = self.config.pointer_size;
        if target.get() > self.config.max_offset() {
            return Err(MetaError::OffsetOverflow {
                offset: target.get(),
                pointer_size: width,
            });
        }
        Ok(self.push_uint(target.get(), width))
    }

    /// Write an array count in the configured count width.
    pub fn push_array_count(&mut self, count: usize) -> MetaResult<Offset> {
        let width = self.config.array_count_size;
        let count = count as u64;
        if count > self.config.max_array_count() {
            return Err(MetaError::CountOverflow { count, width });
        }
        Ok(self.push_uint(count, width))
    }

    /// Write a count followed by each offset as a pointer.
    pub fn push_binary_array(&mut self, offsets: &[Offset]) -> MetaResult<Offset> {
        let start = self.push_array_count(offsets.len())?;
        for &offset in offsets {
            self.push_pointer(offset)?;
        }
        Ok(start)
    }

    fn push_uint(&mut self, value: u64, width: u8) -> Offset {
        let mut buf = Vec::with_capacity(usize::from(width));
        encode_uint(&mut buf, value, width);
        self.heap.append(&buf)
    }
}

/// Append `value` truncated to `width` little-endian bytes.
pub(crate) fn encode_uint(out: &mut Vec<u8>, value: u64, width: u8) {
    out.extend_from_slice(&value.to_le_bytes()[..usize::from(width)]);
}
