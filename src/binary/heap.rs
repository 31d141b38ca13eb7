//! The append-only byte heap and heap offsets.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a byte inside the heap. `0` is the null offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offset(u64);

impl Offset {
    /// The absent / null offset.
    pub const NULL: Offset = Offset(0);

    /// Create an offset from a raw position.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Offset(raw)
    }

    /// The raw position.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is the null offset.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `Some(self)` unless null.
    #[inline]
    pub fn non_null(self) -> Option<Offset> {
        if self.is_null() { None } else { Some(self) }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Append-only buffer holding all variable-length data of one container.
///
/// Byte 0 is a sacrificial zero so that offset `0` never addresses data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heap {
    bytes: Vec<u8>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Create a heap containing only the null marker byte.
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    /// Create a heap with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut bytes = Vec::with_capacity(capacity.max(1));
        bytes.push(0);
        Self { bytes }
    }

    /// Offset the next appended byte will get.
    #[inline]
    pub fn next_offset(&self) -> Offset {
        Offset(self.bytes.len() as u64)
    }

    /// Total size in bytes, marker included.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: the marker byte is never removed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Append bytes and return the offset of the first one.
    #[inline]
    pub fn append(&mut self, bytes: &[u8]) -> Offset {
        let at = self.next_offset();
        self.bytes.extend_from_slice(bytes);
        at
    }

    /// The heap contents.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the heap and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
