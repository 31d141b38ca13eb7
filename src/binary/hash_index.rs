//! Key-less chained hash index used as the global symbol table.
//!
//! Keys live only in memory while the index is being built. On disk each
//! occupied bucket is a count-prefixed array of record offsets, and every
//! record starts with its own name, so a consumer resolves collisions by
//! dereferencing each candidate and comparing the embedded name.
//!
//! # Layout
//!
//! ```text
//! slot table (capacity entries)      heap
//! ┌──────────┐
//! │ 0        │  bucket 0 empty
//! │ off ─────┼───────────────►  [count][rec][rec]...
//! │ 0        │  bucket 2 empty
//! │ ...      │
//! └──────────┘
//! ```

use super::heap::Offset;
use super::writer::Writer;
use crate::error::MetaResult;

/// FNV-1a offset basis (32-bit).
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
/// FNV-1a prime (32-bit).
const FNV_PRIME: u32 = 0x0100_0193;
/// Smallest bucket count.
const MIN_CAPACITY: usize = 2;

/// 32-bit FNV-1a hash of the UTF-8 bytes of `key`.
///
/// This is part of the on-disk format: loaders must hash names the same way.
pub fn hash_name(key: &str) -> u32 {
    key.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Bucket of `key` in a table of `capacity` buckets.
pub fn bucket_for(key: &str, capacity: usize) -> usize {
    hash_name(key) as usize % capacity
}

/// Bucket count for `expected` items: the smallest prime `>= ceil(1.3 * expected)`.
pub fn capacity_for(expected: usize) -> usize {
    let target = (expected * 13).div_ceil(10).max(MIN_CAPACITY);
    (target..).find(|&n| is_prime(n)).unwrap_or(target)
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

/// Fixed-capacity `name -> offset` index.
#[derive(Debug, Clone)]
pub struct HashIndex {
    buckets: Vec<Vec<(String, Offset)>>,
    len: usize,
}

impl HashIndex {
    /// Create an index sized for `expected` items.
    pub fn new(expected: usize) -> Self {
        Self::with_capacity(capacity_for(expected))
    }

    /// Create an index with exactly `capacity` buckets (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); capacity.max(1)],
            len: 0,
        }
    }

    /// Number of buckets.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Number of registered entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `(key, value)` to the chain of its bucket.
    pub fn add(&mut self, key: &str, value: Offset) {
        let bucket = bucket_for(key, self.capacity());
        let chain = &mut self.buckets[bucket];
        if chain.iter().any(|(k, _)| k == key) {
            log::warn!("duplicate global symbol `{}`; lookups return the first", key);
        }
        chain.push((key.to_string(), value));
        self.len += 1;
    }

    /// First value registered under `key`.
    pub fn get(&self, key: &str) -> Option<Offset> {
        self.buckets[bucket_for(key, self.capacity())]
            .iter()
            .find(|(k, _)| k == key)
            .map(|&(_, v)| v)
    }

    /// Write every occupied bucket as a binary array of its values and
    /// return the slot table: one entry per bucket, `0` for empty buckets.
    pub fn serialize(&self, writer: &mut Writer) -> MetaResult<Vec<Offset>> {
        let mut slots = Vec::with_capacity(self.capacity());
        let mut longest = 0;
        for chain in &self.buckets {
            if chain.is_empty() {
                slots.push(Offset::NULL);
                continue;
            }
            longest = longest.max(chain.len());
            let values: Vec<Offset> = chain.iter().map(|&(_, v)| v).collect();
            slots.push(writer.push_binary_array(&values)?);
        }
        log::trace!(
            "global table: {} entries in {} buckets, {} occupied, longest chain {}",
            self.len,
            self.capacity(),
            slots.iter().filter(|s| !s.is_null()).count(),
            longest
        );
        Ok(slots)
    }
}
