//! Typed arena for the declaration forest.
//!
//! Declarations are stored once and referenced from their module by a
//! lightweight typed index. The serializer only ever borrows from the arena,
//! so no ownership graph between declarations is needed.
//!
//! # Example
//!
//! ```ignore
//! use objc_metadata::arena::{Arena, ArenaIdx};
//!
//! #[derive(Clone, Copy, PartialEq, Eq)]
//! struct NodeId(u32);
//!
//! impl ArenaIdx for NodeId {
//!     fn from_u32(idx: u32) -> Self { NodeId(idx) }
//!     fn to_u32(self) -> u32 { self.0 }
//! }
//!
//! let mut arena: Arena<String, NodeId> = Arena::new();
//! let id = arena.push("NSObject".to_string());
//! assert_eq!(arena.try_get(id).map(String::as_str), Some("NSObject"));
//! ```

use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Arena Index Trait
// ============================================================================

/// Trait for typed arena indices.
pub trait ArenaIdx: Copy {
    /// Create an index from a raw u32 value.
    fn from_u32(idx: u32) -> Self;
    /// Convert the index to a raw u32 value.
    fn to_u32(self) -> u32;
}

impl ArenaIdx for u32 {
    fn from_u32(idx: u32) -> Self {
        idx
    }
    fn to_u32(self) -> u32 {
        self
    }
}

// ============================================================================
// Arena
// ============================================================================

/// Append-only storage addressed by typed indices. No deduplication.
#[derive(Debug, Clone)]
pub struct Arena<T, Idx: ArenaIdx = u32> {
    items: Vec<T>,
    _phantom: PhantomData<Idx>,
}

impl<T, Idx: ArenaIdx> Default for Arena<T, Idx> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            _phantom: PhantomData,
        }
    }
}

impl<T, Idx: ArenaIdx> Arena<T, Idx> {
    /// Create a new empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a value and return its typed index.
    pub fn push(&mut self, item: T) -> Idx {
        let idx = self.items.len() as u32;
        self.items.push(item);
        Idx::from_u32(idx)
    }

    /// Get a value by typed index, returning `None` if out of range.
    pub fn try_get(&self, idx: Idx) -> Option<&T> {
        self.items.get(idx.to_u32() as usize)
    }
}

// The arena travels as a plain JSON array; indices are positions in it.
impl<T: Serialize, Idx: ArenaIdx> Serialize for Arena<T, Idx> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>, Idx: ArenaIdx> Deserialize<'de> for Arena<T, Idx> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self {
            items: Vec::deserialize(deserializer)?,
            _phantom: PhantomData,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
