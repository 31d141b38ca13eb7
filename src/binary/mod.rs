//! Binary metadata container.
//!
//! This module turns a [`Forest`](crate::meta::Forest) into a single
//! position-independent file that a runtime can memory-map and query by
//! name without parsing it up front.
//!
//! # Pipeline
//!
//! ```text
//! Forest ──► DeclarationSerializer ──► Writer (heap + string interning)
//!                    │                         │
//!                    └──► HashIndex ───────────┤
//!                                              ▼
//!                         MetaFile: header │ module table │ global table │ heap
//! ```
//!
//! # Module Structure
//!
//! - [`heap`] - Append-only byte buffer and [`Offset`]
//! - [`writer`] - Primitive encoders with string interning
//! - [`reader`] - Primitive decoders mirroring the writer
//! - [`hash_index`] - Key-less chained hash index (global symbol table)
//! - [`flags`] - Flag byte layout per record kind
//! - [`type_encoding`] - Recursive type expression codec
//! - [`serializer`] - Declaration records
//! - [`meta_file`] - Container sections and header
//! - [`loader`] - Read-side view: lookup and record decoding
//!
//! All integers are little-endian. Pointers and array counts use the widths
//! from [`FormatConfig`](crate::config::FormatConfig).

pub mod flags;
pub mod hash_index;
pub mod heap;
pub mod loader;
pub mod meta_file;
pub mod reader;
pub mod serializer;
pub mod type_encoding;
pub mod writer;

// Re-exports
pub use hash_index::HashIndex;
pub use heap::{Heap, Offset};
pub use loader::{DecodedDeclaration, DecodedKind, MetaFileReader};
pub use meta_file::{Header, MetaFile, SaveSummary};
pub use reader::Reader;
pub use serializer::DeclarationSerializer;
pub use writer::Writer;
