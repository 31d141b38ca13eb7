//! Objective-C metadata generator - binary container
//!
//! This crate serializes a resolved forest of Objective-C / C declarations
//! (functions, structs, unions, variables, classes, protocols) into a compact
//! binary container, and reads such containers back.
//!
//! # Architecture
//!
//! - [`meta`] - In-memory declaration forest handed over by the front end
//! - [`binary`] - Heap writer, type codec, record serializer, global hash
//!   index and the container itself
//! - [`FormatConfig`] - Pointer and array-count widths for one output file
//! - [`MetaError`] - Everything that can fail while writing or reading
//!
//! Serialization is single-threaded and deterministic: the same forest and
//! the same config always produce the same bytes.
//!
//! ```rust
//! use objc_metadata::binary::{MetaFile, MetaFileReader};
//! use objc_metadata::meta::{DeclKind, Declaration, Forest, MetaInfo, Type};
//! use objc_metadata::FormatConfig;
//!
//! let mut forest = Forest::new();
//! let module = forest.add_module("Foundation");
//! forest.add_declaration(
//!     module,
//!     Declaration::new(MetaInfo::new("NSNotFound"), DeclKind::Var { ty: Type::Long }),
//! );
//!
//! let bytes = MetaFile::new(&forest, FormatConfig::default()).to_bytes()?;
//! let file = MetaFileReader::parse(&bytes)?;
//! assert!(file.lookup("NSNotFound")?.is_some());
//! # Ok::<(), objc_metadata::MetaError>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::uninlined_format_args)]

pub mod arena;
pub mod binary;
pub mod config;
pub mod error;
pub mod meta;

// Re-exports for convenience
pub use binary::{MetaFile, MetaFileReader};
pub use config::FormatConfig;
pub use error::{MetaError, MetaResult};
pub use meta::Forest;
