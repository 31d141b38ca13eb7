//! The metadata container.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header                                                       │
//! │   pointer_size:u8  array_count_size:u8                       │
//! │   module_table_offset:ptr  global_table_offset:ptr           │
//! │   heap_offset:ptr                      (file-absolute)       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Module table: count, then one heap offset per module name    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Global table: count (= capacity), then one slot per bucket   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Heap: marker byte, strings, encodings, records, chains       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Offsets stored in the module table, the global table and inside the heap
//! are heap-relative. Header offsets are file-absolute.

use std::io::{Cursor, Seek, SeekFrom, Write};
use std::path::Path;

use ahash::AHashMap;
use serde::Serialize;

use super::hash_index::HashIndex;
use super::heap::{Heap, Offset};
use super::serializer::DeclarationSerializer;
use super::writer::{Writer, encode_uint};
use crate::config::FormatConfig;
use crate::error::{MetaError, MetaResult};
use crate::meta::{DeclKind, Forest};

// ============================================================================
// Header
// ============================================================================

/// Fixed container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Header {
    /// Widths used throughout the file.
    pub config: FormatConfig,
    /// File position of the module table.
    pub module_table_offset: u64,
    /// File position of the global table.
    pub global_table_offset: u64,
    /// File position of the heap.
    pub heap_offset: u64,
}

impl Header {
    /// Encoded header size for `config`.
    pub fn size(config: FormatConfig) -> usize {
        2 + 3 * usize::from(config.pointer_size)
    }

    /// Encode the header.
    pub fn encode(&self) -> MetaResult<Vec<u8>> {
        let mut out = Vec::with_capacity(Self::size(self.config));
        out.push(self.config.pointer_size);
        out.push(self.config.array_count_size);
        for offset in [
            self.module_table_offset,
            self.global_table_offset,
            self.heap_offset,
        ] {
            push_checked_pointer(&mut out, self.config, offset)?;
        }
        Ok(out)
    }
}

fn push_checked_pointer(out: &mut Vec<u8>, config: FormatConfig, offset: u64) -> MetaResult<()> {
    if offset > config.max_offset() {
        return Err(MetaError::OffsetOverflow {
            offset,
            pointer_size: config.pointer_size,
        });
    }
    encode_uint(out, offset, config.pointer_size);
    Ok(())
}

/// Encode a count-prefixed pointer array outside the heap.
fn encode_section(config: FormatConfig, offsets: &[Offset]) -> MetaResult<Vec<u8>> {
    let count = offsets.len() as u64;
    if count > config.max_array_count() {
        return Err(MetaError::CountOverflow {
            count,
            width: config.array_count_size,
        });
    }
    let mut out = Vec::with_capacity(
        usize::from(config.array_count_size) + offsets.len() * usize::from(config.pointer_size),
    );
    encode_uint(&mut out, count, config.array_count_size);
    for offset in offsets {
        push_checked_pointer(&mut out, config, offset.get())?;
    }
    Ok(out)
}

// ============================================================================
// Module table
// ============================================================================

/// Top-level module names, interned before any record is written so that
/// records can refer to their module by a stable `u16` index.
#[derive(Debug, Default)]
struct ModuleTable {
    names: Vec<Offset>,
    index: AHashMap<String, u16>,
}

impl ModuleTable {
    fn build(forest: &Forest, writer: &mut Writer) -> MetaResult<Self> {
        let mut table = ModuleTable::default();
        for module in &forest.modules {
            let name = module.top_level_name();
            if table.index.contains_key(name) {
                continue;
            }
            let idx = u16::try_from(table.names.len()).map_err(|_| MetaError::CountOverflow {
                count: table.names.len() as u64,
                width: 2,
            })?;
            table.names.push(writer.push_string(name));
            table.index.insert(name.to_string(), idx);
        }
        Ok(table)
    }

    fn index_of(&self, top_level_name: &str) -> MetaResult<u16> {
        self.index.get(top_level_name).copied().ok_or_else(|| {
            MetaError::InvariantViolation(format!("module `{}` missing from module table", top_level_name))
        })
    }
}

// ============================================================================
// MetaFile
// ============================================================================

/// Statistics reported by [`MetaFile::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    /// Distinct top-level modules.
    pub modules: usize,
    /// Registered top-level declarations.
    pub declarations: usize,
    /// Global table bucket count.
    pub global_table_capacity: usize,
    /// Heap size in bytes.
    pub heap_size: usize,
    /// Total file size in bytes.
    pub file_size: u64,
}

struct Sections {
    heap: Heap,
    module_table: Vec<Offset>,
    global_table: Vec<Offset>,
    declarations: usize,
}

/// Serializes a declaration forest into a container.
#[derive(Debug, Clone, Copy)]
pub struct MetaFile<'f> {
    forest: &'f Forest,
    config: FormatConfig,
}

impl<'f> MetaFile<'f> {
    /// Create a container for `forest` using `config` widths.
    pub fn new(forest: &'f Forest, config: FormatConfig) -> Self {
        Self { forest, config }
    }

    /// Walk the forest and fill the heap. Modules are visited in forest
    /// order and declarations in collection order, which makes the output
    /// byte-for-byte reproducible.
    fn build(&self) -> MetaResult<Sections> {
        let mut writer = Writer::new(self.config)?;
        let modules = ModuleTable::build(self.forest, &mut writer)?;

        let expected = self
            .forest
            .modules
            .iter()
            .flat_map(|m| m.declarations.iter())
            .filter_map(|&id| self.forest.get(id))
            .filter(|d| !matches!(d.decl, DeclKind::Category { .. }))
            .count();
        let mut global_table = HashIndex::new(expected);

        {
            let mut serializer = DeclarationSerializer::new(&mut writer, &mut global_table);
            for module in &self.forest.modules {
                let module_index = modules.index_of(module.top_level_name())?;
                for &id in &module.declarations {
                    let decl = self.forest.get(id).ok_or_else(|| {
                        MetaError::InvariantViolation(format!(
                            "module `{}` references a missing declaration",
                            module.name
                        ))
                    })?;
                    serializer.serialize(decl, module_index)?;
                }
            }
        }

        let global_slots = global_table.serialize(&mut writer)?;
        Ok(Sections {
            heap: writer.into_heap(),
            module_table: modules.names,
            global_table: global_slots,
            declarations: global_table.len(),
        })
    }

    /// Write the container to `out`.
    ///
    /// The header is first written as a placeholder; once every section has
    /// been written the stream is rewound and the final header is written
    /// over it.
    pub fn save<W: Write + Seek>(&self, out: &mut W) -> MetaResult<SaveSummary> {
        let sections = self.build()?;
        let config = self.config;

        let start = out.stream_position()?;
        out.write_all(&vec![0u8; Header::size(config)])?;

        let module_table_offset = out.stream_position()? - start;
        out.write_all(&encode_section(config, &sections.module_table)?)?;

        let global_table_offset = out.stream_position()? - start;
        out.write_all(&encode_section(config, &sections.global_table)?)?;

        let heap_offset = out.stream_position()? - start;
        out.write_all(sections.heap.as_bytes())?;
        let end = out.stream_position()?;

        let header = Header {
            config,
            module_table_offset,
            global_table_offset,
            heap_offset,
        };
        out.seek(SeekFrom::Start(start))?;
        out.write_all(&header.encode()?)?;
        out.seek(SeekFrom::Start(end))?;
        out.flush()?;

        let summary = SaveSummary {
            modules: sections.module_table.len(),
            declarations: sections.declarations,
            global_table_capacity: sections.global_table.len(),
            heap_size: sections.heap.len(),
            file_size: end - start,
        };
        log::info!(
            "wrote {} declarations from {} modules: {} bytes ({} heap, {} buckets)",
            summary.declarations,
            summary.modules,
            summary.file_size,
            summary.heap_size,
            summary.global_table_capacity
        );
        Ok(summary)
    }

    /// Serialize the container into memory.
    pub fn to_bytes(&self) -> MetaResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.save(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Serialize the container into a file at `path`.
    ///
    /// The container is built in memory and written to a temporary file next
    /// to `path`, which then replaces `path`. A failed save leaves an existing
    /// file untouched.
    pub fn save_to_path(&self, path: &Path) -> MetaResult<SaveSummary> {
        let mut cursor = Cursor::new(Vec::new());
        let summary = self.save(&mut cursor)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut out = tempfile::NamedTempFile::new_in(dir)?;
        out.write_all(cursor.get_ref())?;
        out.flush()?;
        out.persist(path).map_err(|err| err.error)?;
        Ok(summary)
    }
}
