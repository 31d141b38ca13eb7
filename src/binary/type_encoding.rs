//! Binary codec for type expressions.
//!
//! Each node is a one-byte tag followed by a kind-specific payload. Child
//! nodes are written inline, back to back; only names and protocol lists
//! live out of line (as interned strings and pointer arrays):
//!
//! | node                              | payload                                   |
//! |-----------------------------------|-------------------------------------------|
//! | leaves                            | none                                      |
//! | `Pointer`, `IncompleteArray`      | element                                   |
//! | `ConstantArray`, `ExtVector`      | `size:u32`, element                       |
//! | `Block`, `FunctionPointer`        | `count:u8`, return type, parameters       |
//! | `Struct`, `Union`, `Interface`    | `name:ptr`                                |
//! | `Id`, `Class`                     | `protocols:ptr` (array of names, or `0`)  |
//! | `AnonymousStruct/Union`           | `count:u8`, `count` name ptrs, `count` types |
//!
//! A signature is an array count followed by its elements inline.
//!
//! Out-of-line data must not land in the middle of an inline encoding, so
//! encoding runs in two passes: the first writes every string and protocol
//! array the tree needs and records their offsets in depth-first order, the
//! second writes the contiguous node bytes consuming those offsets.

use super::heap::Offset;
use super::reader::Reader;
use super::writer::Writer;
use crate::error::{MetaError, MetaResult};
use crate::meta::{Field, Type};

/// Discriminant byte of an encoded type node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum TypeTag {
    Void = 0,
    Bool,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Char,
    UChar,
    Unichar,
    CString,
    Float,
    Double,
    InterfaceDeclarationReference,
    StructDeclarationReference,
    UnionDeclarationReference,
    Pointer,
    VaList,
    Selector,
    Class,
    Protocol,
    InstanceType,
    Id,
    ConstantArray,
    IncompleteArray,
    FunctionPointer,
    Block,
    AnonymousStruct,
    AnonymousUnion,
    ExtVector,
}

impl TypeTag {
    const ALL: [TypeTag; 33] = [
        TypeTag::Void,
        TypeTag::Bool,
        TypeTag::Short,
        TypeTag::UShort,
        TypeTag::Int,
        TypeTag::UInt,
        TypeTag::Long,
        TypeTag::ULong,
        TypeTag::LongLong,
        TypeTag::ULongLong,
        TypeTag::Char,
        TypeTag::UChar,
        TypeTag::Unichar,
        TypeTag::CString,
        TypeTag::Float,
        TypeTag::Double,
        TypeTag::InterfaceDeclarationReference,
        TypeTag::StructDeclarationReference,
        TypeTag::UnionDeclarationReference,
        TypeTag::Pointer,
        TypeTag::VaList,
        TypeTag::Selector,
        TypeTag::Class,
        TypeTag::Protocol,
        TypeTag::InstanceType,
        TypeTag::Id,
        TypeTag::ConstantArray,
        TypeTag::IncompleteArray,
        TypeTag::FunctionPointer,
        TypeTag::Block,
        TypeTag::AnonymousStruct,
        TypeTag::AnonymousUnion,
        TypeTag::ExtVector,
    ];

    /// Decode a tag byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    /// Tag of a type node.
    pub fn of(ty: &Type) -> Self {
        match ty {
            Type::Void => TypeTag::Void,
            Type::Bool => TypeTag::Bool,
            Type::Short => TypeTag::Short,
            Type::UShort => TypeTag::UShort,
            Type::Int => TypeTag::Int,
            Type::UInt => TypeTag::UInt,
            Type::Long => TypeTag::Long,
            Type::ULong => TypeTag::ULong,
            Type::LongLong => TypeTag::LongLong,
            Type::ULongLong => TypeTag::ULongLong,
            Type::Char => TypeTag::Char,
            Type::UChar => TypeTag::UChar,
            Type::Unichar => TypeTag::Unichar,
            Type::CString => TypeTag::CString,
            Type::Float => TypeTag::Float,
            Type::Double => TypeTag::Double,
            Type::VaList => TypeTag::VaList,
            Type::Selector => TypeTag::Selector,
            Type::InstanceType => TypeTag::InstanceType,
            Type::Protocol => TypeTag::Protocol,
            Type::Class { .. } => TypeTag::Class,
            Type::Id { .. } => TypeTag::Id,
            Type::Pointer { .. } => TypeTag::Pointer,
            Type::ConstantArray { .. } => TypeTag::ConstantArray,
            Type::IncompleteArray { .. } => TypeTag::IncompleteArray,
            Type::ExtVector { .. } => TypeTag::ExtVector,
            Type::Block { .. } => TypeTag::Block,
            Type::FunctionPointer { .. } => TypeTag::FunctionPointer,
            Type::Struct { .. } => TypeTag::StructDeclarationReference,
            Type::Union { .. } => TypeTag::UnionDeclarationReference,
            Type::Interface { .. } => TypeTag::InterfaceDeclarationReference,
            Type::AnonymousStruct { .. } => TypeTag::AnonymousStruct,
            Type::AnonymousUnion { .. } => TypeTag::AnonymousUnion,
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode one type node inline and return its start offset.
pub fn encode(writer: &mut Writer, ty: &Type) -> MetaResult<Offset> {
    let mut refs = Vec::new();
    write_out_of_line(writer, ty, &mut refs)?;
    let start = writer.current_offset();
    let mut refs = refs.into_iter();
    write_inline(writer, ty, &mut refs)?;
    Ok(start)
}

/// Encode `[return, params...]` as an array count followed by each element
/// inline. Returns the offset of the count.
pub fn encode_signature(writer: &mut Writer, signature: &[Type]) -> MetaResult<Offset> {
    let mut refs = Vec::new();
    for ty in signature {
        write_out_of_line(writer, ty, &mut refs)?;
    }
    let start = writer.push_array_count(signature.len())?;
    let mut refs = refs.into_iter();
    for ty in signature {
        write_inline(writer, ty, &mut refs)?;
    }
    Ok(start)
}

fn small_count(len: usize) -> MetaResult<u8> {
    u8::try_from(len).map_err(|_| MetaError::CountOverflow {
        count: len as u64,
        width: 1,
    })
}

fn write_protocol_list(writer: &mut Writer, protocols: &[String]) -> MetaResult<Offset> {
    if protocols.is_empty() {
        return Ok(Offset::NULL);
    }
    let names: Vec<Offset> = protocols.iter().map(|p| writer.push_string(p)).collect();
    writer.push_binary_array(&names)
}

/// First pass: strings and protocol arrays, offsets recorded depth-first in
/// the order [`write_inline`] consumes them.
fn write_out_of_line(writer: &mut Writer, ty: &Type, refs: &mut Vec<Offset>) -> MetaResult<()> {
    match ty {
        Type::Struct { name } | Type::Union { name } | Type::Interface { name } => {
            refs.push(writer.push_string(name));
        }
        Type::Id { protocols } | Type::Class { protocols } => {
            refs.push(write_protocol_list(writer, protocols)?);
        }
        Type::Pointer { pointee } => write_out_of_line(writer, pointee, refs)?,
        Type::ConstantArray { element, .. }
        | Type::IncompleteArray { element }
        | Type::ExtVector { element, .. } => write_out_of_line(writer, element, refs)?,
        Type::Block { signature } | Type::FunctionPointer { signature } => {
            for ty in signature {
                write_out_of_line(writer, ty, refs)?;
            }
        }
        Type::AnonymousStruct { fields } | Type::AnonymousUnion { fields } => {
            for field in fields {
                refs.push(writer.push_string(&field.name));
            }
            for field in fields {
                write_out_of_line(writer, &field.ty, refs)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn next_ref(refs: &mut impl Iterator<Item = Offset>) -> MetaResult<Offset> {
    refs.next().ok_or_else(|| {
        MetaError::InvariantViolation("type encoding consumed more references than it produced".into())
    })
}

/// Second pass: contiguous node bytes.
fn write_inline(
    writer: &mut Writer,
    ty: &Type,
    refs: &mut impl Iterator<Item = Offset>,
) -> MetaResult<()> {
    writer.push_byte(TypeTag::of(ty) as u8);
    match ty {
        Type::Struct { .. } | Type::Union { .. } | Type::Interface { .. } => {
            writer.push_pointer(next_ref(refs)?)?;
        }
        Type::Id { .. } | Type::Class { .. } => {
            writer.push_pointer(next_ref(refs)?)?;
        }
        Type::Pointer { pointee } => write_inline(writer, pointee, refs)?,
        Type::IncompleteArray { element } => write_inline(writer, element, refs)?,
        Type::ConstantArray { element, size } | Type::ExtVector { element, size } => {
            writer.push_int(*size);
            write_inline(writer, element, refs)?;
        }
        Type::Block { signature } | Type::FunctionPointer { signature } => {
            writer.push_byte(small_count(signature.len())?);
            for ty in signature {
                write_inline(writer, ty, refs)?;
            }
        }
        Type::AnonymousStruct { fields } | Type::AnonymousUnion { fields } => {
            writer.push_byte(small_count(fields.len())?);
            for _ in fields {
                writer.push_pointer(next_ref(refs)?)?;
            }
            for field in fields {
                write_inline(writer, &field.ty, refs)?;
            }
        }
        _ => {}
    }
    Ok(())
}

// ============================================================================
// Decoding
// ============================================================================

/// Deepest type nesting the decoder accepts.
pub const MAX_TYPE_DEPTH: usize = 256;

/// Decode the node at `at`. Returns the type and the offset just past it.
pub fn decode(reader: &Reader<'_>, at: Offset) -> MetaResult<(Type, Offset)> {
    decode_nested(reader, at, 0)
}

fn decode_nested(reader: &Reader<'_>, at: Offset, depth: usize) -> MetaResult<(Type, Offset)> {
    if depth >= MAX_TYPE_DEPTH {
        return Err(MetaError::decode(at.get(), "type nesting too deep"));
    }
    let byte = reader.read_byte(at)?;
    let tag = TypeTag::from_u8(byte)
        .ok_or_else(|| MetaError::decode(at.get(), format!("unknown type tag {}", byte)))?;
    let mut cursor = reader.advance(at, 1);

    let ty = match tag {
        TypeTag::Void => Type::Void,
        TypeTag::Bool => Type::Bool,
        TypeTag::Short => Type::Short,
        TypeTag::UShort => Type::UShort,
        TypeTag::Int => Type::Int,
        TypeTag::UInt => Type::UInt,
        TypeTag::Long => Type::Long,
        TypeTag::ULong => Type::ULong,
        TypeTag::LongLong => Type::LongLong,
        TypeTag::ULongLong => Type::ULongLong,
        TypeTag::Char => Type::Char,
        TypeTag::UChar => Type::UChar,
        TypeTag::Unichar => Type::Unichar,
        TypeTag::CString => Type::CString,
        TypeTag::Float => Type::Float,
        TypeTag::Double => Type::Double,
        TypeTag::VaList => Type::VaList,
        TypeTag::Selector => Type::Selector,
        TypeTag::InstanceType => Type::InstanceType,
        TypeTag::Protocol => Type::Protocol,
        TypeTag::InterfaceDeclarationReference
        | TypeTag::StructDeclarationReference
        | TypeTag::UnionDeclarationReference => {
            let name = reader.read_string(reader.read_pointer(cursor)?)?.to_string();
            cursor = reader.after_pointer(cursor);
            match tag {
                TypeTag::InterfaceDeclarationReference => Type::Interface { name },
                TypeTag::StructDeclarationReference => Type::Struct { name },
                _ => Type::Union { name },
            }
        }
        TypeTag::Id | TypeTag::Class => {
            let list = reader.read_optional_array(reader.read_pointer(cursor)?)?;
            cursor = reader.after_pointer(cursor);
            let protocols = list
                .into_iter()
                .map(|p| reader.read_string(p).map(str::to_string))
                .collect::<MetaResult<Vec<_>>>()?;
            if tag == TypeTag::Id {
                Type::Id { protocols }
            } else {
                Type::Class { protocols }
            }
        }
        TypeTag::Pointer => {
            let (pointee, next) = decode_nested(reader, cursor, depth + 1)?;
            cursor = next;
            Type::pointer(pointee)
        }
        TypeTag::IncompleteArray => {
            let (element, next) = decode_nested(reader, cursor, depth + 1)?;
            cursor = next;
            Type::incomplete_array(element)
        }
        TypeTag::ConstantArray | TypeTag::ExtVector => {
            let size = reader.read_int(cursor)?;
            let (element, next) = decode_nested(reader, reader.advance(cursor, 4), depth + 1)?;
            cursor = next;
            let element = Box::new(element);
            if tag == TypeTag::ConstantArray {
                Type::ConstantArray { element, size }
            } else {
                Type::ExtVector { element, size }
            }
        }
        TypeTag::Block | TypeTag::FunctionPointer => {
            let count = reader.read_byte(cursor)?;
            cursor = reader.advance(cursor, 1);
            let mut signature = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                let (ty, next) = decode_nested(reader, cursor, depth + 1)?;
                signature.push(ty);
                cursor = next;
            }
            if tag == TypeTag::Block {
                Type::Block { signature }
            } else {
                Type::FunctionPointer { signature }
            }
        }
        TypeTag::AnonymousStruct | TypeTag::AnonymousUnion => {
            let count = reader.read_byte(cursor)?;
            cursor = reader.advance(cursor, 1);
            let mut names = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                names.push(reader.read_string(reader.read_pointer(cursor)?)?.to_string());
                cursor = reader.after_pointer(cursor);
            }
            let mut fields = Vec::with_capacity(names.len());
            for name in names {
                let (ty, next) = decode_nested(reader, cursor, depth + 1)?;
                fields.push(Field { name, ty });
                cursor = next;
            }
            if tag == TypeTag::AnonymousStruct {
                Type::AnonymousStruct { fields }
            } else {
                Type::AnonymousUnion { fields }
            }
        }
    };
    Ok((ty, cursor))
}

/// Decode a signature written by [`encode_signature`].
pub fn decode_signature(reader: &Reader<'_>, at: Offset) -> MetaResult<Vec<Type>> {
    let count = reader.read_array_count(at)?;
    let mut cursor = reader.advance(at, u64::from(reader.config().array_count_size));
    let mut out = Vec::with_capacity(count.min(reader.bytes().len()));
    for _ in 0..count {
        let (ty, next) = decode(reader, cursor)?;
        out.push(ty);
        cursor = next;
    }
    Ok(out)
}
