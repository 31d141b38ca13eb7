//! Read-side view of a container.
//!
//! The loader parses the header and the two tables eagerly and decodes
//! records lazily. Name lookup follows the same path a runtime consumer
//! takes: hash the name, pick the bucket, then dereference every candidate
//! record and compare its public name.

use serde::Serialize;

use super::flags::{self, DeclTag, DecodedFlags, FlagsContext};
use super::hash_index::bucket_for;
use super::heap::Offset;
use super::meta_file::Header;
use super::reader::Reader;
use super::serializer::decode_version;
use super::type_encoding::{decode, decode_signature};
use crate::config::FormatConfig;
use crate::error::{MetaError, MetaResult};
use crate::meta::{Field, Type, Version};

/// Fixed part shared by every record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordBase {
    /// Name the record is registered under.
    pub public_name: String,
    /// Internal (C / Objective-C) name.
    pub name: String,
    /// Raw flags byte.
    pub raw_flags: u8,
    /// Index into the module table.
    pub module_index: u16,
    /// Introduction version, major and minor only.
    pub introduced: Version,
}

/// A decoded method record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMethod {
    /// Names, flags and version.
    #[serde(flatten)]
    pub base: RecordBase,
    /// Unpacked method flags.
    pub flags: DecodedFlags,
    /// Return type followed by parameter types.
    pub signature: Vec<Type>,
    /// Objective-C runtime encoding, when present.
    pub type_encoding: Option<String>,
}

/// A decoded property record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedProperty {
    /// Names, flags and version.
    #[serde(flatten)]
    pub base: RecordBase,
    /// Unpacked property flags.
    pub flags: DecodedFlags,
    /// Getter record.
    pub getter: Option<DecodedMethod>,
    /// Setter record.
    pub setter: Option<DecodedMethod>,
}

/// Members of an interface or protocol record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecodedClass {
    /// Instance methods sorted by public name.
    pub instance_methods: Vec<DecodedMethod>,
    /// Class methods sorted by public name.
    pub static_methods: Vec<DecodedMethod>,
    /// Properties sorted by public name.
    pub properties: Vec<DecodedProperty>,
    /// Adopted protocol names, sorted.
    pub protocols: Vec<String>,
    /// Index of the first `init*` instance method, `-1` if none.
    pub first_initializer_index: i16,
}

/// Kind-specific part of a decoded top-level record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum DecodedKind {
    Function { signature: Vec<Type> },
    Struct { fields: Vec<Field> },
    Union { fields: Vec<Field> },
    JsCode { code: String },
    Var {
        #[serde(rename = "varType")]
        ty: Type,
    },
    Interface {
        base_name: Option<String>,
        #[serde(flatten)]
        class: DecodedClass,
    },
    Protocol {
        #[serde(flatten)]
        class: DecodedClass,
    },
}

/// A decoded top-level record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedDeclaration {
    /// Heap offset of the record.
    pub offset: Offset,
    /// Names, flags and version.
    #[serde(flatten)]
    pub base: RecordBase,
    /// Owning top-level module.
    pub module: String,
    /// Unpacked flags.
    pub flags: DecodedFlags,
    /// Kind payload.
    #[serde(flatten)]
    pub kind: DecodedKind,
}

impl DecodedDeclaration {
    /// Every type expression in the record, members included.
    pub fn types(&self) -> Vec<&Type> {
        fn method_types<'t>(method: &'t DecodedMethod, out: &mut Vec<&'t Type>) {
            out.extend(method.signature.iter());
        }
        let mut out = Vec::new();
        match &self.kind {
            DecodedKind::Function { signature } => out.extend(signature.iter()),
            DecodedKind::Struct { fields } | DecodedKind::Union { fields } => {
                out.extend(fields.iter().map(|f| &f.ty))
            }
            DecodedKind::JsCode { .. } => {}
            DecodedKind::Var { ty } => out.push(ty),
            DecodedKind::Interface { class, .. } | DecodedKind::Protocol { class } => {
                for method in class.instance_methods.iter().chain(&class.static_methods) {
                    method_types(method, &mut out);
                }
                for property in &class.properties {
                    for accessor in property.getter.iter().chain(&property.setter) {
                        method_types(accessor, &mut out);
                    }
                }
            }
        }
        out
    }
}

/// Parsed container.
#[derive(Debug, Clone)]
pub struct MetaFileReader<'a> {
    header: Header,
    heap: Reader<'a>,
    module_names: Vec<&'a str>,
    global_slots: Vec<Offset>,
}

impl<'a> MetaFileReader<'a> {
    /// Parse the header and tables of `bytes`.
    pub fn parse(bytes: &'a [u8]) -> MetaResult<Self> {
        if bytes.len() < 2 {
            return Err(MetaError::decode(0, "file too short for a header"));
        }
        let config = FormatConfig::new(bytes[0], bytes[1]);
        let file = Reader::new(bytes, config)?;

        let mut cursor = Offset::new(2);
        let module_table_offset = file.read_pointer(cursor)?;
        cursor = file.after_pointer(cursor);
        let global_table_offset = file.read_pointer(cursor)?;
        cursor = file.after_pointer(cursor);
        let heap_offset = file.read_pointer(cursor)?;

        let heap_start = usize::try_from(heap_offset.get())
            .ok()
            .filter(|&start| start < bytes.len())
            .ok_or_else(|| MetaError::decode(heap_offset.get(), "heap offset past end of file"))?;
        let heap = Reader::new(&bytes[heap_start..], config)?;

        let module_names = file
            .read_binary_array(module_table_offset)?
            .into_iter()
            .map(|name| heap.read_string(name))
            .collect::<MetaResult<Vec<_>>>()?;
        let global_slots = file.read_binary_array(global_table_offset)?;

        log::debug!(
            "loaded container: {} modules, {} buckets, {} heap bytes",
            module_names.len(),
            global_slots.len(),
            heap.bytes().len()
        );
        Ok(Self {
            header: Header {
                config,
                module_table_offset: module_table_offset.get(),
                global_table_offset: global_table_offset.get(),
                heap_offset: heap_offset.get(),
            },
            heap,
            module_names,
            global_slots,
        })
    }

    /// The parsed header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Widths the file was written with.
    pub fn config(&self) -> FormatConfig {
        self.header.config
    }

    /// Top-level module names in table order.
    pub fn module_names(&self) -> &[&'a str] {
        &self.module_names
    }

    /// Bucket count of the global table.
    pub fn global_table_capacity(&self) -> usize {
        self.global_slots.len()
    }

    /// Heap-relative offsets of every registered record, bucket by bucket.
    pub fn declaration_offsets(&self) -> MetaResult<Vec<Offset>> {
        let mut out = Vec::new();
        for slot in &self.global_slots {
            out.extend(self.heap.read_optional_array(*slot)?);
        }
        Ok(out)
    }

    /// Offset of the record registered under `name`, if any.
    pub fn lookup(&self, name: &str) -> MetaResult<Option<Offset>> {
        if self.global_slots.is_empty() {
            return Ok(None);
        }
        let slot = self.global_slots[bucket_for(name, self.global_slots.len())];
        for candidate in self.heap.read_optional_array(slot)? {
            let (public_name, _) = self.read_names(candidate)?;
            if public_name == name {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Like [`lookup`](Self::lookup), but a missing name is an error.
    pub fn resolve(&self, name: &str) -> MetaResult<Offset> {
        self.lookup(name)?
            .ok_or_else(|| MetaError::UnresolvedDeclarationReference(name.to_string()))
    }

    /// Look up and decode the record registered under `name`.
    pub fn find(&self, name: &str) -> MetaResult<Option<DecodedDeclaration>> {
        match self.lookup(name)? {
            Some(offset) => self.declaration(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Check that every struct, union and interface name referenced from a
    /// type expression resolves through the global table.
    pub fn verify_references(&self) -> MetaResult<()> {
        for offset in self.declaration_offsets()? {
            let decl = self.declaration(offset)?;
            for ty in decl.types() {
                for name in ty.referenced_names() {
                    self.resolve(name)?;
                }
            }
        }
        Ok(())
    }

    // ========== Records ==========

    fn read_names(&self, record: Offset) -> MetaResult<(&'a str, &'a str)> {
        let names = self.heap.read_pointer(record)?;
        let raw_flags = self.heap.read_byte(self.heap.after_pointer(record))?;
        if raw_flags & flags::HAS_NAME == 0 {
            let name = self.heap.read_string(names)?;
            return Ok((name, name));
        }
        let public_name = self.heap.read_string(self.heap.read_pointer(names)?)?;
        let name = self
            .heap
            .read_string(self.heap.read_pointer(self.heap.after_pointer(names))?)?;
        Ok((public_name, name))
    }

    /// Decode the base fields and return the position just past them.
    fn read_base(&self, record: Offset) -> MetaResult<(RecordBase, Offset)> {
        let (public_name, name) = self.read_names(record)?;
        let at = self.heap.after_pointer(record);
        let raw_flags = self.heap.read_byte(at)?;
        let module_index = self.heap.read_short(self.heap.advance(at, 1))?;
        let introduced = decode_version(self.heap.read_byte(self.heap.advance(at, 3))?);
        Ok((
            RecordBase {
                public_name: public_name.to_string(),
                name: name.to_string(),
                raw_flags,
                module_index,
                introduced,
            },
            self.heap.advance(at, 4),
        ))
    }

    fn read_fields(&self, at: Offset) -> MetaResult<Vec<Field>> {
        let names_at = self.heap.read_pointer(at)?;
        let types_at = self.heap.read_pointer(self.heap.after_pointer(at))?;
        let names = self.heap.read_optional_array(names_at)?;
        let types = match types_at.non_null() {
            Some(types_at) => decode_signature(&self.heap, types_at)?,
            None => Vec::new(),
        };
        if names.len() != types.len() {
            return Err(MetaError::decode(
                at.get(),
                format!("{} field names but {} field types", names.len(), types.len()),
            ));
        }
        names
            .into_iter()
            .zip(types)
            .map(|(name, ty)| Ok(Field::new(self.heap.read_string(name)?, ty)))
            .collect()
    }

    fn read_class(&self, mut at: Offset) -> MetaResult<(DecodedClass, Offset)> {
        let mut next = || {
            let ptr = self.heap.read_pointer(at);
            at = self.heap.after_pointer(at);
            ptr
        };
        let instance = next()?;
        let statics = next()?;
        let properties = next()?;
        let protocols = next()?;

        let class = DecodedClass {
            instance_methods: self.read_methods(instance)?,
            static_methods: self.read_methods(statics)?,
            properties: self
                .heap
                .read_optional_array(properties)?
                .into_iter()
                .map(|p| self.property(p))
                .collect::<MetaResult<_>>()?,
            protocols: self
                .heap
                .read_optional_array(protocols)?
                .into_iter()
                .map(|p| self.heap.read_string(p).map(str::to_string))
                .collect::<MetaResult<_>>()?,
            first_initializer_index: self.heap.read_signed_short(at)?,
        };
        Ok((class, self.heap.advance(at, 2)))
    }

    fn read_methods(&self, array: Offset) -> MetaResult<Vec<DecodedMethod>> {
        self.heap
            .read_optional_array(array)?
            .into_iter()
            .map(|m| self.method(m))
            .collect()
    }

    /// Decode the method record at `record`.
    pub fn method(&self, record: Offset) -> MetaResult<DecodedMethod> {
        let (base, at) = self.read_base(record)?;
        let signature = decode_signature(&self.heap, self.heap.read_pointer(at)?)?;
        let type_encoding = self
            .heap
            .read_optional_string(self.heap.read_pointer(self.heap.after_pointer(at))?)?
            .map(str::to_string);
        Ok(DecodedMethod {
            flags: flags::unpack(base.raw_flags, FlagsContext::Method),
            base,
            signature,
            type_encoding,
        })
    }

    /// Decode the property record at `record`.
    pub fn property(&self, record: Offset) -> MetaResult<DecodedProperty> {
        let (base, at) = self.read_base(record)?;
        let getter = self.heap.read_pointer(at)?;
        let setter = self.heap.read_pointer(self.heap.after_pointer(at))?;
        Ok(DecodedProperty {
            flags: flags::unpack(base.raw_flags, FlagsContext::Property),
            base,
            getter: getter.non_null().map(|m| self.method(m)).transpose()?,
            setter: setter.non_null().map(|m| self.method(m)).transpose()?,
        })
    }

    /// Decode the top-level record at `record`.
    pub fn declaration(&self, record: Offset) -> MetaResult<DecodedDeclaration> {
        let (base, at) = self.read_base(record)?;
        let module = self
            .module_names
            .get(usize::from(base.module_index))
            .ok_or_else(|| {
                MetaError::decode(record.get(), format!("module index {} out of range", base.module_index))
            })?
            .to_string();

        let kind = match DeclTag::from_flags(base.raw_flags) {
            DeclTag::Function => DecodedKind::Function {
                signature: decode_signature(&self.heap, self.heap.read_pointer(at)?)?,
            },
            DeclTag::Var => DecodedKind::Var {
                ty: decode(&self.heap, self.heap.read_pointer(at)?)?.0,
            },
            DeclTag::JsCode => DecodedKind::JsCode {
                code: self.heap.read_string(self.heap.read_pointer(at)?)?.to_string(),
            },
            DeclTag::Struct => DecodedKind::Struct {
                fields: self.read_fields(at)?,
            },
            DeclTag::Union => DecodedKind::Union {
                fields: self.read_fields(at)?,
            },
            DeclTag::Protocol => DecodedKind::Protocol {
                class: self.read_class(at)?.0,
            },
            DeclTag::Interface => {
                let (class, at) = self.read_class(at)?;
                let base_name = self
                    .heap
                    .read_optional_string(self.heap.read_pointer(at)?)?
                    .map(str::to_string);
                DecodedKind::Interface { base_name, class }
            }
            DeclTag::Undefined => {
                return Err(MetaError::decode(record.get(), "record has no kind tag"));
            }
        };

        Ok(DecodedDeclaration {
            offset: record,
            flags: flags::unpack(base.raw_flags, FlagsContext::Declaration),
            base,
            module,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::meta_file::MetaFile;
    use crate::binary::type_encoding::TypeTag;
    use crate::meta::{
        BaseClass, DeclKind, Declaration, Forest, FunctionFlags, MetaInfo, Method, MethodFlags,
        Property,
    };

    fn foo_forest() -> Forest {
        let mut forest = Forest::new();
        let module = forest.add_module("Foundation.foo");
        forest.add_declaration(
            module,
            Declaration::new(
                MetaInfo::new("foo")
                    .introduced_in(Version::new(2, 0, -1))
                    .app_extension_available(),
                DeclKind::Function {
                    signature: vec![Type::Void, Type::Int, Type::Int],
                    flags: FunctionFlags::default(),
                },
            ),
        );
        forest
    }

    #[test]
    fn test_single_function_end_to_end() {
        let forest = foo_forest();
        let bytes = MetaFile::new(&forest, FormatConfig::new(4, 1)).to_bytes().unwrap();
        let file = MetaFileReader::parse(&bytes).unwrap();
        let heap = &bytes[file.header().heap_offset as usize..];

        // Module names are interned before any record.
        assert_eq!(&heap[..12], b"\0Foundation\0");
        assert_eq!(&heap[12..16], b"foo\0");
        assert_eq!(
            &heap[16..20],
            &[3, TypeTag::Void as u8, TypeTag::Int as u8, TypeTag::Int as u8]
        );
        // Record: names, flags, module, version, signature.
        assert_eq!(&heap[20..24], &12u32.to_le_bytes());
        assert_eq!(
            heap[24],
            flags::IS_IOS_APP_EXTENSION_AVAILABLE | DeclTag::Function as u8
        );
        assert_eq!(&heap[25..27], &[0, 0]);
        assert_eq!(heap[27], 16);
        assert_eq!(&heap[28..32], &16u32.to_le_bytes());

        assert_eq!(file.module_names(), &["Foundation"]);
        assert_eq!(file.lookup("foo").unwrap(), Some(Offset::new(20)));

        let decl = file.find("foo").unwrap().unwrap();
        assert_eq!(decl.module, "Foundation");
        assert_eq!(decl.base.introduced, Version::new(2, 0, -1));
        assert!(decl.flags.ios_app_extension_available);
        assert_eq!(decl.flags.function, Some(FunctionFlags::default()));
        assert_eq!(
            decl.kind,
            DecodedKind::Function {
                signature: vec![Type::Void, Type::Int, Type::Int]
            }
        );
    }

    #[test]
    fn test_missing_name() {
        let forest = foo_forest();
        let bytes = MetaFile::new(&forest, FormatConfig::default()).to_bytes().unwrap();
        let file = MetaFileReader::parse(&bytes).unwrap();
        assert_eq!(file.lookup("bar").unwrap(), None);
        assert!(matches!(
            file.resolve("bar"),
            Err(MetaError::UnresolvedDeclarationReference(name)) if name == "bar"
        ));
    }

    #[test]
    fn test_lookup_through_collisions() {
        let mut forest = Forest::new();
        let module = forest.add_module("Lots");
        for i in 0..200 {
            forest.add_declaration(
                module,
                Declaration::new(MetaInfo::new(format!("sym{}", i)), DeclKind::Var { ty: Type::Int }),
            );
        }
        let bytes = MetaFile::new(&forest, FormatConfig::default()).to_bytes().unwrap();
        let file = MetaFileReader::parse(&bytes).unwrap();
        assert_eq!(file.global_table_capacity(), 263);
        assert_eq!(file.declaration_offsets().unwrap().len(), 200);
        for i in 0..200 {
            let name = format!("sym{}", i);
            let decl = file.find(&name).unwrap().unwrap();
            assert_eq!(decl.base.public_name, name);
        }
    }

    #[test]
    fn test_interface_with_members() {
        let mut forest = Forest::new();
        let module = forest.add_module("UIKit.UIView");

        let mut getter = Method::new(MetaInfo::new("frame"), vec![Type::struct_ref("CGRect")]);
        getter.type_encoding = "{CGRect=dddd}16@0:8".into();
        let class = BaseClass {
            instance_methods: vec![
                Method::new(MetaInfo::new("layoutSubviews"), vec![Type::Void]),
                Method {
                    flags: MethodFlags {
                        initializer: true,
                        ..MethodFlags::default()
                    },
                    ..Method::new(
                        MetaInfo::new("initWithFrame:"),
                        vec![Type::InstanceType, Type::struct_ref("CGRect")],
                    )
                },
            ],
            static_methods: Vec::new(),
            properties: vec![Property {
                info: MetaInfo::new("frame"),
                optional: false,
                getter: Some(getter),
                setter: None,
            }],
            protocols: vec!["NSCoding".into(), "NSCoding2".into()],
        };
        forest.add_declaration(
            module,
            Declaration::new(
                MetaInfo::new("UIView"),
                DeclKind::Interface {
                    base_name: Some("UIResponder".into()),
                    class,
                },
            ),
        );
        forest.add_declaration(
            module,
            Declaration::new(
                MetaInfo::new("CGRect"),
                DeclKind::Struct {
                    fields: vec![
                        Field::new("origin", Type::struct_ref("CGPoint")),
                        Field::new("size", Type::struct_ref("CGSize")),
                    ],
                },
            ),
        );

        let bytes = MetaFile::new(&forest, FormatConfig::new(4, 2)).to_bytes().unwrap();
        let file = MetaFileReader::parse(&bytes).unwrap();
        assert_eq!(file.module_names(), &["UIKit"]);

        let view = file.find("UIView").unwrap().unwrap();
        let DecodedKind::Interface { base_name, class } = &view.kind else {
            panic!("expected interface, got {:?}", view.kind);
        };
        assert_eq!(base_name.as_deref(), Some("UIResponder"));
        let selectors: Vec<&str> = class
            .instance_methods
            .iter()
            .map(|m| m.base.public_name.as_str())
            .collect();
        assert_eq!(selectors, vec!["initWithFrame:", "layoutSubviews"]);
        assert_eq!(class.first_initializer_index, 0);
        assert!(class.static_methods.is_empty());
        assert_eq!(class.protocols, vec!["NSCoding", "NSCoding2"]);

        let frame = &class.properties[0];
        assert!(frame.flags.property_has_getter);
        assert!(!frame.flags.property_has_setter);
        assert!(frame.setter.is_none());
        let getter = frame.getter.as_ref().unwrap();
        assert_eq!(getter.type_encoding.as_deref(), Some("{CGRect=dddd}16@0:8"));

        let rect = file.find("CGRect").unwrap().unwrap();
        let DecodedKind::Struct { fields } = &rect.kind else {
            panic!("expected struct");
        };
        assert_eq!(fields[1], Field::new("size", Type::struct_ref("CGSize")));

        // CGPoint and CGSize were never registered.
        assert!(matches!(
            file.verify_references(),
            Err(MetaError::UnresolvedDeclarationReference(_))
        ));
    }

    #[test]
    fn test_deeply_nested_type_fails_to_decode() {
        let mut ty = Type::Int;
        for _ in 0..crate::binary::type_encoding::MAX_TYPE_DEPTH {
            ty = Type::pointer(ty);
        }
        let mut forest = Forest::new();
        let module = forest.add_module("Deep");
        forest.add_declaration(module, Declaration::new(MetaInfo::new("deep"), DeclKind::Var { ty }));

        let bytes = MetaFile::new(&forest, FormatConfig::default()).to_bytes().unwrap();
        let file = MetaFileReader::parse(&bytes).unwrap();
        assert!(file.lookup("deep").unwrap().is_some());
        assert!(matches!(file.find("deep"), Err(MetaError::Decode { .. })));
    }

    #[test]
    fn test_truncated_file() {
        let forest = foo_forest();
        let bytes = MetaFile::new(&forest, FormatConfig::default()).to_bytes().unwrap();
        assert!(matches!(
            MetaFileReader::parse(&bytes[..8]),
            Err(MetaError::Decode { .. })
        ));
        assert!(MetaFileReader::parse(&[]).is_err());
    }
}
