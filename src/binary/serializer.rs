//! Declaration serializer.
//!
//! Lays every declaration of the forest out as a fixed-shape record in the
//! heap. Variable-length data (names, signatures, member arrays) is written
//! first; the record itself follows as one contiguous block of pointers and
//! small integers. Every top-level record is registered in the global table
//! under its public name once it is complete.
//!
//! # Record layout
//!
//! ```text
//! base          names:ptr  flags:u8  module:u16  introduced:u8
//! Function      base  signature:ptr
//! Var           base  type:ptr
//! JsCode        base  code:ptr
//! Struct/Union  base  field_names:ptr  field_types:ptr
//! Protocol      base  instance_methods:ptr  static_methods:ptr
//!                     properties:ptr  protocols:ptr  first_initializer:i16
//! Interface     <protocol layout>  base_name:ptr
//! Method        base  signature:ptr  type_encoding:ptr
//! Property      base  getter:ptr  setter:ptr
//! ```
//!
//! `names` points either at the single interned name, or (when the `HasName`
//! flag is set) at a pair of pointers `[public_name, internal_name]`.

use super::flags::{self, DeclTag};
use super::hash_index::HashIndex;
use super::heap::Offset;
use super::type_encoding::{encode, encode_signature};
use super::writer::Writer;
use crate::error::{MetaError, MetaResult};
use crate::meta::{BaseClass, DeclKind, Declaration, Field, MetaInfo, Method, Property, Version};

/// Largest major version the version byte can hold.
const MAX_ENCODED_MAJOR: i32 = 31;

/// Pack a version into one byte: `0` when unknown, otherwise
/// `major << 3 | minor & 7`. Sub-minor is dropped and major saturates at 31.
pub fn encode_version(version: Version) -> u8 {
    if version.major < 0 {
        return 0;
    }
    let major = (version.major.min(MAX_ENCODED_MAJOR) as u8) << 3;
    if version.minor < 0 {
        major
    } else {
        major | (version.minor as u8 & 0x7)
    }
}

/// Unpack a version byte. Minor reads as `0` when it was unknown.
pub fn decode_version(byte: u8) -> Version {
    if byte == 0 {
        Version::UNKNOWN
    } else {
        Version::new(i32::from(byte >> 3), i32::from(byte & 0x7), -1)
    }
}

/// Index of the first `init*` selector in `methods`, `-1` if none.
///
/// `methods` must already be sorted by public name.
pub fn first_initializer_index(methods: &[&Method]) -> MetaResult<i16> {
    let Some(first) = methods.iter().position(|m| m.is_init_selector()) else {
        return Ok(-1);
    };
    let run = methods[first..]
        .iter()
        .take_while(|m| m.is_init_selector())
        .count();
    let total = methods.iter().filter(|m| m.is_init_selector()).count();
    if run != total {
        log::warn!(
            "initializers are not contiguous after sorting ({} of {} in the first run)",
            run,
            total
        );
    }
    i16::try_from(first).map_err(|_| MetaError::CountOverflow {
        count: first as u64,
        width: 2,
    })
}

fn sorted_by_public_name<'m, T>(items: &'m [T], info: impl Fn(&T) -> &MetaInfo) -> Vec<&'m T> {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by(|a, b| info(*a).public_name().cmp(info(*b).public_name()));
    sorted
}

/// Writes declaration records into a [`Writer`] and registers top-level
/// records in the global [`HashIndex`].
pub struct DeclarationSerializer<'a> {
    writer: &'a mut Writer,
    global_table: &'a mut HashIndex,
}

impl<'a> DeclarationSerializer<'a> {
    /// Create a serializer over `writer`, registering into `global_table`.
    pub fn new(writer: &'a mut Writer, global_table: &'a mut HashIndex) -> Self {
        Self {
            writer,
            global_table,
        }
    }

    /// Serialize one top-level declaration owned by module `module` and
    /// register it. Returns the record offset.
    ///
    /// Categories are rejected without writing anything.
    pub fn serialize(&mut self, decl: &Declaration, module: u16) -> MetaResult<Offset> {
        let info = &decl.info;
        if let DeclKind::Category {
            extended_interface, ..
        } = &decl.decl
        {
            return Err(MetaError::InvariantViolation(format!(
                "category `{}` on `{}` must be merged before serialization",
                info.name, extended_interface
            )));
        }

        let names = self.write_names(info)?;
        let record = match &decl.decl {
            DeclKind::Function { signature, flags } => {
                let signature = encode_signature(self.writer, signature)?;
                let record = self.write_base(names, flags::pack_function(info, flags), module, info)?;
                self.writer.push_pointer(signature)?;
                record
            }
            DeclKind::Var { ty } => {
                let ty = encode(self.writer, ty)?;
                let record = self.write_tagged_base(names, DeclTag::Var, module, info)?;
                self.writer.push_pointer(ty)?;
                record
            }
            DeclKind::JsCode { code } => {
                let code = self.writer.push_string(code);
                let record = self.write_tagged_base(names, DeclTag::JsCode, module, info)?;
                self.writer.push_pointer(code)?;
                record
            }
            DeclKind::Struct { fields } => self.write_record(names, DeclTag::Struct, fields, module, info)?,
            DeclKind::Union { fields } => self.write_record(names, DeclTag::Union, fields, module, info)?,
            DeclKind::Protocol { class } => {
                let members = self.write_members(class, module)?;
                let record = self.write_tagged_base(names, DeclTag::Protocol, module, info)?;
                self.write_member_fields(&members)?;
                record
            }
            DeclKind::Interface { base_name, class } => {
                let members = self.write_members(class, module)?;
                let base_name = match base_name.as_deref() {
                    Some(name) if !name.is_empty() => self.writer.push_string(name),
                    _ => Offset::NULL,
                };
                let record = self.write_tagged_base(names, DeclTag::Interface, module, info)?;
                self.write_member_fields(&members)?;
                self.writer.push_pointer(base_name)?;
                record
            }
            DeclKind::Category { .. } => unreachable!("categories are rejected above"),
        };

        self.global_table.add(info.public_name(), record);
        log::debug!(
            "serialized {} `{}` at {}",
            decl.decl.kind_name(),
            info.public_name(),
            record
        );
        Ok(record)
    }

    // ========== Shared pieces ==========

    fn write_names(&mut self, info: &MetaInfo) -> MetaResult<Offset> {
        if !info.has_distinct_public_name() {
            return Ok(self.writer.push_string(&info.name));
        }
        let public_name = self.writer.push_string(info.public_name());
        let name = self.writer.push_string(&info.name);
        let pair = self.writer.push_pointer(public_name)?;
        self.writer.push_pointer(name)?;
        Ok(pair)
    }

    fn write_base(&mut self, names: Offset, flags: u8, module: u16, info: &MetaInfo) -> MetaResult<Offset> {
        let record = self.writer.push_pointer(names)?;
        self.writer.push_byte(flags);
        self.writer.push_short(module);
        self.writer.push_byte(encode_version(info.introduced));
        Ok(record)
    }

    fn write_tagged_base(
        &mut self,
        names: Offset,
        tag: DeclTag,
        module: u16,
        info: &MetaInfo,
    ) -> MetaResult<Offset> {
        self.write_base(names, flags::pack_declaration(info, tag), module, info)
    }

    fn write_optional_array(&mut self, offsets: &[Offset]) -> MetaResult<Offset> {
        if offsets.is_empty() {
            Ok(Offset::NULL)
        } else {
            self.writer.push_binary_array(offsets)
        }
    }

    // ========== Struct / Union ==========

    fn write_record(
        &mut self,
        names: Offset,
        tag: DeclTag,
        fields: &[Field],
        module: u16,
        info: &MetaInfo,
    ) -> MetaResult<Offset> {
        let (field_names, field_types) = if fields.is_empty() {
            (Offset::NULL, Offset::NULL)
        } else {
            let name_offsets: Vec<Offset> = fields.iter().map(|f| self.writer.push_string(&f.name)).collect();
            let field_names = self.writer.push_binary_array(&name_offsets)?;
            let types: Vec<_> = fields.iter().map(|f| f.ty.clone()).collect();
            (field_names, encode_signature(self.writer, &types)?)
        };
        let record = self.write_tagged_base(names, tag, module, info)?;
        self.writer.push_pointer(field_names)?;
        self.writer.push_pointer(field_types)?;
        Ok(record)
    }

    // ========== Interface / Protocol ==========

    fn write_members(&mut self, class: &BaseClass, module: u16) -> MetaResult<MemberOffsets> {
        let instance = sorted_by_public_name(&class.instance_methods, |m| &m.info);
        let first_initializer = first_initializer_index(&instance)?;
        let mut instance_offsets = Vec::with_capacity(instance.len());
        for method in &instance {
            instance_offsets.push(self.serialize_method(method, module)?);
        }

        let statics = sorted_by_public_name(&class.static_methods, |m| &m.info);
        let mut static_offsets = Vec::with_capacity(statics.len());
        for method in &statics {
            static_offsets.push(self.serialize_method(method, module)?);
        }

        let properties = sorted_by_public_name(&class.properties, |p| &p.info);
        let mut property_offsets = Vec::with_capacity(properties.len());
        for property in &properties {
            property_offsets.push(self.serialize_property(property, module)?);
        }

        let mut protocols: Vec<&str> = class.protocols.iter().map(String::as_str).collect();
        protocols.sort_unstable();
        let protocol_names: Vec<Offset> = protocols.iter().map(|p| self.writer.push_string(p)).collect();

        Ok(MemberOffsets {
            instance_methods: self.write_optional_array(&instance_offsets)?,
            static_methods: self.write_optional_array(&static_offsets)?,
            properties: self.write_optional_array(&property_offsets)?,
            protocols: self.write_optional_array(&protocol_names)?,
            first_initializer,
        })
    }

    fn write_member_fields(&mut self, members: &MemberOffsets) -> MetaResult<()> {
        self.writer.push_pointer(members.instance_methods)?;
        self.writer.push_pointer(members.static_methods)?;
        self.writer.push_pointer(members.properties)?;
        self.writer.push_pointer(members.protocols)?;
        self.writer.push_signed_short(members.first_initializer);
        Ok(())
    }

    /// Serialize a method record. Methods are not registered globally.
    pub fn serialize_method(&mut self, method: &Method, module: u16) -> MetaResult<Offset> {
        let names = self.write_names(&method.info)?;
        let signature = encode_signature(self.writer, &method.signature)?;
        let type_encoding = if method.type_encoding.is_empty() {
            Offset::NULL
        } else {
            self.writer.push_string(&method.type_encoding)
        };
        let record = self.write_base(
            names,
            flags::pack_method(&method.info, &method.flags),
            module,
            &method.info,
        )?;
        self.writer.push_pointer(signature)?;
        self.writer.push_pointer(type_encoding)?;
        Ok(record)
    }

    /// Serialize a property record with its accessor method records.
    pub fn serialize_property(&mut self, property: &Property, module: u16) -> MetaResult<Offset> {
        let names = self.write_names(&property.info)?;
        let getter = match &property.getter {
            Some(getter) => self.serialize_method(getter, module)?,
            None => Offset::NULL,
        };
        let setter = match &property.setter {
            Some(setter) => self.serialize_method(setter, module)?,
            None => Offset::NULL,
        };
        let record = self.write_base(
            names,
            flags::pack_property(
                &property.info,
                property.optional,
                property.getter.is_some(),
                property.setter.is_some(),
            ),
            module,
            &property.info,
        )?;
        self.writer.push_pointer(getter)?;
        self.writer.push_pointer(setter)?;
        Ok(record)
    }
}

struct MemberOffsets {
    instance_methods: Offset,
    static_methods: Offset,
    properties: Offset,
    protocols: Offset,
    first_initializer: i16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::reader::Reader;
    use crate::binary::type_encoding::TypeTag;
    use crate::config::FormatConfig;
    use crate::meta::{FunctionFlags, Type};

    fn method(selector: &str) -> Method {
        Method::new(MetaInfo::new(selector), vec![Type::Void])
    }

    #[test]
    fn test_version_byte() {
        assert_eq!(encode_version(Version::new(-1, -1, -1)), 0);
        assert_eq!(encode_version(Version::new(8, 0, -1)), 64);
        assert_eq!(encode_version(Version::new(8, 1, -1)), 65);
        assert_eq!(encode_version(Version::new(8, 1, 3)), 65);
        assert_eq!(encode_version(Version::new(2, -1, -1)), 16);
        assert_eq!(encode_version(Version::new(40, 2, -1)), (31 << 3) | 2);
    }

    #[test]
    fn test_version_decode() {
        assert_eq!(decode_version(0), Version::UNKNOWN);
        assert_eq!(decode_version(65), Version::new(8, 1, -1));
    }

    #[test]
    fn test_first_initializer_index() {
        let methods = [method("alloc"), method("init"), method("initWithCoder:"), method("zone")];
        let refs: Vec<&Method> = methods.iter().collect();
        assert_eq!(first_initializer_index(&refs).unwrap(), 1);

        let none = [method("copy")];
        let refs: Vec<&Method> = none.iter().collect();
        assert_eq!(first_initializer_index(&refs).unwrap(), -1);
    }

    #[test]
    fn test_function_record_layout() {
        let config = FormatConfig::new(2, 1);
        let mut writer = Writer::new(config).unwrap();
        let mut table = HashIndex::new(1);
        let decl = Declaration::new(
            MetaInfo::new("foo").introduced_in(Version::new(2, 0, -1)),
            DeclKind::Function {
                signature: vec![Type::Void, Type::Int],
                flags: FunctionFlags::default(),
            },
        );

        let record = DeclarationSerializer::new(&mut writer, &mut table)
            .serialize(&decl, 3)
            .unwrap();
        assert_eq!(table.get("foo"), Some(record));

        // "foo\0" at 1, signature at 5: count, Void, Int; record at 8.
        let bytes = writer.heap().as_bytes();
        assert_eq!(record.get(), 8);
        assert_eq!(&bytes[5..8], &[2, TypeTag::Void as u8, TypeTag::Int as u8]);
        assert_eq!(&bytes[8..], &[1, 0, DeclTag::Function as u8, 3, 0, 2 << 3 | 0, 5, 0]);
    }

    #[test]
    fn test_distinct_names_use_pair() {
        let config = FormatConfig::default();
        let mut writer = Writer::new(config).unwrap();
        let mut table = HashIndex::new(1);
        let decl = Declaration::new(
            MetaInfo::new("kCFNull").with_public_name("kCFNullValue"),
            DeclKind::Var { ty: Type::id() },
        );
        let record = DeclarationSerializer::new(&mut writer, &mut table)
            .serialize(&decl, 0)
            .unwrap();
        assert_eq!(table.get("kCFNullValue"), Some(record));
        assert_eq!(table.get("kCFNull"), None);

        let heap = writer.into_heap();
        let reader = Reader::new(heap.as_bytes(), config).unwrap();
        let pair = reader.read_pointer(record).unwrap();
        let public_name = reader.read_pointer(pair).unwrap();
        let name = reader.read_pointer(reader.after_pointer(pair)).unwrap();
        assert_eq!(reader.read_string(public_name).unwrap(), "kCFNullValue");
        assert_eq!(reader.read_string(name).unwrap(), "kCFNull");
        let flags = reader.read_byte(reader.after_pointer(record)).unwrap();
        assert_eq!(flags & flags::HAS_NAME, flags::HAS_NAME);
    }

    #[test]
    fn test_category_is_rejected_without_writing() {
        let mut writer = Writer::new(FormatConfig::default()).unwrap();
        let mut table = HashIndex::new(1);
        let decl = Declaration::new(
            MetaInfo::new("NSString(Extras)"),
            DeclKind::Category {
                extended_interface: "NSString".into(),
                class: BaseClass::default(),
            },
        );
        let before = writer.heap().len();
        let err = DeclarationSerializer::new(&mut writer, &mut table)
            .serialize(&decl, 0)
            .unwrap_err();
        assert!(matches!(err, MetaError::InvariantViolation(_)));
        assert_eq!(writer.heap().len(), before);
        assert!(table.is_empty());
    }

    #[test]
    fn test_getter_only_property() {
        let config = FormatConfig::default();
        let mut writer = Writer::new(config).unwrap();
        let mut table = HashIndex::new(1);
        let property = Property {
            info: MetaInfo::new("frame"),
            optional: false,
            getter: Some(Method::new(MetaInfo::new("frame"), vec![Type::struct_ref("CGRect")])),
            setter: None,
        };
        let record = DeclarationSerializer::new(&mut writer, &mut table)
            .serialize_property(&property, 0)
            .unwrap();

        let heap = writer.into_heap();
        let reader = Reader::new(heap.as_bytes(), config).unwrap();
        let flags_at = reader.after_pointer(record);
        let flags = reader.read_byte(flags_at).unwrap();
        assert_eq!(flags & flags::PROPERTY_HAS_GETTER, flags::PROPERTY_HAS_GETTER);
        assert_eq!(flags & flags::PROPERTY_HAS_SETTER, 0);

        let getter_at = reader.advance(flags_at, 4);
        assert!(!reader.read_pointer(getter_at).unwrap().is_null());
        let setter_at = reader.after_pointer(getter_at);
        assert!(reader.read_pointer(setter_at).unwrap().is_null());
    }

    #[test]
    fn test_members_sorted_by_public_name() {
        let config = FormatConfig::default();
        let mut writer = Writer::new(config).unwrap();
        let mut table = HashIndex::new(1);
        let decl = Declaration::new(
            MetaInfo::new("NSView"),
            DeclKind::Interface {
                base_name: Some("NSResponder".into()),
                class: BaseClass {
                    instance_methods: vec![method("setNeedsDisplay"), method("initWithFrame:"), method("display")],
                    static_methods: Vec::new(),
                    properties: Vec::new(),
                    protocols: vec!["NSCoding".into(), "NSAccessibility".into()],
                },
            },
        );
        let record = DeclarationSerializer::new(&mut writer, &mut table)
            .serialize(&decl, 0)
            .unwrap();

        let heap = writer.into_heap();
        let reader = Reader::new(heap.as_bytes(), config).unwrap();
        let fields = reader.advance(reader.after_pointer(record), 4);
        let instance = reader.read_binary_array(reader.read_pointer(fields).unwrap()).unwrap();
        let selectors: Vec<&str> = instance
            .iter()
            .map(|&m| reader.read_string(reader.read_pointer(m).unwrap()).unwrap())
            .collect();
        assert_eq!(selectors, vec!["display", "initWithFrame:", "setNeedsDisplay"]);

        let statics_at = reader.after_pointer(fields);
        assert!(reader.read_pointer(statics_at).unwrap().is_null());

        let protocols_at = reader.after_pointer(reader.after_pointer(statics_at));
        let protocols = reader.read_binary_array(reader.read_pointer(protocols_at).unwrap()).unwrap();
        let protocols: Vec<&str> = protocols.iter().map(|&p| reader.read_string(p).unwrap()).collect();
        assert_eq!(protocols, vec!["NSAccessibility", "NSCoding"]);

        let init_at = reader.after_pointer(protocols_at);
        assert_eq!(reader.read_signed_short(init_at).unwrap(), 1);
        let base_at = reader.advance(init_at, 2);
        let base = reader.read_pointer(base_at).unwrap();
        assert_eq!(reader.read_string(base).unwrap(), "NSResponder");
    }
}
