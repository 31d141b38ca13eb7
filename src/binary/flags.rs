//! Packed flag bytes.
//!
//! Bits are reused across unrelated kinds; a decoder always knows which kind
//! it is reading, so the meaning of each bit is unambiguous. Application code
//! works with the per-kind bool structs from [`crate::meta`] and with
//! [`DecodedFlags`]; raw bits only exist at the serialization boundary.
//!
//! ```text
//! bit  top-level              method                     property
//!  7   HasName                HasName                    HasName
//!  6   IosAppExtAvailable     IosAppExtAvailable         IosAppExtAvailable
//!  5   FunctionIsVariadic     MethodHasErrorOutParam
//!  4   FunctionOwnsReturned   MethodOwnsReturned
//!  3   FunctionRetUnmanaged   MethodNullTermVariadic     PropertyHasSetter
//!  2   ┐                      MethodIsVariadic           PropertyHasGetter
//!  1   ├ kind tag             MethodIsInitializer
//!  0   ┘                      MemberIsOptional           MemberIsOptional
//! ```

use serde::Serialize;

use crate::meta::{FunctionFlags, MetaInfo, MethodFlags};

/// Public and internal names differ.
pub const HAS_NAME: u8 = 1 << 7;
/// Usable from iOS app extensions.
pub const IS_IOS_APP_EXTENSION_AVAILABLE: u8 = 1 << 6;

/// Function takes variable arguments.
pub const FUNCTION_IS_VARIADIC: u8 = 1 << 5;
/// Caller owns the returned object.
pub const FUNCTION_OWNS_RETURNED_COCOA_OBJECT: u8 = 1 << 4;
/// Returned object is unmanaged.
pub const FUNCTION_RETURNS_UNMANAGED: u8 = 1 << 3;

/// Optional protocol member. Shared by methods and properties.
pub const MEMBER_IS_OPTIONAL: u8 = 1 << 0;
/// Method is an initializer.
pub const METHOD_IS_INITIALIZER: u8 = 1 << 1;
/// Method takes variable arguments.
pub const METHOD_IS_VARIADIC: u8 = 1 << 2;
/// Variable argument list is nil-terminated.
pub const METHOD_IS_NULL_TERMINATED_VARIADIC: u8 = 1 << 3;
/// Caller owns the returned object.
pub const METHOD_OWNS_RETURNED_COCOA_OBJECT: u8 = 1 << 4;
/// Last parameter is an `NSError **`.
pub const METHOD_HAS_ERROR_OUT_PARAMETER: u8 = 1 << 5;

/// Property has a getter record.
pub const PROPERTY_HAS_GETTER: u8 = 1 << 2;
/// Property has a setter record.
pub const PROPERTY_HAS_SETTER: u8 = 1 << 3;

/// Mask of the kind tag in top-level flags.
pub const KIND_MASK: u8 = 0b111;

/// Kind tag of a top-level record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum DeclTag {
    /// Not a declaration.
    Undefined = 0,
    /// Named struct.
    Struct = 1,
    /// Named union.
    Union = 2,
    /// C function.
    Function = 3,
    /// Opaque code.
    JsCode = 4,
    /// Global variable.
    Var = 5,
    /// Objective-C class.
    Interface = 6,
    /// Objective-C protocol.
    Protocol = 7,
}

impl DeclTag {
    /// Decode the kind tag from a top-level flags byte.
    pub fn from_flags(flags: u8) -> Self {
        match flags & KIND_MASK {
            1 => DeclTag::Struct,
            2 => DeclTag::Union,
            3 => DeclTag::Function,
            4 => DeclTag::JsCode,
            5 => DeclTag::Var,
            6 => DeclTag::Interface,
            7 => DeclTag::Protocol,
            _ => DeclTag::Undefined,
        }
    }
}

fn bit(set: bool, mask: u8) -> u8 {
    if set { mask } else { 0 }
}

fn common(info: &MetaInfo) -> u8 {
    bit(info.has_distinct_public_name(), HAS_NAME)
        | bit(info.ios_app_extension_available, IS_IOS_APP_EXTENSION_AVAILABLE)
}

/// Flags byte of a top-level record without kind-specific bits.
pub fn pack_declaration(info: &MetaInfo, tag: DeclTag) -> u8 {
    common(info) | tag as u8
}

/// Flags byte of a function record.
pub fn pack_function(info: &MetaInfo, flags: &FunctionFlags) -> u8 {
    pack_declaration(info, DeclTag::Function)
        | bit(flags.variadic, FUNCTION_IS_VARIADIC)
        | bit(flags.owns_returned_cocoa_object, FUNCTION_OWNS_RETURNED_COCOA_OBJECT)
        | bit(flags.returns_unmanaged, FUNCTION_RETURNS_UNMANAGED)
}

/// Flags byte of a method record.
pub fn pack_method(info: &MetaInfo, flags: &MethodFlags) -> u8 {
    common(info)
        | bit(flags.optional, MEMBER_IS_OPTIONAL)
        | bit(flags.initializer, METHOD_IS_INITIALIZER)
        | bit(flags.variadic, METHOD_IS_VARIADIC)
        | bit(flags.null_terminated_variadic, METHOD_IS_NULL_TERMINATED_VARIADIC)
        | bit(flags.owns_returned_cocoa_object, METHOD_OWNS_RETURNED_COCOA_OBJECT)
        | bit(flags.has_error_out_parameter, METHOD_HAS_ERROR_OUT_PARAMETER)
}

/// Flags byte of a property record.
pub fn pack_property(info: &MetaInfo, optional: bool, has_getter: bool, has_setter: bool) -> u8 {
    common(info)
        | bit(optional, MEMBER_IS_OPTIONAL)
        | bit(has_getter, PROPERTY_HAS_GETTER)
        | bit(has_setter, PROPERTY_HAS_SETTER)
}

/// Which kind of record a flags byte belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagsContext {
    /// Top-level declaration record.
    Declaration,
    /// Method record.
    Method,
    /// Property record.
    Property,
}

/// Unpacked view of a flags byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodedFlags {
    /// Public and internal names differ.
    pub has_name: bool,
    /// Usable from iOS app extensions.
    pub ios_app_extension_available: bool,
    /// Function flags, for function records.
    pub function: Option<FunctionFlags>,
    /// Method flags, for method records.
    pub method: Option<MethodFlags>,
    /// Optional protocol member, for properties.
    pub property_optional: bool,
    /// Property has a getter.
    pub property_has_getter: bool,
    /// Property has a setter.
    pub property_has_setter: bool,
}

/// Unpack `byte` read from a record of kind `context`.
pub fn unpack(byte: u8, context: FlagsContext) -> DecodedFlags {
    let mut out = DecodedFlags {
        has_name: byte & HAS_NAME != 0,
        ios_app_extension_available: byte & IS_IOS_APP_EXTENSION_AVAILABLE != 0,
        ..DecodedFlags::default()
    };
    match context {
        FlagsContext::Declaration => {
            if DeclTag::from_flags(byte) == DeclTag::Function {
                out.function = Some(FunctionFlags {
                    variadic: byte & FUNCTION_IS_VARIADIC != 0,
                    owns_returned_cocoa_object: byte & FUNCTION_OWNS_RETURNED_COCOA_OBJECT != 0,
                    returns_unmanaged: byte & FUNCTION_RETURNS_UNMANAGED != 0,
                });
            }
        }
        FlagsContext::Method => {
            out.method = Some(MethodFlags {
                optional: byte & MEMBER_IS_OPTIONAL != 0,
                initializer: byte & METHOD_IS_INITIALIZER != 0,
                variadic: byte & METHOD_IS_VARIADIC != 0,
                null_terminated_variadic: byte & METHOD_IS_NULL_TERMINATED_VARIADIC != 0,
                owns_returned_cocoa_object: byte & METHOD_OWNS_RETURNED_COCOA_OBJECT != 0,
                has_error_out_parameter: byte & METHOD_HAS_ERROR_OUT_PARAMETER != 0,
            });
        }
        FlagsContext::Property => {
            out.property_optional = byte & MEMBER_IS_OPTIONAL != 0;
            out.property_has_getter = byte & PROPERTY_HAS_GETTER != 0;
            out.property_has_setter = byte & PROPERTY_HAS_SETTER != 0;
        }
    }
    out
}
