//! In-memory declaration forest.
//!
//! This is the hand-off point from the front end (header parsing, category
//! merging, duplicate-member pruning) to the binary serializer. Everything
//! here is already resolved: public names are chosen, categories are merged
//! into their interfaces and every type tree is complete.
//!
//! Declarations live in an [`Arena`] and modules refer to them by
//! [`DeclId`], so the serializer walks the forest by shared reference only.
//!
//! ```rust
//! use objc_metadata::meta::{DeclKind, Declaration, Forest, FunctionFlags, MetaInfo};
//! use objc_metadata::meta::Type;
//!
//! let mut forest = Forest::new();
//! let foundation = forest.add_module("Foundation");
//! forest.add_declaration(
//!     foundation,
//!     Declaration::new(
//!         MetaInfo::new("NSLog"),
//!         DeclKind::Function {
//!             signature: vec![Type::Void, Type::id()],
//!             flags: FunctionFlags { variadic: true, ..Default::default() },
//!         },
//!     ),
//! );
//! assert_eq!(forest.declaration_count(), 1);
//! ```

mod type_expr;

use serde::{Deserialize, Serialize};

use crate::arena::{Arena, ArenaIdx};

pub use type_expr::{Field, Type};

// ============================================================================
// Version
// ============================================================================

/// Availability version. A negative component means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Major component, `-1` if unknown.
    pub major: i32,
    /// Minor component, `-1` if unknown.
    #[serde(default = "unknown_component")]
    pub minor: i32,
    /// Sub-minor component, `-1` if unknown.
    #[serde(default = "unknown_component")]
    pub sub_minor: i32,
}

fn unknown_component() -> i32 {
    -1
}

impl Default for Version {
    fn default() -> Self {
        Version::UNKNOWN
    }
}

impl Version {
    /// The fully unknown version.
    pub const UNKNOWN: Version = Version {
        major: -1,
        minor: -1,
        sub_minor: -1,
    };

    /// Create a version from its three components.
    pub const fn new(major: i32, minor: i32, sub_minor: i32) -> Self {
        Self {
            major,
            minor,
            sub_minor,
        }
    }

    /// Whether the major component is known.
    pub fn is_known(&self) -> bool {
        self.major >= 0
    }
}

// ============================================================================
// Common metadata
// ============================================================================

/// Fields shared by every declaration and member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInfo {
    /// Internal name (C identifier or Objective-C selector).
    pub name: String,
    /// Name exposed to the consuming runtime, when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_name: Option<String>,
    /// Version the declaration was introduced in.
    #[serde(default)]
    pub introduced: Version,
    /// Whether the declaration may be used from iOS app extensions.
    #[serde(default)]
    pub ios_app_extension_available: bool,
}

impl MetaInfo {
    /// Metadata with identical public and internal names.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public_name: None,
            introduced: Version::UNKNOWN,
            ios_app_extension_available: false,
        }
    }

    /// Set a distinct public name.
    pub fn with_public_name(mut self, public_name: impl Into<String>) -> Self {
        self.public_name = Some(public_name.into());
        self
    }

    /// Set the introduced version.
    pub fn introduced_in(mut self, version: Version) -> Self {
        self.introduced = version;
        self
    }

    /// Mark the declaration available to iOS app extensions.
    pub fn app_extension_available(mut self) -> Self {
        self.ios_app_extension_available = true;
        self
    }

    /// The public name, falling back to the internal name.
    pub fn public_name(&self) -> &str {
        self.public_name.as_deref().unwrap_or(&self.name)
    }

    /// Whether the public name differs from the internal name.
    pub fn has_distinct_public_name(&self) -> bool {
        self.public_name() != self.name
    }
}

// ============================================================================
// Members
// ============================================================================

/// Method-specific boolean flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodFlags {
    /// `@optional` protocol member.
    pub optional: bool,
    /// Method is an initializer.
    pub initializer: bool,
    /// Method takes variable arguments.
    pub variadic: bool,
    /// Variable argument list is `nil`-terminated.
    pub null_terminated_variadic: bool,
    /// Caller owns the returned object (`NS_RETURNS_RETAINED`).
    pub owns_returned_cocoa_object: bool,
    /// Last parameter is an `NSError **` out parameter.
    pub has_error_out_parameter: bool,
}

/// An Objective-C method. `name` is the selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    /// Selector and public name.
    pub info: MetaInfo,
    /// Method flags.
    #[serde(default)]
    pub flags: MethodFlags,
    /// `[return, params...]`.
    pub signature: Vec<Type>,
    /// The compiler's `@encode` string, kept for diagnostics.
    #[serde(default)]
    pub type_encoding: String,
}

impl Method {
    /// Create a method with default flags and no `@encode` string.
    pub fn new(info: MetaInfo, signature: Vec<Type>) -> Self {
        Self {
            info,
            flags: MethodFlags::default(),
            signature,
            type_encoding: String::new(),
        }
    }

    /// Whether the selector belongs to the `init` family.
    pub fn is_init_selector(&self) -> bool {
        self.info.name.starts_with("init")
    }
}

/// An Objective-C property with optional accessor methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name and public name.
    pub info: MetaInfo,
    /// `@optional` protocol member.
    #[serde(default)]
    pub optional: bool,
    /// Getter method.
    #[serde(default)]
    pub getter: Option<Method>,
    /// Setter method.
    #[serde(default)]
    pub setter: Option<Method>,
}

/// Members shared by interfaces, protocols and categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseClass {
    /// Instance methods.
    pub instance_methods: Vec<Method>,
    /// Class methods.
    pub static_methods: Vec<Method>,
    /// Properties.
    pub properties: Vec<Property>,
    /// Adopted protocol names.
    pub protocols: Vec<String>,
}

// ============================================================================
// Declarations
// ============================================================================

/// Function-specific boolean flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionFlags {
    /// Function takes variable arguments.
    pub variadic: bool,
    /// Caller owns the returned object (`CF_RETURNS_RETAINED`).
    pub owns_returned_cocoa_object: bool,
    /// Returned object is unmanaged.
    pub returns_unmanaged: bool,
}

/// Kind-specific payload of a top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DeclKind {
    /// A C function.
    Function {
        /// `[return, params...]`.
        signature: Vec<Type>,
        /// Function flags.
        #[serde(default)]
        flags: FunctionFlags,
    },
    /// A named struct.
    Struct {
        /// Fields in declaration order.
        fields: Vec<Field>,
    },
    /// A named union.
    Union {
        /// Fields in declaration order.
        fields: Vec<Field>,
    },
    /// Opaque code for values the type system cannot express.
    JsCode {
        /// The code blob.
        code: String,
    },
    /// A global variable or constant.
    Var {
        /// Variable type.
        #[serde(rename = "varType")]
        ty: Type,
    },
    /// An Objective-C class.
    Interface {
        /// Superclass name.
        #[serde(default)]
        base_name: Option<String>,
        /// Members.
        #[serde(default)]
        class: BaseClass,
    },
    /// An Objective-C protocol.
    Protocol {
        /// Members.
        #[serde(default)]
        class: BaseClass,
    },
    /// A category. Must be merged into `extended_interface` before
    /// serialization.
    Category {
        /// Interface the category extends.
        extended_interface: String,
        /// Members.
        #[serde(default)]
        class: BaseClass,
    },
}

impl DeclKind {
    /// Human-readable kind name, used in logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            DeclKind::Function { .. } => "function",
            DeclKind::Struct { .. } => "struct",
            DeclKind::Union { .. } => "union",
            DeclKind::JsCode { .. } => "jsCode",
            DeclKind::Var { .. } => "var",
            DeclKind::Interface { .. } => "interface",
            DeclKind::Protocol { .. } => "protocol",
            DeclKind::Category { .. } => "category",
        }
    }
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    /// Names, availability and common flags.
    pub info: MetaInfo,
    /// Kind-specific payload.
    pub decl: DeclKind,
}

impl Declaration {
    /// Create a declaration.
    pub fn new(info: MetaInfo, decl: DeclKind) -> Self {
        Self { info, decl }
    }
}

// ============================================================================
// Forest
// ============================================================================

/// Typed index of a declaration in a [`Forest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclId(u32);

impl ArenaIdx for DeclId {
    fn from_u32(idx: u32) -> Self {
        DeclId(idx)
    }
    fn to_u32(self) -> u32 {
        self.0
    }
}

/// A (sub)module and the declarations it owns, in collection order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Full module name, e.g. `Foundation.NSString`.
    pub name: String,
    /// Declarations in collection order.
    #[serde(default)]
    pub declarations: Vec<DeclId>,
}

impl Module {
    /// Name of the top-level module: everything before the first `.`.
    pub fn top_level_name(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }
}

/// The complete declaration forest handed to the serializer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Forest {
    /// All declarations.
    pub declarations: Arena<Declaration, DeclId>,
    /// Modules in a stable order.
    pub modules: Vec<Module>,
}

impl Forest {
    /// Create an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module and return its position.
    pub fn add_module(&mut self, name: impl Into<String>) -> usize {
        self.modules.push(Module {
            name: name.into(),
            declarations: Vec::new(),
        });
        self.modules.len() - 1
    }

    /// Add a declaration to the module at `module`.
    ///
    /// # Panics
    ///
    /// Panics if `module` is not a position returned by [`Forest::add_module`].
    pub fn add_declaration(&mut self, module: usize, declaration: Declaration) -> DeclId {
        let id = self.declarations.push(declaration);
        self.modules[module].declarations.push(id);
        id
    }

    /// Number of declarations referenced by modules.
    pub fn declaration_count(&self) -> usize {
        self.modules.iter().map(|m| m.declarations.len()).sum()
    }

    /// Look up a declaration.
    pub fn get(&self, id: DeclId) -> Option<&Declaration> {
        self.declarations.try_get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_name_fallback() {
        let info = MetaInfo::new("initWithFrame:");
        assert_eq!(info.public_name(), "initWithFrame:");
        assert!(!info.has_distinct_public_name());

        let info = info.with_public_name("initWithFrame");
        assert_eq!(info.public_name(), "initWithFrame");
        assert!(info.has_distinct_public_name());
    }

    #[test]
    fn test_top_level_module_name() {
        let module = Module {
            name: "Foundation.NSString".to_string(),
            declarations: Vec::new(),
        };
        assert_eq!(module.top_level_name(), "Foundation");
    }

    #[test]
    fn test_forest_from_json() {
        let json = r#"{
            "declarations": [
                {
                    "info": { "name": "foo", "introduced": { "major": 2, "minor": 0 } },
                    "decl": { "type": "function", "signature": [{ "kind": "void" }] }
                }
            ],
            "modules": [{ "name": "Foundation.foo", "declarations": [0] }]
        }"#;
        let forest: Forest = serde_json::from_str(json).unwrap();
        let decl = forest.get(DeclId(0)).unwrap();
        assert_eq!(decl.info.introduced, Version::new(2, 0, -1));
        assert_eq!(decl.decl.kind_name(), "function");
        assert_eq!(forest.declaration_count(), 1);
    }
}
