//! C / Objective-C type expressions.
//!
//! A [`Type`] is a fully resolved tree: references to named structs, unions
//! and interfaces are kept by name and resolved by the loader through the
//! global table, never by address.

use serde::{Deserialize, Serialize};

/// A C / Objective-C type expression.
///
/// For `Block` and `FunctionPointer` the signature is
/// `[return_type, param_type...]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum Type {
    Void,
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
    VaList,
    Selector,
    InstanceType,
    /// `Protocol *`
    Protocol,
    /// `Class`, optionally qualified by protocols.
    Class {
        #[serde(default)]
        protocols: Vec<String>,
    },
    /// `id`, optionally qualified by protocols.
    Id {
        #[serde(default)]
        protocols: Vec<String>,
    },
    Pointer {
        pointee: Box<Type>,
    },
    ConstantArray {
        element: Box<Type>,
        size: u32,
    },
    IncompleteArray {
        element: Box<Type>,
    },
    ExtVector {
        element: Box<Type>,
        size: u32,
    },
    Block {
        signature: Vec<Type>,
    },
    FunctionPointer {
        signature: Vec<Type>,
    },
    Struct {
        name: String,
    },
    Union {
        name: String,
    },
    /// A pointer to an instance of a named interface.
    Interface {
        name: String,
    },
    AnonymousStruct {
        fields: Vec<Field>,
    },
    AnonymousUnion {
        fields: Vec<Field>,
    },
}

/// A named member of a struct or union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Field type.
    #[serde(rename = "type")]
    pub ty: Type,
}

impl Field {
    /// Create a field.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl Type {
    /// `T *`
    pub fn pointer(pointee: Type) -> Self {
        Type::Pointer {
            pointee: Box::new(pointee),
        }
    }

    /// `T[size]`
    pub fn constant_array(element: Type, size: u32) -> Self {
        Type::ConstantArray {
            element: Box::new(element),
            size,
        }
    }

    /// `T[]`
    pub fn incomplete_array(element: Type) -> Self {
        Type::IncompleteArray {
            element: Box::new(element),
        }
    }

    /// Block with `[return, params...]`.
    pub fn block(signature: Vec<Type>) -> Self {
        Type::Block { signature }
    }

    /// Function pointer with `[return, params...]`.
    pub fn function_pointer(signature: Vec<Type>) -> Self {
        Type::FunctionPointer { signature }
    }

    /// Plain `id`.
    pub fn id() -> Self {
        Type::Id {
            protocols: Vec::new(),
        }
    }

    /// Reference to a named struct.
    pub fn struct_ref(name: impl Into<String>) -> Self {
        Type::Struct { name: name.into() }
    }

    /// Reference to a named interface.
    pub fn interface(name: impl Into<String>) -> Self {
        Type::Interface { name: name.into() }
    }

    /// Names of declarations this type refers to, in depth-first order.
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Type::Struct { name } | Type::Union { name } | Type::Interface { name } => {
                out.push(name)
            }
            Type::Pointer { pointee } => pointee.collect_references(out),
            Type::ConstantArray { element, .. }
            | Type::IncompleteArray { element }
            | Type::ExtVector { element, .. } => element.collect_references(out),
            Type::Block { signature } | Type::FunctionPointer { signature } => {
                for ty in signature {
                    ty.collect_references(out);
                }
            }
            Type::AnonymousStruct { fields } | Type::AnonymousUnion { fields } => {
                for field in fields {
                    field.ty.collect_references(out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let ty = Type::pointer(Type::struct_ref("CGRect"));
        let json = serde_json::to_string(&ty).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"pointer","pointee":{"kind":"struct","name":"CGRect"}}"#
        );
        let back: Type = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ty);
    }

    #[test]
    fn test_id_protocols_default_empty() {
        let ty: Type = serde_json::from_str(r#"{"kind":"id"}"#).unwrap();
        assert_eq!(ty, Type::id());
    }

    #[test]
    fn test_referenced_names() {
        let ty = Type::block(vec![
            Type::Void,
            Type::interface("NSError"),
            Type::AnonymousStruct {
                fields: vec![Field::new("origin", Type::struct_ref("CGPoint"))],
            },
        ]);
        assert_eq!(ty.referenced_names(), vec!["NSError", "CGPoint"]);
    }
}
