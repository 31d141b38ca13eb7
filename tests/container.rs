//! End-to-end tests: JSON forest in, container on disk, loader back out.

use std::fs;

use objc_metadata::binary::{DecodedKind, MetaFile, MetaFileReader};
use objc_metadata::meta::{DeclKind, Declaration, Forest, MetaInfo, Type, Version};
use objc_metadata::{FormatConfig, MetaError};

const UIKIT_FOREST: &str = r#"{
    "declarations": [
        {
            "info": { "name": "CGPoint" },
            "decl": {
                "type": "struct",
                "fields": [
                    { "name": "x", "type": { "kind": "double" } },
                    { "name": "y", "type": { "kind": "double" } }
                ]
            }
        },
        {
            "info": {
                "name": "UIView",
                "introduced": { "major": 2, "minor": 0 },
                "ios_app_extension_available": true
            },
            "decl": {
                "type": "interface",
                "base_name": "UIResponder",
                "class": {
                    "instance_methods": [
                        {
                            "info": { "name": "initWithFrame:" },
                            "flags": { "initializer": true },
                            "signature": [
                                { "kind": "instanceType" },
                                { "kind": "struct", "name": "CGPoint" }
                            ]
                        },
                        {
                            "info": { "name": "center" },
                            "signature": [{ "kind": "struct", "name": "CGPoint" }],
                            "type_encoding": "{CGPoint=dd}16@0:8"
                        }
                    ],
                    "properties": [
                        {
                            "info": { "name": "center" },
                            "getter": {
                                "info": { "name": "center" },
                                "signature": [{ "kind": "struct", "name": "CGPoint" }]
                            }
                        }
                    ],
                    "protocols": ["NSCoding"]
                }
            }
        },
        {
            "info": { "name": "NSCoding" },
            "decl": { "type": "protocol" }
        },
        {
            "info": { "name": "UIApplicationMain", "public_name": "UIApplicationMainFn" },
            "decl": {
                "type": "function",
                "signature": [
                    { "kind": "int" },
                    { "kind": "int" },
                    { "kind": "pointer", "pointee": { "kind": "cString" } },
                    { "kind": "interface", "name": "UIView" }
                ]
            }
        }
    ],
    "modules": [
        { "name": "CoreGraphics.CGGeometry", "declarations": [0] },
        { "name": "UIKit.UIView", "declarations": [1] },
        { "name": "Foundation.NSObject", "declarations": [2] },
        { "name": "UIKit.UIApplication", "declarations": [3] }
    ]
}"#;

fn uikit_forest() -> Forest {
    serde_json::from_str(UIKIT_FOREST).unwrap()
}

#[test]
fn test_save_to_path_and_load() {
    let forest = uikit_forest();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.bin");

    let summary = MetaFile::new(&forest, FormatConfig::default())
        .save_to_path(&path)
        .unwrap();
    assert_eq!(summary.declarations, 4);
    assert_eq!(summary.modules, 3);

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len() as u64, summary.file_size);

    let file = MetaFileReader::parse(&bytes).unwrap();
    assert_eq!(file.module_names(), &["CoreGraphics", "UIKit", "Foundation"]);
    file.verify_references().unwrap();

    let view = file.find("UIView").unwrap().unwrap();
    assert_eq!(view.module, "UIKit");
    assert_eq!(view.base.introduced, Version::new(2, 0, -1));
    assert!(view.flags.ios_app_extension_available);
    let DecodedKind::Interface { base_name, class } = &view.kind else {
        panic!("expected interface, got {:?}", view.kind);
    };
    assert_eq!(base_name.as_deref(), Some("UIResponder"));
    assert_eq!(class.instance_methods[0].base.public_name, "center");
    assert_eq!(class.first_initializer_index, 1);
    assert_eq!(class.protocols, vec!["NSCoding"]);

    let center = &class.properties[0];
    assert!(center.flags.property_has_getter);
    assert!(!center.flags.property_has_setter);
    assert!(center.setter.is_none());
    assert_eq!(
        center.getter.as_ref().unwrap().signature,
        vec![Type::struct_ref("CGPoint")]
    );
}

#[test]
fn test_public_name_is_the_lookup_key() {
    let forest = uikit_forest();
    let bytes = MetaFile::new(&forest, FormatConfig::default()).to_bytes().unwrap();
    let file = MetaFileReader::parse(&bytes).unwrap();

    assert_eq!(file.lookup("UIApplicationMain").unwrap(), None);
    let main = file.find("UIApplicationMainFn").unwrap().unwrap();
    assert_eq!(main.base.name, "UIApplicationMain");
    assert!(main.flags.has_name);
    let DecodedKind::Function { signature } = &main.kind else {
        panic!("expected function");
    };
    assert_eq!(signature[2], Type::pointer(Type::CString));
    assert_eq!(signature[3], Type::interface("UIView"));
}

#[test]
fn test_empty_protocol_has_null_members() {
    let forest = uikit_forest();
    let bytes = MetaFile::new(&forest, FormatConfig::new(2, 1)).to_bytes().unwrap();
    let file = MetaFileReader::parse(&bytes).unwrap();
    let coding = file.find("NSCoding").unwrap().unwrap();
    let DecodedKind::Protocol { class } = &coding.kind else {
        panic!("expected protocol");
    };
    assert!(class.instance_methods.is_empty());
    assert!(class.properties.is_empty());
    assert_eq!(class.first_initializer_index, -1);
}

#[test]
fn test_output_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.bin");
    let second = dir.path().join("b.bin");
    MetaFile::new(&uikit_forest(), FormatConfig::default())
        .save_to_path(&first)
        .unwrap();
    MetaFile::new(&uikit_forest(), FormatConfig::default())
        .save_to_path(&second)
        .unwrap();
    assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
}

#[test]
fn test_all_widths_load_back() {
    let forest = uikit_forest();
    for (pointer_size, array_count_size) in [(2, 1), (3, 2), (4, 4), (8, 8)] {
        let config = FormatConfig::new(pointer_size, array_count_size);
        let bytes = MetaFile::new(&forest, config).to_bytes().unwrap();
        assert_eq!(&bytes[..2], &[pointer_size, array_count_size]);

        let file = MetaFileReader::parse(&bytes).unwrap();
        assert_eq!(file.config(), config);
        let point = file.find("CGPoint").unwrap().unwrap();
        let DecodedKind::Struct { fields } = &point.kind else {
            panic!("expected struct");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].name, "y");
    }
}

#[test]
fn test_two_byte_pointers_overflow() {
    let mut forest = Forest::new();
    let module = forest.add_module("Huge");
    for i in 0..4000 {
        forest.add_declaration(
            module,
            Declaration::new(
                MetaInfo::new(format!("kHugeFrameworkConstantNumber{:05}", i)),
                DeclKind::Var { ty: Type::Int },
            ),
        );
    }
    let err = MetaFile::new(&forest, FormatConfig::new(2, 2)).to_bytes().unwrap_err();
    assert!(matches!(err, MetaError::OffsetOverflow { pointer_size: 2, .. }));

    // The same forest fits with wider pointers.
    let bytes = MetaFile::new(&forest, FormatConfig::new(4, 2)).to_bytes().unwrap();
    let file = MetaFileReader::parse(&bytes).unwrap();
    assert!(file.lookup("kHugeFrameworkConstantNumber03999").unwrap().is_some());
}

#[test]
fn test_unmerged_category_fails_the_save() {
    let json = r#"{
        "declarations": [
            {
                "info": { "name": "NSString(Extras)" },
                "decl": { "type": "category", "extended_interface": "NSString" }
            }
        ],
        "modules": [{ "name": "Foundation", "declarations": [0] }]
    }"#;
    let forest: Forest = serde_json::from_str(json).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let err = MetaFile::new(&forest, FormatConfig::default())
        .save_to_path(&dir.path().join("out.bin"))
        .unwrap_err();
    assert!(matches!(err, MetaError::InvariantViolation(_)));
}

#[test]
fn test_decoded_declaration_json() {
    let forest = uikit_forest();
    let bytes = MetaFile::new(&forest, FormatConfig::default()).to_bytes().unwrap();
    let file = MetaFileReader::parse(&bytes).unwrap();
    let point = file.find("CGPoint").unwrap().unwrap();

    let value = serde_json::to_value(&point).unwrap();
    assert_eq!(value["type"], "struct");
    assert_eq!(value["public_name"], "CGPoint");
    assert_eq!(value["module"], "CoreGraphics");
    assert_eq!(value["fields"][0]["type"]["kind"], "double");
}
