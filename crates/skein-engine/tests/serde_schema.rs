//! Loading a schema from declarative JSON records (the hand-off format
//! for external schema parsers). Only built with the `serde` feature.
#![cfg(feature = "serde")]

use skein_engine::{SchemaBuilder, TypeDecl};

#[test]
fn test_schema_from_json_decls() {
    let json = r#"[
        { "kind": "basic", "name": "uint", "basic": { "Int": "U32" } },
        { "kind": "basic", "name": "name", "basic": "SizedString" },
        { "kind": "link", "name": "ref", "link": "Ref" },
        {
            "kind": "enum",
            "name": "Mode",
            "storage": "U16",
            "options": [["OFF", 0], ["ON", 1]]
        },
        {
            "kind": "bitfield",
            "name": "Flags",
            "storage": "U8",
            "members": [["visible", 1], ["locked", 1]]
        },
        {
            "kind": "struct",
            "name": "Object",
            "attrs": [{ "name": "name", "ty": "name" }]
        },
        {
            "kind": "struct",
            "name": "Node",
            "parent": "Object",
            "attrs": [
                { "name": "mode", "ty": "Mode" },
                { "name": "num_children", "ty": "uint" },
                {
                    "name": "children",
                    "ty": "ref",
                    "template": "Node",
                    "dim1": "num_children"
                }
            ]
        }
    ]"#;

    let decls: Vec<TypeDecl> = serde_json::from_str(json).unwrap();
    let schema = SchemaBuilder::from_decls(decls).unwrap();

    let node = schema.id_of("Node").unwrap();
    let def = schema.struct_def(node).unwrap();
    let names: Vec<&str> = def.attributes().iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["name", "mode", "num_children", "children"]);
    assert!(schema.type_has_links(node));
    assert!(schema.type_has_refs(node));
    assert!(schema.type_has_strings(node));
}
