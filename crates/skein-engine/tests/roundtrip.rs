//! End-to-end tests over a scene-graph-flavored schema: byte-exact round
//! trips, version gating, link fix-up, templates, and graph traversal.

use skein_engine::{
    depth_first, find_chain, version_u32, AttrSpec, BasicKind, BinaryReader, BinaryWriter,
    BlockId, Context, DocGraph, Document, Endian, Error, IntKind, LinkKind, Schema,
    SchemaBuilder, StructValue,
};

/// A miniature scene-graph format: typed objects with names, flags, child
/// refs, a parent back-pointer, geometry payloads and templated key
/// groups.
fn scene_schema() -> Schema {
    let mut b = SchemaBuilder::new();
    b.basic("byte", BasicKind::Int(IntKind::U8)).unwrap();
    b.basic("ushort", BasicKind::Int(IntKind::U16)).unwrap();
    b.basic("uint", BasicKind::Int(IntKind::U32)).unwrap();
    b.basic("float", BasicKind::Float32).unwrap();
    b.basic("hfloat", BasicKind::Float16).unwrap();
    b.basic("name", BasicKind::SizedString).unwrap();
    b.basic("text", BasicKind::ZString).unwrap();
    b.enum_type(
        "BlendMode",
        IntKind::U16,
        &[("OPAQUE", 0), ("ALPHA", 1), ("ADDITIVE", 2)],
    )
    .unwrap();
    b.bitfield(
        "GeomFlags",
        IntKind::U8,
        &[("has_normals", 1), ("has_colors", 1), ("num_uv_sets", 2)],
    )
    .unwrap();
    b.link("ref", LinkKind::Ref).unwrap();
    b.link("ptr", LinkKind::Ptr).unwrap();

    let keys = b.generic_struct_type("Keys", None).unwrap();
    b.attr(keys, AttrSpec::new("num_keys", "uint"));
    b.attr(keys, AttrSpec::new("keys", "TEMPLATE").dim1("num_keys"));

    let object = b.struct_type("Object", None).unwrap();
    b.attr(object, AttrSpec::new("name", "name"));

    let node = b.struct_type("Node", Some("Object")).unwrap();
    b.attr(node, AttrSpec::new("flags", "GeomFlags"));
    b.attr(node, AttrSpec::new("blend", "BlendMode").since("4.0.0.2"));
    b.attr(node, AttrSpec::new("num_children", "uint"));
    b.attr(
        node,
        AttrSpec::new("children", "ref")
            .template("Node")
            .dim1("num_children"),
    );
    b.attr(node, AttrSpec::new("parent", "ptr").template("Node"));

    let geometry = b.struct_type("Geometry", Some("Node")).unwrap();
    b.attr(geometry, AttrSpec::new("num_vertices", "uint"));
    b.attr(
        geometry,
        AttrSpec::new("vertices", "float").dim1("num_vertices"),
    );
    b.attr(
        geometry,
        AttrSpec::new("weights", "hfloat").dim1("num_vertices"),
    );
    b.attr(geometry, AttrSpec::new("num_uv_sets", "byte"));
    b.attr(
        geometry,
        AttrSpec::new("uv", "float")
            .dim1("num_uv_sets")
            .dim2("num_vertices"),
    );
    b.attr(
        geometry,
        AttrSpec::new("radius", "float").cond("num_vertices != 0"),
    );
    b.attr(geometry, AttrSpec::new("morph", "Keys").template("hfloat"));

    // unrelated to the Node hierarchy, for deep-copy mismatch tests
    let material = b.struct_type("Material", None).unwrap();
    b.attr(material, AttrSpec::new("shader", "text"));

    b.finish().unwrap()
}

const MODERN: &str = "20.0.0.5";
const LEGACY: &str = "3.3.0.13";

fn ctx<'a>(schema: &'a Schema, version: &str, order: Endian) -> Context<'a> {
    Context::new(schema, version_u32(version).unwrap(), 0, order)
}

/// Little-endian bytes of one fully-populated Geometry block.
fn geometry_bytes() -> Vec<u8> {
    let mut w = BinaryWriter::new();
    let e = Endian::Little;
    // name "geo"
    w.write_u32(3, e);
    w.write_bytes(b"geo");
    // flags: has_normals=1, num_uv_sets=1 -> raw 0b0101
    w.write_u8(0b0101);
    // blend = ADDITIVE (present: version >= 4.0.0.2)
    w.write_u16(2, e);
    // no children, null parent
    w.write_u32(0, e);
    w.write_i32(-1, e);
    // 2 vertices
    w.write_u32(2, e);
    w.write_f32(1.0, e);
    w.write_f32(2.0, e);
    // weights: half 1.0, 2.0
    w.write_u16(0x3c00, e);
    w.write_u16(0x4000, e);
    // 2 uv sets x 2 vertices, row-major
    w.write_u8(2);
    for uv in [0.0f32, 0.25, 0.5, 0.75] {
        w.write_f32(uv, e);
    }
    // radius (active: num_vertices != 0)
    w.write_f32(5.0, e);
    // morph keys: one half-precision key
    w.write_u32(1, e);
    w.write_u16(0x3800, e);
    w.into_bytes()
}

#[test]
fn test_geometry_read_pins_field_order() {
    let schema = scene_schema();
    let ctx = ctx(&schema, MODERN, Endian::Little);
    let bytes = geometry_bytes();

    let geo_ty = schema.id_of("Geometry").unwrap();
    let mut geo = StructValue::new(&schema, geo_ty, None, 0).unwrap();
    geo.read(&mut BinaryReader::new(&bytes), &ctx).unwrap();

    assert_eq!(
        geo.get(&schema, "name").unwrap().as_basic().unwrap().str_value().unwrap(),
        "geo"
    );
    assert_eq!(geo.attr_int(&schema, "flags").unwrap(), 0b0101);
    assert_eq!(geo.attr_int(&schema, "blend").unwrap(), 2);
    assert_eq!(geo.attr_int(&schema, "num_vertices").unwrap(), 2);
    let vertices = geo.get(&schema, "vertices").unwrap().as_array().unwrap();
    assert_eq!(vertices.len(), 2);
    assert_eq!(
        vertices.get(1).unwrap().as_basic().unwrap().as_f32(),
        Some(2.0)
    );
    // 2-D array: rows are uv sets, row-major on disk
    let uv = geo.get(&schema, "uv").unwrap().as_array().unwrap();
    assert!(uv.is_matrix());
    assert_eq!(uv.len(), 2);
    let row1 = uv.get(1).unwrap().as_array().unwrap();
    assert_eq!(row1.get(0).unwrap().as_basic().unwrap().as_f32(), Some(0.5));
    // templated key group bound to hfloat
    let morph = geo.get(&schema, "morph").unwrap().as_struct().unwrap();
    assert_eq!(morph.attr_int(&schema, "num_keys").unwrap(), 1);
    let keys = morph.get(&schema, "keys").unwrap().as_array().unwrap();
    assert_eq!(keys.get(0).unwrap().as_basic().unwrap().as_f32(), Some(0.5));
}

#[test]
fn test_geometry_round_trip_is_byte_exact() {
    let schema = scene_schema();
    let ctx = ctx(&schema, MODERN, Endian::Little);
    let bytes = geometry_bytes();

    let geo_ty = schema.id_of("Geometry").unwrap();
    let mut geo = StructValue::new(&schema, geo_ty, None, 0).unwrap();
    geo.read(&mut BinaryReader::new(&bytes), &ctx).unwrap();

    let mut w = BinaryWriter::new();
    geo.write(&mut w, &ctx).unwrap();
    assert_eq!(w.bytes(), bytes.as_slice());
    assert_eq!(geo.size(&ctx).unwrap(), bytes.len() as u64);
}

#[test]
fn test_big_endian_round_trip() {
    let schema = scene_schema();
    let ctx = ctx(&schema, MODERN, Endian::Big);
    let e = Endian::Big;

    let mut w = BinaryWriter::new();
    w.write_u32(1, e);
    w.write_bytes(b"n");
    w.write_u8(0);
    w.write_u16(1, e);
    w.write_u32(2, e);
    w.write_i32(1, e);
    w.write_i32(2, e);
    w.write_i32(-1, e);
    let bytes = w.into_bytes();

    let node_ty = schema.id_of("Node").unwrap();
    let mut node = StructValue::new(&schema, node_ty, None, 0).unwrap();
    node.read(&mut BinaryReader::new(&bytes), &ctx).unwrap();
    assert_eq!(node.attr_int(&schema, "num_children").unwrap(), 2);
    assert_eq!(node.attr_int(&schema, "blend").unwrap(), 1);

    let mut out = BinaryWriter::new();
    node.write(&mut out, &ctx).unwrap();
    assert_eq!(out.bytes(), bytes.as_slice());
}

#[test]
fn test_version_gating_drops_blend_on_legacy_files() {
    let schema = scene_schema();
    let modern = ctx(&schema, MODERN, Endian::Little);
    let legacy = ctx(&schema, LEGACY, Endian::Little);

    let node_ty = schema.id_of("Node").unwrap();
    let node = StructValue::new(&schema, node_ty, None, 0).unwrap();

    let modern_names: Vec<&str> = node
        .filtered_attributes(&modern)
        .unwrap()
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    let legacy_names: Vec<&str> = node
        .filtered_attributes(&legacy)
        .unwrap()
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert!(modern_names.contains(&"blend"));
    assert!(!legacy_names.contains(&"blend"));
    // the enum is 2 bytes on disk
    assert_eq!(
        node.size(&modern).unwrap() - node.size(&legacy).unwrap(),
        2
    );
}

#[test]
fn test_filtered_attributes_deterministic() {
    let schema = scene_schema();
    let ctx = ctx(&schema, MODERN, Endian::Little);
    let geo_ty = schema.id_of("Geometry").unwrap();
    let geo = StructValue::new(&schema, geo_ty, None, 0).unwrap();

    let first: Vec<String> = geo
        .filtered_attributes(&ctx)
        .unwrap()
        .iter()
        .map(|a| a.name.clone())
        .collect();
    let second: Vec<String> = geo
        .filtered_attributes(&ctx)
        .unwrap()
        .iter()
        .map(|a| a.name.clone())
        .collect();
    assert_eq!(first, second);
}

#[test]
fn test_conditional_attribute_follows_sibling_state() {
    let mut b = SchemaBuilder::new();
    b.basic("uint", BasicKind::Int(IntKind::U32)).unwrap();
    let x = b.struct_type("X", None).unwrap();
    b.attr(x, AttrSpec::new("a", "uint"));
    let y = b.struct_type("Y", Some("X")).unwrap();
    b.attr(y, AttrSpec::new("c", "uint"));
    b.attr(y, AttrSpec::new("d", "X").cond("c == 3"));
    let schema = b.finish().unwrap();

    let ctx = Context::new(&schema, 0, 0, Endian::Little);
    let y_ty = schema.id_of("Y").unwrap();
    let mut y = StructValue::new(&schema, y_ty, None, 0).unwrap();

    y.set_int(&schema, "c", 3).unwrap();
    let names: Vec<&str> = y
        .filtered_attributes(&ctx)
        .unwrap()
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(names, ["a", "c", "d"]);
    let with_d = y.size(&ctx).unwrap();

    y.set_int(&schema, "c", 4).unwrap();
    let names: Vec<&str> = y
        .filtered_attributes(&ctx)
        .unwrap()
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(names, ["a", "c"]);
    let without_d = y.size(&ctx).unwrap();

    // the difference is exactly X's serialized size
    let x = StructValue::new(&schema, schema.id_of("X").unwrap(), None, 0).unwrap();
    assert_eq!(with_d - without_d, x.size(&ctx).unwrap());
}

#[test]
fn test_vercond_gates_against_document_scope() {
    let mut b = SchemaBuilder::new();
    b.basic("uint", BasicKind::Int(IntKind::U32)).unwrap();
    let s = b.struct_type("S", None).unwrap();
    b.attr(s, AttrSpec::new("base", "uint"));
    b.attr(s, AttrSpec::new("env_map", "uint").vercond("user_version == 11"));
    let schema = b.finish().unwrap();

    let s_ty = schema.id_of("S").unwrap();
    let v = StructValue::new(&schema, s_ty, None, 0).unwrap();

    let plain = Context::new(&schema, 0, 0, Endian::Little);
    let modded = Context::new(&schema, 0, 11, Endian::Little);
    assert_eq!(v.size(&plain).unwrap(), 4);
    assert_eq!(v.size(&modded).unwrap(), 8);
}

#[test]
fn test_array_resize_preserves_content() {
    let schema = scene_schema();
    let ctx = ctx(&schema, MODERN, Endian::Little);
    let geo_ty = schema.id_of("Geometry").unwrap();
    let mut geo = StructValue::new(&schema, geo_ty, None, 0).unwrap();

    geo.set_int(&schema, "num_vertices", 3).unwrap();
    geo.update_array(&ctx, "vertices").unwrap();
    for (i, x) in [1.0f64, 2.0, 3.0].iter().enumerate() {
        geo.get_mut(&schema, "vertices")
            .unwrap()
            .as_array_mut()
            .unwrap()
            .get_mut(i)
            .unwrap()
            .as_basic_mut()
            .unwrap()
            .set_f64(*x)
            .unwrap();
    }

    // grow: original indices keep their values, new slots default
    geo.set_int(&schema, "num_vertices", 5).unwrap();
    geo.update_array(&ctx, "vertices").unwrap();
    let arr = geo.get(&schema, "vertices").unwrap().as_array().unwrap();
    assert_eq!(arr.len(), 5);
    assert_eq!(arr.get(2).unwrap().as_basic().unwrap().as_f32(), Some(3.0));
    assert_eq!(arr.get(4).unwrap().as_basic().unwrap().as_f32(), Some(0.0));

    // shrink: retained indices unchanged
    geo.set_int(&schema, "num_vertices", 2).unwrap();
    geo.update_array(&ctx, "vertices").unwrap();
    let arr = geo.get(&schema, "vertices").unwrap().as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr.get(1).unwrap().as_basic().unwrap().as_f32(), Some(2.0));
}

#[test]
fn test_deep_copy_between_related_types() {
    let schema = scene_schema();
    let ctx = ctx(&schema, MODERN, Endian::Little);

    let node_ty = schema.id_of("Node").unwrap();
    let geo_ty = schema.id_of("Geometry").unwrap();

    let mut node = StructValue::new(&schema, node_ty, None, 0).unwrap();
    node.set_str(&schema, "name", "source").unwrap();
    node.set_int(&schema, "flags", 3).unwrap();
    node.set_int(&schema, "num_children", 1).unwrap();
    node.update_array(&ctx, "children").unwrap();

    // descendant <- ancestor: every shared attribute copies across
    let mut geo = StructValue::new(&schema, geo_ty, None, 0).unwrap();
    geo.deep_copy(&node, &ctx).unwrap();
    assert_eq!(
        geo.get(&schema, "name").unwrap().as_basic().unwrap().str_value().unwrap(),
        "source"
    );
    assert_eq!(geo.attr_int(&schema, "flags").unwrap(), 3);
    assert_eq!(
        geo.get(&schema, "children").unwrap().as_array().unwrap().len(),
        1
    );

    // ancestor <- descendant works too
    let mut back = StructValue::new(&schema, node_ty, None, 0).unwrap();
    back.deep_copy(&geo, &ctx).unwrap();
    assert_eq!(back.attr_int(&schema, "flags").unwrap(), 3);

    // unrelated types refuse
    let mut material =
        StructValue::new(&schema, schema.id_of("Material").unwrap(), None, 0).unwrap();
    assert!(matches!(
        material.deep_copy(&node, &ctx),
        Err(Error::TypeMismatch { .. })
    ));
}

/// Three Node blocks: a root pointing at two leaves, the first leaf
/// back-pointing at the root through its parent pointer.
fn three_node_document(schema: &Schema) -> (Document, Vec<u8>) {
    let e = Endian::Little;
    let mut w = BinaryWriter::new();
    // block 0: root, children [1, 2], parent null
    w.write_u32(0, e);
    w.write_u8(0);
    w.write_u16(0, e);
    w.write_u32(2, e);
    w.write_i32(1, e);
    w.write_i32(2, e);
    w.write_i32(-1, e);
    // block 1: leaf, parent -> 0
    w.write_u32(0, e);
    w.write_u8(0);
    w.write_u16(0, e);
    w.write_u32(0, e);
    w.write_i32(0, e);
    // block 2: leaf identical to block 1, parent -> 0
    w.write_u32(0, e);
    w.write_u8(0);
    w.write_u16(0, e);
    w.write_u32(0, e);
    w.write_i32(0, e);
    let bytes = w.into_bytes();

    let mut doc = Document::new(version_u32(MODERN).unwrap(), 0, e);
    let node_ty = schema.id_of("Node").unwrap();
    let mut r = BinaryReader::new(&bytes);
    for _ in 0..3 {
        doc.read_block(schema, &mut r, node_ty).unwrap();
    }
    assert!(r.is_empty());
    (doc, bytes)
}

#[test]
fn test_link_fixup_resolves_and_is_idempotent() {
    let schema = scene_schema();
    let (mut doc, bytes) = three_node_document(&schema);

    let report = doc.fix_links(&schema).unwrap();
    assert_eq!(report.resolved, 4); // two children plus two parents
    assert!(report.is_clean());

    let root = BlockId::from_index(0);
    assert_eq!(
        doc.refs_of(&schema, root).unwrap(),
        [BlockId::from_index(1), BlockId::from_index(2)]
    );
    // the back-pointer is a link but not a ref
    let leaf = BlockId::from_index(1);
    assert_eq!(doc.links_of(&schema, leaf).unwrap(), [root]);
    assert!(doc.refs_of(&schema, leaf).unwrap().is_empty());

    // idempotent: a second pass has nothing left to do
    let again = doc.fix_links(&schema).unwrap();
    assert_eq!(again.resolved, 0);
    assert!(again.is_clean());

    // resolved links re-serialize to the original bytes
    let mut w = BinaryWriter::new();
    for i in 0..3 {
        doc.write_block(&schema, &mut w, BlockId::from_index(i)).unwrap();
    }
    assert_eq!(w.bytes(), bytes.as_slice());
}

#[test]
fn test_unresolvable_link_goes_null_and_is_reported() {
    let schema = scene_schema();
    let e = Endian::Little;
    let mut w = BinaryWriter::new();
    w.write_u32(0, e);
    w.write_u8(0);
    w.write_u16(0, e);
    w.write_u32(1, e);
    w.write_i32(9, e); // child index with no block
    w.write_i32(-1, e);
    let bytes = w.into_bytes();

    let mut doc = Document::new(version_u32(MODERN).unwrap(), 0, e);
    let node_ty = schema.id_of("Node").unwrap();
    doc.read_block(&schema, &mut BinaryReader::new(&bytes), node_ty)
        .unwrap();

    let report = doc.fix_links(&schema).unwrap();
    assert_eq!(report.unresolved, vec![9]);
    assert!(doc
        .refs_of(&schema, BlockId::from_index(0))
        .unwrap()
        .is_empty());
}

#[test]
fn test_replace_block_rewrites_and_deletes_references() {
    let schema = scene_schema();
    let (mut doc, _) = three_node_document(&schema);
    doc.fix_links(&schema).unwrap();

    let b1 = BlockId::from_index(1);
    let b2 = BlockId::from_index(2);
    let root = BlockId::from_index(0);

    doc.replace_block(&schema, b1, Some(b2)).unwrap();
    assert_eq!(doc.refs_of(&schema, root).unwrap(), [b2, b2]);

    doc.replace_block(&schema, b2, None).unwrap();
    assert!(doc.refs_of(&schema, root).unwrap().is_empty());
}

#[test]
fn test_walker_traversal_and_duplicate_detection() {
    let schema = scene_schema();
    let (mut doc, _) = three_node_document(&schema);
    doc.fix_links(&schema).unwrap();

    let graph = DocGraph::new(&doc, &schema).unwrap();
    let root = BlockId::from_index(0);
    let order = depth_first(&graph, root);
    assert_eq!(
        order,
        [root, BlockId::from_index(1), BlockId::from_index(2)]
    );

    assert_eq!(
        find_chain(&graph, root, BlockId::from_index(2)),
        Some(vec![root, BlockId::from_index(2)])
    );
    assert_eq!(find_chain(&graph, BlockId::from_index(1), root), None);

    // the leaves are structurally identical: equal subtree hashes flag
    // them as duplicate candidates
    let h1 = graph.subtree_hash(&schema, BlockId::from_index(1)).unwrap();
    let h2 = graph.subtree_hash(&schema, BlockId::from_index(2)).unwrap();
    assert_eq!(h1, h2);
    let h_root = graph.subtree_hash(&schema, root).unwrap();
    assert_ne!(h_root, h1);

    let dump = graph.dump_tree(&schema, root);
    assert!(dump.starts_with("Node #0"));
    assert!(dump.contains("  Node #1"));
}

#[test]
fn test_get_strings_collects_nested_content() {
    let schema = scene_schema();
    let ctx = ctx(&schema, MODERN, Endian::Little);
    let geo_ty = schema.id_of("Geometry").unwrap();
    let mut geo = StructValue::new(&schema, geo_ty, None, 0).unwrap();
    geo.set_str(&schema, "name", "hull").unwrap();

    let mut strings = Vec::new();
    geo.get_strings(&ctx, &mut strings).unwrap();
    assert_eq!(strings, ["hull"]);
}

#[test]
fn test_programmatic_link_skips_raw_phase() {
    let schema = scene_schema();
    let (mut doc, _) = three_node_document(&schema);
    doc.fix_links(&schema).unwrap();

    // Uninitialized -> Resolved directly, no raw index involved
    let node_ty = schema.id_of("Node").unwrap();
    let mut fresh = StructValue::new(&schema, node_ty, None, 0).unwrap();
    fresh
        .set_link(&schema, "parent", Some(BlockId::from_index(0)))
        .unwrap();
    let id = doc.push_block(fresh);

    let mut w = BinaryWriter::new();
    doc.write_block(&schema, &mut w, id).unwrap();
    // ... name(4) + flags(1) + blend(2) + num_children(4) + parent(4)
    let parent_bytes = &w.bytes()[w.bytes().len() - 4..];
    assert_eq!(parent_bytes, &0i32.to_le_bytes()[..]);
}

#[test]
fn test_struct_value_equality_tracks_content() {
    let schema = scene_schema();
    let ctx = ctx(&schema, MODERN, Endian::Little);
    let geo_ty = schema.id_of("Geometry").unwrap();

    let a = StructValue::new(&schema, geo_ty, None, 0).unwrap();
    let mut b = StructValue::new(&schema, geo_ty, None, 0).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.get_hash(&ctx).unwrap(), b.get_hash(&ctx).unwrap());

    b.set_int(&schema, "num_vertices", 7).unwrap();
    assert_ne!(a, b);
    assert_ne!(a.get_hash(&ctx).unwrap(), b.get_hash(&ctx).unwrap());
}

#[test]
fn test_argument_sizes_fixed_string_from_sibling() {
    let mut b = SchemaBuilder::new();
    b.basic("uint", BasicKind::Int(IntKind::U32)).unwrap();
    b.basic("chars", BasicKind::FixedString).unwrap();
    let tag = b.struct_type("Tag", None).unwrap();
    b.attr(tag, AttrSpec::new("len", "uint"));
    b.attr(tag, AttrSpec::new("tag", "chars").arg("len"));
    let schema = b.finish().unwrap();
    let ctx = Context::new(&schema, 0, 0, Endian::Little);

    let e = Endian::Little;
    let mut w = BinaryWriter::new();
    w.write_u32(4, e);
    w.write_bytes(b"MESH");
    let bytes = w.into_bytes();

    let tag_ty = schema.id_of("Tag").unwrap();
    let mut v = StructValue::new(&schema, tag_ty, None, 0).unwrap();
    v.read(&mut BinaryReader::new(&bytes), &ctx).unwrap();
    assert_eq!(
        v.get(&schema, "tag").unwrap().as_basic().unwrap().str_value().unwrap(),
        "MESH"
    );
    assert_eq!(v.size(&ctx).unwrap(), 8);

    let mut out = BinaryWriter::new();
    v.write(&mut out, &ctx).unwrap();
    assert_eq!(out.bytes(), bytes.as_slice());
}

#[test]
fn test_argument_gates_sub_struct_condition() {
    let mut b = SchemaBuilder::new();
    b.basic("uint", BasicKind::Int(IntKind::U32)).unwrap();
    let inner = b.struct_type("Inner", None).unwrap();
    b.attr(inner, AttrSpec::new("payload", "uint").cond("arg == 1"));
    let outer = b.struct_type("Outer", None).unwrap();
    b.attr(outer, AttrSpec::new("mode", "uint"));
    b.attr(outer, AttrSpec::new("inner", "Inner").arg("mode"));
    let schema = b.finish().unwrap();
    let ctx = Context::new(&schema, 0, 0, Endian::Little);
    let outer_ty = schema.id_of("Outer").unwrap();
    let e = Endian::Little;

    // mode = 1: the inner payload is present
    let mut w = BinaryWriter::new();
    w.write_u32(1, e);
    w.write_u32(7, e);
    let bytes = w.into_bytes();
    let mut v = StructValue::new(&schema, outer_ty, None, 0).unwrap();
    v.read(&mut BinaryReader::new(&bytes), &ctx).unwrap();
    let inner_v = v.get(&schema, "inner").unwrap().as_struct().unwrap();
    assert_eq!(inner_v.attr_int(&schema, "payload").unwrap(), 7);
    assert_eq!(v.size(&ctx).unwrap(), 8);

    // mode = 0: the inner struct is empty
    let mut w = BinaryWriter::new();
    w.write_u32(0, e);
    let bytes = w.into_bytes();
    let mut v = StructValue::new(&schema, outer_ty, None, 0).unwrap();
    v.read(&mut BinaryReader::new(&bytes), &ctx).unwrap();
    assert_eq!(v.size(&ctx).unwrap(), 4);
}

#[test]
fn test_unknown_enum_value_is_tolerated_and_flagged() {
    let schema = scene_schema();
    let ctx = ctx(&schema, MODERN, Endian::Little);
    let e = Endian::Little;

    // blend = 9, not in the BlendMode table
    let mut w = BinaryWriter::new();
    w.write_u32(0, e);
    w.write_u8(0);
    w.write_u16(9, e);
    w.write_u32(0, e);
    w.write_i32(-1, e);
    let bytes = w.into_bytes();

    let node_ty = schema.id_of("Node").unwrap();
    let mut node = StructValue::new(&schema, node_ty, None, 0).unwrap();
    node.read(&mut BinaryReader::new(&bytes), &ctx).unwrap();

    let blend = node.get(&schema, "blend").unwrap().as_enum().unwrap();
    assert!(!blend.is_valid(&schema));
    assert_eq!(blend.describe(&schema), "INVALID(9)");

    // the unknown value still round-trips byte-exactly
    let mut out = BinaryWriter::new();
    node.write(&mut out, &ctx).unwrap();
    assert_eq!(out.bytes(), bytes.as_slice());

    // programmatic writes do validate
    let mut copy = node.clone();
    assert!(copy.set_int(&schema, "blend", 9).is_err());
    assert!(copy.set_int(&schema, "blend", 1).is_ok());
    let blend = copy.get_mut(&schema, "blend").unwrap().as_enum_mut().unwrap();
    blend.set_by_name(&schema, "ADDITIVE").unwrap();
    assert_eq!(blend.describe(&schema), "ADDITIVE");
}

#[test]
fn test_abstract_attribute_iterated_but_not_serialized() {
    let mut b = SchemaBuilder::new();
    b.basic("uint", BasicKind::Int(IntKind::U32)).unwrap();
    let s = b.struct_type("S", None).unwrap();
    b.attr(s, AttrSpec::new("marker", "uint").abstract_attr());
    b.attr(s, AttrSpec::new("n", "uint"));
    let schema = b.finish().unwrap();
    let ctx = Context::new(&schema, 0, 0, Endian::Little);

    let s_ty = schema.id_of("S").unwrap();
    let mut v = StructValue::new(&schema, s_ty, None, 0).unwrap();
    v.set_int(&schema, "n", 5).unwrap();

    // on the wire only `n` exists
    assert_eq!(v.size(&ctx).unwrap(), 4);
    let mut w = BinaryWriter::new();
    v.write(&mut w, &ctx).unwrap();
    assert_eq!(w.bytes(), &5u32.to_le_bytes()[..]);

    // but iteration still sees the bookkeeping field, and it takes part
    // in structural equality
    let names: Vec<&str> = v
        .filtered_attributes(&ctx)
        .unwrap()
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(names, ["marker", "n"]);
    let before = v.get_hash(&ctx).unwrap();
    v.set_int(&schema, "marker", 1).unwrap();
    assert_ne!(v.get_hash(&ctx).unwrap(), before);
}

#[test]
fn test_truncated_stream_fails_loudly() {
    let schema = scene_schema();
    let ctx = ctx(&schema, MODERN, Endian::Little);
    let geo_ty = schema.id_of("Geometry").unwrap();
    let mut geo = StructValue::new(&schema, geo_ty, None, 0).unwrap();

    let full = geometry_bytes();
    let truncated = &full[..full.len() - 3];
    let err = geo.read(&mut BinaryReader::new(truncated), &ctx);
    assert!(matches!(err, Err(Error::Stream(_))));
}
