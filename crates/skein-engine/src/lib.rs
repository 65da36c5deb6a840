//! Schema-driven binary serialization for versioned object-graph formats.
//!
//! A format is declared once — conditional field lists, version ranges,
//! arrays, bitfields, enums, template types, forward references — and the
//! engine derives byte-exact read, write, size and hash operations over
//! arbitrarily nested structures, while tracking forward references
//! ("links") for resolution into a navigable object graph.
//!
//! # Quick Start
//!
//! ```
//! use skein_engine::{
//!     AttrSpec, BasicKind, BinaryReader, BinaryWriter, Context, Endian, IntKind,
//!     SchemaBuilder, StructValue,
//! };
//!
//! // Declare the schema (normally produced by an external format parser).
//! let mut builder = SchemaBuilder::new();
//! builder.basic("uint", BasicKind::Int(IntKind::U32))?;
//! builder.basic("float", BasicKind::Float32)?;
//!
//! let vertex = builder.struct_type("Vertex", None)?;
//! builder.attr(vertex, AttrSpec::new("x", "float"));
//! builder.attr(vertex, AttrSpec::new("y", "float"));
//!
//! let mesh = builder.struct_type("Mesh", None)?;
//! builder.attr(mesh, AttrSpec::new("num_vertices", "uint"));
//! builder.attr(mesh, AttrSpec::new("vertices", "Vertex").dim1("num_vertices"));
//! let schema = builder.finish()?;
//!
//! // Build an instance, size an array, round-trip it.
//! let ctx = Context::new(&schema, 0, 0, Endian::Little);
//! let mesh_ty = schema.id_of("Mesh").unwrap();
//! let mut mesh = StructValue::new(&schema, mesh_ty, None, 0)?;
//! mesh.set_int(&schema, "num_vertices", 2)?;
//! mesh.update_array(&ctx, "vertices")?;
//!
//! let mut w = BinaryWriter::new();
//! mesh.write(&mut w, &ctx)?;
//! assert_eq!(w.len() as u64, mesh.size(&ctx)?);
//!
//! let bytes = w.into_bytes();
//! let mut readback = StructValue::new(&schema, mesh_ty, None, 0)?;
//! readback.read(&mut BinaryReader::new(&bytes), &ctx)?;
//! assert_eq!(readback, mesh);
//! # Ok::<(), skein_engine::Error>(())
//! ```
//!
//! # Architecture
//!
//! - **Schema** ([`SchemaBuilder`] → [`Schema`]): the two-pass registry of
//!   type definitions and flattened attribute descriptor lists.
//! - **Expressions** ([`Expression`]): parsed-once condition/dimension
//!   expressions, evaluated against instances or the document scope.
//! - **Values** ([`Value`] and friends): the owned tree a struct instance
//!   carries — basics, enums, bitfields, arrays, nested structs, links.
//! - **Instances** ([`StructValue`]): construction, filtered attribute
//!   iteration, read/write/size/hash, deep copy, link fix-up.
//! - **Documents** ([`Document`]): the flat block arena, link resolution
//!   against the [`BlockTable`] boundary, per-operation [`Context`].
//! - **Traversal** ([`walker`]): ref-graph walking, subtree hashing, tree
//!   dumps, chain search.

mod document;
mod error;
mod instance;

pub mod expr;
pub mod schema;
pub mod value;
pub mod walker;

// Primary API
pub use document::{
    ArenaTable, BlockId, BlockTable, Context, DocScope, Document, FixupReport,
};
pub use error::{Error, Result};
pub use expr::{format_version, version_u32, ExprScope, Expression, ScopeValue};
pub use instance::StructValue;
pub use schema::{
    canonical_name, ArgSource, AttrSpec, AttributeDescriptor, BasicKind, BitMember, BitfieldDef,
    DefaultValue, EnumDef, EnumOption, IntKind, LinkKind, Schema, SchemaBuilder, StructDef,
    StructHandle, TypeDecl, TypeDef, TypeId, TypeRef,
};
pub use value::{
    ArrayValue, BasicValue, BitfieldValue, EnumValue, LinkState, LinkValue, Value,
};
pub use walker::{depth_first, find_chain, DocGraph, GraphSource};

// Re-export the I/O primitives so callers need only one crate.
pub use skein_common::{BinaryReader, BinaryWriter, Endian};
