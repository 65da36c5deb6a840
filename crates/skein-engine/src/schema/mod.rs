//! Schema registry: type definitions and flattened attribute lists.
//!
//! A [`Schema`] is the engine's sole configuration surface. External
//! parsers hand over type declarations (see [`SchemaBuilder`]); the
//! finished schema maps every type name to a [`TypeDef`] and every struct
//! type to its inheritance-flattened, shadow-resolved attribute list.
//! All layout decisions (field order, array shapes, bit packing) are
//! derived from here at run time.

mod builder;
mod descriptor;

pub use builder::{SchemaBuilder, StructHandle, TypeDecl};
pub use descriptor::{ArgSource, AttrSpec, AttributeDescriptor, DefaultValue, TypeRef};

use hashbrown::HashMap as FastHashMap;
use rustc_hash::FxHasher;

use crate::{Error, Result};

pub(crate) type FxHashMap<K, V> =
    FastHashMap<K, V, std::hash::BuildHasherDefault<FxHasher>>;

/// Handle to a type definition within a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// Index into the schema's definition table.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Width and signedness of an on-disk integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
}

impl IntKind {
    /// Serialized size in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 => 4,
            Self::U64 | Self::I64 => 8,
        }
    }

    /// Inclusive value range as wide integers.
    pub fn range(&self) -> (i128, i128) {
        match self {
            Self::U8 => (0, u8::MAX as i128),
            Self::I8 => (i8::MIN as i128, i8::MAX as i128),
            Self::U16 => (0, u16::MAX as i128),
            Self::I16 => (i16::MIN as i128, i16::MAX as i128),
            Self::U32 => (0, u32::MAX as i128),
            Self::I32 => (i32::MIN as i128, i32::MAX as i128),
            Self::U64 => (0, u64::MAX as i128),
            Self::I64 => (i64::MIN as i128, i64::MAX as i128),
        }
    }

    /// Display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
        }
    }
}

/// Primitive on-disk encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BasicKind {
    /// Fixed-width integer.
    Int(IntKind),
    /// IEEE 754 single precision.
    Float32,
    /// IEEE 754 half precision, stored as raw bits.
    Float16,
    /// Null-terminated byte string.
    ZString,
    /// 4-byte unsigned length followed by that many bytes.
    SizedString,
    /// Exactly N bytes, N supplied by the attribute's runtime argument.
    FixedString,
    /// Undecoded remainder of the stream.
    Blob,
}

impl BasicKind {
    /// Whether values of this kind carry string content.
    pub fn is_string(&self) -> bool {
        matches!(self, Self::ZString | Self::SizedString | Self::FixedString)
    }
}

/// Link flavors.
///
/// A `Ref` is statically guaranteed to point strictly downward in the
/// object graph and is safe to traverse unconditionally; a `Ptr` may be a
/// back-edge and is never recursed through during graph-wide traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinkKind {
    Ref,
    Ptr,
}

/// An option in an enum's symbol table.
#[derive(Debug, Clone)]
pub struct EnumOption {
    pub name: String,
    pub value: i64,
}

/// Definition of an enum type.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub storage: IntKind,
    pub options: Vec<EnumOption>,
}

impl EnumDef {
    /// The symbolic name for a stored value, if the value is in the table.
    pub fn symbol(&self, value: i64) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.name.as_str())
    }

    /// The stored value for a symbolic name.
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.options.iter().find(|o| o.name == name).map(|o| o.value)
    }
}

/// A named sub-field of a bitfield.
#[derive(Debug, Clone)]
pub struct BitMember {
    pub name: String,
    pub width: u32,
}

/// Definition of a bitfield type: one integer storage unit packed with
/// named sub-fields, least-significant sub-field first.
#[derive(Debug, Clone)]
pub struct BitfieldDef {
    pub name: String,
    pub storage: IntKind,
    pub members: Vec<BitMember>,
}

impl BitfieldDef {
    /// Index of a member by canonical name.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

/// Definition of a struct type.
#[derive(Debug)]
pub struct StructDef {
    pub name: String,
    pub parent: Option<TypeId>,
    /// Declares the generic `TEMPLATE` placeholder; instances need a binding.
    pub generic: bool,
    /// Inheritance-flattened attribute list: base attributes first, derived
    /// redeclarations shadow in place. This order *is* the on-disk order.
    pub(crate) flat: Vec<AttributeDescriptor>,
    /// Canonical attribute name to flat-list slot.
    pub(crate) slots: FxHashMap<String, usize>,
    pub(crate) has_links: bool,
    pub(crate) has_refs: bool,
    pub(crate) has_strings: bool,
}

impl StructDef {
    /// The flattened attribute list in declaration order.
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.flat
    }

    /// Slot of an attribute by canonical name.
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }
}

/// A type definition in the schema.
#[derive(Debug)]
pub enum TypeDef {
    Basic { name: String, kind: BasicKind },
    Enum(EnumDef),
    Bitfield(BitfieldDef),
    Struct(StructDef),
    Link { name: String, kind: LinkKind },
}

impl TypeDef {
    /// The declared type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Basic { name, .. } | Self::Link { name, .. } => name,
            Self::Enum(e) => &e.name,
            Self::Bitfield(b) => &b.name,
            Self::Struct(s) => &s.name,
        }
    }
}

/// A complete, resolved schema.
#[derive(Debug)]
pub struct Schema {
    pub(crate) defs: Vec<TypeDef>,
    pub(crate) by_name: FxHashMap<String, TypeId>,
}

impl Schema {
    /// Look up a type by name.
    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Get a type definition.
    #[inline]
    pub fn get(&self, id: TypeId) -> &TypeDef {
        &self.defs[id.index()]
    }

    /// The name of a type.
    #[inline]
    pub fn name(&self, id: TypeId) -> &str {
        self.get(id).name()
    }

    /// Iterate all type definitions.
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.defs
            .iter()
            .enumerate()
            .map(|(i, d)| (TypeId(i as u32), d))
    }

    /// Get a struct definition, failing for non-struct types.
    pub fn struct_def(&self, id: TypeId) -> Result<&StructDef> {
        match self.get(id) {
            TypeDef::Struct(s) => Ok(s),
            other => Err(Error::KindMismatch {
                expected: "struct",
                found: kind_name(other),
            }),
        }
    }

    /// Get an enum definition, failing for non-enum types.
    pub fn enum_def(&self, id: TypeId) -> Result<&EnumDef> {
        match self.get(id) {
            TypeDef::Enum(e) => Ok(e),
            other => Err(Error::KindMismatch {
                expected: "enum",
                found: kind_name(other),
            }),
        }
    }

    /// Get a bitfield definition, failing for non-bitfield types.
    pub fn bitfield_def(&self, id: TypeId) -> Result<&BitfieldDef> {
        match self.get(id) {
            TypeDef::Bitfield(b) => Ok(b),
            other => Err(Error::KindMismatch {
                expected: "bitfield",
                found: kind_name(other),
            }),
        }
    }

    /// True if `ancestor` equals `descendant` or appears in its parent chain.
    pub fn is_ancestor(&self, ancestor: TypeId, descendant: TypeId) -> bool {
        let mut cur = Some(descendant);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = match self.get(id) {
                TypeDef::Struct(s) => s.parent,
                _ => None,
            };
        }
        false
    }

    /// True if the two struct types are in an ancestor/descendant relation
    /// (either direction, including equality).
    pub fn are_related(&self, a: TypeId, b: TypeId) -> bool {
        self.is_ancestor(a, b) || self.is_ancestor(b, a)
    }

    /// Whichever of the two related types is the more derived one.
    pub fn more_derived(&self, a: TypeId, b: TypeId) -> Option<TypeId> {
        if self.is_ancestor(a, b) {
            Some(b)
        } else if self.is_ancestor(b, a) {
            Some(a)
        } else {
            None
        }
    }

    /// Can a value of this type transitively contain links?
    pub fn type_has_links(&self, id: TypeId) -> bool {
        match self.get(id) {
            TypeDef::Link { .. } => true,
            TypeDef::Struct(s) => s.has_links,
            _ => false,
        }
    }

    /// Can a value of this type transitively contain downward refs?
    pub fn type_has_refs(&self, id: TypeId) -> bool {
        match self.get(id) {
            TypeDef::Link { kind, .. } => *kind == LinkKind::Ref,
            TypeDef::Struct(s) => s.has_refs,
            _ => false,
        }
    }

    /// Can a value of this type transitively contain strings?
    pub fn type_has_strings(&self, id: TypeId) -> bool {
        match self.get(id) {
            TypeDef::Basic { kind, .. } => kind.is_string(),
            TypeDef::Struct(s) => s.has_strings,
            _ => false,
        }
    }
}

fn kind_name(def: &TypeDef) -> &'static str {
    match def {
        TypeDef::Basic { .. } => "basic",
        TypeDef::Enum(_) => "enum",
        TypeDef::Bitfield(_) => "bitfield",
        TypeDef::Struct(_) => "struct",
        TypeDef::Link { .. } => "link",
    }
}

/// Canonicalize an attribute name: lowercase, with every run of
/// non-alphanumeric characters collapsed to a single underscore.
/// `"Num Vertices"` becomes `num_vertices`.
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("Num Vertices"), "num_vertices");
        assert_eq!(canonical_name("Has UV"), "has_uv");
        assert_eq!(canonical_name("flags"), "flags");
        assert_eq!(canonical_name("  Weird--Name  "), "weird_name");
    }

    #[test]
    fn test_int_kind_ranges() {
        assert_eq!(IntKind::U8.range(), (0, 255));
        assert_eq!(IntKind::I16.range(), (-32768, 32767));
        assert_eq!(IntKind::U64.size(), 8);
    }
}
