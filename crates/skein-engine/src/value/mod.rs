//! Runtime values: the tree a struct instance owns.
//!
//! Every attribute slot of a [`StructValue`](crate::StructValue) holds one
//! [`Value`], itself a basic value, enum, bitfield, array, nested struct,
//! or link. The variants mirror the schema's [`TypeDef`](crate::TypeDef)
//! kinds; construction resolves template placeholders and runtime
//! arguments so a built value tree is always concretely typed.

mod array;
mod basic;
mod bitfield;
mod enums;
mod link;

pub use array::ArrayValue;
pub use basic::{BasicValue, BLOB_MAX, SIZED_STRING_MAX, ZSTRING_MAX};
pub use bitfield::BitfieldValue;
pub use enums::EnumValue;
pub use link::{LinkState, LinkValue};

pub(crate) use array::ElemSpec;

use std::hash::Hasher;

use skein_common::{BinaryReader, BinaryWriter, Endian};

use crate::document::{BlockId, Context, FixupReport};
use crate::instance::StructValue;
use crate::schema::{IntKind, Schema, TypeDef, TypeId};
use crate::{Error, Result};

/// A runtime value of any schema kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Basic(BasicValue),
    Enum(EnumValue),
    Bitfield(BitfieldValue),
    Array(ArrayValue),
    Struct(StructValue),
    Link(LinkValue),
}

impl Value {
    /// Default-construct a value of a concrete type.
    pub(crate) fn of_type(
        schema: &Schema,
        ty: TypeId,
        template: Option<TypeId>,
        arg: i64,
    ) -> Result<Value> {
        Ok(match schema.get(ty) {
            TypeDef::Basic { kind, .. } => Value::Basic(BasicValue::new(*kind, arg)),
            TypeDef::Enum(def) => Value::Enum(EnumValue::new(ty, def.storage)),
            TypeDef::Bitfield(def) => Value::Bitfield(BitfieldValue::new(
                ty,
                def.storage,
                def.members.iter().map(|m| m.width).collect(),
            )),
            TypeDef::Struct(_) => Value::Struct(StructValue::new(schema, ty, template, arg)?),
            TypeDef::Link { kind, .. } => Value::Link(LinkValue::new(*kind, template)),
        })
    }

    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Basic(b) => b.kind_name(),
            Self::Enum(_) => "enum",
            Self::Bitfield(_) => "bitfield",
            Self::Array(_) => "array",
            Self::Struct(_) => "struct",
            Self::Link(_) => "link",
        }
    }

    /// Overwrite from the stream. Arrays are sized and read by their
    /// owning struct, which knows the dimension expressions.
    pub(crate) fn read(
        &mut self,
        r: &mut BinaryReader<'_>,
        ctx: &Context<'_>,
        arg: i64,
    ) -> Result<()> {
        match self {
            Self::Basic(v) => v.read(r, ctx.order, arg),
            Self::Enum(v) => v.read(r, ctx.order),
            Self::Bitfield(v) => v.read(r, ctx.order),
            Self::Struct(v) => {
                // the freshly resolved argument replaces the construct-time
                // one so `arg` expressions inside the sub-struct see it
                v.set_argument(arg);
                v.read(r, ctx)
            }
            Self::Link(v) => v.read(r, ctx.order),
            Self::Array(_) => Err(Error::KindMismatch {
                expected: "scalar",
                found: "array",
            }),
        }
    }

    /// Serialize the current state.
    pub(crate) fn write(&self, w: &mut BinaryWriter, ctx: &Context<'_>) -> Result<()> {
        match self {
            Self::Basic(v) => {
                v.write(w, ctx.order);
                Ok(())
            }
            Self::Enum(v) => {
                v.write(w, ctx.order);
                Ok(())
            }
            Self::Bitfield(v) => {
                v.write(w, ctx.order);
                Ok(())
            }
            Self::Struct(v) => v.write(w, ctx),
            Self::Link(v) => v.write(w, ctx.order, ctx.blocks),
            Self::Array(v) => v.write(w, ctx),
        }
    }

    /// Serialized size in bytes.
    pub fn size(&self, ctx: &Context<'_>) -> Result<u64> {
        match self {
            Self::Basic(v) => Ok(v.size()),
            Self::Enum(v) => Ok(v.size()),
            Self::Bitfield(v) => Ok(v.size()),
            Self::Struct(v) => v.size(ctx),
            Self::Link(v) => Ok(v.size()),
            Self::Array(v) => v.size(ctx),
        }
    }

    /// Feed the value into a hasher.
    pub(crate) fn feed_hash(&self, ctx: &Context<'_>, state: &mut dyn Hasher) -> Result<()> {
        match self {
            Self::Basic(v) => {
                v.feed_hash(state);
                Ok(())
            }
            Self::Enum(v) => {
                v.feed_hash(state);
                Ok(())
            }
            Self::Bitfield(v) => {
                v.feed_hash(state);
                Ok(())
            }
            Self::Struct(v) => v.feed_hash(ctx, state),
            Self::Link(v) => {
                v.feed_hash(state);
                Ok(())
            }
            Self::Array(v) => v.feed_hash(ctx, state),
        }
    }

    /// Integer coercion for expression evaluation and argument passing.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Self::Basic(v) => v.as_int(),
            Self::Enum(v) => Ok(v.raw()),
            Self::Bitfield(v) => Ok(v.get_attributes_values()),
            Self::Link(v) => Ok(v.as_index()),
            Self::Struct(v) => v.coerce_first_int().ok_or(Error::KindMismatch {
                expected: "integer-like",
                found: "struct",
            }),
            Self::Array(_) => Err(Error::KindMismatch {
                expected: "integer-like",
                found: "array",
            }),
        }
    }

    // capability checks, backed by the schema's load-time closure flags

    pub(crate) fn can_have_links(&self, schema: &Schema) -> bool {
        match self {
            Self::Link(_) => true,
            Self::Struct(v) => schema.type_has_links(v.type_id()),
            Self::Array(v) => v.elems_have_links(schema),
            _ => false,
        }
    }

    pub(crate) fn can_have_refs(&self, schema: &Schema) -> bool {
        match self {
            Self::Link(v) => v.kind() == crate::schema::LinkKind::Ref,
            Self::Struct(v) => schema.type_has_refs(v.type_id()),
            Self::Array(v) => v.elems_have_refs(schema),
            _ => false,
        }
    }

    pub(crate) fn can_have_strings(&self, schema: &Schema) -> bool {
        match self {
            Self::Basic(v) => matches!(
                v,
                BasicValue::ZString(_) | BasicValue::SizedString(_) | BasicValue::FixedString { .. }
            ),
            Self::Struct(v) => schema.type_has_strings(v.type_id()),
            Self::Array(v) => v.elems_have_strings(schema),
            _ => false,
        }
    }

    pub(crate) fn collect_links(&self, ctx: &Context<'_>, out: &mut Vec<BlockId>) -> Result<()> {
        match self {
            Self::Link(v) => {
                if let Some(block) = v.block() {
                    out.push(block);
                }
                Ok(())
            }
            Self::Struct(v) => v.get_links(ctx, out),
            Self::Array(v) => v.collect_links(ctx, out),
            _ => Ok(()),
        }
    }

    pub(crate) fn collect_refs(&self, ctx: &Context<'_>, out: &mut Vec<BlockId>) -> Result<()> {
        match self {
            Self::Link(v) => {
                if v.kind() == crate::schema::LinkKind::Ref {
                    if let Some(block) = v.block() {
                        out.push(block);
                    }
                }
                Ok(())
            }
            Self::Struct(v) => v.get_refs(ctx, out),
            Self::Array(v) => v.collect_refs(ctx, out),
            _ => Ok(()),
        }
    }

    pub(crate) fn collect_strings(&self, ctx: &Context<'_>, out: &mut Vec<String>) -> Result<()> {
        match self {
            Self::Basic(v) => {
                if let Some(s) = v.str_value() {
                    out.push(s);
                }
                Ok(())
            }
            Self::Struct(v) => v.get_strings(ctx, out),
            Self::Array(v) => v.collect_strings(ctx, out),
            _ => Ok(()),
        }
    }

    pub(crate) fn fix_links_into(
        &mut self,
        ctx: &Context<'_>,
        report: &mut FixupReport,
    ) -> Result<()> {
        match self {
            Self::Link(v) => {
                v.fix(ctx.block_table()?, report);
                Ok(())
            }
            Self::Struct(v) => v.fix_links_into(ctx, report),
            Self::Array(v) => v.fix_links_into(ctx, report),
            _ => Ok(()),
        }
    }

    pub(crate) fn replace_links(
        &mut self,
        ctx: &Context<'_>,
        old: BlockId,
        new: Option<BlockId>,
    ) -> Result<()> {
        match self {
            Self::Link(v) => {
                v.replace(old, new);
                Ok(())
            }
            Self::Struct(v) => v.replace_links(ctx, old, new),
            Self::Array(v) => v.replace_links(ctx, old, new),
            _ => Ok(()),
        }
    }

    /// Structural assignment between two values of the same shape.
    pub(crate) fn copy_value(dst: &mut Value, src: &Value, ctx: &Context<'_>) -> Result<()> {
        match (dst, src) {
            (Value::Struct(a), Value::Struct(b)) => a.deep_copy(b, ctx),
            (Value::Array(a), Value::Array(b)) => a.copy_from(b, ctx),
            (Value::Basic(a), Value::Basic(b)) if a.kind_name() == b.kind_name() => {
                *a = b.clone();
                Ok(())
            }
            (Value::Enum(a), Value::Enum(b)) if a.type_id() == b.type_id() => {
                *a = b.clone();
                Ok(())
            }
            (Value::Bitfield(a), Value::Bitfield(b)) if a.type_id() == b.type_id() => {
                *a = b.clone();
                Ok(())
            }
            (Value::Link(a), Value::Link(b)) => {
                *a = b.clone();
                Ok(())
            }
            (dst, src) => Err(Error::KindMismatch {
                expected: dst.kind_name(),
                found: src.kind_name(),
            }),
        }
    }

    /// Convenience accessor for basic values.
    pub fn as_basic(&self) -> Option<&BasicValue> {
        match self {
            Self::Basic(v) => Some(v),
            _ => None,
        }
    }

    /// Convenience mutable accessor for basic values.
    pub fn as_basic_mut(&mut self) -> Option<&mut BasicValue> {
        match self {
            Self::Basic(v) => Some(v),
            _ => None,
        }
    }

    /// Convenience accessor for enums.
    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Self::Enum(v) => Some(v),
            _ => None,
        }
    }

    /// Convenience mutable accessor for enums.
    pub fn as_enum_mut(&mut self) -> Option<&mut EnumValue> {
        match self {
            Self::Enum(v) => Some(v),
            _ => None,
        }
    }

    /// Convenience accessor for bitfields.
    pub fn as_bitfield(&self) -> Option<&BitfieldValue> {
        match self {
            Self::Bitfield(v) => Some(v),
            _ => None,
        }
    }

    /// Convenience mutable accessor for bitfields.
    pub fn as_bitfield_mut(&mut self) -> Option<&mut BitfieldValue> {
        match self {
            Self::Bitfield(v) => Some(v),
            _ => None,
        }
    }

    /// Convenience accessor for arrays.
    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Convenience mutable accessor for arrays.
    pub fn as_array_mut(&mut self) -> Option<&mut ArrayValue> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Convenience accessor for nested structs.
    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Self::Struct(v) => Some(v),
            _ => None,
        }
    }

    /// Convenience mutable accessor for nested structs.
    pub fn as_struct_mut(&mut self) -> Option<&mut StructValue> {
        match self {
            Self::Struct(v) => Some(v),
            _ => None,
        }
    }

    /// Convenience accessor for links.
    pub fn as_link(&self) -> Option<&LinkValue> {
        match self {
            Self::Link(v) => Some(v),
            _ => None,
        }
    }

    /// Convenience mutable accessor for links.
    pub fn as_link_mut(&mut self) -> Option<&mut LinkValue> {
        match self {
            Self::Link(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic(v) => write!(f, "{v}"),
            Self::Enum(v) => write!(f, "{v}"),
            Self::Bitfield(v) => write!(f, "{v}"),
            Self::Array(v) => write!(f, "{v}"),
            Self::Struct(v) => write!(f, "{v}"),
            Self::Link(v) => write!(f, "{v}"),
        }
    }
}

/// Read an integer of the given kind, sign-extended into i64.
pub(crate) fn read_int_kind(
    r: &mut BinaryReader<'_>,
    order: Endian,
    kind: IntKind,
) -> Result<i64> {
    Ok(match kind {
        IntKind::U8 => r.read_u8()? as i64,
        IntKind::I8 => r.read_i8()? as i64,
        IntKind::U16 => r.read_u16(order)? as i64,
        IntKind::I16 => r.read_i16(order)? as i64,
        IntKind::U32 => r.read_u32(order)? as i64,
        IntKind::I32 => r.read_i32(order)? as i64,
        IntKind::U64 => r.read_u64(order)? as i64,
        IntKind::I64 => r.read_i64(order)?,
    })
}

/// Write an integer of the given kind.
pub(crate) fn write_int_kind(w: &mut BinaryWriter, order: Endian, kind: IntKind, value: i64) {
    match kind {
        IntKind::U8 => w.write_u8(value as u8),
        IntKind::I8 => w.write_i8(value as i8),
        IntKind::U16 => w.write_u16(value as u16, order),
        IntKind::I16 => w.write_i16(value as i16, order),
        IntKind::U32 => w.write_u32(value as u32, order),
        IntKind::I32 => w.write_i32(value as i32, order),
        IntKind::U64 => w.write_u64(value as u64, order),
        IntKind::I64 => w.write_i64(value, order),
    }
}
