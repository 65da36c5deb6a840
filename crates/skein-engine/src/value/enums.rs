//! Enum values: integer storage restricted to a symbol table.

use std::hash::Hasher;

use skein_common::{BinaryReader, BinaryWriter, Endian};

use crate::schema::{IntKind, Schema, TypeId};
use crate::value::{read_int_kind, write_int_kind};
use crate::{Error, Result};

/// An enum-typed value.
///
/// Reads are tolerant: on-disk data may legally contain values unknown to
/// the current schema revision, so an out-of-table integer is kept as-is
/// and flagged by [`describe`](Self::describe) rather than rejected.
/// `set_value` does validate, so programmatic writes stay in-table.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    ty: TypeId,
    storage: IntKind,
    value: i64,
}

impl EnumValue {
    pub(crate) fn new(ty: TypeId, storage: IntKind) -> Self {
        Self {
            ty,
            storage,
            value: 0,
        }
    }

    /// The enum type this value belongs to.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.ty
    }

    /// The raw stored integer.
    #[inline]
    pub fn raw(&self) -> i64 {
        self.value
    }

    /// Whether the stored integer is in the symbol table.
    pub fn is_valid(&self, schema: &Schema) -> bool {
        schema
            .enum_def(self.ty)
            .map(|def| def.symbol(self.value).is_some())
            .unwrap_or(false)
    }

    /// Set the stored integer, validating table membership.
    pub fn set_value(&mut self, schema: &Schema, value: i64) -> Result<()> {
        let def = schema.enum_def(self.ty)?;
        if def.symbol(value).is_none() {
            return Err(Error::ValueRange {
                kind: format!("enum {}", def.name),
                value: value.to_string(),
            });
        }
        self.value = value;
        Ok(())
    }

    /// Set by symbolic name.
    pub fn set_by_name(&mut self, schema: &Schema, name: &str) -> Result<()> {
        let def = schema.enum_def(self.ty)?;
        match def.value_of(name) {
            Some(v) => {
                self.value = v;
                Ok(())
            }
            None => Err(Error::ValueRange {
                kind: format!("enum {}", def.name),
                value: name.to_string(),
            }),
        }
    }

    /// Symbolic rendering: the option name, or an explicit
    /// `INVALID(<value>)` marker for out-of-table integers.
    pub fn describe(&self, schema: &Schema) -> String {
        match schema.enum_def(self.ty).ok().and_then(|d| d.symbol(self.value)) {
            Some(name) => name.to_string(),
            None => format!("INVALID({})", self.value),
        }
    }

    pub(crate) fn read(&mut self, r: &mut BinaryReader<'_>, order: Endian) -> Result<()> {
        self.value = read_int_kind(r, order, self.storage)?;
        Ok(())
    }

    pub(crate) fn write(&self, w: &mut BinaryWriter, order: Endian) {
        write_int_kind(w, order, self.storage, self.value);
    }

    pub fn size(&self) -> u64 {
        self.storage.size()
    }

    pub(crate) fn feed_hash(&self, state: &mut dyn Hasher) {
        state.write_i64(self.value);
    }
}

impl std::fmt::Display for EnumValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}
