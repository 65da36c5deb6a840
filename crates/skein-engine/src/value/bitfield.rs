//! Bitfield values: named sub-fields packed into one integer.

use std::hash::Hasher;

use skein_common::{BinaryReader, BinaryWriter, Endian};

use crate::schema::{IntKind, Schema, TypeId};
use crate::value::{read_int_kind, write_int_kind};
use crate::{Error, Result};

/// A bitfield value.
///
/// Storage is a single integer of the declared width; sub-fields occupy
/// consecutive bits starting at the least-significant end, in member
/// declaration order. Decomposition and recomposition are exact inverses
/// for every raw value within the declared widths.
#[derive(Debug, Clone, PartialEq)]
pub struct BitfieldValue {
    ty: TypeId,
    storage: IntKind,
    widths: Vec<u32>,
    fields: Vec<i64>,
}

impl BitfieldValue {
    pub(crate) fn new(ty: TypeId, storage: IntKind, widths: Vec<u32>) -> Self {
        let fields = vec![0; widths.len()];
        Self {
            ty,
            storage,
            widths,
            fields,
        }
    }

    /// The bitfield type this value belongs to.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.ty
    }

    /// Number of sub-fields.
    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Decompose a raw integer into the sub-field values.
    pub fn populate_attribute_values(&mut self, raw: i64) {
        let mut rest = raw as u64;
        for (field, width) in self.fields.iter_mut().zip(&self.widths) {
            let mask = mask_for(*width);
            *field = (rest & mask) as i64;
            rest >>= width;
        }
    }

    /// Recompose the sub-field values into one raw integer. Exact inverse
    /// of [`populate_attribute_values`](Self::populate_attribute_values).
    pub fn get_attributes_values(&self) -> i64 {
        let mut acc: u64 = 0;
        let mut shift = 0u32;
        for (field, width) in self.fields.iter().zip(&self.widths) {
            acc |= ((*field as u64) & mask_for(*width)) << shift;
            shift += width;
        }
        acc as i64
    }

    /// Get a sub-field by index.
    pub fn field(&self, index: usize) -> Option<i64> {
        self.fields.get(index).copied()
    }

    /// Get a sub-field by canonical name.
    pub fn field_by_name(&self, schema: &Schema, name: &str) -> Result<i64> {
        let def = schema.bitfield_def(self.ty)?;
        def.member_index(name)
            .and_then(|i| self.field(i))
            .ok_or_else(|| Error::UnknownAttribute {
                type_name: def.name.clone(),
                attr: name.to_string(),
            })
    }

    /// Set a sub-field by index, validating the value fits its width.
    pub fn set_field(&mut self, index: usize, value: i64) -> Result<()> {
        let width = *self.widths.get(index).ok_or(Error::ValueRange {
            kind: "bitfield member index".into(),
            value: index.to_string(),
        })?;
        if value < 0 || (value as u64) > mask_for(width) {
            return Err(Error::ValueRange {
                kind: format!("{width}-bit field"),
                value: value.to_string(),
            });
        }
        self.fields[index] = value;
        Ok(())
    }

    /// Set a sub-field by canonical name.
    pub fn set_field_by_name(&mut self, schema: &Schema, name: &str, value: i64) -> Result<()> {
        let def = schema.bitfield_def(self.ty)?;
        match def.member_index(name) {
            Some(i) => self.set_field(i, value),
            None => Err(Error::UnknownAttribute {
                type_name: def.name.clone(),
                attr: name.to_string(),
            }),
        }
    }

    pub(crate) fn read(&mut self, r: &mut BinaryReader<'_>, order: Endian) -> Result<()> {
        let raw = read_int_kind(r, order, self.storage)?;
        self.populate_attribute_values(raw);
        Ok(())
    }

    pub(crate) fn write(&self, w: &mut BinaryWriter, order: Endian) {
        write_int_kind(w, order, self.storage, self.get_attributes_values());
    }

    pub fn size(&self) -> u64 {
        self.storage.size()
    }

    pub(crate) fn feed_hash(&self, state: &mut dyn Hasher) {
        state.write_i64(self.get_attributes_values());
    }
}

fn mask_for(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl std::fmt::Display for BitfieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.get_attributes_values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BitfieldValue {
        // a:3 bits, b:1 bit in one byte
        BitfieldValue::new(TypeId(0), IntKind::U8, vec![3, 1])
    }

    #[test]
    fn test_populate_then_recompose_seed_case() {
        let mut v = sample();
        v.populate_attribute_values(9); // binary 1001
        assert_eq!(v.field(0), Some(1));
        assert_eq!(v.field(1), Some(1));
        assert_eq!(v.get_attributes_values(), 9);
    }

    #[test]
    fn test_round_trip_all_representable() {
        let mut v = sample();
        for raw in 0..16i64 {
            v.populate_attribute_values(raw);
            assert_eq!(v.get_attributes_values(), raw, "raw {raw}");
        }
    }

    #[test]
    fn test_set_field_width_check() {
        let mut v = sample();
        assert!(v.set_field(0, 7).is_ok());
        assert!(v.set_field(0, 8).is_err());
        assert!(v.set_field(1, 1).is_ok());
        assert!(v.set_field(1, 2).is_err());
    }

    #[test]
    fn test_io_round_trip() {
        let mut v = sample();
        v.set_field(0, 5).unwrap();
        v.set_field(1, 1).unwrap();
        let mut w = BinaryWriter::new();
        v.write(&mut w, Endian::Little);
        assert_eq!(w.bytes(), [0b1101]);

        let bytes = w.into_bytes();
        let mut other = sample();
        let mut r = BinaryReader::new(&bytes);
        other.read(&mut r, Endian::Little).unwrap();
        assert_eq!(other, v);
    }
}
