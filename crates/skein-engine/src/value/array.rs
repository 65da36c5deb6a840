//! Homogeneous arrays of any value type.

use std::hash::Hasher;

use skein_common::{BinaryReader, BinaryWriter};

use crate::document::{BlockId, Context, FixupReport};
use crate::schema::{Schema, TypeId};
use crate::value::Value;
use crate::Result;

/// Element construction recipe shared by every slot of an array.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ElemSpec {
    pub ty: TypeId,
    pub template: Option<TypeId>,
    pub arg: i64,
}

/// A one- or two-dimensional homogeneous sequence.
///
/// The backing storage never resizes implicitly: the owner evaluates the
/// declared dimension expressions and calls `resize_rows` (directly or via
/// `update_array` on the owning struct) whenever a controlling count
/// changes. Growing constructs fresh default elements; shrinking drops
/// trailing elements; surviving indices keep their values.
///
/// A 2-D array is stored as rows of inner 1-D arrays, read and written in
/// row-major index order.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    elem: ElemSpec,
    matrix: bool,
    items: Vec<Value>,
}

impl ArrayValue {
    pub(crate) fn new(elem: ElemSpec, matrix: bool) -> Self {
        Self {
            elem,
            matrix,
            items: Vec::new(),
        }
    }

    /// Number of elements (rows, for a 2-D array).
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the array holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Element type of the array.
    #[inline]
    pub fn element_type(&self) -> TypeId {
        self.elem.ty
    }

    /// Whether this is a 2-D array.
    #[inline]
    pub fn is_matrix(&self) -> bool {
        self.matrix
    }

    /// Indexed element access.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Mutable indexed element access.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.items.get_mut(index)
    }

    /// All elements in index order.
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    fn new_element(&self, schema: &Schema) -> Result<Value> {
        if self.matrix {
            Ok(Value::Array(ArrayValue::new(self.elem.clone(), false)))
        } else {
            Value::of_type(schema, self.elem.ty, self.elem.template, self.elem.arg)
        }
    }

    /// Resize to `rows` elements, preserving surviving indices. For a 2-D
    /// array, `cols` additionally resizes every row.
    pub(crate) fn resize_rows(
        &mut self,
        schema: &Schema,
        rows: usize,
        cols: Option<usize>,
    ) -> Result<()> {
        while self.items.len() < rows {
            let elem = self.new_element(schema)?;
            self.items.push(elem);
        }
        self.items.truncate(rows);
        if self.matrix {
            if let Some(cols) = cols {
                for row in &mut self.items {
                    if let Value::Array(inner) = row {
                        inner.resize_rows(schema, cols, None)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Read every element in index order. The array must already be
    /// sized; `arg` is forwarded to each element.
    pub(crate) fn read_elems(
        &mut self,
        r: &mut BinaryReader<'_>,
        ctx: &Context<'_>,
        arg: i64,
    ) -> Result<()> {
        for item in &mut self.items {
            match item {
                Value::Array(inner) => inner.read_elems(r, ctx, arg)?,
                other => other.read(r, ctx, arg)?,
            }
        }
        Ok(())
    }

    pub(crate) fn write(&self, w: &mut BinaryWriter, ctx: &Context<'_>) -> Result<()> {
        for item in &self.items {
            item.write(w, ctx)?;
        }
        Ok(())
    }

    pub(crate) fn size(&self, ctx: &Context<'_>) -> Result<u64> {
        let mut total = 0;
        for item in &self.items {
            total += item.size(ctx)?;
        }
        Ok(total)
    }

    pub(crate) fn feed_hash(&self, ctx: &Context<'_>, state: &mut dyn Hasher) -> Result<()> {
        state.write_usize(self.items.len());
        for item in &self.items {
            item.feed_hash(ctx, state)?;
        }
        Ok(())
    }

    /// Whether elements can transitively contain links. Computed from the
    /// schema's load-time capability flags, not by scanning elements.
    pub(crate) fn elems_have_links(&self, schema: &Schema) -> bool {
        schema.type_has_links(self.elem.ty)
    }

    pub(crate) fn elems_have_refs(&self, schema: &Schema) -> bool {
        schema.type_has_refs(self.elem.ty)
    }

    pub(crate) fn elems_have_strings(&self, schema: &Schema) -> bool {
        schema.type_has_strings(self.elem.ty)
    }

    pub(crate) fn collect_links(&self, ctx: &Context<'_>, out: &mut Vec<BlockId>) -> Result<()> {
        for item in &self.items {
            item.collect_links(ctx, out)?;
        }
        Ok(())
    }

    pub(crate) fn collect_refs(&self, ctx: &Context<'_>, out: &mut Vec<BlockId>) -> Result<()> {
        for item in &self.items {
            item.collect_refs(ctx, out)?;
        }
        Ok(())
    }

    pub(crate) fn collect_strings(&self, ctx: &Context<'_>, out: &mut Vec<String>) -> Result<()> {
        for item in &self.items {
            item.collect_strings(ctx, out)?;
        }
        Ok(())
    }

    pub(crate) fn fix_links_into(
        &mut self,
        ctx: &Context<'_>,
        report: &mut FixupReport,
    ) -> Result<()> {
        for item in &mut self.items {
            item.fix_links_into(ctx, report)?;
        }
        Ok(())
    }

    pub(crate) fn replace_links(
        &mut self,
        ctx: &Context<'_>,
        old: BlockId,
        new: Option<BlockId>,
    ) -> Result<()> {
        for item in &mut self.items {
            item.replace_links(ctx, old, new)?;
        }
        Ok(())
    }

    /// Structural copy: resize to the source length, then copy per index.
    pub(crate) fn copy_from(&mut self, other: &ArrayValue, ctx: &Context<'_>) -> Result<()> {
        self.resize_rows(ctx.schema, other.items.len(), None)?;
        for (dst, src) in self.items.iter_mut().zip(&other.items) {
            Value::copy_value(dst, src, ctx)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ArrayValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} elements]", self.items.len())
    }
}
