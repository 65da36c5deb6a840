//! Struct instances: the engine's structural operations.
//!
//! A [`StructValue`] holds one owned sub-value per attribute in its type's
//! flattened descriptor list. All structural operations — read, write,
//! size, hash, link collection, fix-up, replacement — walk that list
//! through one shared filter ([`StructValue::attr_active`]'s logic), which
//! is what guarantees read/write symmetry: the order and membership of
//! active attributes is identical for every operation given the same
//! context.
//!
//! During `read` the filter is evaluated lazily per attribute, so a
//! condition over a sibling field sees the sibling's freshly-read value;
//! this is also why runtime arguments are resolved per-attribute instead
//! of being precomputed.

use std::hash::Hasher;

use rustc_hash::FxHasher;
use skein_common::{BinaryReader, BinaryWriter};

use crate::document::{BlockId, Context, FixupReport};
use crate::expr::{ExprScope, ScopeValue};
use crate::schema::{ArgSource, AttributeDescriptor, DefaultValue, Schema, TypeId, TypeRef};
use crate::value::{ArrayValue, BasicValue, ElemSpec, Value};
use crate::{Error, Result};

/// A live struct instance.
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    ty: TypeId,
    /// Live template binding for generic types.
    template: Option<TypeId>,
    /// Runtime argument, available to expressions as `arg`.
    argument: i64,
    /// One value per flattened attribute, in declaration order.
    slots: Vec<Value>,
}

/// Expression scope over a struct instance: attribute lookup by canonical
/// name, with nested structs opening as nested scopes.
pub(crate) struct InstanceScope<'a> {
    pub schema: &'a Schema,
    pub value: &'a StructValue,
}

impl ExprScope for InstanceScope<'_> {
    fn attr(&self, name: &str) -> Option<ScopeValue<'_>> {
        let def = self.schema.struct_def(self.value.ty).ok()?;
        let slot = def.slot(name)?;
        match &self.value.slots[slot] {
            Value::Struct(nested) => Some(ScopeValue::Scope(Box::new(InstanceScope {
                schema: self.schema,
                value: nested,
            }))),
            other => other.as_int().ok().map(ScopeValue::Int),
        }
    }

    fn argument(&self) -> Option<i64> {
        Some(self.value.argument)
    }

    fn coerce_int(&self) -> Option<i64> {
        self.value.coerce_first_int()
    }
}

impl StructValue {
    /// Default-initialize an instance of a struct type.
    ///
    /// Every attribute is constructed in declaration order (base-class
    /// attributes first); `template` binds the generic placeholder where
    /// the type needs one, and `argument` becomes the instance's `arg`.
    /// Declared defaults are applied after construction.
    pub fn new(
        schema: &Schema,
        ty: TypeId,
        template: Option<TypeId>,
        argument: i64,
    ) -> Result<Self> {
        let def = schema.struct_def(ty)?;
        let mut slots = Vec::with_capacity(def.attributes().len());
        for attr in def.attributes() {
            let elem_ty = resolve_ref(&attr.ty, template, &def.name, &attr.name)?;
            let elem_template = match &attr.template {
                None => None,
                Some(r) => Some(resolve_ref(r, template, &def.name, &attr.name)?),
            };
            let arg = match &attr.arg {
                Some(ArgSource::Literal(v)) => *v,
                // sibling-referencing arguments resolve at read time
                _ => 0,
            };
            let mut value = if attr.is_array() {
                Value::Array(ArrayValue::new(
                    ElemSpec {
                        ty: elem_ty,
                        template: elem_template,
                        arg,
                    },
                    attr.dim2.is_some(),
                ))
            } else {
                Value::of_type(schema, elem_ty, elem_template, arg)?
            };
            if let Some(default) = &attr.default {
                apply_default(schema, &def.name, &attr.name, &mut value, default)?;
            }
            slots.push(value);
        }
        Ok(Self {
            ty,
            template,
            argument,
            slots,
        })
    }

    /// The instance's struct type.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.ty
    }

    /// The live template binding.
    #[inline]
    pub fn template(&self) -> Option<TypeId> {
        self.template
    }

    /// The runtime argument.
    #[inline]
    pub fn argument(&self) -> i64 {
        self.argument
    }

    /// Set the runtime argument.
    pub fn set_argument(&mut self, argument: i64) {
        self.argument = argument;
    }

    /// Get an attribute value by canonical name.
    pub fn get<'v>(&'v self, schema: &Schema, name: &str) -> Option<&'v Value> {
        let def = schema.struct_def(self.ty).ok()?;
        def.slot(name).map(|i| &self.slots[i])
    }

    /// Get an attribute value mutably by canonical name.
    pub fn get_mut<'v>(&'v mut self, schema: &Schema, name: &str) -> Option<&'v mut Value> {
        let def = schema.struct_def(self.ty).ok()?;
        def.slot(name).map(move |i| &mut self.slots[i])
    }

    /// All attribute slots in declaration order.
    pub fn slots(&self) -> &[Value] {
        &self.slots
    }

    /// Integer value of an attribute.
    pub fn attr_int(&self, schema: &Schema, name: &str) -> Result<i64> {
        self.get(schema, name)
            .ok_or_else(|| self.unknown_attr(schema, name))?
            .as_int()
    }

    /// Set an integer-backed attribute (integer, float, enum, bitfield).
    pub fn set_int(&mut self, schema: &Schema, name: &str, value: i64) -> Result<()> {
        let err = self.unknown_attr(schema, name);
        match self.get_mut(schema, name).ok_or(err)? {
            Value::Basic(b) => b.set_int(value),
            Value::Enum(e) => e.set_value(schema, value),
            Value::Bitfield(bf) => {
                bf.populate_attribute_values(value);
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: "integer-like",
                found: other.kind_name(),
            }),
        }
    }

    /// Set a string-backed attribute.
    pub fn set_str(&mut self, schema: &Schema, name: &str, value: &str) -> Result<()> {
        let err = self.unknown_attr(schema, name);
        match self.get_mut(schema, name).ok_or(err)? {
            Value::Basic(b) => b.set_string(value),
            other => Err(Error::KindMismatch {
                expected: "string",
                found: other.kind_name(),
            }),
        }
    }

    /// Point a link attribute at a block (or null), bypassing the
    /// raw-index phase entirely.
    pub fn set_link(
        &mut self,
        schema: &Schema,
        name: &str,
        block: Option<BlockId>,
    ) -> Result<()> {
        let err = self.unknown_attr(schema, name);
        match self.get_mut(schema, name).ok_or(err)? {
            Value::Link(l) => {
                l.set_block(block);
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: "link",
                found: other.kind_name(),
            }),
        }
    }

    fn unknown_attr(&self, schema: &Schema, name: &str) -> Error {
        Error::UnknownAttribute {
            type_name: schema.name(self.ty).to_string(),
            attr: name.to_string(),
        }
    }

    pub(crate) fn coerce_first_int(&self) -> Option<i64> {
        self.slots.first().and_then(|v| v.as_int().ok())
    }

    /// The single attribute filter shared by every structural operation.
    ///
    /// An attribute is active when the context version lies within its
    /// version range, the user version matches (if constrained), its
    /// `vercond` holds against the document scope, and its `cond` holds
    /// against this instance.
    fn attr_active(&self, attr: &AttributeDescriptor, ctx: &Context<'_>) -> Result<bool> {
        if let Some(min) = attr.ver_min {
            if ctx.version < min {
                return Ok(false);
            }
        }
        if let Some(max) = attr.ver_max {
            if ctx.version > max {
                return Ok(false);
            }
        }
        if let Some(uv) = attr.user_version {
            if ctx.user_version != uv {
                return Ok(false);
            }
        }
        if let Some(vercond) = &attr.vercond {
            if !vercond.eval_bool(ctx)? {
                return Ok(false);
            }
        }
        if let Some(cond) = &attr.cond {
            let scope = InstanceScope {
                schema: ctx.schema,
                value: self,
            };
            if !cond.eval_bool(&scope)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The ordered, filtered attribute list active under this context.
    pub fn filtered_attributes<'s>(
        &self,
        ctx: &Context<'s>,
    ) -> Result<Vec<&'s AttributeDescriptor>> {
        let def = ctx.schema.struct_def(self.ty)?;
        let mut out = Vec::new();
        for attr in def.attributes() {
            if self.attr_active(attr, ctx)? {
                out.push(attr);
            }
        }
        Ok(out)
    }

    /// Slot indices of active attributes, optionally restricted by a
    /// per-slot predicate evaluated before mutation begins.
    fn active_slots(
        &self,
        ctx: &Context<'_>,
        keep: impl Fn(&Value) -> bool,
    ) -> Result<Vec<usize>> {
        let def = ctx.schema.struct_def(self.ty)?;
        let mut out = Vec::new();
        for (i, attr) in def.attributes().iter().enumerate() {
            if self.attr_active(attr, ctx)? && keep(&self.slots[i]) {
                out.push(i);
            }
        }
        Ok(out)
    }

    fn resolve_arg(&self, attr: &AttributeDescriptor, ctx: &Context<'_>) -> Result<i64> {
        match &attr.arg {
            None => Ok(0),
            Some(ArgSource::Literal(v)) => Ok(*v),
            Some(ArgSource::Attr(name)) => self.attr_int(ctx.schema, name),
        }
    }

    fn eval_dim(&self, expr: &crate::expr::Expression, ctx: &Context<'_>) -> Result<usize> {
        let scope = InstanceScope {
            schema: ctx.schema,
            value: self,
        };
        let n = expr.eval(&scope)?;
        usize::try_from(n).map_err(|_| Error::ValueRange {
            kind: "array dimension".into(),
            value: n.to_string(),
        })
    }

    /// Re-evaluate an array attribute's dimension expressions and resize
    /// its container, preserving surviving elements. Must be called after
    /// changing a controlling count attribute; nothing resizes implicitly.
    pub fn update_array(&mut self, ctx: &Context<'_>, name: &str) -> Result<()> {
        let def = ctx.schema.struct_def(self.ty)?;
        let slot = def
            .slot(name)
            .ok_or_else(|| self.unknown_attr(ctx.schema, name))?;
        let attr = &def.attributes()[slot];
        let dim1 = match &attr.dim1 {
            Some(e) => e,
            None => {
                return Err(Error::KindMismatch {
                    expected: "array",
                    found: "scalar",
                })
            }
        };
        let rows = self.eval_dim(dim1, ctx)?;
        let cols = match &attr.dim2 {
            Some(e) => Some(self.eval_dim(e, ctx)?),
            None => None,
        };
        match &mut self.slots[slot] {
            Value::Array(a) => a.resize_rows(ctx.schema, rows, cols),
            other => Err(Error::KindMismatch {
                expected: "array",
                found: other.kind_name(),
            }),
        }
    }

    /// Overwrite this instance from the stream in declaration order.
    ///
    /// Each active attribute resolves its runtime argument (possibly from
    /// a sibling read moments earlier) and array attributes size
    /// themselves from their dimension expressions before reading.
    pub fn read(&mut self, r: &mut BinaryReader<'_>, ctx: &Context<'_>) -> Result<()> {
        let def = ctx.schema.struct_def(self.ty)?;
        for (i, attr) in def.attributes().iter().enumerate() {
            if !self.attr_active(attr, ctx)? || attr.is_abstract {
                continue;
            }
            let arg = self.resolve_arg(attr, ctx)?;
            if attr.is_array() {
                let rows = match &attr.dim1 {
                    Some(e) => self.eval_dim(e, ctx)?,
                    None => unreachable!("is_array implies dim1"),
                };
                let cols = match &attr.dim2 {
                    Some(e) => Some(self.eval_dim(e, ctx)?),
                    None => None,
                };
                match &mut self.slots[i] {
                    Value::Array(a) => {
                        a.resize_rows(ctx.schema, rows, cols)?;
                        a.read_elems(r, ctx, arg)?;
                    }
                    other => {
                        return Err(Error::KindMismatch {
                            expected: "array",
                            found: other.kind_name(),
                        })
                    }
                }
            } else {
                self.slots[i].read(r, ctx, arg)?;
            }
        }
        Ok(())
    }

    /// Serialize this instance, producing exactly the byte layout `read`
    /// consumes for the same context and state.
    pub fn write(&self, w: &mut BinaryWriter, ctx: &Context<'_>) -> Result<()> {
        let def = ctx.schema.struct_def(self.ty)?;
        for (i, attr) in def.attributes().iter().enumerate() {
            if !self.attr_active(attr, ctx)? || attr.is_abstract {
                continue;
            }
            self.slots[i].write(w, ctx)?;
        }
        Ok(())
    }

    /// Serialized size of the active, non-abstract attributes.
    pub fn size(&self, ctx: &Context<'_>) -> Result<u64> {
        let def = ctx.schema.struct_def(self.ty)?;
        let mut total = 0;
        for (i, attr) in def.attributes().iter().enumerate() {
            if !self.attr_active(attr, ctx)? || attr.is_abstract {
                continue;
            }
            total += self.slots[i].size(ctx)?;
        }
        Ok(total)
    }

    /// Feed every active attribute (abstract included — bookkeeping
    /// fields still participate in structural equality) into a hasher.
    pub(crate) fn feed_hash(&self, ctx: &Context<'_>, state: &mut dyn Hasher) -> Result<()> {
        let def = ctx.schema.struct_def(self.ty)?;
        for (i, attr) in def.attributes().iter().enumerate() {
            if !self.attr_active(attr, ctx)? {
                continue;
            }
            self.slots[i].feed_hash(ctx, state)?;
        }
        Ok(())
    }

    /// Structural hash over the filtered attributes.
    pub fn get_hash(&self, ctx: &Context<'_>) -> Result<u64> {
        let mut hasher = FxHasher::default();
        self.feed_hash(ctx, &mut hasher)?;
        Ok(hasher.finish())
    }

    /// Collect resolved links (refs and back-pointers) in declaration
    /// order, recursing only into values whose types can hold links.
    pub fn get_links(&self, ctx: &Context<'_>, out: &mut Vec<BlockId>) -> Result<()> {
        let def = ctx.schema.struct_def(self.ty)?;
        for (i, attr) in def.attributes().iter().enumerate() {
            if !self.attr_active(attr, ctx)? {
                continue;
            }
            let slot = &self.slots[i];
            if slot.can_have_links(ctx.schema) {
                slot.collect_links(ctx, out)?;
            }
        }
        Ok(())
    }

    /// Collect resolved downward refs in declaration order.
    pub fn get_refs(&self, ctx: &Context<'_>, out: &mut Vec<BlockId>) -> Result<()> {
        let def = ctx.schema.struct_def(self.ty)?;
        for (i, attr) in def.attributes().iter().enumerate() {
            if !self.attr_active(attr, ctx)? {
                continue;
            }
            let slot = &self.slots[i];
            if slot.can_have_refs(ctx.schema) {
                slot.collect_refs(ctx, out)?;
            }
        }
        Ok(())
    }

    /// Collect string contents in declaration order.
    pub fn get_strings(&self, ctx: &Context<'_>, out: &mut Vec<String>) -> Result<()> {
        let def = ctx.schema.struct_def(self.ty)?;
        for (i, attr) in def.attributes().iter().enumerate() {
            if !self.attr_active(attr, ctx)? {
                continue;
            }
            let slot = &self.slots[i];
            if slot.can_have_strings(ctx.schema) {
                slot.collect_strings(ctx, out)?;
            }
        }
        Ok(())
    }

    /// Resolve raw link indices against the context's block table.
    /// Idempotent; unresolvable indices are nulled and reported.
    pub fn fix_links(&mut self, ctx: &Context<'_>) -> Result<FixupReport> {
        let mut report = FixupReport::default();
        self.fix_links_into(ctx, &mut report)?;
        Ok(report)
    }

    pub(crate) fn fix_links_into(
        &mut self,
        ctx: &Context<'_>,
        report: &mut FixupReport,
    ) -> Result<()> {
        let targets = self.active_slots(ctx, |v| v.can_have_links(ctx.schema))?;
        for i in targets {
            self.slots[i].fix_links_into(ctx, report)?;
        }
        Ok(())
    }

    /// Replace every resolved reference to `old` with `new` (`None`
    /// nulls the reference). Does not recurse into values that cannot
    /// hold links.
    pub fn replace_links(
        &mut self,
        ctx: &Context<'_>,
        old: BlockId,
        new: Option<BlockId>,
    ) -> Result<()> {
        let targets = self.active_slots(ctx, |v| v.can_have_links(ctx.schema))?;
        for i in targets {
            self.slots[i].replace_links(ctx, old, new)?;
        }
        Ok(())
    }

    /// Structural copy from another instance whose class is an ancestor
    /// or descendant of this one's.
    ///
    /// Every attribute of the more derived of the two types that both
    /// instances carry is copied, recursing into nested structs and
    /// arrays (arrays resize first) and assigning leaves directly.
    pub fn deep_copy(&mut self, other: &StructValue, ctx: &Context<'_>) -> Result<()> {
        let schema = ctx.schema;
        let derived = schema
            .more_derived(self.ty, other.ty)
            .ok_or_else(|| Error::TypeMismatch {
                from: schema.name(other.ty).to_string(),
                to: schema.name(self.ty).to_string(),
            })?;
        let derived_def = schema.struct_def(derived)?;
        let self_def = schema.struct_def(self.ty)?;
        let other_def = schema.struct_def(other.ty)?;
        for attr in derived_def.attributes() {
            let (Some(dst), Some(src)) = (self_def.slot(&attr.name), other_def.slot(&attr.name))
            else {
                continue;
            };
            let src_value = &other.slots[src];
            Value::copy_value(&mut self.slots[dst], src_value, ctx)?;
        }
        Ok(())
    }
}

fn resolve_ref(
    r: &TypeRef,
    template: Option<TypeId>,
    type_name: &str,
    attr_name: &str,
) -> Result<TypeId> {
    match r {
        TypeRef::Concrete(id) => Ok(*id),
        TypeRef::Template => template.ok_or_else(|| Error::UnboundTemplate {
            type_name: type_name.to_string(),
            attr: attr_name.to_string(),
        }),
    }
}

fn apply_default(
    schema: &Schema,
    type_name: &str,
    attr_name: &str,
    value: &mut Value,
    default: &DefaultValue,
) -> Result<()> {
    let misapplied = || Error::Schema {
        type_name: type_name.to_string(),
        reason: format!("default not applicable to attribute {attr_name}"),
    };
    match (value, default) {
        (Value::Basic(b), DefaultValue::Int(v)) => match b {
            BasicValue::ZString(_)
            | BasicValue::SizedString(_)
            | BasicValue::FixedString { .. }
            | BasicValue::Blob(_) => Err(misapplied()),
            _ => b.set_int(*v),
        },
        (Value::Basic(b), DefaultValue::Float(f)) => b.set_f64(*f as f64),
        (Value::Basic(b), DefaultValue::Str(s)) => b.set_string(s),
        (Value::Enum(e), DefaultValue::Int(v)) => e.set_value(schema, *v),
        (Value::Bitfield(bf), DefaultValue::Int(v)) => {
            bf.populate_attribute_values(*v);
            Ok(())
        }
        _ => Err(misapplied()),
    }
}

impl std::fmt::Display for StructValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<struct {} attrs>", self.slots.len())
    }
}
