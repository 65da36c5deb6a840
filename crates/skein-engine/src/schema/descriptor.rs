//! Attribute descriptors: one record per declared field.

use crate::expr::Expression;
use crate::schema::TypeId;

/// A resolved type reference inside a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    /// A concrete type in the schema.
    Concrete(TypeId),
    /// The enclosing type's generic placeholder, bound at instantiation.
    Template,
}

/// Source of an attribute's runtime argument.
#[derive(Debug, Clone)]
pub enum ArgSource {
    /// A literal integer.
    Literal(i64),
    /// The current value of a sibling attribute (canonical name).
    Attr(String),
}

/// A parsed default value, applied after construction.
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Int(i64),
    Float(f32),
    Str(String),
}

/// An immutable description of one field of a structure.
///
/// Descriptors are created once at schema-load time; the flattened,
/// shadow-resolved list of a struct's descriptors defines the on-disk
/// field order for every operation.
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    /// Canonicalized field name (unique within the active set).
    pub name: String,
    /// The field's value type.
    pub ty: TypeRef,
    /// Template binding passed to the field's value, if any.
    pub template: Option<TypeRef>,
    /// Element count of a 1-D array (or row count of a 2-D array).
    pub dim1: Option<Expression>,
    /// Column count of a 2-D array.
    pub dim2: Option<Expression>,
    /// Inclusive lower version bound.
    pub ver_min: Option<u32>,
    /// Inclusive upper version bound.
    pub ver_max: Option<u32>,
    /// Exact user-version constraint.
    pub user_version: Option<u32>,
    /// Condition over the owning instance.
    pub cond: Option<Expression>,
    /// Condition over the top-level document scope.
    pub vercond: Option<Expression>,
    /// Runtime argument made available to the field's value.
    pub arg: Option<ArgSource>,
    /// Default applied after construction.
    pub default: Option<DefaultValue>,
    /// Bookkeeping-only field: present in iteration, skipped by
    /// read/write/size.
    pub is_abstract: bool,
}

impl AttributeDescriptor {
    /// Whether the descriptor declares an array.
    #[inline]
    pub fn is_array(&self) -> bool {
        self.dim1.is_some()
    }
}

/// One attribute row as handed over by an external schema parser.
///
/// Everything is still textual here: type names may be forward
/// references, dimensions and conditions are unparsed expression sources.
/// [`SchemaBuilder::finish`](crate::SchemaBuilder::finish) turns rows into
/// [`AttributeDescriptor`]s.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttrSpec {
    pub name: String,
    /// Type name, or `"TEMPLATE"` for the generic placeholder.
    pub ty: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub template: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub dim1: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub dim2: Option<String>,
    /// Dotted ("4.2.1.0") or plain decimal version bound.
    #[cfg_attr(feature = "serde", serde(default))]
    pub ver_min: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub ver_max: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub user_version: Option<u32>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub cond: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub vercond: Option<String>,
    /// Integer literal or sibling attribute name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub arg: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub default: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_abstract: bool,
}

impl AttrSpec {
    /// Start a row with just a name and a type.
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            ..Default::default()
        }
    }

    /// Set the template type name.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Declare a 1-D array sized by an expression.
    pub fn dim1(mut self, expr: impl Into<String>) -> Self {
        self.dim1 = Some(expr.into());
        self
    }

    /// Declare the second dimension of a 2-D array.
    pub fn dim2(mut self, expr: impl Into<String>) -> Self {
        self.dim2 = Some(expr.into());
        self
    }

    /// Lowest file version the attribute exists in.
    pub fn since(mut self, version: impl Into<String>) -> Self {
        self.ver_min = Some(version.into());
        self
    }

    /// Highest file version the attribute exists in.
    pub fn until(mut self, version: impl Into<String>) -> Self {
        self.ver_max = Some(version.into());
        self
    }

    /// Exact user-version constraint.
    pub fn user_version(mut self, uv: u32) -> Self {
        self.user_version = Some(uv);
        self
    }

    /// Condition over the owning instance.
    pub fn cond(mut self, expr: impl Into<String>) -> Self {
        self.cond = Some(expr.into());
        self
    }

    /// Condition over the document scope.
    pub fn vercond(mut self, expr: impl Into<String>) -> Self {
        self.vercond = Some(expr.into());
        self
    }

    /// Runtime argument: integer literal or sibling attribute name.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = Some(arg.into());
        self
    }

    /// Default value source.
    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Mark as bookkeeping-only.
    pub fn abstract_attr(mut self) -> Self {
        self.is_abstract = true;
        self
    }
}
