//! Two-pass schema construction.
//!
//! Pass one is registration: every declared name gets a [`TypeId`] shell
//! immediately, so declarations may reference types that appear later
//! (forward references, self-referential structs). Pass two happens in
//! [`SchemaBuilder::finish`]: every textual type/template reference is
//! resolved against the now-complete registry, attribute rows are compiled
//! into descriptors with parsed expressions, inheritance is flattened, and
//! the link/ref/string capability flags are computed as a fixpoint over
//! the type graph.

use crate::expr::{version_u32, Expression};
use crate::schema::{
    AttrSpec, AttributeDescriptor, ArgSource, BasicKind, BitMember, BitfieldDef, DefaultValue,
    EnumDef, EnumOption, FxHashMap, IntKind, LinkKind, Schema, StructDef, TypeDef, TypeId,
    TypeRef, canonical_name,
};
use crate::{Error, Result};

/// Handle to a struct type being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructHandle(u32);

/// One type declaration as handed over by an external schema parser.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum TypeDecl {
    Basic {
        name: String,
        basic: BasicKind,
    },
    Enum {
        name: String,
        storage: IntKind,
        options: Vec<(String, i64)>,
    },
    Bitfield {
        name: String,
        storage: IntKind,
        members: Vec<(String, u32)>,
    },
    Link {
        name: String,
        link: LinkKind,
    },
    Struct {
        name: String,
        #[cfg_attr(feature = "serde", serde(default))]
        parent: Option<String>,
        #[cfg_attr(feature = "serde", serde(default))]
        generic: bool,
        attrs: Vec<AttrSpec>,
    },
}

#[derive(Debug)]
enum Pending {
    Basic {
        name: String,
        kind: BasicKind,
    },
    Enum(EnumDef),
    Bitfield(BitfieldDef),
    Link {
        name: String,
        kind: LinkKind,
    },
    Struct {
        name: String,
        parent: Option<String>,
        generic: bool,
        attrs: Vec<AttrSpec>,
    },
}

impl Pending {
    fn name(&self) -> &str {
        match self {
            Self::Basic { name, .. } | Self::Link { name, .. } => name,
            Self::Enum(e) => &e.name,
            Self::Bitfield(b) => &b.name,
            Self::Struct { name, .. } => name,
        }
    }
}

/// Builder for constructing a [`Schema`] from declarations.
///
/// # Example
///
/// ```
/// use skein_engine::{AttrSpec, BasicKind, IntKind, SchemaBuilder};
///
/// let mut builder = SchemaBuilder::new();
/// builder.basic("uint", BasicKind::Int(IntKind::U32))?;
/// builder.basic("float", BasicKind::Float32)?;
///
/// let vertex = builder.struct_type("Vertex", None)?;
/// builder.attr(vertex, AttrSpec::new("x", "float"));
/// builder.attr(vertex, AttrSpec::new("y", "float"));
///
/// let mesh = builder.struct_type("Mesh", None)?;
/// builder.attr(mesh, AttrSpec::new("num_vertices", "uint"));
/// builder.attr(mesh, AttrSpec::new("vertices", "Vertex").dim1("num_vertices"));
///
/// let schema = builder.finish()?;
/// assert!(schema.id_of("Mesh").is_some());
/// # Ok::<(), skein_engine::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    pending: Vec<Pending>,
    by_name: FxHashMap<String, TypeId>,
}

impl SchemaBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, pending: Pending) -> Result<TypeId> {
        let name = pending.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(Error::DuplicateType { name });
        }
        let id = TypeId(self.pending.len() as u32);
        self.by_name.insert(name, id);
        self.pending.push(pending);
        Ok(id)
    }

    /// Declare a basic (primitive) type.
    pub fn basic(&mut self, name: impl Into<String>, kind: BasicKind) -> Result<TypeId> {
        self.register(Pending::Basic {
            name: name.into(),
            kind,
        })
    }

    /// Declare an enum type with its symbol table.
    pub fn enum_type(
        &mut self,
        name: impl Into<String>,
        storage: IntKind,
        options: &[(&str, i64)],
    ) -> Result<TypeId> {
        let name = name.into();
        let mut seen = FxHashMap::default();
        for (opt, _) in options {
            if seen.insert(*opt, ()).is_some() {
                return Err(Error::Schema {
                    type_name: name,
                    reason: format!("duplicate enum option {opt:?}"),
                });
            }
        }
        self.register(Pending::Enum(EnumDef {
            name,
            storage,
            options: options
                .iter()
                .map(|(n, v)| EnumOption {
                    name: n.to_string(),
                    value: *v,
                })
                .collect(),
        }))
    }

    /// Declare a bitfield type. Members pack least-significant first.
    pub fn bitfield(
        &mut self,
        name: impl Into<String>,
        storage: IntKind,
        members: &[(&str, u32)],
    ) -> Result<TypeId> {
        let name = name.into();
        let total: u64 = members.iter().map(|(_, w)| *w as u64).sum();
        if total > storage.size() * 8 {
            return Err(Error::Schema {
                type_name: name,
                reason: format!(
                    "bitfield members need {total} bits but storage {} holds {}",
                    storage.as_str(),
                    storage.size() * 8
                ),
            });
        }
        if members.iter().any(|(_, w)| *w == 0) {
            return Err(Error::Schema {
                type_name: name,
                reason: "bitfield member with zero width".into(),
            });
        }
        self.register(Pending::Bitfield(BitfieldDef {
            name,
            storage,
            members: members
                .iter()
                .map(|(n, w)| BitMember {
                    name: canonical_name(n),
                    width: *w,
                })
                .collect(),
        }))
    }

    /// Declare a link type. `Ref` links point strictly downward; `Ptr`
    /// links may point anywhere in the graph.
    pub fn link(&mut self, name: impl Into<String>, kind: LinkKind) -> Result<TypeId> {
        self.register(Pending::Link {
            name: name.into(),
            kind,
        })
    }

    /// Declare a struct type, optionally inheriting from a (possibly
    /// not-yet-declared) parent.
    pub fn struct_type(
        &mut self,
        name: impl Into<String>,
        parent: Option<&str>,
    ) -> Result<StructHandle> {
        let id = self.register(Pending::Struct {
            name: name.into(),
            parent: parent.map(str::to_string),
            generic: false,
            attrs: Vec::new(),
        })?;
        Ok(StructHandle(id.0))
    }

    /// Declare a struct type carrying the generic `TEMPLATE` placeholder.
    pub fn generic_struct_type(
        &mut self,
        name: impl Into<String>,
        parent: Option<&str>,
    ) -> Result<StructHandle> {
        let id = self.register(Pending::Struct {
            name: name.into(),
            parent: parent.map(str::to_string),
            generic: true,
            attrs: Vec::new(),
        })?;
        Ok(StructHandle(id.0))
    }

    /// Append an attribute row to a struct.
    pub fn attr(&mut self, handle: StructHandle, spec: AttrSpec) {
        match &mut self.pending[handle.0 as usize] {
            Pending::Struct { attrs, .. } => attrs.push(spec),
            _ => unreachable!("StructHandle always points at a struct"),
        }
    }

    /// Feed one declarative record.
    pub fn add_decl(&mut self, decl: TypeDecl) -> Result<()> {
        match decl {
            TypeDecl::Basic { name, basic } => {
                self.basic(name, basic)?;
            }
            TypeDecl::Enum {
                name,
                storage,
                options,
            } => {
                let opts: Vec<(&str, i64)> =
                    options.iter().map(|(n, v)| (n.as_str(), *v)).collect();
                self.enum_type(name, storage, &opts)?;
            }
            TypeDecl::Bitfield {
                name,
                storage,
                members,
            } => {
                let mems: Vec<(&str, u32)> =
                    members.iter().map(|(n, w)| (n.as_str(), *w)).collect();
                self.bitfield(name, storage, &mems)?;
            }
            TypeDecl::Link { name, link } => {
                self.link(name, link)?;
            }
            TypeDecl::Struct {
                name,
                parent,
                generic,
                attrs,
            } => {
                self.register(Pending::Struct {
                    name,
                    parent,
                    generic,
                    attrs,
                })?;
            }
        }
        Ok(())
    }

    /// Build a schema from a sequence of declarations.
    pub fn from_decls(decls: impl IntoIterator<Item = TypeDecl>) -> Result<Schema> {
        let mut builder = Self::new();
        for decl in decls {
            builder.add_decl(decl)?;
        }
        builder.finish()
    }

    /// Resolve every reference and produce the finished schema.
    pub fn finish(self) -> Result<Schema> {
        let Self { pending, by_name } = self;
        let count = pending.len();
        let mut defs: Vec<Option<TypeDef>> = Vec::with_capacity(count);

        // non-struct definitions are already final
        let mut structs: Vec<Option<(String, Option<String>, bool, Vec<AttrSpec>)>> =
            vec![None; count];
        for (i, p) in pending.into_iter().enumerate() {
            defs.push(match p {
                Pending::Basic { name, kind } => Some(TypeDef::Basic { name, kind }),
                Pending::Enum(e) => Some(TypeDef::Enum(e)),
                Pending::Bitfield(b) => Some(TypeDef::Bitfield(b)),
                Pending::Link { name, kind } => Some(TypeDef::Link { name, kind }),
                Pending::Struct {
                    name,
                    parent,
                    generic,
                    attrs,
                } => {
                    structs[i] = Some((name, parent, generic, attrs));
                    None
                }
            });
        }

        // resolve structs parents-first so flattened lists can be spliced
        let mut state = vec![BuildState::Todo; count];
        for i in 0..count {
            if structs[i].is_some() {
                build_struct(i, &mut structs, &mut defs, &mut state, &by_name)?;
            }
        }

        let mut defs: Vec<TypeDef> = defs
            .into_iter()
            .map(|d| d.expect("every definition resolved"))
            .collect();
        compute_capabilities(&mut defs);

        Ok(Schema { defs, by_name })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildState {
    Todo,
    InProgress,
    Done,
}

fn build_struct(
    index: usize,
    structs: &mut Vec<Option<(String, Option<String>, bool, Vec<AttrSpec>)>>,
    defs: &mut Vec<Option<TypeDef>>,
    state: &mut Vec<BuildState>,
    by_name: &FxHashMap<String, TypeId>,
) -> Result<()> {
    match state[index] {
        BuildState::Done => return Ok(()),
        BuildState::InProgress => {
            let name = structs[index]
                .as_ref()
                .map(|(n, ..)| n.clone())
                .unwrap_or_default();
            return Err(Error::Schema {
                type_name: name,
                reason: "inheritance cycle".into(),
            });
        }
        BuildState::Todo => {}
    }
    state[index] = BuildState::InProgress;

    let (name, parent_name, generic, attrs) = structs[index].take().expect("struct pending");

    let parent = match &parent_name {
        Some(p) => {
            let pid = by_name.get(p).copied().ok_or_else(|| Error::UnknownType {
                name: p.clone(),
            })?;
            build_struct(pid.index(), structs, defs, state, by_name)?;
            match defs[pid.index()].as_ref() {
                Some(TypeDef::Struct(_)) => Some(pid),
                _ => {
                    return Err(Error::Schema {
                        type_name: name,
                        reason: format!("parent {p} is not a struct type"),
                    })
                }
            }
        }
        None => None,
    };

    let (mut flat, mut slots) = match parent {
        Some(pid) => match defs[pid.index()].as_ref() {
            Some(TypeDef::Struct(p)) => (p.flat.clone(), p.slots.clone()),
            _ => unreachable!(),
        },
        None => (Vec::new(), FxHashMap::default()),
    };

    for spec in &attrs {
        let desc = compile_attr(&name, generic, spec, by_name)?;
        match slots.get(&desc.name) {
            // a derived redeclaration shadows the base entry in place
            Some(&slot) => flat[slot] = desc,
            None => {
                slots.insert(desc.name.clone(), flat.len());
                flat.push(desc);
            }
        }
    }

    defs[index] = Some(TypeDef::Struct(StructDef {
        name,
        parent,
        generic,
        flat,
        slots,
        has_links: false,
        has_refs: false,
        has_strings: false,
    }));
    state[index] = BuildState::Done;
    Ok(())
}

fn parse_version_bound(type_name: &str, s: &str) -> Result<u32> {
    let parsed = if s.contains('.') {
        version_u32(s)
    } else {
        s.parse::<u32>().ok()
    };
    parsed.ok_or_else(|| Error::Schema {
        type_name: type_name.to_string(),
        reason: format!("bad version bound {s:?}"),
    })
}

fn resolve_type_ref(
    type_name: &str,
    generic: bool,
    s: &str,
    by_name: &FxHashMap<String, TypeId>,
) -> Result<TypeRef> {
    if s == "TEMPLATE" {
        if !generic {
            return Err(Error::Schema {
                type_name: type_name.to_string(),
                reason: "TEMPLATE placeholder in a non-generic struct".into(),
            });
        }
        return Ok(TypeRef::Template);
    }
    by_name
        .get(s)
        .copied()
        .map(TypeRef::Concrete)
        .ok_or_else(|| Error::UnknownType { name: s.to_string() })
}

fn compile_attr(
    type_name: &str,
    generic: bool,
    spec: &AttrSpec,
    by_name: &FxHashMap<String, TypeId>,
) -> Result<AttributeDescriptor> {
    let name = canonical_name(&spec.name);
    if name.is_empty() {
        return Err(Error::Schema {
            type_name: type_name.to_string(),
            reason: format!("attribute name {:?} canonicalizes to nothing", spec.name),
        });
    }

    let ty = resolve_type_ref(type_name, generic, &spec.ty, by_name)?;
    let template = spec
        .template
        .as_deref()
        .map(|t| resolve_type_ref(type_name, generic, t, by_name))
        .transpose()?;

    if spec.dim2.is_some() && spec.dim1.is_none() {
        return Err(Error::Schema {
            type_name: type_name.to_string(),
            reason: format!("attribute {name} has dim2 without dim1"),
        });
    }

    let dim1 = spec.dim1.as_deref().map(Expression::parse).transpose()?;
    let dim2 = spec.dim2.as_deref().map(Expression::parse).transpose()?;
    let cond = spec.cond.as_deref().map(Expression::parse).transpose()?;
    let vercond = spec.vercond.as_deref().map(Expression::parse).transpose()?;

    let ver_min = spec
        .ver_min
        .as_deref()
        .map(|v| parse_version_bound(type_name, v))
        .transpose()?;
    let ver_max = spec
        .ver_max
        .as_deref()
        .map(|v| parse_version_bound(type_name, v))
        .transpose()?;

    let arg = spec.arg.as_deref().map(|a| {
        a.parse::<i64>()
            .map(ArgSource::Literal)
            .unwrap_or_else(|_| ArgSource::Attr(canonical_name(a)))
    });

    let default = spec.default.as_deref().map(parse_default);

    Ok(AttributeDescriptor {
        name,
        ty,
        template,
        dim1,
        dim2,
        ver_min,
        ver_max,
        user_version: spec.user_version,
        cond,
        vercond,
        arg,
        default,
        is_abstract: spec.is_abstract,
    })
}

/// Bottom-up fixpoint over the type graph: a struct "has links" if any of
/// its attributes is a link or is of a type that itself has links, and
/// likewise for refs and strings. Template placeholders are conservatively
/// assumed to contain all three. A link's own template (its target type)
/// contributes nothing: a link never owns what it points at.
fn compute_capabilities(defs: &mut [TypeDef]) {
    let count = defs.len();
    let mut links = vec![false; count];
    let mut refs = vec![false; count];
    let mut strings = vec![false; count];

    let contribution = |defs: &[TypeDef],
                        links: &[bool],
                        refs: &[bool],
                        strings: &[bool],
                        r: &TypeRef|
     -> (bool, bool, bool) {
        match r {
            TypeRef::Template => (true, true, true),
            TypeRef::Concrete(id) => match &defs[id.index()] {
                TypeDef::Link { kind, .. } => (true, *kind == LinkKind::Ref, false),
                TypeDef::Basic { kind, .. } => (false, false, kind.is_string()),
                TypeDef::Enum(_) | TypeDef::Bitfield(_) => (false, false, false),
                TypeDef::Struct(_) => (
                    links[id.index()],
                    refs[id.index()],
                    strings[id.index()],
                ),
            },
        }
    };

    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..count {
            let TypeDef::Struct(def) = &defs[i] else {
                continue;
            };
            let mut l = links[i];
            let mut r = refs[i];
            let mut s = strings[i];
            for attr in &def.flat {
                let (al, ar, a_s) = contribution(defs, &links, &refs, &strings, &attr.ty);
                l |= al;
                r |= ar;
                s |= a_s;
                let is_link_attr = matches!(
                    attr.ty,
                    TypeRef::Concrete(id) if matches!(defs[id.index()], TypeDef::Link { .. })
                );
                if !is_link_attr {
                    if let Some(t) = &attr.template {
                        let (tl, tr, ts) = contribution(defs, &links, &refs, &strings, t);
                        l |= tl;
                        r |= tr;
                        s |= ts;
                    }
                }
            }
            if l != links[i] || r != refs[i] || s != strings[i] {
                links[i] = l;
                refs[i] = r;
                strings[i] = s;
                changed = true;
            }
        }
    }

    for (i, def) in defs.iter_mut().enumerate() {
        if let TypeDef::Struct(s) = def {
            s.has_links = links[i];
            s.has_refs = refs[i];
            s.has_strings = strings[i];
        }
    }
}

fn parse_default(s: &str) -> DefaultValue {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if let Ok(v) = i64::from_str_radix(hex, 16) {
            return DefaultValue::Int(v);
        }
    }
    if let Ok(v) = s.parse::<i64>() {
        return DefaultValue::Int(v);
    }
    if let Ok(v) = s.parse::<f32>() {
        return DefaultValue::Float(v);
    }
    DefaultValue::Str(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BasicKind;

    fn base_builder() -> SchemaBuilder {
        let mut b = SchemaBuilder::new();
        b.basic("uint", BasicKind::Int(IntKind::U32)).unwrap();
        b.basic("string", BasicKind::ZString).unwrap();
        b.link("ref", LinkKind::Ref).unwrap();
        b.link("ptr", LinkKind::Ptr).unwrap();
        b
    }

    #[test]
    fn test_forward_reference_resolves() {
        let mut b = base_builder();
        // Node references Child before Child is declared
        let node = b.struct_type("Node", None).unwrap();
        b.attr(node, AttrSpec::new("payload", "Child"));
        let child = b.struct_type("Child", None).unwrap();
        b.attr(child, AttrSpec::new("value", "uint"));

        let schema = b.finish().unwrap();
        let node = schema.id_of("Node").unwrap();
        assert_eq!(schema.struct_def(node).unwrap().attributes().len(), 1);
    }

    #[test]
    fn test_unknown_type_fails_at_finish() {
        let mut b = base_builder();
        let node = b.struct_type("Node", None).unwrap();
        b.attr(node, AttrSpec::new("payload", "Missing"));
        assert!(matches!(
            b.finish(),
            Err(Error::UnknownType { name }) if name == "Missing"
        ));
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut b = base_builder();
        assert!(matches!(
            b.basic("uint", BasicKind::Int(IntKind::U8)),
            Err(Error::DuplicateType { .. })
        ));
    }

    #[test]
    fn test_inheritance_flattening_and_shadowing() {
        let mut b = base_builder();
        let parent = b.struct_type("Parent", None).unwrap();
        b.attr(parent, AttrSpec::new("a", "uint"));
        b.attr(parent, AttrSpec::new("b", "uint"));
        let child = b.struct_type("Child", Some("Parent")).unwrap();
        // shadows the base `b` in place, appends `c`
        b.attr(child, AttrSpec::new("b", "string"));
        b.attr(child, AttrSpec::new("c", "uint"));

        let schema = b.finish().unwrap();
        let def = schema
            .struct_def(schema.id_of("Child").unwrap())
            .unwrap();
        let names: Vec<&str> = def.attributes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        // the shadowed slot carries the derived (string) type
        let b_attr = &def.attributes()[1];
        let TypeRef::Concrete(id) = b_attr.ty else {
            panic!("expected concrete type")
        };
        assert_eq!(schema.name(id), "string");
    }

    #[test]
    fn test_inheritance_cycle_detected() {
        let mut b = base_builder();
        b.struct_type("A", Some("B")).unwrap();
        b.struct_type("B", Some("A")).unwrap();
        assert!(matches!(b.finish(), Err(Error::Schema { .. })));
    }

    #[test]
    fn test_capability_closure_transitive() {
        let mut b = base_builder();
        let leaf = b.struct_type("Leaf", None).unwrap();
        b.attr(leaf, AttrSpec::new("target", "ref").template("Leaf"));
        let mid = b.struct_type("Mid", None).unwrap();
        b.attr(mid, AttrSpec::new("leaf", "Leaf"));
        let top = b.struct_type("Top", None).unwrap();
        b.attr(top, AttrSpec::new("mids", "Mid").dim1("3"));
        let plain = b.struct_type("Plain", None).unwrap();
        b.attr(plain, AttrSpec::new("n", "uint"));

        let schema = b.finish().unwrap();
        assert!(schema.type_has_links(schema.id_of("Top").unwrap()));
        assert!(schema.type_has_refs(schema.id_of("Top").unwrap()));
        assert!(!schema.type_has_links(schema.id_of("Plain").unwrap()));
        // a link target does not leak its contents upward
        assert!(!schema.type_has_strings(schema.id_of("Leaf").unwrap()));
    }

    #[test]
    fn test_bitfield_width_validation() {
        let mut b = SchemaBuilder::new();
        assert!(b
            .bitfield("flags", IntKind::U8, &[("a", 3), ("b", 1)])
            .is_ok());
        assert!(matches!(
            b.bitfield("too_wide", IntKind::U8, &[("a", 7), ("b", 2)]),
            Err(Error::Schema { .. })
        ));
    }

    #[test]
    fn test_version_bounds_parse_dotted_and_decimal() {
        let mut b = base_builder();
        let s = b.struct_type("S", None).unwrap();
        b.attr(
            s,
            AttrSpec::new("n", "uint").since("4.0.0.2").until("335675399"),
        );
        let schema = b.finish().unwrap();
        let def = schema.struct_def(schema.id_of("S").unwrap()).unwrap();
        assert_eq!(def.attributes()[0].ver_min, Some(0x04000002));
        assert_eq!(def.attributes()[0].ver_max, Some(335675399));
    }
}
