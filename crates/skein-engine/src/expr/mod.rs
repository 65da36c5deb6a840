//! Condition and dimension expressions.
//!
//! Schemas gate attributes and size arrays with small boolean/arithmetic
//! expressions (`"num_vertices != 0"`, `"(flags & 2) && has_normals"`).
//! An [`Expression`] is parsed once at schema-load time and evaluated many
//! times against a scope — a struct instance for `cond` and array
//! dimensions, the document for `vercond`.
//!
//! Evaluation is integer-only: relational and boolean operators yield
//! `0`/`1` so they compose freely with the bitwise operators, and any
//! attribute operand that is not already integer-like is coerced through
//! the value's own integer conversion.

use crate::{Error, Result};

/// A resolved operand during path lookup.
pub enum ScopeValue<'a> {
    /// An integer-like leaf.
    Int(i64),
    /// A nested scope (struct-valued attribute) for further lookup.
    Scope(Box<dyn ExprScope + 'a>),
}

/// Attribute lookup capability for expression evaluation.
///
/// Implemented by struct instances and by the document; the evaluator
/// never reflects over concrete types.
pub trait ExprScope {
    /// Look up one path segment (already canonicalized).
    fn attr(&self, name: &str) -> Option<ScopeValue<'_>>;

    /// The runtime argument available as the `arg` token.
    fn argument(&self) -> Option<i64> {
        None
    }

    /// Integer coercion for a scope used as a terminal operand.
    fn coerce_int(&self) -> Option<i64> {
        None
    }
}

/// Binary operators, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
    BitOr,
    BitAnd,
    Shl,
    Shr,
}

#[derive(Debug, Clone)]
enum Node {
    Lit(i64),
    Arg,
    Path(Vec<String>),
    Not(Box<Node>),
    Bin {
        op: BinOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
}

/// A parsed, reusable expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Node,
}

/// Operator groups in precedence order, lowest binding first. The
/// partition step splits at the leftmost member of the lowest group found
/// at paren depth zero.
const PRECEDENCE: &[&[&str]] = &[
    &["||"],
    &["&&"],
    &["==", "!="],
    &["<=", "<", ">=", ">"],
    &["|"],
    &["&"],
    &["<<", ">>"],
];

/// All operators, used for longest-match disambiguation ("||" vs "|").
const ALL_OPS: &[&str] = &[
    "||", "&&", "==", "!=", "<=", ">=", "<<", ">>", "|", "&", "<", ">", "!",
];

/// Trim and strip parentheses that enclose the whole expression.
fn strip_outer(mut s: &str) -> &str {
    loop {
        s = s.trim();
        if !s.starts_with('(') {
            return s;
        }
        // the opening paren must match the final character, otherwise the
        // parens belong to an inner sub-expression
        let mut depth = 0i32;
        let mut close = None;
        for (i, c) in s.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth <= 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        match close {
            Some(i) if i == s.len() - 1 => s = &s[1..i],
            _ => return s,
        }
    }
}

/// The longest operator matching at byte position `i`, if any.
fn op_at(s: &str, i: usize) -> Option<&'static str> {
    ALL_OPS
        .iter()
        .copied()
        .find(|op| s.as_bytes()[i..].starts_with(op.as_bytes()))
}

/// Partition an expression string at its lowest-precedence operator
/// outside parentheses, returning `(left, operator, right)` with both
/// sides trimmed and stripped of enclosing parentheses.
///
/// Atoms come back as `(atom, "", "")`; a leading unary `!` with no
/// binary operator at depth zero yields `("", "!", operand)`.
pub(crate) fn partition(s: &str) -> (&str, &'static str, &str) {
    let t = strip_outer(s);

    for group in PRECEDENCE {
        let mut depth = 0usize;
        let mut i = 0;
        while i < t.len() {
            match t.as_bytes()[i] {
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                _ => {
                    if depth == 0 && i > 0 {
                        if let Some(op) = op_at(t, i) {
                            if group.contains(&op) {
                                let left = strip_outer(&t[..i]);
                                let right = strip_outer(&t[i + op.len()..]);
                                return (left, op, right);
                            }
                            i += op.len();
                            continue;
                        }
                    }
                }
            }
            i += 1;
        }
    }

    if let Some(rest) = t.strip_prefix('!') {
        return ("", "!", strip_outer(rest));
    }
    (t, "", "")
}

fn bin_op(op: &str) -> BinOp {
    match op {
        "||" => BinOp::Or,
        "&&" => BinOp::And,
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "<=" => BinOp::Le,
        "<" => BinOp::Lt,
        ">=" => BinOp::Ge,
        ">" => BinOp::Gt,
        "|" => BinOp::BitOr,
        "&" => BinOp::BitAnd,
        "<<" => BinOp::Shl,
        ">>" => BinOp::Shr,
        _ => unreachable!("partition produced unknown operator {op}"),
    }
}

fn parse_node(source: &str, s: &str) -> Result<Node> {
    let t = strip_outer(s);
    if t.is_empty() {
        return Err(Error::BadExpression {
            expr: source.to_string(),
            reason: "empty sub-expression".into(),
        });
    }
    let (left, op, right) = partition(t);
    match op {
        "" => parse_atom(source, left),
        "!" => Ok(Node::Not(Box::new(parse_node(source, right)?))),
        _ => Ok(Node::Bin {
            op: bin_op(op),
            lhs: Box::new(parse_node(source, left)?),
            rhs: Box::new(parse_node(source, right)?),
        }),
    }
}

fn parse_atom(source: &str, s: &str) -> Result<Node> {
    if s == "arg" {
        return Ok(Node::Arg);
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16)
            .map(Node::Lit)
            .map_err(|e| Error::BadExpression {
                expr: source.to_string(),
                reason: format!("bad hex literal {s:?}: {e}"),
            });
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<i64>().map(Node::Lit).map_err(|e| Error::BadExpression {
            expr: source.to_string(),
            reason: format!("bad integer literal {s:?}: {e}"),
        });
    }
    if s.contains('.') {
        // dotted version literal: every component a plain integer,
        // folded 8 bits per component, most significant first
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() >= 2 && parts.iter().all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit())) {
            let mut v: i64 = 0;
            for part in &parts {
                let c: i64 = part.parse().map_err(|e| Error::BadExpression {
                    expr: source.to_string(),
                    reason: format!("bad version component {part:?}: {e}"),
                })?;
                v = (v << 8) | (c & 0xff);
            }
            return Ok(Node::Lit(v));
        }
    }
    // scientific notation appears in a few schema conditions; it still
    // denotes an integer ("3.402823466e+9")
    if s.bytes().next().is_some_and(|b| b.is_ascii_digit()) {
        if let Ok(f) = s.parse::<f64>() {
            return Ok(Node::Lit(f as i64));
        }
    }
    let path: Vec<String> = s.split('.').map(crate::schema::canonical_name).collect();
    if path.iter().any(|seg| seg.is_empty()) {
        return Err(Error::BadExpression {
            expr: source.to_string(),
            reason: format!("bad attribute path {s:?}"),
        });
    }
    Ok(Node::Path(path))
}

fn resolve_path(path: &[String], scope: &dyn ExprScope) -> Result<i64> {
    let lookup_failed = || Error::AttributeLookup {
        path: path.join("."),
    };
    match scope.attr(&path[0]) {
        Some(ScopeValue::Int(v)) if path.len() == 1 => Ok(v),
        Some(ScopeValue::Scope(nested)) if path.len() == 1 => {
            nested.coerce_int().ok_or_else(lookup_failed)
        }
        Some(ScopeValue::Scope(nested)) => {
            resolve_path(&path[1..], &*nested).map_err(|e| match e {
                Error::AttributeLookup { .. } => lookup_failed(),
                other => other,
            })
        }
        _ => Err(lookup_failed()),
    }
}

fn eval_node(node: &Node, scope: &dyn ExprScope) -> Result<i64> {
    match node {
        Node::Lit(v) => Ok(*v),
        Node::Arg => scope.argument().ok_or_else(|| Error::AttributeLookup {
            path: "arg".to_string(),
        }),
        Node::Path(path) => resolve_path(path, scope),
        Node::Not(inner) => Ok((eval_node(inner, scope)? == 0) as i64),
        Node::Bin { op, lhs, rhs } => {
            let l = eval_node(lhs, scope)?;
            let r = eval_node(rhs, scope)?;
            Ok(match op {
                BinOp::Or => (l != 0 || r != 0) as i64,
                BinOp::And => (l != 0 && r != 0) as i64,
                BinOp::Eq => (l == r) as i64,
                BinOp::Ne => (l != r) as i64,
                BinOp::Le => (l <= r) as i64,
                BinOp::Lt => (l < r) as i64,
                BinOp::Ge => (l >= r) as i64,
                BinOp::Gt => (l > r) as i64,
                BinOp::BitOr => l | r,
                BinOp::BitAnd => l & r,
                BinOp::Shl => l.wrapping_shl(r as u32),
                BinOp::Shr => l.wrapping_shr(r as u32),
            })
        }
    }
}

impl Expression {
    /// Parse an expression string into a reusable form.
    pub fn parse(source: &str) -> Result<Self> {
        let root = parse_node(source, source)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// The original source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against a scope, yielding a signed integer.
    pub fn eval(&self, scope: &dyn ExprScope) -> Result<i64> {
        eval_node(&self.root, scope)
    }

    /// Evaluate and interpret the result as a truth value.
    pub fn eval_bool(&self, scope: &dyn ExprScope) -> Result<bool> {
        Ok(self.eval(scope)? != 0)
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Fold a dotted version string (`"20.2.0.7"`) into its 32-bit form,
/// 8 bits per component, most significant component first.
pub fn version_u32(s: &str) -> Option<u32> {
    let mut v: u32 = 0;
    let mut parts = 0;
    for part in s.split('.') {
        let c: u32 = part.parse().ok()?;
        if c > 0xff {
            return None;
        }
        v = (v << 8) | c;
        parts += 1;
    }
    (parts >= 1 && parts <= 4).then_some(v)
}

/// Render a 32-bit version in dotted form.
pub fn format_version(v: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        (v >> 24) & 0xff,
        (v >> 16) & 0xff,
        (v >> 8) & 0xff,
        v & 0xff
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    struct MapScope {
        vars: HashMap<String, i64>,
        arg: Option<i64>,
    }

    impl MapScope {
        fn new(pairs: &[(&str, i64)]) -> Self {
            Self {
                vars: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                arg: None,
            }
        }
    }

    impl ExprScope for MapScope {
        fn attr(&self, name: &str) -> Option<ScopeValue<'_>> {
            self.vars.get(name).map(|v| ScopeValue::Int(*v))
        }

        fn argument(&self) -> Option<i64> {
            self.arg
        }
    }

    fn eval(src: &str, scope: &dyn ExprScope) -> i64 {
        Expression::parse(src).unwrap().eval(scope).unwrap()
    }

    #[test]
    fn test_literals() {
        let s = MapScope::new(&[]);
        assert_eq!(eval("42", &s), 42);
        assert_eq!(eval("0xFF", &s), 255);
        assert_eq!(eval("3.402823466e+9", &s), 3402823466);
        assert_eq!(eval("20.2.0.7", &s), 335675399);
    }

    #[test]
    fn test_shifts() {
        let s = MapScope::new(&[]);
        assert_eq!(eval("0xFF000000 >> 18", &s), 16320);
        assert_eq!(eval("0x000000FF << 4", &s), 4080);
    }

    #[test]
    fn test_bitwise_and_boolean_mix() {
        let s = MapScope::new(&[("y", 1)]);
        assert_eq!(eval("99 & 15", &s), 3);
        assert_eq!(eval("(99&15)&&y", &s), 1);
        assert_eq!(eval("(99&15)&&!y", &s), 0);
    }

    #[test]
    fn test_partition_seed_case() {
        let (l, op, r) = partition("( 1 != 1 ) || ((!abc) == 1)");
        assert_eq!(l, "1 != 1");
        assert_eq!(op, "||");
        assert_eq!(r, "(!abc) == 1");
    }

    #[test]
    fn test_partition_atom_and_unary() {
        assert_eq!(partition("  foo "), ("foo", "", ""));
        assert_eq!(partition("!abc"), ("", "!", "abc"));
        assert_eq!(partition("((x))"), ("x", "", ""));
    }

    #[test]
    fn test_relational_precedence() {
        let s = MapScope::new(&[("n", 5)]);
        assert_eq!(eval("n > 3 && n <= 5", &s), 1);
        assert_eq!(eval("n == 4 || n == 5", &s), 1);
        assert_eq!(eval("n != 5", &s), 0);
    }

    #[test]
    fn test_attribute_paths_are_canonicalized() {
        let s = MapScope::new(&[("has_vertices", 1)]);
        assert_eq!(eval("Has Vertices", &s), 1);
        assert_eq!(eval("Has Vertices != 0", &s), 1);
    }

    #[test]
    fn test_unknown_attribute_is_fatal() {
        let s = MapScope::new(&[]);
        let e = Expression::parse("missing == 1").unwrap().eval(&s);
        assert!(matches!(e, Err(crate::Error::AttributeLookup { .. })));
    }

    #[test]
    fn test_arg_token() {
        let mut s = MapScope::new(&[]);
        s.arg = Some(7);
        assert_eq!(eval("arg", &s), 7);
        assert_eq!(eval("arg == 7", &s), 1);
    }

    #[test]
    fn test_version_helpers() {
        assert_eq!(version_u32("20.2.0.7"), Some(335675399));
        assert_eq!(format_version(335675399), "20.2.0.7");
        assert_eq!(version_u32("4.0.0.2"), Some(0x04000002));
        assert_eq!(version_u32("300.1"), None);
    }
}
