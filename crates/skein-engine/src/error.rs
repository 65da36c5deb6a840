//! Error types for the serialization engine.

use thiserror::Error;

/// Errors that can occur when building schemas or serializing data.
#[derive(Debug, Error)]
pub enum Error {
    /// Stream ended or a low-level decode failed.
    #[error("{0}")]
    Stream(#[from] skein_common::Error),

    /// A type name could not be resolved in the schema.
    #[error("unknown type: {name}")]
    UnknownType { name: String },

    /// A type name was declared twice.
    #[error("duplicate type definition: {name}")]
    DuplicateType { name: String },

    /// An attribute used the template placeholder but no binding was supplied.
    #[error("type {type_name} attribute {attr} needs a template binding, none was given")]
    UnboundTemplate { type_name: String, attr: String },

    /// A malformed declaration was detected at schema-load time.
    #[error("schema error in {type_name}: {reason}")]
    Schema { type_name: String, reason: String },

    /// An expression string could not be parsed.
    #[error("bad expression {expr:?}: {reason}")]
    BadExpression { expr: String, reason: String },

    /// An expression referenced an attribute the context does not have.
    #[error("attribute lookup failed: {path}")]
    AttributeLookup { path: String },

    /// A value was rejected by its type's domain validation.
    #[error("value {value} out of range for {kind}")]
    ValueRange { kind: String, value: String },

    /// A string or blob exceeded its configured maximum.
    #[error("length {len} exceeds maximum {max} for {kind}")]
    LengthOutOfBounds {
        kind: String,
        len: usize,
        max: usize,
    },

    /// Structural copy between unrelated struct types.
    #[error("cannot copy between unrelated types {from} and {to}")]
    TypeMismatch { from: String, to: String },

    /// An operation hit a value of an unexpected kind.
    #[error("expected {expected} value, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// An attribute name is not declared on the struct type.
    #[error("type {type_name} has no attribute {attr}")]
    UnknownAttribute { type_name: String, attr: String },

    /// A link operation ran without a block table in the context.
    #[error("operation requires a block table in the context")]
    MissingBlockTable,

    /// A block handle points outside the arena.
    #[error("no block at arena index {index}")]
    UnknownBlock { index: usize },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
