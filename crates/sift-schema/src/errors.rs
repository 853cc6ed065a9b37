//! Schema-construction errors.
//!
//! These surface at parse/composition time and are always thrown (returned
//! as `Err`) immediately: a malformed or contradictory definition is fatal
//! to whoever is authoring the schema. Data-validation failures never use
//! this channel; they accumulate as [`crate::Violations`].

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("key '{key}' is not valid on a {kind} definition")]
    UnknownKey { kind: &'static str, key: String },

    #[error("expected a {expected} definition, got {actual}")]
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("malformed {kind} definition: {reason}")]
    Malformed { kind: &'static str, reason: String },

    #[error("'{name}' is not a recognized domain, proto, or bound alias")]
    UnresolvedReference { name: String },

    #[error("alias '{name}' is not bound in this space")]
    UnresolvedAlias { name: String },

    #[error("invalid pattern /{pattern}/: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("predicate '{name}' is not registered in this space")]
    UnknownPredicate { name: String },

    #[error("morph '{name}' is not registered in this space")]
    UnknownMorph { name: String },

    #[error("the schema is unsatisfiable: {0}")]
    Contradiction(String),

    #[error(
        "a union containing a morph must be discriminable; branches {summary} cannot be \
         distinguished without applying the transform"
    )]
    IndiscriminableMorphUnion { summary: String },
}

impl SchemaError {
    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> SchemaError {
        SchemaError::Malformed {
            kind,
            reason: reason.into(),
        }
    }
}
