//! Proof of emptiness for an intersection.
//!
//! A [`Disjoint`] is a first-class return value, not an exception: the
//! intersection engine threads it through recursive calls as ordinary
//! control flow (the discrimination compiler *wants* empty intersections),
//! and only [`Disjoint::into_error`] converts it into a thrown
//! [`SchemaError`] at an explicit boundary.
//!
//! Each entry records where two nodes provably diverge: the path under the
//! intersected root, the kind of divergence, and json snapshots of the two
//! conflicting sides.

use serde_json::Value;

use crate::errors::SchemaError;
use crate::node::{Seg, path_to_string};

/// The kind of conflict that made an intersection empty.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DisjointKind {
    /// Incompatible value domains (string vs number).
    Domain,
    /// Unequal literal values.
    Unit,
    /// Incompatible container shapes (Array vs Map).
    Proto,
    /// An empty numeric/length range (min above max).
    Range,
    /// Two morphs under `&` — the same value cannot be transformed two ways.
    Morph,
    /// A required key whose value type is unsatisfiable.
    Presence,
    /// Incompatible tuple layouts (e.g. differing fixed lengths).
    Sequence,
    /// A union all of whose branches are individually disjoint with the
    /// other operand.
    Union,
}

impl DisjointKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            DisjointKind::Domain => "domain",
            DisjointKind::Unit => "unit",
            DisjointKind::Proto => "proto",
            DisjointKind::Range => "range",
            DisjointKind::Morph => "morph",
            DisjointKind::Presence => "presence",
            DisjointKind::Sequence => "sequence",
            DisjointKind::Union => "union",
        }
    }
}

/// One recorded conflict.
#[derive(Clone, Debug)]
pub struct DisjointEntry {
    pub path: Vec<Seg>,
    pub kind: DisjointKind,
    /// Json snapshot of the left side at the conflict point.
    pub l: Value,
    /// Json snapshot of the right side at the conflict point.
    pub r: Value,
}

/// A structured proof that two nodes' intersection accepts no values.
///
/// Multiple independent conflicts found under one intersection pass are
/// merged into a single value.
#[derive(Clone, Debug, Default)]
pub struct Disjoint {
    entries: Vec<DisjointEntry>,
}

impl Disjoint {
    pub fn new(kind: DisjointKind, l: Value, r: Value) -> Disjoint {
        Disjoint {
            entries: vec![DisjointEntry {
                path: Vec::new(),
                kind,
                l,
                r,
            }],
        }
    }

    pub fn entries(&self) -> &[DisjointEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Fold another proof's conflicts into this one.
    pub fn merge(&mut self, other: Disjoint) {
        self.entries.extend(other.entries);
    }

    /// Swap every entry's left and right side. Used when a cached result is
    /// reused with flipped operand order.
    #[must_use]
    pub fn invert(mut self) -> Disjoint {
        for entry in &mut self.entries {
            std::mem::swap(&mut entry.l, &mut entry.r);
        }
        self
    }

    /// Re-root every recorded path under `seg`, so a conflict discovered
    /// while intersecting a nested member is reported relative to the
    /// containing node.
    #[must_use]
    pub fn with_prefix(mut self, seg: Seg) -> Disjoint {
        for entry in &mut self.entries {
            entry.path.insert(0, seg.clone());
        }
        self
    }

    /// Human-readable description of every conflicting path.
    pub fn describe(&self) -> String {
        let mut parts = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let at = path_to_string(&entry.path);
            let prefix = if at.is_empty() {
                String::new()
            } else {
                format!("at {at}: ")
            };
            parts.push(format!(
                "{prefix}{} conflict between {} and {}",
                entry.kind.as_str(),
                entry.l,
                entry.r
            ));
        }
        parts.join("; ")
    }

    /// The explicit throw boundary: convert this proof into a parse error.
    pub fn into_error(self) -> SchemaError {
        SchemaError::Contradiction(self.describe())
    }
}

#[cfg(test)]
#[path = "tests/disjoint_tests.rs"]
mod tests;
