//! String interner for key and name deduplication.
//!
//! Property keys, alias names, and predicate/morph names recur constantly
//! across a schema graph. Interning them into a pool and passing around u32
//! indices (Atoms) eliminates duplicate string allocations and turns key
//! comparisons into integer comparisons.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;

/// An interned string identifier.
///
/// Atoms are cheap to copy (just a u32) and can be compared with == in O(1).
/// To get the actual string, use `Interner::resolve(atom)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Default, PartialOrd, Ord)]
pub struct Atom(pub u32);

impl Atom {
    /// A sentinel value representing no atom / empty string.
    pub const NONE: Atom = Atom(0);

    /// Check if this is the empty/none atom.
    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Get the raw index value.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

const COMMON_STRINGS: &[&str] = &[
    // Kind and schema keys
    "domain",
    "unit",
    "proto",
    "union",
    "intersection",
    "morph",
    "divisor",
    "min",
    "max",
    "pattern",
    "predicate",
    "required",
    "optional",
    "index",
    "sequence",
    "branches",
    "morphs",
    "rule",
    "key",
    "value",
    "signature",
    "prefix",
    "variadic",
    "postfix",
    "exclusive",
    "undeclared",
    "description",
    "alias",
    // Domain names
    "string",
    "number",
    "boolean",
    "object",
    "null",
    // Proto names
    "Array",
    "Map",
    // Common property keys
    "id",
    "name",
    "kind",
    "type",
    "data",
    "items",
    "length",
    "next",
];

/// String interner that deduplicates strings and returns Atom handles.
///
/// # Example
/// ```
/// use sift_common::Interner;
/// let mut interner = Interner::new();
/// let a1 = interner.intern("hello");
/// let a2 = interner.intern("hello");
/// assert_eq!(a1, a2); // Same atom for same string
/// assert_eq!(interner.resolve(a1), "hello");
/// ```
#[derive(Default)]
pub struct Interner {
    /// Map from string to atom index
    map: FxHashMap<Arc<str>, Atom>,
    /// Vector of all interned strings (index 0 is empty string)
    strings: Vec<Arc<str>>,
}

impl Interner {
    /// Create a new interner with the empty string pre-interned at index 0.
    pub fn new() -> Self {
        let mut interner = Interner {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(256),
        };
        // Index 0 is reserved for empty/none
        let empty: Arc<str> = Arc::from("");
        interner.strings.push(empty.clone());
        interner.map.insert(empty, Atom::NONE);
        interner
    }

    /// Intern a string, returning its Atom handle.
    /// If the string was already interned, returns the existing Atom.
    #[inline]
    pub fn intern(&mut self, s: &str) -> Atom {
        if let Some(&atom) = self.map.get(s) {
            return atom;
        }
        let atom = Atom(self.strings.len() as u32);
        let owned: Arc<str> = Arc::from(s);
        self.strings.push(owned.clone());
        self.map.insert(owned, atom);
        atom
    }

    /// Intern an owned String, avoiding allocation if possible.
    #[inline]
    pub fn intern_owned(&mut self, s: String) -> Atom {
        if let Some(&atom) = self.map.get(s.as_str()) {
            return atom;
        }
        let atom = Atom(self.strings.len() as u32);
        let owned: Arc<str> = Arc::from(s.into_boxed_str());
        self.strings.push(owned.clone());
        self.map.insert(owned, atom);
        atom
    }

    /// Resolve an Atom back to its string value.
    /// Returns empty string if atom is out of bounds (safety for error recovery).
    #[inline]
    pub fn resolve(&self, atom: Atom) -> &str {
        self.strings
            .get(atom.0 as usize)
            .map(|s| s.as_ref())
            .unwrap_or("")
    }

    /// Resolve an Atom into a shared handle.
    #[inline]
    pub fn resolve_arc(&self, atom: Atom) -> Arc<str> {
        self.strings
            .get(atom.0 as usize)
            .cloned()
            .unwrap_or_else(|| Arc::from(""))
    }

    /// Try to resolve an Atom, returning None if invalid.
    #[inline]
    pub fn try_resolve(&self, atom: Atom) -> Option<&str> {
        self.strings.get(atom.0 as usize).map(|s| s.as_ref())
    }

    /// Get the number of interned strings.
    #[inline]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Check if the interner is empty (only has the empty string).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strings.len() <= 1
    }

    /// Pre-intern common schema keys and domain names.
    /// Call this after creating the interner for better cache locality.
    pub fn intern_common(&mut self) {
        for s in COMMON_STRINGS {
            self.intern(s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_returns_same_atom_for_same_string() {
        let mut interner = Interner::new();
        let a = interner.intern("divisor");
        let b = interner.intern("divisor");
        let c = interner.intern("pattern");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_string_is_none() {
        let mut interner = Interner::new();
        assert_eq!(interner.intern(""), Atom::NONE);
        assert!(Atom::NONE.is_none());
        assert_eq!(interner.resolve(Atom::NONE), "");
    }

    #[test]
    fn resolve_out_of_bounds_is_empty() {
        let interner = Interner::new();
        assert_eq!(interner.resolve(Atom(9999)), "");
        assert!(interner.try_resolve(Atom(9999)).is_none());
    }

    #[test]
    fn intern_owned_avoids_duplicates() {
        let mut interner = Interner::new();
        let a = interner.intern("key");
        let b = interner.intern_owned("key".to_string());
        assert_eq!(a, b);
        let before = interner.len();
        interner.intern_owned("key".to_string());
        assert_eq!(interner.len(), before);
    }
}
