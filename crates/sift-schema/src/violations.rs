//! Data-validation error model.
//!
//! Traversal never throws: every violation found in a value is accumulated
//! into a [`Violations`] collection so one `check` call reports everything
//! wrong in a single pass.
//!
//! Violations are keyed by serialized path. A second violation landing on a
//! path already holding one is merged into a single combined diagnostic
//! rather than appended, so a value failing two constraints on the same
//! field produces one entry.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// The constraint family a violation came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    Domain,
    Unit,
    Proto,
    Divisor,
    Bound,
    Pattern,
    Predicate,
    Missing,
    Extraneous,
    Length,
    Union,
    Morph,
    /// An alias reference that is not bound in the space.
    Unresolved,
    /// Merged diagnostic for multiple violations at one path.
    Intersection,
}

/// A single typed violation at one path.
#[derive(Clone, Debug, Serialize)]
pub struct Violation {
    /// Serialized path (`a.b[0]`); empty for the root.
    pub path: String,
    pub kind: ViolationKind,
    /// What the constraint expected, in prose ("a string", "a multiple of 3").
    pub expected: String,
    /// Snapshot of the offending value.
    pub actual: String,
}

impl Violation {
    pub fn message(&self) -> String {
        if self.path.is_empty() {
            format!("must be {} (was {})", self.expected, self.actual)
        } else {
            format!("{} must be {} (was {})", self.path, self.expected, self.actual)
        }
    }

    /// Merge a second violation at the same path into one combined
    /// diagnostic.
    fn absorb(&mut self, other: Violation) {
        if self.expected != other.expected {
            self.expected = format!("{} and {}", self.expected, other.expected);
            self.kind = ViolationKind::Intersection;
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// All violations found by one traversal, in first-encounter path order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Violations {
    by_path: IndexMap<String, Violation>,
}

impl Violations {
    pub fn new() -> Violations {
        Violations::default()
    }

    /// Record a violation, merging with any existing one at the same path.
    pub fn add(&mut self, violation: Violation) {
        match self.by_path.get_mut(&violation.path) {
            Some(existing) => existing.absorb(violation),
            None => {
                self.by_path.insert(violation.path.clone(), violation);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// The violation recorded at a serialized path, if any.
    pub fn at_path(&self, path: &str) -> Option<&Violation> {
        self.by_path.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.by_path.values()
    }

    /// One line per violation.
    pub fn summary(&self) -> String {
        self.by_path
            .values()
            .map(|v| v.message())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a Violation;
    type IntoIter = indexmap::map::Values<'a, String, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.by_path.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(path: &str, kind: ViolationKind, expected: &str) -> Violation {
        Violation {
            path: path.to_string(),
            kind,
            expected: expected.to_string(),
            actual: "\"x\"".to_string(),
        }
    }

    #[test]
    fn second_violation_on_same_path_merges() {
        let mut violations = Violations::new();
        violations.add(violation("a", ViolationKind::Domain, "a number"));
        violations.add(violation("a", ViolationKind::Divisor, "a multiple of 2"));

        assert_eq!(violations.len(), 1);
        let merged = violations.at_path("a").unwrap();
        assert_eq!(merged.kind, ViolationKind::Intersection);
        assert_eq!(merged.expected, "a number and a multiple of 2");
    }

    #[test]
    fn identical_violations_do_not_duplicate_expected() {
        let mut violations = Violations::new();
        violations.add(violation("a", ViolationKind::Domain, "a number"));
        violations.add(violation("a", ViolationKind::Domain, "a number"));

        let merged = violations.at_path("a").unwrap();
        assert_eq!(merged.expected, "a number");
        assert_eq!(merged.kind, ViolationKind::Domain);
    }

    #[test]
    fn distinct_paths_stay_separate() {
        let mut violations = Violations::new();
        violations.add(violation("a", ViolationKind::Domain, "a number"));
        violations.add(violation("b", ViolationKind::Missing, "present"));

        assert_eq!(violations.len(), 2);
        let paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b"]);
    }

    #[test]
    fn summary_is_one_line_per_violation() {
        let mut violations = Violations::new();
        violations.add(violation("a", ViolationKind::Domain, "a number"));
        violations.add(violation("b", ViolationKind::Missing, "present"));

        let summary = violations.summary();
        assert_eq!(summary.lines().count(), 2);
        assert!(summary.contains("a must be a number"));
    }
}
