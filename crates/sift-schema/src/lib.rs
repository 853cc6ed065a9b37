//! Schema/constraint engine over an immutable, interned node graph.
//!
//! Types — string domains, literal units, object and array shapes,
//! numeric/length ranges, regex patterns, custom predicates, morphing
//! transforms, and unions/intersections of all of the above — are
//! represented as nodes in a [`Space`]. The engine:
//!
//! - **Interns** structurally: one node instance per normalized
//!   definition, so id equality is structural equality.
//! - **Intersects** any two nodes, producing a more specific node or a
//!   [`Disjoint`] proof that no value satisfies both.
//! - **Discriminates** unions: compiles branch sets into decision trees
//!   dispatching on cheap (path, kind) discriminants instead of scanning.
//! - **Traverses** values, reporting every violation found in one pass as
//!   a path-keyed [`Violations`] collection; self-referential schemas
//!   terminate via an alias cycle guard.
//!
//! ```
//! use serde_json::json;
//! use sift_schema::Space;
//!
//! let space = Space::new();
//! let even = space.node(json!({"domain": "number", "divisor": 2})).unwrap();
//! assert!(even.allows(&json!(4)));
//! assert!(!even.allows(&json!(3)));
//! ```

mod discriminate;
mod disjoint;
mod errors;
mod intersect;
mod node;
mod parse;
mod space;
mod traverse;
mod violations;

pub use discriminate::{DiscrKind, DiscrTree, DiscriminantPlan, SwitchNode};
pub use disjoint::{Disjoint, DisjointEntry, DisjointKind};
pub use errors::SchemaError;
pub use node::{
    Bound, Domain, MorphFn, NodeFlags, NodeId, NodeKind, OrderedFloat, PredicateFn, Proto, Seg,
    UndeclaredKeys, UnitValue, path_to_string,
};
pub use parse::SchemaDef;
pub use space::{Composed, Node, Space};
pub use violations::{Violation, ViolationKind, Violations};
