//! The node space: arena, interning cache, alias table, and public handles.
//!
//! All nodes live in a single [`Space`]. Construction goes through
//! [`Space::intern_node`], which computes the two structural projections
//! (`json` including meta, `type_json` excluding it), derives the identity
//! strings, runs the kind's reduce hook, and consults the interning cache —
//! so for a given normalized definition exactly one node instance exists
//! per space, and id equality is structural equality.
//!
//! The engine is synchronous and single-threaded: every cache is an
//! ordinary map behind one `RefCell`. A concurrent port would need to
//! shard or lock these; correctness only requires "first writer wins".

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};
use sift_common::{Atom, Interner};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

use crate::disjoint::Disjoint;
use crate::errors::SchemaError;
use crate::intersect::Meet;
use crate::node::{
    MorphFn, MorphStep, NodeData, NodeFlags, NodeId, NodeKind, NodeMeta, NodeRecord, PredicateFn,
    UndeclaredKeys, UnitValue,
};
use crate::violations::Violations;

pub(crate) struct SpaceInner {
    pub nodes: Vec<Rc<NodeRecord>>,
    pub by_inner_id: FxHashMap<Rc<str>, NodeId>,
    pub aliases: FxHashMap<Atom, NodeId>,
    pub predicates: FxHashMap<Atom, PredicateFn>,
    pub morphs: FxHashMap<Atom, MorphFn>,
    pub meet_cache: FxHashMap<String, Meet>,
    pub meets_in_flight: FxHashSet<String>,
    pub kind_counters: FxHashMap<NodeKind, u32>,
    pub atoms: Interner,
}

/// The process-wide home of a schema graph.
///
/// Nodes are created only through the parse entry points and live as long
/// as the space; handles are plain indices, so the graph can share
/// children freely without ownership cycles.
pub struct Space {
    pub(crate) inner: RefCell<SpaceInner>,
}

impl Space {
    pub fn new() -> Space {
        let mut atoms = Interner::new();
        atoms.intern_common();
        Space {
            inner: RefCell::new(SpaceInner {
                nodes: Vec::new(),
                by_inner_id: FxHashMap::default(),
                aliases: FxHashMap::default(),
                predicates: FxHashMap::default(),
                morphs: FxHashMap::default(),
                meet_cache: FxHashMap::default(),
                meets_in_flight: FxHashSet::default(),
                kind_counters: FxHashMap::default(),
                atoms,
            }),
        }
    }

    /// Number of interned nodes.
    pub fn len(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().nodes.is_empty()
    }

    /// Register a named predicate usable from `{"predicate": "<name>"}` defs.
    pub fn register_predicate(
        &self,
        name: &str,
        func: impl Fn(&Value) -> bool + 'static,
    ) {
        let atom = self.atom(name);
        self.inner
            .borrow_mut()
            .predicates
            .insert(atom, Rc::new(func));
    }

    /// Register a named morph usable from `{"morphs": ["<name>"]}` defs.
    pub fn register_morph(
        &self,
        name: &str,
        func: impl Fn(Value) -> Result<Value, String> + 'static,
    ) {
        let atom = self.atom(name);
        self.inner.borrow_mut().morphs.insert(atom, Rc::new(func));
    }

    // =========================================================================
    // Internal access
    // =========================================================================

    #[inline]
    pub(crate) fn rec(&self, id: NodeId) -> Rc<NodeRecord> {
        self.inner.borrow().nodes[id.0 as usize].clone()
    }

    #[inline]
    pub(crate) fn atom(&self, s: &str) -> Atom {
        self.inner.borrow_mut().atoms.intern(s)
    }

    #[inline]
    pub(crate) fn resolve_atom(&self, atom: Atom) -> Rc<str> {
        let arc = self.inner.borrow().atoms.resolve_arc(atom);
        Rc::from(arc.as_ref())
    }

    pub(crate) fn predicate_fn(&self, name: Atom) -> Option<PredicateFn> {
        self.inner.borrow().predicates.get(&name).cloned()
    }

    pub(crate) fn morph_fn(&self, name: Atom) -> Option<MorphFn> {
        self.inner.borrow().morphs.get(&name).cloned()
    }

    /// Bind an alias name to an already-interned node.
    pub(crate) fn bind_alias(&self, name: Atom, id: NodeId) {
        self.inner.borrow_mut().aliases.insert(name, id);
    }

    /// Resolve an alias name to its bound node.
    pub(crate) fn resolve_alias(&self, name: Atom) -> Result<NodeId, SchemaError> {
        self.inner.borrow().aliases.get(&name).copied().ok_or_else(|| {
            SchemaError::UnresolvedAlias {
                name: self.resolve_atom(name).to_string(),
            }
        })
    }

    // =========================================================================
    // Interning
    // =========================================================================

    /// Intern a node: project, identify, reduce, dedup, allocate.
    ///
    /// The reduce hook runs *before* the cache line is written, and a
    /// reduced replacement is cached under the original identity so the
    /// unreduced spelling keeps hitting the same instance.
    pub(crate) fn intern_node(
        &self,
        data: NodeData,
        meta: NodeMeta,
    ) -> Result<NodeId, SchemaError> {
        let kind = data.kind();
        let json = self.project(&data, &meta, true);
        let inner_id: Rc<str> = Rc::from(format!("{}:{}", kind.as_str(), canonical_string(&json)));

        if let Some(&cached) = self.inner.borrow().by_inner_id.get(&inner_id) {
            return Ok(cached);
        }

        match self.reduce_data(&data)? {
            Some(target) => {
                trace!(id = %inner_id, "reduced at parse time");
                self.inner
                    .borrow_mut()
                    .by_inner_id
                    .insert(inner_id, target);
                return Ok(target);
            }
            None => {}
        }

        let type_json = self.project(&data, &meta, false);
        let type_id: Rc<str> =
            Rc::from(format!("{}:{}", kind.as_str(), canonical_string(&type_json)));
        let flags = self.compute_flags(&data);

        let mut inner = self.inner.borrow_mut();
        let counter = inner.kind_counters.entry(kind).or_insert(0);
        *counter += 1;
        let debug_name = format!("{}{}", kind.as_str(), *counter);

        let id = NodeId(inner.nodes.len() as u32);
        let record = NodeRecord {
            kind,
            data,
            json,
            type_json,
            inner_id: inner_id.clone(),
            type_id,
            meta,
            flags,
            debug_name,
        };
        trace!(id = id.0, name = %record.debug_name, "interned node");
        inner.nodes.push(Rc::new(record));
        inner.by_inner_id.insert(inner_id, id);
        Ok(id)
    }

    fn compute_flags(&self, data: &NodeData) -> NodeFlags {
        let mut flags = NodeFlags::empty();
        match data {
            NodeData::Morph(_) => flags |= NodeFlags::CONTAINS_MORPH,
            NodeData::Alias(_) => flags |= NodeFlags::CONTAINS_ALIAS,
            NodeData::Intersection(inner) if inner.undeclared == UndeclaredKeys::Prune => {
                flags |= NodeFlags::CONTAINS_PRUNE;
            }
            _ => {}
        }
        for child in data.children() {
            flags |= self.rec(child).flags;
        }
        flags
    }

    // =========================================================================
    // Structural projection
    // =========================================================================

    /// Build the json projection of a node's inner data.
    ///
    /// `with_meta` selects between `json` (meta keys included, children
    /// embedded by their own `json`) and `type_json` (meta excluded,
    /// children embedded by `type_json`).
    ///
    /// A node whose only non-implied key equals its collapsible key
    /// serializes as that key's value directly, so `{"rule": 3}` and the
    /// bare literal `3` share one identity. Meta keys force the object
    /// form back open.
    pub(crate) fn project(&self, data: &NodeData, meta: &NodeMeta, with_meta: bool) -> Value {
        let embed = |id: NodeId| -> Value {
            let rec = self.rec(id);
            if with_meta {
                rec.json.clone()
            } else {
                rec.type_json.clone()
            }
        };

        let mut obj = Map::new();
        let mut collapsible: Option<&'static str> = None;

        match data {
            NodeData::Alias(name) => {
                obj.insert("resolve".into(), Value::String(self.resolve_atom(*name).to_string()));
                collapsible = Some("resolve");
            }
            NodeData::Domain(d) => {
                obj.insert("domain".into(), Value::String(d.as_str().to_string()));
                collapsible = Some("domain");
            }
            NodeData::Proto(p) => {
                obj.insert("proto".into(), Value::String(p.as_str().to_string()));
                collapsible = Some("proto");
            }
            NodeData::Unit(u) => {
                obj.insert("unit".into(), self.unit_to_json(*u));
                collapsible = Some("unit");
            }
            NodeData::Divisor(rule) => {
                obj.insert("rule".into(), Value::from(*rule));
                collapsible = Some("rule");
            }
            NodeData::Min(bound) | NodeData::Max(bound) => {
                obj.insert("rule".into(), crate::node::number_json(bound.rule.0));
                if bound.exclusive {
                    obj.insert("exclusive".into(), Value::Bool(true));
                } else {
                    collapsible = Some("rule");
                }
            }
            NodeData::Pattern(p) => {
                obj.insert("rule".into(), Value::String(p.source.to_string()));
                collapsible = Some("rule");
            }
            NodeData::Predicate(p) => {
                obj.insert(
                    "rule".into(),
                    Value::String(self.resolve_atom(p.name).to_string()),
                );
                collapsible = Some("rule");
            }
            NodeData::Required(p) | NodeData::Optional(p) => {
                obj.insert(
                    "key".into(),
                    Value::String(self.resolve_atom(p.key).to_string()),
                );
                obj.insert("value".into(), embed(p.value));
            }
            NodeData::Index(i) => {
                obj.insert("signature".into(), embed(i.signature));
                obj.insert("value".into(), embed(i.value));
            }
            NodeData::Sequence(s) => {
                if !s.prefix.is_empty() {
                    obj.insert(
                        "prefix".into(),
                        Value::Array(s.prefix.iter().map(|&id| embed(id)).collect()),
                    );
                }
                if let Some(v) = s.variadic {
                    obj.insert("variadic".into(), embed(v));
                }
                if !s.postfix.is_empty() {
                    obj.insert(
                        "postfix".into(),
                        Value::Array(s.postfix.iter().map(|&id| embed(id)).collect()),
                    );
                }
                if s.prefix.is_empty() && s.postfix.is_empty() && s.variadic.is_some() {
                    collapsible = Some("variadic");
                }
            }
            NodeData::Union(u) => {
                obj.insert(
                    "branches".into(),
                    Value::Array(u.branches.iter().map(|&id| embed(id)).collect()),
                );
                collapsible = Some("branches");
            }
            NodeData::Morph(m) => {
                obj.insert("in".into(), embed(m.input));
                let steps: Vec<Value> = m
                    .steps
                    .iter()
                    .map(|step| match step {
                        MorphStep::Apply(f) => {
                            Value::String(self.resolve_atom(f.name).to_string())
                        }
                        MorphStep::Check(id) => {
                            let mut check = Map::new();
                            check.insert("check".into(), embed(*id));
                            Value::Object(check)
                        }
                    })
                    .collect();
                obj.insert("morphs".into(), Value::Array(steps));
            }
            NodeData::Intersection(inner) => {
                let embed_basis = |id: NodeId| {
                    let rec = self.rec(id);
                    let key = rec.kind.as_str().to_string();
                    let value = if with_meta {
                        rec.json.clone()
                    } else {
                        rec.type_json.clone()
                    };
                    (key, value)
                };
                if let Some(basis) = inner.basis {
                    let (key, value) = embed_basis(basis);
                    obj.insert(key, value);
                }
                if let Some(id) = inner.divisor {
                    obj.insert("divisor".into(), embed(id));
                }
                if let Some(id) = inner.min {
                    obj.insert("min".into(), embed(id));
                }
                if let Some(id) = inner.max {
                    obj.insert("max".into(), embed(id));
                }
                let list = |ids: &[NodeId]| -> Value {
                    if ids.len() == 1 {
                        embed(ids[0])
                    } else {
                        Value::Array(ids.iter().map(|&id| embed(id)).collect())
                    }
                };
                if !inner.patterns.is_empty() {
                    obj.insert("pattern".into(), list(&inner.patterns));
                }
                if !inner.predicates.is_empty() {
                    obj.insert("predicate".into(), list(&inner.predicates));
                }
                if !inner.required.is_empty() {
                    obj.insert(
                        "required".into(),
                        Value::Array(inner.required.iter().map(|&id| embed(id)).collect()),
                    );
                }
                if !inner.optional.is_empty() {
                    obj.insert(
                        "optional".into(),
                        Value::Array(inner.optional.iter().map(|&id| embed(id)).collect()),
                    );
                }
                if !inner.index.is_empty() {
                    obj.insert(
                        "index".into(),
                        Value::Array(inner.index.iter().map(|&id| embed(id)).collect()),
                    );
                }
                if let Some(id) = inner.sequence {
                    obj.insert("sequence".into(), embed(id));
                }
                if inner.undeclared != UndeclaredKeys::Ignore {
                    obj.insert(
                        "undeclared".into(),
                        Value::String(inner.undeclared.as_str().to_string()),
                    );
                }
            }
        }

        let has_meta = with_meta && !meta.is_empty();
        if has_meta {
            if let Some(desc) = &meta.description {
                obj.insert("description".into(), Value::String(desc.clone()));
            }
            if let Some(alias) = meta.alias_name {
                obj.insert(
                    "alias".into(),
                    Value::String(self.resolve_atom(alias).to_string()),
                );
            }
        }

        if !has_meta
            && let Some(key) = collapsible
            && obj.len() == 1
        {
            return obj.remove(key).unwrap_or(Value::Null);
        }
        Value::Object(obj)
    }

    pub(crate) fn unit_to_json(&self, unit: UnitValue) -> Value {
        match unit {
            UnitValue::Null => Value::Null,
            UnitValue::Bool(b) => Value::Bool(b),
            UnitValue::Number(n) => crate::node::number_json(n.0),
            UnitValue::String(s) => Value::String(self.resolve_atom(s).to_string()),
        }
    }
}

impl Default for Space {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic stringification: object keys sorted lexically at every
/// level. This is the identity format behind `inner_id`/`type_id`.
pub(crate) fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(_) | Value::Number(_) | Value::String(_) => out.push_str(&value.to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
    }
}

// =============================================================================
// Public node handle
// =============================================================================

/// A cheap handle to an interned node.
#[derive(Copy, Clone)]
pub struct Node<'s> {
    pub(crate) space: &'s Space,
    pub(crate) id: NodeId,
}

/// Result of composing two nodes.
pub enum Composed<'s> {
    /// The intersection is inhabited; here is the (possibly already
    /// interned) more specific node.
    Overlap(Node<'s>),
    /// Proof that no value satisfies both operands.
    Never(Disjoint),
}

impl<'s> Composed<'s> {
    /// Unwrap the overlap, converting a `Never` into a thrown parse error.
    pub fn require(self) -> Result<Node<'s>, SchemaError> {
        match self {
            Composed::Overlap(node) => Ok(node),
            Composed::Never(disjoint) => Err(disjoint.into_error()),
        }
    }

    pub fn disjoint(self) -> Option<Disjoint> {
        match self {
            Composed::Overlap(_) => None,
            Composed::Never(d) => Some(d),
        }
    }
}

impl<'s> Node<'s> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.space.rec(self.id).kind
    }

    /// Structural projection including meta attributes.
    pub fn json(&self) -> Value {
        self.space.rec(self.id).json.clone()
    }

    /// Structural projection excluding meta attributes.
    pub fn type_json(&self) -> Value {
        self.space.rec(self.id).type_json.clone()
    }

    /// Full structural identity (meta included).
    pub fn inner_id(&self) -> Rc<str> {
        self.space.rec(self.id).inner_id.clone()
    }

    /// Type identity: equal for nodes differing only in description/alias.
    pub fn type_id(&self) -> Rc<str> {
        self.space.rec(self.id).type_id.clone()
    }

    pub fn debug_name(&self) -> String {
        self.space.rec(self.id).debug_name.clone()
    }

    pub fn description(&self) -> Option<String> {
        self.space.rec(self.id).meta.description.clone()
    }

    /// Structural equality (which, by interning, is id equality).
    pub fn equals(&self, other: Node<'_>) -> bool {
        self.id == other.id
    }

    /// Human-readable description of what this node accepts.
    pub fn describe(&self) -> String {
        self.space.describe(self.id)
    }

    /// Boolean-only fast path: does this node accept the value?
    pub fn allows(&self, data: &Value) -> bool {
        self.space.allows(self.id, data)
    }

    /// Full traversal: every violation in `data`, or `Ok`.
    pub fn check(&self, data: &Value) -> Result<(), Violations> {
        let violations = self.space.check(self.id, data);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Validating transform: checks `data` and applies any morphs,
    /// producing the piped output (identity for morph-free schemas).
    pub fn morph(&self, data: Value) -> Result<Value, Violations> {
        self.space.morph_value(self.id, data)
    }

    /// Structural intersection with another node of this space.
    pub fn intersect(&self, other: Node<'s>) -> Result<Composed<'s>, SchemaError> {
        match self.space.intersect_ids(self.id, other.id)? {
            Ok(id) => Ok(Composed::Overlap(Node {
                space: self.space,
                id,
            })),
            Err(disjoint) => Ok(Composed::Never(disjoint)),
        }
    }

    /// Sequencing composition: this node's output piped into `other`.
    pub fn pipe(&self, other: Node<'s>) -> Result<Composed<'s>, SchemaError> {
        match self.space.pipe_ids(self.id, other.id)? {
            Ok(id) => Ok(Composed::Overlap(Node {
                space: self.space,
                id,
            })),
            Err(disjoint) => Ok(Composed::Never(disjoint)),
        }
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rec = self.space.rec(self.id);
        f.debug_struct("Node")
            .field("name", &rec.debug_name)
            .field("type_id", &rec.type_id)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/space_tests.rs"]
mod tests;
