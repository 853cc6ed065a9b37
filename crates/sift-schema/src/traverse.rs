//! Traversal: executing compiled checks against concrete values.
//!
//! Three walks share the same structure:
//!
//! - `allows` — boolean-only fast path, no error construction. Composite
//!   nodes use it internally (e.g. picking a union case) without paying
//!   for diagnostics.
//! - `check` — full traversal, accumulating every violation with its path.
//! - `morph_rec` — validating transform, rebuilding the value where morphs
//!   or pruning apply.
//!
//! The context carries the current path, the violation collector, and the
//! alias cycle guard: a map from alias name to the data addresses already
//! being validated through it. Re-entering the same (alias, address) pair
//! short-circuits as satisfied — a value that reached this point through
//! the same alias must already have been accepted upstream, or validation
//! would have failed before recursing.

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use sift_common::Atom;
use smallvec::SmallVec;

use crate::discriminate::{DiscrKind, DiscrTree, SwitchNode};
use crate::node::{
    Bound, IntersectionInner, MorphStep, NodeData, NodeFlags, NodeId, PropInner, Seg,
    SequenceInner, UndeclaredKeys, UnitValue, domain_name_of, path_to_string,
};
use crate::space::Space;
use crate::violations::{Violation, ViolationKind, Violations};

const SNIPPET_LIMIT: usize = 40;

/// Shared traversal state.
struct TraverseCtx {
    path: SmallVec<[Seg; 8]>,
    violations: Violations,
    seen: SeenGuard,
}

impl TraverseCtx {
    fn new() -> TraverseCtx {
        TraverseCtx {
            path: SmallVec::new(),
            violations: Violations::new(),
            seen: SeenGuard::default(),
        }
    }

    fn violate(&mut self, kind: ViolationKind, expected: String, actual: String) {
        self.violations.add(Violation {
            path: path_to_string(&self.path),
            kind,
            expected,
            actual,
        });
    }
}

/// Cycle guard: alias name → addresses of values currently being (or
/// already) validated through that alias in this traversal.
#[derive(Default)]
struct SeenGuard {
    entries: FxHashMap<Atom, SmallVec<[usize; 2]>>,
}

impl SeenGuard {
    /// Returns false when the (alias, address) pair was already seen.
    fn enter(&mut self, alias: Atom, value: &Value) -> bool {
        let addr = value as *const Value as usize;
        let entry = self.entries.entry(alias).or_default();
        if entry.contains(&addr) {
            false
        } else {
            entry.push(addr);
            true
        }
    }
}

impl Space {
    // =========================================================================
    // Boolean fast path
    // =========================================================================

    pub(crate) fn allows(&self, node: NodeId, value: &Value) -> bool {
        let mut seen = SeenGuard::default();
        self.allows_rec(node, value, &mut seen)
    }

    /// Leaf-level acceptance, shared with parse-time literal validation.
    pub(crate) fn refinement_allows(&self, node: NodeId, value: &Value) -> bool {
        self.allows(node, value)
    }

    fn allows_rec(&self, node: NodeId, value: &Value, seen: &mut SeenGuard) -> bool {
        let rec = self.rec(node);
        match &rec.data {
            NodeData::Alias(name) => {
                let Ok(resolution) = self.resolve_alias(*name) else {
                    return false;
                };
                if !seen.enter(*name, value) {
                    return true;
                }
                self.allows_rec(resolution, value, seen)
            }
            NodeData::Union(inner) => self.tree_allows(&inner.plan.root, value, seen),
            NodeData::Morph(inner) => self.allows_rec(inner.input, value, seen),
            NodeData::Intersection(inner) => self.bag_allows(inner, value, seen),
            NodeData::Unit(unit) => self.unit_matches(*unit, value),
            NodeData::Proto(proto) => proto.matches(value),
            NodeData::Domain(domain) => crate::node::Domain::of_value(value) == Some(*domain),
            NodeData::Divisor(rule) => divisor_ok(value, *rule),
            NodeData::Min(bound) => bound_ok(value, *bound, true),
            NodeData::Max(bound) => bound_ok(value, *bound, false),
            NodeData::Pattern(pattern) => {
                value.as_str().is_some_and(|s| pattern.regex.is_match(s))
            }
            NodeData::Predicate(predicate) => (predicate.func)(value),
            NodeData::Required(prop) => match value.as_object() {
                Some(map) => match map.get(self.resolve_atom(prop.key).as_ref()) {
                    Some(v) => self.allows_rec(prop.value, v, seen),
                    None => false,
                },
                None => false,
            },
            NodeData::Optional(prop) => match value.as_object() {
                Some(map) => match map.get(self.resolve_atom(prop.key).as_ref()) {
                    Some(v) => self.allows_rec(prop.value, v, seen),
                    None => true,
                },
                None => true,
            },
            NodeData::Index(index) => match value.as_object() {
                Some(map) => map.iter().all(|(key, v)| {
                    !self.allows(index.signature, &Value::String(key.clone()))
                        || self.allows_rec(index.value, v, seen)
                }),
                None => true,
            },
            NodeData::Sequence(seq) => match value.as_array() {
                Some(items) => self.sequence_allows(seq, items, seen),
                None => false,
            },
        }
    }

    fn bag_allows(&self, inner: &IntersectionInner, value: &Value, seen: &mut SeenGuard) -> bool {
        if let Some(basis) = inner.basis
            && !self.allows_rec(basis, value, seen)
        {
            return false;
        }
        for constraint in inner.children() {
            if Some(constraint) == inner.basis {
                continue;
            }
            if !self.allows_rec(constraint, value, seen) {
                return false;
            }
        }
        if inner.undeclared == UndeclaredKeys::Reject
            && let Some(map) = value.as_object()
            && map
                .keys()
                .any(|key| !self.key_is_declared(inner, key))
        {
            return false;
        }
        true
    }

    fn sequence_allows(&self, seq: &SequenceInner, items: &[Value], seen: &mut SeenGuard) -> bool {
        if !sequence_length_ok(seq, items.len()) {
            return false;
        }
        items.iter().enumerate().all(|(i, item)| {
            match sequence_slot(seq, i, items.len()) {
                Some(slot) => self.allows_rec(slot, item, seen),
                None => true,
            }
        })
    }

    fn tree_allows(&self, tree: &DiscrTree, value: &Value, seen: &mut SeenGuard) -> bool {
        match tree {
            DiscrTree::Leaf { pruned, .. } => self.allows_rec(*pruned, value, seen),
            DiscrTree::Linear(branches) => branches
                .iter()
                .any(|&branch| self.allows_rec(branch, value, seen)),
            DiscrTree::Switch(switch) => {
                let default_allows = |seen: &mut SeenGuard| match &switch.default {
                    Some(default) => self.tree_allows(&**default, value, seen),
                    None => false,
                };
                match self.switch_case(switch, value) {
                    Some(subtree) => {
                        self.tree_allows(subtree, value, seen) || default_allows(seen)
                    }
                    None => default_allows(seen),
                }
            }
        }
    }

    /// The case subtree a value dispatches to, if its discriminant value
    /// matches an observed case.
    fn switch_case<'t>(&self, switch: &'t SwitchNode, value: &Value) -> Option<&'t DiscrTree> {
        let at = value_at(value, &switch.path)?;
        let key = match switch.kind {
            DiscrKind::Domain => domain_name_of(at).to_string(),
            DiscrKind::Unit => match at {
                Value::Array(_) | Value::Object(_) => return None,
                Value::Number(n) => match n.as_f64() {
                    Some(n) => crate::node::number_json(n).to_string(),
                    None => return None,
                },
                primitive => primitive.to_string(),
            },
        };
        switch.cases.get(&key)
    }

    // =========================================================================
    // Full traversal
    // =========================================================================

    pub(crate) fn check(&self, node: NodeId, value: &Value) -> Violations {
        let mut ctx = TraverseCtx::new();
        self.check_rec(node, value, &mut ctx);
        ctx.violations
    }

    fn check_rec(&self, node: NodeId, value: &Value, ctx: &mut TraverseCtx) {
        let rec = self.rec(node);
        match &rec.data {
            NodeData::Alias(name) => match self.resolve_alias(*name) {
                Ok(resolution) => {
                    if ctx.seen.enter(*name, value) {
                        self.check_rec(resolution, value, ctx);
                    }
                }
                Err(_) => {
                    let name = self.resolve_atom(*name);
                    ctx.violate(
                        ViolationKind::Unresolved,
                        format!("a resolvable reference (alias '{name}' is unbound)"),
                        snippet(value),
                    );
                }
            },
            NodeData::Union(inner) => {
                self.check_union(node, &inner.plan.root, value, ctx);
            }
            NodeData::Morph(inner) => self.check_rec(inner.input, value, ctx),
            NodeData::Intersection(inner) => self.check_bag(inner, value, ctx),
            NodeData::Unit(unit) => {
                if !self.unit_matches(*unit, value) {
                    ctx.violate(ViolationKind::Unit, self.describe(node), snippet(value));
                }
            }
            NodeData::Proto(proto) => {
                if !proto.matches(value) {
                    ctx.violate(ViolationKind::Proto, self.describe(node), snippet(value));
                }
            }
            NodeData::Domain(domain) => {
                if crate::node::Domain::of_value(value) != Some(*domain) {
                    ctx.violate(ViolationKind::Domain, self.describe(node), snippet(value));
                }
            }
            NodeData::Divisor(rule) => {
                if !divisor_ok(value, *rule) {
                    ctx.violate(ViolationKind::Divisor, self.describe(node), snippet(value));
                }
            }
            NodeData::Min(bound) => {
                if !bound_ok(value, *bound, true) {
                    ctx.violate(ViolationKind::Bound, self.describe(node), snippet(value));
                }
            }
            NodeData::Max(bound) => {
                if !bound_ok(value, *bound, false) {
                    ctx.violate(ViolationKind::Bound, self.describe(node), snippet(value));
                }
            }
            NodeData::Pattern(pattern) => {
                if !value.as_str().is_some_and(|s| pattern.regex.is_match(s)) {
                    ctx.violate(ViolationKind::Pattern, self.describe(node), snippet(value));
                }
            }
            NodeData::Predicate(predicate) => {
                if !(predicate.func)(value) {
                    ctx.violate(
                        ViolationKind::Predicate,
                        self.describe(node),
                        snippet(value),
                    );
                }
            }
            NodeData::Required(prop) => self.check_prop(prop, true, value, ctx),
            NodeData::Optional(prop) => self.check_prop(prop, false, value, ctx),
            NodeData::Index(_) | NodeData::Sequence(_) => {
                if !self.allows(node, value) {
                    ctx.violate(ViolationKind::Length, self.describe(node), snippet(value));
                }
            }
        }
    }

    fn check_prop(&self, prop: &PropInner, required: bool, value: &Value, ctx: &mut TraverseCtx) {
        let key = self.resolve_atom(prop.key);
        match value.as_object().and_then(|map| map.get(key.as_ref())) {
            Some(v) => {
                ctx.path.push(Seg::Key(key));
                self.check_rec(prop.value, v, ctx);
                ctx.path.pop();
            }
            None if required => {
                ctx.path.push(Seg::Key(key));
                ctx.violate(
                    ViolationKind::Missing,
                    self.describe(prop.value),
                    "missing".to_string(),
                );
                ctx.path.pop();
            }
            None => {}
        }
    }

    /// Structural traversal of a bag. A failed basis short-circuits: the
    /// refinements of a number tell you nothing about a string.
    fn check_bag(&self, inner: &IntersectionInner, value: &Value, ctx: &mut TraverseCtx) {
        if let Some(basis) = inner.basis
            && !self.allows(basis, value)
        {
            ctx.violate(
                ViolationKind::Domain,
                self.describe(basis),
                snippet(value),
            );
            return;
        }

        for &id in inner
            .divisor
            .iter()
            .chain(&inner.min)
            .chain(&inner.max)
            .chain(&inner.patterns)
            .chain(&inner.predicates)
        {
            self.check_rec(id, value, ctx);
        }

        for &prop_id in inner.required.iter().chain(&inner.optional) {
            self.check_rec(prop_id, value, ctx);
        }

        if let Some(seq_id) = inner.sequence
            && let NodeData::Sequence(seq) = &self.rec(seq_id).data
        {
            self.check_sequence(seq, value, ctx);
        }

        // Exhaustive strategy: scan the value's own keys against index
        // signatures and the undeclared-key policy. The enumerable
        // strategy above already covered declared props.
        let exhaustive =
            !inner.index.is_empty() || inner.undeclared != UndeclaredKeys::Ignore;
        if exhaustive && let Some(map) = value.as_object() {
            for (key, v) in map {
                if self.key_is_declared_prop(inner, key) {
                    continue;
                }
                let mut matched_index = false;
                for &index_id in &inner.index {
                    if let NodeData::Index(index) = &self.rec(index_id).data
                        && self.allows(index.signature, &Value::String(key.clone()))
                    {
                        matched_index = true;
                        ctx.path.push(Seg::key(key));
                        self.check_rec(index.value, v, ctx);
                        ctx.path.pop();
                    }
                }
                if !matched_index && inner.undeclared == UndeclaredKeys::Reject {
                    ctx.path.push(Seg::key(key));
                    ctx.violate(
                        ViolationKind::Extraneous,
                        "removed".to_string(),
                        snippet(v),
                    );
                    ctx.path.pop();
                }
            }
        }
    }

    fn check_sequence(&self, seq: &SequenceInner, value: &Value, ctx: &mut TraverseCtx) {
        let Some(items) = value.as_array() else {
            return;
        };
        if !sequence_length_ok(seq, items.len()) {
            let expected = match seq.exact_length() {
                Some(len) => format!("an array of exactly {len} elements"),
                None => format!("an array of at least {} elements", seq.min_length()),
            };
            ctx.violate(
                ViolationKind::Length,
                expected,
                format!("{} elements", items.len()),
            );
            return;
        }
        for (i, item) in items.iter().enumerate() {
            if let Some(slot) = sequence_slot(seq, i, items.len()) {
                ctx.path.push(Seg::Item(i));
                self.check_rec(slot, item, ctx);
                ctx.path.pop();
            }
        }
    }

    fn check_union(
        &self,
        union: NodeId,
        tree: &DiscrTree,
        value: &Value,
        ctx: &mut TraverseCtx,
    ) {
        match tree {
            DiscrTree::Leaf { pruned, .. } => self.check_rec(*pruned, value, ctx),
            DiscrTree::Linear(branches) => {
                // The boolean path decides; per-branch diagnostics would be
                // noise when no branch is the intended one.
                let any = branches.iter().any(|&branch| self.allows(branch, value));
                if !any {
                    ctx.violate(ViolationKind::Union, self.describe(union), snippet(value));
                }
            }
            DiscrTree::Switch(switch) => {
                let default_allows = || match &switch.default {
                    Some(default) => {
                        let mut seen = SeenGuard::default();
                        self.tree_allows(&**default, value, &mut seen)
                    }
                    None => false,
                };
                match self.switch_case(switch, value) {
                    Some(subtree) => {
                        let mut seen = SeenGuard::default();
                        if self.tree_allows(subtree, value, &mut seen) || default_allows() {
                            return;
                        }
                        // The matched case carries the useful diagnostics.
                        self.check_union(union, subtree, value, ctx);
                    }
                    None => match &switch.default {
                        Some(default) => self.check_union(union, &**default, value, ctx),
                        None => ctx.violate(
                            ViolationKind::Union,
                            self.describe(union),
                            snippet(value),
                        ),
                    },
                }
            }
        }
    }

    fn key_is_declared_prop(&self, inner: &IntersectionInner, key: &str) -> bool {
        inner
            .required
            .iter()
            .chain(&inner.optional)
            .any(|&prop_id| match &self.rec(prop_id).data {
                NodeData::Required(p) | NodeData::Optional(p) => {
                    self.resolve_atom(p.key).as_ref() == key
                }
                _ => false,
            })
    }

    fn key_is_declared(&self, inner: &IntersectionInner, key: &str) -> bool {
        if self.key_is_declared_prop(inner, key) {
            return true;
        }
        inner.index.iter().any(|&index_id| {
            matches!(&self.rec(index_id).data, NodeData::Index(index)
                if self.allows(index.signature, &Value::String(key.to_string())))
        })
    }

    pub(crate) fn unit_matches(&self, unit: UnitValue, value: &Value) -> bool {
        match (unit, value) {
            (UnitValue::Null, Value::Null) => true,
            (UnitValue::Bool(b), Value::Bool(v)) => b == *v,
            (UnitValue::Number(n), Value::Number(v)) => {
                v.as_f64().is_some_and(|v| v == n.0)
            }
            (UnitValue::String(s), Value::String(v)) => {
                self.resolve_atom(s).as_ref() == v.as_str()
            }
            _ => false,
        }
    }

    // =========================================================================
    // Morph application
    // =========================================================================

    pub(crate) fn morph_value(&self, node: NodeId, value: Value) -> Result<Value, Violations> {
        let mut ctx = TraverseCtx::new();
        let out = self.morph_rec(node, value, &mut ctx);
        if ctx.violations.is_empty() {
            Ok(out)
        } else {
            Err(ctx.violations)
        }
    }

    /// Rebuild `value` through any morphs and pruning. Subtrees without
    /// transform-relevant flags are checked in place and passed through.
    fn morph_rec(&self, node: NodeId, value: Value, ctx: &mut TraverseCtx) -> Value {
        let rec = self.rec(node);
        let relevant = NodeFlags::CONTAINS_MORPH
            | NodeFlags::CONTAINS_PRUNE
            | NodeFlags::CONTAINS_ALIAS;
        if !rec.flags.intersects(relevant) {
            self.check_rec(node, &value, ctx);
            return value;
        }

        match &rec.data {
            NodeData::Morph(inner) => {
                let before = ctx.violations.len();
                let mut current = self.morph_rec(inner.input, value, ctx);
                if ctx.violations.len() > before {
                    return current;
                }
                for step in &inner.steps {
                    match step {
                        MorphStep::Apply(morph) => match (morph.func)(current) {
                            Ok(next) => current = next,
                            Err(reason) => {
                                ctx.violate(
                                    ViolationKind::Morph,
                                    format!(
                                        "transformable by '{}' ({reason})",
                                        self.resolve_atom(morph.name)
                                    ),
                                    String::new(),
                                );
                                return Value::Null;
                            }
                        },
                        MorphStep::Check(check) => {
                            let before = ctx.violations.len();
                            self.check_rec(*check, &current, ctx);
                            if ctx.violations.len() > before {
                                return current;
                            }
                        }
                    }
                }
                current
            }
            NodeData::Alias(name) => match self.resolve_alias(*name) {
                Ok(resolution) => {
                    if ctx.seen.enter(*name, &value) {
                        self.morph_rec(resolution, value, ctx)
                    } else {
                        value
                    }
                }
                Err(_) => {
                    let name = self.resolve_atom(*name);
                    ctx.violate(
                        ViolationKind::Unresolved,
                        format!("a resolvable reference (alias '{name}' is unbound)"),
                        snippet(&value),
                    );
                    value
                }
            },
            NodeData::Union(inner) => self.morph_union(node, &inner.plan.root, value, ctx),
            NodeData::Intersection(inner) => {
                let inner = inner.clone();
                self.morph_bag(&inner, value, ctx)
            }
            _ => {
                self.check_rec(node, &value, ctx);
                value
            }
        }
    }

    fn morph_union(
        &self,
        union: NodeId,
        tree: &DiscrTree,
        value: Value,
        ctx: &mut TraverseCtx,
    ) -> Value {
        match tree {
            DiscrTree::Leaf { pruned, .. } => self.morph_rec(*pruned, value, ctx),
            DiscrTree::Linear(branches) => {
                // Morphs inside multi-branch linear groups were rejected at
                // compile time, so a plain check suffices here.
                match branches.iter().find(|&&b| self.allows(b, &value)) {
                    Some(&branch) => self.morph_rec(branch, value, ctx),
                    None => {
                        ctx.violate(
                            ViolationKind::Union,
                            self.describe(union),
                            snippet(&value),
                        );
                        value
                    }
                }
            }
            DiscrTree::Switch(switch) => {
                let case = self.switch_case(switch, &value);
                match case {
                    Some(subtree) => {
                        let mut seen = SeenGuard::default();
                        if self.tree_allows(subtree, &value, &mut seen) {
                            return self.morph_union(union, subtree, value, ctx);
                        }
                        match &switch.default {
                            Some(default) => {
                                let mut seen = SeenGuard::default();
                                if self.tree_allows(&**default, &value, &mut seen) {
                                    return self.morph_union(union, &**default, value, ctx);
                                }
                                self.check_union(union, subtree, &value, ctx);
                                value
                            }
                            None => {
                                self.check_union(union, subtree, &value, ctx);
                                value
                            }
                        }
                    }
                    None => match &switch.default {
                        Some(default) => self.morph_union(union, &**default, value, ctx),
                        None => {
                            ctx.violate(
                                ViolationKind::Union,
                                self.describe(union),
                                snippet(&value),
                            );
                            value
                        }
                    },
                }
            }
        }
    }

    fn morph_bag(
        &self,
        inner: &IntersectionInner,
        value: Value,
        ctx: &mut TraverseCtx,
    ) -> Value {
        if let Some(basis) = inner.basis
            && !self.allows(basis, &value)
        {
            ctx.violate(
                ViolationKind::Domain,
                self.describe(basis),
                snippet(&value),
            );
            return value;
        }
        for &id in inner
            .divisor
            .iter()
            .chain(&inner.min)
            .chain(&inner.max)
            .chain(&inner.patterns)
            .chain(&inner.predicates)
        {
            self.check_rec(id, &value, ctx);
        }

        match value {
            Value::Object(map) => self.morph_map(inner, map, ctx),
            Value::Array(items) => self.morph_array(inner, items, ctx),
            other => other,
        }
    }

    fn morph_map(
        &self,
        inner: &IntersectionInner,
        mut map: Map<String, Value>,
        ctx: &mut TraverseCtx,
    ) -> Value {
        for &prop_id in inner.required.iter().chain(&inner.optional) {
            let (prop, required) = match &self.rec(prop_id).data {
                NodeData::Required(p) => (p.clone(), true),
                NodeData::Optional(p) => (p.clone(), false),
                _ => continue,
            };
            let key = self.resolve_atom(prop.key);
            match map.remove(key.as_ref()) {
                Some(v) => {
                    ctx.path.push(Seg::Key(key.clone()));
                    let morphed = self.morph_rec(prop.value, v, ctx);
                    ctx.path.pop();
                    map.insert(key.to_string(), morphed);
                }
                None if required => {
                    ctx.path.push(Seg::Key(key));
                    ctx.violate(
                        ViolationKind::Missing,
                        self.describe(prop.value),
                        "missing".to_string(),
                    );
                    ctx.path.pop();
                }
                None => {}
            }
        }

        let exhaustive =
            !inner.index.is_empty() || inner.undeclared != UndeclaredKeys::Ignore;
        if exhaustive {
            let keys: Vec<String> = map
                .keys()
                .filter(|key| !self.key_is_declared_prop(inner, key))
                .cloned()
                .collect();
            for key in keys {
                let mut matched_index = false;
                for &index_id in &inner.index {
                    if let NodeData::Index(index) = &self.rec(index_id).data
                        && self.allows(index.signature, &Value::String(key.clone()))
                    {
                        matched_index = true;
                        if let Some(v) = map.remove(&key) {
                            ctx.path.push(Seg::key(&key));
                            let morphed = self.morph_rec(index.value, v, ctx);
                            ctx.path.pop();
                            map.insert(key.clone(), morphed);
                        }
                    }
                }
                if !matched_index {
                    match inner.undeclared {
                        UndeclaredKeys::Prune => {
                            map.remove(&key);
                        }
                        UndeclaredKeys::Reject => {
                            ctx.path.push(Seg::key(&key));
                            let actual = map.get(&key).map(snippet).unwrap_or_default();
                            ctx.violate(ViolationKind::Extraneous, "removed".to_string(), actual);
                            ctx.path.pop();
                        }
                        UndeclaredKeys::Ignore => {}
                    }
                }
            }
        }
        Value::Object(map)
    }

    fn morph_array(
        &self,
        inner: &IntersectionInner,
        items: Vec<Value>,
        ctx: &mut TraverseCtx,
    ) -> Value {
        let Some(seq_id) = inner.sequence else {
            return Value::Array(items);
        };
        let NodeData::Sequence(seq) = &self.rec(seq_id).data else {
            return Value::Array(items);
        };
        let seq = seq.clone();
        if !sequence_length_ok(&seq, items.len()) {
            self.check_sequence(&seq, &Value::Array(items.clone()), ctx);
            return Value::Array(items);
        }
        let len = items.len();
        let out: Vec<Value> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match sequence_slot(&seq, i, len) {
                Some(slot) => {
                    ctx.path.push(Seg::Item(i));
                    let morphed = self.morph_rec(slot, item, ctx);
                    ctx.path.pop();
                    morphed
                }
                None => item,
            })
            .collect();
        Value::Array(out)
    }

    // =========================================================================
    // Descriptions
    // =========================================================================

    /// Prose rendering of what a node accepts, used in diagnostics.
    pub(crate) fn describe(&self, node: NodeId) -> String {
        let rec = self.rec(node);
        if let Some(description) = &rec.meta.description {
            return description.clone();
        }
        match &rec.data {
            NodeData::Alias(name) => self.resolve_atom(*name).to_string(),
            NodeData::Domain(domain) => match domain {
                crate::node::Domain::String => "a string".to_string(),
                crate::node::Domain::Number => "a number".to_string(),
                crate::node::Domain::Boolean => "a boolean".to_string(),
                crate::node::Domain::Object => "an object".to_string(),
            },
            NodeData::Proto(proto) => match proto {
                crate::node::Proto::Array => "an array".to_string(),
                crate::node::Proto::Map => "a map".to_string(),
            },
            NodeData::Unit(unit) => self.unit_to_json(*unit).to_string(),
            NodeData::Divisor(rule) => format!("a multiple of {rule}"),
            NodeData::Min(bound) => {
                if bound.exclusive {
                    format!("more than {}", bound.rule.0)
                } else {
                    format!("at least {}", bound.rule.0)
                }
            }
            NodeData::Max(bound) => {
                if bound.exclusive {
                    format!("less than {}", bound.rule.0)
                } else {
                    format!("at most {}", bound.rule.0)
                }
            }
            NodeData::Pattern(pattern) => format!("a string matching /{}/", pattern.source),
            NodeData::Predicate(predicate) => {
                format!("valid per '{}'", self.resolve_atom(predicate.name))
            }
            NodeData::Required(prop) => format!(
                "{}: {}",
                self.resolve_atom(prop.key),
                self.describe(prop.value)
            ),
            NodeData::Optional(prop) => format!(
                "{}?: {}",
                self.resolve_atom(prop.key),
                self.describe(prop.value)
            ),
            NodeData::Index(index) => format!(
                "[{}]: {}",
                self.describe(index.signature),
                self.describe(index.value)
            ),
            NodeData::Sequence(seq) => match (seq.exact_length(), seq.variadic) {
                (Some(len), _) => format!("an array of exactly {len} elements"),
                (None, Some(variadic)) if seq.min_length() == 0 => {
                    format!("an array of {}", self.describe(variadic))
                }
                (None, _) => format!("an array of at least {} elements", seq.min_length()),
            },
            NodeData::Union(inner) => {
                if inner.branches.is_empty() {
                    return "never".to_string();
                }
                inner
                    .branches
                    .iter()
                    .map(|&branch| self.describe(branch))
                    .collect::<Vec<_>>()
                    .join(" or ")
            }
            NodeData::Morph(inner) => self.describe(inner.input),
            NodeData::Intersection(inner) => {
                let mut parts = Vec::new();
                for child in inner.children() {
                    parts.push(self.describe(child));
                }
                if parts.is_empty() {
                    "anything".to_string()
                } else {
                    parts.join(" and ")
                }
            }
        }
    }
}

/// Walk map keys down a discriminant path.
fn value_at<'v>(value: &'v Value, path: &[Seg]) -> Option<&'v Value> {
    let mut current = value;
    for seg in path {
        let Seg::Key(key) = seg else { return None };
        current = current.as_object()?.get(key.as_ref())?;
    }
    Some(current)
}

fn divisor_ok(value: &Value, rule: u64) -> bool {
    match value.as_f64() {
        Some(n) => n % (rule as f64) == 0.0,
        None => false,
    }
}

/// Bounds measure numbers by value, strings by character count, arrays by
/// length. Maps are unmeasured and pass; null/bool can never satisfy a
/// bound.
fn bound_ok(value: &Value, bound: Bound, is_min: bool) -> bool {
    let measured = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(items) => Some(items.len() as f64),
        Value::Object(_) => return true,
        Value::Null | Value::Bool(_) => None,
    };
    let Some(measured) = measured else {
        return false;
    };
    let rule = bound.rule.0;
    match (is_min, bound.exclusive) {
        (true, false) => measured >= rule,
        (true, true) => measured > rule,
        (false, false) => measured <= rule,
        (false, true) => measured < rule,
    }
}

fn sequence_length_ok(seq: &SequenceInner, len: usize) -> bool {
    match seq.exact_length() {
        Some(exact) => len == exact,
        None => len >= seq.min_length(),
    }
}

/// The node constraining element `i` of a `len`-element array.
fn sequence_slot(seq: &SequenceInner, i: usize, len: usize) -> Option<NodeId> {
    if let Some(&slot) = seq.prefix.get(i) {
        return Some(slot);
    }
    let from_end = len - i;
    if from_end <= seq.postfix.len() {
        return Some(seq.postfix[seq.postfix.len() - from_end]);
    }
    seq.variadic
}

/// Compact, truncated snapshot of a value for diagnostics.
fn snippet(value: &Value) -> String {
    let full = value.to_string();
    if full.chars().count() <= SNIPPET_LIMIT {
        full
    } else {
        let truncated: String = full.chars().take(SNIPPET_LIMIT).collect();
        format!("{truncated}…")
    }
}

#[cfg(test)]
#[path = "tests/traverse_tests.rs"]
mod tests;
