//! The binary intersection operator over nodes.
//!
//! `meet(l, r)` returns one of three things: a (possibly freshly interned)
//! node accepting exactly the values both operands accept, a [`Disjoint`]
//! proof that no such value exists, or `Orthogonal` — no defined
//! relationship, which callers treat as an open join (both operands kept
//! side by side in a property bag).
//!
//! A single fixed total order over kinds halves the rule surface: rules
//! are written for `(lower precedence, higher precedence)` pairs only, and
//! operands are swapped to match, inverting any recorded disjoint. Results
//! are memoized per `(type_id, op, type_id)` key; for the commutative `&`
//! operator a hit on the reversed key is reused by inverting it.
//!
//! Cyclic alias meets use coinductive semantics: re-entering an in-flight
//! pair assumes success and returns the left operand.

use serde_json::Value;
use tracing::trace;

use crate::disjoint::{Disjoint, DisjointKind};
use crate::errors::SchemaError;
use crate::node::{
    Bound, IndexInner, IntersectionInner, MorphInner, MorphStep, NodeData, NodeId, NodeKind,
    NodeMeta, PropInner, Seg, SequenceInner, UndeclaredKeys,
};
use crate::space::Space;
use sift_common::Atom;

/// Result of one intersection step.
#[derive(Clone, Debug)]
pub(crate) enum Meet {
    Node(NodeId),
    Disjoint(Disjoint),
    /// No defined relationship between the operand kinds; the caller joins
    /// them into a bag.
    Orthogonal,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum MeetOp {
    And,
    Pipe,
}

impl MeetOp {
    const fn symbol(self) -> &'static str {
        match self {
            MeetOp::And => "&",
            MeetOp::Pipe => "|>",
        }
    }
}

impl Space {
    /// Public intersection over ids. `Ok(Err(_))` is a proven-empty
    /// intersection; the outer error is a construction failure (e.g. a
    /// distributed union that became morph-ambiguous).
    pub(crate) fn intersect_ids(
        &self,
        l: NodeId,
        r: NodeId,
    ) -> Result<Result<NodeId, Disjoint>, SchemaError> {
        match self.meet(l, r, MeetOp::And)? {
            Meet::Node(id) => Ok(Ok(id)),
            Meet::Disjoint(d) => Ok(Err(d)),
            Meet::Orthogonal => match self.join_pair(l, r)? {
                Meet::Node(id) => Ok(Ok(id)),
                Meet::Disjoint(d) => Ok(Err(d)),
                Meet::Orthogonal => Ok(Ok(l)),
            },
        }
    }

    /// Sequencing composition: `l`'s output flows into `r`.
    pub(crate) fn pipe_ids(
        &self,
        l: NodeId,
        r: NodeId,
    ) -> Result<Result<NodeId, Disjoint>, SchemaError> {
        match self.meet(l, r, MeetOp::Pipe)? {
            Meet::Node(id) => Ok(Ok(id)),
            Meet::Disjoint(d) => Ok(Err(d)),
            Meet::Orthogonal => Ok(Ok(l)),
        }
    }

    pub(crate) fn meet(&self, l: NodeId, r: NodeId, op: MeetOp) -> Result<Meet, SchemaError> {
        let l_rec = self.rec(l);
        let r_rec = self.rec(r);

        if op == MeetOp::And && l_rec.type_id == r_rec.type_id {
            return Ok(Meet::Node(l));
        }

        let key = format!("{}{}{}", l_rec.type_id, op.symbol(), r_rec.type_id);
        if let Some(cached) = self.inner.borrow().meet_cache.get(&key) {
            return Ok(cached.clone());
        }
        if op == MeetOp::And {
            let reversed = format!("{}{}{}", r_rec.type_id, op.symbol(), l_rec.type_id);
            let hit = self.inner.borrow().meet_cache.get(&reversed).cloned();
            if let Some(cached) = hit {
                let result = match cached {
                    Meet::Disjoint(d) => Meet::Disjoint(d.invert()),
                    other => other,
                };
                self.inner
                    .borrow_mut()
                    .meet_cache
                    .insert(key, result.clone());
                return Ok(result);
            }
        }

        // Coinductive cycle guard: an in-flight pair assumes success.
        if !self.meet_enter(&key) {
            return Ok(Meet::Node(l));
        }

        let computed = self.meet_uncached(l, r, op);
        self.meet_exit(&key);
        let mut result = computed?;

        // Preserve the original operand (and its meta) when the computed
        // node is structurally the same type.
        if let Meet::Node(id) = result
            && id != l
            && id != r
        {
            let type_id = self.rec(id).type_id.clone();
            if type_id == l_rec.type_id {
                result = Meet::Node(l);
            } else if type_id == r_rec.type_id {
                result = Meet::Node(r);
            }
        }

        trace!(l = l.0, r = r.0, op = op.symbol(), "meet computed");
        self.inner
            .borrow_mut()
            .meet_cache
            .insert(key, result.clone());
        Ok(result)
    }

    fn meet_uncached(&self, l: NodeId, r: NodeId, op: MeetOp) -> Result<Meet, SchemaError> {
        if op == MeetOp::Pipe {
            return self.pipe_nodes(l, r);
        }

        let l_kind = self.rec(l).kind;
        let r_kind = self.rec(r).kind;
        let (a, b, swapped) = if l_kind.precedence() <= r_kind.precedence() {
            (l, r, false)
        } else {
            (r, l, true)
        };

        let result = self.meet_rule(a, b)?;
        Ok(match result {
            Meet::Disjoint(d) if swapped => Meet::Disjoint(d.invert()),
            other => other,
        })
    }

    /// Dispatch on the leftmost kind. `a` has lower or equal precedence.
    fn meet_rule(&self, a: NodeId, b: NodeId) -> Result<Meet, SchemaError> {
        let a_rec = self.rec(a);
        match &a_rec.data {
            NodeData::Alias(name) => {
                let resolution = self.resolve_alias(*name)?;
                self.meet(resolution, b, MeetOp::And)
            }
            NodeData::Union(inner) => {
                let branches = inner.branches.clone();
                self.meet_union(&branches, b)
            }
            NodeData::Morph(inner) => {
                let b_rec = self.rec(b);
                if let NodeData::Morph(_) = &b_rec.data {
                    // Two distinct transforms cannot both apply under `&`.
                    return Ok(Meet::Disjoint(Disjoint::new(
                        DisjointKind::Morph,
                        a_rec.json.clone(),
                        b_rec.json.clone(),
                    )));
                }
                let inner = inner.clone();
                match self.meet(inner.input, b, MeetOp::And)? {
                    Meet::Node(input) => Ok(Meet::Node(self.intern_node(
                        NodeData::Morph(MorphInner {
                            input,
                            steps: inner.steps,
                        }),
                        NodeMeta::default(),
                    )?)),
                    Meet::Disjoint(d) => Ok(Meet::Disjoint(d)),
                    Meet::Orthogonal => match self.join_pair(inner.input, b)? {
                        Meet::Node(input) => Ok(Meet::Node(self.intern_node(
                            NodeData::Morph(MorphInner {
                                input,
                                steps: inner.steps,
                            }),
                            NodeMeta::default(),
                        )?)),
                        Meet::Disjoint(d) => Ok(Meet::Disjoint(d)),
                        Meet::Orthogonal => Ok(Meet::Orthogonal),
                    },
                }
            }
            NodeData::Intersection(_) => self.join_pair(a, b),
            _ => self.meet_atomic(a, b),
        }
    }

    /// Distribute an intersection across union branches. Branches whose
    /// meet is empty drop out; if every branch drops, the union itself is
    /// disjoint with the operand.
    fn meet_union(&self, branches: &[NodeId], other: NodeId) -> Result<Meet, SchemaError> {
        let mut kept = Vec::with_capacity(branches.len());
        let mut all = Disjoint::default();
        for &branch in branches {
            match self.meet(branch, other, MeetOp::And)? {
                Meet::Node(id) => kept.push(id),
                Meet::Orthogonal => match self.join_pair(branch, other)? {
                    Meet::Node(id) => kept.push(id),
                    Meet::Disjoint(d) => all.merge(d),
                    Meet::Orthogonal => kept.push(branch),
                },
                Meet::Disjoint(d) => all.merge(d),
            }
        }
        if kept.is_empty() {
            if all.is_empty() {
                // An empty union (never) intersected with anything.
                let other_rec = self.rec(other);
                all.merge(Disjoint::new(
                    DisjointKind::Union,
                    Value::String("never".to_string()),
                    other_rec.json.clone(),
                ));
            }
            return Ok(Meet::Disjoint(all));
        }
        Ok(Meet::Node(self.make_union(kept, NodeMeta::default())?))
    }

    fn pipe_nodes(&self, l: NodeId, r: NodeId) -> Result<Meet, SchemaError> {
        let split = |id: NodeId| -> (NodeId, Vec<MorphStep>) {
            match &self.rec(id).data {
                NodeData::Morph(inner) => (inner.input, inner.steps.clone()),
                _ => (id, Vec::new()),
            }
        };
        let (input, mut steps) = split(l);
        let (r_input, r_steps) = split(r);
        steps.push(MorphStep::Check(r_input));
        steps.extend(r_steps);
        Ok(Meet::Node(self.intern_node(
            NodeData::Morph(MorphInner { input, steps }),
            NodeMeta::default(),
        )?))
    }

    // =========================================================================
    // Atomic (basis/refinement) rules
    // =========================================================================

    /// Rules for basis and refinement pairs, ordered `a` before `b` by
    /// kind precedence. Unknown pairings fall back to the generic
    /// constraint rule: orthogonal when an implied basis could satisfy
    /// both, disjoint otherwise.
    fn meet_atomic(&self, a: NodeId, b: NodeId) -> Result<Meet, SchemaError> {
        let a_rec = self.rec(a);
        let b_rec = self.rec(b);
        let disjoint = |kind: DisjointKind| -> Meet {
            Meet::Disjoint(Disjoint::new(
                kind,
                a_rec.json.clone(),
                b_rec.json.clone(),
            ))
        };

        let result = match (&a_rec.data, &b_rec.data) {
            // --- unit on the left ---
            (NodeData::Unit(_), NodeData::Unit(_)) => disjoint(DisjointKind::Unit),
            (NodeData::Unit(_), NodeData::Proto(_)) => disjoint(DisjointKind::Proto),
            (NodeData::Unit(u), NodeData::Domain(d)) => {
                if u.domain_name() == d.as_str() {
                    Meet::Node(a)
                } else {
                    disjoint(DisjointKind::Domain)
                }
            }
            (NodeData::Unit(u), _) if b_rec.kind.is_refinement() => {
                let value = self.unit_to_json(*u);
                if self.refinement_allows(b, &value) {
                    Meet::Node(a)
                } else {
                    disjoint(DisjointKind::Unit)
                }
            }

            // --- proto on the left ---
            (NodeData::Proto(_), NodeData::Proto(_)) => disjoint(DisjointKind::Proto),
            (NodeData::Proto(_), NodeData::Domain(d)) => {
                if *d == crate::node::Domain::Object {
                    Meet::Node(a)
                } else {
                    disjoint(DisjointKind::Domain)
                }
            }
            (NodeData::Proto(_), _) if b_rec.kind.is_refinement() => {
                let req = b_rec.kind.implied_basis();
                if self.basis_satisfies(a, req) {
                    Meet::Orthogonal
                } else {
                    disjoint(Self::container_conflict_kind(a_rec.kind, b_rec.kind))
                }
            }

            // --- domain on the left ---
            (NodeData::Domain(_), NodeData::Domain(_)) => disjoint(DisjointKind::Domain),
            (NodeData::Domain(_), _) if b_rec.kind.is_refinement() => {
                let req = b_rec.kind.implied_basis();
                if self.basis_satisfies(a, req) {
                    Meet::Orthogonal
                } else {
                    disjoint(DisjointKind::Domain)
                }
            }

            // --- same-kind refinement pairs ---
            (NodeData::Divisor(x), NodeData::Divisor(y)) => {
                let merged = lcm(*x, *y);
                Meet::Node(self.intern_node(NodeData::Divisor(merged), NodeMeta::default())?)
            }
            (NodeData::Min(x), NodeData::Min(y)) => {
                Meet::Node(self.intern_node(
                    NodeData::Min(tighter_min(*x, *y)),
                    NodeMeta::default(),
                )?)
            }
            (NodeData::Max(x), NodeData::Max(y)) => {
                Meet::Node(self.intern_node(
                    NodeData::Max(tighter_max(*x, *y)),
                    NodeMeta::default(),
                )?)
            }
            (NodeData::Min(min), NodeData::Max(max)) => {
                if range_is_empty(*min, *max) {
                    disjoint(DisjointKind::Range)
                } else {
                    Meet::Orthogonal
                }
            }
            (NodeData::Pattern(_), NodeData::Pattern(_)) => Meet::Orthogonal,
            (NodeData::Predicate(_), NodeData::Predicate(_)) => Meet::Orthogonal,
            (NodeData::Required(p), NodeData::Required(q)) if p.key == q.key => {
                self.meet_prop_values(p.key, p.value, q.value, true)?
            }
            (NodeData::Required(p), NodeData::Optional(q)) if p.key == q.key => {
                self.meet_prop_values(p.key, p.value, q.value, true)?
            }
            (NodeData::Optional(p), NodeData::Optional(q)) if p.key == q.key => {
                self.meet_prop_values(p.key, p.value, q.value, false)?
            }
            (NodeData::Index(i), NodeData::Index(j)) => {
                if self.rec(i.signature).type_id == self.rec(j.signature).type_id {
                    match self.meet(i.value, j.value, MeetOp::And)? {
                        Meet::Node(value) => Meet::Node(self.intern_node(
                            NodeData::Index(IndexInner {
                                signature: i.signature,
                                value,
                            }),
                            NodeMeta::default(),
                        )?),
                        // Matching keys would be impossible; keeping both
                        // signatures intact still checks that.
                        _ => Meet::Orthogonal,
                    }
                } else {
                    Meet::Orthogonal
                }
            }
            (NodeData::Sequence(s), NodeData::Sequence(t)) => {
                let (s, t) = (s.clone(), t.clone());
                self.meet_sequences(&s, &t)?
            }

            // --- generic constraint fallback ---
            _ => {
                let merged = a_rec
                    .kind
                    .implied_basis()
                    .meet(b_rec.kind.implied_basis());
                if merged.is_some() {
                    Meet::Orthogonal
                } else {
                    disjoint(Self::container_conflict_kind(a_rec.kind, b_rec.kind))
                }
            }
        };
        Ok(result)
    }

    /// Container-shape conflicts (array vs map) are proto conflicts, not
    /// domain conflicts: both sides serialize as the object domain, so a
    /// domain discriminant could not soundly separate them.
    fn container_conflict_kind(a: NodeKind, b: NodeKind) -> DisjointKind {
        use crate::node::BasisRequirement::*;
        let container = |req: crate::node::BasisRequirement| {
            matches!(req, Object | MapOnly | ArrayOnly)
        };
        if container(a.implied_basis()) && container(b.implied_basis()) {
            DisjointKind::Proto
        } else {
            DisjointKind::Domain
        }
    }

    fn meet_prop_values(
        &self,
        key: Atom,
        l: NodeId,
        r: NodeId,
        required: bool,
    ) -> Result<Meet, SchemaError> {
        let value = match self.meet(l, r, MeetOp::And)? {
            Meet::Node(id) => id,
            Meet::Disjoint(d) => {
                let key_name = self.resolve_atom(key);
                return Ok(Meet::Disjoint(d.with_prefix(Seg::Key(key_name))));
            }
            Meet::Orthogonal => match self.join_pair(l, r)? {
                Meet::Node(id) => id,
                Meet::Disjoint(d) => {
                    let key_name = self.resolve_atom(key);
                    return Ok(Meet::Disjoint(d.with_prefix(Seg::Key(key_name))));
                }
                Meet::Orthogonal => l,
            },
        };
        let prop = PropInner { key, value };
        let data = if required {
            NodeData::Required(prop)
        } else {
            NodeData::Optional(prop)
        };
        Ok(Meet::Node(self.intern_node(data, NodeMeta::default())?))
    }

    // =========================================================================
    // Sequences
    // =========================================================================

    /// Elementwise meet of two array layouts. Fixed sequences are
    /// prefix-only (normalization folds their postfix forward), so the
    /// cases are fixed/fixed, fixed/variadic, and variadic/variadic.
    fn meet_sequences(
        &self,
        a: &SequenceInner,
        b: &SequenceInner,
    ) -> Result<Meet, SchemaError> {
        let seq_disjoint = |space: &Space| -> Meet {
            Meet::Disjoint(Disjoint::new(
                DisjointKind::Sequence,
                space.sequence_json(a),
                space.sequence_json(b),
            ))
        };

        let mut acc = Disjoint::default();
        let mut meet_slot = |space: &Space, index: usize, x: NodeId, y: NodeId| -> Result<Option<NodeId>, SchemaError> {
            match space.meet(x, y, MeetOp::And)? {
                Meet::Node(id) => Ok(Some(id)),
                Meet::Disjoint(d) => {
                    acc.merge(d.with_prefix(Seg::Item(index)));
                    Ok(None)
                }
                Meet::Orthogonal => match space.join_pair(x, y)? {
                    Meet::Node(id) => Ok(Some(id)),
                    Meet::Disjoint(d) => {
                        acc.merge(d.with_prefix(Seg::Item(index)));
                        Ok(None)
                    }
                    Meet::Orthogonal => Ok(Some(x)),
                },
            }
        };

        let result = match (a.variadic, b.variadic) {
            (None, None) => {
                if a.prefix.len() != b.prefix.len() {
                    return Ok(seq_disjoint(self));
                }
                let mut prefix = Vec::with_capacity(a.prefix.len());
                for (i, (&x, &y)) in a.prefix.iter().zip(&b.prefix).enumerate() {
                    if let Some(id) = meet_slot(self, i, x, y)? {
                        prefix.push(id);
                    }
                }
                SequenceInner {
                    prefix,
                    variadic: None,
                    postfix: Vec::new(),
                }
            }
            (None, Some(_)) | (Some(_), None) => {
                let (fixed, open) = if a.variadic.is_none() { (a, b) } else { (b, a) };
                let len = fixed.prefix.len();
                if len < open.min_length() {
                    return Ok(seq_disjoint(self));
                }
                let mut prefix = Vec::with_capacity(len);
                for (i, &x) in fixed.prefix.iter().enumerate() {
                    let slot = open_slot_at(open, i, len);
                    if let Some(id) = meet_slot(self, i, x, slot)? {
                        prefix.push(id);
                    }
                }
                SequenceInner {
                    prefix,
                    variadic: None,
                    postfix: Vec::new(),
                }
            }
            (Some(va), Some(vb)) => {
                let front = a.prefix.len().max(b.prefix.len());
                let back = a.postfix.len().max(b.postfix.len());
                let mut prefix = Vec::with_capacity(front);
                for i in 0..front {
                    let x = a.prefix.get(i).copied().unwrap_or(va);
                    let y = b.prefix.get(i).copied().unwrap_or(vb);
                    if let Some(id) = meet_slot(self, i, x, y)? {
                        prefix.push(id);
                    }
                }
                let mut postfix = Vec::with_capacity(back);
                for i in 0..back {
                    let x = postfix_slot(a, i, back).unwrap_or(va);
                    let y = postfix_slot(b, i, back).unwrap_or(vb);
                    if let Some(id) = meet_slot(self, front + i, x, y)? {
                        postfix.push(id);
                    }
                }
                // A disjoint variadic element only forbids middle elements;
                // the result is then fixed-length.
                let variadic = match self.meet(va, vb, MeetOp::And)? {
                    Meet::Node(id) => Some(id),
                    Meet::Disjoint(_) => None,
                    Meet::Orthogonal => match self.join_pair(va, vb)? {
                        Meet::Node(id) => Some(id),
                        _ => None,
                    },
                };
                if variadic.is_none() {
                    let mut all = prefix;
                    all.extend(postfix);
                    SequenceInner {
                        prefix: all,
                        variadic: None,
                        postfix: Vec::new(),
                    }
                } else {
                    SequenceInner {
                        prefix,
                        variadic,
                        postfix,
                    }
                }
            }
        };

        if !acc.is_empty() {
            return Ok(Meet::Disjoint(acc));
        }
        Ok(Meet::Node(self.intern_node(
            NodeData::Sequence(result),
            NodeMeta::default(),
        )?))
    }

    fn sequence_json(&self, seq: &SequenceInner) -> Value {
        self.project(&NodeData::Sequence(seq.clone()), &NodeMeta::default(), false)
    }

    // =========================================================================
    // Bag merging
    // =========================================================================

    /// View any non-set node as a one-slot bag.
    fn to_bag(&self, id: NodeId) -> Option<IntersectionInner> {
        let rec = self.rec(id);
        let mut inner = IntersectionInner::default();
        match &rec.data {
            NodeData::Intersection(bag) => return Some(bag.clone()),
            NodeData::Domain(_) | NodeData::Proto(_) | NodeData::Unit(_) => {
                inner.basis = Some(id);
            }
            NodeData::Divisor(_) => inner.divisor = Some(id),
            NodeData::Min(_) => inner.min = Some(id),
            NodeData::Max(_) => inner.max = Some(id),
            NodeData::Pattern(_) => inner.patterns.push(id),
            NodeData::Predicate(_) => inner.predicates.push(id),
            NodeData::Required(_) => inner.required.push(id),
            NodeData::Optional(_) => inner.optional.push(id),
            NodeData::Index(_) => inner.index.push(id),
            NodeData::Sequence(_) => inner.sequence = Some(id),
            NodeData::Alias(_) | NodeData::Union(_) | NodeData::Morph(_) => return None,
        }
        Some(inner)
    }

    /// Join two operands with no direct rule into one bag, merging slots.
    pub(crate) fn join_pair(&self, l: NodeId, r: NodeId) -> Result<Meet, SchemaError> {
        let (Some(l_bag), Some(r_bag)) = (self.to_bag(l), self.to_bag(r)) else {
            return Ok(Meet::Orthogonal);
        };
        self.bag_meet(&l_bag, &r_bag)
    }

    /// Slot-wise merge of two property bags. Every independent conflict
    /// found in one pass is accumulated into a single disjoint.
    fn bag_meet(
        &self,
        l: &IntersectionInner,
        r: &IntersectionInner,
    ) -> Result<Meet, SchemaError> {
        let mut acc = Disjoint::default();
        let mut out = IntersectionInner::default();

        out.basis = match (l.basis, r.basis) {
            (None, basis) | (basis, None) => basis,
            (Some(a), Some(b)) => match self.meet(a, b, MeetOp::And)? {
                Meet::Node(id) => Some(id),
                Meet::Disjoint(d) => {
                    acc.merge(d);
                    None
                }
                Meet::Orthogonal => Some(a),
            },
        };

        let merge_single = |slot_l: Option<NodeId>,
                                slot_r: Option<NodeId>,
                                acc: &mut Disjoint|
         -> Result<Option<NodeId>, SchemaError> {
            match (slot_l, slot_r) {
                (None, slot) | (slot, None) => Ok(slot),
                (Some(a), Some(b)) => match self.meet(a, b, MeetOp::And)? {
                    Meet::Node(id) => Ok(Some(id)),
                    Meet::Disjoint(d) => {
                        acc.merge(d);
                        Ok(None)
                    }
                    Meet::Orthogonal => Ok(Some(a)),
                },
            }
        };

        out.divisor = merge_single(l.divisor, r.divisor, &mut acc)?;
        out.min = merge_single(l.min, r.min, &mut acc)?;
        out.max = merge_single(l.max, r.max, &mut acc)?;
        out.sequence = merge_single(l.sequence, r.sequence, &mut acc)?;

        // Cross-check the merged range.
        if let (Some(min_id), Some(max_id)) = (out.min, out.max)
            && let (NodeData::Min(min), NodeData::Max(max)) =
                (&self.rec(min_id).data, &self.rec(max_id).data)
            && range_is_empty(*min, *max)
        {
            acc.merge(Disjoint::new(
                DisjointKind::Range,
                self.rec(min_id).json.clone(),
                self.rec(max_id).json.clone(),
            ));
        }

        out.patterns = dedup_by_type(self, l.patterns.iter().chain(&r.patterns));
        out.predicates = dedup_by_type(self, l.predicates.iter().chain(&r.predicates));
        self.merge_props(l, r, &mut out, &mut acc)?;
        out.index = self.merge_index(&l.index, &r.index)?;
        out.undeclared = strictest(l.undeclared, r.undeclared);

        // The merged refinements must still share a basis.
        let mut req = crate::node::BasisRequirement::Any;
        let mut conflicted = false;
        for kind in [
            (out.divisor.is_some(), NodeKind::Divisor),
            (!out.patterns.is_empty(), NodeKind::Pattern),
            (!out.required.is_empty(), NodeKind::Required),
            (!out.optional.is_empty(), NodeKind::Optional),
            (!out.index.is_empty(), NodeKind::Index),
            (out.sequence.is_some(), NodeKind::Sequence),
        ]
        .into_iter()
        .filter_map(|(present, kind)| present.then_some(kind))
        {
            match req.meet(kind.implied_basis()) {
                Some(merged) => req = merged,
                None => {
                    conflicted = true;
                    break;
                }
            }
        }
        if conflicted {
            acc.merge(Disjoint::new(
                DisjointKind::Domain,
                self.bag_json(l),
                self.bag_json(r),
            ));
        } else if let Some(basis) = out.basis
            && !self.basis_satisfies(basis, req)
        {
            acc.merge(Disjoint::new(
                Self::basis_conflict_kind(req),
                self.rec(basis).json.clone(),
                self.bag_json(if l.basis == out.basis { r } else { l }),
            ));
        }

        if acc.is_empty()
            && let Some(d) = self.bag_contradiction(&out)
        {
            acc.merge(d);
        }
        if !acc.is_empty() {
            return Ok(Meet::Disjoint(acc));
        }
        Ok(Meet::Node(self.intern_node(
            NodeData::Intersection(out),
            NodeMeta::default(),
        )?))
    }

    fn basis_conflict_kind(req: crate::node::BasisRequirement) -> DisjointKind {
        use crate::node::BasisRequirement::*;
        match req {
            MapOnly | ArrayOnly => DisjointKind::Proto,
            _ => DisjointKind::Domain,
        }
    }

    fn bag_json(&self, inner: &IntersectionInner) -> Value {
        self.project(
            &NodeData::Intersection(inner.clone()),
            &NodeMeta::default(),
            false,
        )
    }

    /// Merge required/optional props by key. A required entry wins over an
    /// optional one; value conflicts are reported relative to the key.
    fn merge_props(
        &self,
        l: &IntersectionInner,
        r: &IntersectionInner,
        out: &mut IntersectionInner,
        acc: &mut Disjoint,
    ) -> Result<(), SchemaError> {
        let mut merged: Vec<(Atom, bool, NodeId)> = Vec::new();

        let absorb = |space: &Space,
                          key: Atom,
                          required: bool,
                          value: NodeId,
                          merged: &mut Vec<(Atom, bool, NodeId)>,
                          acc: &mut Disjoint|
         -> Result<(), SchemaError> {
            if let Some(entry) = merged.iter_mut().find(|(k, _, _)| *k == key) {
                entry.1 |= required;
                match space.meet(entry.2, value, MeetOp::And)? {
                    Meet::Node(id) => entry.2 = id,
                    Meet::Disjoint(d) => {
                        acc.merge(d.with_prefix(Seg::Key(space.resolve_atom(key))));
                    }
                    Meet::Orthogonal => match space.join_pair(entry.2, value)? {
                        Meet::Node(id) => entry.2 = id,
                        Meet::Disjoint(d) => {
                            acc.merge(d.with_prefix(Seg::Key(space.resolve_atom(key))));
                        }
                        Meet::Orthogonal => {}
                    },
                }
            } else {
                merged.push((key, required, value));
            }
            Ok(())
        };

        for side in [l, r] {
            for &prop_id in &side.required {
                if let NodeData::Required(p) = &self.rec(prop_id).data {
                    absorb(self, p.key, true, p.value, &mut merged, acc)?;
                }
            }
            for &prop_id in &side.optional {
                if let NodeData::Optional(p) = &self.rec(prop_id).data {
                    absorb(self, p.key, false, p.value, &mut merged, acc)?;
                }
            }
        }

        merged.sort_by_key(|(key, _, _)| self.resolve_atom(*key));
        for (key, required, value) in merged {
            let prop = PropInner { key, value };
            let data = if required {
                NodeData::Required(prop)
            } else {
                NodeData::Optional(prop)
            };
            let id = self.intern_node(data, NodeMeta::default())?;
            if required {
                out.required.push(id);
            } else {
                out.optional.push(id);
            }
        }
        Ok(())
    }

    fn merge_index(
        &self,
        l: &[NodeId],
        r: &[NodeId],
    ) -> Result<Vec<NodeId>, SchemaError> {
        let mut out: Vec<NodeId> = l.to_vec();
        'next: for &candidate in r {
            let NodeData::Index(cand) = &self.rec(candidate).data else {
                continue;
            };
            for existing in &mut out {
                let NodeData::Index(ex) = &self.rec(*existing).data else {
                    continue;
                };
                if self.rec(ex.signature).type_id == self.rec(cand.signature).type_id {
                    if let Meet::Node(value) =
                        self.meet(ex.value, cand.value, MeetOp::And)?
                    {
                        *existing = self.intern_node(
                            NodeData::Index(IndexInner {
                                signature: ex.signature,
                                value,
                            }),
                            NodeMeta::default(),
                        )?;
                        continue 'next;
                    }
                }
            }
            out.push(candidate);
        }
        Ok(out)
    }

    /// Shared contradiction detection for interned bags: an empty range, a
    /// required prop accepting nothing, or a literal basis failing one of
    /// its own refinements. Used as a `Disjoint` by the intersection
    /// engine and as a thrown error by the parse-time reduce hook.
    pub(crate) fn bag_contradiction(&self, inner: &IntersectionInner) -> Option<Disjoint> {
        if let (Some(min_id), Some(max_id)) = (inner.min, inner.max)
            && let (NodeData::Min(min), NodeData::Max(max)) =
                (&self.rec(min_id).data, &self.rec(max_id).data)
            && range_is_empty(*min, *max)
        {
            return Some(Disjoint::new(
                DisjointKind::Range,
                self.rec(min_id).json.clone(),
                self.rec(max_id).json.clone(),
            ));
        }

        for &prop_id in &inner.required {
            if let NodeData::Required(prop) = &self.rec(prop_id).data
                && self.is_never(prop.value)
            {
                return Some(
                    Disjoint::new(
                        DisjointKind::Presence,
                        self.rec(prop_id).json.clone(),
                        Value::String("never".to_string()),
                    )
                    .with_prefix(Seg::Key(self.resolve_atom(prop.key))),
                );
            }
        }

        if let Some(basis) = inner.basis
            && let NodeData::Unit(unit) = &self.rec(basis).data
        {
            let value = self.unit_to_json(*unit);
            for constraint in inner.children() {
                if constraint == basis {
                    continue;
                }
                if !self.refinement_allows(constraint, &value) {
                    return Some(Disjoint::new(
                        DisjointKind::Unit,
                        self.rec(basis).json.clone(),
                        self.rec(constraint).json.clone(),
                    ));
                }
            }
        }
        None
    }

    // =========================================================================
    // Cycle guard
    // =========================================================================

    fn meet_enter(&self, key: &str) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.meets_in_flight.contains(key) {
            false
        } else {
            inner.meets_in_flight.insert(key.to_string());
            true
        }
    }

    fn meet_exit(&self, key: &str) {
        self.inner.borrow_mut().meets_in_flight.remove(key);
    }
}

/// Element of an open sequence seen from the front at `i`, for a fixed
/// total length `len`.
fn open_slot_at(open: &SequenceInner, i: usize, len: usize) -> NodeId {
    if let Some(&id) = open.prefix.get(i) {
        return id;
    }
    let from_end = len - i;
    if from_end <= open.postfix.len() {
        return open.postfix[open.postfix.len() - from_end];
    }
    // Between prefix and postfix: covered by the variadic element (callers
    // guarantee it exists for open sequences).
    open.variadic.unwrap_or(NodeId::INVALID)
}

fn postfix_slot(seq: &SequenceInner, i: usize, back: usize) -> Option<NodeId> {
    // Align postfix lists from the end: index 0 is `back` slots before the
    // final element.
    let skip = back - seq.postfix.len();
    if i < skip {
        None
    } else {
        seq.postfix.get(i - skip).copied()
    }
}

fn dedup_by_type<'a>(
    space: &Space,
    ids: impl Iterator<Item = &'a NodeId>,
) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = Vec::new();
    let mut seen: Vec<std::rc::Rc<str>> = Vec::new();
    for &id in ids {
        let type_id = space.rec(id).type_id.clone();
        if !seen.contains(&type_id) {
            seen.push(type_id);
            out.push(id);
        }
    }
    out
}

fn strictest(a: UndeclaredKeys, b: UndeclaredKeys) -> UndeclaredKeys {
    use UndeclaredKeys::*;
    match (a, b) {
        (Reject, _) | (_, Reject) => Reject,
        (Prune, _) | (_, Prune) => Prune,
        _ => Ignore,
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}

/// The tighter of two lower bounds: the larger rule; on a tie, exclusive
/// wins.
fn tighter_min(a: Bound, b: Bound) -> Bound {
    if a.rule > b.rule {
        a
    } else if b.rule > a.rule {
        b
    } else {
        Bound {
            rule: a.rule,
            exclusive: a.exclusive || b.exclusive,
        }
    }
}

fn tighter_max(a: Bound, b: Bound) -> Bound {
    if a.rule < b.rule {
        a
    } else if b.rule < a.rule {
        b
    } else {
        Bound {
            rule: a.rule,
            exclusive: a.exclusive || b.exclusive,
        }
    }
}

pub(crate) fn range_is_empty(min: Bound, max: Bound) -> bool {
    min.rule > max.rule || (min.rule == max.rule && (min.exclusive || max.exclusive))
}

#[cfg(test)]
#[path = "tests/intersect_tests.rs"]
mod tests;
