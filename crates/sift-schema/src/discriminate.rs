//! Union discrimination: compile branch sets into decision trees.
//!
//! Instead of a linear OR-scan over branches, a union precomputes the
//! cheapest set of distinguishing checks. Candidate discriminants come
//! from the pairwise intersections of branches: every `(path, kind)` at
//! which two branches are provably disjoint — restricted to cheaply
//! serializable kinds (domain, unit) at paths with no container-index
//! segments, since an empty container cannot distinguish anything.
//!
//! Selection is greedy: the candidate cutting the most remaining branch
//! pairs wins, ties broken by encounter order, with an early exit when a
//! candidate separates every remaining pair. This is a heuristic, not an
//! optimal decision-tree construction (that problem is NP-hard); it is
//! kept deliberately greedy.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::errors::SchemaError;
use crate::node::{NodeData, NodeFlags, NodeId, NodeMeta, PropInner, Seg};
use crate::space::{Space, canonical_string};

/// Discriminant kinds cheap enough to switch on at runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiscrKind {
    /// Dispatch on the serialized domain of the value at the path.
    Domain,
    /// Dispatch on a primitive literal at the path.
    Unit,
}

/// The compiled dispatch plan of a union.
#[derive(Clone, Debug)]
pub struct DiscriminantPlan {
    pub root: DiscrTree,
}

#[derive(Clone, Debug)]
pub enum DiscrTree {
    /// A single remaining branch. `pruned` is the branch with every
    /// ancestor discriminant check removed (the dispatch already
    /// guaranteed those), or the branch itself when nothing was prunable.
    Leaf { branch: NodeId, pruned: NodeId },
    Switch(Box<SwitchNode>),
    /// No discriminant advances the search: check branches in order.
    Linear(Vec<NodeId>),
}

#[derive(Clone, Debug)]
pub struct SwitchNode {
    pub path: Vec<Seg>,
    pub kind: DiscrKind,
    /// Case key → subtree. Keys are serialized domain names or canonical
    /// literal strings.
    pub cases: IndexMap<String, DiscrTree>,
    /// Branches whose discriminant value could not be determined. Checked
    /// when a value's case misses — and also when its matched case
    /// rejects, since an undetermined branch may still accept the value.
    pub default: Option<Box<DiscrTree>>,
}

type Candidate = (Vec<Seg>, DiscrKind);
type PairSet = FxHashSet<(usize, usize)>;

impl Space {
    /// Compile the dispatch plan for a set of union branches.
    pub(crate) fn compile_discriminants(
        &self,
        branches: &[NodeId],
    ) -> Result<DiscriminantPlan, SchemaError> {
        let mut candidates: IndexMap<Candidate, PairSet> = IndexMap::new();

        for i in 0..branches.len() {
            for j in (i + 1)..branches.len() {
                // A meet failure (e.g. an unresolved forward alias) just
                // means this pair contributes no discriminant.
                let disjoint = match self.intersect_ids(branches[i], branches[j]) {
                    Ok(Err(disjoint)) => disjoint,
                    Ok(Ok(_)) | Err(_) => continue,
                };
                for entry in disjoint.entries() {
                    let kind = match entry.kind {
                        crate::disjoint::DisjointKind::Domain => DiscrKind::Domain,
                        crate::disjoint::DisjointKind::Unit => DiscrKind::Unit,
                        _ => continue,
                    };
                    if entry.path.iter().any(Seg::is_item) {
                        continue;
                    }
                    candidates
                        .entry((entry.path.clone(), kind))
                        .or_default()
                        .insert((i, j));
                }
            }
        }
        debug!(
            branches = branches.len(),
            candidates = candidates.len(),
            "discriminant candidates collected"
        );

        let active: Vec<usize> = (0..branches.len()).collect();
        let root = self.build_tree(branches, &active, &candidates, &[])?;
        self.reject_ambiguous_morphs(&root)?;
        Ok(DiscriminantPlan { root })
    }

    fn build_tree(
        &self,
        branches: &[NodeId],
        active: &[usize],
        candidates: &IndexMap<Candidate, PairSet>,
        prunes: &[(Vec<Seg>, String)],
    ) -> Result<DiscrTree, SchemaError> {
        if active.len() == 1 {
            return self.make_leaf(branches[active[0]], prunes);
        }

        let total_pairs = active.len() * (active.len() - 1) / 2;
        let in_active = |&(i, j): &(usize, usize)| active.contains(&i) && active.contains(&j);

        // Greedy selection by number of remaining pairs cut; ties break by
        // encounter order, and a full cut short-circuits the scan.
        let mut best: Option<(&Candidate, usize)> = None;
        for (candidate, pairs) in candidates {
            let score = pairs.iter().filter(|pair| in_active(pair)).count();
            if score == total_pairs {
                best = Some((candidate, score));
                break;
            }
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }

        let Some(((path, kind), score)) = best.map(|(c, s)| (c.clone(), s)) else {
            // No discriminant separates any remaining pair.
            return Ok(DiscrTree::Linear(
                active.iter().map(|&idx| branches[idx]).collect(),
            ));
        };
        trace!(score, ?path, ?kind, "selected discriminant");

        let mut cases: IndexMap<String, Vec<usize>> = IndexMap::new();
        let mut default: Vec<usize> = Vec::new();
        for &idx in active {
            match self.discriminant_value_at(branches[idx], &path, kind) {
                Some(case_key) => cases.entry(case_key).or_default().push(idx),
                None => default.push(idx),
            }
        }

        let mut compiled_cases: IndexMap<String, DiscrTree> = IndexMap::new();
        for (case_key, bucket) in cases {
            let mut child_prunes = prunes.to_vec();
            if kind == DiscrKind::Unit {
                child_prunes.push((path.clone(), case_key.clone()));
            }
            let subtree = self.build_tree(branches, &bucket, candidates, &child_prunes)?;
            compiled_cases.insert(case_key, subtree);
        }
        let default_tree = if default.is_empty() {
            None
        } else {
            Some(Box::new(self.build_tree(
                branches, &default, candidates, prunes,
            )?))
        };

        Ok(DiscrTree::Switch(Box::new(SwitchNode {
            path,
            kind,
            cases: compiled_cases,
            default: default_tree,
        })))
    }

    fn make_leaf(
        &self,
        branch: NodeId,
        prunes: &[(Vec<Seg>, String)],
    ) -> Result<DiscrTree, SchemaError> {
        let mut pruned = branch;
        for (path, _) in prunes {
            pruned = self.prune_unit_prop(pruned, path)?;
        }
        Ok(DiscrTree::Leaf { branch, pruned })
    }

    /// A transform changes output type, so a union that cannot pick a
    /// single winning branch by discriminant must not contain one.
    fn reject_ambiguous_morphs(&self, tree: &DiscrTree) -> Result<(), SchemaError> {
        match tree {
            DiscrTree::Leaf { .. } => Ok(()),
            DiscrTree::Switch(switch) => {
                for subtree in switch.cases.values() {
                    self.reject_ambiguous_morphs(subtree)?;
                }
                if let Some(default) = &switch.default {
                    self.reject_ambiguous_morphs(&**default)?;
                }
                Ok(())
            }
            DiscrTree::Linear(branches) => {
                if branches.len() > 1
                    && branches
                        .iter()
                        .any(|&id| self.rec(id).flags.contains(NodeFlags::CONTAINS_MORPH))
                {
                    let summary = branches
                        .iter()
                        .map(|&id| self.rec(id).debug_name.clone())
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Err(SchemaError::IndiscriminableMorphUnion { summary });
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // Branch-side discriminant values
    // =========================================================================

    /// The serialized value a branch pins at `path`, if determinable.
    pub(crate) fn discriminant_value_at(
        &self,
        node: NodeId,
        path: &[Seg],
        kind: DiscrKind,
    ) -> Option<String> {
        let mut current = node;
        for seg in path {
            let Seg::Key(key) = seg else { return None };
            current = self.required_prop_value(current, key)?;
        }
        match kind {
            DiscrKind::Unit => {
                let unit = self.terminal_unit(current)?;
                Some(canonical_string(&self.unit_to_json(unit)))
            }
            DiscrKind::Domain => self.terminal_domain(current).map(str::to_string),
        }
    }

    fn required_prop_value(&self, node: NodeId, key: &str) -> Option<NodeId> {
        match &self.rec(node).data {
            NodeData::Intersection(inner) => {
                for &prop_id in &inner.required {
                    if let NodeData::Required(PropInner { key: k, value }) =
                        &self.rec(prop_id).data
                        && self.resolve_atom(*k).as_ref() == key
                    {
                        return Some(*value);
                    }
                }
                None
            }
            NodeData::Required(prop) => {
                (self.resolve_atom(prop.key).as_ref() == key).then_some(prop.value)
            }
            NodeData::Morph(inner) => self.required_prop_value(inner.input, key),
            _ => None,
        }
    }

    fn terminal_unit(&self, node: NodeId) -> Option<crate::node::UnitValue> {
        match &self.rec(node).data {
            NodeData::Unit(unit) => Some(*unit),
            NodeData::Intersection(inner) => {
                inner.basis.and_then(|basis| self.terminal_unit(basis))
            }
            NodeData::Morph(inner) => self.terminal_unit(inner.input),
            _ => None,
        }
    }

    fn terminal_domain(&self, node: NodeId) -> Option<&'static str> {
        match &self.rec(node).data {
            NodeData::Unit(unit) => Some(unit.domain_name()),
            NodeData::Domain(domain) => Some(domain.as_str()),
            NodeData::Proto(_) => Some("object"),
            NodeData::Intersection(inner) => {
                inner.basis.and_then(|basis| self.terminal_domain(basis))
            }
            NodeData::Morph(inner) => self.terminal_domain(inner.input),
            _ => None,
        }
    }

    // =========================================================================
    // Pruning
    // =========================================================================

    /// Remove the required prop at `path` from a branch: the dispatch that
    /// routed a value here already proved the prop matched. Unmatched
    /// shapes are returned unchanged.
    fn prune_unit_prop(&self, node: NodeId, path: &[Seg]) -> Result<NodeId, SchemaError> {
        let Some(Seg::Key(key)) = path.first() else {
            return Ok(node);
        };
        let rec = self.rec(node);
        match &rec.data {
            NodeData::Intersection(inner) => {
                let mut rebuilt = inner.clone();
                let mut changed = false;
                for (pos, &prop_id) in inner.required.iter().enumerate() {
                    let NodeData::Required(prop) = &self.rec(prop_id).data else {
                        continue;
                    };
                    if self.resolve_atom(prop.key).as_ref() != key.as_ref() {
                        continue;
                    }
                    if path.len() == 1 {
                        // Only a unit-valued prop is fully guaranteed by the
                        // dispatch; anything else keeps its check.
                        if matches!(self.rec(prop.value).data, NodeData::Unit(_)) {
                            rebuilt.required.remove(pos);
                            changed = true;
                        }
                    } else {
                        let pruned_value = self.prune_unit_prop(prop.value, &path[1..])?;
                        if pruned_value != prop.value {
                            rebuilt.required[pos] = self.intern_node(
                                NodeData::Required(PropInner {
                                    key: prop.key,
                                    value: pruned_value,
                                }),
                                NodeMeta::default(),
                            )?;
                            changed = true;
                        }
                    }
                    break;
                }
                if changed {
                    self.intern_node(NodeData::Intersection(rebuilt), NodeMeta::default())
                } else {
                    Ok(node)
                }
            }
            NodeData::Morph(inner) => {
                let pruned_input = self.prune_unit_prop(inner.input, path)?;
                if pruned_input == inner.input {
                    Ok(node)
                } else {
                    self.intern_node(
                        NodeData::Morph(crate::node::MorphInner {
                            input: pruned_input,
                            steps: inner.steps.clone(),
                        }),
                        NodeMeta::default(),
                    )
                }
            }
            _ => Ok(node),
        }
    }
}

#[cfg(test)]
#[path = "tests/discriminate_tests.rs"]
mod tests;
