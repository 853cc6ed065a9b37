//! Node model: kinds, canonical inner data, structural flags.
//!
//! A [`NodeId`] is an opaque handle into the `Space` arena. Every node is
//! immutable after construction and interned by its structural identity, so
//! `a == b` on ids is exactly structural equality of the underlying schemas.
//!
//! Kinds are declared in precedence order: set kinds first, then basis
//! kinds, then refinements. The intersection engine and the key-ordered
//! parser both rely on this single total order.

use bitflags::bitflags;
use regex::Regex;
use serde_json::Value;
use sift_common::Atom;
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

use crate::discriminate::DiscriminantPlan;

/// Opaque interned node handle (index into the `Space` arena).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel for an unallocated node slot.
    pub const INVALID: NodeId = NodeId(u32::MAX);
}

/// The closed set of node kinds, in precedence order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    // Set kinds
    Alias,
    Union,
    Morph,
    Intersection,
    // Basis kinds
    Unit,
    Proto,
    Domain,
    // Refinement kinds
    Divisor,
    Min,
    Max,
    Pattern,
    Predicate,
    Required,
    Optional,
    Index,
    Sequence,
}

impl NodeKind {
    /// Position in the fixed total order. Lower parses and dispatches first.
    #[inline]
    pub const fn precedence(self) -> u8 {
        self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            NodeKind::Alias => "alias",
            NodeKind::Union => "union",
            NodeKind::Morph => "morph",
            NodeKind::Intersection => "intersection",
            NodeKind::Unit => "unit",
            NodeKind::Proto => "proto",
            NodeKind::Domain => "domain",
            NodeKind::Divisor => "divisor",
            NodeKind::Min => "min",
            NodeKind::Max => "max",
            NodeKind::Pattern => "pattern",
            NodeKind::Predicate => "predicate",
            NodeKind::Required => "required",
            NodeKind::Optional => "optional",
            NodeKind::Index => "index",
            NodeKind::Sequence => "sequence",
        }
    }

    pub const fn is_set(self) -> bool {
        matches!(
            self,
            NodeKind::Alias | NodeKind::Union | NodeKind::Morph | NodeKind::Intersection
        )
    }

    pub const fn is_basis(self) -> bool {
        matches!(self, NodeKind::Unit | NodeKind::Proto | NodeKind::Domain)
    }

    pub const fn is_refinement(self) -> bool {
        !self.is_set() && !self.is_basis()
    }

    /// The basis a refinement of this kind can apply to.
    pub const fn implied_basis(self) -> BasisRequirement {
        match self {
            NodeKind::Divisor => BasisRequirement::Number,
            NodeKind::Pattern => BasisRequirement::String,
            NodeKind::Required | NodeKind::Optional | NodeKind::Index => BasisRequirement::MapOnly,
            NodeKind::Sequence => BasisRequirement::ArrayOnly,
            _ => BasisRequirement::Any,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of value a refinement's prerequisite basis must accept.
///
/// `Object` admits both maps and arrays; `MapOnly`/`ArrayOnly` pin the
/// container shape. The meet of two requirements narrows; an empty meet is
/// a contradiction (e.g. a divisor can never share a basis with a pattern).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BasisRequirement {
    Any,
    Number,
    String,
    Object,
    MapOnly,
    ArrayOnly,
}

impl BasisRequirement {
    /// Narrow two requirements to one, or report the contradiction.
    pub fn meet(self, other: BasisRequirement) -> Option<BasisRequirement> {
        use BasisRequirement::*;
        match (self, other) {
            (Any, r) | (r, Any) => Some(r),
            (a, b) if a == b => Some(a),
            (Object, MapOnly) | (MapOnly, Object) => Some(MapOnly),
            (Object, ArrayOnly) | (ArrayOnly, Object) => Some(ArrayOnly),
            _ => None,
        }
    }
}

/// Value domains of the JSON data model.
///
/// `Object` covers both maps and arrays; the `proto` kind refines between
/// them. `null` has no domain of its own, only the null unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    String,
    Number,
    Boolean,
    Object,
}

impl Domain {
    pub const fn as_str(self) -> &'static str {
        match self {
            Domain::String => "string",
            Domain::Number => "number",
            Domain::Boolean => "boolean",
            Domain::Object => "object",
        }
    }

    pub fn from_name(name: &str) -> Option<Domain> {
        match name {
            "string" => Some(Domain::String),
            "number" => Some(Domain::Number),
            "boolean" => Some(Domain::Boolean),
            "object" => Some(Domain::Object),
            _ => None,
        }
    }

    /// The domain of a concrete value. `None` for null.
    pub fn of_value(value: &Value) -> Option<Domain> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Domain::Boolean),
            Value::Number(_) => Some(Domain::Number),
            Value::String(_) => Some(Domain::String),
            Value::Array(_) | Value::Object(_) => Some(Domain::Object),
        }
    }
}

/// Serialized domain name of a value, including `"null"`.
/// This is the case-key vocabulary for domain discriminants.
pub fn domain_name_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

/// Builtin container shapes refining the object domain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Proto {
    /// JSON arrays.
    Array,
    /// Plain JSON maps.
    Map,
}

impl Proto {
    pub const fn as_str(self) -> &'static str {
        match self {
            Proto::Array => "Array",
            Proto::Map => "Map",
        }
    }

    pub fn from_name(name: &str) -> Option<Proto> {
        match name {
            "Array" => Some(Proto::Array),
            "Map" => Some(Proto::Map),
            _ => None,
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            Proto::Array => value.is_array(),
            Proto::Map => value.is_object(),
        }
    }
}

/// f64 with total equality and ordering (NaN canonicalized), so numeric
/// rules can participate in structural identity.
#[derive(Copy, Clone, Debug)]
pub struct OrderedFloat(pub f64);

impl OrderedFloat {
    fn canonical_bits(self) -> u64 {
        if self.0.is_nan() {
            f64::NAN.to_bits()
        } else if self.0 == 0.0 {
            // -0.0 and 0.0 are the same rule
            0.0f64.to_bits()
        } else {
            self.0.to_bits()
        }
    }
}

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_bits() == other.canonical_bits()
    }
}

impl Eq for OrderedFloat {}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical_bits().hash(state);
    }
}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A primitive literal identity. Compound values are not units; object and
/// array shapes are expressed structurally instead.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnitValue {
    Null,
    Bool(bool),
    Number(OrderedFloat),
    String(Atom),
}

impl UnitValue {
    /// Serialized domain name of the literal (`"null"` for null).
    pub const fn domain_name(self) -> &'static str {
        match self {
            UnitValue::Null => "null",
            UnitValue::Bool(_) => "boolean",
            UnitValue::Number(_) => "number",
            UnitValue::String(_) => "string",
        }
    }
}

/// Inclusive-by-default numeric or length bound.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Bound {
    pub rule: OrderedFloat,
    pub exclusive: bool,
}

pub type PredicateFn = Rc<dyn Fn(&Value) -> bool>;
pub type MorphFn = Rc<dyn Fn(Value) -> Result<Value, String>>;

/// A named custom predicate. Identity is the registered name; the function
/// itself has no stable structural identity.
#[derive(Clone)]
pub struct PredicateRef {
    pub name: Atom,
    pub func: PredicateFn,
}

impl fmt::Debug for PredicateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRef").field("name", &self.name).finish()
    }
}

/// A named transform. Identity is the registered name.
#[derive(Clone)]
pub struct MorphRef {
    pub name: Atom,
    pub func: MorphFn,
}

impl fmt::Debug for MorphRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MorphRef").field("name", &self.name).finish()
    }
}

/// One step of a morph pipeline: apply a transform, or validate the
/// in-flight value against a node (produced by piping into a validator).
#[derive(Clone, Debug)]
pub enum MorphStep {
    Apply(MorphRef),
    Check(NodeId),
}

/// Compiled regex refinement. Identity is the pattern source.
#[derive(Clone, Debug)]
pub struct PatternInner {
    pub source: Rc<str>,
    pub regex: Rc<Regex>,
}

/// A named property entry (`required` or `optional`).
#[derive(Clone, Debug)]
pub struct PropInner {
    pub key: Atom,
    pub value: NodeId,
}

/// An index signature: every key matched by `signature` must map to a
/// value satisfying `value`.
#[derive(Clone, Debug)]
pub struct IndexInner {
    pub signature: NodeId,
    pub value: NodeId,
}

/// Array element layout: fixed prefix, optional variadic middle, fixed
/// postfix.
#[derive(Clone, Debug, Default)]
pub struct SequenceInner {
    pub prefix: Vec<NodeId>,
    pub variadic: Option<NodeId>,
    pub postfix: Vec<NodeId>,
}

impl SequenceInner {
    pub fn min_length(&self) -> usize {
        self.prefix.len() + self.postfix.len()
    }

    /// Fixed length when there is no variadic element.
    pub fn exact_length(&self) -> Option<usize> {
        if self.variadic.is_none() {
            Some(self.prefix.len() + self.postfix.len())
        } else {
            None
        }
    }
}

/// Policy for keys of a map value matched by no declared prop or index
/// signature.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum UndeclaredKeys {
    #[default]
    Ignore,
    Reject,
    Prune,
}

impl UndeclaredKeys {
    pub const fn as_str(self) -> &'static str {
        match self {
            UndeclaredKeys::Ignore => "ignore",
            UndeclaredKeys::Reject => "reject",
            UndeclaredKeys::Prune => "prune",
        }
    }
}

/// The property-bag composite: an optional basis plus refinement slots.
///
/// This is the canonical inner of the `intersection` kind. A bag that
/// reduces to its basis alone never reaches the cache (the parser collapses
/// it), so an interned bag always carries at least one refinement.
#[derive(Clone, Debug, Default)]
pub struct IntersectionInner {
    pub basis: Option<NodeId>,
    pub divisor: Option<NodeId>,
    pub min: Option<NodeId>,
    pub max: Option<NodeId>,
    pub patterns: Vec<NodeId>,
    pub predicates: Vec<NodeId>,
    pub required: Vec<NodeId>,
    pub optional: Vec<NodeId>,
    pub index: Vec<NodeId>,
    pub sequence: Option<NodeId>,
    pub undeclared: UndeclaredKeys,
}

impl IntersectionInner {
    pub fn constraint_count(&self) -> usize {
        self.divisor.iter().count()
            + self.min.iter().count()
            + self.max.iter().count()
            + self.patterns.len()
            + self.predicates.len()
            + self.required.len()
            + self.optional.len()
            + self.index.len()
            + self.sequence.iter().count()
    }

    pub fn has_structure(&self) -> bool {
        !self.required.is_empty()
            || !self.optional.is_empty()
            || !self.index.is_empty()
            || self.sequence.is_some()
    }

    /// All child nodes in fixed kind order.
    pub fn children(&self) -> SmallVec<[NodeId; 8]> {
        let mut out = SmallVec::new();
        out.extend(self.basis);
        out.extend(self.divisor);
        out.extend(self.min);
        out.extend(self.max);
        out.extend(self.patterns.iter().copied());
        out.extend(self.predicates.iter().copied());
        out.extend(self.required.iter().copied());
        out.extend(self.optional.iter().copied());
        out.extend(self.index.iter().copied());
        out.extend(self.sequence);
        out
    }
}

/// A validated transform chain.
#[derive(Clone, Debug)]
pub struct MorphInner {
    pub input: NodeId,
    pub steps: Vec<MorphStep>,
}

/// Union branches plus the precomputed dispatch plan.
#[derive(Clone, Debug)]
pub struct UnionInner {
    pub branches: Vec<NodeId>,
    pub plan: Rc<DiscriminantPlan>,
}

/// Canonical kind-specific node payload.
#[derive(Clone, Debug)]
pub enum NodeData {
    Alias(Atom),
    Union(UnionInner),
    Morph(MorphInner),
    Intersection(IntersectionInner),
    Unit(UnitValue),
    Proto(Proto),
    Domain(Domain),
    Divisor(u64),
    Min(Bound),
    Max(Bound),
    Pattern(PatternInner),
    Predicate(PredicateRef),
    Required(PropInner),
    Optional(PropInner),
    Index(IndexInner),
    Sequence(SequenceInner),
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Alias(_) => NodeKind::Alias,
            NodeData::Union(_) => NodeKind::Union,
            NodeData::Morph(_) => NodeKind::Morph,
            NodeData::Intersection(_) => NodeKind::Intersection,
            NodeData::Unit(_) => NodeKind::Unit,
            NodeData::Proto(_) => NodeKind::Proto,
            NodeData::Domain(_) => NodeKind::Domain,
            NodeData::Divisor(_) => NodeKind::Divisor,
            NodeData::Min(_) => NodeKind::Min,
            NodeData::Max(_) => NodeKind::Max,
            NodeData::Pattern(_) => NodeKind::Pattern,
            NodeData::Predicate(_) => NodeKind::Predicate,
            NodeData::Required(_) => NodeKind::Required,
            NodeData::Optional(_) => NodeKind::Optional,
            NodeData::Index(_) => NodeKind::Index,
            NodeData::Sequence(_) => NodeKind::Sequence,
        }
    }

    /// Ordered structural children. Shared, not owned: multiple parents may
    /// reference the same interned child.
    pub fn children(&self) -> SmallVec<[NodeId; 8]> {
        match self {
            NodeData::Alias(_)
            | NodeData::Unit(_)
            | NodeData::Proto(_)
            | NodeData::Domain(_)
            | NodeData::Divisor(_)
            | NodeData::Min(_)
            | NodeData::Max(_)
            | NodeData::Pattern(_)
            | NodeData::Predicate(_) => SmallVec::new(),
            NodeData::Union(inner) => inner.branches.iter().copied().collect(),
            NodeData::Morph(inner) => {
                let mut out: SmallVec<[NodeId; 8]> = SmallVec::new();
                out.push(inner.input);
                for step in &inner.steps {
                    if let MorphStep::Check(id) = step {
                        out.push(*id);
                    }
                }
                out
            }
            NodeData::Intersection(inner) => inner.children(),
            NodeData::Required(p) | NodeData::Optional(p) => SmallVec::from_slice(&[p.value]),
            NodeData::Index(i) => SmallVec::from_slice(&[i.signature, i.value]),
            NodeData::Sequence(s) => {
                let mut out: SmallVec<[NodeId; 8]> = SmallVec::new();
                out.extend(s.prefix.iter().copied());
                out.extend(s.variadic);
                out.extend(s.postfix.iter().copied());
                out
            }
        }
    }
}

bitflags! {
    /// Cheap structural facts computed once at construction and propagated
    /// from children.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Contains a morph node somewhere in its graph.
        const CONTAINS_MORPH = 1 << 0;
        /// Contains an alias node (resolution-dependent facts unknown).
        const CONTAINS_ALIAS = 1 << 1;
        /// The undeclared-key policy of this node or a descendant is Prune.
        const CONTAINS_PRUNE = 1 << 2;
    }
}

/// Node metadata excluded from `type_id` but part of `inner_id`.
#[derive(Clone, Debug, Default)]
pub struct NodeMeta {
    pub description: Option<String>,
    pub alias_name: Option<Atom>,
}

impl NodeMeta {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.alias_name.is_none()
    }
}

/// Immutable interned node storage.
#[derive(Debug)]
pub struct NodeRecord {
    pub kind: NodeKind,
    pub data: NodeData,
    /// Structural projection including meta keys.
    pub json: Value,
    /// Structural projection excluding meta keys.
    pub type_json: Value,
    /// Identity over `json` — unique per interned instance.
    pub inner_id: Rc<str>,
    /// Identity over `type_json` — equal for nodes differing only in meta.
    pub type_id: Rc<str>,
    pub meta: NodeMeta,
    pub flags: NodeFlags,
    /// Autogenerated `<kind><counter>` name for debugging.
    pub debug_name: String,
}

/// One step of a value path: a map key or an array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Seg {
    Key(Rc<str>),
    Item(usize),
}

impl Seg {
    pub fn key(s: &str) -> Seg {
        Seg::Key(Rc::from(s))
    }

    pub const fn is_item(&self) -> bool {
        matches!(self, Seg::Item(_))
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => f.write_str(k),
            Seg::Item(i) => write!(f, "[{i}]"),
        }
    }
}

/// Canonical json for a numeric rule or literal: integer-valued floats
/// serialize as integers, so the schema-side and data-side renderings of
/// the same number always agree.
pub(crate) fn number_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() <= i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

/// Serialize a path as `a.b[0].c`. The empty path is the empty string.
pub fn path_to_string(path: &[Seg]) -> String {
    let mut out = String::new();
    for seg in path {
        match seg {
            Seg::Key(k) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            }
            Seg::Item(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "tests/node_tests.rs"]
mod tests;
