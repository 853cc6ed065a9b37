//! Raw definition parsing and normalization.
//!
//! Definitions arrive as plain JSON data, the boundary contract the string
//! syntax layer produces:
//!
//! - `"string"` — a domain (or proto, or alias reference for other names)
//! - `{"unit": 5}` — a literal
//! - `{"domain": "number", "divisor": 2}` — a property-bag intersection
//! - `{"branches": [...]}` or a bare array — a union
//! - `{"in": ..., "morphs": ["trim"]}` — a transform
//!
//! Bag keys are parsed in ascending kind precedence so a basis is always
//! resolved before the refinements that validate against it; non-kind keys
//! sort lexically after. Each kind normalizes shorthand (`{"divisor": 2}`
//! means `{"divisor": {"rule": 2}}`) and may reduce to a cheaper
//! equivalent before the interning cache is consulted.

use serde_json::{Map, Value};
use tracing::trace;

use crate::discriminate::{DiscrTree, DiscriminantPlan};
use crate::errors::SchemaError;
use crate::node::{
    BasisRequirement, Bound, Domain, IndexInner, IntersectionInner, MorphInner, MorphRef,
    MorphStep, NodeData, NodeId, NodeKind, NodeMeta, OrderedFloat, PatternInner, PredicateRef,
    PropInner, Proto, SequenceInner, UndeclaredKeys, UnionInner, UnitValue,
};
use crate::space::{Node, Space};
use std::rc::Rc;

/// A schema definition: raw JSON data, or an already-interned node
/// (returned unchanged, making parsing idempotent).
pub enum SchemaDef {
    Json(Value),
    Node(NodeId),
}

impl From<Value> for SchemaDef {
    fn from(value: Value) -> Self {
        SchemaDef::Json(value)
    }
}

impl From<&Value> for SchemaDef {
    fn from(value: &Value) -> Self {
        SchemaDef::Json(value.clone())
    }
}

impl From<&str> for SchemaDef {
    fn from(value: &str) -> Self {
        SchemaDef::Json(Value::String(value.to_string()))
    }
}

impl From<String> for SchemaDef {
    fn from(value: String) -> Self {
        SchemaDef::Json(Value::String(value))
    }
}

impl From<Node<'_>> for SchemaDef {
    fn from(node: Node<'_>) -> Self {
        SchemaDef::Node(node.id)
    }
}

impl Space {
    /// Parse a definition into an interned node handle.
    pub fn node(&self, def: impl Into<SchemaDef>) -> Result<Node<'_>, SchemaError> {
        let id = match def.into() {
            SchemaDef::Node(id) => id,
            SchemaDef::Json(value) => self.parse(None, &value)?,
        };
        Ok(Node { space: self, id })
    }

    /// Parse a definition and bind it under `name` for (possibly cyclic)
    /// self-reference.
    pub fn alias(&self, name: &str, def: impl Into<SchemaDef>) -> Result<Node<'_>, SchemaError> {
        let atom = self.atom(name);
        let node = self.node(def)?;
        self.bind_alias(atom, node.id);
        Ok(node)
    }

    /// Look up a node previously bound with [`Space::alias`].
    pub fn bound(&self, name: &str) -> Result<Node<'_>, SchemaError> {
        let atom = self.atom(name);
        let id = self.resolve_alias(atom)?;
        Ok(Node { space: self, id })
    }

    /// Parse with an optional kind expectation. A mismatch between the
    /// expected kind and the parsed result is an error.
    pub(crate) fn parse(
        &self,
        kind: Option<NodeKind>,
        def: &Value,
    ) -> Result<NodeId, SchemaError> {
        let id = match kind {
            Some(k) if k.is_refinement() => self.parse_refinement(k, def)?,
            _ => self.parse_any(def)?,
        };
        if let Some(expected) = kind {
            let actual = self.rec(id).kind;
            // Reduction may legally collapse toward a simpler kind (a bag
            // to its basis), so only reject when neither side is a set.
            if actual != expected && !expected.is_refinement() && !actual.is_set() {
                return Err(SchemaError::KindMismatch {
                    expected: expected.as_str(),
                    actual: actual.as_str(),
                });
            }
        }
        Ok(id)
    }

    /// Structural kind discrimination for unhinted definitions.
    fn parse_any(&self, def: &Value) -> Result<NodeId, SchemaError> {
        match def {
            Value::Null => self.intern_node(NodeData::Unit(UnitValue::Null), NodeMeta::default()),
            Value::Bool(b) => {
                self.intern_node(NodeData::Unit(UnitValue::Bool(*b)), NodeMeta::default())
            }
            Value::Number(n) => {
                let unit = UnitValue::Number(OrderedFloat(n.as_f64().unwrap_or(f64::NAN)));
                self.intern_node(NodeData::Unit(unit), NodeMeta::default())
            }
            Value::String(name) => self.parse_name(name),
            Value::Array(branches) => {
                let ids = branches
                    .iter()
                    .map(|branch| self.parse(None, branch))
                    .collect::<Result<Vec<_>, _>>()?;
                self.make_union(ids, NodeMeta::default())
            }
            Value::Object(map) => {
                if map.contains_key("branches") {
                    self.parse_union(map)
                } else if map.contains_key("morphs") {
                    self.parse_morph(map)
                } else {
                    self.parse_bag(map)
                }
            }
        }
    }

    /// A bare string resolves to a domain, a proto, a keyword, or — for any
    /// other name — a deferred alias reference.
    fn parse_name(&self, name: &str) -> Result<NodeId, SchemaError> {
        if let Some(domain) = Domain::from_name(name) {
            return self.intern_node(NodeData::Domain(domain), NodeMeta::default());
        }
        if let Some(proto) = Proto::from_name(name) {
            return self.intern_node(NodeData::Proto(proto), NodeMeta::default());
        }
        match name {
            "null" => self.intern_node(NodeData::Unit(UnitValue::Null), NodeMeta::default()),
            "never" => self.make_union(Vec::new(), NodeMeta::default()),
            "unknown" => self.unknown_node(),
            _ => {
                let atom = self.atom(name);
                self.intern_node(NodeData::Alias(atom), NodeMeta::default())
            }
        }
    }

    /// The top node: an empty bag constraining nothing.
    pub(crate) fn unknown_node(&self) -> Result<NodeId, SchemaError> {
        self.intern_node(
            NodeData::Intersection(IntersectionInner::default()),
            NodeMeta::default(),
        )
    }

    pub(crate) fn is_never(&self, id: NodeId) -> bool {
        matches!(&self.rec(id).data, NodeData::Union(u) if u.branches.is_empty())
    }

    fn parse_union(&self, map: &Map<String, Value>) -> Result<NodeId, SchemaError> {
        let meta = self.extract_meta(map)?;
        for key in map.keys() {
            if !matches!(key.as_str(), "branches" | "description" | "alias") {
                return Err(SchemaError::UnknownKey {
                    kind: "union",
                    key: key.clone(),
                });
            }
        }
        let branches = match map.get("branches") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| self.parse(None, item))
                .collect::<Result<Vec<_>, _>>()?,
            _ => {
                return Err(SchemaError::malformed("union", "'branches' must be an array"));
            }
        };
        self.make_union(branches, meta)
    }

    fn parse_morph(&self, map: &Map<String, Value>) -> Result<NodeId, SchemaError> {
        let meta = self.extract_meta(map)?;
        for key in map.keys() {
            if !matches!(key.as_str(), "in" | "morphs" | "description" | "alias") {
                return Err(SchemaError::UnknownKey {
                    kind: "morph",
                    key: key.clone(),
                });
            }
        }
        let input = match map.get("in") {
            Some(def) => self.parse(None, def)?,
            None => self.unknown_node()?,
        };
        let steps = match map.get("morphs") {
            Some(Value::Array(names)) => {
                let mut steps = Vec::with_capacity(names.len());
                for name in names {
                    let Value::String(name) = name else {
                        return Err(SchemaError::malformed("morph", "'morphs' entries must be names"));
                    };
                    steps.push(MorphStep::Apply(self.lookup_morph(name)?));
                }
                steps
            }
            Some(Value::String(name)) => vec![MorphStep::Apply(self.lookup_morph(name)?)],
            _ => {
                return Err(SchemaError::malformed("morph", "'morphs' must be a name or list of names"));
            }
        };
        self.intern_node(NodeData::Morph(MorphInner { input, steps }), meta)
    }

    fn lookup_morph(&self, name: &str) -> Result<MorphRef, SchemaError> {
        let atom = self.atom(name);
        let func = self.morph_fn(atom).ok_or_else(|| SchemaError::UnknownMorph {
            name: name.to_string(),
        })?;
        Ok(MorphRef { name: atom, func })
    }

    fn lookup_predicate(&self, name: &str) -> Result<PredicateRef, SchemaError> {
        let atom = self.atom(name);
        let func = self
            .predicate_fn(atom)
            .ok_or_else(|| SchemaError::UnknownPredicate {
                name: name.to_string(),
            })?;
        Ok(PredicateRef { name: atom, func })
    }

    fn extract_meta(&self, map: &Map<String, Value>) -> Result<NodeMeta, SchemaError> {
        let mut meta = NodeMeta::default();
        if let Some(desc) = map.get("description") {
            match desc {
                Value::String(s) => meta.description = Some(s.clone()),
                _ => return Err(SchemaError::malformed("meta", "'description' must be a string")),
            }
        }
        if let Some(alias) = map.get("alias") {
            match alias {
                Value::String(s) => meta.alias_name = Some(self.atom(s)),
                _ => return Err(SchemaError::malformed("meta", "'alias' must be a string")),
            }
        }
        Ok(meta)
    }

    // =========================================================================
    // Property-bag intersections
    // =========================================================================

    /// Map a bag key to the node kind it parses as, if any.
    fn bag_key_kind(key: &str) -> Option<NodeKind> {
        match key {
            "domain" => Some(NodeKind::Domain),
            "proto" => Some(NodeKind::Proto),
            "unit" => Some(NodeKind::Unit),
            "divisor" => Some(NodeKind::Divisor),
            "min" => Some(NodeKind::Min),
            "max" => Some(NodeKind::Max),
            "pattern" => Some(NodeKind::Pattern),
            "predicate" => Some(NodeKind::Predicate),
            "required" => Some(NodeKind::Required),
            "optional" => Some(NodeKind::Optional),
            "index" => Some(NodeKind::Index),
            "sequence" => Some(NodeKind::Sequence),
            _ => None,
        }
    }

    fn parse_bag(&self, map: &Map<String, Value>) -> Result<NodeId, SchemaError> {
        let meta = self.extract_meta(map)?;

        // Fixed key order: node-kind keys ascending by precedence, then the
        // remaining keys lexically. The basis must land before refinements
        // that validate against it.
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort_by_key(|key| match Self::bag_key_kind(key) {
            Some(kind) => (0u8, kind.precedence(), key.as_str()),
            None => (1u8, 0, key.as_str()),
        });

        let mut inner = IntersectionInner::default();
        let mut required_basis = BasisRequirement::Any;

        for key in keys {
            let value = &map[key.as_str()];
            match Self::bag_key_kind(key) {
                Some(NodeKind::Domain) | Some(NodeKind::Proto) | Some(NodeKind::Unit) => {
                    let parsed = self.parse_basis(key, value)?;
                    inner.basis = Some(match inner.basis {
                        None => parsed,
                        // Multiple basis keys meet into one (or contradict).
                        Some(existing) => self
                            .intersect_ids(existing, parsed)?
                            .map_err(|disjoint| disjoint.into_error())?,
                    });
                }
                Some(kind @ (NodeKind::Divisor
                | NodeKind::Min
                | NodeKind::Max
                | NodeKind::Pattern
                | NodeKind::Predicate
                | NodeKind::Required
                | NodeKind::Optional
                | NodeKind::Index
                | NodeKind::Sequence)) => {
                    let req = kind.implied_basis();
                    required_basis = match required_basis.meet(req) {
                        Some(r) => r,
                        None => {
                            return Err(SchemaError::malformed(
                                kind.as_str(),
                                "cannot share a basis with the other refinements of this definition",
                            ));
                        }
                    };
                    if let Some(basis) = inner.basis
                        && !self.basis_satisfies(basis, req)
                    {
                        return Err(SchemaError::malformed(
                            kind.as_str(),
                            format!("does not apply to {}", self.describe(basis)),
                        ));
                    }
                    self.parse_bag_refinement(kind, value, &mut inner)?;
                }
                Some(_) | None => match key.as_str() {
                    "undeclared" => {
                        inner.undeclared = match value.as_str() {
                            Some("ignore") => UndeclaredKeys::Ignore,
                            Some("reject") => UndeclaredKeys::Reject,
                            Some("prune") => UndeclaredKeys::Prune,
                            _ => {
                                return Err(SchemaError::malformed(
                                    "intersection",
                                    "'undeclared' must be ignore, reject, or prune",
                                ));
                            }
                        };
                    }
                    "description" | "alias" => {}
                    other => {
                        return Err(SchemaError::UnknownKey {
                            kind: "intersection",
                            key: other.to_string(),
                        });
                    }
                },
            }
        }

        // Refinements without an explicit basis imply one.
        if inner.basis.is_none() {
            inner.basis = match required_basis {
                BasisRequirement::Any => None,
                BasisRequirement::Number => {
                    Some(self.intern_node(NodeData::Domain(Domain::Number), NodeMeta::default())?)
                }
                BasisRequirement::String => {
                    Some(self.intern_node(NodeData::Domain(Domain::String), NodeMeta::default())?)
                }
                BasisRequirement::Object => {
                    Some(self.intern_node(NodeData::Domain(Domain::Object), NodeMeta::default())?)
                }
                BasisRequirement::MapOnly => {
                    Some(self.intern_node(NodeData::Proto(Proto::Map), NodeMeta::default())?)
                }
                BasisRequirement::ArrayOnly => {
                    Some(self.intern_node(NodeData::Proto(Proto::Array), NodeMeta::default())?)
                }
            };
        }

        self.intern_node(NodeData::Intersection(inner), meta)
    }

    fn parse_basis(&self, key: &str, value: &Value) -> Result<NodeId, SchemaError> {
        match key {
            "domain" => match value.as_str().and_then(Domain::from_name) {
                Some(domain) => self.intern_node(NodeData::Domain(domain), NodeMeta::default()),
                None => Err(SchemaError::malformed(
                    "domain",
                    "must be one of string, number, boolean, object",
                )),
            },
            "proto" => match value.as_str().and_then(Proto::from_name) {
                Some(proto) => self.intern_node(NodeData::Proto(proto), NodeMeta::default()),
                None => Err(SchemaError::malformed("proto", "must be Array or Map")),
            },
            "unit" => {
                let unit = self.unit_from_value(value)?;
                self.intern_node(NodeData::Unit(unit), NodeMeta::default())
            }
            _ => Err(SchemaError::UnknownKey {
                kind: "intersection",
                key: key.to_string(),
            }),
        }
    }

    pub(crate) fn unit_from_value(&self, value: &Value) -> Result<UnitValue, SchemaError> {
        match value {
            Value::Null => Ok(UnitValue::Null),
            Value::Bool(b) => Ok(UnitValue::Bool(*b)),
            Value::Number(n) => Ok(UnitValue::Number(OrderedFloat(
                n.as_f64().unwrap_or(f64::NAN),
            ))),
            Value::String(s) => Ok(UnitValue::String(self.atom(s))),
            Value::Array(_) | Value::Object(_) => Err(SchemaError::malformed(
                "unit",
                "literal values must be primitives; express container shapes structurally",
            )),
        }
    }

    fn parse_bag_refinement(
        &self,
        kind: NodeKind,
        value: &Value,
        inner: &mut IntersectionInner,
    ) -> Result<(), SchemaError> {
        match kind {
            NodeKind::Divisor => inner.divisor = Some(self.parse_refinement(kind, value)?),
            NodeKind::Min => inner.min = Some(self.parse_refinement(kind, value)?),
            NodeKind::Max => inner.max = Some(self.parse_refinement(kind, value)?),
            NodeKind::Pattern => match value {
                Value::Array(items) => {
                    for item in items {
                        inner.patterns.push(self.parse_refinement(kind, item)?);
                    }
                }
                _ => inner.patterns.push(self.parse_refinement(kind, value)?),
            },
            NodeKind::Predicate => match value {
                Value::Array(items) => {
                    for item in items {
                        inner.predicates.push(self.parse_refinement(kind, item)?);
                    }
                }
                _ => inner.predicates.push(self.parse_refinement(kind, value)?),
            },
            NodeKind::Required | NodeKind::Optional => {
                let props = self.parse_props(kind, value)?;
                if kind == NodeKind::Required {
                    inner.required.extend(props);
                } else {
                    inner.optional.extend(props);
                }
            }
            NodeKind::Index => match value {
                Value::Array(items) => {
                    for item in items {
                        inner.index.push(self.parse_refinement(kind, item)?);
                    }
                }
                _ => inner.index.push(self.parse_refinement(kind, value)?),
            },
            NodeKind::Sequence => inner.sequence = Some(self.parse_refinement(kind, value)?),
            _ => {}
        }
        Ok(())
    }

    /// Parse property entries: either `{"a": def, ...}` or
    /// `[{"key": "a", "value": def}, ...]`.
    fn parse_props(&self, kind: NodeKind, value: &Value) -> Result<Vec<NodeId>, SchemaError> {
        let mut out = Vec::new();
        match value {
            Value::Object(map) => {
                for (key, def) in map {
                    out.push(self.make_prop(kind, key, def)?);
                }
            }
            Value::Array(items) => {
                for item in items {
                    let Value::Object(entry) = item else {
                        return Err(SchemaError::malformed(
                            kind.as_str(),
                            "entries must be objects with 'key' and 'value'",
                        ));
                    };
                    let key = entry.get("key").and_then(Value::as_str).ok_or_else(|| {
                        SchemaError::malformed(kind.as_str(), "missing 'key'")
                    })?;
                    let def = entry
                        .get("value")
                        .ok_or_else(|| SchemaError::malformed(kind.as_str(), "missing 'value'"))?;
                    out.push(self.make_prop(kind, key, def)?);
                }
            }
            _ => {
                return Err(SchemaError::malformed(
                    kind.as_str(),
                    "must be a key-to-definition map or an entry list",
                ));
            }
        }
        // Canonical key order keeps prop lists structurally comparable.
        out.sort_by_key(|&id| match &self.rec(id).data {
            NodeData::Required(p) | NodeData::Optional(p) => self.resolve_atom(p.key),
            _ => Rc::from(""),
        });
        Ok(out)
    }

    fn make_prop(&self, kind: NodeKind, key: &str, def: &Value) -> Result<NodeId, SchemaError> {
        let value = self.parse(None, def)?;
        let prop = PropInner {
            key: self.atom(key),
            value,
        };
        let data = if kind == NodeKind::Required {
            NodeData::Required(prop)
        } else {
            NodeData::Optional(prop)
        };
        self.intern_node(data, NodeMeta::default())
    }

    /// Normalize and intern a single refinement definition.
    fn parse_refinement(&self, kind: NodeKind, def: &Value) -> Result<NodeId, SchemaError> {
        let data = match kind {
            NodeKind::Divisor => {
                let rule = Self::rule_value(def)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| SchemaError::malformed("divisor", "rule must be a number"))?;
                if rule < 1.0 || rule.fract() != 0.0 {
                    return Err(SchemaError::malformed(
                        "divisor",
                        "rule must be a positive integer",
                    ));
                }
                NodeData::Divisor(rule as u64)
            }
            NodeKind::Min | NodeKind::Max => {
                let (rule, exclusive) = match def {
                    Value::Number(n) => (n.as_f64().unwrap_or(f64::NAN), false),
                    Value::Object(map) => {
                        let rule = map.get("rule").and_then(Value::as_f64).ok_or_else(|| {
                            SchemaError::malformed(kind.as_str(), "rule must be a number")
                        })?;
                        let exclusive =
                            map.get("exclusive").and_then(Value::as_bool).unwrap_or(false);
                        (rule, exclusive)
                    }
                    _ => {
                        return Err(SchemaError::malformed(
                            kind.as_str(),
                            "must be a number or {rule, exclusive}",
                        ));
                    }
                };
                let bound = Bound {
                    rule: OrderedFloat(rule),
                    exclusive,
                };
                if kind == NodeKind::Min {
                    NodeData::Min(bound)
                } else {
                    NodeData::Max(bound)
                }
            }
            NodeKind::Pattern => {
                let source = Self::rule_value(def)
                    .and_then(Value::as_str)
                    .ok_or_else(|| SchemaError::malformed("pattern", "rule must be a string"))?;
                let regex = regex::Regex::new(source).map_err(|e| SchemaError::InvalidPattern {
                    pattern: source.to_string(),
                    reason: e.to_string(),
                })?;
                NodeData::Pattern(PatternInner {
                    source: Rc::from(source),
                    regex: Rc::new(regex),
                })
            }
            NodeKind::Predicate => {
                let name = Self::rule_value(def)
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        SchemaError::malformed("predicate", "rule must be a registered name")
                    })?;
                NodeData::Predicate(self.lookup_predicate(name)?)
            }
            NodeKind::Required | NodeKind::Optional => {
                let Value::Object(entry) = def else {
                    return Err(SchemaError::malformed(
                        kind.as_str(),
                        "must be an object with 'key' and 'value'",
                    ));
                };
                let key = entry
                    .get("key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SchemaError::malformed(kind.as_str(), "missing 'key'"))?;
                let value = entry
                    .get("value")
                    .ok_or_else(|| SchemaError::malformed(kind.as_str(), "missing 'value'"))?;
                return self.make_prop(kind, key, value);
            }
            NodeKind::Index => {
                let Value::Object(entry) = def else {
                    return Err(SchemaError::malformed(
                        "index",
                        "must be an object with 'signature' and 'value'",
                    ));
                };
                let signature = entry.get("signature").ok_or_else(|| {
                    SchemaError::malformed("index", "missing 'signature'")
                })?;
                let value = entry
                    .get("value")
                    .ok_or_else(|| SchemaError::malformed("index", "missing 'value'"))?;
                let signature = self.parse(None, signature)?;
                // An index signature matches keys, which are strings.
                if !self.basis_satisfies(signature, BasisRequirement::String) {
                    return Err(SchemaError::malformed(
                        "index",
                        "signature must constrain strings",
                    ));
                }
                NodeData::Index(IndexInner {
                    signature,
                    value: self.parse(None, value)?,
                })
            }
            NodeKind::Sequence => {
                let inner = match def {
                    Value::Object(map)
                        if map.keys().any(|k| {
                            matches!(k.as_str(), "prefix" | "variadic" | "postfix")
                        }) =>
                    {
                        for key in map.keys() {
                            if !matches!(key.as_str(), "prefix" | "variadic" | "postfix") {
                                return Err(SchemaError::UnknownKey {
                                    kind: "sequence",
                                    key: key.clone(),
                                });
                            }
                        }
                        let parse_list = |def: Option<&Value>| -> Result<Vec<NodeId>, SchemaError> {
                            match def {
                                None => Ok(Vec::new()),
                                Some(Value::Array(items)) => items
                                    .iter()
                                    .map(|item| self.parse(None, item))
                                    .collect(),
                                Some(_) => Err(SchemaError::malformed(
                                    "sequence",
                                    "'prefix' and 'postfix' must be arrays",
                                )),
                            }
                        };
                        let mut prefix = parse_list(map.get("prefix"))?;
                        let variadic = map
                            .get("variadic")
                            .map(|def| self.parse(None, def))
                            .transpose()?;
                        let mut postfix = parse_list(map.get("postfix"))?;
                        if variadic.is_none() {
                            // A fixed sequence's postfix is just more prefix.
                            prefix.append(&mut postfix);
                        }
                        SequenceInner {
                            prefix,
                            variadic,
                            postfix,
                        }
                    }
                    // Shorthand: the whole definition is the variadic element.
                    other => SequenceInner {
                        prefix: Vec::new(),
                        variadic: Some(self.parse(None, other)?),
                        postfix: Vec::new(),
                    },
                };
                NodeData::Sequence(inner)
            }
            _ => return self.parse_any(def),
        };
        self.intern_node(data, NodeMeta::default())
    }

    /// Unwrap the `{"rule": X}` normal form, or accept bare `X`.
    fn rule_value(def: &Value) -> Option<&Value> {
        match def {
            Value::Object(map) if map.len() == 1 => map.get("rule"),
            other => Some(other),
        }
    }

    /// Can a basis (or basis-bearing composite) host a refinement with
    /// this requirement?
    pub(crate) fn basis_satisfies(&self, basis: NodeId, req: BasisRequirement) -> bool {
        use BasisRequirement::*;
        match (&self.rec(basis).data, req) {
            (_, Any) => true,
            (NodeData::Domain(d), Number) => *d == Domain::Number,
            (NodeData::Domain(d), String) => *d == Domain::String,
            (NodeData::Domain(d), Object | MapOnly | ArrayOnly) => *d == Domain::Object,
            (NodeData::Proto(_), Object) => true,
            (NodeData::Proto(p), MapOnly) => *p == Proto::Map,
            (NodeData::Proto(p), ArrayOnly) => *p == Proto::Array,
            (NodeData::Unit(u), Number) => matches!(u, UnitValue::Number(_)),
            (NodeData::Unit(u), String) => matches!(u, UnitValue::String(_)),
            (NodeData::Intersection(inner), _) => match inner.basis {
                Some(inner_basis) => self.basis_satisfies(inner_basis, req),
                None => false,
            },
            (NodeData::Union(inner), _) => inner
                .branches
                .iter()
                .all(|&branch| self.basis_satisfies(branch, req)),
            _ => false,
        }
    }

    // =========================================================================
    // Set-kind constructors
    // =========================================================================

    /// Build a union: flatten nested unions, dedup structurally, collapse
    /// singletons, and precompute the discrimination plan.
    pub(crate) fn make_union(
        &self,
        branches: Vec<NodeId>,
        meta: NodeMeta,
    ) -> Result<NodeId, SchemaError> {
        let mut flat: Vec<NodeId> = Vec::with_capacity(branches.len());
        for branch in branches {
            match &self.rec(branch).data {
                NodeData::Union(inner) => flat.extend(inner.branches.iter().copied()),
                _ => flat.push(branch),
            }
        }
        let mut seen: Vec<Rc<str>> = Vec::with_capacity(flat.len());
        flat.retain(|&id| {
            let type_id = self.rec(id).type_id.clone();
            if seen.contains(&type_id) {
                false
            } else {
                seen.push(type_id);
                true
            }
        });

        if flat.len() == 1 {
            return Ok(flat[0]);
        }

        let plan = if flat.is_empty() {
            DiscriminantPlan {
                root: DiscrTree::Linear(Vec::new()),
            }
        } else {
            self.compile_discriminants(&flat)?
        };
        trace!(branches = flat.len(), "built union");
        self.intern_node(
            NodeData::Union(UnionInner {
                branches: flat,
                plan: Rc::new(plan),
            }),
            meta,
        )
    }

    // =========================================================================
    // Reduce hooks
    // =========================================================================

    /// Per-kind parse-time reduction, invoked before the cache line for a
    /// new identity is written. `Some(id)` replaces the node being interned;
    /// contradictions surface as errors here.
    pub(crate) fn reduce_data(&self, data: &NodeData) -> Result<Option<NodeId>, SchemaError> {
        match data {
            NodeData::Union(inner) if inner.branches.len() == 1 => Ok(Some(inner.branches[0])),
            NodeData::Morph(inner) if inner.steps.is_empty() => Ok(Some(inner.input)),
            NodeData::Sequence(inner) => self.reduce_sequence(inner),
            NodeData::Intersection(inner) => self.reduce_bag(inner),
            _ => Ok(None),
        }
    }

    /// A postfix element equal to the variadic element can be shifted into
    /// the prefix: `[...T[], T]` accepts exactly the same arrays as
    /// `[T, ...T[]]`, and the shorter postfix list is canonical.
    fn reduce_sequence(&self, inner: &SequenceInner) -> Result<Option<NodeId>, SchemaError> {
        let Some(variadic) = inner.variadic else {
            return Ok(None);
        };
        if inner.postfix.first() != Some(&variadic) {
            return Ok(None);
        }
        let mut prefix = inner.prefix.clone();
        let mut postfix = inner.postfix.clone();
        while postfix.first() == Some(&variadic) {
            prefix.push(variadic);
            postfix.remove(0);
        }
        let reduced = SequenceInner {
            prefix,
            variadic: Some(variadic),
            postfix,
        };
        Ok(Some(self.intern_node(
            NodeData::Sequence(reduced),
            NodeMeta::default(),
        )?))
    }

    /// Bag reductions: collapse to a lone basis, collapse refinements on a
    /// literal basis that already hold, and reject intrinsic
    /// contradictions. A contradiction here means the author defined
    /// something unsatisfiable, so it is thrown immediately.
    fn reduce_bag(&self, inner: &IntersectionInner) -> Result<Option<NodeId>, SchemaError> {
        if let Some(disjoint) = self.bag_contradiction(inner) {
            return Err(disjoint.into_error());
        }

        let Some(basis) = inner.basis else {
            return Ok(None);
        };

        // A literal basis that survived the contradiction check satisfies
        // every refinement in the bag, so the bag is just the literal.
        if matches!(&self.rec(basis).data, NodeData::Unit(_)) {
            return Ok(Some(basis));
        }

        if inner.constraint_count() == 0 && inner.undeclared == UndeclaredKeys::Ignore {
            return Ok(Some(basis));
        }
        Ok(None)
    }
}

#[cfg(test)]
#[path = "tests/parse_tests.rs"]
mod tests;
