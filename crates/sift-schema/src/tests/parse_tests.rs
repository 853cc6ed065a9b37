use super::*;
use crate::node::NodeKind;
use serde_json::json;

#[test]
fn bare_strings_discriminate_domains_protos_and_aliases() {
    let space = Space::new();
    assert_eq!(space.node("string").unwrap().kind(), NodeKind::Domain);
    assert_eq!(space.node("Array").unwrap().kind(), NodeKind::Proto);
    assert_eq!(space.node("null").unwrap().kind(), NodeKind::Unit);
    assert_eq!(space.node("widget").unwrap().kind(), NodeKind::Alias);
}

#[test]
fn bare_arrays_parse_as_unions() {
    let space = Space::new();
    let node = space.node(json!(["string", "number"])).unwrap();
    assert_eq!(node.kind(), NodeKind::Union);
}

#[test]
fn property_bags_fall_back_to_intersection() {
    let space = Space::new();
    let node = space
        .node(json!({"required": {"name": "string"}}))
        .unwrap();
    assert_eq!(node.kind(), NodeKind::Intersection);
}

#[test]
fn a_lone_basis_bag_collapses_to_the_basis() {
    let space = Space::new();
    let via_bag = space.node(json!({"domain": "string"})).unwrap();
    let direct = space.node("string").unwrap();
    assert_eq!(via_bag.id(), direct.id());
}

#[test]
fn a_unit_def_collapses_to_a_unit_node() {
    let space = Space::new();
    let node = space.node(json!({"unit": "hello"})).unwrap();
    assert_eq!(node.kind(), NodeKind::Unit);
}

#[test]
fn refinements_imply_a_basis_when_none_is_given() {
    let space = Space::new();
    let node = space.node(json!({"divisor": 2})).unwrap();
    assert_eq!(node.json()["domain"], json!("number"));

    let props = space.node(json!({"required": {"a": "string"}})).unwrap();
    assert_eq!(props.json()["proto"], json!("Map"));
}

#[test]
fn refinements_validate_against_an_explicit_basis() {
    let space = Space::new();
    let err = space
        .node(json!({"domain": "string", "divisor": 2}))
        .unwrap_err();
    assert!(matches!(err, SchemaError::Malformed { kind: "divisor", .. }));
}

#[test]
fn bag_keys_parse_in_kind_precedence_order() {
    let space = Space::new();
    // The basis resolves first even when the definition spells the
    // refinement key before it.
    let err = space
        .node(json!({"divisor": 2, "domain": "string"}))
        .unwrap_err();
    assert!(matches!(err, SchemaError::Malformed { kind: "divisor", .. }));

    let ok = space.node(json!({"divisor": 2, "domain": "number"})).unwrap();
    assert_eq!(ok.id(), space.node(json!({"divisor": 2})).unwrap().id());
}

#[test]
fn refinements_with_incompatible_implied_bases_are_rejected() {
    let space = Space::new();
    let err = space
        .node(json!({"divisor": 2, "pattern": "^a"}))
        .unwrap_err();
    assert!(matches!(err, SchemaError::Malformed { .. }));
}

#[test]
fn unknown_keys_are_parse_errors() {
    let space = Space::new();
    let err = space
        .node(json!({"domain": "string", "frobnicate": true}))
        .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownKey { .. }));
}

#[test]
fn an_empty_range_is_a_contradiction() {
    let space = Space::new();
    let err = space.node(json!({"min": 5, "max": 3})).unwrap_err();
    assert!(matches!(err, SchemaError::Contradiction(_)));

    let err = space
        .node(json!({"min": {"rule": 3, "exclusive": true}, "max": 3}))
        .unwrap_err();
    assert!(matches!(err, SchemaError::Contradiction(_)));
}

#[test]
fn a_required_prop_accepting_nothing_is_a_contradiction() {
    let space = Space::new();
    let err = space
        .node(json!({"required": {"a": "never"}}))
        .unwrap_err();
    assert!(matches!(err, SchemaError::Contradiction(_)));
}

#[test]
fn refinements_on_a_satisfying_literal_collapse_to_the_literal() {
    let space = Space::new();
    let node = space.node(json!({"unit": 6, "divisor": 3})).unwrap();
    assert_eq!(node.kind(), NodeKind::Unit);
    assert_eq!(node.id(), space.node(json!({"unit": 6})).unwrap().id());
}

#[test]
fn refinements_on_a_failing_literal_are_a_contradiction() {
    let space = Space::new();
    let err = space.node(json!({"unit": 5, "divisor": 3})).unwrap_err();
    assert!(matches!(err, SchemaError::Contradiction(_)));
}

#[test]
fn single_branch_unions_collapse() {
    let space = Space::new();
    let node = space.node(json!(["string", "string"])).unwrap();
    assert_eq!(node.kind(), NodeKind::Domain);
}

#[test]
fn nested_unions_flatten() {
    let space = Space::new();
    let node = space
        .node(json!({"branches": [["string", "number"], "boolean"]}))
        .unwrap();
    let union = space.node(json!(["string", "number", "boolean"])).unwrap();
    assert_eq!(node.id(), union.id());
}

#[test]
fn sequence_postfix_equal_to_variadic_shifts_into_prefix() {
    let space = Space::new();
    let node = space
        .node(json!({"sequence": {"variadic": "number", "postfix": ["number", "string"]}}))
        .unwrap();
    assert_eq!(
        node.json()["sequence"],
        json!({"prefix": ["number"], "variadic": "number", "postfix": ["string"]})
    );
}

#[test]
fn fixed_sequences_fold_postfix_into_prefix() {
    let space = Space::new();
    let node = space
        .node(json!({"sequence": {"prefix": ["string"], "postfix": ["number"]}}))
        .unwrap();
    assert_eq!(
        node.json()["sequence"],
        json!({"prefix": ["string", "number"]})
    );
}

#[test]
fn morphs_must_be_registered() {
    let space = Space::new();
    let err = space
        .node(json!({"in": "string", "morphs": ["trim"]}))
        .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownMorph { .. }));

    space.register_morph("trim", |value| match value {
        serde_json::Value::String(s) => Ok(serde_json::Value::String(s.trim().to_string())),
        other => Ok(other),
    });
    let node = space
        .node(json!({"in": "string", "morphs": ["trim"]}))
        .unwrap();
    assert_eq!(node.kind(), NodeKind::Morph);
}

#[test]
fn predicates_must_be_registered() {
    let space = Space::new();
    let err = space.node(json!({"predicate": "even"})).unwrap_err();
    assert!(matches!(err, SchemaError::UnknownPredicate { .. }));

    space.register_predicate("even", |value| {
        value.as_f64().is_some_and(|n| n % 2.0 == 0.0)
    });
    assert!(space.node(json!({"predicate": "even"})).is_ok());
}

#[test]
fn aliases_bind_and_resolve() {
    let space = Space::new();
    space.alias("id", json!({"domain": "string", "min": 1})).unwrap();
    let bound = space.bound("id").unwrap();
    assert_eq!(bound.kind(), NodeKind::Intersection);
    assert!(space.bound("missing").is_err());
}

#[test]
fn forward_alias_references_parse_before_binding() {
    let space = Space::new();
    // "tree" is not bound yet; the reference itself still parses.
    let node = space.node(json!({"optional": {"left": "tree"}})).unwrap();
    assert_eq!(node.kind(), NodeKind::Intersection);
}

#[test]
fn parsed_nodes_are_idempotent_inputs() {
    let space = Space::new();
    let node = space.node(json!({"domain": "string"})).unwrap();
    let again = space.node(node).unwrap();
    assert_eq!(node.id(), again.id());
}

#[test]
fn compound_units_are_rejected() {
    let space = Space::new();
    let err = space.node(json!({"unit": [1, 2]})).unwrap_err();
    assert!(matches!(err, SchemaError::Malformed { kind: "unit", .. }));
}
