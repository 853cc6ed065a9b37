use super::*;
use serde_json::json;

#[test]
fn parsing_the_same_definition_twice_interns_one_node() {
    let space = Space::new();
    let a = space.node(json!({"domain": "number", "divisor": 2})).unwrap();
    let b = space.node(json!({"domain": "number", "divisor": 2})).unwrap();
    let c = space.node(json!({"domain": "number", "divisor": 3})).unwrap();

    assert_eq!(a.id(), b.id());
    assert_ne!(a.id(), c.id());
    assert!(a.equals(b));
}

#[test]
fn meta_changes_inner_id_but_not_type_id() {
    let space = Space::new();
    let plain = space.node(json!({"domain": "number", "divisor": 2})).unwrap();
    let described = space
        .node(json!({"domain": "number", "divisor": 2, "description": "an even number"}))
        .unwrap();

    assert_ne!(plain.id(), described.id());
    assert_ne!(plain.inner_id(), described.inner_id());
    assert_eq!(plain.type_id(), described.type_id());
    assert_eq!(described.describe(), "an even number");
}

#[test]
fn type_id_round_trips_through_type_json() {
    let space = Space::new();
    let node = space
        .node(json!({"required": {"a": "string"}, "optional": {"b": "number"}}))
        .unwrap();

    let reproduced = format!(
        "{}:{}",
        node.kind().as_str(),
        canonical_string(&node.type_json())
    );
    assert_eq!(reproduced, node.type_id().as_ref());
}

#[test]
fn canonical_string_sorts_keys_at_every_level() {
    let a = canonical_string(&json!({"b": 1, "a": {"d": 2, "c": 3}}));
    let b = canonical_string(&json!({"a": {"c": 3, "d": 2}, "b": 1}));
    assert_eq!(a, b);
    assert_eq!(a, r#"{"a":{"c":3,"d":2},"b":1}"#);
}

#[test]
fn collapsible_keys_share_identity_with_bare_rules() {
    let space = Space::new();
    let bare = space.node(json!({"divisor": 3})).unwrap();
    let wrapped = space.node(json!({"divisor": {"rule": 3}})).unwrap();
    assert_eq!(bare.id(), wrapped.id());
}

#[test]
fn debug_names_count_per_kind() {
    let space = Space::new();
    let first = space.node(json!({"domain": "string"})).unwrap();
    assert!(first.debug_name().starts_with("domain"));
}

#[test]
fn node_json_reflects_the_normalized_structure() {
    let space = Space::new();
    let node = space.node(json!({"divisor": 2})).unwrap();
    // The implied number basis appears in the projection.
    assert_eq!(node.json(), json!({"domain": "number", "divisor": 2}));
}

#[test]
fn space_len_counts_interned_nodes() {
    let space = Space::new();
    assert!(space.is_empty());
    space.node(json!({"domain": "string"})).unwrap();
    assert!(!space.is_empty());
    let before = space.len();
    space.node(json!({"domain": "string"})).unwrap();
    assert_eq!(space.len(), before);
}
