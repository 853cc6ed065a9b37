use super::*;
use crate::node::NodeData;
use crate::space::Space;
use serde_json::json;

fn tagged(tag: &str, extra_key: &str, extra: &str) -> serde_json::Value {
    let mut required = serde_json::Map::new();
    required.insert("kind".to_string(), json!({"unit": tag}));
    required.insert(extra_key.to_string(), json!(extra));
    json!({"required": required})
}

fn union_plan(space: &Space, def: serde_json::Value) -> DiscriminantPlan {
    let node = space.node(def).unwrap();
    match &space.rec(node.id()).data {
        NodeData::Union(inner) => (*inner.plan).clone(),
        other => panic!("expected a union, got {other:?}"),
    }
}

#[test]
fn unit_tagged_branches_compile_to_a_switch() {
    let space = Space::new();
    let plan = union_plan(
        &space,
        json!([
            tagged("add", "value", "number"),
            tagged("remove", "id", "string"),
        ]),
    );
    let DiscrTree::Switch(switch) = &plan.root else {
        panic!("expected a switch, got {:?}", plan.root);
    };
    assert_eq!(switch.kind, DiscrKind::Unit);
    assert_eq!(switch.path, vec![Seg::key("kind")]);
    assert_eq!(switch.cases.len(), 2);
    assert!(switch.cases.contains_key("\"add\""));
    assert!(switch.cases.contains_key("\"remove\""));
    assert!(switch.default.is_none());
}

#[test]
fn domain_differences_compile_to_a_domain_switch() {
    let space = Space::new();
    let plan = union_plan(&space, json!(["string", "number", "boolean"]));
    let DiscrTree::Switch(switch) = &plan.root else {
        panic!("expected a switch, got {:?}", plan.root);
    };
    assert_eq!(switch.kind, DiscrKind::Domain);
    assert!(switch.path.is_empty());
    assert_eq!(switch.cases.len(), 3);
}

#[test]
fn overlapping_branches_fall_back_to_a_linear_scan() {
    let space = Space::new();
    let plan = union_plan(
        &space,
        json!([
            {"domain": "string", "min": 1},
            {"domain": "string", "max": 5},
        ]),
    );
    assert!(matches!(&plan.root, DiscrTree::Linear(branches) if branches.len() == 2));
}

#[test]
fn undeterminable_branches_collect_into_the_default_bucket() {
    let space = Space::new();
    let plan = union_plan(
        &space,
        json!([
            tagged("a", "x", "number"),
            tagged("b", "y", "number"),
            "string",
        ]),
    );
    // The domain split (object vs string) cuts two pairs and wins; the
    // object bucket then switches on the unit tag.
    let DiscrTree::Switch(switch) = &plan.root else {
        panic!("expected a switch, got {:?}", plan.root);
    };
    assert_eq!(switch.kind, DiscrKind::Domain);
    let object_bucket = &switch.cases["object"];
    assert!(matches!(object_bucket, DiscrTree::Switch(inner) if inner.kind == DiscrKind::Unit));
    assert!(matches!(&switch.cases["string"], DiscrTree::Leaf { .. }));
}

#[test]
fn discriminant_dispatch_prunes_the_matched_prop() {
    let space = Space::new();
    let plan = union_plan(
        &space,
        json!([
            tagged("add", "value", "number"),
            tagged("remove", "id", "string"),
        ]),
    );
    let DiscrTree::Switch(switch) = &plan.root else {
        panic!("expected a switch");
    };
    let DiscrTree::Leaf { branch, pruned } = &switch.cases["\"add\""] else {
        panic!("expected a leaf");
    };
    assert_ne!(branch, pruned);
    let NodeData::Intersection(inner) = &space.rec(*pruned).data else {
        panic!("expected a pruned bag");
    };
    // The kind prop is gone; the payload prop remains.
    assert_eq!(inner.required.len(), 1);
}

#[test]
fn discriminants_are_sound() {
    // Branches placed in different cases accept no common value at the
    // switch path.
    let space = Space::new();
    let add = space
        .node(tagged("add", "value", "number"))
        .unwrap();
    let remove = space
        .node(tagged("remove", "id", "string"))
        .unwrap();
    space
        .node(json!([
            tagged("add", "value", "number"),
            tagged("remove", "id", "string"),
        ]))
        .unwrap();

    let tagged_add = json!({"kind": "add", "value": 1});
    assert!(add.allows(&tagged_add));
    assert!(!remove.allows(&tagged_add));
}

#[test]
fn an_ambiguous_morph_union_is_rejected_at_compile_time() {
    let space = Space::new();
    space.register_morph("trim", |v| Ok(v));
    let err = space
        .node(json!([
            {"in": {"domain": "string"}, "morphs": ["trim"]},
            {"domain": "string", "min": 2},
        ]))
        .unwrap_err();
    assert!(matches!(err, SchemaError::IndiscriminableMorphUnion { .. }));
}

#[test]
fn a_discriminable_morph_union_is_fine() {
    let space = Space::new();
    space.register_morph("trim", |v| Ok(v));
    let node = space.node(json!([
        {"in": {"domain": "string"}, "morphs": ["trim"]},
        "number",
    ]));
    assert!(node.is_ok());
}

#[test]
fn container_index_paths_are_never_discriminants() {
    let space = Space::new();
    // The only structural difference sits at sequence slot 0, which an
    // empty array cannot distinguish — so no switch is possible.
    let plan = union_plan(
        &space,
        json!([
            {"sequence": "string", "min": 1},
            {"sequence": "number", "max": 9},
        ]),
    );
    assert!(matches!(&plan.root, DiscrTree::Linear(_)));
}
