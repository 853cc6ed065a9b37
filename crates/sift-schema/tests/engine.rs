//! End-to-end engine tests over the public API.

use serde_json::{Value, json};
use sift_schema::{Composed, DisjointKind, SchemaError, Space, ViolationKind};

/// Opt into trace output with e.g. `RUST_LOG=sift_schema=trace`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn space() -> Space {
    init_tracing();
    Space::new()
}

fn require<'s>(composed: Composed<'s>) -> sift_schema::Node<'s> {
    composed.require().expect("intersection should be inhabited")
}

#[test]
fn a_realistic_event_schema_validates_and_reports() {
    let space = space();
    let event = space
        .node(json!([
            {"required": {
                "kind": {"unit": "message"},
                "body": {"domain": "string", "min": 1},
                "priority": ["number", "null"]
            }},
            {"required": {
                "kind": {"unit": "join"},
                "user": {"required": {"name": "string", "id": "number"}}
            }},
        ]))
        .unwrap();

    assert!(event.allows(&json!({
        "kind": "message", "body": "hello", "priority": null
    })));
    assert!(event.allows(&json!({
        "kind": "join", "user": {"name": "ada", "id": 1}
    })));

    let violations = event
        .check(&json!({"kind": "join", "user": {"name": "ada", "id": "one"}}))
        .unwrap_err();
    assert!(violations.at_path("user.id").is_some());
    assert!(!violations.summary().is_empty());
}

#[test]
fn intersection_narrows_and_proves_emptiness() {
    let space = space();
    let positive = space
        .node(json!({"domain": "number", "min": {"rule": 0, "exclusive": true}}))
        .unwrap();
    let even = space.node(json!({"divisor": 2})).unwrap();

    let positive_even = require(positive.intersect(even).unwrap());
    assert!(positive_even.allows(&json!(4)));
    assert!(!positive_even.allows(&json!(-4)));
    assert!(!positive_even.allows(&json!(3)));

    let string = space.node("string").unwrap();
    match positive.intersect(string).unwrap() {
        Composed::Never(disjoint) => {
            assert_eq!(disjoint.entries()[0].kind, DisjointKind::Domain);
            assert!(matches!(
                disjoint.into_error(),
                SchemaError::Contradiction(_)
            ));
        }
        Composed::Overlap(node) => panic!("expected emptiness, got {}", node.describe()),
    }
}

#[test]
fn schemas_intern_across_spellings() {
    let space = space();
    let a = space.node(json!({"divisor": {"rule": 4}})).unwrap();
    let b = space.node(json!({"domain": "number", "divisor": 4})).unwrap();
    assert!(a.equals(b));
    assert_eq!(a.type_id(), b.type_id());
}

#[test]
fn cyclic_binary_tree_schema() {
    let space = space();
    space
        .alias(
            "tree",
            json!({"required": {"value": "number"},
                   "optional": {"left": "tree", "right": "tree"}}),
        )
        .unwrap();
    let tree = space.bound("tree").unwrap();

    let data = json!({
        "value": 1,
        "left": {"value": 2, "left": {"value": 4}},
        "right": {"value": 3}
    });
    assert!(tree.allows(&data));

    let bad = json!({"value": 1, "left": {"value": "two"}});
    let violations = tree.check(&bad).unwrap_err();
    assert!(violations.at_path("left.value").is_some());
}

#[test]
fn morph_pipelines_parse_and_transform() {
    let space = space();
    space.register_morph("trim", |value| match value {
        Value::String(s) => Ok(Value::String(s.trim().to_string())),
        other => Ok(other),
    });
    space.register_morph("to_int", |value| match value.as_str() {
        Some(s) => s.parse::<i64>().map(Value::from).map_err(|e| e.to_string()),
        None => Err("expected a string".to_string()),
    });

    let parse_int = space
        .node(json!({"in": {"domain": "string", "min": 1}, "morphs": ["trim", "to_int"]}))
        .unwrap();

    assert_eq!(parse_int.morph(json!(" 42 ")).unwrap(), json!(42));
    let violations = parse_int.morph(json!("x")).unwrap_err();
    assert_eq!(
        violations.iter().next().unwrap().kind,
        ViolationKind::Morph
    );
}

#[test]
fn closed_shapes_reject_and_prune() {
    let space = space();
    let strict = space
        .node(json!({
            "required": {"name": "string"},
            "undeclared": "reject"
        }))
        .unwrap();
    let violations = strict
        .check(&json!({"name": "a", "stray": true}))
        .unwrap_err();
    assert_eq!(
        violations.at_path("stray").unwrap().kind,
        ViolationKind::Extraneous
    );

    let pruning = space
        .node(json!({
            "required": {"name": "string"},
            "undeclared": "prune"
        }))
        .unwrap();
    assert_eq!(
        pruning.morph(json!({"name": "a", "stray": true})).unwrap(),
        json!({"name": "a"})
    );
}

#[test]
fn json_projection_is_stable_and_reparsable() {
    let space = space();
    let node = space
        .node(json!({
            "required": {"tags": {"sequence": "string"}},
            "optional": {"limit": {"domain": "number", "divisor": 5}}
        }))
        .unwrap();

    let reparsed = space.node(node.json()).unwrap();
    assert!(node.equals(reparsed));
}

#[test]
fn unions_of_literals_dispatch_on_the_literal() {
    let space = space();
    let direction = space
        .node(json!([
            {"unit": "north"}, {"unit": "south"}, {"unit": "east"}, {"unit": "west"}
        ]))
        .unwrap();
    assert!(direction.allows(&json!("north")));
    assert!(!direction.allows(&json!("up")));

    let violations = direction.check(&json!("up")).unwrap_err();
    let violation = violations.iter().next().unwrap();
    assert_eq!(violation.kind, ViolationKind::Union);
    assert!(violation.expected.contains("north"));
}
