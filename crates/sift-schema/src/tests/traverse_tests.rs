use super::*;
use crate::space::Space;
use crate::violations::ViolationKind;
use serde_json::{Value, json};

#[test]
fn leaf_checks() {
    let space = Space::new();
    let even = space.node(json!({"divisor": 2})).unwrap();
    assert!(even.allows(&json!(4)));
    assert!(!even.allows(&json!(3)));
    assert!(!even.allows(&json!("4")));

    let short = space.node(json!({"domain": "string", "max": 3})).unwrap();
    assert!(short.allows(&json!("abc")));
    assert!(!short.allows(&json!("abcd")));

    let hex = space.node(json!({"pattern": "^[0-9a-f]+$"})).unwrap();
    assert!(hex.allows(&json!("c0ffee")));
    assert!(!hex.allows(&json!("tea")));

    let unit = space.node(json!({"unit": null})).unwrap();
    assert!(unit.allows(&json!(null)));
    assert!(!unit.allows(&json!(0)));
}

#[test]
fn exclusive_bounds() {
    let space = Space::new();
    let positive = space
        .node(json!({"domain": "number", "min": {"rule": 0, "exclusive": true}}))
        .unwrap();
    assert!(positive.allows(&json!(1)));
    assert!(!positive.allows(&json!(0)));
}

#[test]
fn every_violation_is_reported_in_one_pass() {
    let space = Space::new();
    let schema = space
        .node(json!({"required": {"a": "number", "b": "string"}}))
        .unwrap();
    let violations = schema.check(&json!({"a": "x"})).unwrap_err();

    assert_eq!(violations.len(), 2);
    let a = violations.at_path("a").unwrap();
    assert_eq!(a.kind, ViolationKind::Domain);
    let b = violations.at_path("b").unwrap();
    assert_eq!(b.kind, ViolationKind::Missing);
}

#[test]
fn two_failures_at_one_path_merge_into_one_diagnostic() {
    let space = Space::new();
    let schema = space
        .node(json!({"domain": "string", "min": 5, "pattern": "^[a-z]+$"}))
        .unwrap();
    let violations = schema.check(&json!("A1")).unwrap_err();

    assert_eq!(violations.len(), 1);
    let merged = violations.iter().next().unwrap();
    assert_eq!(merged.kind, ViolationKind::Intersection);
    assert!(merged.expected.contains("at least 5"));
    assert!(merged.expected.contains("matching"));
}

#[test]
fn nested_paths_are_tracked() {
    let space = Space::new();
    let schema = space
        .node(json!({"required": {"user": {"required": {"name": "string"}}}}))
        .unwrap();
    let violations = schema.check(&json!({"user": {"name": 42}})).unwrap_err();
    assert!(violations.at_path("user.name").is_some());
}

#[test]
fn sequences_check_slots_and_length() {
    let space = Space::new();
    let schema = space
        .node(json!({"sequence": {"prefix": ["string"], "variadic": "number"}}))
        .unwrap();

    assert!(schema.allows(&json!(["a", 1, 2])));
    assert!(schema.allows(&json!(["a"])));
    assert!(!schema.allows(&json!([])));
    assert!(!schema.allows(&json!([1])));

    let violations = schema.check(&json!(["a", "b"])).unwrap_err();
    assert!(violations.at_path("[1]").is_some());

    let violations = schema.check(&json!([])).unwrap_err();
    assert_eq!(violations.iter().next().unwrap().kind, ViolationKind::Length);
}

#[test]
fn a_failed_basis_short_circuits_the_bag() {
    let space = Space::new();
    let schema = space
        .node(json!({"required": {"a": "string"}}))
        .unwrap();
    let violations = schema.check(&json!(42)).unwrap_err();
    // One domain violation at the root, no phantom prop errors.
    assert_eq!(violations.len(), 1);
    assert!(violations.at_path("").is_some());
}

#[test]
fn undeclared_keys_ignored_by_default_rejected_on_request() {
    let space = Space::new();
    let open = space.node(json!({"required": {"a": "string"}})).unwrap();
    assert!(open.allows(&json!({"a": "x", "extra": 1})));

    let closed = space
        .node(json!({"required": {"a": "string"}, "undeclared": "reject"}))
        .unwrap();
    assert!(!closed.allows(&json!({"a": "x", "extra": 1})));
    let violations = closed.check(&json!({"a": "x", "extra": 1})).unwrap_err();
    let extra = violations.at_path("extra").unwrap();
    assert_eq!(extra.kind, ViolationKind::Extraneous);
}

#[test]
fn undeclared_keys_prune_during_morph() {
    let space = Space::new();
    let schema = space
        .node(json!({"required": {"a": "string"}, "undeclared": "prune"}))
        .unwrap();
    let out = schema.morph(json!({"a": "x", "extra": 1})).unwrap();
    assert_eq!(out, json!({"a": "x"}));
}

#[test]
fn index_signatures_check_matching_keys() {
    let space = Space::new();
    let schema = space
        .node(json!({"index": {"signature": {"pattern": "^x"}, "value": "number"}}))
        .unwrap();
    assert!(schema.allows(&json!({"x1": 1, "other": "ignored"})));
    assert!(!schema.allows(&json!({"x1": "not a number"})));

    let violations = schema.check(&json!({"x1": "bad"})).unwrap_err();
    assert!(violations.at_path("x1").is_some());
}

#[test]
fn discriminated_unions_dispatch_and_report() {
    let space = Space::new();
    let schema = space
        .node(json!([
            {"required": {"kind": {"unit": "add"}, "value": "number"}},
            {"required": {"kind": {"unit": "remove"}, "id": "string"}},
        ]))
        .unwrap();

    assert!(schema.allows(&json!({"kind": "add", "value": 2})));
    assert!(schema.allows(&json!({"kind": "remove", "id": "a"})));
    assert!(!schema.allows(&json!({"kind": "add", "id": "a"})));

    // A matched case reports its own diagnostics.
    let violations = schema
        .check(&json!({"kind": "add", "value": "two"}))
        .unwrap_err();
    assert!(violations.at_path("value").is_some());

    // An unmatched tag reports the union itself.
    let violations = schema.check(&json!({"kind": "clear"})).unwrap_err();
    assert_eq!(violations.iter().next().unwrap().kind, ViolationKind::Union);
}

#[test]
fn linear_unions_scan_in_order() {
    let space = Space::new();
    let schema = space
        .node(json!([
            {"domain": "string", "min": 4},
            {"domain": "string", "pattern": "^[a-z]+$"},
        ]))
        .unwrap();
    assert!(schema.allows(&json!("abc")));
    assert!(schema.allows(&json!("ABCD")));
    let violations = schema.check(&json!("A")).unwrap_err();
    assert_eq!(violations.iter().next().unwrap().kind, ViolationKind::Union);
}

#[test]
fn never_allows_nothing() {
    let space = Space::new();
    let never = space.node("never").unwrap();
    assert!(!never.allows(&json!(null)));
    assert!(!never.allows(&json!({})));
    assert!(never.check(&json!(1)).is_err());
}

#[test]
fn unknown_allows_everything() {
    let space = Space::new();
    let unknown = space.node("unknown").unwrap();
    assert!(unknown.allows(&json!(null)));
    assert!(unknown.allows(&json!({"any": ["thing"]})));
    assert!(unknown.check(&json!(1)).is_ok());
}

#[test]
fn cyclic_schemas_terminate() {
    let space = Space::new();
    space
        .alias("list", json!({"optional": {"next": "list"}}))
        .unwrap();
    let list = space.bound("list").unwrap();

    let mut data = json!({});
    for _ in 0..64 {
        data = json!({"next": data});
    }
    assert!(list.allows(&data));
    assert!(list.check(&data).is_ok());
}

#[test]
fn cyclic_schemas_report_deep_violations() {
    let space = Space::new();
    space
        .alias("list", json!({"optional": {"next": "list"}}))
        .unwrap();
    let list = space.bound("list").unwrap();

    let data = json!({"next": {"next": 5}});
    let violations = list.check(&data).unwrap_err();
    assert!(violations.at_path("next.next").is_some());
}

#[test]
fn unbound_aliases_surface_as_violations() {
    let space = Space::new();
    let node = space.node("phantom").unwrap();
    let violations = node.check(&json!(1)).unwrap_err();
    assert_eq!(
        violations.iter().next().unwrap().kind,
        ViolationKind::Unresolved
    );
    assert!(!node.allows(&json!(1)));
}

#[test]
fn morphs_transform_validated_values() {
    let space = Space::new();
    space.register_morph("trim", |value| match value {
        Value::String(s) => Ok(Value::String(s.trim().to_string())),
        other => Ok(other),
    });
    let schema = space
        .node(json!({"in": "string", "morphs": ["trim"]}))
        .unwrap();

    assert_eq!(schema.morph(json!("  hi  ")).unwrap(), json!("hi"));
    assert!(schema.morph(json!(42)).is_err());
    // check validates the input side without transforming.
    assert!(schema.check(&json!("  hi  ")).is_ok());
}

#[test]
fn piped_morphs_validate_between_steps() {
    let space = Space::new();
    space.register_morph("trim", |value| match value {
        Value::String(s) => Ok(Value::String(s.trim().to_string())),
        other => Ok(other),
    });
    let trim = space
        .node(json!({"in": "string", "morphs": ["trim"]}))
        .unwrap();
    let nonempty = space.node(json!({"domain": "string", "min": 1})).unwrap();
    let piped = trim.pipe(nonempty).unwrap().require().unwrap();

    assert_eq!(piped.morph(json!(" a ")).unwrap(), json!("a"));
    // Trimming to empty fails the piped check.
    assert!(piped.morph(json!("   ")).is_err());
}

#[test]
fn failing_morph_functions_become_violations() {
    let space = Space::new();
    space.register_morph("to_int", |value| match value.as_str() {
        Some(s) => s
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| e.to_string()),
        None => Err("not a string".to_string()),
    });
    let schema = space
        .node(json!({"in": "string", "morphs": ["to_int"]}))
        .unwrap();

    assert_eq!(schema.morph(json!("42")).unwrap(), json!(42));
    let violations = schema.morph(json!("abc")).unwrap_err();
    assert_eq!(violations.iter().next().unwrap().kind, ViolationKind::Morph);
}

#[test]
fn nested_morphs_rebuild_containers() {
    let space = Space::new();
    space.register_morph("trim", |value| match value {
        Value::String(s) => Ok(Value::String(s.trim().to_string())),
        other => Ok(other),
    });
    let schema = space
        .node(json!({"required": {"name": {"in": "string", "morphs": ["trim"]}}}))
        .unwrap();

    let out = schema.morph(json!({"name": " ada ", "age": 36})).unwrap();
    assert_eq!(out, json!({"name": "ada", "age": 36}));
}

#[test]
fn union_morph_output_follows_the_dispatched_branch() {
    let space = Space::new();
    space.register_morph("trim", |value| match value {
        Value::String(s) => Ok(Value::String(s.trim().to_string())),
        other => Ok(other),
    });
    let schema = space
        .node(json!([
            {"in": {"domain": "string"}, "morphs": ["trim"]},
            "number",
        ]))
        .unwrap();

    assert_eq!(schema.morph(json!("  x ")).unwrap(), json!("x"));
    assert_eq!(schema.morph(json!(7)).unwrap(), json!(7));
    assert!(schema.morph(json!(true)).is_err());
}
