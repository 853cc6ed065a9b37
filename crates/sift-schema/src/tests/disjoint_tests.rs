use super::*;
use serde_json::json;

fn sample() -> Disjoint {
    Disjoint::new(DisjointKind::Domain, json!("string"), json!("number"))
}

#[test]
fn invert_swaps_sides() {
    let inverted = sample().invert();
    assert_eq!(inverted.entries()[0].l, json!("number"));
    assert_eq!(inverted.entries()[0].r, json!("string"));
}

#[test]
fn prefix_reroots_every_entry() {
    let mut disjoint = sample();
    disjoint.merge(Disjoint::new(DisjointKind::Unit, json!(1), json!(2)));
    let prefixed = disjoint.with_prefix(Seg::key("a"));
    for entry in prefixed.entries() {
        assert_eq!(entry.path[0], Seg::key("a"));
    }

    let nested = prefixed.with_prefix(Seg::key("outer"));
    assert_eq!(nested.entries()[0].path[0], Seg::key("outer"));
    assert_eq!(nested.entries()[0].path[1], Seg::key("a"));
}

#[test]
fn merge_accumulates_independent_conflicts() {
    let mut disjoint = sample();
    assert_eq!(disjoint.len(), 1);
    disjoint.merge(Disjoint::new(DisjointKind::Range, json!(5), json!(3)));
    assert_eq!(disjoint.len(), 2);
}

#[test]
fn describe_names_every_conflicting_path() {
    let disjoint = sample().with_prefix(Seg::key("kind"));
    let description = disjoint.describe();
    assert!(description.contains("at kind"));
    assert!(description.contains("domain conflict"));
}

#[test]
fn into_error_is_the_throw_boundary() {
    let err = sample().into_error();
    match err {
        SchemaError::Contradiction(message) => {
            assert!(message.contains("domain conflict"));
        }
        other => panic!("expected contradiction, got {other:?}"),
    }
}
