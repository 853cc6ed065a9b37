use super::*;

#[test]
fn kind_precedence_orders_sets_before_basis_before_refinements() {
    assert!(NodeKind::Union.precedence() < NodeKind::Unit.precedence());
    assert!(NodeKind::Intersection.precedence() < NodeKind::Domain.precedence());
    assert!(NodeKind::Domain.precedence() < NodeKind::Divisor.precedence());
    assert!(NodeKind::Min.precedence() < NodeKind::Max.precedence());
    assert!(NodeKind::Sequence.precedence() > NodeKind::Required.precedence());
}

#[test]
fn kind_classification() {
    assert!(NodeKind::Union.is_set());
    assert!(NodeKind::Morph.is_set());
    assert!(NodeKind::Unit.is_basis());
    assert!(NodeKind::Divisor.is_refinement());
    assert!(!NodeKind::Domain.is_refinement());
}

#[test]
fn basis_requirement_meet_narrows() {
    use BasisRequirement::*;
    assert_eq!(Any.meet(Number), Some(Number));
    assert_eq!(Object.meet(MapOnly), Some(MapOnly));
    assert_eq!(Object.meet(ArrayOnly), Some(ArrayOnly));
    assert_eq!(Number.meet(Number), Some(Number));
    assert_eq!(Number.meet(String), None);
    assert_eq!(MapOnly.meet(ArrayOnly), None);
}

#[test]
fn refinements_imply_their_basis() {
    assert_eq!(NodeKind::Divisor.implied_basis(), BasisRequirement::Number);
    assert_eq!(NodeKind::Pattern.implied_basis(), BasisRequirement::String);
    assert_eq!(NodeKind::Required.implied_basis(), BasisRequirement::MapOnly);
    assert_eq!(NodeKind::Sequence.implied_basis(), BasisRequirement::ArrayOnly);
    assert_eq!(NodeKind::Min.implied_basis(), BasisRequirement::Any);
}

#[test]
fn domain_of_value() {
    use serde_json::json;
    assert_eq!(Domain::of_value(&json!("x")), Some(Domain::String));
    assert_eq!(Domain::of_value(&json!(1)), Some(Domain::Number));
    assert_eq!(Domain::of_value(&json!(true)), Some(Domain::Boolean));
    assert_eq!(Domain::of_value(&json!({})), Some(Domain::Object));
    assert_eq!(Domain::of_value(&json!([])), Some(Domain::Object));
    assert_eq!(Domain::of_value(&json!(null)), None);
    assert_eq!(domain_name_of(&json!(null)), "null");
    assert_eq!(domain_name_of(&json!([1])), "object");
}

#[test]
fn ordered_float_canonicalizes_zero_and_nan() {
    assert_eq!(OrderedFloat(0.0), OrderedFloat(-0.0));
    assert_eq!(OrderedFloat(f64::NAN), OrderedFloat(f64::NAN));
    assert_ne!(OrderedFloat(1.0), OrderedFloat(2.0));
    assert!(OrderedFloat(1.0) < OrderedFloat(2.0));
}

#[test]
fn sequence_lengths() {
    let seq = SequenceInner {
        prefix: vec![NodeId(0), NodeId(1)],
        variadic: None,
        postfix: Vec::new(),
    };
    assert_eq!(seq.exact_length(), Some(2));

    let open = SequenceInner {
        prefix: vec![NodeId(0)],
        variadic: Some(NodeId(1)),
        postfix: vec![NodeId(2)],
    };
    assert_eq!(open.exact_length(), None);
    assert_eq!(open.min_length(), 2);
}

#[test]
fn path_rendering() {
    assert_eq!(path_to_string(&[]), "");
    assert_eq!(path_to_string(&[Seg::key("a"), Seg::key("b")]), "a.b");
    assert_eq!(
        path_to_string(&[Seg::key("items"), Seg::Item(0), Seg::key("id")]),
        "items[0].id"
    );
    assert_eq!(path_to_string(&[Seg::Item(2)]), "[2]");
}

#[test]
fn number_json_agrees_for_integer_valued_floats() {
    assert_eq!(number_json(3.0).to_string(), "3");
    assert_eq!(number_json(3.5).to_string(), "3.5");
    assert_eq!(number_json(-2.0).to_string(), "-2");
}
