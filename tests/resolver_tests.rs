// tests/resolver_tests.rs

use std::rc::Rc;

use mathscript::resolver::{
    ANY, Acceptance, DispatchError, Overload, OverloadSet, Signature, TypeRegistry,
};
use mathscript::value::Matrix;
use mathscript::Value;
use proptest::prelude::*;

fn returning(n: f64) -> impl Fn(&[Value]) -> Result<Value, mathscript::value::ValueError> {
    move |_| Ok(Value::Scalar(n))
}

fn set_of(signatures: &[Signature]) -> OverloadSet {
    let mut set = OverloadSet::new("f");
    for (i, signature) in signatures.iter().enumerate() {
        set.register(Overload::native(signature.clone(), returning(i as f64)));
    }
    set
}

fn sample(type_name: &str) -> Value {
    match type_name {
        "Scalar" => Value::Scalar(1.0),
        "String" => Value::from("s"),
        "Matrix" => Value::Matrix(Matrix::row_vector(vec![1.0, 2.0])),
        _ => Value::Empty,
    }
}

// ============================================================================
// Signatures
// ============================================================================

#[test]
fn test_signature_display() {
    assert_eq!(Signature::new(["Scalar", "Matrix"]).to_string(), "(Scalar, Matrix)");
    assert_eq!(
        Signature::new(["Scalar"]).variadic(2, None).to_string(),
        "(Scalar...)"
    );
    assert_eq!(Signature::any(0).to_string(), "()");
}

#[test]
fn test_any_signature() {
    let sig = Signature::any(2);
    assert_eq!(sig.params(), &[ANY.to_string(), ANY.to_string()]);
    assert_eq!(sig.arg_window(), (2, Some(2)));
}

#[test]
fn test_variadic_on_empty_signature_is_ignored() {
    let sig = Signature::new(Vec::<String>::new()).variadic(1, None);
    assert!(sig.variadic_tail().is_none());
    assert_eq!(sig.arg_window(), (0, Some(0)));
}

#[test]
fn test_variadic_window_counts_fixed_params() {
    let sig = Signature::new(["String", "Scalar"]).variadic(1, Some(3));
    assert_eq!(sig.arg_window(), (2, Some(4)));
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_arity_filters_first() {
    let set = set_of(&[Signature::any(1), Signature::any(2)]);
    let types = TypeRegistry::new();
    let args = [Value::Scalar(1.0), Value::Scalar(2.0)];
    assert_eq!(set.resolve(&args, &types).unwrap().index, 1);
}

#[test]
fn test_lower_weight_breaks_ties() {
    // both exact; "Value" (509) weighs less than "Scalar" (598)
    let set = set_of(&[Signature::new(["Scalar"]), Signature::any(1)]);
    let types = TypeRegistry::new();
    assert_eq!(set.resolve(&[Value::Scalar(1.0)], &types).unwrap().index, 1);
}

#[test]
fn test_registration_order_breaks_equal_weights() {
    // "Ab" and "Ba" weigh the same
    let mut types = TypeRegistry::new();
    types.register("Ab");
    types.register("Ba");
    types.add_conversion("Scalar", "Ab", Rc::new(|v: &Value| Some(v.clone())));
    types.add_conversion("Scalar", "Ba", Rc::new(|v: &Value| Some(v.clone())));
    let set = set_of(&[Signature::new(["Ba"]), Signature::new(["Ab"])]);
    assert_eq!(set.resolve(&[Value::Scalar(1.0)], &types).unwrap().index, 0);
}

#[test]
fn test_variadic_overload_collects_extra_arguments() {
    let set = set_of(&[
        Signature::new(["Matrix"]),
        Signature::new(["Scalar"]).variadic(2, None),
    ]);
    let types = TypeRegistry::new();
    let args = vec![Value::Scalar(1.0); 5];
    let resolution = set.resolve(&args, &types).unwrap();
    assert_eq!(resolution.index, 1);
    assert_eq!(resolution.arguments.len(), 5);
}

#[test]
fn test_variadic_tail_type_is_checked() {
    let set = set_of(&[Signature::new(["String", "Scalar"]).variadic(0, None)]);
    let types = TypeRegistry::new();
    assert!(set.resolve(&[Value::from("a")], &types).is_ok());
    assert!(set.resolve(&[Value::from("a"), Value::Scalar(1.0)], &types).is_ok());
    let error = set
        .resolve(&[Value::from("a"), Value::Scalar(1.0), Value::from("b")], &types)
        .unwrap_err();
    assert!(matches!(error, DispatchError::NoOverload { position: 3, .. }));
}

#[test]
fn test_no_overload_reports_furthest_argument() {
    let set = set_of(&[
        Signature::new(["String", "String"]),
        Signature::new(["Scalar", "String"]),
    ]);
    let types = TypeRegistry::new();
    let error = set
        .resolve(&[Value::Scalar(1.0), Value::Scalar(2.0)], &types)
        .unwrap_err();
    assert_eq!(
        error,
        DispatchError::NoOverload {
            name: "f".into(),
            arguments: "Scalar, Scalar".into(),
            position: 2,
            found: "Scalar".into(),
            expected: "String".into(),
        }
    );
}

#[test]
fn test_argument_count_message() {
    let set = set_of(&[Signature::any(1), Signature::any(3)]);
    let error = set.resolve(&[], &TypeRegistry::new()).unwrap_err();
    assert_eq!(error.to_string(), "'f' takes 1 or 3 argument(s), got 0");
}

#[test]
fn test_empty_set_rejects_every_call() {
    let set = OverloadSet::new("nothing");
    assert!(matches!(
        set.resolve(&[], &TypeRegistry::new()),
        Err(DispatchError::ArgumentCount { .. })
    ));
}

// ============================================================================
// Type registry
// ============================================================================

#[test]
fn test_builtin_types() {
    let types = TypeRegistry::new();
    let names: Vec<&str> = types.names().collect();
    assert_eq!(names, vec!["Empty", "Function", "Matrix", "Scalar", "String"]);
}

#[test]
fn test_scalar_converts_to_matrix() {
    let types = TypeRegistry::new();
    match types.accepts(&Value::Scalar(2.0), "Matrix") {
        Acceptance::Converted(Value::Matrix(m)) => assert_eq!(m, Matrix::scalar(2.0)),
        _ => panic!("expected a conversion"),
    }
    assert!(matches!(types.accepts(&Value::from("x"), "Matrix"), Acceptance::Rejected));
    assert!(matches!(types.accepts(&Value::from("x"), ANY), Acceptance::Exact));
}

#[test]
fn test_conversion_can_decline() {
    let mut types = TypeRegistry::new();
    types.add_conversion(
        "String",
        "Scalar",
        Rc::new(|v: &Value| v.as_str()?.parse::<f64>().ok().map(Value::Scalar)),
    );
    assert!(matches!(
        types.accepts(&Value::from("2"), "Scalar"),
        Acceptance::Converted(Value::Scalar(n)) if n == 2.0
    ));
    assert!(matches!(types.accepts(&Value::from("two"), "Scalar"), Acceptance::Rejected));

    types.remove_conversion("String", "Scalar");
    assert!(matches!(types.accepts(&Value::from("2"), "Scalar"), Acceptance::Rejected));
}

#[test]
fn test_register_and_unregister() {
    let mut types = TypeRegistry::new();
    assert!(types.register("Money"));
    assert!(!types.register("Money"));
    types.add_conversion("Scalar", "Money", Rc::new(|v: &Value| Some(v.clone())));
    types.unregister("Money");
    assert!(!types.contains("Money"));
    assert!(matches!(types.accepts(&Value::Scalar(1.0), "Money"), Acceptance::Rejected));
}

// ============================================================================
// Properties
// ============================================================================

const TYPES: [&str; 5] = ["Scalar", "String", "Matrix", "Empty", ANY];

fn signature() -> impl Strategy<Value = Signature> {
    prop::collection::vec(prop::sample::select(TYPES.to_vec()), 0..3).prop_map(Signature::new)
}

fn arguments() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(
        prop::sample::select(vec!["Scalar", "String", "Matrix", "Empty"]).prop_map(sample),
        0..3,
    )
}

/// Exactness of `signature` for `args`: Some(true) exact, Some(false)
/// converted, None rejected.
fn expected_fit(signature: &Signature, args: &[Value]) -> Option<bool> {
    if signature.params().len() != args.len() {
        return None;
    }
    let mut exact = true;
    for (param, arg) in signature.params().iter().zip(args) {
        if param == ANY || param == arg.type_name() {
            continue;
        }
        if param == "Matrix" && arg.type_name() == "Scalar" {
            exact = false;
            continue;
        }
        return None;
    }
    Some(exact)
}

proptest! {
    #[test]
    fn prop_weight_ignores_parameter_order(mut names in prop::collection::vec("[A-Za-z]{1,8}", 0..5)) {
        let forward = Signature::new(names.clone()).weight();
        names.reverse();
        prop_assert_eq!(forward, Signature::new(names.clone()).weight());
        let total: u32 = names.iter().flat_map(|n| n.chars()).map(|c| c as u32).sum();
        prop_assert_eq!(forward, total);
    }

    #[test]
    fn prop_resolution_is_deterministic(
        signatures in prop::collection::vec(signature(), 1..6),
        args in arguments(),
    ) {
        let types = TypeRegistry::new();
        let first = set_of(&signatures).resolve(&args, &types).map(|r| r.index);
        let second = set_of(&signatures).resolve(&args, &types).map(|r| r.index);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_resolution_picks_best_candidate(
        signatures in prop::collection::vec(signature(), 1..6),
        args in arguments(),
    ) {
        let types = TypeRegistry::new();
        let set = set_of(&signatures);

        // exact before converted, then lighter, then earlier
        let best = set
            .overloads()
            .iter()
            .enumerate()
            .filter_map(|(index, o)| expected_fit(&o.signature, &args).map(|exact| (!exact, o.weight, index)))
            .min();

        match (set.resolve(&args, &types), best) {
            (Ok(resolution), Some((_, _, index))) => prop_assert_eq!(resolution.index, index),
            (Err(_), None) => {}
            (outcome, expected) => prop_assert!(false, "resolved {:?}, expected {:?}", outcome.map(|r| r.index), expected),
        }
    }

    #[test]
    fn prop_exact_signature_selects_its_overload(
        params in prop::collection::vec(prop::sample::select(vec!["Scalar", "String", "Matrix"]), 0..4),
    ) {
        // one overload per distinct parameter list of the same length, none with ANY
        let other: Vec<&str> = params
            .iter()
            .map(|p| if *p == "String" { "Empty" } else { "String" })
            .collect();
        let set = set_of(&[Signature::new(other), Signature::new(params.clone())]);
        let args: Vec<Value> = params.iter().map(|p| sample(p)).collect();
        let resolution = set.resolve(&args, &TypeRegistry::new());
        if params.is_empty() {
            // both signatures are `()`, the second replaced the first
            prop_assert_eq!(resolution.map(|r| r.index), Ok(0));
        } else {
            prop_assert_eq!(resolution.map(|r| r.index), Ok(1));
        }
    }
}
