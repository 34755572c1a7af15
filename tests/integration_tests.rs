use mathscript::config::EngineConfig;
use mathscript::resolver::DispatchError;
use mathscript::value::Matrix;
use mathscript::{EvalErrorKind, Evaluator, RunError, Value};
use pretty_assertions::assert_eq;

fn eval(source: &str) -> Result<Value, String> {
    let mut engine = Evaluator::new();
    engine.eval_str(source).map_err(|e| e.to_string())
}

fn run(source: &str) -> Value {
    eval(source).unwrap_or_else(|e| panic!("{source:?} failed: {e}"))
}

fn run_error(source: &str) -> EvalErrorKind {
    let mut engine = Evaluator::new();
    let query = engine.parse(source);
    assert!(!query.has_errors(), "{:?}", query.diagnostics);
    engine
        .eval_query(&query)
        .expect_err("query should fail")
        .kind
}

fn scalar(n: f64) -> Value {
    Value::Scalar(n)
}

fn row(values: &[f64]) -> Value {
    Value::Matrix(Matrix::row_vector(values.to_vec()))
}

fn matrix(rows: &[&[f64]]) -> Value {
    Value::Matrix(Matrix::from_rows(rows.iter().map(|r| r.to_vec()).collect()).unwrap())
}

// ============================================================================
// Arithmetic and values
// ============================================================================

#[test]
fn test_arithmetic() {
    assert_eq!(run("1 + 2 * 3"), scalar(7.0));
    assert_eq!(run("(1 + 2) * 3"), scalar(9.0));
    assert_eq!(run("-2^2"), scalar(-4.0));
    assert_eq!(run("2^3^2"), scalar(512.0));
    assert_eq!(run("7 / 2"), scalar(3.5));
}

#[test]
fn test_decimal_addition() {
    assert_eq!(run("0.1 + 0.2 == 0.3"), scalar(1.0));
}

#[test]
fn test_comparison_and_logic() {
    assert_eq!(run("3 > 2 && 2 >= 2"), scalar(1.0));
    assert_eq!(run("1 ~= 1 || 0"), scalar(0.0));
    assert_eq!(run("!0"), scalar(1.0));
}

#[test]
fn test_logical_short_circuit() {
    assert_eq!(run("0 && never_defined"), scalar(0.0));
    assert_eq!(run("1 || never_defined"), scalar(1.0));
}

#[test]
fn test_postfix_and_abs() {
    assert_eq!(run("5!"), scalar(120.0));
    assert_eq!(run("|-3|"), scalar(3.0));
    assert_eq!(run("[1 2; 3 4]'"), matrix(&[&[1.0, 3.0], &[2.0, 4.0]]));
}

#[test]
fn test_strings() {
    assert_eq!(run(r#""ab" + "cd""#), Value::from("abcd"));
    assert_eq!(run(r#"s = "hello"; s(1)"#), Value::from("h"));
    assert_eq!(run(r#""abc".length"#), scalar(3.0));
}

#[test]
fn test_matrix_literals() {
    assert_eq!(run("[1 2 3]"), row(&[1.0, 2.0, 3.0]));
    assert_eq!(run("[1 -2]"), row(&[1.0, -2.0]));
    assert_eq!(run("[1 - 2]"), scalar(-1.0).to_matrix().map(Value::Matrix).unwrap());
    assert_eq!(run("a = [1 2]; [a 3; 4 5 6]"), matrix(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]));
    assert_eq!(run("[]"), Value::Matrix(Matrix::empty()));
}

#[test]
fn test_matrix_dimension_mismatch() {
    assert!(matches!(
        run_error("[1 2; 3]"),
        EvalErrorKind::Value(_)
    ));
}

#[test]
fn test_ranges() {
    assert_eq!(run("1:4"), row(&[1.0, 2.0, 3.0, 4.0]));
    assert_eq!(run("10:-3:4"), row(&[10.0, 7.0, 4.0]));
}

#[test]
fn test_indexing() {
    assert_eq!(run("a = [5 6 7]; a(2)"), scalar(6.0));
    assert_eq!(run("m = [1 2; 3 4]; m(2, 1)"), scalar(3.0));
    assert_eq!(run("m = [1 2; 3 4]; m(2)"), scalar(3.0));
    assert!(matches!(
        run_error("a = [1 2]; a(3)"),
        EvalErrorKind::Value(_)
    ));
}

#[test]
fn test_member_access() {
    assert_eq!(run("m = [1 2 3; 4 5 6]; m.rows * 10 + m.columns"), scalar(23.0));
}

// ============================================================================
// Assignment
// ============================================================================

#[test]
fn test_assignment_yields_right_hand_value() {
    assert_eq!(run("X = (Y = 5) + 2; X"), scalar(7.0));
    assert_eq!(run("a = b = 3; a + b"), scalar(6.0));
}

#[test]
fn test_compound_assignment() {
    assert_eq!(run("a = 1; a += 2"), scalar(3.0));
    assert_eq!(run("a = 3; a *= a"), scalar(9.0));
    assert_eq!(run("k = 1; k++; k++"), scalar(3.0));
    assert_eq!(run("k = 1; k--"), scalar(0.0));
}

#[test]
fn test_compound_assignment_needs_existing_variable() {
    assert_eq!(
        run_error("missing += 1"),
        EvalErrorKind::UndefinedSymbol("missing".into())
    );
}

#[test]
fn test_indexed_assignment_grows() {
    assert_eq!(run("x = []; x(3) = 5; x"), row(&[0.0, 0.0, 5.0]));
    assert_eq!(run("m = []; m(2, 3) = 7; size(m)"), row(&[2.0, 3.0]));
    assert_eq!(run("v = [1; 2]; v(3) = 3; v.rows"), scalar(3.0));
}

#[test]
fn test_oversized_matrices_are_errors() {
    for source in [
        "x = []; x(1e13) = 1; 0",
        "x = []; x(1e6, 1e6) = 1; 0",
        "zeros(1e6, 1e6)",
        "ones(1e7)",
        "eye(1e5)",
        "(1:1e6)' * (1:1e6)",
    ] {
        let error = eval(source).expect_err(source);
        assert!(error.contains("too large"), "{source}: {error}");
    }
}

#[test]
fn test_indexed_compound_assignment() {
    assert_eq!(run("x = [1 2 3]; x(2) += 10; x"), row(&[1.0, 12.0, 3.0]));
}

#[test]
fn test_indexed_assignment_yields_element() {
    assert_eq!(run("x = [1 2]; x(2) = 9"), scalar(9.0));
}

// ============================================================================
// Statements
// ============================================================================

#[test]
fn test_muted_result_is_empty() {
    assert_eq!(run("a = 1;"), Value::Empty);
    assert_eq!(run("a = 1; a;"), Value::Empty);
    assert_eq!(run(""), Value::Empty);
}

#[test]
fn test_last_observable_statement_wins() {
    assert_eq!(run("1; a = 4; a + 1; b = 5;"), scalar(5.0));
    assert_eq!(run("1; 2; a = 4; b = 5;"), Value::Empty);
}

#[test]
fn test_if_else() {
    assert_eq!(run("if (1) 5 else 6"), scalar(5.0));
    assert_eq!(run("if (0) 5 else 6"), scalar(6.0));
    assert_eq!(run("x = 2; if (x == 1) 10 else if (x == 2) 20 else 30"), scalar(20.0));
    assert_eq!(run("if (0) 5"), Value::Empty);
}

#[test]
fn test_while_loop() {
    assert_eq!(run("n = 0; while (n < 5) n++; n"), scalar(5.0));
    assert_eq!(run("n = 9; while (n < 5) n++; n"), scalar(9.0));
}

#[test]
fn test_do_while_checks_after_body() {
    assert_eq!(run("n = 0; do { n += 2; } while (n < 7); n"), scalar(8.0));
    assert_eq!(run("n = 10; do { n += 2; } while (n < 7); n"), scalar(12.0));
}

#[test]
fn test_for_loop() {
    assert_eq!(run("s = 0; for (k = 1; k <= 4; k++) { s += k; } s"), scalar(10.0));
    assert_eq!(run("s = 0; for (k = 1; k <= 0; k++) { s += k; } s"), scalar(0.0));
}

#[test]
fn test_for_without_condition_needs_break() {
    assert_eq!(run("n = 0; for (;;) { n++; if (n == 4) break; } n"), scalar(4.0));
}

#[test]
fn test_break_leaves_innermost_loop_only() {
    let source = "
        count = 0;
        for (i = 1; i <= 3; i++) {
            for (j = 1; j <= 3; j++) {
                if (j == 2) break;
                count++;
            }
        }
        count";
    assert_eq!(run(source), scalar(3.0));
}

#[test]
fn test_top_level_return_ends_query() {
    assert_eq!(run("1; return 5; 7"), scalar(5.0));
    assert_eq!(run("return;"), Value::Empty);
}

#[test]
fn test_let_is_block_local() {
    assert_eq!(run("x = 1; { let x = 5; } x"), scalar(1.0));
    assert_eq!(run("{ let z; r = isempty(z); } r"), scalar(1.0));
}

#[test]
fn test_block_assignment_reaches_enclosing_variable() {
    assert_eq!(run("x = 1; { x = 2; } x"), scalar(2.0));
    assert_eq!(run("{ fresh = 3; } fresh"), scalar(3.0));
}

#[test]
fn test_statement_values_in_blocks() {
    assert_eq!(run("{ 1; 2 }"), scalar(2.0));
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_named_function() {
    assert_eq!(run("function sq(x) { return x^2; } sq(4) + 1"), scalar(17.0));
}

#[test]
fn test_function_without_return_yields_empty() {
    assert_eq!(run("function f() { 1; } f()"), Value::Empty);
}

#[test]
fn test_recursion() {
    let source = "function fact(n) { if (n <= 1) return 1; return n * fact(n - 1); } fact(6)";
    assert_eq!(run(source), scalar(720.0));
}

#[test]
fn test_recursion_limit() {
    let config = EngineConfig {
        max_call_depth: 16,
        ..EngineConfig::default()
    };
    let mut engine = Evaluator::with_config(config);
    let query = engine.parse("function down(n) { return down(n + 1); } down(0)");
    let error = engine.eval_query(&query).unwrap_err();
    assert_eq!(error.kind, EvalErrorKind::RecursionLimit(16));

    // the arena is back to the root scope once the error unwound
    assert_eq!(engine.scopes().live(), 1);
}

#[test]
fn test_default_call_limit_fits_a_default_thread_stack() {
    let outcome = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let mut engine = Evaluator::new();
            let source = "function f(n) { if (n > 0) { return f(n - 1); } return 0; }";
            engine.eval_str(source).unwrap();
            // values hold `Rc`s, so only text crosses back
            let mut outcome = |source: &str| {
                let query = engine.parse(source);
                engine
                    .eval_query(&query)
                    .map(|v| v.to_string())
                    .map_err(|e| e.kind.to_string())
            };
            (outcome("f(20)"), outcome("f(1000)"))
        })
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(outcome.0, Ok("0".to_string()));
    assert_eq!(outcome.1, Err(EvalErrorKind::RecursionLimit(32).to_string()));
}

#[test]
fn test_function_overloads_by_arity() {
    let source = "
        function f(a) { return 1; }
        function f(a, b) { return 2; }
        [f(0), f(0, 0)]";
    assert_eq!(run(source), row(&[1.0, 2.0]));
}

#[test]
fn test_same_arity_redefinition_replaces() {
    let source = "function f(a) { return 1; } function f(a) { return 5; } f(0)";
    assert_eq!(run(source), scalar(5.0));
}

#[test]
fn test_wrong_argument_count() {
    let kind = run_error("function f(a) { return a; } f(1, 2)");
    assert!(matches!(
        kind,
        EvalErrorKind::Dispatch(DispatchError::ArgumentCount { ref name, count: 2, .. }) if name == "f"
    ));
}

#[test]
fn test_undefined_variable_inside_function() {
    assert_eq!(
        run_error("function f() { return q; } f()"),
        EvalErrorKind::UndefinedSymbol("q".into())
    );
}

#[test]
fn test_function_locals_do_not_leak() {
    assert_eq!(
        run_error("function f() { inner = 1; return inner; } f(); inner"),
        EvalErrorKind::UndefinedSymbol("inner".into())
    );
}

#[test]
fn test_function_writes_are_local() {
    assert_eq!(run("x = 1; function f() { x = 2; return x; } f() * 10 + x"), scalar(21.0));
    // declared next to the binding, still local
    assert_eq!(
        run("{ let y = 1; function g() { y = 5; return y; } r = g() * 10 + y; } r"),
        scalar(51.0)
    );
}

#[test]
fn test_not_callable() {
    assert!(matches!(
        run_error(r#"s = "text"; s(1)(2)"#),
        EvalErrorKind::Value(_) | EvalErrorKind::NotCallable(_)
    ));
}

// ============================================================================
// Lambdas and closures
// ============================================================================

#[test]
fn test_lambda() {
    assert_eq!(run("sq = x => x^2; sq(3)"), scalar(9.0));
    assert_eq!(run("add = (a, b) => a + b; add(2, 3)"), scalar(5.0));
    assert_eq!(run("k = () => 42; k()"), scalar(42.0));
}

#[test]
fn test_lambda_arity() {
    assert_eq!(
        run_error("sq = x => x^2; sq(1, 2)"),
        EvalErrorKind::Arity {
            name: "<lambda>".into(),
            expected: 1,
            got: 2
        }
    );
}

#[test]
fn test_higher_order_function() {
    assert_eq!(run("function apply(fn, v) { return fn(v); } apply(x => x + 1, 41)"), scalar(42.0));
}

#[test]
fn test_closure_keeps_defining_scope() {
    let source = "
        function make() { let base; base = 10; return () => base; }
        h = make();
        base = 99;
        h()";
    assert_eq!(run(source), scalar(10.0));
}

#[test]
fn test_closure_ignores_caller_locals() {
    let source = "
        { let y = 1; function f() { return y; } g = f; }
        { let y = 2; r = g(); }
        r";
    assert_eq!(run(source), scalar(1.0));
}

#[test]
fn test_closure_survives_between_queries() {
    let mut engine = Evaluator::new();
    engine
        .eval_str("function make(n) { return x => x + n; } add5 = make(5);")
        .unwrap();
    assert_eq!(engine.eval_str("add5(1)").unwrap(), scalar(6.0));
    assert_eq!(engine.eval_str("add5(10)").unwrap(), scalar(15.0));
}

#[test]
fn test_returned_lambda_is_callable_from_host() {
    let mut engine = Evaluator::new();
    let f = engine.eval_str("n = 3; x => x * n").unwrap();
    assert_eq!(engine.call_value(&f, vec![scalar(4.0)]).unwrap(), scalar(12.0));
}

#[test]
fn test_host_held_lambda_outlives_later_queries() {
    let mut engine = Evaluator::new();
    let f = engine
        .eval_str("function mk(a) { return x => x + a; } mk(2)")
        .unwrap();
    assert_eq!(engine.call_value(&f, vec![scalar(1.0)]).unwrap(), scalar(3.0));

    engine.eval_str("1").unwrap();
    assert_eq!(engine.call_value(&f, vec![scalar(1.0)]).unwrap(), scalar(3.0));

    // later queries open and close scopes of their own
    engine
        .eval_str("g = mk(10); { let t = 4; } for (k = 0; k < 3; k++) { g(k); }")
        .unwrap();
    engine.collect_scopes();
    assert_eq!(engine.call_value(&f, vec![scalar(1.0)]).unwrap(), scalar(3.0));
    assert_eq!(engine.eval_str("g(1)").unwrap(), scalar(11.0));

    drop(f);
    engine.eval_str("g = 0;").unwrap();
    assert_eq!(engine.scopes().live(), 1);
}

#[test]
fn test_unreachable_closure_scopes_are_collected() {
    let mut engine = Evaluator::new();
    engine
        .eval_str("make = () => { let s; s = 1; return () => s; }; g = make();")
        .unwrap();
    assert_eq!(engine.scopes().live(), 2);

    engine.eval_str("g = 0;").unwrap();
    assert_eq!(engine.scopes().live(), 1);
}

#[test]
fn test_long_operator_chain_is_rejected() {
    let source = format!("1{}", "+1".repeat(100_000));
    let mut engine = Evaluator::new();
    let query = engine.parse(&source);
    assert!(query.has_errors());
    assert!(matches!(
        engine.eval_query(&query).unwrap_err().kind,
        EvalErrorKind::InvalidQuery(1)
    ));

    let mut source = String::from("1");
    for _ in 0..40 {
        source.push_str("+1");
    }
    assert_eq!(run(&source), scalar(41.0));
}

#[test]
fn test_block_scopes_are_released() {
    let mut engine = Evaluator::new();
    engine
        .eval_str("function f(x) { return x; } for (k = 0; k < 10; k++) { f(k); }")
        .unwrap();
    assert_eq!(engine.scopes().live(), 1);
}

// ============================================================================
// Built-in functions
// ============================================================================

#[test]
fn test_core_constants() {
    assert_eq!(run("pi"), scalar(std::f64::consts::PI));
    assert_eq!(run("true + true"), scalar(2.0));
    assert_eq!(run("inf > 1e308"), scalar(1.0));
}

#[test]
fn test_variables_shadow_constants() {
    assert_eq!(run("pi = 3; pi"), scalar(3.0));
}

#[test]
fn test_elementwise_builtins() {
    assert_eq!(run("sqrt(16)"), scalar(4.0));
    assert_eq!(run("abs([-1 2 -3])"), row(&[1.0, 2.0, 3.0]));
    assert_eq!(run("floor(2.7) + ceil(2.2)"), scalar(5.0));
}

#[test]
fn test_shape_builtins() {
    assert_eq!(run("length([1 2 3; 4 5 6])"), scalar(3.0));
    assert_eq!(run(r#"length("four")"#), scalar(4.0));
    assert_eq!(run("numel(zeros(2, 3))"), scalar(6.0));
    assert_eq!(run("size(ones(2))"), row(&[2.0, 2.0]));
    assert_eq!(run("eye(2)"), matrix(&[&[1.0, 0.0], &[0.0, 1.0]]));
    assert_eq!(run("isempty([])"), scalar(1.0));
}

#[test]
fn test_reductions() {
    assert_eq!(run("sum([1 2 3])"), scalar(6.0));
    assert_eq!(run("sum([1 2; 3 4])"), row(&[4.0, 6.0]));
    assert_eq!(run("prod(1:5)"), scalar(120.0));
    assert_eq!(run("max(3, 7, 5)"), scalar(7.0));
    assert_eq!(run("min([4 2 8])"), scalar(2.0));
}

#[test]
fn test_scalar_converts_to_matrix_parameter() {
    assert_eq!(run("sum(4)"), scalar(4.0));
}

#[test]
fn test_conversion_builtins() {
    assert_eq!(run(r#"str2num("2.5") * 2"#), scalar(5.0));
    assert_eq!(run("typeof([1 2])"), Value::from("Matrix"));
    assert_eq!(run("typeof(x => x)"), Value::from("Function"));
}

#[test]
fn test_no_overload_for_argument_type() {
    let kind = run_error(r#"sqrt("four")"#);
    assert!(matches!(
        kind,
        EvalErrorKind::Dispatch(DispatchError::NoOverload { position: 1, ref found, .. }) if found == "String"
    ));
}

#[test]
fn test_user_function_shadows_builtin() {
    assert_eq!(run("function sin(x) { return 0; } sin(1)"), scalar(0.0));
}

#[test]
fn test_without_core_plugin() {
    let config = EngineConfig {
        install_core: false,
        ..EngineConfig::default()
    };
    let mut engine = Evaluator::with_config(config);
    assert!(engine.plugins().is_empty());
    assert!(engine.eval_str("pi").is_err());
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_parse_errors_block_evaluation() {
    let mut engine = Evaluator::new();
    match engine.eval_str("x = 1; (2") {
        Err(RunError::Parse(diagnostics)) => assert_eq!(diagnostics.len(), 1),
        other => panic!("expected a parse error, got {other:?}"),
    }
    assert!(engine.variable("x").is_none());

    let query = engine.parse("break");
    assert_eq!(
        engine.eval_query(&query).unwrap_err().kind,
        EvalErrorKind::InvalidQuery(1)
    );
}

#[test]
fn test_runtime_error_is_located() {
    let mut engine = Evaluator::new();
    let Err(RunError::Eval(diagnostic)) = engine.eval_str("x = 1;\ny = nope + 1") else {
        panic!("expected a runtime error");
    };
    let position = diagnostic.position.expect("position");
    assert_eq!((position.line, position.column), (2, 5));
    assert_eq!(diagnostic.text, "nope");
    assert!(diagnostic.message.contains("'nope' is not defined"));
}

#[test]
fn test_runtime_error_keeps_earlier_effects() {
    let mut engine = Evaluator::new();
    assert!(engine.eval_str("a = 1; b = [1 2] * [3 4]; c = 3").is_err());
    assert_eq!(engine.variable("a"), Some(&scalar(1.0)));
    assert!(engine.variable("c").is_none());
}

#[test]
fn test_error_messages() {
    assert_eq!(
        eval("undefined_thing").unwrap_err(),
        "error at line 1, column 1: 'undefined_thing' is not defined"
    );
}

// ============================================================================
// Host API
// ============================================================================

#[test]
fn test_host_variables() {
    let mut engine = Evaluator::new();
    engine.set_variable("rate", scalar(2.0));
    assert_eq!(engine.eval_str("rate * 21").unwrap(), scalar(42.0));
    assert_eq!(engine.remove_variable("rate"), Some(scalar(2.0)));
    assert!(engine.eval_str("rate").is_err());
}

#[test]
fn test_variables_listing() {
    let mut engine = Evaluator::new();
    engine.eval_str("b = 2; a = 1;").unwrap();
    let names: Vec<&str> = engine.variables().keys().copied().collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_call_by_name() {
    let mut engine = Evaluator::new();
    engine.eval_str("function hyp(a, b) { return sqrt(a^2 + b^2); }").unwrap();
    assert_eq!(engine.call("hyp", vec![scalar(3.0), scalar(4.0)]).unwrap(), scalar(5.0));
    assert_eq!(engine.call("max", vec![scalar(1.0), scalar(9.0)]).unwrap(), scalar(9.0));
    assert_eq!(
        engine.call("nothing", vec![]).unwrap_err().kind,
        EvalErrorKind::UndefinedSymbol("nothing".into())
    );
}

#[test]
fn test_export_and_import_variables() {
    let mut source = Evaluator::new();
    source
        .eval_str(r#"a = 1; b = [1 2; 3 4]; s = "hi"; f = x => x;"#)
        .unwrap();
    let json = source.export_variables();
    assert_eq!(json, r#"{"a":1.0,"b":[[1.0,2.0],[3.0,4.0]],"s":"hi"}"#);

    let mut target = Evaluator::new();
    assert_eq!(target.import_variables(&json).unwrap(), 3);
    assert_eq!(target.eval_str("b(2, 2) + a").unwrap(), scalar(5.0));
    assert_eq!(target.variable("s"), Some(&Value::from("hi")));
}

#[test]
fn test_import_rejects_non_objects() {
    let mut engine = Evaluator::new();
    assert!(engine.import_variables("[1, 2]").is_err());
    assert!(engine.import_variables("not json").is_err());
    assert!(engine.import_variables(r#"{"m": [[1], [2, 3]]}"#).is_err());
}
