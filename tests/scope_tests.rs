// tests/scope_tests.rs

use mathscript::resolver::{Callable, Overload, Signature};
use mathscript::scope::{Binding, Declaration, ScopeArena, ScopeError, ScopeId, ScopeKind, closure_scopes};
use mathscript::value::Function;
use mathscript::{ExprKind, Parser, Value};

fn lambda_in(arena: &mut ScopeArena, scope: ScopeId) -> Value {
    let expr = Parser::new("x => x").parse().unwrap();
    let ExprKind::Lambda(def) = expr.kind else {
        panic!("expected a lambda");
    };
    Value::Function(Function::Closure(arena.close_over(def, scope)))
}

fn native(n: f64) -> Overload {
    Overload::native(Signature::new(["Scalar"]), move |_| Ok(Value::Scalar(n)))
}

// ============================================================================
// Lookup
// ============================================================================

#[test]
fn test_lookup_walks_to_the_root() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    arena.bind(root, "g", Value::Scalar(1.0));
    let call = arena.enter(root, ScopeKind::Function).unwrap();
    let block = arena.enter(call, ScopeKind::Block).unwrap();
    assert_eq!(arena.variable(block, "g"), Some(&Value::Scalar(1.0)));
    assert!(arena.lookup(block, "nothing").is_none());
}

#[test]
fn test_inner_binding_shadows_outer() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    arena.bind(root, "x", Value::Scalar(1.0));
    let block = arena.enter(root, ScopeKind::Block).unwrap();
    arena.declare(block, "x", Declaration::Variable);
    assert_eq!(arena.variable(block, "x"), Some(&Value::Empty));
    assert_eq!(arena.variable(root, "x"), Some(&Value::Scalar(1.0)));
}

#[test]
fn test_variables_then_constants_then_functions() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    arena.declare(root, "n", Declaration::Function(native(1.0)));
    assert!(matches!(arena.lookup(root, "n"), Some(Binding::Functions(_))));

    arena.declare(root, "n", Declaration::Constant(Value::Scalar(2.0)));
    assert!(matches!(arena.lookup(root, "n"), Some(Binding::Constant(_))));

    arena.bind(root, "n", Value::Scalar(3.0));
    assert!(matches!(arena.lookup(root, "n"), Some(Binding::Variable(_))));

    arena.remove_variable(root, "n");
    assert!(matches!(arena.lookup(root, "n"), Some(Binding::Constant(_))));
}

#[test]
fn test_constant_in_inner_scope_beats_outer_variable() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    arena.bind(root, "c", Value::Scalar(1.0));
    let block = arena.enter(root, ScopeKind::Block).unwrap();
    arena.declare(block, "c", Declaration::Constant(Value::Scalar(9.0)));
    assert_eq!(
        arena.lookup(block, "c").map(Binding::to_value),
        Some(Value::Scalar(9.0))
    );
}

#[test]
fn test_variable_ignores_constants() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    arena.declare(root, "pi", Declaration::Constant(Value::Scalar(3.0)));
    assert!(arena.variable(root, "pi").is_none());
}

// ============================================================================
// Assignment
// ============================================================================

#[test]
fn test_boundary_skips_blocks() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    let call = arena.enter(root, ScopeKind::Function).unwrap();
    let inner = arena.enter(call, ScopeKind::Block).unwrap();
    let innermost = arena.enter(inner, ScopeKind::Block).unwrap();
    assert_eq!(arena.boundary(innermost), call);
    assert_eq!(arena.boundary(call), call);
    assert_eq!(arena.boundary(root), root);
}

#[test]
fn test_assign_updates_let_binding_in_block() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    let block = arena.enter(root, ScopeKind::Block).unwrap();
    arena.declare(block, "t", Declaration::Variable);
    let nested = arena.enter(block, ScopeKind::Block).unwrap();
    arena.assign(nested, "t", Value::Scalar(4.0));
    assert_eq!(arena.variable(block, "t"), Some(&Value::Scalar(4.0)));
    assert!(arena.variable(root, "t").is_none());
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_declared_overloads_accumulate() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    arena.declare(root, "f", Declaration::Function(native(1.0)));
    arena.declare(
        root,
        "f",
        Declaration::Function(Overload::native(Signature::new(["String"]), |_| {
            Ok(Value::Empty)
        })),
    );
    let Some(Binding::Functions(set)) = arena.lookup(root, "f") else {
        panic!("expected functions");
    };
    assert_eq!(set.overloads().len(), 2);
}

#[test]
fn test_remove_selected_overloads() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    let pair = Overload::native(Signature::any(2), |_| Ok(Value::Empty));
    arena.declare(root, "f", Declaration::Function(native(1.0)));
    arena.declare(root, "f", Declaration::Function(pair.clone()));

    let scalar = Signature::new(["Scalar"]);
    assert_eq!(arena.remove_overloads(root, "f", |o| o.signature == scalar), 1);
    assert!(arena.lookup(root, "f").is_some());

    assert_eq!(arena.remove_overloads(root, "f", |o| o.callable.ptr_eq(&pair.callable)), 1);
    assert!(arena.lookup(root, "f").is_none());
    assert_eq!(arena.remove_overloads(root, "f", |_| true), 0);
}

#[test]
fn test_function_values_share_the_set() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    arena.declare(root, "f", Declaration::Function(native(1.0)));
    let a = arena.lookup(root, "f").map(Binding::to_value).unwrap();
    let b = arena.lookup(root, "f").map(Binding::to_value).unwrap();
    assert_eq!(a, b);
}

// ============================================================================
// Lifetime
// ============================================================================

#[test]
fn test_released_slots_are_reused() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    let first = arena.enter(root, ScopeKind::Block).unwrap();
    arena.exit(first);
    let second = arena.enter(root, ScopeKind::Block).unwrap();
    assert_eq!(first.index(), second.index());
    assert_ne!(first, second);
    assert_eq!(arena.live(), 2);
}

#[test]
fn test_root_is_never_released() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    arena.exit(root);
    assert_eq!(arena.collect([]), 0);
    assert!(arena.get(root).is_some());
}

#[test]
fn test_capture_marks_ancestors() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    let outer = arena.enter(root, ScopeKind::Function).unwrap();
    let inner = arena.enter(outer, ScopeKind::Block).unwrap();
    arena.capture(inner);
    assert!(arena.get(inner).unwrap().is_captured());
    assert!(arena.get(outer).unwrap().is_captured());

    arena.exit(inner);
    arena.exit(outer);
    assert_eq!(arena.live(), 3);
}

#[test]
fn test_collect_keeps_scopes_held_by_variables() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    let call = arena.enter(root, ScopeKind::Function).unwrap();
    arena.capture(call);
    arena.exit(call);

    let f = lambda_in(&mut arena, call);
    arena.bind(root, "f", f);
    assert_eq!(arena.collect([]), 0);

    arena.remove_variable(root, "f");
    assert_eq!(arena.collect([]), 1);
    assert!(arena.get(call).is_none());
}

#[test]
fn test_collect_follows_chains_of_closures() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    let outer = arena.enter(root, ScopeKind::Function).unwrap();
    let inner = arena.enter(outer, ScopeKind::Function).unwrap();
    arena.capture(inner);
    arena.exit(inner);
    arena.exit(outer);

    // `outer` holds a closure over `inner`; the host only holds `outer`
    let g = lambda_in(&mut arena, inner);
    arena.bind(outer, "g", g);
    let held = lambda_in(&mut arena, outer);
    assert_eq!(arena.collect(closure_scopes(&held)), 0);
    assert_eq!(arena.live(), 3);

    drop(held);
    assert_eq!(arena.collect([]), 2);
}

#[test]
fn test_ids_lists_live_scopes() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    let a = arena.enter(root, ScopeKind::Block).unwrap();
    let b = arena.enter(root, ScopeKind::Block).unwrap();
    arena.exit(a);
    let ids: Vec<_> = arena.ids().collect();
    assert_eq!(ids, vec![root, b]);
}

#[test]
fn test_purge_variables() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    arena.bind(root, "s", Value::from("text"));
    arena.bind(root, "n", Value::Scalar(1.0));
    let purged = arena.purge_variables(root, |value| value.type_name() == "String");
    assert_eq!(purged, 1);
    assert!(arena.variable(root, "s").is_none());
    assert!(arena.variable(root, "n").is_some());
}

#[test]
fn test_closure_held_outside_the_arena_keeps_its_scope() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    let call = arena.enter(root, ScopeKind::Function).unwrap();
    arena.bind(call, "a", Value::Scalar(2.0));
    let held = lambda_in(&mut arena, call);
    arena.exit(call);

    // nothing inside the arena refers to the closure
    assert_eq!(arena.collect([]), 0);
    assert_eq!(arena.collect([]), 0);
    assert_eq!(arena.variable(call, "a"), Some(&Value::Scalar(2.0)));

    drop(held);
    assert_eq!(arena.collect([]), 1);
}

#[test]
fn test_closure_cycle_is_collected() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    let call = arena.enter(root, ScopeKind::Function).unwrap();
    // a scope holding a closure over itself
    let own = lambda_in(&mut arena, call);
    arena.bind(call, "own", own);
    arena.exit(call);
    assert_eq!(arena.collect([]), 1);
    assert_eq!(arena.live(), 1);
}

#[test]
fn test_overload_set_held_outside_keeps_its_scope() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    let block = arena.enter(root, ScopeKind::Block).unwrap();
    let Value::Function(Function::Closure(closure)) = lambda_in(&mut arena, block) else {
        panic!("expected a closure");
    };
    arena.declare(
        block,
        "f",
        Declaration::Function(Overload::new(Signature::any(1), Callable::Script(closure))),
    );
    let held = arena.lookup(block, "f").map(Binding::to_value).unwrap();
    arena.exit(block);

    assert_eq!(arena.collect([]), 0);
    drop(held);
    assert_eq!(arena.collect([]), 1);
}

#[test]
fn test_released_ids_stay_released() {
    let mut arena = ScopeArena::new();
    let root = arena.root();
    let old = arena.enter(root, ScopeKind::Block).unwrap();
    arena.bind(old, "x", Value::Scalar(1.0));
    arena.exit(old);
    let reused = arena.enter(root, ScopeKind::Block).unwrap();
    arena.bind(reused, "x", Value::Scalar(2.0));

    assert!(arena.get(old).is_none());
    assert!(arena.lookup(old, "x").is_none());
    assert_eq!(
        arena.enter(old, ScopeKind::Function),
        Err(ScopeError::Released(old.index()))
    );
    assert_eq!(arena.variable(reused, "x"), Some(&Value::Scalar(2.0)));
}
