//! Lexical scope chain.
//!
//! Scopes live in an arena and refer to their parent by [`ScopeId`]. A scope
//! that a closure captured outlives the block that created it; everything
//! else is released as soon as its block, loop body or call returns.
//! [`ScopeArena::collect`] sweeps captured scopes that no live value refers
//! to any more, including values the host keeps outside the arena.
//!
//! Ids carry the generation of their slot, so an id kept past the release
//! of its scope never resolves to whatever reuses the slot.

use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::ast::FunctionDef;
use crate::resolver::{Callable, Overload, OverloadSet};
use crate::value::{Closure, Function, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId {
    index: u32,
    generation: u32,
}

impl ScopeId {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScopeError {
    #[error("scope {0} has been released")]
    Released(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Host-level globals and plugin registrations
    Root,
    /// Brace block or loop body
    Block,
    /// Function or lambda invocation; assignments stop here
    Function,
}

#[derive(Debug)]
pub struct Scope {
    kind: ScopeKind,
    parent: Option<ScopeId>,
    symbols: HashMap<String, Value>,
    constants: HashMap<String, Value>,
    functions: HashMap<String, Rc<OverloadSet>>,
    captured: bool,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Scope {
            kind,
            parent,
            symbols: HashMap::new(),
            constants: HashMap::new(),
            functions: HashMap::new(),
            captured: false,
        }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.symbols.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn constants(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.constants.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, &Rc<OverloadSet>)> {
        self.functions.iter().map(|(name, set)| (name.as_str(), set))
    }

    fn values(&self) -> impl Iterator<Item = &Value> {
        self.symbols.values().chain(self.constants.values())
    }
}

/// What a name resolves to.
#[derive(Debug, Clone, Copy)]
pub enum Binding<'a> {
    Variable(&'a Value),
    Constant(&'a Value),
    Functions(&'a Rc<OverloadSet>),
}

impl Binding<'_> {
    /// The binding as a runtime value.
    pub fn to_value(self) -> Value {
        match self {
            Binding::Variable(value) | Binding::Constant(value) => value.clone(),
            Binding::Functions(set) => Value::Function(Function::Overloads(Rc::clone(set))),
        }
    }
}

/// A declaration made directly in one scope.
pub enum Declaration {
    /// Placeholder variable holding `Empty` (`let x`)
    Variable,
    Constant(Value),
    Function(Overload),
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    scope: Option<Scope>,
}

#[derive(Debug)]
pub struct ScopeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Every closure made by [`ScopeArena::close_over`] that may still be alive
    closures: Vec<Weak<Closure>>,
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeArena {
    /// An arena holding only the root scope.
    pub fn new() -> Self {
        ScopeArena {
            slots: vec![Slot {
                generation: 0,
                scope: Some(Scope::new(ScopeKind::Root, None)),
            }],
            free: Vec::new(),
            closures: Vec::new(),
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId {
            index: 0,
            generation: 0,
        }
    }

    pub fn get(&self, id: ScopeId) -> Option<&Scope> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.scope.as_ref()
    }

    fn get_mut(&mut self, id: ScopeId) -> Option<&mut Scope> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.scope.as_mut()
    }

    pub fn contains(&self, id: ScopeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of scopes currently allocated, the root included.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.scope.is_some()).count()
    }

    /// Opens a scope under `parent`, which must still be alive.
    pub fn enter(&mut self, parent: ScopeId, kind: ScopeKind) -> Result<ScopeId, ScopeError> {
        if !self.contains(parent) {
            return Err(ScopeError::Released(parent.index()));
        }
        let scope = Scope::new(kind, Some(parent));
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.scope = Some(scope);
                ScopeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    scope: Some(scope),
                });
                ScopeId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        trace!(scope = id.index(), parent = parent.index(), ?kind, "enter scope");
        Ok(id)
    }

    /// Leaves a scope. It is released unless a closure captured it.
    pub fn exit(&mut self, id: ScopeId) {
        if id == self.root() {
            return;
        }
        let captured = self.get(id).is_some_and(Scope::is_captured);
        if !captured {
            self.release(id);
        }
    }

    fn release(&mut self, id: ScopeId) {
        if self.get(id).is_none() {
            return;
        }
        if let Some(slot) = self.slots.get_mut(id.index()) {
            slot.scope = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
        }
    }

    /// Marks `id` and its ancestors as captured by a closure.
    pub fn capture(&mut self, id: ScopeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            match self.get_mut(id) {
                Some(scope) if !scope.captured => {
                    scope.captured = true;
                    current = scope.parent;
                }
                _ => break,
            }
        }
    }

    /// A closure over `scope`. The arena keeps track of it so that a sweep
    /// can tell whether anything outside the arena still holds it.
    pub fn close_over(&mut self, def: Rc<FunctionDef>, scope: ScopeId) -> Rc<Closure> {
        self.capture(scope);
        let closure = Rc::new(Closure { def, scope });
        self.closures.push(Rc::downgrade(&closure));
        closure
    }

    /// Walks from `from` to the root; the first scope that knows the name
    /// wins. Within one scope variables shadow constants, which shadow
    /// functions.
    pub fn lookup(&self, from: ScopeId, name: &str) -> Option<Binding<'_>> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.get(id)?;
            if let Some(value) = scope.symbols.get(name) {
                return Some(Binding::Variable(value));
            }
            if let Some(value) = scope.constants.get(name) {
                return Some(Binding::Constant(value));
            }
            if let Some(set) = scope.functions.get(name) {
                return Some(Binding::Functions(set));
            }
            current = scope.parent;
        }
        None
    }

    /// A variable visible from `from`, ignoring constants and functions.
    pub fn variable(&self, from: ScopeId, name: &str) -> Option<&Value> {
        match self.lookup(from, name)? {
            Binding::Variable(value) => Some(value),
            _ => None,
        }
    }

    /// The nearest enclosing function (or root) scope.
    pub fn boundary(&self, from: ScopeId) -> ScopeId {
        let mut current = from;
        while let Some(scope) = self.get(current) {
            match (scope.kind, scope.parent) {
                (ScopeKind::Block, Some(parent)) => current = parent,
                _ => break,
            }
        }
        current
    }

    /// Assignment: update the nearest existing variable up to the function
    /// boundary, otherwise create it in the boundary scope.
    pub fn assign(&mut self, from: ScopeId, name: &str, value: Value) {
        let boundary = self.boundary(from);
        let mut current = from;
        loop {
            let Some(scope) = self.get_mut(current) else {
                return;
            };
            if let Some(slot) = scope.symbols.get_mut(name) {
                *slot = value;
                return;
            }
            match scope.parent {
                Some(parent) if current != boundary => current = parent,
                _ => break,
            }
        }
        self.bind(boundary, name, value);
    }

    /// Sets a variable directly in `id`.
    pub fn bind(&mut self, id: ScopeId, name: &str, value: Value) {
        if let Some(scope) = self.get_mut(id) {
            scope.symbols.insert(name.to_string(), value);
        }
    }

    pub fn declare(&mut self, id: ScopeId, name: &str, declaration: Declaration) {
        let Some(scope) = self.get_mut(id) else {
            return;
        };
        match declaration {
            Declaration::Variable => {
                scope.symbols.insert(name.to_string(), Value::Empty);
            }
            Declaration::Constant(value) => {
                scope.constants.insert(name.to_string(), value);
            }
            Declaration::Function(overload) => {
                let set = scope
                    .functions
                    .entry(name.to_string())
                    .or_insert_with(|| Rc::new(OverloadSet::new(name)));
                Rc::make_mut(set).register(overload);
            }
        }
    }

    /// Removes a variable from `id` only.
    pub fn remove_variable(&mut self, id: ScopeId, name: &str) -> Option<Value> {
        self.get_mut(id)?.symbols.remove(name)
    }

    pub fn remove_constant(&mut self, id: ScopeId, name: &str) -> Option<Value> {
        self.get_mut(id)?.constants.remove(name)
    }

    pub fn remove_function(&mut self, id: ScopeId, name: &str) -> Option<Rc<OverloadSet>> {
        self.get_mut(id)?.functions.remove(name)
    }

    /// Removes the overloads of `name` in `id` that `remove` selects.
    /// The name disappears once no overload is left.
    pub fn remove_overloads(
        &mut self,
        id: ScopeId,
        name: &str,
        mut remove: impl FnMut(&Overload) -> bool,
    ) -> usize {
        let Some(scope) = self.get_mut(id) else {
            return 0;
        };
        let Some(set) = scope.functions.get_mut(name) else {
            return 0;
        };
        let before = set.overloads().len();
        Rc::make_mut(set).retain(|overload| !remove(overload));
        let removed = before - set.overloads().len();
        if set.is_empty() {
            scope.functions.remove(name);
        }
        removed
    }

    /// Ids of every allocated scope, the root first.
    pub fn ids(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.scope.as_ref().map(|_| ScopeId {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    /// Drops variables of `id` for which `purge` returns true.
    pub fn purge_variables(&mut self, id: ScopeId, purge: impl Fn(&Value) -> bool) -> usize {
        let Some(scope) = self.get_mut(id) else {
            return 0;
        };
        let before = scope.symbols.len();
        scope.symbols.retain(|_, value| !purge(value));
        before - scope.symbols.len()
    }

    /// Releases every scope not reachable from `roots`, the root scope, the
    /// closures held outside the arena, or the closures stored in reachable
    /// scopes. Returns how many were freed.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = ScopeId>) -> usize {
        self.closures.retain(|closure| closure.strong_count() > 0);

        let mut reachable = HashSet::new();
        let mut pending: Vec<ScopeId> = roots.into_iter().collect();
        pending.push(self.root());
        pending.extend(self.held_outside());

        while let Some(id) = pending.pop() {
            if !reachable.insert(id) {
                continue;
            }
            let Some(scope) = self.get(id) else {
                continue;
            };
            pending.extend(scope.parent);
            for value in scope.values() {
                pending.extend(closure_scopes(value));
            }
            for set in scope.functions.values() {
                pending.extend(overload_scopes(set));
            }
        }

        let unreachable: Vec<ScopeId> = self.ids().filter(|id| !reachable.contains(id)).collect();
        for &id in &unreachable {
            self.release(id);
        }
        let freed = unreachable.len();
        if freed > 0 {
            trace!(freed, live = self.live(), "collected scopes");
        }
        freed
    }

    /// Scopes of closures that something outside the arena still refers to:
    /// a host variable, a query result, a custom value. A closure or overload
    /// set with more strong references than the arena's own scopes account
    /// for is held from outside.
    fn held_outside(&self) -> Vec<ScopeId> {
        let mut closure_refs: HashMap<*const Closure, usize> = HashMap::new();
        let mut set_refs: HashMap<*const OverloadSet, (usize, &Rc<OverloadSet>)> = HashMap::new();

        for scope in self.slots.iter().filter_map(|slot| slot.scope.as_ref()) {
            for value in scope.values() {
                match value {
                    Value::Function(Function::Closure(closure)) => {
                        *closure_refs.entry(Rc::as_ptr(closure)).or_default() += 1;
                    }
                    Value::Function(Function::Overloads(set)) => {
                        set_refs.entry(Rc::as_ptr(set)).or_insert((0, set)).0 += 1;
                    }
                    _ => {}
                }
            }
            for set in scope.functions.values() {
                set_refs.entry(Rc::as_ptr(set)).or_insert((0, set)).0 += 1;
            }
        }

        let mut held = Vec::new();
        for (count, set) in set_refs.values() {
            let outside = Rc::strong_count(set) > *count;
            for overload in set.overloads() {
                if let Callable::Script(closure) = &overload.callable {
                    *closure_refs.entry(Rc::as_ptr(closure)).or_default() += 1;
                    if outside {
                        held.push(closure.scope);
                    }
                }
            }
        }
        for closure in self.closures.iter().filter_map(Weak::upgrade) {
            // one reference is the upgrade itself
            let inside = closure_refs.get(&Rc::as_ptr(&closure)).copied().unwrap_or(0);
            if Rc::strong_count(&closure) - 1 > inside {
                held.push(closure.scope);
            }
        }
        held
    }
}

/// Scopes kept alive by a value.
pub fn closure_scopes(value: &Value) -> Vec<ScopeId> {
    match value {
        Value::Function(Function::Closure(closure)) => vec![closure.scope],
        Value::Function(Function::Overloads(set)) => overload_scopes(set),
        _ => Vec::new(),
    }
}

fn overload_scopes(set: &OverloadSet) -> Vec<ScopeId> {
    set.overloads()
        .iter()
        .filter_map(|overload| match &overload.callable {
            Callable::Script(closure) => Some(closure.scope),
            Callable::Native(_) => None,
        })
        .collect()
}
