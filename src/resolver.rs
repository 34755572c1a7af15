//! Function overload resolution.
//!
//! A name can carry several overloads. A call first keeps the overloads whose
//! argument-count window admits the call, then keeps those whose parameter
//! types accept every argument, directly or through a registered conversion.
//! Among those, exact matches beat converted ones, then the lowest weight
//! wins, then the earliest registration.
//!
//! The weight of a signature is the sum of the character codes of its
//! parameter type names. It makes the choice deterministic; it is not meant
//! to encode specificity.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::value::{Closure, Value, ValueError};

/// Parameter type name that accepts any value.
pub const ANY: &str = "Value";

/// Host function body.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, ValueError>>;

/// Converts a value to another registered type, or declines.
pub type ConvertFn = Rc<dyn Fn(&Value) -> Option<Value>>;

#[derive(Clone)]
pub enum Callable {
    Native(NativeFn),
    Script(Rc<Closure>),
}

impl Callable {
    /// Whether both name the same host function or the same closure.
    pub fn ptr_eq(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Native(a), Callable::Native(b)) => Rc::ptr_eq(a, b),
            (Callable::Script(a), Callable::Script(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(_) => f.write_str("Native"),
            Callable::Script(closure) => write!(f, "Script({})", closure.def.display_name()),
        }
    }
}

/// Repetition of the last parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variadic {
    /// Fewest copies of the last parameter; 0 makes it optional
    pub min: usize,
    /// Most copies, unbounded when `None`
    pub max: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Vec<String>,
    variadic: Option<Variadic>,
}

impl Signature {
    pub fn new<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Signature {
            params: params.into_iter().map(Into::into).collect(),
            variadic: None,
        }
    }

    /// `arity` parameters of any type, as used by script functions.
    pub fn any(arity: usize) -> Self {
        Signature::new(std::iter::repeat_n(ANY, arity))
    }

    /// Lets the last parameter repeat between `min` and `max` times.
    pub fn variadic(mut self, min: usize, max: Option<usize>) -> Self {
        if !self.params.is_empty() {
            self.variadic = Some(Variadic { min, max });
        }
        self
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn variadic_tail(&self) -> Option<Variadic> {
        self.variadic
    }

    /// Sum of the character codes of every parameter type name.
    pub fn weight(&self) -> u32 {
        self.params
            .iter()
            .flat_map(|name| name.chars())
            .map(|c| c as u32)
            .sum()
    }

    /// Smallest and largest accepted argument count.
    pub fn arg_window(&self) -> (usize, Option<usize>) {
        let fixed = self.params.len();
        match self.variadic {
            None => (fixed, Some(fixed)),
            Some(Variadic { min, max }) => {
                let base = fixed - 1;
                (base + min, max.map(|max| base + max))
            }
        }
    }

    fn admits(&self, count: usize) -> bool {
        let (min, max) = self.arg_window();
        count >= min && max.is_none_or(|max| count <= max)
    }

    /// Declared type of the parameter receiving argument `position`.
    fn param_for(&self, position: usize) -> &str {
        self.params
            .get(position)
            .or_else(|| self.params.last())
            .map_or(ANY, String::as_str)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
            if i + 1 == self.params.len() && self.variadic.is_some() {
                write!(f, "...")?;
            }
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone)]
pub struct Overload {
    pub signature: Signature,
    pub weight: u32,
    pub callable: Callable,
}

impl Overload {
    pub fn new(signature: Signature, callable: Callable) -> Self {
        Overload {
            weight: signature.weight(),
            signature,
            callable,
        }
    }

    pub fn native(
        signature: Signature,
        f: impl Fn(&[Value]) -> Result<Value, ValueError> + 'static,
    ) -> Self {
        Self::new(signature, Callable::Native(Rc::new(f)))
    }
}

/// The chosen overload and the arguments converted for it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub index: usize,
    pub arguments: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("'{name}' takes {expected} argument(s), got {count}")]
    ArgumentCount {
        name: String,
        count: usize,
        expected: String,
    },

    #[error("no overload of '{name}' accepts ({arguments}): argument {position} is {found}, expected {expected}")]
    NoOverload {
        name: String,
        arguments: String,
        position: usize,
        found: String,
        expected: String,
    },
}

/// All overloads registered under one name, in registration order.
#[derive(Debug, Clone, Default)]
pub struct OverloadSet {
    name: String,
    overloads: Vec<Overload>,
}

enum Fit {
    Exact,
    Converted(Vec<Value>),
    /// Position of the first argument that did not fit
    Mismatch(usize),
}

impl OverloadSet {
    pub fn new(name: &str) -> Self {
        OverloadSet {
            name: name.to_string(),
            overloads: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overloads(&self) -> &[Overload] {
        &self.overloads
    }

    pub fn get(&self, index: usize) -> Option<&Overload> {
        self.overloads.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.overloads.is_empty()
    }

    /// Adds an overload. One with an identical signature is replaced in place.
    pub fn register(&mut self, overload: Overload) -> usize {
        match self
            .overloads
            .iter()
            .position(|existing| existing.signature == overload.signature)
        {
            Some(index) => {
                self.overloads[index] = overload;
                index
            }
            None => {
                self.overloads.push(overload);
                self.overloads.len() - 1
            }
        }
    }

    /// Keeps only the overloads for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&Overload) -> bool) {
        self.overloads.retain(keep);
    }

    pub fn resolve(&self, args: &[Value], types: &TypeRegistry) -> Result<Resolution, DispatchError> {
        let mut best: Option<(bool, u32, usize, Option<Vec<Value>>)> = None;
        let mut closest: Option<(usize, usize)> = None;
        let mut any_admits = false;

        for (index, overload) in self.overloads.iter().enumerate() {
            if !overload.signature.admits(args.len()) {
                continue;
            }
            any_admits = true;
            let (exact, converted) = match fit(&overload.signature, args, types) {
                Fit::Exact => (true, None),
                Fit::Converted(converted) => (false, Some(converted)),
                Fit::Mismatch(position) => {
                    if closest.is_none_or(|(best_position, _)| position > best_position) {
                        closest = Some((position, index));
                    }
                    continue;
                }
            };
            let better = match &best {
                None => true,
                Some((best_exact, best_weight, _, _)) => {
                    (exact, std::cmp::Reverse(overload.weight))
                        > (*best_exact, std::cmp::Reverse(*best_weight))
                }
            };
            if better {
                best = Some((exact, overload.weight, index, converted));
            }
        }

        if let Some((_, _, index, converted)) = best {
            return Ok(Resolution {
                index,
                arguments: converted.unwrap_or_else(|| args.to_vec()),
            });
        }

        if !any_admits {
            return Err(DispatchError::ArgumentCount {
                name: self.name.clone(),
                count: args.len(),
                expected: self.describe_windows(),
            });
        }

        let (position, index) = closest.unwrap_or((0, 0));
        Err(DispatchError::NoOverload {
            name: self.name.clone(),
            arguments: args
                .iter()
                .map(|arg| arg.type_name().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            position: position + 1,
            found: args
                .get(position)
                .map_or_else(String::new, |arg| arg.type_name().to_string()),
            expected: self
                .overloads
                .get(index)
                .map_or_else(String::new, |o| o.signature.param_for(position).to_string()),
        })
    }

    fn describe_windows(&self) -> String {
        let mut windows: Vec<String> = self
            .overloads
            .iter()
            .map(|overload| match overload.signature.arg_window() {
                (min, Some(max)) if min == max => min.to_string(),
                (min, Some(max)) => format!("{min} to {max}"),
                (min, None) => format!("{min} or more"),
            })
            .collect();
        windows.dedup();
        windows.join(" or ")
    }
}

fn fit(signature: &Signature, args: &[Value], types: &TypeRegistry) -> Fit {
    let mut converted: Option<Vec<Value>> = None;
    for (position, arg) in args.iter().enumerate() {
        match types.accepts(arg, signature.param_for(position)) {
            Acceptance::Exact => {
                if let Some(out) = converted.as_mut() {
                    out.push(arg.clone());
                }
            }
            Acceptance::Converted(value) => {
                let out = converted.get_or_insert_with(|| args[..position].to_vec());
                out.push(value);
            }
            Acceptance::Rejected => return Fit::Mismatch(position),
        }
    }
    match converted {
        Some(values) => Fit::Converted(values),
        None => Fit::Exact,
    }
}

pub enum Acceptance {
    Exact,
    Converted(Value),
    Rejected,
}

/// Known value type names and the conversions between them.
#[derive(Clone)]
pub struct TypeRegistry {
    conversions: BTreeMap<String, Vec<(String, ConvertFn)>>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.conversions.keys()).finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// The built-in types, with a scalar accepted wherever a matrix is.
    pub fn new() -> Self {
        let mut registry = TypeRegistry {
            conversions: BTreeMap::new(),
        };
        for name in ["Empty", "Scalar", "String", "Matrix", "Function"] {
            registry.register(name);
        }
        registry.add_conversion(
            "Scalar",
            "Matrix",
            Rc::new(|value: &Value| value.to_matrix().ok().map(Value::Matrix)),
        );
        registry
    }

    /// Adds a type name. Returns false if it was already known.
    pub fn register(&mut self, name: &str) -> bool {
        if self.conversions.contains_key(name) {
            return false;
        }
        self.conversions.insert(name.to_string(), Vec::new());
        true
    }

    /// Removes a type name and every conversion into it.
    pub fn unregister(&mut self, name: &str) {
        self.conversions.remove(name);
        for targets in self.conversions.values_mut() {
            targets.retain(|(target, _)| target != name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.conversions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.conversions.keys().map(String::as_str)
    }

    pub fn add_conversion(&mut self, from: &str, to: &str, convert: ConvertFn) {
        self.conversions
            .entry(from.to_string())
            .or_default()
            .push((to.to_string(), convert));
    }

    pub fn remove_conversion(&mut self, from: &str, to: &str) {
        if let Some(targets) = self.conversions.get_mut(from) {
            targets.retain(|(target, _)| target != to);
        }
    }

    pub fn accepts(&self, value: &Value, param: &str) -> Acceptance {
        let actual = value.type_name();
        if param == ANY || param == actual {
            return Acceptance::Exact;
        }
        let converted = self.conversions.get(actual).and_then(|targets| {
            targets
                .iter()
                .filter(|(target, _)| target == param)
                .find_map(|(_, convert)| convert(value))
        });
        match converted {
            Some(value) => Acceptance::Converted(value),
            None => Acceptance::Rejected,
        }
    }
}
