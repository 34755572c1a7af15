//! Tree-walking interpreter.
//!
//! Statements are interpreted straight from the syntax tree every time they
//! run. Control flow travels as a [`Flow`] value: loops consume `Break`,
//! function calls consume `Return`, and every other construct hands both
//! outward unchanged.

mod keywords;

use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::{debug, instrument, trace};

use crate::assign::{AssignTarget, extract_target, store_indexed};
use crate::ast::{BinOp, Expr, ExprKind, FunctionBody, FunctionDef, PostfixOp, Query, UnaryOp};
use crate::builtins::CorePlugin;
use crate::config::EngineConfig;
use crate::diagnostics::Diagnostic;
use crate::lexer::Span;
use crate::output::{self, OutputError};
use crate::parser::Parser;
use crate::plugin::{Plugin, PluginError, PluginLoader, PluginRecord};
use crate::resolver::{Callable, DispatchError, OverloadSet, TypeRegistry};
use crate::scope::{Binding, ScopeArena, ScopeError, ScopeId, ScopeKind, closure_scopes};
use crate::value::{Closure, Function, Matrix, Value, ValueError, to_indices};

/// Where an expression is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalContext {
    /// Innermost live scope
    pub scope: ScopeId,
    /// Number of function calls currently on the stack
    pub call_depth: usize,
}

impl EvalContext {
    pub fn new(scope: ScopeId) -> Self {
        EvalContext {
            scope,
            call_depth: 0,
        }
    }

    /// Same call, nested scope.
    pub fn with_scope(&self, scope: ScopeId) -> Self {
        EvalContext {
            scope,
            call_depth: self.call_depth,
        }
    }

    /// One call deeper, in the callee's scope.
    pub fn with_call(&self, scope: ScopeId) -> Self {
        EvalContext {
            scope,
            call_depth: self.call_depth + 1,
        }
    }
}

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Ran to completion; the value is present when it is observable
    Normal(Option<Value>),
    /// `break` heading for the nearest loop
    Break,
    /// `return` heading for the nearest function call
    Return(Value),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}")]
pub struct EvalError {
    pub kind: EvalErrorKind,
    /// Innermost node the error was raised at, when known
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalErrorKind {
    #[error("'{0}' is not defined")]
    UndefinedSymbol(String),

    #[error("a value of type {0} cannot be called")]
    NotCallable(String),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error("'{name}' takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("call depth exceeded the limit of {0}")]
    RecursionLimit(usize),

    #[error("query has {0} structural error(s) and cannot be run")]
    InvalidQuery(usize),

    #[error("only names and indexed names can be assigned")]
    InvalidTarget,

    #[error("expression was not parsed successfully")]
    Malformed,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, span: Option<Span>) -> Self {
        EvalError { kind, span }
    }

    /// Attaches `span` unless a more precise one is already set.
    pub fn or_span(mut self, span: Span) -> Self {
        self.span.get_or_insert(span);
        self
    }
}

impl From<EvalErrorKind> for EvalError {
    fn from(kind: EvalErrorKind) -> Self {
        EvalError { kind, span: None }
    }
}

impl From<ValueError> for EvalError {
    fn from(error: ValueError) -> Self {
        EvalErrorKind::Value(error).into()
    }
}

impl From<DispatchError> for EvalError {
    fn from(error: DispatchError) -> Self {
        EvalErrorKind::Dispatch(error).into()
    }
}

impl From<ScopeError> for EvalError {
    fn from(error: ScopeError) -> Self {
        EvalErrorKind::Scope(error).into()
    }
}

/// Failure of [`Evaluator::eval_str`], already located in the source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunError {
    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))]
    Parse(Vec<Diagnostic>),

    #[error("{0}")]
    Eval(Diagnostic),
}

/// The scripting engine: scopes, types and installed plugins.
///
/// # Examples
///
/// ```
/// use mathscript::{Evaluator, Value};
///
/// let mut engine = Evaluator::new();
/// let result = engine.eval_str("function sq(x) { return x^2; } sq(4) + 1").unwrap();
/// assert_eq!(result, Value::Scalar(17.0));
/// ```
#[derive(Debug)]
pub struct Evaluator {
    config: EngineConfig,
    scopes: ScopeArena,
    types: TypeRegistry,
    plugins: PluginLoader,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let install_core = config.install_core;
        let mut engine = Evaluator {
            config,
            scopes: ScopeArena::new(),
            types: TypeRegistry::new(),
            plugins: PluginLoader::default(),
        };
        if install_core {
            // fresh loader, cannot already hold "core"
            let _ = engine.install(&CorePlugin);
        }
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scopes(&self) -> &ScopeArena {
        &self.scopes
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn parse(&self, source: &str) -> Query {
        Parser::with_config(source, self.config.parser()).parse_query()
    }

    /// Runs a parsed query in the root scope.
    ///
    /// The result is the value of the last observable top-level statement,
    /// or `Empty` when no statement produced one. A `return` at top level
    /// ends the query with its value.
    #[instrument(level = "debug", skip_all)]
    pub fn eval_query(&mut self, query: &Query) -> Result<Value, EvalError> {
        if query.has_errors() {
            return Err(EvalErrorKind::InvalidQuery(query.diagnostics.len()).into());
        }
        debug!(statements = query.statements.len(), "evaluating query");

        let ctx = EvalContext::new(self.scopes.root());
        let mut result = Value::Empty;
        let mut outcome = Ok(());
        for statement in &query.statements {
            match self.exec_statement(statement, &ctx) {
                Ok(Flow::Normal(Some(value))) => result = value,
                Ok(Flow::Normal(None)) => {}
                Ok(Flow::Return(value)) => {
                    result = value;
                    break;
                }
                Ok(Flow::Break) => break,
                Err(error) => {
                    outcome = Err(error);
                    break;
                }
            }
        }

        let keep = match &outcome {
            Ok(()) => closure_scopes(&result),
            Err(_) => Vec::new(),
        };
        let freed = self.scopes.collect(keep);
        debug!(freed, live = self.scopes.live(), "query finished");
        outcome.map(|()| result)
    }

    /// Parses and runs `source`, reporting errors with line and column.
    pub fn eval_str(&mut self, source: &str) -> Result<Value, RunError> {
        let query = self.parse(source);
        if query.has_errors() {
            return Err(RunError::Parse(query.report()));
        }
        self.eval_query(&query)
            .map_err(|error| RunError::Eval(Diagnostic::eval(&error, &query)))
    }

    /// Calls a function visible at root level by name.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let ctx = EvalContext::new(self.scopes.root());
        let callee = self
            .scopes
            .lookup(ctx.scope, name)
            .map(Binding::to_value)
            .ok_or_else(|| EvalErrorKind::UndefinedSymbol(name.to_string()))?;
        self.call_value(&callee, args)
    }

    /// Calls a function value, e.g. a lambda a script returned.
    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, EvalError> {
        let ctx = EvalContext::new(self.scopes.root());
        match callee {
            Value::Function(function) => self.call_function(function, args, &ctx),
            other => Err(EvalErrorKind::NotCallable(other.type_name().to_string()).into()),
        }
    }

    /// A root-level variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.scopes.variable(self.scopes.root(), name)
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        let root = self.scopes.root();
        self.scopes.bind(root, name, value);
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<Value> {
        let root = self.scopes.root();
        self.scopes.remove_variable(root, name)
    }

    /// Every root-level variable, sorted by name.
    pub fn variables(&self) -> BTreeMap<&str, &Value> {
        self.scopes
            .get(self.scopes.root())
            .map(|scope| scope.symbols().collect())
            .unwrap_or_default()
    }

    /// Root-level variables as a JSON object. Function values are skipped.
    pub fn export_variables(&self) -> String {
        output::bindings_to_json(self.variables())
    }

    /// Sets root-level variables from a JSON object. Returns how many were set.
    pub fn import_variables(&mut self, json: &str) -> Result<usize, OutputError> {
        let bindings = output::bindings_from_json(json)?;
        let count = bindings.len();
        for (name, value) in bindings {
            self.set_variable(&name, value);
        }
        Ok(count)
    }

    pub fn install(&mut self, plugin: &dyn Plugin) -> Result<PluginRecord, PluginError> {
        self.plugins
            .install(plugin, &mut self.scopes, &mut self.types)
    }

    pub fn uninstall(&mut self, record: &PluginRecord) -> Result<(), PluginError> {
        self.plugins
            .uninstall(record, &mut self.scopes, &mut self.types)
    }

    pub fn plugins(&self) -> &[PluginRecord] {
        self.plugins.records()
    }

    /// Releases captured scopes that no variable or function refers to any
    /// more. Runs after every query.
    pub fn collect_scopes(&mut self) -> usize {
        self.scopes.collect([])
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval_expr(&mut self, expr: &Expr, ctx: &EvalContext) -> Result<Value, EvalError> {
        self.eval_kind(expr, ctx).map_err(|error| error.or_span(expr.span))
    }

    fn eval_kind(&mut self, expr: &Expr, ctx: &EvalContext) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Scalar(*n)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Symbol(name) => self
                .scopes
                .lookup(ctx.scope, name)
                .map(Binding::to_value)
                .ok_or_else(|| EvalErrorKind::UndefinedSymbol(name.clone()).into()),
            ExprKind::Group(inner) => self.eval_expr(inner, ctx),
            ExprKind::EmptyGroup => Ok(Value::Empty),
            ExprKind::Matrix(rows) => self.eval_matrix(rows, ctx),
            ExprKind::Abs(inner) => Ok(self.eval_expr(inner, ctx)?.abs()?),

            ExprKind::Unary { op, operand } => {
                let value = self.eval_expr(operand, ctx)?;
                match op {
                    UnaryOp::Negate => Ok(value.negate()?),
                    UnaryOp::Not => Ok(value.not()),
                }
            }

            ExprKind::Postfix { op, operand } => {
                let value = self.eval_expr(operand, ctx)?;
                match op {
                    PostfixOp::Transpose => Ok(value.transpose()?),
                    PostfixOp::Factorial => Ok(value.factorial()?),
                }
            }

            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, ctx),

            ExprKind::Range { start, step, end } => {
                let start = self.eval_scalar(start, ctx)?;
                let step = match step {
                    Some(step) => self.eval_scalar(step, ctx)?,
                    None => 1.0,
                };
                let end = self.eval_scalar(end, ctx)?;
                Ok(Value::Matrix(Matrix::range(start, step, end)?))
            }

            ExprKind::Assign { op, target, value } => {
                self.eval_assign(op.binary(), target, value, ctx)
            }

            ExprKind::Call { callee, args } => self.eval_call(callee, args, ctx),

            ExprKind::Member { object, name } => Ok(self.eval_expr(object, ctx)?.member(name)?),

            ExprKind::Lambda(def) => Ok(Value::Function(Function::Closure(
                self.make_closure(def, ctx),
            ))),

            ExprKind::Invalid => Err(EvalErrorKind::Malformed.into()),
        }
    }

    fn eval_scalar(&mut self, expr: &Expr, ctx: &EvalContext) -> Result<f64, EvalError> {
        let value = self.eval_expr(expr, ctx)?;
        value.as_scalar().ok_or_else(|| {
            EvalError::new(
                ValueError::Invalid(format!("expected a scalar, got {}", value.type_name())).into(),
                Some(expr.span),
            )
        })
    }

    /// Cells are joined side by side within a row, then rows are stacked.
    fn eval_matrix(&mut self, rows: &[Vec<Expr>], ctx: &EvalContext) -> Result<Value, EvalError> {
        let mut result = Matrix::empty();
        for row in rows {
            let mut joined = Matrix::empty();
            for cell in row {
                let value = self.eval_expr(cell, ctx)?;
                let cell_matrix = value.to_matrix().map_err(|e| EvalError::from(e).or_span(cell.span))?;
                joined = joined
                    .hcat(&cell_matrix)
                    .map_err(|e| EvalError::from(e).or_span(cell.span))?;
            }
            result = result.vcat(&joined)?;
        }
        Ok(Value::Matrix(result))
    }

    /// `&&` and `||` only evaluate their right side when it matters.
    fn eval_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        ctx: &EvalContext,
    ) -> Result<Value, EvalError> {
        let lhs = self.eval_expr(left, ctx)?;
        match op {
            BinOp::And if !lhs.is_truthy() => return Ok(Value::from_bool(false)),
            BinOp::Or if lhs.is_truthy() => return Ok(Value::from_bool(true)),
            BinOp::And | BinOp::Or => {
                let rhs = self.eval_expr(right, ctx)?;
                return Ok(Value::from_bool(rhs.is_truthy()));
            }
            _ => {}
        }
        let rhs = self.eval_expr(right, ctx)?;
        Ok(lhs.binary(op, &rhs)?)
    }

    /// Plain assignment yields the right-hand value; compound assignment
    /// yields the updated value.
    fn eval_assign(
        &mut self,
        op: Option<BinOp>,
        target: &Expr,
        value: &Expr,
        ctx: &EvalContext,
    ) -> Result<Value, EvalError> {
        let target_span = target.span;
        let Some(target) = extract_target(target) else {
            return Err(EvalError::new(EvalErrorKind::InvalidTarget, Some(target_span)));
        };
        let rhs = self.eval_expr(value, ctx)?;

        match target {
            AssignTarget::Symbol(name) => {
                let assigned = match op {
                    None => rhs,
                    Some(op) => {
                        let current = self
                            .scopes
                            .lookup(ctx.scope, name)
                            .map(Binding::to_value)
                            .ok_or_else(|| {
                                EvalError::new(
                                    EvalErrorKind::UndefinedSymbol(name.to_string()),
                                    Some(target_span),
                                )
                            })?;
                        current.binary(op, &rhs)?
                    }
                };
                trace!(name, "assign");
                self.scopes.assign(ctx.scope, name, assigned.clone());
                Ok(assigned)
            }

            AssignTarget::Index { name, indices } => {
                let mut index_values = Vec::with_capacity(indices.len());
                for index in indices {
                    index_values.push(self.eval_expr(index, ctx)?);
                }
                let positions = to_indices(&index_values)?;
                let current = self.scopes.variable(ctx.scope, name).cloned();

                let element = match (op, &current) {
                    (None, _) => rhs,
                    (Some(op), Some(current)) => {
                        current.index(&index_values)?.binary(op, &rhs)?
                    }
                    (Some(_), None) => {
                        return Err(EvalError::new(
                            EvalErrorKind::UndefinedSymbol(name.to_string()),
                            Some(target_span),
                        ));
                    }
                };
                let stored = store_indexed(current, &positions, &element)?;
                trace!(name, ?positions, "indexed assign");
                self.scopes.assign(ctx.scope, name, stored);
                Ok(element)
            }
        }
    }

    /// `f(args)` calls when `f` is a function and indexes otherwise.
    fn eval_call(&mut self, callee: &Expr, args: &[Expr], ctx: &EvalContext) -> Result<Value, EvalError> {
        let target = match callee.as_symbol() {
            Some(name) => self
                .scopes
                .lookup(ctx.scope, name)
                .map(Binding::to_value)
                .ok_or_else(|| {
                    EvalError::new(EvalErrorKind::UndefinedSymbol(name.to_string()), Some(callee.span))
                })?,
            None => self.eval_expr(callee, ctx)?,
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg, ctx)?);
        }

        match target {
            Value::Function(function) => self.call_function(&function, values, ctx),
            other if values.is_empty() => Ok(other),
            other => Ok(other.index(&values)?),
        }
    }

    fn make_closure(&mut self, def: &Rc<FunctionDef>, ctx: &EvalContext) -> Rc<Closure> {
        self.scopes.close_over(Rc::clone(def), ctx.scope)
    }

    fn call_function(
        &mut self,
        function: &Function,
        args: Vec<Value>,
        ctx: &EvalContext,
    ) -> Result<Value, EvalError> {
        match function {
            Function::Closure(closure) => {
                let expected = closure.def.arity();
                if args.len() != expected {
                    return Err(EvalErrorKind::Arity {
                        name: closure.def.display_name().to_string(),
                        expected,
                        got: args.len(),
                    }
                    .into());
                }
                self.invoke(closure, args, ctx)
            }
            Function::Overloads(set) => self.call_overloads(set, args, ctx),
        }
    }

    fn call_overloads(
        &mut self,
        set: &OverloadSet,
        args: Vec<Value>,
        ctx: &EvalContext,
    ) -> Result<Value, EvalError> {
        let resolution = set.resolve(&args, &self.types)?;
        let Some(overload) = set.get(resolution.index) else {
            return Err(EvalErrorKind::UndefinedSymbol(set.name().to_string()).into());
        };
        debug!(
            function = set.name(),
            overload = resolution.index,
            signature = %overload.signature,
            "resolved call"
        );
        match overload.callable.clone() {
            Callable::Native(f) => Ok(f(&resolution.arguments)?),
            Callable::Script(closure) => self.invoke(&closure, resolution.arguments, ctx),
        }
    }

    /// Runs a script function in a fresh scope chained to the scope the
    /// function was defined in.
    fn invoke(&mut self, closure: &Closure, args: Vec<Value>, ctx: &EvalContext) -> Result<Value, EvalError> {
        let limit = self.config.max_call_depth;
        if ctx.call_depth >= limit {
            return Err(EvalErrorKind::RecursionLimit(limit).into());
        }

        let scope = self.scopes.enter(closure.scope, ScopeKind::Function)?;
        for (param, arg) in closure.def.params.iter().zip(args) {
            self.scopes.bind(scope, param, arg);
        }
        let inner = ctx.with_call(scope);
        trace!(function = closure.def.display_name(), depth = inner.call_depth, "call");

        let result = match &closure.def.body {
            FunctionBody::Block(statements) => {
                self.exec_sequence(statements, &inner).map(|flow| match flow {
                    Flow::Return(value) => value,
                    Flow::Normal(_) | Flow::Break => Value::Empty,
                })
            }
            FunctionBody::Expression(body) => self.eval_expr(body, &inner),
        };
        self.scopes.exit(scope);
        result
    }
}
