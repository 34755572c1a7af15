//! Statement and keyword interpretation.

use tracing::trace;

use crate::ast::{Expr, Keyword, Statement, StatementKind};
use crate::resolver::{Callable, Overload, Signature};
use crate::scope::{Declaration, ScopeKind};
use crate::value::Value;

use super::{EvalContext, EvalError, Evaluator, Flow};

impl Evaluator {
    pub(super) fn exec_statement(
        &mut self,
        statement: &Statement,
        ctx: &EvalContext,
    ) -> Result<Flow, EvalError> {
        let flow = match &statement.kind {
            StatementKind::Empty => Ok(Flow::Normal(None)),
            StatementKind::Expression(expr) => self
                .eval_expr(expr, ctx)
                .map(|value| Flow::Normal((!statement.muted).then_some(value))),
            StatementKind::Block(statements) => self.exec_block(statements, ctx),
            StatementKind::Keyword(keyword) => self.exec_keyword(keyword, ctx),
        };
        let flow = flow.map_err(|error| error.or_span(statement.span))?;

        Ok(match flow {
            Flow::Normal(Some(_)) if statement.muted => Flow::Normal(None),
            other => other,
        })
    }

    /// Runs statements in order, stopping at the first `break` or `return`.
    pub(super) fn exec_sequence(
        &mut self,
        statements: &[Statement],
        ctx: &EvalContext,
    ) -> Result<Flow, EvalError> {
        let mut last = None;
        for statement in statements {
            match self.exec_statement(statement, ctx)? {
                Flow::Normal(Some(value)) => last = Some(value),
                Flow::Normal(None) => {}
                signal => return Ok(signal),
            }
        }
        Ok(Flow::Normal(last))
    }

    /// `{ ... }` in a scope of its own, released on every way out.
    fn exec_block(&mut self, statements: &[Statement], ctx: &EvalContext) -> Result<Flow, EvalError> {
        let scope = self.scopes.enter(ctx.scope, ScopeKind::Block)?;
        let flow = self.exec_sequence(statements, &ctx.with_scope(scope));
        self.scopes.exit(scope);
        flow
    }

    fn truthy(&mut self, condition: &Expr, ctx: &EvalContext) -> Result<bool, EvalError> {
        Ok(self.eval_expr(condition, ctx)?.is_truthy())
    }

    fn exec_keyword(&mut self, keyword: &Keyword, ctx: &EvalContext) -> Result<Flow, EvalError> {
        trace!(keyword = %keyword.kind(), scope = ctx.scope.index(), "interpret");
        match keyword {
            Keyword::If {
                condition,
                body,
                alternate,
            } => {
                if self.truthy(condition, ctx)? {
                    self.exec_statement(body, ctx)
                } else if let Some(alternate) = alternate {
                    self.exec_statement(alternate, ctx)
                } else {
                    Ok(Flow::Normal(None))
                }
            }

            Keyword::Else { body } => self.exec_statement(body, ctx),

            Keyword::While { condition, body } => {
                while self.truthy(condition, ctx)? {
                    match self.exec_statement(body, ctx)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal(_) => {}
                    }
                }
                Ok(Flow::Normal(None))
            }

            Keyword::Do { body, condition } => {
                loop {
                    match self.exec_statement(body, ctx)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal(_) => {}
                    }
                    let again = match condition {
                        Some(condition) => self.truthy(condition, ctx)?,
                        None => false,
                    };
                    if !again {
                        break;
                    }
                }
                Ok(Flow::Normal(None))
            }

            Keyword::For {
                init,
                condition,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.eval_expr(init, ctx)?;
                }
                loop {
                    if let Some(condition) = condition
                        && !self.truthy(condition, ctx)?
                    {
                        break;
                    }
                    match self.exec_statement(body, ctx)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal(_) => {}
                    }
                    if let Some(step) = step {
                        self.eval_expr(step, ctx)?;
                    }
                }
                Ok(Flow::Normal(None))
            }

            Keyword::Function(def) => {
                let Some(name) = def.name.as_deref() else {
                    return Ok(Flow::Normal(None));
                };
                let closure = self.make_closure(def, ctx);
                let overload = Overload::new(Signature::any(def.arity()), Callable::Script(closure));
                self.scopes
                    .declare(ctx.scope, name, Declaration::Function(overload));
                trace!(function = name, arity = def.arity(), "declared");
                Ok(Flow::Normal(None))
            }

            Keyword::Let { name, value } => {
                self.scopes.declare(ctx.scope, name, Declaration::Variable);
                if let Some(value) = value {
                    let value = self.eval_expr(value, ctx)?;
                    self.scopes.bind(ctx.scope, name, value);
                }
                Ok(Flow::Normal(None))
            }

            Keyword::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, ctx)?,
                    None => Value::Empty,
                };
                Ok(Flow::Return(value))
            }

            Keyword::Break => Ok(Flow::Break),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Value {
        Evaluator::new().eval_str(source).unwrap()
    }

    #[test]
    fn muted_statements_are_not_observable() {
        assert_eq!(run("1; 2;"), Value::Empty);
        assert_eq!(run("1; 2"), Value::Scalar(2.0));
    }

    #[test]
    fn blocks_yield_their_last_observable_value() {
        assert_eq!(run("{ a = 1; a + 1 }"), Value::Scalar(2.0));
    }

    #[test]
    fn do_without_while_runs_once() {
        assert_eq!(run("n = 0; do { n += 1; } n"), Value::Scalar(1.0));
    }

    #[test]
    fn break_skips_the_for_step() {
        assert_eq!(
            run("for (k = 1; k < 10; k++) { if (k == 3) break; } k"),
            Value::Scalar(3.0)
        );
    }
}
