use crate::ast::{Expr, Statement};
use crate::lexer::Span;

/// A function definition, named (`function f(a) { ... }`) or anonymous
/// (`a => a + 1`).
///
/// Definitions are shared through `Rc` between the syntax tree and every
/// closure created from them.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: FunctionBody,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    /// `{ ... }`, the result is whatever `return` hands back
    Block(Vec<Statement>),
    /// Lambda shorthand, the expression value is the result
    Expression(Box<Expr>),
}

impl FunctionDef {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}
