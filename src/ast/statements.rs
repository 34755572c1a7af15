use crate::ast::{Expr, Keyword, KeywordKind};
use crate::lexer::Span;

/// One statement of a query or block.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    /// Terminated by `;`, so its value is not observable.
    pub muted: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// A lone `;` or an empty keyword body
    Empty,

    /// Plain expression
    ///
    /// # Example
    /// ```text
    /// x = 2 * y;
    /// ```
    Expression(Expr),

    /// Brace block, evaluated in its own scope
    ///
    /// # Example
    /// ```text
    /// { a = 1; b = 2 }
    /// ```
    Block(Vec<Statement>),

    Keyword(Keyword),
}

impl Statement {
    pub fn new(kind: StatementKind, muted: bool, span: Span) -> Self {
        Statement { kind, muted, span }
    }

    pub fn empty(span: Span) -> Self {
        Statement {
            kind: StatementKind::Empty,
            muted: true,
            span,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, StatementKind::Empty)
    }

    pub fn as_keyword(&self) -> Option<&Keyword> {
        match &self.kind {
            StatementKind::Keyword(keyword) => Some(keyword),
            _ => None,
        }
    }

    /// The keyword of this statement, when it is of the given kind.
    pub fn keyword(&self, kind: KeywordKind) -> Option<&Keyword> {
        self.as_keyword().filter(|keyword| keyword.kind() == kind)
    }

    pub fn as_expression(&self) -> Option<&Expr> {
        match &self.kind {
            StatementKind::Expression(expr) => Some(expr),
            _ => None,
        }
    }
}
