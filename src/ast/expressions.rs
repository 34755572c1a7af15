use std::rc::Rc;

use crate::ast::{AssignOp, BinOp, FunctionDef, PostfixOp, UnaryOp};
use crate::lexer::Span;

/// The three bracket families. Each keeps its own nesting depth while the
/// parser looks for a closing partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bracket {
    Paren,
    Square,
    Curly,
}

impl Bracket {
    pub fn open(self) -> char {
        match self {
            Bracket::Paren => '(',
            Bracket::Square => '[',
            Bracket::Curly => '{',
        }
    }

    pub fn close(self) -> char {
        match self {
            Bracket::Paren => ')',
            Bracket::Square => ']',
            Bracket::Curly => '}',
        }
    }

    pub fn from_open(ch: char) -> Option<Bracket> {
        match ch {
            '(' => Some(Bracket::Paren),
            '[' => Some(Bracket::Square),
            '{' => Some(Bracket::Curly),
            _ => None,
        }
    }

    pub fn from_close(ch: char) -> Option<Bracket> {
        match ch {
            ')' => Some(Bracket::Paren),
            ']' => Some(Bracket::Square),
            '}' => Some(Bracket::Curly),
            _ => None,
        }
    }
}

/// Expression node with the source range it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

/// Abstract Syntax Tree node kinds for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Literals
    /// Numeric literal
    ///
    /// # Example
    /// ```text
    /// 42
    /// 1.5e-3
    /// ```
    Number(f64),

    /// String literal, escaped (`"a\n"`) or verbatim (`@"C:\dir"`)
    String(String),

    /// Variable, constant or function name
    Symbol(String),

    // Brackets
    /// Parenthesised expression
    Group(Box<Expr>),

    /// `()`, evaluates to the empty value
    EmptyGroup,

    /// Matrix literal, a list of rows of cells
    ///
    /// # Example
    /// ```text
    /// [1 2; 3 4]
    /// [a, b
    ///  c, d]
    /// ```
    Matrix(Vec<Vec<Expr>>),

    /// Absolute value bars
    ///
    /// # Example
    /// ```text
    /// |x - 3|
    /// ```
    Abs(Box<Expr>),

    // Operations
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    Postfix {
        op: PostfixOp,
        operand: Box<Expr>,
    },

    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Colon range
    ///
    /// # Example
    /// ```text
    /// 1:5       // [1 2 3 4 5]
    /// 10:-2:4   // [10 8 6 4]
    /// ```
    Range {
        start: Box<Expr>,
        step: Option<Box<Expr>>,
        end: Box<Expr>,
    },

    /// Assignment, plain or compound. `x++` is sugar for `x += 1`.
    ///
    /// # Example
    /// ```text
    /// x = 5
    /// y += k
    /// m(2, 3) = 1
    /// ```
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },

    /// Function call or matrix index, decided at run time
    ///
    /// # Example
    /// ```text
    /// sin(pi)
    /// x(10)
    /// ```
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },

    /// Member access (`m.rows`)
    Member {
        object: Box<Expr>,
        name: String,
    },

    /// Anonymous function
    ///
    /// # Example
    /// ```text
    /// x => x^2
    /// (a, b) => a + b
    /// ```
    Lambda(Rc<FunctionDef>),

    /// Placeholder left where a structural error was recorded
    Invalid,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }

    pub fn invalid(span: Span) -> Self {
        Expr {
            kind: ExprKind::Invalid,
            span,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.kind, ExprKind::Invalid)
    }

    /// The source text this node was parsed from.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.span.start..self.span.end).unwrap_or("")
    }
}
