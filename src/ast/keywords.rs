use std::fmt;
use std::rc::Rc;

use crate::ast::{Expr, FunctionDef, Statement};

/// Reserved words that start a keyword statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordKind {
    If,
    Else,
    While,
    Do,
    For,
    Function,
    Let,
    Return,
    Break,
}

impl KeywordKind {
    pub const ALL: [KeywordKind; 9] = [
        KeywordKind::If,
        KeywordKind::Else,
        KeywordKind::While,
        KeywordKind::Do,
        KeywordKind::For,
        KeywordKind::Function,
        KeywordKind::Let,
        KeywordKind::Return,
        KeywordKind::Break,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KeywordKind::If => "if",
            KeywordKind::Else => "else",
            KeywordKind::While => "while",
            KeywordKind::Do => "do",
            KeywordKind::For => "for",
            KeywordKind::Function => "function",
            KeywordKind::Let => "let",
            KeywordKind::Return => "return",
            KeywordKind::Break => "break",
        }
    }

    /// Loops are the only targets of `break`.
    pub fn is_breakable(self) -> bool {
        matches!(self, KeywordKind::While | KeywordKind::Do | KeywordKind::For)
    }
}

impl fmt::Display for KeywordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scanned keyword construct.
#[derive(Debug, Clone, PartialEq)]
pub enum Keyword {
    /// `if (cond) body [else body]`
    If {
        condition: Expr,
        body: Box<Statement>,
        /// The `else` statement consumed right after the body, if any
        alternate: Option<Box<Statement>>,
    },

    /// `else body`, only ever reached through an `if`
    Else { body: Box<Statement> },

    /// `while (cond) body`
    While { condition: Expr, body: Box<Statement> },

    /// `do body while (cond)`; without the trailing `while` the body runs once
    Do {
        body: Box<Statement>,
        condition: Option<Expr>,
    },

    /// `for (init; cond; step) body`
    For {
        init: Option<Expr>,
        condition: Option<Expr>,
        step: Option<Expr>,
        body: Box<Statement>,
    },

    /// `function name(a, b) { ... }`
    Function(Rc<FunctionDef>),

    /// `let name [= value]`
    Let { name: String, value: Option<Expr> },

    /// `return [value]`
    Return(Option<Expr>),

    Break,
}

impl Keyword {
    pub fn kind(&self) -> KeywordKind {
        match self {
            Keyword::If { .. } => KeywordKind::If,
            Keyword::Else { .. } => KeywordKind::Else,
            Keyword::While { .. } => KeywordKind::While,
            Keyword::Do { .. } => KeywordKind::Do,
            Keyword::For { .. } => KeywordKind::For,
            Keyword::Function(_) => KeywordKind::Function,
            Keyword::Let { .. } => KeywordKind::Let,
            Keyword::Return(_) => KeywordKind::Return,
            Keyword::Break => KeywordKind::Break,
        }
    }

    /// The statement body of keywords that carry one.
    pub fn body(&self) -> Option<&Statement> {
        match self {
            Keyword::If { body, .. }
            | Keyword::Else { body }
            | Keyword::While { body, .. }
            | Keyword::Do { body, .. }
            | Keyword::For { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_breakable(&self) -> bool {
        self.kind().is_breakable()
    }
}
