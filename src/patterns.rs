//! Ordered pattern registries used by the expression builder.
//!
//! Two registries drive parsing: one classifies what starts an operand
//! (keyword, number, string, call, symbol, bracket), the other recognises
//! operators. Entries are tried in registration order and the first match at
//! the cursor wins, so longer operators are registered before their prefixes.

use std::sync::LazyLock;

use regex::Regex;

use crate::ast::{AssignOp, BinOp, Bracket, KeywordKind, OperatorToken, PostfixOp};
use crate::lexer::Span;

/// What a matched operand pattern stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Keyword(KeywordKind),
    Number,
    String,
    VerbatimString,
    /// `name =>`, a single-parameter lambda header
    Lambda,
    /// `name(`, a symbol immediately followed by an argument list
    Call,
    Symbol,
    Group(Bracket),
    Abs,
}

struct Entry<K> {
    source: String,
    regex: Regex,
    kind: K,
}

/// Ordered list of anchored regular expressions tagged with a kind.
pub struct PatternRegistry<K> {
    entries: Vec<Entry<K>>,
}

impl<K: Copy> PatternRegistry<K> {
    pub fn new() -> Self {
        PatternRegistry {
            entries: Vec::new(),
        }
    }

    /// Appends a pattern. It only ever matches at the cursor.
    pub fn register(&mut self, pattern: &str, kind: K) -> Result<&mut Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})"))?;
        self.entries.push(Entry {
            source: pattern.to_string(),
            regex,
            kind,
        });
        Ok(self)
    }

    /// First pattern matching `text` at byte offset `cursor`, with the
    /// matched range in `text` coordinates.
    pub fn find(&self, text: &str, cursor: usize) -> Option<(K, Span)> {
        let haystack = text.get(cursor..)?;
        self.entries.iter().find_map(|entry| {
            entry
                .regex
                .find(haystack)
                .filter(|m| !m.is_empty())
                .map(|m| (entry.kind, Span::new(cursor + m.start(), cursor + m.end())))
        })
    }

    pub fn patterns(&self) -> impl Iterator<Item = (&str, K)> {
        self.entries.iter().map(|entry| (entry.source.as_str(), entry.kind))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Copy> Default for PatternRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// The operand and operator tables the parser consults.
pub struct Patterns {
    pub operands: PatternRegistry<NodeKind>,
    pub operators: PatternRegistry<OperatorToken>,
}

const IDENT: &str = "[A-Za-z_][A-Za-z0-9_]*";

impl Patterns {
    pub fn standard() -> Result<Self, regex::Error> {
        let mut operands = PatternRegistry::new();
        for keyword in KeywordKind::ALL {
            operands.register(&format!(r"{}\b", keyword.as_str()), NodeKind::Keyword(keyword))?;
        }
        operands
            .register(r"(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?", NodeKind::Number)?
            .register(r#"@""#, NodeKind::VerbatimString)?
            .register(r#"""#, NodeKind::String)?
            .register(&format!(r"{IDENT}\s*=>"), NodeKind::Lambda)?
            .register(&format!(r"{IDENT}\("), NodeKind::Call)?
            .register(IDENT, NodeKind::Symbol)?
            .register(r"\(", NodeKind::Group(Bracket::Paren))?
            .register(r"\[", NodeKind::Group(Bracket::Square))?
            .register(r"\{", NodeKind::Group(Bracket::Curly))?
            .register(r"\|", NodeKind::Abs)?;

        let mut operators = PatternRegistry::new();
        operators
            .register(r"\+\+", OperatorToken::Increment)?
            .register(r"--", OperatorToken::Decrement)?
            .register(r"\+=", OperatorToken::Assign(AssignOp::Add))?
            .register(r"-=", OperatorToken::Assign(AssignOp::Subtract))?
            .register(r"\*=", OperatorToken::Assign(AssignOp::Multiply))?
            .register(r"/=", OperatorToken::Assign(AssignOp::Divide))?
            .register(r"\^=", OperatorToken::Assign(AssignOp::Power))?
            .register(r"==", OperatorToken::Binary(BinOp::Equal))?
            .register(r"~=|!=", OperatorToken::Binary(BinOp::NotEqual))?
            .register(r"<=", OperatorToken::Binary(BinOp::LessEqual))?
            .register(r">=", OperatorToken::Binary(BinOp::GreaterEqual))?
            .register(r"&&", OperatorToken::Binary(BinOp::And))?
            .register(r"\|\|", OperatorToken::Binary(BinOp::Or))?
            .register(r"=>", OperatorToken::Arrow)?
            .register(r"\.\*", OperatorToken::Binary(BinOp::ElementMultiply))?
            .register(r"\./", OperatorToken::Binary(BinOp::ElementDivide))?
            .register(r"\.\^", OperatorToken::Binary(BinOp::ElementPower))?
            .register(&format!(r"\.{IDENT}"), OperatorToken::Member)?
            .register(r"\+", OperatorToken::Binary(BinOp::Add))?
            .register(r"-", OperatorToken::Binary(BinOp::Subtract))?
            .register(r"\*", OperatorToken::Binary(BinOp::Multiply))?
            .register(r"/", OperatorToken::Binary(BinOp::Divide))?
            .register(r"\\", OperatorToken::Binary(BinOp::LeftDivide))?
            .register(r"\^", OperatorToken::Binary(BinOp::Power))?
            .register(r"<", OperatorToken::Binary(BinOp::LessThan))?
            .register(r">", OperatorToken::Binary(BinOp::GreaterThan))?
            .register(r"=", OperatorToken::Assign(AssignOp::Set))?
            .register(r"'", OperatorToken::Postfix(PostfixOp::Transpose))?
            .register(r"!", OperatorToken::Postfix(PostfixOp::Factorial))?
            .register(r":", OperatorToken::Range)?
            .register(r"\|", OperatorToken::Bar)?;

        Ok(Patterns {
            operands,
            operators,
        })
    }
}

static DEFAULT_PATTERNS: LazyLock<Patterns> =
    LazyLock::new(|| Patterns::standard().expect("built-in patterns are valid regular expressions"));

/// The built-in tables, compiled once per process.
pub fn default_patterns() -> &'static Patterns {
    &DEFAULT_PATTERNS
}
