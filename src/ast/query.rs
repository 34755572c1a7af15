use crate::ast::Statement;
use crate::diagnostics::Diagnostic;
use crate::lexer::{LineIndex, Position, Span};
use crate::parser::ParseError;

/// A complete parsed query.
///
/// Parsing never stops at the first problem: every structural error is kept
/// in `diagnostics`, and a query with errors is rejected before interpretation.
#[derive(Debug, Clone)]
pub struct Query {
    source: String,
    line_index: LineIndex,

    /// Top-level statements, in source order
    pub statements: Vec<Statement>,

    /// Structural errors, in the order they were found
    pub diagnostics: Vec<ParseError>,
}

impl Query {
    pub fn new(source: String, statements: Vec<Statement>, diagnostics: Vec<ParseError>) -> Self {
        let line_index = LineIndex::new(&source);
        Query {
            source,
            line_index,
            statements,
            diagnostics,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn position(&self, offset: usize) -> Position {
        self.line_index.position(&self.source, offset)
    }

    pub fn text(&self, span: Span) -> &str {
        self.source.get(span.start..span.end).unwrap_or("")
    }

    /// Structural errors with line and column information attached.
    pub fn report(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .iter()
            .map(|error| Diagnostic::parse(error, self))
            .collect()
    }
}
