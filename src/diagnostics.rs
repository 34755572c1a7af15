//! Host-facing error reports.
//!
//! Parse errors and run-time errors both become a [`Diagnostic`]: a message,
//! the offending offset with its line and column, and the source text of the
//! node the error is attached to. Formatting beyond `Display` is left to the
//! host.

use std::fmt;

use crate::ast::Query;
use crate::evaluator::EvalError;
use crate::lexer::{Position, Span};
use crate::parser::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parse,
    Run,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub phase: Phase,
    pub message: String,
    pub span: Option<Span>,
    pub position: Option<Position>,
    /// Source text of the node the error is attached to
    pub text: String,
}

impl Diagnostic {
    pub fn parse(error: &ParseError, query: &Query) -> Self {
        Self::located(Phase::Parse, error.to_string(), Some(error.span), query)
    }

    pub fn eval(error: &EvalError, query: &Query) -> Self {
        Self::located(Phase::Run, error.kind.to_string(), error.span, query)
    }

    /// A run-time error raised outside any parsed query, e.g. a host call.
    pub fn detached(error: &EvalError) -> Self {
        Diagnostic {
            phase: Phase::Run,
            message: error.kind.to_string(),
            span: error.span,
            position: None,
            text: String::new(),
        }
    }

    fn located(phase: Phase, message: String, span: Option<Span>, query: &Query) -> Self {
        Diagnostic {
            phase,
            message,
            span,
            position: span.map(|span| query.position(span.start)),
            text: span.map(|span| query.text(span).to_string()).unwrap_or_default(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.phase {
            Phase::Parse => "syntax error",
            Phase::Run => "error",
        };
        match self.position {
            Some(position) => write!(f, "{phase} at {position}: {}", self.message),
            None => write!(f, "{phase}: {}", self.message),
        }
    }
}
