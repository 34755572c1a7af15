//! Recursive-descent expression tree builder.
//!
//! The parser walks the source with a [`Lexer`] cursor and classifies what it
//! sees through the pattern registries in [`crate::patterns`]. Brackets are
//! handled by finding the closing partner first and parsing the interior as a
//! narrowed region, so an unbalanced bracket is reported once, at its opener,
//! and the rest of the query is still scanned.
//!
//! Structural errors never abort the parse. They are collected and handed
//! back on the [`Query`].

mod brackets;
mod keywords;

use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{
    AssignOp, BinOp, Bracket, Expr, ExprKind, FunctionBody, FunctionDef, KeywordKind,
    OperatorToken, Query, Statement, StatementKind, UnaryOp,
};
use crate::lexer::{LexError, Lexer, Span, TriviaMode};
use crate::patterns::{NodeKind, Patterns, default_patterns};

pub use brackets::find_closing;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("'{0}' is never closed")]
    UnclosedBracket(char),

    #[error("unexpected closing '{0}'")]
    UnexpectedClose(char),

    #[error("'|' is never closed")]
    UnclosedAbs,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),

    #[error("unterminated block comment")]
    UnterminatedComment,

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),

    #[error("operator '{0}' has no left operand")]
    StrayOperator(String),

    #[error("expected an operand")]
    MissingOperand,

    #[error("expected ';' or an operator")]
    MissingSeparator,

    #[error("'{0}' cannot be used inside an expression")]
    UnexpectedKeyword(KeywordKind),

    #[error("blocks are only allowed where a statement is expected")]
    BlockInExpression,

    #[error("invalid assignment target")]
    InvalidAssignmentTarget,

    #[error("arguments missing for '{0}'")]
    ArgumentsMissing(KeywordKind),

    #[error("'{keyword}' expects {expected}")]
    MalformedHead {
        keyword: KeywordKind,
        expected: &'static str,
    },

    #[error("'else' without a matching 'if'")]
    MisplacedElse,

    #[error("'break' outside of a loop")]
    BreakOutsideLoop,

    #[error("function name missing")]
    MissingFunctionName,

    #[error("function arguments must be plain symbols")]
    NonSymbolArgument,

    #[error("function body must be a block")]
    FunctionBodyNotBlock,

    #[error("lambda parameters must be plain symbols")]
    MalformedLambda,

    #[error("nesting is deeper than the limit of {0}")]
    NestingTooDeep(usize),
}

impl From<LexError> for ParseError {
    fn from(error: LexError) -> Self {
        let span = error.span();
        let kind = match error {
            LexError::UnterminatedString { .. } => ParseErrorKind::UnterminatedString,
            LexError::InvalidEscape { ch, .. } => ParseErrorKind::InvalidEscape(ch),
            LexError::UnterminatedComment { .. } => ParseErrorKind::UnterminatedComment,
        };
        ParseError { kind, span }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Maximum recursion depth of statements and expressions.
    pub max_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig { max_depth: 64 }
    }
}

/// What the cursor is currently inside of, innermost last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Enclosing {
    Group(Bracket),
    Abs,
    /// Body of `while`, `do` or `for`
    Breakable,
    /// Body of a function or lambda; `break` cannot cross it
    Function,
}

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    patterns: &'static Patterns,
    config: ParserConfig,
    errors: Vec<ParseError>,
    enclosing: Vec<Enclosing>,
    depth: usize,
    /// Cursor position right after the last skipped run of trivia.
    spaced_at: Option<usize>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        Self::with_config(source, ParserConfig::default())
    }

    pub fn with_config(source: &'src str, config: ParserConfig) -> Self {
        Parser {
            lexer: Lexer::new(source),
            patterns: default_patterns(),
            config,
            errors: Vec::new(),
            enclosing: Vec::new(),
            depth: 0,
            spaced_at: None,
        }
    }

    /// Parse a complete query
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn parse_query(mut self) -> Query {
        let statements = self.parse_statements();
        debug!(
            len = self.lexer.source().len(),
            statements = statements.len(),
            errors = self.errors.len(),
            "parsed query"
        );
        Query::new(self.lexer.source().to_string(), statements, self.errors)
    }

    /// Parse a single expression spanning the whole input.
    pub fn parse(mut self) -> Result<Expr, Vec<ParseError>> {
        let expr = self.parse_expression();
        self.skip_trivia();
        if !self.lexer.is_at_end() {
            self.unexpected_leftover();
        }
        if self.errors.is_empty() {
            Ok(expr)
        } else {
            Err(self.errors)
        }
    }

    // ---------------------------------------------------------------------
    // Cursor helpers
    // ---------------------------------------------------------------------

    fn error(&mut self, kind: ParseErrorKind, span: Span) {
        trace!(%kind, start = span.start, "structural error");
        self.errors.push(ParseError { kind, span });
    }

    fn lex_error(&mut self, error: LexError) {
        let error = ParseError::from(error);
        self.error(error.kind, error.span);
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.lexer.position().max(start))
    }

    fn trivia_mode(&self) -> TriviaMode {
        for enclosing in self.enclosing.iter().rev() {
            match enclosing {
                Enclosing::Group(Bracket::Square) => return TriviaMode::Matrix,
                Enclosing::Breakable => continue,
                _ => return TriviaMode::Normal,
            }
        }
        TriviaMode::Normal
    }

    fn in_matrix(&self) -> bool {
        self.trivia_mode() == TriviaMode::Matrix
    }

    fn skip_trivia(&mut self) {
        match self.lexer.skip_trivia(self.trivia_mode()) {
            Ok(true) => self.spaced_at = Some(self.lexer.position()),
            Ok(false) => {}
            Err(error) => {
                self.spaced_at = Some(self.lexer.position());
                self.lex_error(error);
            }
        }
    }

    /// Whether trivia was skipped right in front of the cursor.
    fn space_before(&self) -> bool {
        self.spaced_at == Some(self.lexer.position())
    }

    fn descend(&mut self) -> bool {
        if self.depth >= self.config.max_depth {
            let at = self.lexer.position();
            self.error(
                ParseErrorKind::NestingTooDeep(self.config.max_depth),
                Span::new(at, self.lexer.end()),
            );
            self.lexer.set_position(self.lexer.end());
            return false;
        }
        self.depth += 1;
        true
    }

    fn ascend(&mut self) {
        self.ascend_by(1);
    }

    /// Left-folding loops charge one level per operator they fold, since
    /// each one nests the tree built so far one level deeper.
    fn ascend_by(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    fn nested(&mut self, parse: fn(&mut Self) -> Expr) -> Expr {
        if !self.descend() {
            return Expr::invalid(Span::point(self.lexer.position()));
        }
        let expr = parse(self);
        self.ascend();
        expr
    }

    fn at_keyword(&self, kind: KeywordKind) -> bool {
        matches!(
            self.patterns.operands.find(self.lexer.bounded(), self.lexer.position()),
            Some((NodeKind::Keyword(found), _)) if found == kind
        )
    }

    fn unexpected_char(&mut self) {
        let at = self.lexer.position();
        if let Some(ch) = self.lexer.current_char() {
            let kind = if Bracket::from_close(ch).is_some() {
                ParseErrorKind::UnexpectedClose(ch)
            } else {
                ParseErrorKind::UnexpectedCharacter(ch)
            };
            self.error(kind, Span::new(at, at + ch.len_utf8()));
            self.lexer.advance();
        }
    }

    /// Reports the first thing left over in a region and skips the rest.
    fn unexpected_leftover(&mut self) {
        let at = self.lexer.position();
        match self.patterns.operators.find(self.lexer.bounded(), at) {
            Some((_, span)) => {
                let text = self.lexer.source()[span.start..span.end].to_string();
                self.error(ParseErrorKind::StrayOperator(text), span);
            }
            None => match self.lexer.current_char() {
                Some(',') => self.error(ParseErrorKind::UnexpectedCharacter(','), Span::new(at, at + 1)),
                Some(_) => self.error(ParseErrorKind::MissingSeparator, Span::point(at)),
                None => {}
            },
        }
        self.lexer.set_position(self.lexer.end());
    }

    /// Parses the interior of the bracket under the cursor as its own region
    /// and leaves the cursor after the closing bracket.
    fn parse_region<T>(&mut self, bracket: Bracket, inner: impl FnOnce(&mut Self) -> T) -> T {
        let open = self.lexer.position();
        let close = find_closing(self.lexer.source(), open, self.lexer.end(), bracket);
        self.lexer.advance();
        self.enclosing.push(Enclosing::Group(bracket));

        let value = match close {
            Some(close) => {
                let outer = self.lexer.set_end(close);
                let value = inner(self);
                self.skip_trivia();
                if !self.lexer.is_at_end() {
                    self.unexpected_leftover();
                }
                self.lexer.set_end(outer);
                self.lexer.set_position(close + 1);
                value
            }
            None => {
                self.error(
                    ParseErrorKind::UnclosedBracket(bracket.open()),
                    Span::new(open, open + 1),
                );
                let value = inner(self);
                self.lexer.set_position(self.lexer.end());
                value
            }
        };

        self.enclosing.pop();
        value
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn parse_statements(&mut self) -> Vec<Statement> {
        let mut statements = Vec::new();
        loop {
            self.skip_trivia();
            if self.lexer.is_at_end() {
                break;
            }
            let before = self.lexer.position();
            let statement = self.parse_statement();
            if !statement.is_empty() {
                statements.push(statement);
            }
            if self.lexer.position() == before {
                self.unexpected_char();
            }
        }
        statements
    }

    fn parse_statement(&mut self) -> Statement {
        if !self.descend() {
            return Statement::empty(Span::point(self.lexer.position()));
        }
        let statement = self.parse_statement_inner();
        self.ascend();
        statement
    }

    fn parse_statement_inner(&mut self) -> Statement {
        self.skip_trivia();
        let start = self.lexer.position();
        if self.lexer.is_at_end() {
            return Statement::empty(Span::point(start));
        }
        if self.lexer.eat(';') {
            return Statement::empty(self.span_from(start));
        }

        match self.patterns.operands.find(self.lexer.bounded(), start) {
            Some((NodeKind::Keyword(kind), span)) => self.scan_keyword(kind, span),
            Some((NodeKind::Group(Bracket::Curly), _)) => {
                let statements = self.parse_region(Bracket::Curly, Self::parse_statements);
                Statement::new(StatementKind::Block(statements), false, self.span_from(start))
            }
            _ => {
                let expr = self.parse_expression();
                let muted = self.finish_statement();
                Statement::new(StatementKind::Expression(expr), muted, self.span_from(start))
            }
        }
    }

    /// Consumes the terminator of a simple statement. Returns whether it was
    /// muted by `;`.
    fn finish_statement(&mut self) -> bool {
        self.skip_trivia();
        if self.lexer.eat(';') {
            return true;
        }
        if self.lexer.current_char().and_then(Bracket::from_close).is_some() {
            self.unexpected_char();
            return false;
        }
        if !self.lexer.is_at_end() && !self.at_keyword(KeywordKind::Else) {
            let at = self.lexer.position();
            self.error(ParseErrorKind::MissingSeparator, Span::point(at));
        }
        false
    }

    // ---------------------------------------------------------------------
    // Expressions, lowest precedence first
    // ---------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> Expr {
        self.nested(Self::parse_assignment)
    }

    fn peek_operator(&mut self) -> Option<(OperatorToken, Span)> {
        self.skip_trivia();
        if self.lexer.is_at_end() {
            return None;
        }
        if self.in_matrix() && self.space_before() && self.signed_operand_follows() {
            return None;
        }
        self.patterns
            .operators
            .find(self.lexer.bounded(), self.lexer.position())
    }

    /// Inside a matrix, `[a -b]` has two columns while `[a - b]` has one.
    fn signed_operand_follows(&self) -> bool {
        let mut chars = self.lexer.rest().chars();
        match (chars.next(), chars.next()) {
            (Some('+' | '-'), Some(next)) => {
                !next.is_whitespace() && !matches!(next, '=' | '+' | '-')
            }
            (Some('~' | '!'), next) => next != Some('='),
            _ => false,
        }
    }

    fn parse_assignment(&mut self) -> Expr {
        let target = self.parse_or();
        match self.peek_operator() {
            Some((OperatorToken::Assign(op), span)) => {
                self.lexer.set_position(span.end);
                if !crate::assign::is_assignable(&target) {
                    self.error(ParseErrorKind::InvalidAssignmentTarget, target.span);
                }
                let value = self.parse_expression();
                let span = target.span.to(value.span);
                Expr::new(
                    ExprKind::Assign {
                        op,
                        target: Box::new(target),
                        value: Box::new(value),
                    },
                    span,
                )
            }
            _ => target,
        }
    }

    fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        let span = left.span.to(right.span);
        Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        )
    }

    fn parse_or(&mut self) -> Expr {
        let mut left = self.parse_and();
        let mut folded = 0;
        while let Some((OperatorToken::Binary(BinOp::Or), span)) = self.peek_operator() {
            if !self.descend() {
                break;
            }
            folded += 1;
            self.lexer.set_position(span.end);
            let right = self.parse_and();
            left = Self::binary(BinOp::Or, left, right);
        }
        self.ascend_by(folded);
        left
    }

    fn parse_and(&mut self) -> Expr {
        let mut left = self.parse_comparison();
        let mut folded = 0;
        while let Some((OperatorToken::Binary(BinOp::And), span)) = self.peek_operator() {
            if !self.descend() {
                break;
            }
            folded += 1;
            self.lexer.set_position(span.end);
            let right = self.parse_comparison();
            left = Self::binary(BinOp::And, left, right);
        }
        self.ascend_by(folded);
        left
    }

    fn parse_comparison(&mut self) -> Expr {
        let mut left = self.parse_range();
        let mut folded = 0;
        loop {
            let (op, span) = match self.peek_operator() {
                Some((OperatorToken::Binary(op), span)) if op.is_comparison() => (op, span),
                _ => break,
            };
            if !self.descend() {
                break;
            }
            folded += 1;
            self.lexer.set_position(span.end);
            let right = self.parse_range();
            left = Self::binary(op, left, right);
        }
        self.ascend_by(folded);
        left
    }

    fn parse_range(&mut self) -> Expr {
        let start = self.parse_additive();
        if !self.eat_range() {
            return start;
        }
        let second = self.parse_additive();
        let (step, end) = if self.eat_range() {
            (Some(Box::new(second)), self.parse_additive())
        } else {
            (None, second)
        };
        let span = start.span.to(end.span);
        Expr::new(
            ExprKind::Range {
                start: Box::new(start),
                step,
                end: Box::new(end),
            },
            span,
        )
    }

    fn eat_range(&mut self) -> bool {
        match self.peek_operator() {
            Some((OperatorToken::Range, span)) => {
                self.lexer.set_position(span.end);
                true
            }
            _ => false,
        }
    }

    fn parse_additive(&mut self) -> Expr {
        let mut left = self.parse_multiplicative();
        let mut folded = 0;
        loop {
            let (op, end) = match self.peek_operator() {
                Some((OperatorToken::Binary(op @ (BinOp::Add | BinOp::Subtract)), span)) => {
                    (op, span.end)
                }
                // `a++b` and `a--b` are `a + +b` and `a - -b` here
                Some((OperatorToken::Increment, span)) => (BinOp::Add, span.start + 1),
                Some((OperatorToken::Decrement, span)) => (BinOp::Subtract, span.start + 1),
                _ => break,
            };
            if !self.descend() {
                break;
            }
            folded += 1;
            self.lexer.set_position(end);
            let right = self.parse_multiplicative();
            left = Self::binary(op, left, right);
        }
        self.ascend_by(folded);
        left
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut left = self.parse_unary();
        let mut folded = 0;
        loop {
            let (op, span) = match self.peek_operator() {
                Some((
                    OperatorToken::Binary(
                        op @ (BinOp::Multiply
                        | BinOp::Divide
                        | BinOp::LeftDivide
                        | BinOp::ElementMultiply
                        | BinOp::ElementDivide),
                    ),
                    span,
                )) => (op, span),
                _ => break,
            };
            if !self.descend() {
                break;
            }
            folded += 1;
            self.lexer.set_position(span.end);
            let right = self.parse_unary();
            left = Self::binary(op, left, right);
        }
        self.ascend_by(folded);
        left
    }

    /// Prefix operators. A run of `+`/`-` folds into at most one negation.
    fn parse_unary(&mut self) -> Expr {
        self.skip_trivia();
        let start = self.lexer.position();
        match self.lexer.current_char() {
            Some('+' | '-') => {
                let mut negative = false;
                while let Some(sign @ ('+' | '-')) = self.lexer.current_char() {
                    if self.lexer.peek_char(1) == Some('=') {
                        break;
                    }
                    negative ^= sign == '-';
                    self.lexer.advance();
                    self.skip_trivia();
                }
                let operand = self.nested(Self::parse_unary);
                if negative {
                    let span = self.span_from(start).to(operand.span);
                    Expr::new(
                        ExprKind::Unary {
                            op: UnaryOp::Negate,
                            operand: Box::new(operand),
                        },
                        span,
                    )
                } else {
                    operand
                }
            }
            Some('~' | '!') if self.lexer.peek_char(1) != Some('=') => {
                self.lexer.advance();
                let operand = self.nested(Self::parse_unary);
                let span = self.span_from(start).to(operand.span);
                Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    span,
                )
            }
            _ => self.parse_power(),
        }
    }

    /// `^` binds tighter than prefix minus and is right-associative.
    fn parse_power(&mut self) -> Expr {
        let base = self.parse_postfix();
        match self.peek_operator() {
            Some((OperatorToken::Binary(op @ (BinOp::Power | BinOp::ElementPower)), span)) => {
                self.lexer.set_position(span.end);
                let exponent = self.nested(Self::parse_unary);
                Self::binary(op, base, exponent)
            }
            _ => base,
        }
    }

    /// Calls, indexing, member access and postfix operators. All of them
    /// attach only when written right after their operand.
    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        let mut folded = 0;
        loop {
            if expr.is_invalid() {
                break;
            }
            let at = self.lexer.position();
            if self.lexer.current_char() == Some('(') {
                if !self.descend() {
                    break;
                }
                folded += 1;
                let args = self.parse_region(Bracket::Paren, Self::parse_arguments);
                let span = expr.span.to(self.span_from(at));
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    span,
                );
                continue;
            }

            let Some((token, span)) = self.patterns.operators.find(self.lexer.bounded(), at) else {
                break;
            };
            let folds = match token {
                OperatorToken::Postfix(_) | OperatorToken::Member => true,
                OperatorToken::Increment | OperatorToken::Decrement => {
                    crate::assign::is_assignable(&expr) && !self.operand_starts_at(span.end)
                }
                _ => false,
            };
            if folds {
                if !self.descend() {
                    break;
                }
                folded += 1;
            }
            match token {
                OperatorToken::Postfix(op) => {
                    self.lexer.set_position(span.end);
                    let span = expr.span.to(span);
                    expr = Expr::new(
                        ExprKind::Postfix {
                            op,
                            operand: Box::new(expr),
                        },
                        span,
                    );
                }
                OperatorToken::Member => {
                    self.lexer.set_position(span.end);
                    let name = self.lexer.source()[span.start + 1..span.end].to_string();
                    let span = expr.span.to(span);
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            name,
                        },
                        span,
                    );
                }
                OperatorToken::Increment | OperatorToken::Decrement
                    if crate::assign::is_assignable(&expr) && !self.operand_starts_at(span.end) =>
                {
                    self.lexer.set_position(span.end);
                    let op = if token == OperatorToken::Increment {
                        AssignOp::Add
                    } else {
                        AssignOp::Subtract
                    };
                    let full = expr.span.to(span);
                    expr = Expr::new(
                        ExprKind::Assign {
                            op,
                            target: Box::new(expr),
                            value: Box::new(Expr::new(ExprKind::Number(1.0), span)),
                        },
                        full,
                    );
                }
                _ => break,
            }
        }
        self.ascend_by(folded);
        expr
    }

    fn operand_starts_at(&self, at: usize) -> bool {
        self.lexer.bounded()[at..]
            .chars()
            .next()
            .is_some_and(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '(' | '[' | '"' | '@' | '.'))
    }

    fn parse_arguments(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        self.skip_trivia();
        if self.lexer.is_at_end() {
            return args;
        }
        loop {
            args.push(self.parse_expression());
            self.skip_trivia();
            if !self.lexer.eat(',') {
                break;
            }
        }
        args
    }

    fn parse_primary(&mut self) -> Expr {
        self.skip_trivia();
        let start = self.lexer.position();
        match self.lexer.current_char() {
            None | Some(';' | ',') => {
                self.error(ParseErrorKind::MissingOperand, Span::point(start));
                return Expr::invalid(Span::point(start));
            }
            Some('\n') if self.in_matrix() => {
                self.error(ParseErrorKind::MissingOperand, Span::point(start));
                return Expr::invalid(Span::point(start));
            }
            _ => {}
        }

        let Some((kind, span)) = self.patterns.operands.find(self.lexer.bounded(), start) else {
            return self.parse_unrecognised(start);
        };

        match kind {
            NodeKind::Number => {
                let text = &self.lexer.source()[span.start..span.end];
                self.lexer.set_position(span.end);
                match text.parse::<f64>() {
                    Ok(n) => Expr::new(ExprKind::Number(n), span),
                    Err(_) => {
                        self.error(ParseErrorKind::InvalidNumber(text.to_string()), span);
                        Expr::invalid(span)
                    }
                }
            }
            NodeKind::String => {
                let mut problems = Vec::new();
                let result = self.lexer.read_string(&mut problems);
                self.finish_string(result, problems, start)
            }
            NodeKind::VerbatimString => {
                let result = self.lexer.read_verbatim_string();
                self.finish_string(result, Vec::new(), start)
            }
            NodeKind::Lambda => {
                let name = self.lexer.read_identifier().to_string();
                self.lexer.set_position(span.end);
                self.parse_lambda_body(vec![name], start)
            }
            NodeKind::Call | NodeKind::Symbol => {
                let name = self.lexer.read_identifier();
                Expr::new(ExprKind::Symbol(name.to_string()), self.span_from(start))
            }
            NodeKind::Group(Bracket::Paren) => self.parse_group(start),
            NodeKind::Group(Bracket::Square) => {
                let rows = self.parse_region(Bracket::Square, Self::parse_matrix_rows);
                Expr::new(ExprKind::Matrix(rows), self.span_from(start))
            }
            NodeKind::Group(Bracket::Curly) => {
                self.error(ParseErrorKind::BlockInExpression, Span::new(start, start + 1));
                self.parse_region(Bracket::Curly, Self::parse_statements);
                Expr::invalid(self.span_from(start))
            }
            NodeKind::Abs => self.parse_abs(start),
            NodeKind::Keyword(keyword) => {
                self.error(ParseErrorKind::UnexpectedKeyword(keyword), span);
                self.lexer.set_position(span.end);
                Expr::invalid(span)
            }
        }
    }

    fn parse_unrecognised(&mut self, start: usize) -> Expr {
        if let Some((_, span)) = self.patterns.operators.find(self.lexer.bounded(), start) {
            let text = self.lexer.source()[span.start..span.end].to_string();
            self.error(ParseErrorKind::StrayOperator(text), span);
            self.lexer.set_position(span.end);
            self.skip_trivia();
            return match self.lexer.current_char() {
                None | Some(';' | ',') => Expr::invalid(span),
                _ => self.nested(Self::parse_unary),
            };
        }
        self.unexpected_char();
        Expr::invalid(self.span_from(start))
    }

    fn finish_string(
        &mut self,
        result: Result<String, LexError>,
        problems: Vec<LexError>,
        start: usize,
    ) -> Expr {
        for problem in problems {
            self.lex_error(problem);
        }
        match result {
            Ok(text) => Expr::new(ExprKind::String(text), self.span_from(start)),
            Err(error) => {
                self.lex_error(error);
                Expr::invalid(self.span_from(start))
            }
        }
    }

    /// `( ... )`: a group, `()`, or the parameter list of a lambda when `=>`
    /// follows the closing paren.
    fn parse_group(&mut self, start: usize) -> Expr {
        let close = find_closing(self.lexer.source(), start, self.lexer.end(), Bracket::Paren);
        if let Some(close) = close
            && self.arrow_follows(close + 1)
        {
            let params = self.parse_region(Bracket::Paren, |p| {
                p.parse_parameters(ParseErrorKind::MalformedLambda)
            });
            self.skip_trivia();
            let arrow = self.lexer.position();
            self.lexer.set_position(arrow + 2);
            return self.parse_lambda_body(params, start);
        }

        let inner = self.parse_region(Bracket::Paren, |p| {
            p.skip_trivia();
            (!p.lexer.is_at_end()).then(|| p.parse_expression())
        });
        let span = self.span_from(start);
        match inner {
            Some(expr) => Expr::new(ExprKind::Group(Box::new(expr)), span),
            None => Expr::new(ExprKind::EmptyGroup, span),
        }
    }

    fn arrow_follows(&self, at: usize) -> bool {
        let mut ahead = self.lexer.clone();
        ahead.set_position(at);
        ahead.skip_trivia(TriviaMode::Normal).is_ok() && ahead.starts_with("=>")
    }

    /// Comma-separated plain symbols; anything else is reported as `invalid`.
    fn parse_parameters(&mut self, invalid: ParseErrorKind) -> Vec<String> {
        let mut params = Vec::new();
        loop {
            self.skip_trivia();
            if self.lexer.is_at_end() {
                break;
            }
            let at = self.lexer.position();
            match self.patterns.operands.find(self.lexer.bounded(), at) {
                Some((NodeKind::Symbol, _)) => {
                    params.push(self.lexer.read_identifier().to_string());
                }
                _ => {
                    self.error(invalid.clone(), Span::new(at, self.lexer.end()));
                    self.lexer.set_position(self.lexer.end());
                    break;
                }
            }
            self.skip_trivia();
            if self.lexer.is_at_end() {
                break;
            }
            if !self.lexer.eat(',') {
                let at = self.lexer.position();
                self.error(invalid.clone(), Span::new(at, self.lexer.end()));
                self.lexer.set_position(self.lexer.end());
                break;
            }
        }
        params
    }

    fn parse_lambda_body(&mut self, params: Vec<String>, start: usize) -> Expr {
        self.skip_trivia();
        self.enclosing.push(Enclosing::Function);
        let body = if self.lexer.current_char() == Some('{') {
            FunctionBody::Block(self.parse_region(Bracket::Curly, Self::parse_statements))
        } else {
            FunctionBody::Expression(Box::new(self.parse_expression()))
        };
        self.enclosing.pop();

        let span = self.span_from(start);
        let def = FunctionDef {
            name: None,
            params,
            body,
            span,
        };
        Expr::new(ExprKind::Lambda(Rc::new(def)), span)
    }

    /// Rows of a matrix literal. Columns are split by `,` or by whitespace in
    /// front of a new operand; rows by `;` or a newline.
    fn parse_matrix_rows(&mut self) -> Vec<Vec<Expr>> {
        let mut rows = Vec::new();
        let mut row = Vec::new();
        let mut after_comma = false;

        loop {
            self.skip_trivia();
            let at = self.lexer.position();
            match self.lexer.current_char() {
                None => break,
                Some('\n' | ';') => {
                    if after_comma {
                        self.error(ParseErrorKind::MissingOperand, Span::point(at));
                        after_comma = false;
                    }
                    self.lexer.advance();
                    if !row.is_empty() {
                        rows.push(std::mem::take(&mut row));
                    }
                    continue;
                }
                Some(',') => {
                    if row.is_empty() || after_comma {
                        self.error(ParseErrorKind::MissingOperand, Span::point(at));
                    }
                    self.lexer.advance();
                    after_comma = true;
                    continue;
                }
                _ => {}
            }

            row.push(self.parse_expression());
            after_comma = false;

            self.skip_trivia();
            match self.lexer.current_char() {
                None | Some('\n' | ';' | ',') => {}
                Some(_) if self.space_before() => {}
                Some(_) => {
                    let at = self.lexer.position();
                    self.error(ParseErrorKind::MissingSeparator, Span::point(at));
                    self.lexer.advance();
                }
            }
        }

        if after_comma {
            let at = self.lexer.position();
            self.error(ParseErrorKind::MissingOperand, Span::point(at));
        }
        if !row.is_empty() {
            rows.push(row);
        }
        rows
    }

    fn parse_abs(&mut self, start: usize) -> Expr {
        self.lexer.advance();
        self.enclosing.push(Enclosing::Abs);
        let inner = self.parse_expression();
        self.enclosing.pop();

        self.skip_trivia();
        if self.lexer.current_char() == Some('|') {
            self.lexer.advance();
        } else {
            self.error(ParseErrorKind::UnclosedAbs, Span::new(start, start + 1));
        }
        Expr::new(ExprKind::Abs(Box::new(inner)), self.span_from(start))
    }
}
