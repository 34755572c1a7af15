//! Keyword scanners. Each one is entered with the cursor right after the
//! keyword and consumes the head and body of its construct.

use std::rc::Rc;

use crate::ast::{
    AssignOp, Bracket, Expr, FunctionBody, FunctionDef, Keyword, KeywordKind, OperatorToken,
    Statement, StatementKind,
};
use crate::lexer::Span;
use crate::patterns::NodeKind;

use super::{Enclosing, ParseErrorKind, Parser};

type ForHead = (Option<Expr>, Option<Expr>, Option<Expr>);

impl<'src> Parser<'src> {
    pub(super) fn scan_keyword(&mut self, kind: KeywordKind, keyword: Span) -> Statement {
        let start = keyword.start;
        self.lexer.set_position(keyword.end);

        let (construct, muted) = match kind {
            KeywordKind::If => (self.scan_if(), false),
            KeywordKind::Else => {
                self.error(ParseErrorKind::MisplacedElse, keyword);
                let body = Box::new(self.parse_statement());
                (Keyword::Else { body }, false)
            }
            KeywordKind::While => (self.scan_while(), false),
            KeywordKind::Do => (self.scan_do(), false),
            KeywordKind::For => (self.scan_for(), false),
            KeywordKind::Function => (self.scan_function(start), false),
            KeywordKind::Let => {
                let construct = self.scan_let();
                (construct, self.finish_statement())
            }
            KeywordKind::Return => {
                let construct = self.scan_return();
                self.finish_statement();
                (construct, false)
            }
            KeywordKind::Break => {
                if !self.inside_loop() {
                    self.error(ParseErrorKind::BreakOutsideLoop, keyword);
                }
                (Keyword::Break, self.finish_statement())
            }
        };

        Statement::new(StatementKind::Keyword(construct), muted, self.span_from(start))
    }

    fn inside_loop(&self) -> bool {
        for enclosing in self.enclosing.iter().rev() {
            match enclosing {
                Enclosing::Breakable => return true,
                Enclosing::Function => return false,
                _ => {}
            }
        }
        false
    }

    /// `( expr )` after `if` and `while`.
    fn scan_condition(&mut self, keyword: KeywordKind) -> Expr {
        self.skip_trivia();
        let at = self.lexer.position();
        if self.lexer.current_char() != Some('(') {
            self.error(ParseErrorKind::ArgumentsMissing(keyword), Span::point(at));
            return Expr::invalid(Span::point(at));
        }

        let condition = self.parse_region(Bracket::Paren, |p| {
            p.skip_trivia();
            (!p.lexer.is_at_end()).then(|| p.parse_expression())
        });
        match condition {
            Some(condition) => condition,
            None => {
                let span = self.span_from(at);
                self.error(ParseErrorKind::ArgumentsMissing(keyword), span);
                Expr::invalid(span)
            }
        }
    }

    fn scan_loop_body(&mut self) -> Statement {
        self.enclosing.push(Enclosing::Breakable);
        let body = self.parse_statement();
        self.enclosing.pop();
        body
    }

    fn scan_if(&mut self) -> Keyword {
        let condition = self.scan_condition(KeywordKind::If);
        let body = Box::new(self.parse_statement());
        let alternate = self.scan_else().map(Box::new);
        Keyword::If {
            condition,
            body,
            alternate,
        }
    }

    /// An `else` directly after an `if` body belongs to that `if`.
    fn scan_else(&mut self) -> Option<Statement> {
        self.skip_trivia();
        let at = self.lexer.position();
        let Some((NodeKind::Keyword(KeywordKind::Else), span)) =
            self.patterns.operands.find(self.lexer.bounded(), at)
        else {
            return None;
        };
        self.lexer.set_position(span.end);
        let body = Box::new(self.parse_statement());
        Some(Statement::new(
            StatementKind::Keyword(Keyword::Else { body }),
            false,
            self.span_from(at),
        ))
    }

    fn scan_while(&mut self) -> Keyword {
        let condition = self.scan_condition(KeywordKind::While);
        let body = Box::new(self.scan_loop_body());
        Keyword::While { condition, body }
    }

    fn scan_do(&mut self) -> Keyword {
        let body = Box::new(self.scan_loop_body());
        let condition = self.scan_do_condition();
        Keyword::Do { body, condition }
    }

    /// The trailing `while (cond)` of a `do`. A `while` that has a body of
    /// its own is a separate loop, so the scan backs out.
    fn scan_do_condition(&mut self) -> Option<Expr> {
        let (position, errors) = (self.lexer.position(), self.errors.len());
        self.skip_trivia();
        let at = self.lexer.position();
        match self.patterns.operands.find(self.lexer.bounded(), at) {
            Some((NodeKind::Keyword(KeywordKind::While), span)) => {
                self.lexer.set_position(span.end);
            }
            _ => {
                self.lexer.set_position(position);
                return None;
            }
        }

        let condition = self.scan_condition(KeywordKind::While);
        self.skip_trivia();
        if self.lexer.is_at_end() || self.lexer.eat(';') {
            return Some(condition);
        }

        self.lexer.set_position(position);
        self.errors.truncate(errors);
        None
    }

    fn scan_for(&mut self) -> Keyword {
        self.skip_trivia();
        let at = self.lexer.position();
        let head = if self.lexer.current_char() == Some('(') {
            self.parse_region(Bracket::Paren, Self::scan_for_head)
        } else {
            self.error(ParseErrorKind::ArgumentsMissing(KeywordKind::For), Span::point(at));
            None
        };
        let body = Box::new(self.scan_loop_body());
        let (init, condition, step) = head.unwrap_or((None, None, None));
        Keyword::For {
            init,
            condition,
            step,
            body,
        }
    }

    fn scan_for_head(&mut self) -> Option<ForHead> {
        self.skip_trivia();
        if self.lexer.is_at_end() {
            let at = self.lexer.position();
            self.error(ParseErrorKind::ArgumentsMissing(KeywordKind::For), Span::point(at));
            return None;
        }

        let init = self.scan_for_clause();
        self.expect_for_separator()?;
        let condition = self.scan_for_clause();
        self.expect_for_separator()?;
        let step = self.scan_for_clause();

        self.skip_trivia();
        if !self.lexer.is_at_end() {
            self.malformed_for_head();
            return None;
        }
        Some((init, condition, step))
    }

    fn scan_for_clause(&mut self) -> Option<Expr> {
        self.skip_trivia();
        match self.lexer.current_char() {
            None | Some(';') => None,
            Some(_) => Some(self.parse_expression()),
        }
    }

    fn expect_for_separator(&mut self) -> Option<()> {
        self.skip_trivia();
        if self.lexer.eat(';') {
            return Some(());
        }
        self.malformed_for_head();
        None
    }

    fn malformed_for_head(&mut self) {
        let at = self.lexer.position();
        self.error(
            ParseErrorKind::MalformedHead {
                keyword: KeywordKind::For,
                expected: "three clauses separated by ';'",
            },
            Span::new(at, self.lexer.end()),
        );
        self.lexer.set_position(self.lexer.end());
    }

    /// `function name(a, b) { ... }`
    fn scan_function(&mut self, start: usize) -> Keyword {
        self.skip_trivia();
        let at = self.lexer.position();
        let name = match self.patterns.operands.find(self.lexer.bounded(), at) {
            Some((NodeKind::Symbol | NodeKind::Call, _)) => {
                Some(self.lexer.read_identifier().to_string())
            }
            _ => {
                self.error(ParseErrorKind::MissingFunctionName, Span::point(at));
                None
            }
        };

        self.skip_trivia();
        let params = if self.lexer.current_char() == Some('(') {
            self.parse_region(Bracket::Paren, |p| {
                p.parse_parameters(ParseErrorKind::NonSymbolArgument)
            })
        } else {
            let at = self.lexer.position();
            self.error(
                ParseErrorKind::ArgumentsMissing(KeywordKind::Function),
                Span::point(at),
            );
            Vec::new()
        };

        self.skip_trivia();
        self.enclosing.push(Enclosing::Function);
        let body = if self.lexer.current_char() == Some('{') {
            self.parse_region(Bracket::Curly, Self::parse_statements)
        } else {
            let at = self.lexer.position();
            self.error(ParseErrorKind::FunctionBodyNotBlock, Span::point(at));
            vec![self.parse_statement()]
        };
        self.enclosing.pop();

        Keyword::Function(Rc::new(FunctionDef {
            name,
            params,
            body: FunctionBody::Block(body),
            span: self.span_from(start),
        }))
    }

    /// `let name` or `let name = value`
    fn scan_let(&mut self) -> Keyword {
        self.skip_trivia();
        let at = self.lexer.position();
        let name = match self.patterns.operands.find(self.lexer.bounded(), at) {
            Some((NodeKind::Symbol, _)) => self.lexer.read_identifier().to_string(),
            _ => {
                self.error(
                    ParseErrorKind::MalformedHead {
                        keyword: KeywordKind::Let,
                        expected: "a variable name",
                    },
                    Span::point(at),
                );
                String::new()
            }
        };

        let value = match self.peek_operator() {
            Some((OperatorToken::Assign(AssignOp::Set), span)) => {
                self.lexer.set_position(span.end);
                Some(self.parse_expression())
            }
            _ => None,
        };
        Keyword::Let { name, value }
    }

    fn scan_return(&mut self) -> Keyword {
        self.skip_trivia();
        match self.lexer.current_char() {
            None | Some(';') => Keyword::Return(None),
            Some(_) if self.at_keyword(KeywordKind::Else) => Keyword::Return(None),
            Some(_) => Keyword::Return(Some(self.parse_expression())),
        }
    }
}
