//! Character cursor over query source.
//!
//! The lexer does not produce a token stream. The parser drives it directly,
//! asking for trivia to be skipped, literals to be read and the cursor to be
//! moved past whatever the pattern registry matched. Every cursor works on a
//! bounded region `[position, end)` so bracketed sub-expressions can be parsed
//! with a narrowed view of the same source.

use std::fmt;

/// Byte range into the query source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn point(at: usize) -> Self {
        Span { start: at, end: at }
    }

    /// Smallest span covering both.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Human-facing location: character offset plus 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Byte offsets of line starts, for turning spans into positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        LineIndex { line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn position(&self, source: &str, byte: usize) -> Position {
        let mut byte = byte.min(source.len());
        while !source.is_char_boundary(byte) {
            byte -= 1;
        }
        let line = match self.line_starts.binary_search(&byte) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        };
        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        Position {
            offset: source[..byte].chars().count(),
            line: line + 1,
            column: source[line_start..byte].chars().count() + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("unterminated string literal")]
    UnterminatedString { start: usize },

    #[error("invalid escape sequence '\\{ch}'")]
    InvalidEscape { at: usize, ch: char },

    #[error("unterminated block comment")]
    UnterminatedComment { start: usize },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnterminatedString { start } | LexError::UnterminatedComment { start } => {
                Span::new(*start, start + 1)
            }
            LexError::InvalidEscape { at, ch } => Span::new(*at, at + 1 + ch.len_utf8()),
        }
    }
}

/// How line breaks are treated while skipping trivia.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriviaMode {
    /// Newlines are plain whitespace.
    Normal,
    /// Newlines end a matrix row, so skipping stops in front of them.
    Matrix,
}

#[derive(Debug, Clone)]
pub struct Lexer<'src> {
    source: &'src str,
    position: usize,
    end: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer {
            source,
            position: 0,
            end: source.len(),
        }
    }

    pub fn source(&self) -> &'src str {
        self.source
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.end);
    }

    /// Narrows (or restores) the region end, returning the previous one.
    pub fn set_end(&mut self, end: usize) -> usize {
        let previous = self.end;
        self.end = end.min(self.source.len());
        if self.position > self.end {
            self.position = self.end;
        }
        previous
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.end
    }

    /// Text from the cursor to the region end.
    pub fn rest(&self) -> &'src str {
        &self.source[self.position..self.end]
    }

    /// Source text up to the region end; patterns are matched against this.
    pub fn bounded(&self) -> &'src str {
        &self.source[..self.end]
    }

    pub fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn peek_char(&self, offset: usize) -> Option<char> {
        self.rest().chars().nth(offset)
    }

    pub fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.position += ch.len_utf8();
        }
    }

    pub fn eat(&mut self, expected: char) -> bool {
        if self.current_char() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn starts_with(&self, text: &str) -> bool {
        self.rest().starts_with(text)
    }

    /// Skips whitespace and comments. Returns true when anything was skipped.
    pub fn skip_trivia(&mut self, mode: TriviaMode) -> Result<bool, LexError> {
        let start = self.position;
        while let Some(ch) = self.current_char() {
            match ch {
                '\n' if mode == TriviaMode::Matrix => break,
                c if c.is_whitespace() => self.advance(),
                '/' if self.peek_char(1) == Some('/') => {
                    while let Some(c) = self.current_char() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                '/' if self.peek_char(1) == Some('*') => {
                    let open = self.position;
                    match self.rest()[2..].find("*/") {
                        Some(close) => self.position += 2 + close + 2,
                        None => {
                            self.position = self.end;
                            return Err(LexError::UnterminatedComment { start: open });
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(self.position > start)
    }

    pub fn read_identifier(&mut self) -> &'src str {
        let start = self.position;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        &self.source[start..self.position]
    }

    /// Reads a double-quoted string with backslash escapes. Bad escapes are
    /// reported through `problems` and kept verbatim so scanning can go on.
    pub fn read_string(&mut self, problems: &mut Vec<LexError>) -> Result<String, LexError> {
        let start = self.position;
        let mut result = String::new();
        self.advance();

        while let Some(ch) = self.current_char() {
            match ch {
                '"' => {
                    self.advance();
                    return Ok(result);
                }
                '\\' => {
                    let at = self.position;
                    self.advance();
                    match self.current_char() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some('r') => result.push('\r'),
                        Some('0') => result.push('\0'),
                        Some('"') => result.push('"'),
                        Some('\\') => result.push('\\'),
                        Some(other) => {
                            problems.push(LexError::InvalidEscape { at, ch: other });
                            result.push(other);
                        }
                        None => break,
                    }
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        self.position = self.end;
        Err(LexError::UnterminatedString { start })
    }

    /// Reads `@"..."`, where `""` stands for one quote and nothing else is special.
    pub fn read_verbatim_string(&mut self) -> Result<String, LexError> {
        let start = self.position;
        let mut result = String::new();
        self.advance();
        self.advance();

        while let Some(ch) = self.current_char() {
            self.advance();
            if ch == '"' {
                if self.current_char() == Some('"') {
                    result.push('"');
                    self.advance();
                } else {
                    return Ok(result);
                }
            } else {
                result.push(ch);
            }
        }

        self.position = self.end;
        Err(LexError::UnterminatedString { start })
    }
}
