//! Lexer for `{% if %}` conditions.
//!
//! Tokenizes the small boolean language used in conditions. No host
//! evaluation is involved: the token set is closed and every token is
//! produced by hand here.
//!
//! # Examples
//!
//! ```
//! use weave_parser::expr_lexer::{ExprLexer, TokenKind};
//!
//! let tokens = ExprLexer::tokenize("age >= 18").unwrap();
//! assert_eq!(tokens[0].kind, TokenKind::Identifier);
//! assert_eq!(tokens[1].kind, TokenKind::Gte);
//! assert_eq!(tokens[2].kind, TokenKind::Number);
//! ```

use crate::ast::ExprSpan;
use crate::ExprError;

/// A token produced by the expression lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: ExprSpan,
    pub value: TokenValue,
}

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    Number,
    String,
    Boolean,
    Null,

    Identifier,

    // Comparison
    EqEq,
    NotEq,
    Lt,
    Gt,
    Lte,
    Gte,

    // Logical (`and`/`&&`, `or`/`||`, `not`/`!`)
    And,
    Or,
    Not,

    Minus,
    LParen,
    RParen,
    Dot,

    /// A lone `|`, the start of a filter.
    Pipe,

    Eof,
}

/// The value carried by a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Number(f64),
    String(String),
    Boolean(bool),
    Identifier(String),
}

/// Condition lexer. Positions are byte offsets into the condition text.
pub struct ExprLexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> ExprLexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
        }
    }

    /// Tokenize the entire source. The last token is always `Eof`.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
        let mut lexer = ExprLexer::new(source);
        let mut tokens = Vec::new();

        loop {
            let token = lexer.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Read the next token from the source.
    pub fn next_token(&mut self) -> Result<Token, ExprError> {
        self.skip_whitespace();

        let start = self.offset();
        if self.is_at_end() {
            return Ok(self.token(TokenKind::Eof, start, TokenValue::None));
        }

        let ch = self.current();

        let kind = match ch {
            '0'..='9' => return self.read_number(start),
            '\'' | '"' => return self.read_string(start),
            c if c.is_alphabetic() || c == '_' => return self.read_identifier(start),

            '=' if self.peek() == Some('=') => self.take(2, TokenKind::EqEq),
            '!' if self.peek() == Some('=') => self.take(2, TokenKind::NotEq),
            '<' if self.peek() == Some('=') => self.take(2, TokenKind::Lte),
            '>' if self.peek() == Some('=') => self.take(2, TokenKind::Gte),
            '&' if self.peek() == Some('&') => self.take(2, TokenKind::And),
            '|' if self.peek() == Some('|') => self.take(2, TokenKind::Or),

            '<' => self.take(1, TokenKind::Lt),
            '>' => self.take(1, TokenKind::Gt),
            '!' => self.take(1, TokenKind::Not),
            '-' => self.take(1, TokenKind::Minus),
            '(' => self.take(1, TokenKind::LParen),
            ')' => self.take(1, TokenKind::RParen),
            '.' => self.take(1, TokenKind::Dot),
            '|' => self.take(1, TokenKind::Pipe),

            '=' => {
                return Err(ExprError {
                    message: "Unexpected '=', did you mean '=='?".into(),
                    position: start,
                })
            }
            _ => {
                return Err(ExprError {
                    message: format!("Unexpected character: '{ch}'"),
                    position: start,
                })
            }
        };

        Ok(self.token(kind, start, TokenValue::None))
    }

    // --- Private helpers ---

    fn take(&mut self, n: usize, kind: TokenKind) -> TokenKind {
        self.pos += n;
        kind
    }

    fn read_number(&mut self, start: usize) -> Result<Token, ExprError> {
        while !self.is_at_end() && (self.current().is_ascii_digit() || self.current() == '.') {
            self.pos += 1;
        }

        let text = &self.source[start..self.offset()];
        let value: f64 = text.parse().map_err(|_| ExprError {
            message: format!("Invalid number: '{text}'"),
            position: start,
        })?;

        Ok(self.token(TokenKind::Number, start, TokenValue::Number(value)))
    }

    fn read_string(&mut self, start: usize) -> Result<Token, ExprError> {
        let quote = self.current();
        self.pos += 1;

        let mut value = String::new();

        while !self.is_at_end() && self.current() != quote {
            if self.current() == '\\' {
                self.pos += 1;
                if self.is_at_end() {
                    break;
                }
                match self.current() {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    c if c == quote => value.push(c),
                    c => {
                        value.push('\\');
                        value.push(c);
                    }
                }
            } else {
                value.push(self.current());
            }
            self.pos += 1;
        }

        if self.is_at_end() {
            return Err(ExprError {
                message: "Unterminated string".into(),
                position: start,
            });
        }

        self.pos += 1;
        Ok(self.token(TokenKind::String, start, TokenValue::String(value)))
    }

    fn read_identifier(&mut self, start: usize) -> Result<Token, ExprError> {
        while !self.is_at_end() && (self.current().is_alphanumeric() || self.current() == '_') {
            self.pos += 1;
        }

        let text = &self.source[start..self.offset()];

        let (kind, value) = match text {
            "true" => (TokenKind::Boolean, TokenValue::Boolean(true)),
            "false" => (TokenKind::Boolean, TokenValue::Boolean(false)),
            "null" => (TokenKind::Null, TokenValue::None),
            "and" => (TokenKind::And, TokenValue::None),
            "or" => (TokenKind::Or, TokenValue::None),
            "not" => (TokenKind::Not, TokenValue::None),
            _ => (TokenKind::Identifier, TokenValue::Identifier(text.to_string())),
        };
        Ok(self.token(kind, start, value))
    }

    fn token(&self, kind: TokenKind, start: usize, value: TokenValue) -> Token {
        Token {
            kind,
            span: ExprSpan::new(start, self.offset()),
            value,
        }
    }

    /// Byte offset of the current character.
    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map_or(self.source.len(), |(offset, _)| *offset)
    }

    fn current(&self) -> char {
        self.chars[self.pos].1
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos + 1).map(|(_, c)| *c)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current().is_whitespace() {
            self.pos += 1;
        }
    }
}
