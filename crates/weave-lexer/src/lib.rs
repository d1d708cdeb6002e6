//! Weave Lexer
//!
//! Splits template source into a flat stream of tokens: runs of literal text
//! and the four marker forms `{{ expr }}`, `{% stmt %}`, `{# comment #}` and
//! `{! comment !}`.
//!
//! # Example
//!
//! ```
//! use weave_lexer::{Scanner, TokenKind};
//!
//! let tokens = Scanner::tokenize("Hello {{ name }}!").unwrap();
//! assert_eq!(tokens.len(), 3);
//! assert_eq!(tokens[1].kind, TokenKind::Expression(" name ".into()));
//! ```

pub mod scanner;
pub mod token;

pub use scanner::Scanner;
pub use token::{CommentStyle, Span, Token, TokenKind};

/// A marker was opened but never closed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Tokenize error at line {line}, column {column}: {message}")]
pub struct TokenizeError {
    pub message: String,
    /// Byte offset of the unterminated opener.
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}
