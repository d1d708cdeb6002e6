//! Weave Parser
//!
//! Turns a token stream into the block tree that the engine renders.
//! Includes both the block parser (for `{% %}` statement structure)
//! and the condition parser (for `{% if %}` expressions like `age >= 18`).

pub mod ast;
pub mod expr_lexer;
pub mod expr_parser;
pub mod parser;

pub use ast::{Expression, Node};
pub use expr_parser::ExprParser;
pub use parser::Parser;

use weave_lexer::TokenizeError;

/// Parser error with position information.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl From<TokenizeError> for ParseError {
    fn from(e: TokenizeError) -> Self {
        ParseError {
            message: e.message,
            line: e.line,
            column: e.column,
        }
    }
}

/// Condition syntax error. `position` is a byte offset into the condition text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at position {position}")]
pub struct ExprError {
    pub message: String,
    pub position: usize,
}
