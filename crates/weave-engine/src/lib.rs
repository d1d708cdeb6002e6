//! Weave Engine
//!
//! Renders parsed templates. Two execution strategies share one set of
//! semantics:
//!
//! ```text
//! source → parse() → Node::Root ─┬─ render(ctx)                      → String
//!                                └─ compile() → CompiledTemplate.execute(ctx) → String
//! ```
//!
//! `render` walks the tree on every call; `compile` flattens it once into an
//! operation sequence for templates rendered many times. Both produce the
//! same output, and the same error, for every input.
//!
//! # Example
//!
//! ```
//! use weave_engine::{Context, Template};
//!
//! let template = Template::parse("{% for n in names %}Hi {{ n }}! {% end %}").unwrap();
//! let context = Context::new().with("names", vec!["Ada", "Bob"]);
//! assert_eq!(template.render(&context).unwrap(), "Hi Ada! Hi Bob! ");
//! assert_eq!(template.compile().execute(&context).unwrap(), "Hi Ada! Hi Bob! ");
//! ```

pub mod compile;
pub mod condition;
pub mod render;
pub mod scope;
pub mod value;

use std::str::FromStr;

pub use compile::{compile, CompiledTemplate, Op};
pub use condition::Condition;
pub use render::render;
pub use scope::{Path, Scope};
pub use value::{Context, Value};
pub use weave_lexer::{Token, TokenKind, TokenizeError};
pub use weave_parser::{Node, ParseError};

/// Split template source into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, TokenizeError> {
    weave_lexer::Scanner::tokenize(source)
}

/// Parse template source into a block tree.
pub fn parse(source: &str) -> Result<Node, ParseError> {
    weave_parser::Parser::parse(source)
}

/// Run a compiled template against a context.
pub fn execute(compiled: &CompiledTemplate, context: &Context) -> Result<String, RenderError> {
    compiled.execute(context)
}

/// Render failure. Aborts the render; no partial output is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("Render error: '{expr}' is a {found}, expected sequence")]
    ExpectedSequence { expr: String, found: &'static str },

    #[error("Render error: '{path}' is not indexable, cannot look up '{segment}' in a {found}")]
    NotIndexable {
        path: String,
        segment: String,
        found: &'static str,
    },

    #[error("Render error: filters unsupported in '{expr}'")]
    FiltersUnsupported { expr: String },

    #[error("Render error: invalid path '{expr}'")]
    InvalidPath { expr: String },

    #[error(transparent)]
    Condition(#[from] ConditionEvalError),
}

/// `{% if %}` condition failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionEvalError {
    #[error("Condition error in '{condition}': {message} at position {position}")]
    Malformed {
        condition: String,
        message: String,
        position: usize,
    },

    #[error("Condition error: type mismatch, cannot apply '{op}' to {operands}")]
    TypeMismatch { op: &'static str, operands: String },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    root: Node,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        Ok(Self {
            root: parse(source)?,
        })
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Render by walking the tree.
    pub fn render(&self, context: &Context) -> Result<String, RenderError> {
        render(&self.root, context)
    }

    pub fn compile(&self) -> CompiledTemplate {
        compile(&self.root)
    }
}

impl FromStr for Template {
    type Err = ParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Template::parse(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_shared_types_are_thread_safe() {
        assert_send_sync::<Node>();
        assert_send_sync::<Template>();
        assert_send_sync::<CompiledTemplate>();
        assert_send_sync::<Context>();
    }

    #[test]
    fn test_from_str() {
        let template: Template = "{{ a }}".parse().unwrap();
        assert_eq!(template.root().children(), &[Node::Expression("a".into())]);
    }

    #[test]
    fn test_error_messages() {
        let err = RenderError::ExpectedSequence {
            expr: "name".into(),
            found: "string",
        };
        assert_eq!(
            err.to_string(),
            "Render error: 'name' is a string, expected sequence"
        );

        let err: RenderError = ConditionEvalError::TypeMismatch {
            op: "<",
            operands: "boolean and number".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Condition error: type mismatch, cannot apply '<' to boolean and number"
        );
    }

    #[test]
    fn test_parse_error_passthrough() {
        let err = parse("{% end %}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Parse error at line 1, column 1: unmatched end"
        );
    }
}
