//! Condition parser for Weave.
//!
//! Parses condition token streams (from `expr_lexer`) into `Expression` trees
//! by recursive descent. Precedence, loosest first:
//!
//! ```text
//! or      := and ( ("or" | "||") and )*
//! and     := compare ( ("and" | "&&") compare )*
//! compare := unary ( ("==" | "!=" | "<" | "<=" | ">" | ">=") unary )*
//! unary   := ("not" | "!" | "-") unary | primary
//! primary := NUMBER | STRING | BOOL | "null" | path | "(" or ")"
//! path    := IDENT ( "." IDENT )*
//! ```

use crate::ast::{BinaryOp, ExprKind, ExprSpan, Expression, UnaryOp};
use crate::expr_lexer::{ExprLexer, Token, TokenKind, TokenValue};
use crate::ExprError;

/// Most operators (including `(`) a single condition may contain.
pub const MAX_OPERATORS: usize = 128;

/// Tokens that add a level to the expression tree.
fn is_operator(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::EqEq
            | TokenKind::NotEq
            | TokenKind::Lt
            | TokenKind::Gt
            | TokenKind::Lte
            | TokenKind::Gte
            | TokenKind::And
            | TokenKind::Or
            | TokenKind::Not
            | TokenKind::Minus
            | TokenKind::LParen
    )
}

/// Recursive-descent parser over condition tokens.
pub struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    /// Create a new expression parser for the given tokens.
    /// The token list must end with `Eof`, as produced by [`ExprLexer::tokenize`].
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse a complete condition from a source string.
    pub fn parse(source: &str) -> Result<Expression, ExprError> {
        Self::parse_tokens(ExprLexer::tokenize(source)?)
    }

    /// Parse a complete condition from already-lexed tokens.
    ///
    /// Conditions with more than [`MAX_OPERATORS`] operators and parentheses
    /// are rejected before any tree is built, which bounds the depth of every
    /// tree this returns.
    pub fn parse_tokens(tokens: Vec<Token>) -> Result<Expression, ExprError> {
        if let Some(token) = tokens.iter().filter(|t| is_operator(t.kind)).nth(MAX_OPERATORS) {
            return Err(ExprError {
                message: format!("Condition has more than {MAX_OPERATORS} operators"),
                position: token.span.start,
            });
        }

        let mut parser = ExprParser::new(tokens);

        if parser.peek().kind == TokenKind::Eof {
            return Err(parser.error("Empty condition".into()));
        }

        let expr = parser.parse_or()?;
        match parser.peek().kind {
            TokenKind::Eof => Ok(expr),
            TokenKind::Pipe => Err(parser.error("Filters are not supported".into())),
            _ => Err(parser.error(format!(
                "Unexpected {:?} after end of condition",
                parser.peek().kind
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expression, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek().kind == TokenKind::Or {
            self.advance();
            let right = self.parse_and()?;
            left = binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ExprError> {
        let mut left = self.parse_comparison()?;
        while self.peek().kind == TokenKind::And {
            self.advance();
            let right = self.parse_comparison()?;
            left = binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expression, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Neq,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Lte => BinaryOp::Lte,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Gte => BinaryOp::Gte,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expression, ExprError> {
        let op = match self.peek().kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.parse_primary(),
        };
        let start = self.peek().span.start;
        self.advance();
        let operand = self.parse_unary()?;
        let span = ExprSpan::new(start, operand.span.end);
        Ok(Expression {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        })
    }

    fn parse_primary(&mut self) -> Result<Expression, ExprError> {
        let token = self.peek().clone();

        let kind = match (token.kind, token.value) {
            (TokenKind::Number, TokenValue::Number(n)) => ExprKind::Number(n),
            (TokenKind::String, TokenValue::String(s)) => ExprKind::String(s),
            (TokenKind::Boolean, TokenValue::Boolean(b)) => ExprKind::Boolean(b),
            (TokenKind::Null, _) => ExprKind::Null,
            (TokenKind::Identifier, TokenValue::Identifier(name)) => {
                return self.parse_path(name, token.span.start)
            }
            (TokenKind::LParen, _) => {
                self.advance();
                let inner = self.parse_or()?;
                if self.peek().kind != TokenKind::RParen {
                    return Err(self.error("Expected ')'".into()));
                }
                self.advance();
                return Ok(inner);
            }
            (TokenKind::Eof, _) => return Err(self.error("Unexpected end of condition".into())),
            (kind, _) => return Err(self.error(format!("Unexpected {kind:?}"))),
        };

        self.advance();
        Ok(Expression {
            kind,
            span: token.span,
        })
    }

    /// Parse `IDENT ( "." IDENT )*`, the first identifier already peeked.
    fn parse_path(&mut self, first: String, start: usize) -> Result<Expression, ExprError> {
        self.advance();
        let mut path = first;
        let mut end = self.previous_end();

        while self.peek().kind == TokenKind::Dot {
            self.advance();
            match &self.peek().value {
                TokenValue::Identifier(segment) if self.peek().kind == TokenKind::Identifier => {
                    path.push('.');
                    path.push_str(segment);
                    self.advance();
                    end = self.previous_end();
                }
                _ => return Err(self.error("Expected identifier after '.'".into())),
            }
        }

        Ok(Expression {
            kind: ExprKind::Path(path),
            span: ExprSpan::new(start, end),
        })
    }

    // --- Token navigation ---

    fn peek(&self) -> &Token {
        // `tokenize` always ends with Eof and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn previous_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end)
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn error(&self, message: String) -> ExprError {
        ExprError {
            message,
            position: self.peek().span.start,
        }
    }
}

fn binary(left: Expression, op: BinaryOp, right: Expression) -> Expression {
    let span = ExprSpan::new(left.span.start, right.span.end);
    Expression {
        kind: ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Expression {
        ExprParser::parse(source).unwrap()
    }

    /// Render the tree back as fully parenthesized text to check grouping.
    fn shape(expr: &Expression) -> String {
        match &expr.kind {
            ExprKind::Number(n) => n.to_string(),
            ExprKind::String(s) => format!("{s:?}"),
            ExprKind::Boolean(b) => b.to_string(),
            ExprKind::Null => "null".into(),
            ExprKind::Path(p) => p.clone(),
            ExprKind::Binary { left, op, right } => {
                format!("({} {} {})", shape(left), op.symbol(), shape(right))
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => format!("(not {})", shape(operand)),
                UnaryOp::Neg => format!("(-{})", shape(operand)),
            },
        }
    }

    #[test]
    fn test_literal() {
        assert_eq!(parse("42").kind, ExprKind::Number(42.0));
        assert_eq!(parse("'x'").kind, ExprKind::String("x".into()));
        assert_eq!(parse("null").kind, ExprKind::Null);
    }

    #[test]
    fn test_dotted_path() {
        let expr = parse("user.address.city");
        assert_eq!(expr.kind, ExprKind::Path("user.address.city".into()));
        assert_eq!(expr.span, ExprSpan::new(0, 17));
    }

    #[test]
    fn test_comparison() {
        assert_eq!(shape(&parse("age >= 18")), "(age >= 18)");
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(shape(&parse("a or b and c")), "(a or (b and c))");
        assert_eq!(shape(&parse("a && b || c")), "((a and b) or c)");
    }

    #[test]
    fn test_comparison_binds_tighter_than_and() {
        assert_eq!(
            shape(&parse("x > 1 and y == 'z'")),
            "((x > 1) and (y == \"z\"))"
        );
    }

    #[test]
    fn test_not_binds_tightest() {
        assert_eq!(shape(&parse("not a == b")), "((not a) == b)");
        assert_eq!(shape(&parse("!(a == b)")), "(not (a == b))");
    }

    #[test]
    fn test_negative_number() {
        assert_eq!(shape(&parse("t > -5")), "(t > (-5))");
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(shape(&parse("a == b == c")), "((a == b) == c)");
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(shape(&parse("(a or b) and c")), "((a or b) and c)");
    }

    // --- Errors ---

    #[test]
    fn test_empty_condition() {
        assert!(ExprParser::parse("   ").is_err());
    }

    #[test]
    fn test_missing_operand() {
        let err = ExprParser::parse("a ==").unwrap_err();
        assert!(err.message.contains("Unexpected end"));
        assert_eq!(err.position, 4);
    }

    #[test]
    fn test_unbalanced_paren() {
        let err = ExprParser::parse("(a and b").unwrap_err();
        assert!(err.message.contains("Expected ')'"));
    }

    #[test]
    fn test_trailing_tokens() {
        let err = ExprParser::parse("a b").unwrap_err();
        assert_eq!(err.position, 2);
    }

    #[test]
    fn test_filter_rejected() {
        let err = ExprParser::parse("name | upper").unwrap_err();
        assert!(err.message.contains("Filters"));
    }

    #[test]
    fn test_operator_limit() {
        let nested = format!("{}x", "!".repeat(200_000));
        let err = ExprParser::parse(&nested).unwrap_err();
        assert!(err.message.contains("more than 128 operators"));
        assert_eq!(err.position, 128);

        let parens = format!("{}x{}", "(".repeat(5_000), ")".repeat(5_000));
        assert!(ExprParser::parse(&parens).is_err());

        let chain = vec!["a"; 5_000].join(" or ");
        assert!(ExprParser::parse(&chain).is_err());

        let at_limit = format!("{}x", "not ".repeat(MAX_OPERATORS));
        assert!(ExprParser::parse(&at_limit).is_ok());
    }

    #[test]
    fn test_dangling_dot() {
        assert!(ExprParser::parse("user.").is_err());
    }
}
