//! Block parser for Weave.
//!
//! Consumes source-level tokens (from `weave-lexer`) and builds the block tree.
//! Open blocks live on an explicit stack of owned builders: a statement such as
//! `{% for %}` pushes a builder, `{% end %}` pops it, finishes it into a `Node`
//! and moves that node into the children of the builder beneath it.

use crate::ast::Node;
use crate::ParseError;
use weave_lexer::{Scanner, Span, Token, TokenKind};

/// Most blocks that may be open at once.
pub const MAX_NESTING: usize = 64;

/// Kinds of block a typed closer (`endfor`, ...) can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Each,
    For,
    If,
}

impl BlockKind {
    fn keyword(self) -> &'static str {
        match self {
            BlockKind::Each => "each",
            BlockKind::For => "for",
            BlockKind::If => "if",
        }
    }
}

/// A parsed `{% ... %}` body.
#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Each { name: String, source: String },
    For { name: String, source: String },
    If(String),
    Else,
    End(Option<BlockKind>),
}

impl Statement {
    fn parse(body: &str) -> Result<Self, String> {
        let (keyword, rest) = split_word(body.trim());

        match keyword {
            "each" => {
                let (name, rest) = split_word(rest);
                expect_name(name, "each")?;
                if rest.is_empty() {
                    return Ok(Statement::Each {
                        name: name.to_string(),
                        source: name.to_string(),
                    });
                }
                let source = expect_in(rest).ok_or_else(|| {
                    "malformed each, expected 'each NAME' or 'each NAME in EXPR'".to_string()
                })?;
                Ok(Statement::Each {
                    name: name.to_string(),
                    source: source.to_string(),
                })
            }
            "for" => {
                let (name, rest) = split_word(rest);
                expect_name(name, "for")?;
                let source = expect_in(rest)
                    .ok_or_else(|| "malformed for, expected 'for NAME in EXPR'".to_string())?;
                Ok(Statement::For {
                    name: name.to_string(),
                    source: source.to_string(),
                })
            }
            "if" if rest.is_empty() => Err("if without condition".into()),
            "if" => Ok(Statement::If(rest.to_string())),
            "else" if rest.is_empty() => Ok(Statement::Else),
            "end" if rest.is_empty() => Ok(Statement::End(None)),
            "endeach" if rest.is_empty() => Ok(Statement::End(Some(BlockKind::Each))),
            "endfor" if rest.is_empty() => Ok(Statement::End(Some(BlockKind::For))),
            "endif" if rest.is_empty() => Ok(Statement::End(Some(BlockKind::If))),
            "else" | "end" | "endeach" | "endfor" | "endif" => {
                Err(format!("unexpected '{rest}' after '{keyword}'"))
            }
            "" => Err("empty statement".into()),
            other => Err(format!("unrecognized statement '{other}'")),
        }
    }
}

/// Split off the first whitespace-delimited word; the remainder is trimmed.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// `in EXPR` → `EXPR`.
fn expect_in(rest: &str) -> Option<&str> {
    match split_word(rest) {
        ("in", source) if !source.is_empty() => Some(source),
        _ => None,
    }
}

fn expect_name(name: &str, keyword: &str) -> Result<(), String> {
    if is_identifier(name) {
        Ok(())
    } else if name.is_empty() {
        Err(format!("{keyword} without a variable name"))
    } else {
        Err(format!("invalid variable name '{name}' in {keyword}"))
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, Unicode letters allowed.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// A block under construction.
#[derive(Debug)]
struct OpenBlock {
    header: Header,
    children: Vec<Node>,
    span: Span,
}

#[derive(Debug)]
enum Header {
    Root,
    Each { bound_name: String, source_expr: String },
    For { item_var: String, source_expr: String },
    If { condition: String },
}

impl OpenBlock {
    fn new(header: Header, span: Span) -> Self {
        Self {
            header,
            children: Vec::new(),
            span,
        }
    }

    fn kind(&self) -> Option<BlockKind> {
        match self.header {
            Header::Root => None,
            Header::Each { .. } => Some(BlockKind::Each),
            Header::For { .. } => Some(BlockKind::For),
            Header::If { .. } => Some(BlockKind::If),
        }
    }

    fn finish(self) -> Node {
        let body = self.children;
        match self.header {
            Header::Root => Node::Root { children: body },
            Header::Each {
                bound_name,
                source_expr,
            } => Node::Each {
                bound_name,
                source_expr,
                body,
            },
            Header::For {
                item_var,
                source_expr,
            } => Node::For {
                item_var,
                source_expr,
                body,
            },
            Header::If { condition } => Node::If { condition, body },
        }
    }
}

/// Weave block parser.
///
/// Converts a flat token stream into a `Node::Root` tree. The stack always
/// holds the root builder at the bottom; at end of input it must be the only
/// builder left.
pub struct Parser {
    tokens: Vec<Token>,
    stack: Vec<OpenBlock>,
}

impl Parser {
    /// Create a new parser for the given tokens.
    pub fn new(tokens: Vec<Token>) -> Self {
        let root_span = Span::new(0, 0, 1, 1);
        Self {
            tokens,
            stack: vec![OpenBlock::new(Header::Root, root_span)],
        }
    }

    /// Parse template source into a block tree.
    pub fn parse(source: &str) -> Result<Node, ParseError> {
        let tokens = Scanner::tokenize(source)?;
        Parser::new(tokens).parse_tokens()
    }

    /// Consume the token stream and return the finished root.
    pub fn parse_tokens(mut self) -> Result<Node, ParseError> {
        let tokens = std::mem::take(&mut self.tokens);
        let count = tokens.len();

        for token in tokens {
            self.parse_token(token)?;
        }

        if self.stack.len() > 1 {
            let open = self.top();
            let keyword = open.kind().map_or("block", BlockKind::keyword);
            return Err(error_at(
                open.span,
                format!("unterminated block, '{keyword}' is never closed"),
            ));
        }

        let root = self
            .stack
            .pop()
            .map(OpenBlock::finish)
            .unwrap_or(Node::Root {
                children: Vec::new(),
            });
        log::debug!(
            "parsed {count} tokens into {} top-level nodes",
            root.children().len()
        );
        Ok(root)
    }

    fn parse_token(&mut self, token: Token) -> Result<(), ParseError> {
        match token.kind {
            TokenKind::Comment(..) => {}
            TokenKind::Text(text) => {
                if !text.is_empty() {
                    self.append(Node::Text(text));
                }
            }
            TokenKind::Expression(body) => {
                let expr = body.trim();
                if !expr.is_empty() {
                    self.append(Node::Expression(expr.to_string()));
                }
            }
            TokenKind::Statement(body) => {
                let statement =
                    Statement::parse(&body).map_err(|message| error_at(token.span, message))?;
                log::trace!("statement {statement:?} at line {}", token.span.line);
                self.apply(statement, token.span)?;
            }
        }
        Ok(())
    }

    fn apply(&mut self, statement: Statement, span: Span) -> Result<(), ParseError> {
        match statement {
            Statement::Each { name, source } => self.open(
                Header::Each {
                    bound_name: name,
                    source_expr: source,
                },
                span,
            )?,
            Statement::For { name, source } => self.open(
                Header::For {
                    item_var: name,
                    source_expr: source,
                },
                span,
            )?,
            Statement::If(condition) => self.open(Header::If { condition }, span)?,
            Statement::Else => {
                let condition = match &self.top().header {
                    Header::If { condition } => format!("not ({condition})"),
                    _ => return Err(error_at(span, "else without matching if".into())),
                };
                self.close_top();
                self.stack
                    .push(OpenBlock::new(Header::If { condition }, span));
            }
            Statement::End(expected) => {
                if self.stack.len() == 1 {
                    return Err(error_at(span, "unmatched end".into()));
                }
                if let Some(expected) = expected {
                    let open = self.top().kind();
                    if open != Some(expected) {
                        let open = open.map_or("block", BlockKind::keyword);
                        return Err(error_at(
                            span,
                            format!(
                                "mismatched end, 'end{}' closes an open '{open}' block",
                                expected.keyword()
                            ),
                        ));
                    }
                }
                self.close_top();
            }
        }
        Ok(())
    }

    fn open(&mut self, header: Header, span: Span) -> Result<(), ParseError> {
        // The root builder is not a block.
        if self.stack.len() > MAX_NESTING {
            return Err(error_at(
                span,
                format!("blocks nested too deeply, the limit is {MAX_NESTING}"),
            ));
        }
        self.stack.push(OpenBlock::new(header, span));
        Ok(())
    }

    /// Pop the innermost open block and move it into its parent.
    /// Callers guarantee there is a parent, so the root is never popped here.
    fn close_top(&mut self) {
        if self.stack.len() < 2 {
            return;
        }
        if let Some(block) = self.stack.pop() {
            self.append(block.finish());
        }
    }

    fn append(&mut self, node: Node) {
        if let Some(top) = self.stack.last_mut() {
            top.children.push(node);
        }
    }

    fn top(&self) -> &OpenBlock {
        // The root builder is only removed once parsing has finished.
        &self.stack[self.stack.len() - 1]
    }
}

fn error_at(span: Span, message: String) -> ParseError {
    ParseError {
        message,
        line: span.line,
        column: span.column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Node {
        Parser::parse(source).unwrap()
    }

    fn children(source: &str) -> Vec<Node> {
        match parse(source) {
            Node::Root { children } => children,
            other => panic!("Expected Root, got {other:?}"),
        }
    }

    fn parse_err(source: &str) -> ParseError {
        Parser::parse(source).unwrap_err()
    }

    // =========================================================================
    // Leaves
    // =========================================================================

    #[test]
    fn test_empty_document() {
        assert_eq!(parse(""), Node::Root { children: vec![] });
    }

    #[test]
    fn test_text_only() {
        assert_eq!(children("hello"), vec![Node::Text("hello".into())]);
    }

    #[test]
    fn test_expression_is_trimmed() {
        assert_eq!(
            children("Hi {{  user.name  }}!"),
            vec![
                Node::Text("Hi ".into()),
                Node::Expression("user.name".into()),
                Node::Text("!".into()),
            ]
        );
    }

    #[test]
    fn test_empty_expression_dropped() {
        assert_eq!(children("a{{ }}b"), vec![Node::Text("a".into()), Node::Text("b".into())]);
    }

    #[test]
    fn test_comments_discarded() {
        assert_eq!(
            children("a{# note #}b{! other !}"),
            vec![Node::Text("a".into()), Node::Text("b".into())]
        );
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    #[test]
    fn test_for() {
        assert_eq!(
            children("{% for item in items %}{{ item }}{% end %}"),
            vec![Node::For {
                item_var: "item".into(),
                source_expr: "items".into(),
                body: vec![Node::Expression("item".into())],
            }]
        );
    }

    #[test]
    fn test_each_short_form() {
        assert_eq!(
            children("{% each numbers %}{{ it }}{% end %}"),
            vec![Node::Each {
                bound_name: "numbers".into(),
                source_expr: "numbers".into(),
                body: vec![Node::Expression("it".into())],
            }]
        );
    }

    #[test]
    fn test_each_with_source() {
        assert_eq!(
            children("{% each n in data.numbers %}{% endeach %}"),
            vec![Node::Each {
                bound_name: "n".into(),
                source_expr: "data.numbers".into(),
                body: vec![],
            }]
        );
    }

    #[test]
    fn test_if_keeps_raw_condition() {
        assert_eq!(
            children("{% if age >= 18 and  ok %}x{% endif %}"),
            vec![Node::If {
                condition: "age >= 18 and  ok".into(),
                body: vec![Node::Text("x".into())],
            }]
        );
    }

    #[test]
    fn test_else_becomes_negated_sibling() {
        assert_eq!(
            children("{% if age >= 18 %}adult{% else %}minor{% end %}"),
            vec![
                Node::If {
                    condition: "age >= 18".into(),
                    body: vec![Node::Text("adult".into())],
                },
                Node::If {
                    condition: "not (age >= 18)".into(),
                    body: vec![Node::Text("minor".into())],
                },
            ]
        );
    }

    #[test]
    fn test_nesting() {
        let nodes = children("{% for u in users %}{% if u.active %}{{ u.name }}{% end %}{% end %}");
        assert_eq!(nodes.len(), 1);
        let Node::For { body, .. } = &nodes[0] else {
            panic!("Expected For, got {:?}", nodes[0]);
        };
        assert_eq!(
            body,
            &vec![Node::If {
                condition: "u.active".into(),
                body: vec![Node::Expression("u.name".into())],
            }]
        );
    }

    #[test]
    fn test_statement_whitespace_and_newlines() {
        assert_eq!(
            children("{%\n  for   x   in   xs\n%}{%end%}"),
            vec![Node::For {
                item_var: "x".into(),
                source_expr: "xs".into(),
                body: vec![],
            }]
        );
    }

    #[test]
    fn test_parse_tokens_directly() {
        let tokens = Scanner::tokenize("{{ a }}").unwrap();
        let root = Parser::new(tokens).parse_tokens().unwrap();
        assert_eq!(root.children(), &[Node::Expression("a".into())]);
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_unmatched_end() {
        let err = parse_err("{% if x %}{% end %}{% end %}");
        assert!(err.message.contains("unmatched end"));
        assert_eq!(err.column, 20);
    }

    #[test]
    fn test_else_without_if() {
        let err = parse_err("{% else %}");
        assert!(err.message.contains("else without matching if"));
    }

    #[test]
    fn test_else_inside_for() {
        let err = parse_err("{% if a %}{% for x in xs %}{% else %}{% end %}{% end %}");
        assert!(err.message.contains("else without matching if"));
    }

    #[test]
    fn test_unterminated_block() {
        let err = parse_err("line one\n{% for x in xs %}{{ x }}");
        assert!(err.message.contains("unterminated block"));
        assert!(err.message.contains("'for'"));
        assert_eq!((err.line, err.column), (2, 1));
    }

    #[test]
    fn test_mismatched_typed_end() {
        let err = parse_err("{% for x in xs %}{% endif %}");
        assert!(err.message.contains("mismatched end"));
    }

    #[test]
    fn test_unrecognized_statement() {
        let err = parse_err("{% include 'x' %}");
        assert!(err.message.contains("unrecognized statement 'include'"));
    }

    #[test]
    fn test_malformed_for() {
        assert!(parse_err("{% for x of xs %}{% end %}").message.contains("malformed for"));
        assert!(parse_err("{% for x in %}{% end %}").message.contains("malformed for"));
        assert!(parse_err("{% for %}{% end %}").message.contains("without a variable name"));
    }

    #[test]
    fn test_invalid_loop_variable() {
        assert!(parse_err("{% for a.b in xs %}{% end %}")
            .message
            .contains("invalid variable name"));
    }

    #[test]
    fn test_empty_if() {
        assert!(parse_err("{% if %}{% end %}").message.contains("if without condition"));
    }

    #[test]
    fn test_end_with_arguments() {
        assert!(parse_err("{% if x %}{% end if %}").message.contains("after 'end'"));
    }

    #[test]
    fn test_tokenize_error_surfaces() {
        let err = parse_err("ok {{ broken");
        assert!(err.message.contains("Unterminated marker"));
        assert_eq!((err.line, err.column), (1, 4));
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| {
            format!("{}x{}", "{% if x %}".repeat(depth), "{% end %}".repeat(depth))
        };

        assert!(Parser::parse(&nested(MAX_NESTING)).is_ok());

        let err = parse_err(&nested(1_000));
        assert!(err.message.contains("nested too deeply"));
        assert_eq!(err.column, MAX_NESTING * "{% if x %}".len() + 1);

        let loops = "{% for x in xs %}".repeat(MAX_NESTING + 1);
        assert!(parse_err(&loops).message.contains("nested too deeply"));
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("item"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }
}
