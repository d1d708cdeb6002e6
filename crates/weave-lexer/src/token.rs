/// A byte range in template source, with the line and column of its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Which delimiter pair a comment was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `{# ... #}`
    Hash,
    /// `{! ... !}`
    Bang,
}

/// Token classification for template source.
///
/// Marker variants carry the raw body between the delimiters, untrimmed.
/// `Text` carries the literal run exactly as it appears in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Text(String),
    Expression(String),
    Statement(String),
    Comment(String, CommentStyle),
}

/// A token produced by the scanner.
///
/// `span` covers the whole token in the source, delimiters included, so
/// slicing the source by every span in order reproduces it exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The exact source text this token was scanned from.
    pub fn source_text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.span.start..self.span.end]
    }
}
