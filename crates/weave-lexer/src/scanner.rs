use crate::token::{CommentStyle, Span, Token, TokenKind};
use crate::TokenizeError;

/// Marker kind selected by the character following an opening `{`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Expression,
    Statement,
    Comment(CommentStyle),
}

impl Marker {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'{' => Some(Marker::Expression),
            b'%' => Some(Marker::Statement),
            b'#' => Some(Marker::Comment(CommentStyle::Hash)),
            b'!' => Some(Marker::Comment(CommentStyle::Bang)),
            _ => None,
        }
    }

    fn closer(self) -> &'static str {
        match self {
            Marker::Expression => "}}",
            Marker::Statement => "%}",
            Marker::Comment(CommentStyle::Hash) => "#}",
            Marker::Comment(CommentStyle::Bang) => "!}",
        }
    }

    fn token_kind(self, body: &str) -> TokenKind {
        match self {
            Marker::Expression => TokenKind::Expression(body.to_string()),
            Marker::Statement => TokenKind::Statement(body.to_string()),
            Marker::Comment(style) => TokenKind::Comment(body.to_string(), style),
        }
    }
}

/// Template source scanner.
///
/// Scans leftmost-first for marker openers; each marker extends to the first
/// matching closer after its opener, across line breaks. Everything between
/// markers becomes a `Text` token. Markers never nest or overlap.
pub struct Scanner<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    ///
    /// Always returns at least one token: input without markers (including
    /// empty input) becomes a single `Text` token.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, TokenizeError> {
        let mut scanner = Scanner::new(source);
        scanner.scan_tokens()?;
        log::trace!("tokenized {} bytes into {} tokens", source.len(), scanner.tokens.len());
        Ok(scanner.tokens)
    }

    fn scan_tokens(&mut self) -> Result<(), TokenizeError> {
        while let Some((start, marker)) = self.find_opener() {
            if start > self.pos {
                self.scan_text(start);
            }
            self.scan_marker(marker)?;
        }

        if self.pos < self.source.len() || self.tokens.is_empty() {
            self.scan_text(self.source.len());
        }

        Ok(())
    }

    /// Locate the next marker opener at or after the current position.
    fn find_opener(&self) -> Option<(usize, Marker)> {
        let bytes = self.source.as_bytes();
        let mut i = self.pos;
        while i + 1 < bytes.len() {
            if bytes[i] == b'{' {
                if let Some(marker) = Marker::from_byte(bytes[i + 1]) {
                    return Some((i, marker));
                }
            }
            i += 1;
        }
        None
    }

    /// Emit a `Text` token from the current position up to `end`.
    fn scan_text(&mut self, end: usize) {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        let text = &self.source[start..end];
        self.advance_to(end);
        self.tokens.push(Token::new(
            TokenKind::Text(text.to_string()),
            Span::new(start, end, line, column),
        ));
    }

    /// Emit a marker token starting at the current position.
    fn scan_marker(&mut self, marker: Marker) -> Result<(), TokenizeError> {
        let start = self.pos;
        let body_start = start + 2;
        let closer = marker.closer();

        let body_end = match self.source[body_start..].find(closer) {
            Some(rel) => body_start + rel,
            None => {
                return Err(TokenizeError {
                    message: format!(
                        "Unterminated marker '{}', expected '{closer}'",
                        &self.source[start..body_start]
                    ),
                    offset: start,
                    line: self.line,
                    column: self.column,
                });
            }
        };
        let end = body_end + closer.len();

        let (line, column) = (self.line, self.column);
        let kind = marker.token_kind(&self.source[body_start..body_end]);
        self.advance_to(end);
        self.tokens
            .push(Token::new(kind, Span::new(start, end, line, column)));
        Ok(())
    }

    /// Move to `target`, keeping line and column in step.
    fn advance_to(&mut self, target: usize) {
        for ch in self.source[self.pos..target].chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos = target;
    }
}
