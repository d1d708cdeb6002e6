//! Variable scopes and dotted-path resolution.

use std::fmt;

use weave_parser::parser::is_identifier;

use crate::value::{Context, Value};
use crate::RenderError;

static NULL: Value = Value::Null;

/// A validated dotted path such as `user.address.city`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    raw: String,
    segments: Vec<String>,
}

impl Path {
    /// Parse and validate a path expression.
    ///
    /// A `|` anywhere makes the expression a filter application, which is
    /// recognized but not supported.
    pub fn parse(expr: &str) -> Result<Self, RenderError> {
        let raw = expr.trim();

        if raw.contains('|') {
            return Err(RenderError::FiltersUnsupported {
                expr: raw.to_string(),
            });
        }

        let segments: Vec<String> = raw.split('.').map(|s| s.trim().to_string()).collect();
        if !segments.iter().all(|s| is_identifier(s)) {
            return Err(RenderError::InvalidPath {
                expr: raw.to_string(),
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The first segment, looked up in the scope.
    pub fn head(&self) -> &str {
        &self.segments[0]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Layered variable bindings over a [`Context`].
///
/// Each loop iteration gets a child scope holding that iteration's bindings;
/// lookups walk from the innermost scope outwards and finally fall back to
/// the context. Scopes only borrow, so the context is never touched.
#[derive(Debug)]
pub struct Scope<'a> {
    context: &'a Context,
    parent: Option<&'a Scope<'a>>,
    bindings: Vec<(&'a str, &'a Value)>,
}

impl<'a> Scope<'a> {
    /// The outermost scope: just the context.
    pub fn new(context: &'a Context) -> Self {
        Self {
            context,
            parent: None,
            bindings: Vec::new(),
        }
    }

    /// A new, empty scope layered over this one.
    pub fn child<'s>(&'s self) -> Scope<'s>
    where
        'a: 's,
    {
        Scope {
            context: self.context,
            parent: Some(self),
            bindings: Vec::new(),
        }
    }

    /// Bind `name` in this scope. Later bindings shadow earlier ones.
    pub fn bind(&mut self, name: &'a str, value: &'a Value) {
        self.bindings.push((name, value));
    }

    /// Look up a single variable name, innermost binding first.
    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        if let Some(&(_, value)) = self.bindings.iter().rev().find(|(n, _)| *n == name) {
            return Some(value);
        }
        match self.parent {
            Some(parent) => parent.lookup(name),
            None => self.context.get(name),
        }
    }

    /// Resolve a path. Absent variables and keys resolve to null, and null
    /// stays null however deep the path goes. Any other non-map value in the
    /// middle of the path is an error.
    pub fn resolve(&self, path: &Path) -> Result<&'a Value, RenderError> {
        let mut current = match self.lookup(path.head()) {
            Some(value) => value,
            None => return Ok(&NULL),
        };

        for segment in &path.segments[1..] {
            current = match current {
                Value::Map(map) => map.get(segment).unwrap_or(&NULL),
                Value::Null => return Ok(&NULL),
                other => {
                    return Err(RenderError::NotIndexable {
                        path: path.raw.clone(),
                        segment: segment.clone(),
                        found: other.kind(),
                    })
                }
            };
        }

        Ok(current)
    }

    /// Parse `expr` as a path and resolve it.
    pub fn resolve_expr(&self, expr: &str) -> Result<&'a Value, RenderError> {
        self.resolve(&Path::parse(expr)?)
    }
}
