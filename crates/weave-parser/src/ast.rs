//! Abstract Syntax Tree for Weave.
//!
//! Contains the block tree produced by the parser and the expression tree
//! produced by the condition parser.

// ---------------------------------------------------------------------------
// Block tree
// ---------------------------------------------------------------------------

/// A node in the block tree.
///
/// The tree is built once by [`crate::Parser`] and never mutated afterwards.
/// Every block owns its children; there are no back-references.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// The top-level container. Only ever appears at the root.
    Root { children: Vec<Node> },

    /// Literal text, emitted verbatim.
    Text(String),

    /// A dotted-path expression from `{{ expr }}`, already trimmed.
    Expression(String),

    /// `{% each NAME %}` / `{% each NAME in EXPR %}`.
    /// Binds each element to `bound_name` and to `it`.
    Each {
        bound_name: String,
        source_expr: String,
        body: Vec<Node>,
    },

    /// `{% for NAME in EXPR %}`. Binds each element to `item_var` only.
    For {
        item_var: String,
        source_expr: String,
        body: Vec<Node>,
    },

    /// `{% if COND %}`. An `{% else %}` branch is stored as a sibling `If`
    /// whose condition is the negation of this one.
    If { condition: String, body: Vec<Node> },
}

impl Node {
    /// Child nodes of a block, or an empty slice for leaves.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Root { children } => children,
            Node::Each { body, .. } | Node::For { body, .. } | Node::If { body, .. } => body,
            Node::Text(_) | Node::Expression(_) => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Condition expressions
// ---------------------------------------------------------------------------

/// A position in condition text (relative to the condition string, not the template).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprSpan {
    pub start: usize,
    pub end: usize,
}

impl ExprSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A complete expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub span: ExprSpan,
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Numeric literal: `42`, `3.14`
    Number(f64),

    /// String literal: `"hello"`, `'world'`
    String(String),

    /// Boolean literal: `true`, `false`
    Boolean(bool),

    /// `null`
    Null,

    /// Variable reference: `age`, `user.address.city`
    Path(String),

    /// `a == b`, `x and y`
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },

    /// `not done`, `-1`
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Lte => "<=",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}
