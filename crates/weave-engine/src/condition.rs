//! Condition evaluation for `{% if %}`.
//!
//! Condition text is parsed by `weave_parser::ExprParser`, then lowered into a
//! [`Condition`] whose paths are already validated, so evaluating it never
//! re-parses anything.

use std::borrow::Cow;
use std::cmp::Ordering;

use weave_parser::ast::{BinaryOp, ExprKind, Expression, UnaryOp};
use weave_parser::expr_lexer::{ExprLexer, TokenKind};
use weave_parser::{ExprError, ExprParser};

use crate::scope::{Path, Scope};
use crate::value::Value;
use crate::{ConditionEvalError, RenderError};

/// A parsed `{% if %}` condition, ready to evaluate any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    term: Term,
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Literal(Value),
    Path(Path),
    Not(Box<Term>),
    Neg(Box<Term>),
    And(Box<Term>, Box<Term>),
    Or(Box<Term>, Box<Term>),
    Compare {
        op: CompareOp,
        left: Box<Term>,
        right: Box<Term>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

impl Condition {
    /// Parse condition text.
    ///
    /// A lone `|` anywhere outside a string literal is a filter application
    /// and fails with [`RenderError::FiltersUnsupported`]; other syntax errors
    /// are [`ConditionEvalError::Malformed`].
    pub fn parse(source: &str) -> Result<Self, RenderError> {
        let malformed = |e: ExprError| ConditionEvalError::Malformed {
            condition: source.to_string(),
            message: e.message,
            position: e.position,
        };

        let tokens = ExprLexer::tokenize(source).map_err(malformed)?;
        if tokens.iter().any(|t| t.kind == TokenKind::Pipe) {
            return Err(RenderError::FiltersUnsupported {
                expr: source.trim().to_string(),
            });
        }
        let expr = ExprParser::parse_tokens(tokens).map_err(malformed)?;

        Ok(Self {
            term: lower(&expr)?,
        })
    }

    pub fn evaluate(&self, scope: &Scope<'_>) -> Result<bool, RenderError> {
        Ok(eval(&self.term, scope)?.is_truthy())
    }

    /// Every path the condition reads, left to right.
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths = Vec::new();
        collect_paths(&self.term, &mut paths);
        paths
    }
}

/// Parse and evaluate a condition against a scope.
pub fn evaluate(condition: &str, scope: &Scope<'_>) -> Result<bool, RenderError> {
    Condition::parse(condition)?.evaluate(scope)
}

fn lower(expr: &Expression) -> Result<Term, RenderError> {
    let term = match &expr.kind {
        ExprKind::Number(n) => Term::Literal(Value::Number(*n)),
        ExprKind::String(s) => Term::Literal(Value::String(s.clone())),
        ExprKind::Boolean(b) => Term::Literal(Value::Bool(*b)),
        ExprKind::Null => Term::Literal(Value::Null),
        ExprKind::Path(path) => Term::Path(Path::parse(path)?),
        ExprKind::Unary { op, operand } => {
            let operand = Box::new(lower(operand)?);
            match op {
                UnaryOp::Not => Term::Not(operand),
                UnaryOp::Neg => Term::Neg(operand),
            }
        }
        ExprKind::Binary { left, op, right } => {
            let left = Box::new(lower(left)?);
            let right = Box::new(lower(right)?);
            let op = match op {
                BinaryOp::And => return Ok(Term::And(left, right)),
                BinaryOp::Or => return Ok(Term::Or(left, right)),
                BinaryOp::Eq => CompareOp::Eq,
                BinaryOp::Neq => CompareOp::Neq,
                BinaryOp::Lt => CompareOp::Lt,
                BinaryOp::Lte => CompareOp::Lte,
                BinaryOp::Gt => CompareOp::Gt,
                BinaryOp::Gte => CompareOp::Gte,
            };
            Term::Compare { op, left, right }
        }
    };
    Ok(term)
}

fn collect_paths<'t>(term: &'t Term, paths: &mut Vec<&'t Path>) {
    match term {
        Term::Literal(_) => {}
        Term::Path(path) => paths.push(path),
        Term::Not(operand) | Term::Neg(operand) => collect_paths(operand, paths),
        Term::And(left, right)
        | Term::Or(left, right)
        | Term::Compare { left, right, .. } => {
            collect_paths(left, paths);
            collect_paths(right, paths);
        }
    }
}

fn eval<'v>(term: &'v Term, scope: &Scope<'v>) -> Result<Cow<'v, Value>, RenderError> {
    let value = match term {
        Term::Literal(value) => return Ok(Cow::Borrowed(value)),
        Term::Path(path) => return Ok(Cow::Borrowed(scope.resolve(path)?)),
        Term::Not(operand) => Value::Bool(!eval(operand, scope)?.is_truthy()),
        Term::Neg(operand) => match eval(operand, scope)?.as_ref() {
            Value::Number(n) => Value::Number(-n),
            other => {
                return Err(ConditionEvalError::TypeMismatch {
                    op: "-",
                    operands: other.kind().to_string(),
                }
                .into())
            }
        },
        Term::And(left, right) => {
            Value::Bool(eval(left, scope)?.is_truthy() && eval(right, scope)?.is_truthy())
        }
        Term::Or(left, right) => {
            Value::Bool(eval(left, scope)?.is_truthy() || eval(right, scope)?.is_truthy())
        }
        Term::Compare { op, left, right } => {
            let l = eval(left, scope)?;
            let r = eval(right, scope)?;
            Value::Bool(compare(*op, &l, &r)?)
        }
    };
    Ok(Cow::Owned(value))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ConditionEvalError> {
    let holds = match op {
        CompareOp::Eq => equals(left, right),
        CompareOp::Neq => equals(left, right).map(|equal| !equal),
        CompareOp::Lt => order(left, right).map(|ord| ord == Some(Ordering::Less)),
        CompareOp::Lte => order(left, right)
            .map(|ord| matches!(ord, Some(Ordering::Less | Ordering::Equal))),
        CompareOp::Gt => order(left, right).map(|ord| ord == Some(Ordering::Greater)),
        CompareOp::Gte => order(left, right)
            .map(|ord| matches!(ord, Some(Ordering::Greater | Ordering::Equal))),
    };
    holds.ok_or_else(|| ConditionEvalError::TypeMismatch {
        op: op.symbol(),
        operands: format!("{} and {}", left.kind(), right.kind()),
    })
}

/// `None` when the kinds cannot be compared. Null compares with anything.
fn equals(left: &Value, right: &Value) -> Option<bool> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Some(left.is_null() && right.is_null()),
        _ if left.kind() == right.kind() => Some(left == right),
        _ => None,
    }
}

/// `None` when the kinds have no ordering; `Some(None)` for NaN, which makes
/// every ordering operator false.
fn order(left: &Value, right: &Value) -> Option<Option<Ordering>> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Some(a.partial_cmp(b)),
        (Value::String(a), Value::String(b)) => Some(Some(a.cmp(b))),
        _ => None,
    }
}
