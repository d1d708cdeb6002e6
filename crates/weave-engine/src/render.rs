//! Tree-walking renderer.
//!
//! Interprets the block tree directly. Nothing is cached between calls, so
//! this is the simplest way to render a template once; see
//! [`crate::compile`] for repeated rendering.

use weave_parser::ast::Node;

use crate::condition;
use crate::scope::Scope;
use crate::value::{Context, Value};
use crate::RenderError;

/// Render a block tree against a context.
///
/// On error nothing is returned; partial output is discarded.
pub fn render(root: &Node, context: &Context) -> Result<String, RenderError> {
    let scope = Scope::new(context);
    let mut out = String::new();
    render_node(root, &scope, &mut out)?;
    Ok(out)
}

fn render_nodes(nodes: &[Node], scope: &Scope<'_>, out: &mut String) -> Result<(), RenderError> {
    for node in nodes {
        render_node(node, scope, out)?;
    }
    Ok(())
}

fn render_node(node: &Node, scope: &Scope<'_>, out: &mut String) -> Result<(), RenderError> {
    match node {
        Node::Root { children } => render_nodes(children, scope, out),
        Node::Text(text) => {
            out.push_str(text);
            Ok(())
        }
        Node::Expression(expr) => {
            scope.resolve_expr(expr)?.write_to(out);
            Ok(())
        }
        Node::Each {
            bound_name,
            source_expr,
            body,
        } => {
            let items = sequence(scope.resolve_expr(source_expr)?, source_expr)?;
            for item in items {
                let mut child = scope.child();
                child.bind(bound_name, item);
                child.bind("it", item);
                render_nodes(body, &child, out)?;
            }
            Ok(())
        }
        Node::For {
            item_var,
            source_expr,
            body,
        } => {
            let items = sequence(scope.resolve_expr(source_expr)?, source_expr)?;
            for item in items {
                let mut child = scope.child();
                child.bind(item_var, item);
                render_nodes(body, &child, out)?;
            }
            Ok(())
        }
        Node::If { condition, body } => {
            if condition::evaluate(condition, scope)? {
                render_nodes(body, scope, out)?;
            }
            Ok(())
        }
    }
}

/// The elements a loop iterates. Null (an absent source) iterates zero times.
pub(crate) fn sequence<'a>(value: &'a Value, expr: &str) -> Result<&'a [Value], RenderError> {
    match value {
        Value::Seq(items) => Ok(items),
        Value::Null => Ok(&[]),
        other => Err(RenderError::ExpectedSequence {
            expr: expr.trim().to_string(),
            found: other.kind(),
        }),
    }
}
