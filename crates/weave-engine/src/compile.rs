//! Template compiler.
//!
//! Flattens the block tree into a linear operation sequence once, so that
//! repeated renders skip the tree walk, path parsing and condition parsing.
//!
//! ```text
//! Node::Root → compile() → CompiledTemplate { ops, paths, conditions } → execute(ctx)
//! ```
//!
//! Compilation never fails. A malformed path or condition is stored with its
//! error and reported when execution reaches it, which is exactly when the
//! tree-walking renderer would report it. `execute` and [`crate::render`]
//! therefore agree on every input, errors included.

use std::collections::HashMap;
use std::fmt;

use weave_parser::ast::Node;

use crate::condition::Condition;
use crate::render::sequence;
use crate::scope::{Path, Scope};
use crate::value::Context;
use crate::RenderError;

/// A single step of a compiled template.
///
/// `Begin*` ops record the index of their matching `End*` op and vice versa.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Append literal text.
    Text(String),
    /// Resolve the path in slot `.0` and append it.
    Emit(usize),
    /// Iterate the sequence at path slot `source`, binding `name`
    /// (and `it` when `bind_it` is set) for the ops up to `end`.
    BeginLoop {
        source: usize,
        name: String,
        bind_it: bool,
        end: usize,
    },
    EndLoop { begin: usize },
    /// Run the ops up to `end` only if condition slot `condition` holds.
    BeginIf { condition: usize, end: usize },
    EndIf { begin: usize },
}

#[derive(Debug, Clone)]
struct PathSlot {
    path: Result<Path, RenderError>,
}

#[derive(Debug, Clone)]
struct ConditionSlot {
    source: String,
    condition: Result<Condition, RenderError>,
}

/// A template flattened into operations. Immutable and reusable; safe to
/// share between threads, each render bringing its own [`Context`].
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    ops: Vec<Op>,
    paths: Vec<String>,
    path_slots: Vec<PathSlot>,
    conditions: Vec<ConditionSlot>,
    variables: Vec<String>,
}

impl CompiledTemplate {
    /// Render against a context. Output is identical to [`crate::render`]
    /// on the tree this was compiled from.
    pub fn execute(&self, context: &Context) -> Result<String, RenderError> {
        let scope = Scope::new(context);
        let mut out = String::new();
        self.run(0, self.ops.len(), &scope, &mut out)?;
        Ok(out)
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Every distinct path expression referenced by `{{ }}` or a loop
    /// source, in first-use order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Top-level context names the template reads, in first-use order.
    /// Names bound by an enclosing loop are not included.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Malformed paths and conditions found while compiling. Each would
    /// fail a render only if execution reaches it.
    pub fn problems(&self) -> Vec<RenderError> {
        let paths = self
            .path_slots
            .iter()
            .filter_map(|slot| slot.path.as_ref().err().cloned());
        let conditions = self
            .conditions
            .iter()
            .filter_map(|slot| slot.condition.as_ref().err().cloned());
        paths.chain(conditions).collect()
    }

    fn run(
        &self,
        start: usize,
        end: usize,
        scope: &Scope<'_>,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let mut pc = start;
        while pc < end {
            match &self.ops[pc] {
                Op::Text(text) => out.push_str(text),
                Op::Emit(slot) => scope.resolve(self.path(*slot)?)?.write_to(out),
                Op::BeginLoop {
                    source,
                    name,
                    bind_it,
                    end: loop_end,
                } => {
                    let items = sequence(scope.resolve(self.path(*source)?)?, &self.paths[*source])?;
                    for item in items {
                        let mut child = scope.child();
                        child.bind(name, item);
                        if *bind_it {
                            child.bind("it", item);
                        }
                        self.run(pc + 1, *loop_end, &child, out)?;
                    }
                    pc = *loop_end;
                }
                Op::BeginIf {
                    condition,
                    end: if_end,
                } => {
                    let slot = &self.conditions[*condition];
                    let condition = slot.condition.as_ref().map_err(Clone::clone)?;
                    if !condition.evaluate(scope)? {
                        pc = *if_end;
                    }
                }
                Op::EndLoop { .. } | Op::EndIf { .. } => {}
            }
            pc += 1;
        }
        Ok(())
    }

    fn path(&self, slot: usize) -> Result<&Path, RenderError> {
        self.path_slots[slot].path.as_ref().map_err(|e| e.clone())
    }
}

impl fmt::Display for CompiledTemplate {
    /// An indented listing of the operations, one per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth: usize = 0;
        for op in &self.ops {
            if matches!(op, Op::EndLoop { .. } | Op::EndIf { .. }) {
                depth = depth.saturating_sub(1);
            }
            let indent = "  ".repeat(depth);
            match op {
                Op::Text(text) => writeln!(f, "{indent}text {text:?}")?,
                Op::Emit(slot) => writeln!(f, "{indent}emit {}", self.paths[*slot])?,
                Op::BeginLoop {
                    source,
                    name,
                    bind_it,
                    ..
                } => {
                    let it = if *bind_it { " (+it)" } else { "" };
                    writeln!(f, "{indent}loop {name}{it} in {}", self.paths[*source])?;
                }
                Op::EndLoop { .. } => writeln!(f, "{indent}end loop")?,
                Op::BeginIf { condition, .. } => {
                    writeln!(f, "{indent}if {}", self.conditions[*condition].source)?
                }
                Op::EndIf { .. } => writeln!(f, "{indent}end if")?,
            }
            if matches!(op, Op::BeginLoop { .. } | Op::BeginIf { .. }) {
                depth += 1;
            }
        }
        Ok(())
    }
}

/// Compile a block tree.
pub fn compile(root: &Node) -> CompiledTemplate {
    let mut compiler = Compiler::default();
    compiler.compile_node(root);
    log::debug!(
        "compiled template: {} ops, {} paths, {} conditions",
        compiler.ops.len(),
        compiler.paths.len(),
        compiler.conditions.len()
    );
    CompiledTemplate {
        ops: compiler.ops,
        paths: compiler.paths,
        path_slots: compiler.path_slots,
        conditions: compiler.conditions,
        variables: compiler.variables,
    }
}

#[derive(Default)]
struct Compiler {
    ops: Vec<Op>,
    paths: Vec<String>,
    path_slots: Vec<PathSlot>,
    path_index: HashMap<String, usize>,
    conditions: Vec<ConditionSlot>,
    condition_index: HashMap<String, usize>,
    /// Names bound by the loops currently being compiled, innermost last.
    bound: Vec<String>,
    variables: Vec<String>,
}

impl Compiler {
    fn compile_nodes(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.compile_node(node);
        }
    }

    fn compile_node(&mut self, node: &Node) {
        match node {
            Node::Root { children } => self.compile_nodes(children),
            Node::Text(text) => match self.ops.last_mut() {
                Some(Op::Text(prev)) => prev.push_str(text),
                _ => self.ops.push(Op::Text(text.clone())),
            },
            Node::Expression(expr) => {
                let slot = self.path_slot(expr);
                self.ops.push(Op::Emit(slot));
            }
            Node::Each {
                bound_name,
                source_expr,
                body,
            } => self.compile_loop(bound_name, source_expr, true, body),
            Node::For {
                item_var,
                source_expr,
                body,
            } => self.compile_loop(item_var, source_expr, false, body),
            Node::If { condition, body } => {
                let slot = self.condition_slot(condition);
                let begin = self.ops.len();
                self.ops.push(Op::BeginIf {
                    condition: slot,
                    end: begin,
                });
                self.compile_nodes(body);
                let end = self.ops.len();
                self.ops.push(Op::EndIf { begin });
                self.ops[begin] = Op::BeginIf {
                    condition: slot,
                    end,
                };
            }
        }
    }

    fn compile_loop(&mut self, name: &str, source_expr: &str, bind_it: bool, body: &[Node]) {
        let source = self.path_slot(source_expr);
        let begin = self.ops.len();
        self.ops.push(Op::BeginLoop {
            source,
            name: name.to_string(),
            bind_it,
            end: begin,
        });

        let depth = self.bound.len();
        self.bound.push(name.to_string());
        if bind_it {
            self.bound.push("it".to_string());
        }
        self.compile_nodes(body);
        self.bound.truncate(depth);

        let end = self.ops.len();
        self.ops.push(Op::EndLoop { begin });
        if let Op::BeginLoop { end: slot_end, .. } = &mut self.ops[begin] {
            *slot_end = end;
        }
    }

    fn path_slot(&mut self, expr: &str) -> usize {
        let expr = expr.trim();
        let path = Path::parse(expr);
        if let Ok(path) = &path {
            self.note_variable(path.head());
        }

        if let Some(&slot) = self.path_index.get(expr) {
            return slot;
        }
        let slot = self.path_slots.len();
        self.paths.push(expr.to_string());
        self.path_slots.push(PathSlot { path });
        self.path_index.insert(expr.to_string(), slot);
        slot
    }

    fn condition_slot(&mut self, source: &str) -> usize {
        let condition = Condition::parse(source);
        if let Ok(condition) = &condition {
            for path in condition.paths() {
                self.note_variable(path.head());
            }
        }

        if let Some(&slot) = self.condition_index.get(source) {
            return slot;
        }
        let slot = self.conditions.len();
        self.conditions.push(ConditionSlot {
            source: source.to_string(),
            condition,
        });
        self.condition_index.insert(source.to_string(), slot);
        slot
    }

    fn note_variable(&mut self, name: &str) {
        if self.bound.iter().any(|b| b == name) || self.variables.iter().any(|v| v == name) {
            return;
        }
        self.variables.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConditionEvalError;
    use pretty_assertions::assert_eq;
    use weave_parser::Parser;

    fn compile_source(source: &str) -> CompiledTemplate {
        compile(&Parser::parse(source).unwrap())
    }

    #[test]
    fn test_empty_template() {
        let compiled = compile_source("");
        assert!(compiled.ops().is_empty());
        assert_eq!(compiled.execute(&Context::new()).unwrap(), "");
    }

    #[test]
    fn test_ops_layout() {
        let compiled = compile_source("a{% for x in xs %}{{ x }}{% end %}b");
        assert_eq!(
            compiled.ops(),
            &[
                Op::Text("a".into()),
                Op::BeginLoop {
                    source: 0,
                    name: "x".into(),
                    bind_it: false,
                    end: 3,
                },
                Op::Emit(1),
                Op::EndLoop { begin: 1 },
                Op::Text("b".into()),
            ]
        );
    }

    #[test]
    fn test_if_else_layout() {
        let compiled = compile_source("{% if a %}1{% else %}2{% end %}");
        assert_eq!(
            compiled.ops(),
            &[
                Op::BeginIf { condition: 0, end: 2 },
                Op::Text("1".into()),
                Op::EndIf { begin: 0 },
                Op::BeginIf { condition: 1, end: 5 },
                Op::Text("2".into()),
                Op::EndIf { begin: 3 },
            ]
        );
    }

    #[test]
    fn test_adjacent_text_merged() {
        let compiled = compile_source("a{# c #}b{{ }}c");
        assert_eq!(compiled.ops(), &[Op::Text("abc".into())]);
    }

    #[test]
    fn test_paths_deduplicated() {
        let compiled = compile_source("{{ a.b }}{{ c }}{{ a.b }}{% for x in c %}{{ x }}{% end %}");
        assert_eq!(compiled.paths(), &["a.b", "c", "x"]);
        assert_eq!(compiled.ops()[2], Op::Emit(0));
    }

    #[test]
    fn test_variables_exclude_loop_bindings() {
        let compiled = compile_source(
            "{{ title }}{% for p in people %}{{ p.name }}{% if p.age > limit %}!{% end %}{% end %}\
             {% each tags %}{{ it }}{{ tags }}{% end %}{{ p }}",
        );
        assert_eq!(compiled.variables(), &["title", "people", "limit", "tags", "p"]);
    }

    #[test]
    fn test_deferred_errors() {
        let compiled = compile_source("{% if flag %}{{ a | upper }}{% end %}{% if x = %}{% end %}");
        let off = Context::new().with("flag", false);
        assert!(matches!(
            compiled.execute(&off),
            Err(RenderError::Condition(ConditionEvalError::Malformed { .. }))
        ));

        let compiled = compile_source("{% if flag %}{{ a | upper }}{% end %}");
        assert_eq!(compiled.execute(&off).unwrap(), "");
        let on = Context::new().with("flag", true);
        assert!(matches!(
            compiled.execute(&on),
            Err(RenderError::FiltersUnsupported { .. })
        ));
    }

    #[test]
    fn test_problems() {
        let compiled = compile_source(
            "{{ ok }}{{ a | upper }}{% if x = %}{% end %}{{ 1x }}{% if y | z %}{% end %}",
        );
        let problems = compiled.problems();
        assert_eq!(problems.len(), 4);
        assert_eq!(
            problems[0],
            RenderError::FiltersUnsupported {
                expr: "a | upper".into()
            }
        );
        assert_eq!(problems[1], RenderError::InvalidPath { expr: "1x".into() });
        assert!(matches!(
            problems[2],
            RenderError::Condition(ConditionEvalError::Malformed { .. })
        ));
        assert_eq!(
            problems[3],
            RenderError::FiltersUnsupported {
                expr: "y | z".into()
            }
        );

        assert!(compile_source("{{ a.b }}{% if a %}{% end %}").problems().is_empty());
    }

    #[test]
    fn test_listing() {
        let compiled = compile_source(
            "Hi {{ name }}\n{% each items %}{% if it > 1 %}{{ it }}{% end %}{% end %}",
        );
        assert_eq!(
            compiled.to_string(),
            "text \"Hi \"\n\
             emit name\n\
             text \"\\n\"\n\
             loop items (+it) in items\n\
             \x20 if it > 1\n\
             \x20   emit it\n\
             \x20 end if\n\
             end loop\n"
        );
    }

    #[test]
    fn test_reusable_across_contexts() {
        let compiled = compile_source("{% for n in ns %}{{ n }},{% end %}");
        let a = Context::new().with("ns", vec![1, 2]);
        let b = Context::new().with("ns", vec!["x"]);
        assert_eq!(compiled.execute(&a).unwrap(), "1,2,");
        assert_eq!(compiled.execute(&b).unwrap(), "x,");
        assert_eq!(compiled.execute(&a).unwrap(), "1,2,");
    }
}
