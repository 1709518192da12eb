//! Structural removal of passing test units from a Python test file.
//!
//! The source is parsed with tree-sitter and edited by byte range, so every
//! statement that survives is carried over byte-for-byte. Only whole lines
//! belonging to a removed unit are dropped.

use std::collections::HashSet;
use std::ops::Range;

use tree_sitter::{Node, Parser, Tree};

use crate::error::{Error, Result};
use crate::parser::{Outcome, TestOutcome};

/// Result of a prune.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pruned {
    pub source: String,
    /// Names of the removed functions, methods, and classes.
    pub removed: Vec<String>,
    /// Test units (`test*` functions and methods) left in `source`.
    pub remaining_units: Vec<String>,
}

impl Pruned {
    /// True if the output still contains at least one test unit.
    pub fn has_units(&self) -> bool {
        !self.remaining_units.is_empty()
    }
}

fn parse_python(source: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::language())
        .map_err(|e| Error::Prune(format!("python grammar unavailable: {}", e)))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| Error::Prune("parser produced no tree".to_string()))?;

    if tree.root_node().has_error() {
        return Err(Error::Prune("source contains syntax errors".to_string()));
    }
    Ok(tree)
}

/// Unwraps `@decorator` wrappers to the underlying definition.
fn definition(node: Node<'_>) -> Node<'_> {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition").unwrap_or(node)
    } else {
        node
    }
}

fn name_of<'s>(node: Node<'_>, source: &'s str) -> Option<&'s str> {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
}

fn is_test_function(name: &str) -> bool {
    name.starts_with("test")
}

fn is_test_class(name: &str) -> bool {
    name.starts_with("Test")
}

/// Byte range covering every full line the node spans, including the newline.
fn line_span(source: &str, node: Node<'_>) -> Range<usize> {
    let start = source[..node.start_byte()]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = if source[..node.end_byte()].ends_with('\n') {
        node.end_byte()
    } else {
        source[node.end_byte()..]
            .find('\n')
            .map(|i| node.end_byte() + i + 1)
            .unwrap_or(source.len())
    };
    start..end
}

/// Methods defined directly in a class body, with their outer (decorated) node.
fn methods<'t>(class: Node<'t>, source: &str) -> Vec<(Node<'t>, String)> {
    let Some(body) = class.child_by_field_name("body") else {
        return Vec::new();
    };
    let mut cursor = body.walk();
    body.children(&mut cursor)
        .filter_map(|child| {
            let def = definition(child);
            if def.kind() != "function_definition" {
                return None;
            }
            name_of(def, source).map(|name| (child, name.to_string()))
        })
        .collect()
}

/// Lists the test units in `source`: `test*` top-level functions and `test*`
/// methods of `Test*` classes (as `Class::method`).
pub fn test_units(source: &str) -> Result<Vec<String>> {
    let tree = parse_python(source)?;
    let root = tree.root_node();
    let mut units = Vec::new();

    let mut cursor = root.walk();
    for node in root.children(&mut cursor) {
        let def = definition(node);
        let Some(name) = name_of(def, source) else {
            continue;
        };
        match def.kind() {
            "function_definition" if is_test_function(name) => units.push(name.to_string()),
            "class_definition" if is_test_class(name) => {
                for (_, method) in methods(def, source) {
                    if is_test_function(&method) {
                        units.push(format!("{}::{}", name, method));
                    }
                }
            }
            _ => {}
        }
    }

    Ok(units)
}

/// Names that passed and never failed or errored in `outcomes`.
fn passing_names(outcomes: &[TestOutcome]) -> HashSet<&str> {
    let failing: HashSet<&str> = outcomes
        .iter()
        .filter(|t| t.outcome.is_failure())
        .map(|t| t.unit_name())
        .collect();

    outcomes
        .iter()
        .filter(|t| t.outcome == Outcome::Passed)
        .map(|t| t.unit_name())
        .filter(|name| !failing.contains(name))
        .collect()
}

/// Removes passing test units from `source`.
///
/// A top-level function whose name passed is dropped. A `Test*` class loses its
/// passing methods and is dropped entirely when no method is left. Every
/// other statement is kept verbatim and in order.
pub fn prune(source: &str, outcomes: &[TestOutcome]) -> Result<Pruned> {
    let tree = parse_python(source)?;
    let root = tree.root_node();
    let passing = passing_names(outcomes);

    let mut cuts: Vec<Range<usize>> = Vec::new();
    let mut removed = Vec::new();

    let mut cursor = root.walk();
    for node in root.children(&mut cursor) {
        let def = definition(node);
        let Some(name) = name_of(def, source) else {
            continue;
        };

        match def.kind() {
            "function_definition" if passing.contains(name) => {
                cuts.push(line_span(source, node));
                removed.push(name.to_string());
            }
            "class_definition" if is_test_class(name) => {
                let (pruned, kept): (Vec<_>, Vec<_>) = methods(def, source)
                    .into_iter()
                    .partition(|(_, method)| passing.contains(method.as_str()));

                if pruned.is_empty() {
                    continue;
                }
                if kept.is_empty() {
                    cuts.push(line_span(source, node));
                    removed.push(name.to_string());
                } else {
                    for (method_node, method) in pruned {
                        cuts.push(line_span(source, method_node));
                        removed.push(format!("{}::{}", name, method));
                    }
                }
            }
            _ => {}
        }
    }

    if cuts.is_empty() {
        return Ok(Pruned {
            source: source.to_string(),
            removed,
            remaining_units: test_units(source)?,
        });
    }

    cuts.sort_by_key(|r| r.start);
    let mut output = String::with_capacity(source.len());
    let mut cursor_pos = 0;
    for cut in &cuts {
        if cut.start > cursor_pos {
            output.push_str(&source[cursor_pos..cut.start]);
        }
        cursor_pos = cursor_pos.max(cut.end);
    }
    output.push_str(&source[cursor_pos..]);

    let remaining_units = test_units(&output)
        .map_err(|e| Error::Prune(format!("pruned output no longer parses: {}", e)))?;

    tracing::info!(
        removed = ?removed,
        remaining = remaining_units.len(),
        "pruned passing tests"
    );

    Ok(Pruned {
        source: output,
        removed,
        remaining_units,
    })
}
