//! Template validator.
//!
//! Runs at compile time, before any node executes. Walks every `${path}`
//! reference found in a node's params against the declared *shape* of its
//! root (an input, another node's output structure, or a reserved key) and
//! reports unknown paths before they become a runtime surprise.

use super::grammar::{self, Segment};
use crate::error::UserError;
use serde_json::Value;
use std::collections::BTreeMap;

/// The declared output shape of a node, to whatever depth its
/// [`crate::registry::NodeInterface`] documents. `Any` (e.g. a passthrough
/// or a dynamically-typed connector) stops descent: a path through an
/// `Any` node, or through a union type that includes `Any`, is treated as
/// unverifiable and therefore not an error.
#[derive(Debug, Clone)]
pub enum Shape {
    Any,
    Object(BTreeMap<String, Shape>),
    Array(Box<Shape>),
    /// A plain scalar (number, bool, unstructured string).
    Scalar,
    /// A string output that is frequently JSON (e.g. a shell node's
    /// `stdout`). Further traversal is allowed but flagged as a
    /// `JsonAutoParseWarning` rather than an error, since whether it
    /// actually parses can only be known at runtime.
    StringMaybeJson,
}

/// Non-fatal finding surfaced alongside (or instead of) a hard error.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    JsonAutoParseWarning { path: String },
}

/// Everything the validator needs to know about the compiled graph, without
/// depending on the registry or compiler modules directly.
pub trait StructureContext {
    fn is_declared_input(&self, name: &str) -> bool;
    fn node_output_shape(&self, node_id: &str) -> Option<&Shape>;
    fn is_reserved_root(&self, name: &str) -> bool;
    fn available_roots(&self) -> Vec<String>;
}

fn descend(
    shape: &Shape,
    segments: &[Segment],
    template: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), UserError> {
    let Some((seg, rest)) = segments.split_first() else {
        return Ok(());
    };
    match shape {
        Shape::Any => Ok(()),
        Shape::Object(fields) => match seg {
            Segment::Key(k) => match fields.get(k) {
                Some(next) => descend(next, rest, template, diagnostics),
                None => Err(UserError::UnknownOutput {
                    node_id: String::new(),
                    segment: k.clone(),
                    available: fields.keys().cloned().collect::<Vec<_>>().join(", "),
                }),
            },
            Segment::Index(_) => Err(UserError::InvalidTraversal {
                path: template.to_string(),
                segment: grammar::path_to_string(&[seg.clone()]),
            }),
        },
        Shape::Array(elem) => match seg {
            Segment::Index(_) => descend(elem, rest, template, diagnostics),
            Segment::Key(k) => Err(UserError::InvalidTraversal {
                path: template.to_string(),
                segment: k.clone(),
            }),
        },
        Shape::Scalar => Err(UserError::InvalidTraversal {
            path: template.to_string(),
            segment: grammar::path_to_string(&[seg.clone()]),
        }),
        Shape::StringMaybeJson => {
            diagnostics.push(Diagnostic::JsonAutoParseWarning {
                path: template.to_string(),
            });
            Ok(())
        }
    }
}

/// Validates one `${path}` template against the declared structure.
pub fn validate_path(
    raw_path: &str,
    ctx: &dyn StructureContext,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), UserError> {
    let path = grammar::parse_path_checked(raw_path)?;
    let (first, rest) = path
        .split_first()
        .ok_or_else(|| UserError::TemplateSyntax {
            template: format!("${{{}}}", raw_path),
            reason: "empty path".to_string(),
        })?;
    let Segment::Key(root) = first else {
        return Err(UserError::TemplateSyntax {
            template: format!("${{{}}}", raw_path),
            reason: "path must start with an identifier".to_string(),
        });
    };

    if ctx.is_reserved_root(root) || ctx.is_declared_input(root) {
        return Ok(());
    }

    match ctx.node_output_shape(root) {
        Some(shape) => {
            descend(shape, rest, raw_path, diagnostics).map_err(|e| match e {
                UserError::UnknownOutput {
                    segment, available, ..
                } => UserError::UnknownOutput {
                    node_id: root.clone(),
                    segment,
                    available,
                },
                other => other,
            })
        }
        None => Err(UserError::UnresolvedVariable {
            path: raw_path.to_string(),
            suggestions: suggest(root, &ctx.available_roots()),
        }),
    }
}

/// Cheap edit-distance-free suggestion: roots sharing a prefix with the
/// typo'd name, capped to keep error output short.
fn suggest(typo: &str, roots: &[String]) -> Vec<String> {
    let mut hits: Vec<String> = roots
        .iter()
        .filter(|r| r.starts_with(&typo[..typo.len().min(3)]) || typo.starts_with(&r[..r.len().min(3)]))
        .cloned()
        .collect();
    hits.truncate(5);
    hits
}

/// Walks a node's resolved-at-compile-time params tree collecting every
/// `${path}` reference, in document order.
fn collect_templates(tree: &Value, out: &mut Vec<String>) {
    match tree {
        Value::String(s) => {
            if let Ok((matches, _)) = grammar::scan(s) {
                out.extend(matches.into_iter().map(|m| m.raw_path.to_string()));
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_templates(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_templates(v, out)),
        _ => {}
    }
}

/// Validates every template referenced anywhere in `params`. Returns all
/// diagnostics and the first hard error encountered, if any. The compiler
/// aggregates this across all nodes before refusing to run a workflow.
pub fn validate_params(
    params: &Value,
    ctx: &dyn StructureContext,
) -> (Vec<Diagnostic>, Result<(), UserError>) {
    let mut templates = Vec::new();
    collect_templates(params, &mut templates);
    let mut diagnostics = Vec::new();
    for raw_path in templates {
        if let Err(e) = validate_path(&raw_path, ctx, &mut diagnostics) {
            return (diagnostics, Err(e));
        }
    }
    (diagnostics, Ok(()))
}
