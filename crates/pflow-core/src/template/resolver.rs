//! Template resolver.
//!
//! Substitutes `${path}` expressions against a [`TemplateContext`],
//! preserving native types for simple (whole-string) templates and
//! rendering canonical JSON for complex (in-string) interpolation.

use super::grammar::{self, Path, Segment};
use crate::error::UserError;
use serde_json::Value;

/// Largest string the auto-parser will attempt to treat as JSON.
pub const MAX_JSON_PARSE_BYTES: usize = 10_485_760;

/// Anything templates can resolve paths against. [`crate::store::SharedStore`]
/// is the production implementation; plain JSON objects are used directly in
/// tests.
pub trait TemplateContext {
    /// Looks up the first path segment (an input name, node id, or reserved
    /// key) and returns its value, or `None` if it doesn't exist.
    fn lookup_root(&self, key: &str) -> Option<Value>;

    /// Root keys available, for `UnresolvedVariable` remediation
    /// suggestions. Default: no suggestions.
    fn available_roots(&self) -> Vec<String> {
        Vec::new()
    }
}

impl TemplateContext for serde_json::Map<String, Value> {
    fn lookup_root(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }

    fn available_roots(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

fn looks_like_json_start(s: &str) -> bool {
    match s.trim_start().chars().next() {
        Some(c) => matches!(c, '{' | '[' | '"' | 't' | 'f' | 'n' | '-') || c.is_ascii_digit(),
        None => false,
    }
}

/// Attempts to parse `s` as JSON, used when traversal needs to index
/// further into a string value. A parse "failure" (including values that
/// don't look like JSON, or parse to a scalar) is not an error: it just
/// means traversal can't continue, and the caller reports the path as
/// not found.
fn auto_parse(s: &str) -> Option<Value> {
    if s.len() > MAX_JSON_PARSE_BYTES || !looks_like_json_start(s) {
        return None;
    }
    match serde_json::from_str::<Value>(s) {
        Ok(v @ Value::Object(_)) | Ok(v @ Value::Array(_)) => Some(v),
        _ => None,
    }
}

/// Descends through `current` following `segments`, auto-parsing string
/// values as needed. Returns `None` if any segment can't be resolved;
/// `Some(Value::Null)` means the path resolved to an explicit JSON null,
/// which counts as present.
fn traverse(mut current: Value, segments: &[Segment]) -> Option<Value> {
    for seg in segments {
        current = match seg {
            Segment::Key(k) => match current {
                Value::Object(ref map) => map.get(k).cloned()?,
                Value::String(ref s) => match auto_parse(s)? {
                    Value::Object(map) => map.get(k).cloned()?,
                    _ => return None,
                },
                _ => return None,
            },
            Segment::Index(i) => {
                if *i < 0 {
                    return None;
                }
                let idx = *i as usize;
                match current {
                    Value::Array(ref arr) => arr.get(idx).cloned()?,
                    Value::String(ref s) => match auto_parse(s)? {
                        Value::Array(arr) => arr.get(idx).cloned()?,
                        _ => return None,
                    },
                    _ => return None,
                }
            }
        };
    }
    Some(current)
}

/// Resolves a parsed path against a context, root segment first.
pub fn resolve_path(path: &Path, ctx: &dyn TemplateContext) -> Option<Value> {
    let (first, rest) = path.split_first()?;
    let key = match first {
        Segment::Key(k) => k,
        Segment::Index(_) => return None,
    };
    let root = ctx.lookup_root(key)?;
    traverse(root, rest)
}

/// Must stay in lockstep with [`resolve_template`]'s notion of "resolved".
pub fn variable_exists(raw_path: &str, ctx: &dyn TemplateContext) -> Result<bool, UserError> {
    let path = grammar::parse_path_checked(raw_path)?;
    Ok(resolve_path(&path, ctx).is_some())
}

/// Renders a resolved value for complex (in-string) interpolation.
/// Containers render as canonical JSON; `serde_json::Map` is a `BTreeMap`
/// by default, so key order here is always sorted and deterministic
/// without extra bookkeeping.
fn render_for_interpolation(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(v).unwrap_or_else(|_| "null".to_string())
        }
    }
}

enum Event<'a> {
    Escape,
    Template(grammar::Match<'a>),
}

/// A whole-string template (`"${path}"`) resolves to the native value at
/// that path, preserving its type. Any other string renders complex
/// interpolations to text, leaving unresolved `${...}` fragments and
/// `$$`-escapes intact per their own rules.
pub fn resolve_template(s: &str, ctx: &dyn TemplateContext) -> Result<Value, UserError> {
    if grammar::is_simple_template(s) {
        let raw_path = &s[2..s.len() - 1];
        let path = grammar::parse_path_checked(raw_path)?;
        return match resolve_path(&path, ctx) {
            Some(v) => Ok(v),
            None => Ok(Value::String(s.to_string())),
        };
    }

    if !s.contains('$') {
        return Ok(Value::String(s.to_string()));
    }

    let (matches, escapes) = grammar::scan(s).map_err(|reason| UserError::TemplateSyntax {
        template: s.to_string(),
        reason,
    })?;
    if matches.is_empty() && escapes.is_empty() {
        return Ok(Value::String(s.to_string()));
    }

    let mut events: Vec<(usize, usize, Event)> = escapes
        .into_iter()
        .map(|pos| (pos, pos + 2, Event::Escape))
        .chain(
            matches
                .into_iter()
                .map(|m| (m.start, m.end, Event::Template(m))),
        )
        .collect();
    events.sort_by_key(|(start, _, _)| *start);

    let mut out = String::with_capacity(s.len());
    let mut cursor = 0usize;
    for (start, end, event) in events {
        out.push_str(&s[cursor..start]);
        match event {
            Event::Escape => out.push('$'),
            Event::Template(m) => {
                let path = grammar::parse_path_checked(m.raw_path)?;
                match resolve_path(&path, ctx) {
                    Some(v) => out.push_str(&render_for_interpolation(&v)),
                    None => out.push_str(m.full),
                }
            }
        }
        cursor = end;
    }
    out.push_str(&s[cursor..]);
    Ok(Value::String(out))
}

/// Walks any JSON value, substituting template strings, and preserves
/// container identity of the result (structural copy). Resolution is
/// idempotent because a string with no `${` is returned unchanged.
pub fn resolve_nested(tree: &Value, ctx: &dyn TemplateContext) -> Result<Value, UserError> {
    match tree {
        Value::String(s) => resolve_template(s, ctx),
        Value::Array(items) => {
            let resolved: Result<Vec<Value>, UserError> =
                items.iter().map(|v| resolve_nested(v, ctx)).collect();
            Ok(Value::Array(resolved?))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), resolve_nested(v, ctx)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Finds the first `${...}` fragment left over in an already-resolved tree
/// (i.e. a variable the Validator should have caught but didn't, or one
/// whose declared shape didn't hold at runtime). Used by the Node Lifecycle
/// Runtime to raise `UnresolvedVariable` instead of silently handing a node
/// a literal `${...}` string.
pub fn find_unresolved(tree: &Value) -> Option<String> {
    match tree {
        Value::String(s) => grammar::scan(s)
            .ok()
            .and_then(|(matches, _)| matches.into_iter().next())
            .map(|m| m.raw_path.to_string()),
        Value::Array(items) => items.iter().find_map(find_unresolved),
        Value::Object(map) => map.values().find_map(find_unresolved),
        _ => None,
    }
}
