//! Path query layer: parse, evaluate and mutate document nodes.
//!
//! The string entry points interpolate `%{...}` placeholders against a
//! [`Context`] before parsing, so rule paths such as
//! `$.Resources.%{RESOURCE_ID}.Properties` resolve per action. Substituted
//! text never changes how the path parses: a key segment that is not a plain
//! name is emitted as `['...']`, and text landing inside a quoted string is
//! escaped.
//!
//! It owns:
//! - NodePath (concrete address of one node)
//! - PathExpr (parsed expression: `$`/`@` origin plus segments)
//! - filter predicates for `[?( ... )]`

pub mod addr;
pub mod filter;
pub mod parse;
pub mod query;

pub use addr::{NodePath, Step};
pub use filter::FilterExpr;
pub use parse::{Origin, PathExpr, Segment};
pub use query::{Match, node, node_mut, remove_all};

use crate::error::Result;
use crate::template::{Context, Part, StringTemplate, value_to_text};
use serde_json::Value;

pub fn compile(path: &str, context: &Context) -> Result<PathExpr> {
    PathExpr::parse(&render_path(&StringTemplate::parse(path)?, context)?)
}

/// Renders a path template to path text.
///
///   `$.Resources.%{ID}.Type` with ID = "My.Queue" -> `$.Resources['My.Queue'].Type`
///   `$.Tags[%{key}]` with key = "Name"            -> `$.Tags['Name']`
///   `[?(@.Name == '%{N}')]` with N = "it's"        -> `[?(@.Name == 'it\'s')]`
pub fn render_path(template: &StringTemplate, ctx: &Context) -> Result<String> {
    let parts = template.parts();
    let mut out = String::new();
    let mut quote: Option<char> = None;
    for (i, part) in parts.iter().enumerate() {
        match part {
            Part::Literal(text) => {
                track_quotes(text, &mut quote);
                out.push_str(text);
            }
            Part::Placeholder(ph) => {
                let value = ph.resolve(ctx)?;
                let text = value_to_text(&value);
                let next = match parts.get(i + 1) {
                    Some(Part::Literal(t)) => t.chars().next(),
                    Some(Part::Placeholder(_)) => Some('%'),
                    None => None,
                };
                if let Some(q) = quote {
                    out.push_str(&escape(&text, q));
                } else if out.ends_with('.')
                    && !out.ends_with("..")
                    && matches!(next, None | Some('.') | Some('['))
                    && !addr::is_plain_key(&text)
                {
                    out.pop();
                    out.push_str(&format!("['{}']", escape(&text, '\'')));
                } else if out.ends_with('[') && next == Some(']') && value.is_string() {
                    out.push_str(&format!("'{}'", escape(&text, '\'')));
                } else {
                    out.push_str(&text);
                }
            }
        }
    }
    Ok(out)
}

fn track_quotes(text: &str, quote: &mut Option<char>) {
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match *quote {
            Some(_) if c == '\\' => {
                chars.next();
            }
            Some(q) if c == q => *quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => *quote = Some(c),
            None => {}
        }
    }
}

fn escape(text: &str, quote: char) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\\' || c == quote {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn find(
    path: &str,
    root: &Value,
    local_root: Option<&NodePath>,
    context: &Context,
) -> Result<Vec<Match>> {
    compile(path, context)?.find(root, local_root)
}

pub fn get(
    path: &str,
    root: &Value,
    local_root: Option<&NodePath>,
    context: &Context,
) -> Result<Option<Value>> {
    compile(path, context)?.get(root, local_root)
}

pub fn set(
    path: &str,
    root: &mut Value,
    local_root: Option<&NodePath>,
    value: Value,
    context: &Context,
) -> Result<NodePath> {
    compile(path, context)?.set(root, local_root, value)
}

pub fn delete(
    path: &str,
    root: &mut Value,
    local_root: Option<&NodePath>,
    context: &Context,
) -> Result<Vec<NodePath>> {
    compile(path, context)?.delete(root, local_root)
}
