//! Named value transforms.
//!
//! The registry is fixed at compile time. Rules reference transforms by
//! name (`kebabCase`, `toFixed(2)`, ...) and every reference is resolved
//! when the rule is loaded, so an unknown name never reaches dispatch.

mod builtin;
mod case;

use crate::error::{ReactorError, Result};
use crate::template::Context;
use crate::template::parse::split_top_level;
use crate::path::parse::read_quoted;
use serde_json::Value;
use std::fmt;

pub type TransformFn = fn(&Value, &Context, &[String]) -> Result<Value>;

pub struct TransformDef {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub func: TransformFn,
}

const fn def(name: &'static str, min_args: usize, max_args: usize, func: TransformFn) -> TransformDef {
    TransformDef {
        name,
        min_args,
        max_args,
        func,
    }
}

static REGISTRY: &[TransformDef] = &[
    // case
    def("upperCase", 0, 0, builtin::upper_case),
    def("lowerCase", 0, 0, builtin::lower_case),
    def("camelCase", 0, 0, builtin::camel_case),
    def("pascalCase", 0, 0, builtin::pascal_case),
    def("kebabCase", 0, 0, builtin::kebab_case),
    def("snakeCase", 0, 0, builtin::snake_case),
    // boolean
    def("toBoolean", 0, 0, builtin::to_boolean),
    def("not", 0, 0, builtin::not),
    // json
    def("jsonEncode", 0, 0, builtin::json_encode),
    def("jsonDecode", 0, 0, builtin::json_decode),
    // numeric
    def("toNumber", 0, 0, builtin::to_number),
    def("toInteger", 0, 0, builtin::to_integer),
    def("toFixed", 0, 1, builtin::to_fixed),
    def("multiply", 1, 1, builtin::multiply),
    def("toString", 0, 0, builtin::to_string),
    // strings and collections
    def("prefix", 1, 1, builtin::prefix),
    def("suffix", 1, 1, builtin::suffix),
    def("replace", 2, 2, builtin::replace),
    def("split", 1, 1, builtin::split),
    def("join", 1, 1, builtin::join),
    def("keys", 0, 0, builtin::keys),
    def("values", 0, 0, builtin::values),
    def("length", 0, 0, builtin::length),
    def("equals", 1, 1, builtin::equals),
    def("fallback", 1, 1, builtin::fallback),
    // template derivations
    def("logicalId", 0, 0, builtin::logical_id),
    def("ref", 0, 0, builtin::reference),
    def("getAtt", 1, 1, builtin::get_att),
    def("sub", 0, 0, builtin::sub),
    def("nullIfEmpty", 0, 0, builtin::null_if_empty),
    def("nullIfFalse", 0, 0, builtin::null_if_false),
];

pub fn lookup(name: &str) -> Option<&'static TransformDef> {
    REGISTRY.iter().find(|d| d.name == name)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|d| d.name)
}

/// A transform reference with its literal arguments, e.g. `toFixed(2)`.
#[derive(Clone)]
pub struct TransformCall {
    def: &'static TransformDef,
    args: Vec<String>,
}

impl TransformCall {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let (name, args) = match spec.find('(') {
            Some(open) => {
                let Some(inner) = spec[open + 1..].strip_suffix(')') else {
                    return Err(ReactorError::malformed_template(
                        spec,
                        "transform arguments must end with ')'",
                    ));
                };
                (spec[..open].trim(), parse_args(spec, inner)?)
            }
            None => (spec, Vec::new()),
        };

        let def = lookup(name).ok_or_else(|| ReactorError::UnknownTransform {
            name: name.to_string(),
        })?;
        if args.len() < def.min_args || args.len() > def.max_args {
            return Err(ReactorError::malformed_template(
                spec,
                format!(
                    "'{}' takes {}..={} arguments, got {}",
                    def.name,
                    def.min_args,
                    def.max_args,
                    args.len()
                ),
            ));
        }
        Ok(Self { def, args })
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn apply(&self, value: &Value, ctx: &Context) -> Result<Value> {
        (self.def.func)(value, ctx, &self.args)
    }
}

impl fmt::Debug for TransformCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.def.name, self.args.join(", "))
    }
}

impl PartialEq for TransformCall {
    fn eq(&self, other: &Self) -> bool {
        self.def.name == other.def.name && self.args == other.args
    }
}

fn parse_args(spec: &str, inner: &str) -> Result<Vec<String>> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(inner, ',')
        .into_iter()
        .map(|raw| {
            let raw = raw.trim();
            let mut chars = raw.chars();
            match chars.next() {
                Some(q @ ('\'' | '"')) => {
                    let rest: Vec<char> = chars.collect();
                    match read_quoted(&rest, q) {
                        Some((text, used)) if used == rest.len() => Ok(text),
                        _ => Err(ReactorError::malformed_template(spec, "bad quoted argument")),
                    }
                }
                _ => Ok(raw.to_string()),
            }
        })
        .collect()
}

/// Runs `calls` left to right.
pub fn apply_all(calls: &[TransformCall], value: Value, ctx: &Context) -> Result<Value> {
    calls
        .iter()
        .try_fold(value, |acc, call| call.apply(&acc, ctx))
}

/// Parses a list of transform specs as written in rule data.
pub fn parse_all(specs: &[String]) -> Result<Vec<TransformCall>> {
    specs.iter().map(|s| TransformCall::parse(s)).collect()
}
