//! `%{key|transform(args)|...}` string templates, parsed once into parts.

use crate::error::{ReactorError, Result};
use crate::template::Context;
use crate::template::value_to_text;
use crate::transform::{self, TransformCall};
use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub key: String,
    pub transforms: Vec<TransformCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Literal(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringTemplate {
    source: String,
    parts: Vec<Part>,
}

impl StringTemplate {
    pub fn parse(src: &str) -> Result<Self> {
        // 1) the placeholder body: anything but braces
        const PLACEHOLDER_RE: &str = r"%\{([^{}]*)\}";
        let re = Regex::new(PLACEHOLDER_RE)?;

        let mut parts = Vec::new();
        let mut last = 0;
        for caps in re.captures_iter(src) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                parts.push(Part::Literal(src[last..whole.start()].to_string()));
            }
            parts.push(Part::Placeholder(parse_placeholder(src, body.as_str())?));
            last = whole.end();
        }
        if last < src.len() {
            parts.push(Part::Literal(src[last..].to_string()));
        }

        for part in &parts {
            if let Part::Literal(text) = part {
                if text.contains("%{") {
                    return Err(ReactorError::malformed_template(src, "unterminated placeholder"));
                }
            }
        }

        Ok(Self {
            source: src.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn is_literal(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Literal(_)))
    }

    /// Renders against `ctx`. A template that is exactly one placeholder
    /// keeps the substituted value's type; anything else concatenates text.
    pub fn render(&self, ctx: &Context) -> Result<Value> {
        if let [Part::Placeholder(ph)] = self.parts.as_slice() {
            return ph.resolve(ctx);
        }
        self.render_text(ctx).map(Value::String)
    }

    pub fn render_text(&self, ctx: &Context) -> Result<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Placeholder(ph) => out.push_str(&value_to_text(&ph.resolve(ctx)?)),
            }
        }
        Ok(out)
    }
}

impl Placeholder {
    /// The context value for this placeholder, transforms applied.
    pub fn resolve(&self, ctx: &Context) -> Result<Value> {
        let value = ctx
            .lookup(&self.key)
            .cloned()
            .ok_or_else(|| ReactorError::unresolvable(&self.key))?;
        transform::apply_all(&self.transforms, value, ctx)
    }
}

fn parse_placeholder(src: &str, body: &str) -> Result<Placeholder> {
    let pieces = split_top_level(body, '|');
    let key = pieces.first().map(|k| k.trim()).unwrap_or_default();
    if key.is_empty() {
        return Err(ReactorError::malformed_template(src, "empty placeholder key"));
    }
    let transforms = pieces[1..]
        .iter()
        .map(|spec| TransformCall::parse(spec.trim()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Placeholder {
        key: key.to_string(),
        transforms,
    })
}

/// Splits on `sep` outside quotes and parentheses.
pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                buf.push(c);
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        buf.push(next);
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    buf.push(c);
                }
                '(' => {
                    depth += 1;
                    buf.push(c);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    buf.push(c);
                }
                c if c == sep && depth == 0 => out.push(std::mem::take(&mut buf)),
                c => buf.push(c),
            },
        }
    }
    out.push(buf);
    out
}
