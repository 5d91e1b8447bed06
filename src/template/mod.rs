//! Context substitution.
//!
//! Templates are parsed once into a [`TemplateNode`] tree (static subtrees
//! collapse to plain values) and rendered against a [`Context`] as often as
//! needed. Only string scalars carry placeholders; map keys are literal.

pub mod context;
pub mod parse;

pub use context::Context;
pub use parse::{Part, Placeholder, StringTemplate};

use crate::error::Result;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Static(Value),
    Text(StringTemplate),
    Array(Vec<TemplateNode>),
    Object(Vec<(String, TemplateNode)>),
}

impl TemplateNode {
    pub fn compile(template: &Value) -> Result<Self> {
        let node = match template {
            Value::String(s) => {
                let t = StringTemplate::parse(s)?;
                if t.is_literal() {
                    TemplateNode::Static(template.clone())
                } else {
                    TemplateNode::Text(t)
                }
            }
            Value::Array(items) => {
                let nodes = items
                    .iter()
                    .map(TemplateNode::compile)
                    .collect::<Result<Vec<_>>>()?;
                if nodes.iter().all(TemplateNode::is_static) {
                    TemplateNode::Static(template.clone())
                } else {
                    TemplateNode::Array(nodes)
                }
            }
            Value::Object(map) => {
                let entries = map
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), TemplateNode::compile(v)?)))
                    .collect::<Result<Vec<_>>>()?;
                if entries.iter().all(|(_, n)| n.is_static()) {
                    TemplateNode::Static(template.clone())
                } else {
                    TemplateNode::Object(entries)
                }
            }
            _ => TemplateNode::Static(template.clone()),
        };
        Ok(node)
    }

    pub fn is_static(&self) -> bool {
        matches!(self, TemplateNode::Static(_))
    }

    /// Produces a fresh tree; the template itself is never shared with the
    /// document.
    pub fn render(&self, ctx: &Context) -> Result<Value> {
        match self {
            TemplateNode::Static(v) => Ok(v.clone()),
            TemplateNode::Text(t) => t.render(ctx),
            TemplateNode::Array(nodes) => Ok(Value::Array(
                nodes
                    .iter()
                    .map(|n| n.render(ctx))
                    .collect::<Result<Vec<_>>>()?,
            )),
            TemplateNode::Object(entries) => {
                let mut map = Map::new();
                for (k, n) in entries {
                    map.insert(k.clone(), n.render(ctx)?);
                }
                Ok(Value::Object(map))
            }
        }
    }
}

/// Deep-clones `template`, substituting every placeholder.
pub fn inject(template: &Value, ctx: &Context) -> Result<Value> {
    TemplateNode::compile(template)?.render(ctx)
}

/// Renders `src` as text (used for path expressions).
pub fn interpolate(src: &str, ctx: &Context) -> Result<String> {
    StringTemplate::parse(src)?.render_text(ctx)
}

/// Text form of a value when it is concatenated into a larger string.
pub fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn inject_substitutes_nested_scalars() {
        let ctx = Context::new()
            .with("RESOURCE_ID", "Queue")
            .with("x", 5)
            .with("SETTING:Fifo", true);
        let template = json!({
            "Type": "AWS::SQS::Queue",
            "Properties": {
                "QueueName": "%{RESOURCE_ID|kebabCase}-queue",
                "DelaySeconds": "%{x}",
                "FifoQueue": "%{SETTING:Fifo}",
                "Tags": [{"Key": "id", "Value": "%{RESOURCE_ID}"}]
            }
        });
        assert_eq!(
            inject(&template, &ctx).unwrap(),
            json!({
                "Type": "AWS::SQS::Queue",
                "Properties": {
                    "QueueName": "queue-queue",
                    "DelaySeconds": 5,
                    "FifoQueue": true,
                    "Tags": [{"Key": "id", "Value": "Queue"}]
                }
            })
        );
    }

    #[test]
    fn number_placeholder_round_trip() {
        let ctx = Context::new().with("x", 5);
        assert_eq!(inject(&json!("%{x}"), &ctx).unwrap(), json!(5));
        assert_eq!(inject(&json!("a-%{x}-b"), &ctx).unwrap(), json!("a-5-b"));
    }

    #[test]
    fn static_subtrees_collapse() {
        let node = TemplateNode::compile(&json!({"a": [1, "b"], "c": {"d": null}})).unwrap();
        assert!(node.is_static());
        let node = TemplateNode::compile(&json!({"a": [1, "%{b}"]})).unwrap();
        assert!(!node.is_static());
    }

    #[test]
    fn interpolate_renders_objects_as_json_text() {
        let ctx = Context::new().with("id", "Queue").with("n", json!({"a": 1}));
        assert_eq!(
            interpolate("$.Resources.%{id}.Properties", &ctx).unwrap(),
            "$.Resources.Queue.Properties"
        );
        assert_eq!(interpolate("%{n}", &ctx).unwrap(), r#"{"a":1}"#);
    }
}
