//! Bindings locate the document nodes an edit works on.
//!
//! JSON shapes accepted for an edit's `Path`:
//!   "$.Resources.%{RESOURCE_ID}.Properties.Name"
//!   { "Path": "...", "Transformations": ["toBoolean"] }
//!   [ "$.Resources[?(@.Type == 'AWS::SQS::Queue')]",          // sub-binding
//!     { "Path": "@.Properties.Tags[*]", "KeyTransformations": [], "ValueTransformations": [] },
//!     "$.Resources.%{keys.0}.Properties.Tags[%{key}].Value" ] // final path
//!
//! Every element but the last is a sub-binding: each match fans the current
//! context out into a derived one carrying `key`, `value`, `keys` and
//! `values`. Stages chain per context, so stage two sees the fields stage one
//! produced.

use crate::error::{ReactorError, Result};
use crate::path::{self, NodePath, PathExpr, Step};
use crate::template::{Context, StringTemplate};
use crate::transform::{self, TransformCall};
use serde::Deserialize;
use serde_json::{Number, Value};
use tracing::trace;

/// A path expression that may still contain placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct PathTemplate {
    template: StringTemplate,
    compiled: Option<PathExpr>,
}

impl PathTemplate {
    /// Placeholder-free paths are parsed (and so validated) right away.
    pub fn parse(src: &str) -> Result<Self> {
        let template = StringTemplate::parse(src)?;
        let compiled = if template.is_literal() {
            Some(PathExpr::parse(src)?)
        } else {
            None
        };
        Ok(Self { template, compiled })
    }

    pub fn source(&self) -> &str {
        self.template.source()
    }

    pub fn resolve(&self, ctx: &Context) -> Result<PathExpr> {
        match &self.compiled {
            Some(expr) => Ok(expr.clone()),
            None => PathExpr::parse(&path::render_path(&self.template, ctx)?),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubBinding {
    pub path: PathTemplate,
    pub key_transforms: Vec<TransformCall>,
    pub value_transforms: Vec<TransformCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub stages: Vec<SubBinding>,
    pub target: PathTemplate,
    pub transformations: Vec<TransformCall>,
}

/// Output of [`resolve`]: the final path plus one context per fan-out match.
/// Contexts hold snapshots, so edits may mutate the document while they are
/// consumed.
#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    pub target: &'a PathTemplate,
    pub contexts: Vec<Context>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawBinding {
    Path(String),
    Staged(Vec<RawStage>),
    Object(RawBindingObject),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RawBindingObject {
    #[serde(default)]
    pub path: Option<RawPath>,

    #[serde(default)]
    pub transformations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPath {
    Single(String),
    Staged(Vec<RawStage>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawStage {
    Path(String),
    Object(RawStageObject),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RawStageObject {
    pub path: String,

    #[serde(default)]
    pub key_transformations: Vec<String>,

    #[serde(default)]
    pub value_transformations: Vec<String>,
}

impl Binding {
    pub fn path(src: &str) -> Result<Self> {
        Ok(Self {
            stages: Vec::new(),
            target: PathTemplate::parse(src)?,
            transformations: Vec::new(),
        })
    }

    pub fn from_raw(raw: &RawBinding) -> Result<Self> {
        match raw {
            RawBinding::Path(p) => Self::path(p),
            RawBinding::Staged(stages) => Self::from_stages(stages, Vec::new()),
            RawBinding::Object(obj) => {
                let transformations = transform::parse_all(&obj.transformations)?;
                match &obj.path {
                    Some(RawPath::Single(p)) => Ok(Self {
                        transformations,
                        ..Self::path(p)?
                    }),
                    Some(RawPath::Staged(stages)) => Self::from_stages(stages, transformations),
                    None => Err(ReactorError::MalformedBinding(
                        "binding object has no Path".into(),
                    )),
                }
            }
        }
    }

    fn from_stages(stages: &[RawStage], transformations: Vec<TransformCall>) -> Result<Self> {
        let Some((last, subs)) = stages.split_last() else {
            return Err(ReactorError::MalformedBinding("empty Path list".into()));
        };
        let target = match last {
            RawStage::Path(p) => PathTemplate::parse(p)?,
            RawStage::Object(obj)
                if obj.key_transformations.is_empty() && obj.value_transformations.is_empty() =>
            {
                PathTemplate::parse(&obj.path)?
            }
            RawStage::Object(obj) => {
                return Err(ReactorError::MalformedBinding(format!(
                    "final path '{}' cannot carry key/value transformations",
                    obj.path
                )));
            }
        };
        let stages = subs
            .iter()
            .map(|s| match s {
                RawStage::Path(p) => Ok(SubBinding {
                    path: PathTemplate::parse(p)?,
                    key_transforms: Vec::new(),
                    value_transforms: Vec::new(),
                }),
                RawStage::Object(obj) => Ok(SubBinding {
                    path: PathTemplate::parse(&obj.path)?,
                    key_transforms: transform::parse_all(&obj.key_transformations)?,
                    value_transforms: transform::parse_all(&obj.value_transformations)?,
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            stages,
            target,
            transformations,
        })
    }
}

fn step_value(step: Option<&Step>) -> Value {
    match step {
        Some(Step::Key(k)) => Value::String(k.clone()),
        Some(Step::Index(i)) => Value::Number(Number::from(*i as u64)),
        None => Value::Null,
    }
}

fn appended(ctx: &Context, field: &str, item: Value) -> Value {
    let mut list = match ctx.get(field) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    list.push(item);
    Value::Array(list)
}

/// Expands `context` through the binding's sub-bindings.
pub fn resolve<'a>(
    document: &Value,
    local_root: Option<&NodePath>,
    binding: &'a Binding,
    context: &Context,
) -> Result<Resolved<'a>> {
    let mut contexts = vec![context.clone()];

    for stage in &binding.stages {
        let mut next = Vec::new();
        for ctx in &contexts {
            let expr = stage.path.resolve(ctx)?;
            let matches = expr.find(document, local_root)?;
            trace!(path = %expr, matches = matches.len(), "sub-binding");
            for m in matches {
                let key = transform::apply_all(&stage.key_transforms, step_value(m.path.last()), ctx)?;
                let value = transform::apply_all(&stage.value_transforms, m.value, ctx)?;
                let mut derived = ctx.clone();
                derived.insert("keys", appended(ctx, "keys", key.clone()));
                derived.insert("values", appended(ctx, "values", value.clone()));
                derived.insert("key", key);
                derived.insert("value", value);
                next.push(derived);
            }
        }
        contexts = next;
    }

    Ok(Resolved {
        target: &binding.target,
        contexts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn binding(raw: Value) -> Binding {
        Binding::from_raw(&serde_json::from_value(raw).unwrap()).unwrap()
    }

    fn doc() -> Value {
        json!({
            "Resources": {
                "A": {"Type": "AWS::SQS::Queue", "Properties": {"Tags": [{"Key": "x"}, {"Key": "y"}]}},
                "B": {"Type": "AWS::SNS::Topic"},
                "C": {"Type": "AWS::SQS::Queue", "Properties": {"Tags": [{"Key": "z"}]}}
            }
        })
    }

    #[test]
    fn bare_path_passes_single_context_through() {
        let b = binding(json!("$.Resources.%{RESOURCE_ID}"));
        let ctx = Context::new().with("RESOURCE_ID", "A");
        let r = resolve(&doc(), None, &b, &ctx).unwrap();
        assert_eq!(r.contexts, vec![ctx]);
        assert_eq!(r.target.source(), "$.Resources.%{RESOURCE_ID}");
    }

    #[test]
    fn one_sub_binding_fans_out_per_match() {
        let b = binding(json!([
            "$.Resources[?(@.Type == 'AWS::SQS::Queue')]",
            "$.Resources.%{key}.Properties.VisibilityTimeout"
        ]));
        let r = resolve(&doc(), None, &b, &Context::new()).unwrap();
        let keys: Vec<Value> = r.contexts.iter().map(|c| c.get("key").cloned().unwrap()).collect();
        assert_eq!(keys, vec![json!("A"), json!("C")]);
        assert_eq!(r.contexts[0].get("value").unwrap()["Type"], json!("AWS::SQS::Queue"));
        assert_eq!(r.contexts[1].get("keys"), Some(&json!(["C"])));
    }

    #[test]
    fn chained_stages_compose_per_context() {
        let b = binding(json!({
            "Path": [
                {"Path": "$.Resources[?(@.Type == 'AWS::SQS::Queue')]", "KeyTransformations": ["lowerCase"]},
                {"Path": "$.Resources.%{keys.0|upperCase}.Properties.Tags[*]", "ValueTransformations": ["jsonEncode"]},
                "$.Resources.%{keys.0|upperCase}.Properties.Tags[%{key}].Value"
            ],
            "Transformations": ["toString"]
        }));
        let r = resolve(&doc(), None, &b, &Context::new()).unwrap();
        // A has two tags, C has one: 3 contexts, not a cross product.
        assert_eq!(r.contexts.len(), 3);
        assert_eq!(r.contexts[0].get("keys"), Some(&json!(["a", 0])));
        assert_eq!(r.contexts[2].get("keys"), Some(&json!(["c", 0])));
        assert_eq!(r.contexts[1].get("value"), Some(&json!(r#"{"Key":"y"}"#)));
        assert_eq!(r.contexts[1].get("values").unwrap().as_array().unwrap().len(), 2);
        assert_eq!(b.transformations.len(), 1);
    }

    #[test]
    fn fanned_out_keys_with_dots_stay_one_segment() {
        let doc = json!({
            "Resources": {
                "api.v1": {"Type": "AWS::Serverless::Api"},
                "api": {"v1": {"Type": "Decoy"}}
            }
        });
        let b = binding(json!([
            "$.Resources[?(@.Type == 'AWS::Serverless::Api')]",
            "$.Resources.%{key}.Type"
        ]));
        let r = resolve(&doc, None, &b, &Context::new()).unwrap();
        assert_eq!(r.contexts.len(), 1);
        let target = r.target.resolve(&r.contexts[0]).unwrap();
        assert_eq!(target.get(&doc, None).unwrap(), Some(json!("AWS::Serverless::Api")));
    }

    #[test]
    fn no_matches_means_no_contexts() {
        let b = binding(json!(["$.Resources[?(@.Type == 'Nope')]", "$.x"]));
        assert!(resolve(&doc(), None, &b, &Context::new()).unwrap().contexts.is_empty());
    }

    #[test]
    fn malformed_bindings() {
        let bad = |raw: Value| Binding::from_raw(&serde_json::from_value(raw).unwrap());
        assert!(bad(json!([])).is_err());
        assert!(bad(json!({"Transformations": []})).is_err());
        assert!(bad(json!(["$.a", {"Path": "$.b", "KeyTransformations": ["lowerCase"]}])).is_err());
        assert!(bad(json!("Resources.a")).is_err());
        assert!(bad(json!({"Path": "$.a", "Transformations": ["nope"]})).is_err());
    }
}
