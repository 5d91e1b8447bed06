//! Reference canonicalization.
//!
//! A reference is either a bare id (`"Queue"`) or one of the one-key
//! intrinsic wrappers CloudFormation uses for indirection:
//!   {"Ref": "Queue"}
//!   {"Fn::GetAtt": ["Queue", "Arn"]}  or  {"Fn::GetAtt": "Queue.Arn"}
//!   {"Fn::Sub": "${Queue.Arn}"}
//!   {"Fn::ImportValue": "shared-queue-arn"}   (never local)

use crate::error::{ReactorError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A document node, classified by the wrapper it is (if any).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DocNode<'a> {
    Ref(&'a str),
    GetAtt { resource: &'a str, attribute: &'a str },
    ImportValue(&'a Value),
    Sub(&'a Value),
    Scalar(&'a Value),
    Map(&'a Map<String, Value>),
    Sequence(&'a [Value]),
}

impl<'a> DocNode<'a> {
    pub fn classify(v: &'a Value) -> Result<Self> {
        let map = match v {
            Value::Object(map) => map,
            Value::Array(items) => return Ok(DocNode::Sequence(items)),
            scalar => return Ok(DocNode::Scalar(scalar)),
        };
        let mut entries = map.iter();
        let (Some((key, inner)), None) = (entries.next(), entries.next()) else {
            return Ok(DocNode::Map(map));
        };
        let bad = || ReactorError::MalformedReference(v.to_string());

        match key.as_str() {
            "Ref" => inner.as_str().map(DocNode::Ref).ok_or_else(bad),
            "Fn::GetAtt" => match inner {
                Value::Array(parts) => match parts.as_slice() {
                    [Value::String(resource), Value::String(attribute)] => Ok(DocNode::GetAtt {
                        resource,
                        attribute,
                    }),
                    _ => Err(bad()),
                },
                Value::String(dotted) => dotted
                    .split_once('.')
                    .map(|(resource, attribute)| DocNode::GetAtt {
                        resource,
                        attribute,
                    })
                    .ok_or_else(bad),
                _ => Err(bad()),
            },
            "Fn::ImportValue" => Ok(DocNode::ImportValue(inner)),
            "Fn::Sub" => Ok(DocNode::Sub(inner)),
            _ => Ok(DocNode::Map(map)),
        }
    }

    pub fn is_wrapper(&self) -> bool {
        !matches!(
            self,
            DocNode::Scalar(_) | DocNode::Map(_) | DocNode::Sequence(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub is_local: bool,
}

impl Identity {
    /// The id, or `NonLocalReference` for callers that need a local graph.
    pub fn require_local(self) -> Result<String> {
        if self.is_local {
            Ok(self.id)
        } else {
            Err(ReactorError::NonLocalReference(self.id))
        }
    }
}

/// Local means the id is a known entity or a top-level section entry of
/// `document` (resources, parameters and so on). Pseudo parameters such as
/// `AWS::Region` and imports are never local.
pub fn resolve_identity(raw: &Value, document: &Value, known: &BTreeSet<String>) -> Result<Identity> {
    let id = match DocNode::classify(raw)? {
        DocNode::Ref(id) => id.to_string(),
        DocNode::Scalar(Value::String(id)) => id.clone(),
        DocNode::GetAtt { resource, .. } => resource.to_string(),
        DocNode::Sub(inner) => sub_target(inner)
            .ok_or_else(|| ReactorError::MalformedReference(raw.to_string()))?,
        DocNode::ImportValue(inner) => {
            let id = inner
                .as_str()
                .map_or_else(|| inner.to_string(), str::to_string);
            return Ok(Identity {
                id,
                is_local: false,
            });
        }
        DocNode::Scalar(_) | DocNode::Map(_) | DocNode::Sequence(_) => {
            return Err(ReactorError::MalformedReference(raw.to_string()));
        }
    };

    let is_local = !id.starts_with("AWS::") && (known.contains(&id) || in_document(document, &id));
    Ok(Identity { id, is_local })
}

/// `${Name}` or `${Name.Attr}`, and nothing else.
fn sub_target(inner: &Value) -> Option<String> {
    let body = inner.as_str()?.strip_prefix("${")?.strip_suffix('}')?;
    if body.is_empty() || body.contains(['$', '{', '}']) {
        return None;
    }
    let name = body.split_once('.').map_or(body, |(name, _)| name);
    Some(name.to_string())
}

fn in_document(document: &Value, id: &str) -> bool {
    document
        .as_object()
        .is_some_and(|sections| sections.values().any(|s| s.get(id).is_some()))
}
