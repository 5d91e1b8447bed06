//! Typed document edits, compiled from their JSON form.

use crate::action::Dialect;
use crate::binding::{Binding, RawBinding};
use crate::error::{ReactorError, Result};
use crate::template::{StringTemplate, TemplateNode};
use crate::transform;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Where an edit's content comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentSource {
    /// The action's `Value` property.
    Carried,
    Template(TemplateNode),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Upsert {
        binding: Binding,
        content: ContentSource,
        create_path: bool,
    },
    Append {
        binding: Binding,
        content: ContentSource,
        if_not_exists: bool,
    },
    Delete {
        binding: Binding,
    },
    RenameKey {
        binding: Binding,
        from_key: StringTemplate,
        to_key: StringTemplate,
    },
}

impl Edit {
    pub fn kind(&self) -> &'static str {
        match self {
            Edit::Upsert { .. } => "Upsert",
            Edit::Append { .. } => "Append",
            Edit::Delete { .. } => "Delete",
            Edit::RenameKey { .. } => "RenameKey",
        }
    }

    pub fn binding(&self) -> &Binding {
        match self {
            Edit::Upsert { binding, .. }
            | Edit::Append { binding, .. }
            | Edit::Delete { binding }
            | Edit::RenameKey { binding, .. } => binding,
        }
    }
}

/// One entry of a rule's `Edits` list: exactly one edit key, plus an
/// optional dialect filter.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RawEditEntry {
    #[serde(default)]
    pub upsert: Option<RawWrite>,

    #[serde(default)]
    pub append: Option<RawWrite>,

    #[serde(default)]
    pub delete: Option<RawDelete>,

    #[serde(default)]
    pub rename_key: Option<RawRename>,

    #[serde(default)]
    pub dialects: Option<Vec<Dialect>>,
}

/// Body shared by `Upsert` and `Append`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RawWrite {
    pub path: RawBinding,

    // `"Value": null` is a literal null, not "use the carried value".
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,

    #[serde(default)]
    pub create_path: Option<bool>,

    #[serde(default)]
    pub if_not_exists: Option<bool>,

    #[serde(default)]
    pub transformations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RawDelete {
    pub path: RawBinding,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RawRename {
    pub path: RawBinding,
    pub from_key: String,
    pub to_key: String,
}

fn present<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

impl RawEditEntry {
    /// Dialects this edit is defined for; `None` means all of them.
    pub fn applies_to(&self, dialect: Dialect) -> bool {
        self.dialects
            .as_ref()
            .is_none_or(|ds| ds.contains(&dialect))
    }

    pub fn compile(&self) -> Result<Edit> {
        let set = [
            self.upsert.is_some(),
            self.append.is_some(),
            self.delete.is_some(),
            self.rename_key.is_some(),
        ];
        if set.iter().filter(|s| **s).count() != 1 {
            return Err(ReactorError::MalformedCatalog(
                "an edit needs exactly one of Upsert, Append, Delete, RenameKey".into(),
            ));
        }
        if self.dialects.as_ref().is_some_and(Vec::is_empty) {
            return Err(ReactorError::MalformedCatalog(
                "Dialects must not be empty".into(),
            ));
        }

        if let Some(w) = &self.upsert {
            if w.if_not_exists.is_some() {
                return Err(ReactorError::MalformedCatalog(
                    "IfNotExists is only valid on Append".into(),
                ));
            }
            let (binding, content) = w.compile()?;
            return Ok(Edit::Upsert {
                binding,
                content,
                create_path: w.create_path.unwrap_or(true),
            });
        }
        if let Some(w) = &self.append {
            if w.create_path.is_some() {
                return Err(ReactorError::MalformedCatalog(
                    "CreatePath is only valid on Upsert".into(),
                ));
            }
            let (binding, content) = w.compile()?;
            return Ok(Edit::Append {
                binding,
                content,
                if_not_exists: w.if_not_exists.unwrap_or(false),
            });
        }
        if let Some(d) = &self.delete {
            return Ok(Edit::Delete {
                binding: Binding::from_raw(&d.path)?,
            });
        }
        match &self.rename_key {
            Some(r) => Ok(Edit::RenameKey {
                binding: Binding::from_raw(&r.path)?,
                from_key: StringTemplate::parse(&r.from_key)?,
                to_key: StringTemplate::parse(&r.to_key)?,
            }),
            None => Err(ReactorError::MalformedCatalog("empty edit".into())),
        }
    }
}

impl RawWrite {
    /// Binding-level transformations run before edit-level ones.
    fn compile(&self) -> Result<(Binding, ContentSource)> {
        let mut binding = Binding::from_raw(&self.path)?;
        binding
            .transformations
            .extend(transform::parse_all(&self.transformations)?);
        let content = match &self.value {
            Some(v) => ContentSource::Template(TemplateNode::compile(v)?),
            None => ContentSource::Carried,
        };
        Ok((binding, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(raw: Value) -> RawEditEntry {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn upsert_defaults() {
        let e = entry(json!({"Upsert": {"Path": "$.a"}})).compile().unwrap();
        match e {
            Edit::Upsert {
                content,
                create_path,
                ..
            } => {
                assert_eq!(content, ContentSource::Carried);
                assert!(create_path);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn explicit_null_value_is_a_template() {
        let e = entry(json!({"Upsert": {"Path": "$.a", "Value": null}})).compile().unwrap();
        assert!(matches!(
            e,
            Edit::Upsert { content: ContentSource::Template(TemplateNode::Static(Value::Null)), .. }
        ));
    }

    #[test]
    fn transformations_merge_after_binding_ones() {
        let e = entry(json!({"Append": {
            "Path": {"Path": "$.a", "Transformations": ["toString"]},
            "Transformations": ["upperCase"],
            "IfNotExists": true
        }}))
        .compile()
        .unwrap();
        let names: Vec<_> = e.binding().transformations.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["toString", "upperCase"]);
        assert!(matches!(e, Edit::Append { if_not_exists: true, .. }));
    }

    #[test]
    fn dialect_filter() {
        let e = entry(json!({"Delete": {"Path": "$.a"}, "Dialects": ["sam"]}));
        assert!(e.applies_to(Dialect::Sam));
        assert!(!e.applies_to(Dialect::CloudFormation));
        assert!(entry(json!({"Delete": {"Path": "$.a"}})).applies_to(Dialect::Serverless));
    }

    #[test]
    fn rejects_ambiguous_or_misplaced_fields() {
        assert!(entry(json!({})).compile().is_err());
        assert!(
            entry(json!({"Delete": {"Path": "$.a"}, "Upsert": {"Path": "$.a"}}))
                .compile()
                .is_err()
        );
        assert!(
            entry(json!({"Upsert": {"Path": "$.a", "IfNotExists": true}}))
                .compile()
                .is_err()
        );
        assert!(
            entry(json!({"Delete": {"Path": "$.a"}, "Dialects": []}))
                .compile()
                .is_err()
        );
        assert!(
            entry(json!({"Upsert": {"Path": "$.a", "Value": "%{x|bogus}"}}))
                .compile()
                .is_err()
        );
        assert!(serde_json::from_value::<RawEditEntry>(json!({"Remove": {"Path": "$.a"}})).is_err());
    }
}
