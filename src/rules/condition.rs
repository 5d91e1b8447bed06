//! Rule conditions: a small predicate language over action properties.
//!
//!   "Setting": "Enabled"                       equality
//!   "Value": {"$in": [true, "true"]}           operator form
//!   "SETTING:Runtime": {"$startsWith": "node"} compares a context field

use crate::action::Action;
use crate::error::{ReactorError, Result};
use serde_json::{Map, Value};

const SETTING_PREFIX: &str = "SETTING:";

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Exists(bool),
    StartsWith(String),
    Not(Box<Predicate>),
    AnyOf(Vec<Predicate>),
}

impl Predicate {
    /// Objects with a single `$`-prefixed key are operators, anything else
    /// is compared by deep equality.
    pub fn parse(raw: &Value) -> Result<Self> {
        let Some((op, arg)) = operator(raw) else {
            return Ok(Predicate::Eq(raw.clone()));
        };
        let bad = |why: &str| ReactorError::MalformedCatalog(format!("{op}: {why}"));

        Ok(match op {
            "$eq" => Predicate::Eq(arg.clone()),
            "$ne" => Predicate::Ne(arg.clone()),
            "$in" => match arg {
                Value::Array(items) => Predicate::In(items.clone()),
                _ => return Err(bad("expects an array")),
            },
            "$exists" => match arg {
                Value::Bool(b) => Predicate::Exists(*b),
                _ => return Err(bad("expects a boolean")),
            },
            "$startsWith" => match arg {
                Value::String(s) => Predicate::StartsWith(s.clone()),
                _ => return Err(bad("expects a string")),
            },
            "$not" => Predicate::Not(Box::new(Predicate::parse(arg)?)),
            "$anyOf" => match arg {
                Value::Array(items) => {
                    Predicate::AnyOf(items.iter().map(Predicate::parse).collect::<Result<_>>()?)
                }
                _ => return Err(bad("expects an array")),
            },
            other => {
                return Err(ReactorError::MalformedCatalog(format!(
                    "unknown condition operator '{other}'"
                )));
            }
        })
    }

    pub fn eval(&self, actual: Option<&Value>) -> bool {
        match self {
            Predicate::Eq(expected) => actual == Some(expected),
            Predicate::Ne(expected) => actual != Some(expected),
            Predicate::In(options) => actual.is_some_and(|v| options.contains(v)),
            Predicate::Exists(want) => actual.is_some_and(|v| !v.is_null()) == *want,
            Predicate::StartsWith(prefix) => actual
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Predicate::Not(inner) => !inner.eval(actual),
            Predicate::AnyOf(preds) => preds.iter().any(|p| p.eval(actual)),
        }
    }
}

fn operator(raw: &Value) -> Option<(&str, &Value)> {
    let Value::Object(map) = raw else {
        return None;
    };
    if map.len() != 1 {
        return None;
    }
    map.iter()
        .next()
        .filter(|(k, _)| k.starts_with('$'))
        .map(|(k, v)| (k.as_str(), v))
}

/// Where a condition reads its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Property(String),
    /// Current resource setting, carried in the action context under the
    /// full `SETTING:<name>` field.
    Setting(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub subject: Subject,
    pub predicate: Predicate,
}

impl Condition {
    pub fn parse(key: &str, raw: &Value) -> Result<Self> {
        let subject = if key.starts_with(SETTING_PREFIX) {
            Subject::Setting(key.to_string())
        } else {
            Subject::Property(key.to_string())
        };
        Ok(Self {
            subject,
            predicate: Predicate::parse(raw)?,
        })
    }

    pub fn parse_all(raw: &Map<String, Value>) -> Result<Vec<Self>> {
        raw.iter().map(|(k, v)| Condition::parse(k, v)).collect()
    }

    pub fn matches(&self, action: &Action) -> bool {
        let actual = match &self.subject {
            Subject::Property(name) => action.property(name),
            Subject::Setting(field) => action.context.get(field),
        };
        self.predicate.eval(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use serde_json::json;

    fn action() -> Action {
        Action::new(ActionKind::UpdateResourceSetting)
            .with_property("Setting", "Enabled")
            .with_property("Value", false)
            .with_context("SETTING:Runtime", "nodejs20.x")
    }

    fn holds(key: &str, raw: Value) -> bool {
        Condition::parse(key, &raw).unwrap().matches(&action())
    }

    #[test]
    fn literal_values_compare_by_equality() {
        assert!(holds("Setting", json!("Enabled")));
        assert!(holds("Value", json!(false)));
        assert!(!holds("Value", json!("false")));
        assert!(!holds("Missing", json!("x")));
    }

    #[test]
    fn operators() {
        assert!(holds("Value", json!({"$in": [true, false]})));
        assert!(holds("Value", json!({"$ne": true})));
        assert!(holds("Setting", json!({"$exists": true})));
        assert!(holds("Missing", json!({"$exists": false})));
        assert!(holds("Setting", json!({"$not": {"$eq": "Timeout"}})));
        assert!(holds("Setting", json!({"$anyOf": ["Timeout", {"$startsWith": "En"}]})));
    }

    #[test]
    fn setting_prefix_reads_the_context() {
        assert!(holds("SETTING:Runtime", json!({"$startsWith": "nodejs"})));
        assert!(!holds("SETTING:Runtime", json!({"$startsWith": "python"})));
        assert!(!holds("SETTING:Memory", json!({"$exists": true})));
    }

    #[test]
    fn multi_key_objects_are_plain_values() {
        let c = Condition::parse("Value", &json!({"$eq": 1, "other": 2})).unwrap();
        assert_eq!(c.predicate, Predicate::Eq(json!({"$eq": 1, "other": 2})));
    }

    #[test]
    fn bad_operators_fail_at_load() {
        assert!(Condition::parse("Value", &json!({"$regex": "x"})).is_err());
        assert!(Condition::parse("Value", &json!({"$in": "x"})).is_err());
        assert!(Condition::parse("Value", &json!({"$exists": "yes"})).is_err());
    }
}
