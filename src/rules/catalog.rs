//! Reaction rule catalog (rules.json).
//!
//! JSON shape:
//! {
//!   "Rules": [
//!     {
//!       "Action": "UpdateResourceSetting",
//!       "Conditions": { "Setting": "Enabled", "Value": false },
//!       "Edits": [
//!         { "Delete": { "Path": "$.Resources.%{RESOURCE_ID}.Properties.Enabled" } },
//!         { "Upsert": { "Path": "...", "Value": {...} }, "Dialects": ["sam"] }
//!       ]
//!     }
//!   ]
//! }
//!
//! Everything is checked and compiled at load, then materialized once per
//! dialect so dispatch never sees an edit the active dialect lacks.

use super::condition::Condition;
use super::edit::{Edit, RawEditEntry};
use crate::action::{Action, ActionKind, Dialect};
use crate::error::{ReactorError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RawCatalog {
    #[serde(default)]
    pub rules: Vec<RawRule>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RawRule {
    pub action: ActionKind,

    #[serde(default)]
    pub conditions: Map<String, Value>,

    pub edits: Vec<RawEditEntry>,
}

/// A compiled rule, restricted to one dialect's edits.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub action: ActionKind,
    pub conditions: Vec<Condition>,
    pub edits: Vec<Edit>,
}

impl Rule {
    pub fn matches(&self, action: &Action) -> bool {
        self.action == action.kind && self.conditions.iter().all(|c| c.matches(action))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    by_dialect: BTreeMap<Dialect, Vec<Rule>>,
}

impl RawCatalog {
    pub fn validate_and_build(&self) -> Result<RuleCatalog> {
        let mut by_dialect: BTreeMap<Dialect, Vec<Rule>> =
            Dialect::ALL.iter().map(|d| (*d, Vec::new())).collect();

        for (i, raw) in self.rules.iter().enumerate() {
            let at = |e: ReactorError| {
                ReactorError::MalformedCatalog(format!("rule {i} ({:?}): {e}", raw.action))
            };

            if raw.edits.is_empty() {
                return Err(ReactorError::MalformedCatalog(format!(
                    "rule {i} ({:?}): no Edits",
                    raw.action
                )));
            }
            let conditions = Condition::parse_all(&raw.conditions).map_err(at)?;
            let edits = raw
                .edits
                .iter()
                .map(|e| e.compile().map(|c| (e, c)))
                .collect::<Result<Vec<_>>>()
                .map_err(at)?;

            for (dialect, rules) in by_dialect.iter_mut() {
                let edits: Vec<Edit> = edits
                    .iter()
                    .filter(|(raw, _)| raw.applies_to(*dialect))
                    .map(|(_, e)| e.clone())
                    .collect();
                if edits.is_empty() {
                    continue;
                }
                rules.push(Rule {
                    action: raw.action,
                    conditions: conditions.clone(),
                    edits,
                });
            }
        }

        Ok(RuleCatalog { by_dialect })
    }
}

impl RuleCatalog {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str::<RawCatalog>(text)?.validate_and_build()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn rules_for(&self, dialect: Dialect) -> &[Rule] {
        self.by_dialect.get(&dialect).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.by_dialect.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RULES: &str = r#"{
      "Rules": [
        {
          "Action": "UpdateResourceSetting",
          "Conditions": {"Setting": "Enabled"},
          "Edits": [
            {"Upsert": {"Path": "$.Resources.%{RESOURCE_ID}.Properties.Enabled"}},
            {"Upsert": {"Path": "$.Resources.%{RESOURCE_ID}.Metadata.Sam", "Value": true},
             "Dialects": ["sam"]}
          ]
        },
        {
          "Action": "AddResource",
          "Edits": [{"Delete": {"Path": "$.Outputs.Placeholder"}, "Dialects": ["serverless"]}]
        }
      ]
    }"#;

    #[test]
    fn materializes_per_dialect() {
        let catalog = RuleCatalog::from_json_str(RULES).unwrap();
        let cfn = catalog.rules_for(Dialect::CloudFormation);
        let sam = catalog.rules_for(Dialect::Sam);
        let sls = catalog.rules_for(Dialect::Serverless);

        assert_eq!(cfn.len(), 1);
        assert_eq!(cfn[0].edits.len(), 1);
        assert_eq!(sam[0].edits.len(), 2);
        assert_eq!(sls.len(), 2);
        assert_eq!(sls[1].action, ActionKind::AddResource);
    }

    #[test]
    fn rule_matching() {
        let catalog = RuleCatalog::from_json_str(RULES).unwrap();
        let rule = &catalog.rules_for(Dialect::CloudFormation)[0];
        let enabled = Action::new(ActionKind::UpdateResourceSetting).with_property("Setting", "Enabled");
        let other = Action::new(ActionKind::UpdateResourceSetting).with_property("Setting", "Timeout");
        assert!(rule.matches(&enabled));
        assert!(!rule.matches(&other));
        assert!(!rule.matches(&Action::new(ActionKind::AddResource).with_property("Setting", "Enabled")));
    }

    #[test]
    fn load_errors_name_the_rule() {
        let err = RuleCatalog::from_json_str(
            r#"{"Rules": [{"Action": "AddResource", "Edits": []}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("rule 0"), "{err}");

        assert!(RuleCatalog::from_json_str(r#"{"Rules": [{"Action": "Explode", "Edits": []}]}"#).is_err());
        assert!(
            RuleCatalog::from_json_str(
                r#"{"Rules": [{"Action": "AddResource", "Edits": [{"Delete": {"Path": "$.Resources[?(@.x ==]"}}]}]}"#
            )
            .is_err()
        );
    }
}
