//! Actions: one requested state change, as assembled by the caller.
//!
//! JSON shape:
//! {
//!   "Kind": "UpdateResourceSetting",
//!   "Properties": { "Resource": "Worker", "Setting": "Enabled", "Value": true },
//!   "Context": { "RESOURCE_ID": "Worker", "SETTING:Runtime": "nodejs20.x" }
//! }
//!
//! Properties are what rule conditions match on; the context feeds
//! templates and paths.

use crate::error::{ReactorError, Result};
use crate::path::NodePath;
use crate::template::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    AddResource,
    DeleteResource,
    UpdateResourceSetting,
    AddFacet,
    RemoveFacet,
    AddIntegration,
    RemoveIntegration,
    PutVirtualNetworkPlacement,
    RemoveVirtualNetworkPlacement,
}

impl ActionKind {
    /// Properties an action of this kind cannot do without.
    pub fn required_properties(&self) -> &'static [&'static str] {
        match self {
            ActionKind::UpdateResourceSetting => &["Resource", "Setting"],
            ActionKind::DeleteResource
            | ActionKind::PutVirtualNetworkPlacement
            | ActionKind::RemoveVirtualNetworkPlacement => &["Resource"],
            _ => &[],
        }
    }
}

/// Template flavour the rules are materialized for.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    #[serde(rename = "cloudformation")]
    CloudFormation,
    Sam,
    Serverless,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::CloudFormation, Dialect::Sam, Dialect::Serverless];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::CloudFormation => "cloudformation",
            Dialect::Sam => "sam",
            Dialect::Serverless => "serverless",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = ReactorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Dialect::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ReactorError::MalformedCatalog(format!("unknown dialect '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Action {
    pub kind: ActionKind,

    #[serde(default)]
    pub properties: Map<String, Value>,

    #[serde(default)]
    pub context: Context,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            properties: Map::new(),
            context: Context::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key, value);
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// The value the action carries (`Value` property), if any.
    pub fn value(&self) -> Option<&Value> {
        self.property("Value")
    }

    pub fn resource(&self) -> Option<&str> {
        self.property("Resource").and_then(Value::as_str)
    }

    /// `$.Resources.<Resource>` when the action targets a resource.
    pub fn local_root(&self) -> Option<NodePath> {
        self.resource().map(|r| NodePath::keys(["Resources", r]))
    }

    /// Fails with `MissingField` when a property the kind requires is absent
    /// or null.
    pub fn validate(&self) -> Result<()> {
        for field in self.kind.required_properties() {
            if self.property(field).is_none_or(Value::is_null) {
                return Err(ReactorError::MissingField(format!("{:?}.{}", self.kind, field)));
            }
        }
        Ok(())
    }

    /// A setting update whose new value equals the previous one.
    pub fn is_redundant_setting_update(&self) -> bool {
        self.kind == ActionKind::UpdateResourceSetting
            && matches!(
                (self.property("PreviousValue"), self.value()),
                (Some(prev), Some(new)) if prev == new
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_pascal_case_shape() {
        let action: Action = serde_json::from_value(json!({
            "Kind": "UpdateResourceSetting",
            "Properties": {"Resource": "Worker", "Setting": "Enabled", "Value": true},
            "Context": {"RESOURCE_ID": "Worker"}
        }))
        .unwrap();
        assert_eq!(action.kind, ActionKind::UpdateResourceSetting);
        assert_eq!(action.value(), Some(&json!(true)));
        assert_eq!(
            action.local_root(),
            Some(NodePath::keys(["Resources", "Worker"]))
        );
    }

    #[test]
    fn redundant_update_detection() {
        let base = Action::new(ActionKind::UpdateResourceSetting).with_property("Value", 3);
        assert!(!base.is_redundant_setting_update());
        assert!(base.clone().with_property("PreviousValue", 3).is_redundant_setting_update());
        assert!(!base.with_property("PreviousValue", 4).is_redundant_setting_update());
    }

    #[test]
    fn required_locator_fields() {
        let err = Action::new(ActionKind::UpdateResourceSetting)
            .with_property("Resource", "Worker")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ReactorError::MissingField(f) if f == "UpdateResourceSetting.Setting"));

        let err = Action::new(ActionKind::DeleteResource)
            .with_property("Resource", Value::Null)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ReactorError::MissingField(_)));

        assert!(Action::new(ActionKind::AddResource).validate().is_ok());
        assert!(
            Action::new(ActionKind::PutVirtualNetworkPlacement)
                .with_property("Resource", "Fn")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn dialect_parsing() {
        assert_eq!("SAM".parse::<Dialect>().unwrap(), Dialect::Sam);
        assert_eq!(
            serde_json::to_value(Dialect::CloudFormation).unwrap(),
            json!("cloudformation")
        );
        assert!("terraform".parse::<Dialect>().is_err());
    }
}
