//! One document, its ownership bookkeeping and the rules that edit it.

use crate::action::Action;
use crate::config::SessionConfig;
use crate::dispatch::{EditResult, dispatch};
use crate::error::{ReactorError, Result};
use crate::identity::{self, Identity};
use crate::ownership::{EntityId, OwnedIds, OwnershipState};
use crate::path::NodePath;
use crate::rules::RuleCatalog;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// No rollback: a failed `apply` leaves whatever edits already ran. Take a
/// [`Session::snapshot`] first when that matters.
#[derive(Debug, Clone)]
pub struct Session {
    document: Value,
    ownership: OwnershipState,
    catalog: RuleCatalog,
    config: SessionConfig,
}

impl Session {
    /// Entries already in `document` start out unmanaged.
    pub fn new(document: Value, catalog: RuleCatalog, config: SessionConfig) -> Self {
        let mut ownership = OwnershipState::default();
        ownership.adopt_existing(&document, &config.tracked_sections);
        Self {
            document,
            ownership,
            catalog,
            config,
        }
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn into_document(self) -> Value {
        self.document
    }

    pub fn ownership(&self) -> &OwnershipState {
        &self.ownership
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Value {
        self.document.clone()
    }

    /// Dispatches `action` and credits every new entry to `acting`. Nothing
    /// is left unowned afterwards, so sweeping happens in
    /// [`Session::remove_entity`].
    pub fn apply(&mut self, action: &Action, acting: &EntityId) -> Result<Vec<EditResult>> {
        let rules = self.catalog.rules_for(self.config.dialect);
        let results = dispatch(rules, action, &mut self.document)?;
        debug!(kind = ?action.kind, entity = %acting, edits = results.len(), "dispatched");

        self.ownership.reconcile(
            &self.document,
            acting,
            &results,
            &self.config.tracked_sections,
        )?;
        Ok(results)
    }

    /// Releases `entity` (and, for a resource, every facet and integration
    /// hanging off it). With `sweep_unowned` the released entries are deleted
    /// and their addresses returned; without it they stay in the document as
    /// unmanaged entries.
    pub fn remove_entity(&mut self, entity: &EntityId) -> Result<Vec<NodePath>> {
        if self.ownership.owned(entity).is_none() {
            return Err(ReactorError::UnknownEntity(entity.to_string()));
        }

        let mut doomed = vec![entity.clone()];
        if let EntityId::Resource(id) = entity {
            doomed.extend(
                self.ownership
                    .entities()
                    .filter(|e| *e != entity && e.depends_on(id))
                    .cloned(),
            );
        }

        let mut released = OwnedIds::new();
        for e in &doomed {
            for (section, ids) in self.ownership.release(e).unwrap_or_default() {
                released.entry(section).or_default().extend(ids);
            }
        }

        let removed = if self.config.sweep_unowned {
            let sections: BTreeSet<String> = released.into_keys().collect();
            self.ownership.sweep(&mut self.document, &sections)
        } else {
            debug!(entity = %entity, "released entries kept as unmanaged");
            self.ownership.abandon(released);
            Vec::new()
        };
        self.ownership
            .prune(&self.document, &self.config.tracked_sections);
        info!(entity = %entity, released = doomed.len(), removed = removed.len(), "entity removed");
        Ok(removed)
    }

    pub fn resolve_identity(&self, raw: &Value) -> Result<Identity> {
        identity::resolve_identity(raw, &self.document, &self.ownership.known_ids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const RULES: &str = r#"{"Rules": [
      {"Action": "AddResource", "Edits": [
        {"Upsert": {"Path": "$.Resources.%{RESOURCE_ID}", "Value": {"Type": "%{TYPE}"}}}
      ]},
      {"Action": "AddIntegration", "Edits": [
        {"Upsert": {"Path": "$.Resources.%{SOURCE}Policy",
                    "Value": {"Type": "AWS::IAM::Policy", "Target": {"Ref": "%{TARGET}"}}}}
      ]}
    ]}"#;

    fn session(doc: Value) -> Session {
        let catalog = RuleCatalog::from_json_str(RULES).unwrap();
        Session::new(doc, catalog, SessionConfig::default())
    }

    fn add(s: &mut Session, id: &str) {
        let action = Action::new(ActionKind::AddResource)
            .with_context("RESOURCE_ID", id)
            .with_context("TYPE", "AWS::SQS::Queue");
        s.apply(&action, &EntityId::resource(id)).unwrap();
    }

    #[test]
    fn removing_a_resource_cascades_to_its_integrations() {
        let mut s = session(json!({"Resources": {}}));
        add(&mut s, "Fn");
        add(&mut s, "Queue");

        let edge = EntityId::Integration(crate::ownership::IntegrationId::derive("Fn", "Queue", None));
        let action = Action::new(ActionKind::AddIntegration)
            .with_context("SOURCE", "Fn")
            .with_context("TARGET", "Queue");
        s.apply(&action, &edge).unwrap();
        assert_eq!(s.ownership().owner_of("Resources", "FnPolicy"), Some(&edge));

        let removed = s.remove_entity(&EntityId::resource("Queue")).unwrap();
        assert_eq!(removed.len(), 2);
        let left: Vec<_> = s.document()["Resources"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(left, vec!["Fn"]);
        assert!(s.ownership().owned(&edge).is_none());
    }

    #[test]
    fn sweep_unowned_decides_what_release_leaves_behind() {
        let doc = json!({"Resources": {"Legacy": {"Type": "AWS::SNS::Topic"}}});
        let catalog = RuleCatalog::from_json_str(RULES).unwrap();
        let keep = SessionConfig {
            sweep_unowned: false,
            ..SessionConfig::default()
        };
        let mut swept = Session::new(doc.clone(), catalog.clone(), SessionConfig::default());
        let mut kept = Session::new(doc, catalog, keep);

        for s in [&mut swept, &mut kept] {
            add(s, "Fn");
            add(s, "Queue");
        }
        let queue = EntityId::resource("Queue");

        assert_eq!(
            swept.remove_entity(&queue).unwrap(),
            vec![NodePath::keys(["Resources", "Queue"])]
        );
        assert!(swept.document()["Resources"].get("Queue").is_none());

        assert!(kept.remove_entity(&queue).unwrap().is_empty());
        assert_eq!(kept.document()["Resources"]["Queue"], json!({"Type": "AWS::SQS::Queue"}));
        assert!(kept.ownership().is_unmanaged("Resources", "Queue"));
        assert!(kept.ownership().owned(&queue).is_none());

        // An unrelated action does not pick the abandoned entry up.
        add(&mut kept, "Topic");
        assert!(kept.ownership().is_unmanaged("Resources", "Queue"));
        assert_eq!(kept.ownership().owner_of("Resources", "Queue"), None);
    }

    #[test]
    fn unknown_entities_are_errors() {
        let mut s = session(json!({}));
        assert!(matches!(
            s.remove_entity(&EntityId::resource("Ghost")),
            Err(ReactorError::UnknownEntity(_))
        ));
    }

    #[test]
    fn identity_uses_session_knowledge() {
        let mut s = session(json!({"Resources": {}}));
        add(&mut s, "Queue");
        assert!(s.resolve_identity(&json!({"Fn::GetAtt": ["Queue", "Arn"]})).unwrap().is_local);
        assert!(!s.resolve_identity(&json!({"Ref": "Missing"})).unwrap().is_local);
    }
}
