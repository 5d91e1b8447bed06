//! Per-entity ownership of top-level section entries, plus the sweep that
//! physically removes entries nobody owns.

use super::entity::EntityId;
use crate::dispatch::EditResult;
use crate::error::{ReactorError, Result};
use crate::path::NodePath;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Section name -> entry ids.
pub type OwnedIds = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Default)]
pub struct OwnershipState {
    owners: BTreeMap<EntityId, OwnedIds>,
    /// Entries that predate tracking. Never assigned by the new-id scan and
    /// never swept.
    unmanaged: OwnedIds,
}

fn section_ids(document: &Value, section: &str) -> BTreeSet<String> {
    document
        .get(section)
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

impl OwnershipState {
    pub fn adopt_existing(&mut self, document: &Value, sections: &[String]) {
        for section in sections {
            let ids = section_ids(document, section);
            if !ids.is_empty() {
                self.unmanaged.entry(section.clone()).or_default().extend(ids);
            }
        }
    }

    pub fn owner_of(&self, section: &str, id: &str) -> Option<&EntityId> {
        self.owners
            .iter()
            .find(|(_, owned)| owned.get(section).is_some_and(|ids| ids.contains(id)))
            .map(|(entity, _)| entity)
    }

    pub fn is_owned(&self, section: &str, id: &str) -> bool {
        self.owner_of(section, id).is_some()
    }

    pub fn is_unmanaged(&self, section: &str, id: &str) -> bool {
        self.unmanaged.get(section).is_some_and(|ids| ids.contains(id))
    }

    pub fn owned(&self, entity: &EntityId) -> Option<&OwnedIds> {
        self.owners.get(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityId> {
        self.owners.keys()
    }

    /// Resource entity names plus every owned or unmanaged entry id.
    pub fn known_ids(&self) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self
            .owners
            .keys()
            .filter_map(|e| match e {
                EntityId::Resource(r) => Some(r.clone()),
                _ => None,
            })
            .collect();
        for owned in self.owners.values().chain(std::iter::once(&self.unmanaged)) {
            out.extend(owned.values().flatten().cloned());
        }
        out
    }

    /// Gives `entity` the entry. Unmanaged entries may be claimed, entries
    /// held by another entity may not.
    pub fn claim(&mut self, entity: &EntityId, section: &str, id: &str) -> Result<()> {
        if let Some(owner) = self.owner_of(section, id) {
            if owner == entity {
                return Ok(());
            }
            return Err(ReactorError::OwnershipConflict {
                section: section.to_string(),
                id: id.to_string(),
                owner: owner.to_string(),
                claimant: entity.to_string(),
            });
        }
        if let Some(ids) = self.unmanaged.get_mut(section) {
            ids.remove(id);
        }
        self.owners
            .entry(entity.clone())
            .or_default()
            .entry(section.to_string())
            .or_default()
            .insert(id.to_string());
        Ok(())
    }

    /// Brings ownership in line with `document` after `acting` ran.
    ///
    /// New entries nobody holds go to `acting`; every set is filtered to
    /// entries still present; direct upserts of an unmanaged section entry
    /// are claimed explicitly.
    pub fn reconcile(
        &mut self,
        document: &Value,
        acting: &EntityId,
        results: &[EditResult],
        sections: &[String],
    ) -> Result<()> {
        self.owners.entry(acting.clone()).or_default();

        for section in sections {
            for id in section_ids(document, section) {
                if !self.is_owned(section, &id) && !self.is_unmanaged(section, &id) {
                    self.claim(acting, section, &id)?;
                }
            }
        }

        self.prune(document, sections);

        for path in results.iter().filter_map(EditResult::upserted_path) {
            let Some((section, id)) = path.section_entry() else {
                continue;
            };
            if !sections.iter().any(|s| s == section) || !self.is_unmanaged(section, id) {
                continue;
            }
            debug!(section, id, entity = %acting, "explicit claim");
            self.claim(acting, section, id)?;
        }

        self.check_partition()
    }

    /// Drops ids no longer present in `document`.
    pub fn prune(&mut self, document: &Value, sections: &[String]) {
        let present: BTreeMap<&str, BTreeSet<String>> = sections
            .iter()
            .map(|s| (s.as_str(), section_ids(document, s)))
            .collect();
        let keep = |owned: &mut OwnedIds| {
            for (section, ids) in owned.iter_mut() {
                match present.get(section.as_str()) {
                    Some(p) => ids.retain(|id| p.contains(id)),
                    None => ids.clear(),
                }
            }
            owned.retain(|_, ids| !ids.is_empty());
        };
        for owned in self.owners.values_mut() {
            keep(owned);
        }
        keep(&mut self.unmanaged);
    }

    /// Removes `entity` and hands back what it owned.
    pub fn release(&mut self, entity: &EntityId) -> Option<OwnedIds> {
        self.owners.remove(entity)
    }

    /// Hands released entries back to the unmanaged set.
    pub fn abandon(&mut self, released: OwnedIds) {
        for (section, ids) in released {
            self.unmanaged.entry(section).or_default().extend(ids);
        }
    }

    /// Deletes entries in `sections` that are neither owned nor unmanaged.
    pub fn sweep(&self, document: &mut Value, sections: &BTreeSet<String>) -> Vec<NodePath> {
        let mut removed = Vec::new();
        for section in sections {
            let Some(entries) = document.get_mut(section).and_then(Value::as_object_mut) else {
                continue;
            };
            let doomed: Vec<String> = entries
                .keys()
                .filter(|id| !self.is_owned(section, id) && !self.is_unmanaged(section, id))
                .cloned()
                .collect();
            for id in doomed {
                warn!(section = %section, id = %id, "removing unowned entry");
                entries.shift_remove(&id);
                removed.push(NodePath::keys([section.as_str(), id.as_str()]));
            }
        }
        removed
    }

    /// Every entry has at most one owner.
    pub fn check_partition(&self) -> Result<()> {
        let mut seen: BTreeMap<(&str, &str), &EntityId> = BTreeMap::new();
        for (entity, owned) in &self.owners {
            for (section, ids) in owned {
                for id in ids {
                    if let Some(first) = seen.insert((section.as_str(), id.as_str()), entity) {
                        return Err(ReactorError::OwnershipConflict {
                            section: section.clone(),
                            id: id.clone(),
                            owner: first.to_string(),
                            claimant: entity.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sections() -> Vec<String> {
        vec!["Resources".into(), "Conditions".into()]
    }

    #[test]
    fn new_entries_go_to_the_acting_entity() {
        let fn_ = EntityId::resource("Fn");
        let mut state = OwnershipState::default();
        let doc = json!({"Resources": {"Fn": {}, "FnRole": {}}, "Conditions": {"IsProd": {}}});

        state.reconcile(&doc, &fn_, &[], &sections()).unwrap();
        assert_eq!(state.owner_of("Resources", "FnRole"), Some(&fn_));
        assert_eq!(state.owner_of("Conditions", "IsProd"), Some(&fn_));
    }

    #[test]
    fn claimed_entries_are_never_reassigned() {
        let a = EntityId::resource("A");
        let b = EntityId::resource("B");
        let mut state = OwnershipState::default();
        let doc = json!({"Resources": {"Shared": {}}});
        state.reconcile(&doc, &a, &[], &sections()).unwrap();

        let upsert = EditResult::Upserted {
            path: NodePath::keys(["Resources", "Shared"]),
            value: json!({}),
        };
        state.reconcile(&doc, &b, &[upsert], &sections()).unwrap();
        assert_eq!(state.owner_of("Resources", "Shared"), Some(&a));
        assert!(state.claim(&b, "Resources", "Shared").is_err());
    }

    #[test]
    fn unmanaged_entries_need_a_direct_upsert() {
        let a = EntityId::resource("A");
        let mut state = OwnershipState::default();
        let doc = json!({"Resources": {"Legacy": {}, "Other": {}}});
        state.adopt_existing(&doc, &sections());

        state.reconcile(&doc, &a, &[], &sections()).unwrap();
        assert!(!state.is_owned("Resources", "Legacy"));

        let nested = EditResult::Upserted {
            path: NodePath::keys(["Resources", "Other", "Properties"]),
            value: json!({}),
        };
        let direct = EditResult::Upserted {
            path: NodePath::keys(["Resources", "Legacy"]),
            value: json!({}),
        };
        state.reconcile(&doc, &a, &[nested, direct], &sections()).unwrap();
        assert_eq!(state.owner_of("Resources", "Legacy"), Some(&a));
        assert!(state.is_unmanaged("Resources", "Other"));
    }

    #[test]
    fn sets_are_pruned_to_present_entries() {
        let a = EntityId::resource("A");
        let mut state = OwnershipState::default();
        state
            .reconcile(&json!({"Resources": {"X": {}, "Y": {}}}), &a, &[], &sections())
            .unwrap();
        state
            .reconcile(&json!({"Resources": {"Y": {}}}), &a, &[], &sections())
            .unwrap();
        let owned = state.owned(&a).unwrap();
        assert_eq!(owned["Resources"], BTreeSet::from(["Y".to_string()]));
    }

    #[test]
    fn sweep_spares_owned_and_unmanaged() {
        let a = EntityId::resource("A");
        let mut state = OwnershipState::default();
        let mut doc = json!({"Resources": {"Legacy": {}}});
        state.adopt_existing(&doc, &sections());
        doc["Resources"]["Mine"] = json!({});
        doc["Resources"]["Orphan"] = json!({});
        state.claim(&a, "Resources", "Mine").unwrap();

        let removed = state.sweep(&mut doc, &BTreeSet::from(["Resources".to_string()]));
        assert_eq!(removed, vec![NodePath::keys(["Resources", "Orphan"])]);
        assert_eq!(doc, json!({"Resources": {"Legacy": {}, "Mine": {}}}));
    }

    #[test]
    fn known_ids_cover_entities_and_entries() {
        let mut state = OwnershipState::default();
        state.adopt_existing(&json!({"Parameters": {"Stage": {}}}), &["Parameters".to_string()]);
        state.claim(&EntityId::resource("Fn"), "Resources", "FnRole").unwrap();
        let known = state.known_ids();
        assert!(known.contains("Fn") && known.contains("FnRole") && known.contains("Stage"));
    }
}
