//! Property-based checks for paths, fan-out and ownership.

use cfn_reactor::binding::{self, Binding};
use cfn_reactor::path::PathExpr;
use cfn_reactor::{Action, ActionKind, Context, EntityId, RuleCatalog, Session, SessionConfig};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

fn key_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,6}"
}

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-z ]{0,10}".prop_map(Value::from),
    ]
}

fn path_source(keys: &[String], index: Option<usize>) -> String {
    let mut s = String::from("$");
    for k in keys {
        s.push_str(&format!("['{}']", k));
    }
    if let Some(i) = index {
        s.push_str(&format!("[{}]", i));
    }
    s
}

proptest! {
    /// set then get returns the value, creating parents as needed. A fresh
    /// sequence only accepts index 0; larger indexes are refused, not padded.
    #[test]
    fn set_then_get(
        keys in prop::collection::vec(key_strategy(), 1..5),
        index in prop::option::of(0usize..4),
        value in scalar_strategy(),
        seeded in any::<bool>(),
    ) {
        let mut doc = if seeded && keys.len() > 1 {
            // Parent chain partially present.
            let mut d = json!({});
            d[&keys[0]] = json!({"_seed": 1});
            d
        } else {
            json!({})
        };

        let expr = PathExpr::parse(&path_source(&keys, index)).unwrap();
        let written = expr.set(&mut doc, None, value.clone());
        if index.is_some_and(|i| i > 0) {
            prop_assert!(written.is_err());
        } else {
            written.unwrap();
            prop_assert_eq!(expr.get(&doc, None).unwrap(), Some(value));
        }
    }

    /// One sub-binding over N matching nodes yields N contexts.
    #[test]
    fn fan_out_count(matching in 0usize..8, other in 0usize..8) {
        let mut resources = Map::new();
        for i in 0..matching {
            resources.insert(format!("Q{i}"), json!({"Type": "Queue"}));
        }
        for i in 0..other {
            resources.insert(format!("T{i}"), json!({"Type": "Topic"}));
        }
        let doc = json!({"Resources": resources});
        let raw = json!(["$.Resources[?(@.Type == 'Queue')]", "$.Resources.%{key}.Properties"]);
        let b = Binding::from_raw(&serde_json::from_value(raw).unwrap()).unwrap();

        let resolved = binding::resolve(&doc, None, &b, &Context::new()).unwrap();
        prop_assert_eq!(resolved.contexts.len(), matching);
    }
}

#[derive(Debug, Clone)]
enum Op {
    Add { entity: usize, resource: usize },
    Share { entity: usize },
    Remove { entity: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3, 0usize..5).prop_map(|(entity, resource)| Op::Add { entity, resource }),
        (0usize..3).prop_map(|entity| Op::Share { entity }),
        (0usize..3).prop_map(|entity| Op::Remove { entity }),
    ]
}

const RULES: &str = r#"{"Rules": [
  {"Action": "AddResource", "Edits": [
    {"Upsert": {"Path": "$.Resources.%{RESOURCE_ID}", "Value": {"Type": "AWS::SNS::Topic"}}}
  ]},
  {"Action": "AddIntegration", "Edits": [
    {"Upsert": {"Path": "$.Resources.SharedRole", "Value": {"Type": "AWS::IAM::Role"}}},
    {"Upsert": {"Path": "$.Conditions.%{OWNER}Enabled", "Value": {"Fn::Equals": [1, 1]}}}
  ]}
]}"#;

fn entity(i: usize) -> EntityId {
    EntityId::resource(format!("E{i}"))
}

proptest! {
    /// No entry ever has two owners, and removing an entity deletes exactly
    /// the entries it alone owned.
    #[test]
    fn ownership_partition_and_gc(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let catalog = RuleCatalog::from_json_str(RULES).unwrap();
        let mut session = Session::new(json!({"Resources": {"Legacy": {}}}), catalog, SessionConfig::default());

        for op in ops {
            match op {
                Op::Add { entity: e, resource } => {
                    let action = Action::new(ActionKind::AddResource)
                        .with_context("RESOURCE_ID", format!("R{resource}"));
                    session.apply(&action, &entity(e)).unwrap();
                }
                Op::Share { entity: e } => {
                    let action = Action::new(ActionKind::AddIntegration)
                        .with_context("OWNER", format!("E{e}"));
                    session.apply(&action, &entity(e)).unwrap();
                }
                Op::Remove { entity: e } => {
                    let before = session.snapshot();
                    let Some(owned) = session.ownership().owned(&entity(e)).cloned() else {
                        continue;
                    };
                    session.remove_entity(&entity(e)).unwrap();
                    for (section, ids) in &owned {
                        for id in ids {
                            prop_assert!(session.document()[section].get(id).is_none());
                        }
                    }
                    for survivor in session.ownership().entities() {
                        for (section, ids) in session.ownership().owned(survivor).unwrap() {
                            for id in ids {
                                prop_assert!(before[section].get(id).is_some());
                                prop_assert!(session.document()[section].get(id).is_some());
                            }
                        }
                    }
                }
            }
            prop_assert!(session.ownership().check_partition().is_ok());
            prop_assert!(session.document()["Resources"].get("Legacy").is_some());
        }
    }
}
