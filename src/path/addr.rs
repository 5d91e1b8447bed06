//! Concrete node address inside a document.
//!
//! Example: `$.Resources.Queue.Properties.Tags[0]`
//!   =>  NodePath(vec![Key("Resources"), Key("Queue"), Key("Properties"), Key("Tags"), Index(0)])
//!
//! Ordering is derived so paths can live in BTreeSet/Map and so deletes can
//! walk matches deepest/last first.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Index(usize),
    Key(String),
}

impl Step {
    pub fn key(k: impl Into<String>) -> Self {
        Step::Key(k.into())
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            Step::Key(k) => Some(k),
            Step::Index(_) => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Index(i) => write!(f, "[{}]", i),
            Step::Key(k) if is_plain_key(k) => write!(f, ".{}", k),
            Step::Key(k) => write!(f, "['{}']", k.replace('\'', "\\'")),
        }
    }
}

pub(crate) fn is_plain_key(k: &str) -> bool {
    !k.is_empty()
        && k
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ':'))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodePath(pub Vec<Step>);

impl NodePath {
    pub fn new(steps: Vec<Step>) -> Self {
        Self(steps)
    }

    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path built from plain map keys, e.g. `NodePath::keys(["Resources", "Queue"])`.
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(|k| Step::Key(k.into())).collect())
    }

    pub fn child(&self, step: Step) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn last(&self) -> Option<&Step> {
        self.0.last()
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// `(section, id)` when the path addresses a top-level section entry
    /// such as `$.Resources.Queue`.
    pub fn section_entry(&self) -> Option<(&str, &str)> {
        match self.0.as_slice() {
            [Step::Key(section), Step::Key(id)] => Some((section, id)),
            _ => None,
        }
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for step in &self.0 {
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_quotes_keys_that_need_it() {
        let p = NodePath::keys(["Resources", "My.Queue"]).child(Step::Index(2));
        assert_eq!(p.to_string(), "$.Resources['My.Queue'][2]");
    }

    #[test]
    fn descending_order_puts_children_and_later_indexes_first() {
        let mut paths = vec![
            NodePath::keys(["a"]),
            NodePath::keys(["a"]).child(Step::Index(0)),
            NodePath::keys(["a"]).child(Step::Index(3)),
        ];
        paths.sort();
        paths.reverse();
        assert_eq!(paths[0], NodePath::keys(["a"]).child(Step::Index(3)));
        assert_eq!(paths[2], NodePath::keys(["a"]));
    }

    #[test]
    fn section_entry_only_for_two_keys() {
        assert_eq!(
            NodePath::keys(["Resources", "Queue"]).section_entry(),
            Some(("Resources", "Queue"))
        );
        assert_eq!(NodePath::keys(["Resources"]).section_entry(), None);
    }
}
