//! Evaluation and mutation of parsed path expressions.

use crate::error::{ReactorError, Result};
use crate::path::addr::{NodePath, Step};
use crate::path::parse::{Origin, PathExpr, Segment};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// One query hit: where it is and a snapshot of what was there.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub path: NodePath,
    pub value: Value,
}

pub fn node<'a>(root: &'a Value, path: &NodePath) -> Option<&'a Value> {
    let mut cur = root;
    for step in path.steps() {
        cur = match (step, cur) {
            (Step::Key(k), Value::Object(map)) => map.get(k)?,
            (Step::Index(i), Value::Array(items)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(cur)
}

pub fn node_mut<'a>(root: &'a mut Value, path: &NodePath) -> Option<&'a mut Value> {
    let mut cur = root;
    for step in path.steps() {
        cur = match (step, cur) {
            (Step::Key(k), Value::Object(map)) => map.get_mut(k)?,
            (Step::Index(i), Value::Array(items)) => items.get_mut(*i)?,
            _ => return None,
        };
    }
    Some(cur)
}

impl PathExpr {
    fn base(&self, local_root: Option<&NodePath>) -> Result<NodePath> {
        match self.origin {
            Origin::Root => Ok(NodePath::root()),
            Origin::Local => local_root
                .cloned()
                .ok_or_else(|| ReactorError::MissingLocalRoot(self.source().to_string())),
        }
    }

    /// Addresses of every node the expression matches, in document order.
    pub fn select(&self, root: &Value, local_root: Option<&NodePath>) -> Result<Vec<NodePath>> {
        let base = self.base(local_root)?;
        let mut current = if node(root, &base).is_some() {
            vec![base]
        } else {
            Vec::new()
        };

        for seg in &self.segments {
            let mut next = Vec::new();
            for at in &current {
                if let Some(n) = node(root, at) {
                    expand(n, at, seg, &mut next);
                }
            }
            // `..` can reach the same node twice.
            let mut seen = BTreeSet::new();
            next.retain(|p| seen.insert(p.clone()));
            current = next;
        }
        Ok(current)
    }

    pub fn find(&self, root: &Value, local_root: Option<&NodePath>) -> Result<Vec<Match>> {
        Ok(self
            .select(root, local_root)?
            .into_iter()
            .filter_map(|path| {
                node(root, &path).cloned().map(|value| Match { path, value })
            })
            .collect())
    }

    pub fn get(&self, root: &Value, local_root: Option<&NodePath>) -> Result<Option<Value>> {
        Ok(self.find(root, local_root)?.into_iter().next().map(|m| m.value))
    }

    /// Writes `value` at the first match, or creates the missing parent
    /// containers and then assigns the final key. Returns the written address.
    pub fn set(
        &self,
        root: &mut Value,
        local_root: Option<&NodePath>,
        value: Value,
    ) -> Result<NodePath> {
        if let Some(first) = self.select(root, local_root)?.into_iter().next() {
            if let Some(slot) = node_mut(root, &first) {
                *slot = value;
            }
            return Ok(first);
        }

        let (last, parent) = match (self.segments.last(), self.parent()) {
            (Some(last), Some(parent)) => (last, parent),
            _ => {
                // Bare `@` whose local root does not exist yet.
                let base = self.base(local_root)?;
                assign_at(root, &base, value)?;
                return Ok(base);
            }
        };

        if !last.is_synthesizable() {
            return Err(ReactorError::CannotSynthesize {
                path: self.source().to_string(),
                reason: "the final segment selects nodes and cannot name a new key".into(),
            });
        }

        let mut parents = parent.select(root, local_root)?;
        if parents.is_empty() {
            let container = match last {
                Segment::Index(0) => Value::Array(Vec::new()),
                Segment::Index(i) => {
                    return Err(ReactorError::CannotSynthesize {
                        path: self.source().to_string(),
                        reason: format!("index {i} cannot start a new sequence"),
                    });
                }
                _ => Value::Object(Map::new()),
            };
            parents.push(parent.set(root, local_root, container)?);
        }

        let mut written = None;
        for p in &parents {
            let child = assign_child(root, p, last, value.clone())?;
            written.get_or_insert(child);
        }
        written.ok_or_else(|| ReactorError::CannotSynthesize {
            path: self.source().to_string(),
            reason: "no parent container".into(),
        })
    }

    /// Removes every match, then removes ancestors left empty, stopping
    /// below the document root. Returns the removed addresses.
    pub fn delete(&self, root: &mut Value, local_root: Option<&NodePath>) -> Result<Vec<NodePath>> {
        let targets = self.select(root, local_root)?;
        Ok(remove_all(root, targets))
    }
}

/// Removes a set of concrete addresses, all resolved against the same
/// unmodified document. Deepest/last addresses go first so sequence indexes
/// still point at their elements; emptied ancestors are pruned as in
/// [`PathExpr::delete`]. Returns the removed addresses in document order.
pub fn remove_all(root: &mut Value, mut targets: Vec<NodePath>) -> Vec<NodePath> {
    targets.sort();
    targets.dedup();
    targets.reverse();

    let mut removed = Vec::new();
    for target in targets {
        if remove_node(root, &target) {
            prune_empty_ancestors(root, &target);
            removed.push(target);
        }
    }
    removed.reverse();
    removed
}

fn children(n: &Value) -> Vec<(Step, &Value)> {
    match n {
        Value::Object(map) => map.iter().map(|(k, v)| (Step::Key(k.clone()), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (Step::Index(i), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    if i < 0 {
        len.checked_sub(i.unsigned_abs() as usize)
    } else {
        Some(i as usize)
    }
}

fn expand(n: &Value, at: &NodePath, seg: &Segment, out: &mut Vec<NodePath>) {
    match seg {
        Segment::Key(k) => {
            if let Value::Object(map) = n {
                if map.contains_key(k) {
                    out.push(at.child(Step::Key(k.clone())));
                }
            }
        }
        Segment::Index(i) => {
            if let Value::Array(items) = n {
                if let Some(idx) = normalize_index(*i, items.len()).filter(|idx| *idx < items.len()) {
                    out.push(at.child(Step::Index(idx)));
                }
            }
        }
        Segment::Wildcard => {
            out.extend(children(n).into_iter().map(|(step, _)| at.child(step)));
        }
        Segment::Filter(filter) => {
            for (step, child) in children(n) {
                if filter.matches(child, &step) {
                    out.push(at.child(step));
                }
            }
        }
        Segment::Descendant(name) => walk_descendants(n, at, name, out),
    }
}

fn walk_descendants(n: &Value, at: &NodePath, name: &str, out: &mut Vec<NodePath>) {
    if let Value::Object(map) = n {
        if map.contains_key(name) {
            out.push(at.child(Step::key(name)));
        }
    }
    for (step, child) in children(n) {
        walk_descendants(child, &at.child(step), name, out);
    }
}

fn empty_container_for(step: &Step) -> Value {
    match step {
        Step::Index(_) => Value::Array(Vec::new()),
        Step::Key(_) => Value::Object(Map::new()),
    }
}

/// Assigns `value` at a concrete address, creating missing maps on the way.
fn assign_at(root: &mut Value, path: &NodePath, value: Value) -> Result<()> {
    let Some((last, parents)) = path.steps().split_last() else {
        *root = value;
        return Ok(());
    };
    let mut cur = root;
    let mut walked = NodePath::root();
    for step in parents {
        if cur.is_null() {
            *cur = empty_container_for(step);
        }
        walked = walked.child(step.clone());
        cur = match (step, cur) {
            (Step::Key(k), Value::Object(map)) => {
                map.entry(k.clone()).or_insert_with(|| Value::Object(Map::new()))
            }
            (Step::Index(i), Value::Array(items)) if *i < items.len() => &mut items[*i],
            _ => return Err(ReactorError::NotAContainer(walked.to_string())),
        };
    }
    if cur.is_null() {
        *cur = empty_container_for(last);
    }
    match (last, cur) {
        (Step::Key(k), Value::Object(map)) => {
            map.insert(k.clone(), value);
        }
        (Step::Index(i), Value::Array(items)) => {
            if *i < items.len() {
                items[*i] = value;
            } else if *i == items.len() {
                items.push(value);
            } else {
                return Err(past_the_end(path, *i, items.len()));
            }
        }
        _ => return Err(ReactorError::NotAContainer(walked.to_string())),
    }
    Ok(())
}

fn assign_child(root: &mut Value, parent: &NodePath, seg: &Segment, value: Value) -> Result<NodePath> {
    let not_container = || ReactorError::NotAContainer(parent.to_string());
    let slot = node_mut(root, parent).ok_or_else(not_container)?;
    if slot.is_null() {
        *slot = match seg {
            Segment::Index(_) => Value::Array(Vec::new()),
            _ => Value::Object(Map::new()),
        };
    }
    match (seg, slot) {
        (Segment::Key(k), Value::Object(map)) => {
            map.insert(k.clone(), value);
            Ok(parent.child(Step::Key(k.clone())))
        }
        (Segment::Index(i), Value::Array(items)) => {
            let idx = normalize_index(*i, items.len()).ok_or_else(|| {
                ReactorError::CannotSynthesize {
                    path: parent.child(Step::Index(0)).to_string(),
                    reason: format!("index {} is before the start of the sequence", i),
                }
            })?;
            let at = parent.child(Step::Index(idx));
            if idx < items.len() {
                items[idx] = value;
            } else if idx == items.len() {
                items.push(value);
            } else {
                return Err(past_the_end(&at, idx, items.len()));
            }
            Ok(at)
        }
        _ => Err(not_container()),
    }
}

/// Sequences only grow by one element at a time; no null padding.
fn past_the_end(path: &NodePath, index: usize, len: usize) -> ReactorError {
    ReactorError::CannotSynthesize {
        path: path.to_string(),
        reason: format!("index {index} is past the end of a sequence of length {len}"),
    }
}

fn remove_node(root: &mut Value, path: &NodePath) -> bool {
    let (Some(last), Some(parent)) = (path.last(), path.parent()) else {
        return false;
    };
    match (last, node_mut(root, &parent)) {
        (Step::Key(k), Some(Value::Object(map))) => map.shift_remove(k).is_some(),
        (Step::Index(i), Some(Value::Array(items))) if *i < items.len() => {
            items.remove(*i);
            true
        }
        _ => false,
    }
}

fn is_empty_container(v: &Value) -> bool {
    match v {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn prune_empty_ancestors(root: &mut Value, removed: &NodePath) {
    let mut cur = removed.parent();
    while let Some(p) = cur {
        if p.is_empty() || !node(root, &p).is_some_and(is_empty_container) {
            break;
        }
        remove_node(root, &p);
        cur = p.parent();
    }
}
