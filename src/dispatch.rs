//! Reaction dispatch: runs every matching rule's edits against a document.
//!
//! An unresolvable context key aborts the remaining edits of the rule that
//! raised it; sibling rules still run. Any other error aborts dispatch, and
//! edits already applied stay applied.

use crate::action::Action;
use crate::binding::{self, Binding};
use crate::error::{ReactorError, Result};
use crate::path::{NodePath, PathExpr, node_mut, remove_all};
use crate::rules::{ContentSource, Edit, Rule};
use crate::template::{Context, StringTemplate};
use crate::transform;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "Edit", rename_all = "PascalCase")]
pub enum EditResult {
    Upserted {
        path: NodePath,
        value: Value,
    },
    Appended {
        path: NodePath,
        index: usize,
        value: Value,
    },
    Deleted {
        paths: Vec<NodePath>,
    },
    Renamed {
        path: NodePath,
        from: String,
        to: String,
    },
}

impl EditResult {
    /// The address written by an Upsert, if this is one.
    pub fn upserted_path(&self) -> Option<&NodePath> {
        match self {
            EditResult::Upserted { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Absent or null content means "remove instead of write".
fn is_no_value(v: &Value) -> bool {
    v.is_null()
}

pub fn dispatch(rules: &[Rule], action: &Action, document: &mut Value) -> Result<Vec<EditResult>> {
    action.validate()?;
    let local_root = action.local_root();
    let mut results = Vec::new();

    for (i, rule) in rules.iter().enumerate() {
        if !rule.matches(action) {
            continue;
        }
        trace!(rule = i, kind = ?action.kind, "rule matched");

        for edit in &rule.edits {
            let mut dispatcher = Dispatcher {
                action,
                document: &mut *document,
                local_root: local_root.as_ref(),
                results: &mut results,
            };
            match dispatcher.apply(edit) {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    debug!(rule = i, edit = edit.kind(), error = %e, "rule not applicable");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(results)
}

struct Dispatcher<'a> {
    action: &'a Action,
    document: &'a mut Value,
    local_root: Option<&'a NodePath>,
    results: &'a mut Vec<EditResult>,
}

impl Dispatcher<'_> {
    fn apply(&mut self, edit: &Edit) -> Result<()> {
        match edit {
            Edit::Upsert {
                binding,
                content,
                create_path,
            } => self.upsert(binding, content, *create_path),
            Edit::Append {
                binding,
                content,
                if_not_exists,
            } => self.append(binding, content, *if_not_exists),
            Edit::Delete { binding } => self.delete(binding),
            Edit::RenameKey {
                binding,
                from_key,
                to_key,
            } => self.rename_key(binding, from_key, to_key),
        }
    }

    /// Final target expressions, one per fan-out context.
    fn targets(&self, binding: &Binding) -> Result<Vec<(PathExpr, Context)>> {
        let resolved = binding::resolve(self.document, self.local_root, binding, &self.action.context)?;
        resolved
            .contexts
            .into_iter()
            .map(|ctx| Ok((resolved.target.resolve(&ctx)?, ctx)))
            .collect()
    }

    fn content(&self, binding: &Binding, source: &ContentSource, ctx: &Context) -> Result<Value> {
        let raw = match source {
            ContentSource::Carried => self.action.value().cloned().unwrap_or(Value::Null),
            ContentSource::Template(node) => node.render(ctx)?,
        };
        transform::apply_all(&binding.transformations, raw, ctx)
    }

    /// Writes never move existing nodes, so they run per context. Removals
    /// are collected and applied together once every context is done.
    fn upsert(&mut self, binding: &Binding, source: &ContentSource, create_path: bool) -> Result<()> {
        let mut last = None;
        let mut doomed = Vec::new();

        for (expr, ctx) in self.targets(binding)? {
            let value = self.content(binding, source, &ctx)?;

            if is_no_value(&value) {
                let paths = expr.select(self.document, self.local_root)?;
                trace!(path = %expr, matches = paths.len(), "upsert of no value");
                doomed.extend(paths);
                continue;
            }
            if !create_path && expr.select(self.document, self.local_root)?.is_empty() {
                trace!(path = %expr, "target absent and CreatePath is off");
                continue;
            }

            let path = expr.set(self.document, self.local_root, value.clone())?;
            trace!(%path, "upserted");
            last = Some(EditResult::Upserted { path, value });
        }

        self.remove(doomed);
        self.results.extend(last);
        Ok(())
    }

    fn append(&mut self, binding: &Binding, source: &ContentSource, if_not_exists: bool) -> Result<()> {
        if self.action.is_redundant_setting_update() {
            debug!("setting unchanged, append skipped");
            return Ok(());
        }

        let targets = self.targets(binding)?;
        // Computed once against the incoming context, not per fan-out match.
        let value = self.content(binding, source, &self.action.context)?;
        if is_no_value(&value) {
            debug!("append of no value skipped");
            return Ok(());
        }

        for (expr, _) in targets {
            let existing = expr.select(self.document, self.local_root)?.into_iter().next();
            let Some(path) = existing else {
                let path = expr.set(self.document, self.local_root, Value::Array(vec![value.clone()]))?;
                self.results.push(EditResult::Appended {
                    path,
                    index: 0,
                    value: value.clone(),
                });
                continue;
            };

            let Some(Value::Array(items)) = node_mut(self.document, &path) else {
                return Err(ReactorError::AppendTargetNotSequence(path.to_string()));
            };
            if if_not_exists && items.contains(&value) {
                trace!(%path, "already present");
                continue;
            }
            let index = items.len();
            items.push(value.clone());
            self.results.push(EditResult::Appended {
                path,
                index,
                value: value.clone(),
            });
        }
        Ok(())
    }

    /// Every context's matches are resolved before anything is removed.
    fn delete(&mut self, binding: &Binding) -> Result<()> {
        let mut doomed = Vec::new();
        for (expr, _) in self.targets(binding)? {
            doomed.extend(expr.select(self.document, self.local_root)?);
        }
        self.remove(doomed);
        Ok(())
    }

    fn remove(&mut self, doomed: Vec<NodePath>) {
        if doomed.is_empty() {
            return;
        }
        let paths = remove_all(self.document, doomed);
        trace!(removed = paths.len(), "deleted");
        if !paths.is_empty() {
            self.results.push(EditResult::Deleted { paths });
        }
    }

    fn rename_key(
        &mut self,
        binding: &Binding,
        from_key: &StringTemplate,
        to_key: &StringTemplate,
    ) -> Result<()> {
        let mut planned = Vec::new();
        for (expr, ctx) in self.targets(binding)? {
            let from = from_key.render_text(&ctx)?;
            let to = to_key.render_text(&ctx)?;
            if from == to {
                continue;
            }
            for path in expr.select(self.document, self.local_root)? {
                planned.push((path, from.clone(), to.clone()));
            }
        }

        for (path, from, to) in planned {
            match node_mut(self.document, &path) {
                Some(Value::Object(map)) => {
                    if rename_in_place(map, &from, &to) {
                        self.results.push(EditResult::Renamed { path, from, to });
                    }
                }
                _ => return Err(ReactorError::NotAContainer(path.to_string())),
            }
        }
        Ok(())
    }
}

/// Moves `from` to `to` keeping its position; an existing `to` is replaced.
fn rename_in_place(map: &mut Map<String, Value>, from: &str, to: &str) -> bool {
    if !map.contains_key(from) {
        return false;
    }
    let old = std::mem::take(map);
    for (k, v) in old {
        if k == from {
            map.insert(to.to_string(), v);
        } else if k != to {
            map.insert(k, v);
        }
    }
    true
}
