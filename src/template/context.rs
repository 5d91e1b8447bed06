//! Named values available to templates, paths and transforms.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Exact field lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Resolves a placeholder key.
    ///
    /// A key is first tried as a single field name, so `SETTING:Memory` or
    /// even `a.b` stored verbatim win. Otherwise dots descend into the
    /// value: `value.Properties.Name`, `keys.0`.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        if let Some(v) = self.0.get(key) {
            return Some(v);
        }
        let mut parts = key.split('.');
        let mut cur = self.0.get(parts.next()?)?;
        for part in parts {
            cur = match cur {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn colon_keys_are_single_fields_and_dots_descend() {
        let ctx = Context::new()
            .with("SETTING:Memory", 512)
            .with("value", json!({"Properties": {"Name": "q"}}))
            .with("keys", json!(["a", "b"]));
        assert_eq!(ctx.lookup("SETTING:Memory"), Some(&json!(512)));
        assert_eq!(ctx.lookup("value.Properties.Name"), Some(&json!("q")));
        assert_eq!(ctx.lookup("keys.1"), Some(&json!("b")));
        assert_eq!(ctx.lookup("value.Missing"), None);
        assert_eq!(ctx.lookup("SETTING:Timeout"), None);
    }
}
