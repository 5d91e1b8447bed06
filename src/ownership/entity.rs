//! Entities that own document nodes.
//!
//! Facet and integration ids are pure functions of their defining
//! properties, so re-running the same action always lands on the same owner.

use crate::template::value_to_text;
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FacetId {
    pub resource: String,
    pub facet_type: String,
    pub key: String,
}

impl FacetId {
    /// `key` is the facet's property values, rendered as text, sorted and
    /// joined by `/`.
    pub fn derive(
        resource: impl Into<String>,
        facet_type: impl Into<String>,
        properties: &Map<String, Value>,
    ) -> Self {
        let mut values: Vec<String> = properties.values().map(value_to_text).collect();
        values.sort();
        Self {
            resource: resource.into(),
            facet_type: facet_type.into(),
            key: values.join("/"),
        }
    }
}

impl fmt::Display for FacetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.resource, self.facet_type, self.key)
    }
}

/// Directed edge `source -> target`, optionally tied to a facet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntegrationId {
    pub source: String,
    pub target: String,
    pub facet: Option<FacetId>,
}

impl IntegrationId {
    pub fn derive(
        source: impl Into<String>,
        target: impl Into<String>,
        facet: Option<FacetId>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            facet,
        }
    }

    pub fn touches(&self, resource: &str) -> bool {
        self.source == resource
            || self.target == resource
            || self.facet.as_ref().is_some_and(|f| f.resource == resource)
    }
}

impl fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.target)?;
        if let Some(facet) = &self.facet {
            write!(f, "#{}", facet)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityId {
    Resource(String),
    Facet(FacetId),
    Integration(IntegrationId),
}

impl EntityId {
    pub fn resource(id: impl Into<String>) -> Self {
        EntityId::Resource(id.into())
    }

    /// True if removing resource `id` must also remove this entity.
    pub fn depends_on(&self, id: &str) -> bool {
        match self {
            EntityId::Resource(r) => r == id,
            EntityId::Facet(f) => f.resource == id,
            EntityId::Integration(i) => i.touches(id),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Resource(r) => write!(f, "resource {}", r),
            EntityId::Facet(id) => write!(f, "facet {}", id),
            EntityId::Integration(id) => write!(f, "integration {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn facet_ids_ignore_property_order() {
        let a = json!({"Path": "/items", "Method": "GET"});
        let b = json!({"Method": "GET", "Path": "/items"});
        let fa = FacetId::derive("Api", "Route", a.as_object().unwrap());
        let fb = FacetId::derive("Api", "Route", b.as_object().unwrap());
        assert_eq!(fa, fb);
        assert_eq!(fa.to_string(), "Api/Route//items/GET");
    }

    #[test]
    fn integration_display_and_dependencies() {
        let facet = FacetId::derive("Api", "Route", json!({"M": "GET"}).as_object().unwrap());
        let plain = IntegrationId::derive("Fn", "Queue", None);
        let routed = IntegrationId::derive("Fn", "Queue", Some(facet));
        assert_eq!(plain.to_string(), "Fn->Queue");
        assert_eq!(routed.to_string(), "Fn->Queue#Api/Route/GET");

        let e = EntityId::Integration(routed);
        assert!(e.depends_on("Api"));
        assert!(e.depends_on("Queue"));
        assert!(!e.depends_on("Table"));
    }
}
