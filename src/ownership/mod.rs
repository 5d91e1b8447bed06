//! Ownership tracking and garbage collection of section entries.

pub mod entity;
pub mod state;

pub use entity::{EntityId, FacetId, IntegrationId};
pub use state::{OwnedIds, OwnershipState};
