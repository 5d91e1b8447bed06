//! Declarative reaction engine for CloudFormation-style templates.
//!
//! Actions are matched against a rule catalog; matching rules edit the
//! document through path bindings, and every resulting section entry is
//! credited to the entity that caused it so it can be collected later.

pub mod action;
pub mod binding;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod ownership;
pub mod path;
pub mod rules;
pub mod session;
pub mod template;
pub mod transform;

pub use action::{Action, ActionKind, Dialect};
pub use config::SessionConfig;
pub use dispatch::{EditResult, dispatch};
pub use error::{ReactorError, Result};
pub use identity::{Identity, resolve_identity};
pub use ownership::{EntityId, FacetId, IntegrationId, OwnershipState};
pub use rules::RuleCatalog;
pub use session::Session;
pub use template::{Context, inject};
