//! Rule layer: JSON catalog schema + validated, per-dialect rule tables.
//!
//! - condition: predicates over action properties and resource settings
//! - edit: typed Upsert/Append/Delete/RenameKey edits
//! - catalog: loading, validation and dialect materialization

pub mod catalog;
pub mod condition;
pub mod edit;

pub use catalog::{RawCatalog, Rule, RuleCatalog};
pub use condition::{Condition, Predicate, Subject};
pub use edit::{ContentSource, Edit, RawEditEntry};
