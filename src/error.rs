//! Crate error type.
//!
//! Two classes of failure exist. `UnresolvableContextKey` is expected: a rule
//! referenced a context variable the current action does not carry, and the
//! dispatcher drops the rest of that rule only. Every other variant is a
//! structural or contract violation and aborts the whole operation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReactorError {
    #[error("unresolvable context key '{key}'")]
    UnresolvableContextKey { key: String },

    #[error("unknown transform '{name}'")]
    UnknownTransform { name: String },

    #[error("transform '{name}' failed: {reason}")]
    TransformFailed { name: String, reason: String },

    #[error("malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    #[error("malformed template '{template}': {reason}")]
    MalformedTemplate { template: String, reason: String },

    #[error("malformed binding: {0}")]
    MalformedBinding(String),

    #[error("malformed rule catalog: {0}")]
    MalformedCatalog(String),

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("path '{0}' is relative to a local root but none was given")]
    MissingLocalRoot(String),

    #[error("cannot create '{path}': {reason}")]
    CannotSynthesize { path: String, reason: String },

    #[error("node at {0} is not a container")]
    NotAContainer(String),

    #[error("append target {0} is not a sequence")]
    AppendTargetNotSequence(String),

    #[error("malformed reference {0}")]
    MalformedReference(String),

    #[error("reference '{0}' does not resolve inside this document")]
    NonLocalReference(String),

    #[error("unknown entity {0}")]
    UnknownEntity(String),

    #[error("{section} entry '{id}' is owned by {owner}; {claimant} cannot claim it")]
    OwnershipConflict {
        section: String,
        id: String,
        owner: String,
        claimant: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReactorError {
    pub fn unresolvable(key: impl Into<String>) -> Self {
        Self::UnresolvableContextKey { key: key.into() }
    }

    pub fn malformed_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_template(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTemplate {
            template: template.into(),
            reason: reason.into(),
        }
    }

    pub fn transform_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransformFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for the error class that only aborts the current rule.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnresolvableContextKey { .. })
    }
}

pub type Result<T> = std::result::Result<T, ReactorError>;
