//! Error types for mapper operations.
//!
//! "No matching row" is never an error: fetches return `Ok(None)` or an empty
//! `Vec`. Errors are reserved for misconfiguration, unsupported arguments and
//! failures of the underlying query service.

use crate::query::QueryError;
use crate::relation::RelationKind;
use thiserror::Error;

/// Error type for `Mapper`, `Registry` and relation operations
#[derive(Debug, Error)]
pub enum MapperError {
    /// Schema or registry misconfiguration (missing primary key, missing relation
    /// target, duplicate primary key, ...). Fatal at startup, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An operation was called with an input shape it does not support
    #[error("Argument error: {0}")]
    Argument(String),

    /// The query service failed to execute a statement
    #[error(transparent)]
    Query(#[from] QueryError),

    /// No mapper registered under this name
    #[error("No mapper registered as '{0}'")]
    UnknownMapper(String),

    /// The entity has no relation attached under this name
    #[error("Relation '{relation}' is not defined on mapper '{mapper}'")]
    UnknownRelation { mapper: String, relation: String },

    /// The relation exists but is of the other cardinality
    #[error("Relation '{relation}' is not a {expected:?} relation")]
    RelationKind {
        relation: String,
        expected: RelationKind,
    },

    /// Recursive relation saving went deeper than `max_relation_depth`
    #[error("Relation save depth {depth} exceeded on mapper '{mapper}'")]
    RelationDepthExceeded { mapper: String, depth: usize },

    /// Entity data could not be rendered as JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
