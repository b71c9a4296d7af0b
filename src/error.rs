//! Error types for the knowledge-graph core.
//!
//! All errors are strongly typed using thiserror so callers can match on the
//! exact failure. Budget exhaustion during reasoning is deliberately *not* an
//! error: it is reported through [`crate::ReasoningFlags`] on a partial result.

use thiserror::Error;

use crate::entity::EntityId;
use crate::relationship::TripleKey;

/// Validation errors that occur during input validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Identifier cannot be empty")]
    EmptyId,

    #[error("Identifier exceeds maximum length of {max_length} bytes")]
    IdTooLong {
        max_length: usize,
    },

    #[error("Predicate cannot be empty")]
    EmptyPredicate,

    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        value: f64,
    },

    #[error("Traversal weight {value} must be finite and non-negative")]
    InvalidWeight {
        value: f64,
    },

    #[error("Attribute '{key}' holds a non-finite number")]
    NonFiniteNumber {
        key: String,
    },

    #[error("Class '{name}' is not declared in any ontology")]
    UnknownClass {
        name: String,
    },

    #[error("Ontology '{name}' does not exist")]
    UnknownOntology {
        name: String,
    },

    #[error("Invalid attribute pattern: {reason}")]
    InvalidPattern {
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Top-level error type for graph, ontology and reasoning operations.
#[derive(Debug, Error)]
pub enum KgError {
    #[error("Entity not found: {id}")]
    EntityNotFound {
        id: EntityId,
    },

    #[error("Relationship not found: {key}")]
    RelationshipNotFound {
        key: TripleKey,
    },

    /// An upsert tried to change the type of an existing entity.
    #[error("Entity '{id}' already exists with type '{existing}', cannot re-add as '{requested}'")]
    SchemaConflict {
        id: EntityId,
        existing: String,
        requested: String,
    },

    /// A write was rejected by the ontology.
    #[error("Schema violation: {reason}")]
    SchemaViolation {
        reason: String,
    },

    #[error("Adding superclass '{superclass}' to '{class}' would create a cycle")]
    CyclicHierarchy {
        class: String,
        superclass: String,
    },

    /// Another mutation holds the writer slot. Retry.
    #[error("Another mutation is in flight; retry the write")]
    ConcurrentMutationConflict,

    #[error("Malformed snapshot: {reason}")]
    MalformedSnapshot {
        reason: String,
    },

    #[error("Reasoning runtime is busy: queue capacity {capacity} reached")]
    Busy {
        capacity: usize,
    },

    #[error("Reasoning job did not finish within {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl KgError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a malformed-snapshot error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedSnapshot {
            reason: reason.into(),
        }
    }

    /// Creates a schema violation.
    #[must_use]
    pub fn violation(reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            reason: reason.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentMutationConflict | Self::Busy { .. } | Self::Timeout { .. }
        )
    }
}

/// Result type alias for knowledge-graph operations.
pub type KgResult<T> = Result<T, KgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_confidence() {
        let err = ValidationError::ConfidenceOutOfRange { value: 1.5 };
        let msg = format!("{err}");
        assert!(msg.contains("1.5"));
        assert!(msg.contains("out of range"));
    }

    #[test]
    fn test_schema_conflict_message() {
        let err = KgError::SchemaConflict {
            id: EntityId::from_static("x"),
            existing: "Disease".to_string(),
            requested: "Drug".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Disease"));
        assert!(msg.contains("Drug"));
    }

    #[test]
    fn test_kg_error_from_validation() {
        let err: KgError = ValidationError::EmptyPredicate.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_kg_error_retryable() {
        assert!(KgError::ConcurrentMutationConflict.is_retryable());
        assert!(KgError::Busy { capacity: 4 }.is_retryable());
        assert!(!KgError::malformed("bad").is_retryable());
        assert!(!KgError::internal("poisoned").is_retryable());
    }

    #[test]
    fn test_cyclic_hierarchy_message() {
        let err = KgError::CyclicHierarchy {
            class: "A".to_string(),
            superclass: "B".to_string(),
        };
        assert!(err.to_string().contains("cycle"));
    }
}
