//! Relationships (triples) between entities.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::confidence::Confidence;
use crate::domain::Domain;
use crate::entity::EntityId;
use crate::error::ValidationError;

/// Identity of a relationship: `(source, predicate, target)`.
///
/// Field order matters: the derived ordering sorts by source, then predicate,
/// then target, which is the canonical export order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TripleKey {
    pub source: EntityId,
    pub predicate: String,
    pub target: EntityId,
}

impl TripleKey {
    #[must_use]
    pub fn new(source: EntityId, predicate: impl Into<String>, target: EntityId) -> Self {
        Self {
            source,
            predicate: predicate.into(),
            target,
        }
    }

    /// The endpoint opposite to `id`, if `id` is an endpoint.
    #[must_use]
    pub fn other_end(&self, id: &EntityId) -> Option<&EntityId> {
        if self.source == *id {
            Some(&self.target)
        } else if self.target == *id {
            Some(&self.source)
        } else {
            None
        }
    }

    #[must_use]
    pub fn touches(&self, id: &EntityId) -> bool {
        self.source == *id || self.target == *id
    }
}

impl fmt::Display for TripleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} -{}-> {})", self.source, self.predicate, self.target)
    }
}

/// Whether a triple was stated by a caller or derived by inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Asserted,
    Inferred,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asserted => write!(f, "asserted"),
            Self::Inferred => write!(f, "inferred"),
        }
    }
}

/// A typed, directed, confidence-weighted edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: EntityId,
    pub predicate: String,
    pub target: EntityId,
    pub domain: Domain,
    pub confidence: Confidence,
    pub provenance: Provenance,

    /// Traversal cost; `None` counts as [`Relationship::DEFAULT_WEIGHT`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl Relationship {
    /// Weight used by path ranking when none was given.
    pub const DEFAULT_WEIGHT: f64 = 1.0;

    /// Creates an asserted relationship after validating predicate and weight.
    ///
    /// # Errors
    ///
    /// `EmptyPredicate` for a blank predicate, `InvalidWeight` for a negative
    /// or non-finite weight.
    pub fn asserted(
        source: EntityId,
        predicate: impl Into<String>,
        target: EntityId,
        domain: Domain,
        confidence: Confidence,
        weight: Option<f64>,
    ) -> Result<Self, ValidationError> {
        let predicate = normalize_predicate(predicate.into())?;
        if let Some(w) = weight {
            if !w.is_finite() || w < 0.0 {
                return Err(ValidationError::InvalidWeight { value: w });
            }
        }
        Ok(Self {
            source,
            predicate,
            target,
            domain,
            confidence,
            provenance: Provenance::Asserted,
            weight,
        })
    }

    /// Creates an inferred relationship. Inputs come from already validated triples.
    #[must_use]
    pub fn inferred(key: TripleKey, domain: Domain, confidence: Confidence) -> Self {
        Self {
            source: key.source,
            predicate: key.predicate,
            target: key.target,
            domain,
            confidence,
            provenance: Provenance::Inferred,
            weight: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> TripleKey {
        TripleKey::new(self.source.clone(), self.predicate.clone(), self.target.clone())
    }

    #[must_use]
    pub fn traversal_weight(&self) -> f64 {
        self.weight.unwrap_or(Self::DEFAULT_WEIGHT)
    }

    #[must_use]
    pub fn is_inferred(&self) -> bool {
        self.provenance == Provenance::Inferred
    }
}

/// Trims a predicate name and rejects blanks.
pub fn normalize_predicate(predicate: String) -> Result<String, ValidationError> {
    let trimmed = predicate.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyPredicate);
    }
    Ok(trimmed.to_string())
}
