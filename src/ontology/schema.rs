use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::Domain;

/// A declared ontology class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyClass {
    pub name: String,
    pub domain: Domain,
    /// Direct superclasses. Multiple inheritance is allowed; cycles are not.
    #[serde(default)]
    pub superclasses: BTreeSet<String>,
}

/// OWL-style property category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    /// Relates two entities; domain and range are classes.
    Object,
    /// Relates an entity to a literal; the range names datatypes and is not checked.
    Data,
    Annotation,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => write!(f, "object"),
            Self::Data => write!(f, "data"),
            Self::Annotation => write!(f, "annotation"),
        }
    }
}

/// A declared predicate with typing and algebraic flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyProperty {
    pub name: String,
    pub kind: PropertyKind,
    /// Classes allowed as subject. Empty means unconstrained.
    #[serde(default)]
    pub domain_classes: Vec<String>,
    /// Classes allowed as object. Empty means unconstrained.
    #[serde(default)]
    pub range_classes: Vec<String>,
    #[serde(default)]
    pub symmetric: bool,
    #[serde(default)]
    pub transitive: bool,
}

impl OntologyProperty {
    /// Creates an unconstrained object property.
    #[must_use]
    pub fn object(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Object,
            domain_classes: Vec::new(),
            range_classes: Vec::new(),
            symmetric: false,
            transitive: false,
        }
    }

    #[must_use]
    pub fn with_domain<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domain_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_range<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.range_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn symmetric(mut self) -> Self {
        self.symmetric = true;
        self
    }

    #[must_use]
    pub const fn transitive(mut self) -> Self {
        self.transitive = true;
        self
    }
}

/// A per-domain namespace of class and property declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainOntology {
    /// `"{domain}_{topic}"`.
    pub name: String,
    pub domain: Domain,
    pub topic: String,
    /// Classes in declaration order.
    #[serde(default)]
    pub classes: Vec<OntologyClass>,
    /// Properties in declaration order.
    #[serde(default)]
    pub properties: Vec<OntologyProperty>,
}

impl DomainOntology {
    #[must_use]
    pub fn namespace(domain: &Domain, topic: &str) -> String {
        format!("{}_{}", domain.as_str(), topic.trim())
    }

    #[must_use]
    pub fn class(&self, name: &str) -> Option<&OntologyClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&OntologyProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Outcome of checking a triple against the ontology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripleValidation {
    Accepted,
    /// No ontology declares the predicate; the write is allowed.
    Undeclared,
    Rejected {
        reason: String,
    },
}

impl TripleValidation {
    /// True for both `Accepted` and `Undeclared`.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}
