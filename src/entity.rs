//! Entity types and identity.
//!
//! Entities are the nodes of the graph: a stable string id, a class name
//! constrained by the ontology, a domain tag and a closed attribute map.

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::error::ValidationError;
use crate::value::{AttributeValue, Attributes};

/// Name of the implicit root class every type descends from.
pub const THING: &str = "Thing";

/// Stable, caller-chosen entity identifier.
///
/// Ordering is lexical; traversal tie-breaks rely on it.
///
/// # Examples
///
/// ```
/// use fair_kg::EntityId;
///
/// let id = EntityId::new("  insulin ").unwrap();
/// assert_eq!(id.as_str(), "insulin");
/// assert!(EntityId::new("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Maximum identifier length in bytes.
    pub const MAX_LEN: usize = 256;

    /// Creates an id, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Rejects empty ids and ids longer than [`Self::MAX_LEN`].
    pub fn new(id: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = id.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(ValidationError::IdTooLong {
                max_length: Self::MAX_LEN,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Creates an id from a literal known to be valid. Intended for tests and
    /// constant tables; invalid input is kept verbatim.
    #[must_use]
    pub fn from_static(id: &'static str) -> Self {
        Self(id.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for EntityId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// A typed, domain-tagged node of the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,

    /// Ontology class name.
    pub entity_type: String,

    pub domain: Domain,

    #[serde(default)]
    pub attributes: Attributes,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Creates a new entity. An empty type defaults to [`THING`].
    #[must_use]
    pub fn new(id: EntityId, entity_type: impl Into<String>, domain: Domain, attributes: Attributes) -> Self {
        let now = Utc::now();
        Self {
            id,
            entity_type: normalize_type(entity_type.into()),
            domain,
            attributes,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Display label: the `name` or `label` attribute, else the id with
    /// separators turned into spaces.
    #[must_use]
    pub fn label(&self) -> String {
        ["name", "label"]
            .iter()
            .find_map(|k| self.attributes.get(*k).and_then(AttributeValue::as_str))
            .map_or_else(
                || self.id.as_str().replace(['_', '-'], " "),
                str::to_string,
            )
    }

    /// Alternative names from the `aliases` attribute.
    #[must_use]
    pub fn aliases(&self) -> Vec<&str> {
        self.attributes
            .get("aliases")
            .map(|v| v.texts().collect())
            .unwrap_or_default()
    }

    /// Returns true if domain and attributes already equal the given values.
    #[must_use]
    pub fn same_content(&self, domain: &Domain, attributes: &Attributes) -> bool {
        self.domain == *domain && self.attributes == *attributes
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.entity_type == other.entity_type
            && self.domain == other.domain
            && self.attributes == other.attributes
    }
}

/// Trims a type name and maps the empty name to [`THING`].
#[must_use]
pub fn normalize_type(entity_type: String) -> String {
    let trimmed = entity_type.trim();
    if trimmed.is_empty() {
        THING.to_string()
    } else if trimmed.len() == entity_type.len() {
        entity_type
    } else {
        trimmed.to_string()
    }
}
