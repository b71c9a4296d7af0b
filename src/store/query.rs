//! Entity filters and lazy query results.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::entity::Entity;
use crate::error::{KgError, KgResult, ValidationError};
use crate::store::GraphSnapshot;
use crate::value::AttributeValue;

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

pub(crate) fn cached_regex(pattern: &str) -> KgResult<Regex> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache
            .read()
            .map_err(|_| KgError::internal("regex cache lock poisoned"))?;
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = Regex::new(pattern).map_err(|e| {
        KgError::Validation(ValidationError::InvalidPattern {
            reason: format!("invalid regex '{pattern}': {e}"),
        })
    })?;

    let mut guard = cache
        .write()
        .map_err(|_| KgError::internal("regex cache lock poisoned"))?;

    if guard.len() >= REGEX_CACHE_MAX {
        guard.clear();
    }

    // Another thread may have inserted it while we compiled.
    guard
        .entry(pattern.to_string())
        .or_insert_with(|| compiled.clone());
    Ok(compiled)
}

/// A predicate over one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AttributePredicate {
    Exists { key: String },
    Equals { key: String, value: AttributeValue },
    /// Substring of a string value, or exact member of a string list.
    Contains { key: String, needle: String },
    /// Inclusive numeric range; an open bound is `None`.
    Range {
        key: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Regex match against any string value (list members included).
    Matches { key: String, pattern: String },
}

impl AttributePredicate {
    #[must_use]
    pub fn exists(key: impl Into<String>) -> Self {
        Self::Exists { key: key.into() }
    }

    #[must_use]
    pub fn equals(key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn contains(key: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains {
            key: key.into(),
            needle: needle.into(),
        }
    }

    #[must_use]
    pub fn range(key: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self::Range {
            key: key.into(),
            min,
            max,
        }
    }

    #[must_use]
    pub fn matches(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Matches {
            key: key.into(),
            pattern: pattern.into(),
        }
    }
}

/// Filter for [`crate::GraphStore::query_entities`]. All set criteria must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityFilter {
    pub entity_type: Option<String>,
    /// Also match subclasses of `entity_type`.
    #[serde(default)]
    pub include_subclasses: bool,
    pub domain: Option<Domain>,
    #[serde(default)]
    pub attributes: Vec<AttributePredicate>,
}

impl EntityFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    #[must_use]
    pub const fn with_subclasses(mut self) -> Self {
        self.include_subclasses = true;
        self
    }

    #[must_use]
    pub fn in_domain(mut self, domain: impl Into<Domain>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, predicate: AttributePredicate) -> Self {
        self.attributes.push(predicate);
        self
    }

    pub(crate) fn compile(&self) -> KgResult<CompiledFilter> {
        let predicates = self
            .attributes
            .iter()
            .map(|p| {
                let regex = match p {
                    AttributePredicate::Matches { pattern, .. } => Some(cached_regex(pattern)?),
                    _ => None,
                };
                Ok((p.clone(), regex))
            })
            .collect::<KgResult<Vec<_>>>()?;
        Ok(CompiledFilter {
            entity_type: self.entity_type.clone(),
            include_subclasses: self.include_subclasses,
            domain: self.domain.clone(),
            predicates,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledFilter {
    entity_type: Option<String>,
    include_subclasses: bool,
    domain: Option<Domain>,
    predicates: Vec<(AttributePredicate, Option<Regex>)>,
}

impl CompiledFilter {
    fn accepts(&self, snapshot: &GraphSnapshot, entity: &Entity) -> bool {
        if let Some(wanted) = &self.entity_type {
            let type_ok = if self.include_subclasses {
                snapshot.ontology().is_subclass_of(&entity.entity_type, wanted)
            } else {
                entity.entity_type == *wanted
            };
            if !type_ok {
                return false;
            }
        }
        if self.domain.as_ref().is_some_and(|d| *d != entity.domain) {
            return false;
        }
        self.predicates
            .iter()
            .all(|(p, re)| predicate_holds(p, re.as_ref(), entity))
    }
}

fn predicate_holds(predicate: &AttributePredicate, regex: Option<&Regex>, entity: &Entity) -> bool {
    match predicate {
        AttributePredicate::Exists { key } => entity.attributes.contains_key(key),
        AttributePredicate::Equals { key, value } => entity.attributes.get(key) == Some(value),
        AttributePredicate::Contains { key, needle } => match entity.attributes.get(key) {
            Some(AttributeValue::String(s)) => s.contains(needle.as_str()),
            Some(AttributeValue::StringList(items)) => items.iter().any(|i| i == needle),
            _ => false,
        },
        AttributePredicate::Range { key, min, max } => entity
            .attributes
            .get(key)
            .and_then(AttributeValue::as_number)
            .is_some_and(|n| min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi)),
        AttributePredicate::Matches { key, .. } => match (entity.attributes.get(key), regex) {
            (Some(value), Some(re)) => value.texts().any(|t| re.is_match(t)),
            _ => false,
        },
    }
}

/// Lazy, restartable query over one snapshot.
///
/// Every call to [`EntityQuery::iter`] walks the snapshot again in insertion
/// order, so repeated iteration yields the same sequence.
#[derive(Debug, Clone)]
pub struct EntityQuery {
    snapshot: GraphSnapshot,
    filter: CompiledFilter,
}

impl EntityQuery {
    pub(crate) fn new(snapshot: GraphSnapshot, filter: CompiledFilter) -> Self {
        Self { snapshot, filter }
    }

    /// Generation of the snapshot this query reads.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.snapshot.generation()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.snapshot
            .entities()
            .filter(move |e| self.filter.accepts(&self.snapshot, e))
    }

    /// Matching ids, in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.iter().map(|e| e.id.to_string()).collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.iter().count()
    }
}
