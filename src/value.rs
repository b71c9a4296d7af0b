//! Attribute values entities can hold.
//!
//! The attribute model is closed: strings, numbers, booleans and ordered
//! string lists. There is no nested structure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Attribute map carried by an entity. Keys are ordered for stable export.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Possible values an entity attribute can hold.
///
/// # Examples
///
/// ```
/// use fair_kg::AttributeValue;
///
/// let name = AttributeValue::from("Type 2 diabetes");
/// let prevalence = AttributeValue::from(0.09);
///
/// assert!(name.is_string());
/// assert_eq!(prevalence.as_number(), Some(0.09));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    String(String),
    Number(f64),
    Bool(bool),
    StringList(Vec<String>),
}

impl AttributeValue {
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_string_list(&self) -> bool {
        matches!(self, Self::StringList(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            Self::StringList(v) => Some(v),
            _ => None,
        }
    }

    /// Iterates over the textual content of this value: the string itself or
    /// every list element. Numbers and booleans yield nothing.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Self::String(v) => std::slice::from_ref(v),
            Self::StringList(v) => v,
            Self::Number(_) | Self::Bool(_) => &[],
        };
        slice.iter().map(String::as_str)
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Bool(_) => "bool",
            Self::StringList(_) => "string_list",
        }
    }

    /// Checks the value is storable (numbers must be finite).
    pub fn validate(&self, key: &str) -> Result<(), ValidationError> {
        match self {
            Self::Number(v) if !v.is_finite() => Err(ValidationError::NonFiniteNumber {
                key: key.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(v) => write!(f, "{v:?}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::StringList(v) => write!(f, "[{}]", v.join(", ")),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(v: Vec<String>) -> Self {
        Self::StringList(v)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(v: Vec<&str>) -> Self {
        Self::StringList(v.into_iter().map(str::to_string).collect())
    }
}

/// Builds an attribute map from `(key, value)` pairs.
///
/// ```
/// use fair_kg::{attributes, AttributeValue};
///
/// let attrs = attributes([("name", AttributeValue::from("Insulin"))]);
/// assert_eq!(attrs.len(), 1);
/// ```
pub fn attributes<K, I>(pairs: I) -> Attributes
where
    K: Into<String>,
    I: IntoIterator<Item = (K, AttributeValue)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
