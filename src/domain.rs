//! Topical domains partitioning entities and ontologies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A topical namespace such as medical or financial.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Medical,
    Financial,
    /// Domain-neutral knowledge; matches every domain during entity linking.
    #[default]
    General,
    /// Facts extracted from evidence sources.
    Evidence,
    Custom(String),
}

impl Domain {
    /// Stable lowercase tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Medical => "medical",
            Self::Financial => "financial",
            Self::General => "general",
            Self::Evidence => "evidence",
            Self::Custom(name) => name,
        }
    }

    /// Returns true when an entity tagged `self` belongs to a query over `requested`.
    #[must_use]
    pub fn serves(&self, requested: &Domain) -> bool {
        self == requested || *self == Self::General
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Ok(match key.as_str() {
            "medical" => Self::Medical,
            "financial" | "finance" => Self::Financial,
            "general" | "" => Self::General,
            "evidence" => Self::Evidence,
            _ => Self::Custom(key),
        })
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(d) => d,
            Err(never) => match never {},
        }
    }
}
