//! Configuration for the store, reasoner, enhancer and runtime.
//!
//! Every section has sensible defaults; config files only need to name the
//! values they override.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KgError, KgResult, ValidationError};

/// Aggregate configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KgConfig {
    pub graph: GraphConfig,
    pub reasoner: ReasonerConfig,
    pub enhancer: EnhancerConfig,
    pub runtime: RuntimeConfig,
}

impl KgConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(s: &str) -> KgResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON document.
    pub fn from_json_str(s: &str) -> KgResult<Self> {
        let config: Self = serde_json::from_str(s).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config file; `.json` files are parsed as JSON, everything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> KgResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(KgError::Io)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            _ => Self::from_toml_str(&raw),
        }
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.enhancer.validate()?;
        if self.reasoner.max_inference_depth == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "reasoner.max_inference_depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Store behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Reject entity types not declared in any ontology.
    pub strict_entity_types: bool,
    /// Upper bound applied to `find_related_entities` hop counts.
    pub max_traversal_hops: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            strict_entity_types: false,
            max_traversal_hops: 8,
        }
    }
}

/// Reasoner budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    /// Maximum inference rounds before `depth_exceeded` is flagged.
    pub max_inference_depth: usize,
    /// Maximum number of derived triples kept per inference run.
    pub max_derived: usize,
    /// Maximum number of shortest paths enumerated per query.
    pub max_paths: usize,
    /// Upper bound applied to caller-supplied path lengths.
    pub max_path_length: usize,
    /// Hop limit for `explain_relationship`.
    pub explain_max_hops: usize,
    /// Maximum merges performed by community detection.
    pub max_community_merges: usize,
    pub eigenvector_max_iterations: usize,
    pub eigenvector_tolerance: f64,
    /// Wall-clock budget per expensive operation, in milliseconds.
    pub time_budget_ms: Option<u64>,
}

impl ReasonerConfig {
    #[must_use]
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            max_inference_depth: 5,
            max_derived: 50_000,
            max_paths: 256,
            max_path_length: 8,
            explain_max_hops: 4,
            max_community_merges: 100_000,
            eigenvector_max_iterations: 100,
            eigenvector_tolerance: 1e-6,
            time_budget_ms: None,
        }
    }
}

/// Query enhancement tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancerConfig {
    /// Cap of the confidence adjustment.
    pub max_delta: f64,
    /// Adjustment contributed by one fully confident supporting relationship.
    pub per_support_boost: f64,
    pub max_linked_entities: usize,
    /// Score multiplier for entities outside the requested domain.
    pub cross_domain_weight: f64,
    /// Minimum token length for prefix (fuzzy) matches.
    pub min_fuzzy_len: usize,
}

impl EnhancerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_unit(self.max_delta) || !in_unit(self.per_support_boost) || !in_unit(self.cross_domain_weight) {
            return Err(ValidationError::InvalidConfig {
                reason: "enhancer weights must lie in [0, 1]".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            max_delta: 0.15,
            per_support_boost: 0.05,
            max_linked_entities: 5,
            cross_domain_weight: 0.5,
            min_fuzzy_len: 4,
        }
    }
}

/// Reasoning runtime sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub workers: usize,
    /// Maximum queued jobs.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
        }
    }
}
