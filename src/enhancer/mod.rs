//! Entity linking and bounded confidence adjustment for calling agents.
//!
//! [`QueryEnhancer::enhance`] links the entities a free-text query mentions,
//! gathers the relationships that touch them, and turns that support into a
//! `confidence_delta` in `[0, max_delta]`. The caller decides how to merge
//! the delta into its own answer.

mod linker;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EnhancerConfig;
use crate::domain::Domain;
use crate::entity::EntityId;
use crate::error::KgResult;
use crate::reasoner::{CentralityKind, InferenceRule, Reasoner, ReasoningFlags};
use crate::relationship::{Relationship, TripleKey};
use crate::store::Direction;

pub use linker::MatchKind;

/// An entity recognised in the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedEntity {
    pub id: EntityId,
    pub label: String,
    pub entity_type: String,
    pub domain: Domain,
    pub match_kind: MatchKind,
    /// Match score after the cross-domain penalty.
    pub score: f64,
    pub in_domain: bool,
    /// 1-based degree-centrality rank.
    pub centrality_rank: Option<usize>,
    /// 1-hop neighbours over asserted relationships.
    pub neighbors: Vec<EntityId>,
}

/// A relationship that backs one or more linked entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportingRelationship {
    pub relationship: Relationship,
    /// Rule that derived it, for inferred relationships.
    pub rule: Option<InferenceRule>,
}

/// Outcome of [`QueryEnhancer::enhance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementResult {
    pub query: String,
    pub domain: Domain,
    pub generation: u64,
    pub linked: Vec<LinkedEntity>,
    /// Deduplicated by triple, in key order.
    pub support: Vec<SupportingRelationship>,
    pub confidence_delta: f64,
    pub flags: ReasoningFlags,
}

impl EnhancementResult {
    fn empty(query: &str, domain: Domain, generation: u64) -> Self {
        Self {
            query: query.to_string(),
            domain,
            generation,
            linked: Vec::new(),
            support: Vec::new(),
            confidence_delta: 0.0,
            flags: ReasoningFlags::default(),
        }
    }

    #[must_use]
    pub fn is_linked(&self) -> bool {
        !self.linked.is_empty()
    }

    /// Mean confidence of the supporting relationships, 0 when there are none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_support_confidence(&self) -> f64 {
        if self.support.is_empty() {
            return 0.0;
        }
        self.support
            .iter()
            .map(|s| s.relationship.confidence.value())
            .sum::<f64>()
            / self.support.len() as f64
    }
}

/// `min(max_delta, per_support_boost * n * average)`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn confidence_delta(config: &EnhancerConfig, supports: usize, average_confidence: f64) -> f64 {
    let raw = config.per_support_boost * supports as f64 * average_confidence.clamp(0.0, 1.0);
    raw.clamp(0.0, config.max_delta)
}

/// Links queries to the graph and scores the evidence found there.
#[derive(Debug, Clone)]
pub struct QueryEnhancer {
    reasoner: Arc<Reasoner>,
    config: EnhancerConfig,
}

impl QueryEnhancer {
    #[must_use]
    pub fn new(reasoner: Arc<Reasoner>) -> Self {
        Self::with_config(reasoner, EnhancerConfig::default())
    }

    #[must_use]
    pub fn with_config(reasoner: Arc<Reasoner>, config: EnhancerConfig) -> Self {
        Self { reasoner, config }
    }

    #[must_use]
    pub fn config(&self) -> &EnhancerConfig {
        &self.config
    }

    /// Links `query` to entities in `domain` and collects supporting evidence.
    ///
    /// A query that links nothing yields an empty result with a zero delta.
    pub fn enhance(&self, query: &str, domain: impl Into<Domain>) -> KgResult<EnhancementResult> {
        let domain = domain.into();
        let snapshot = self.reasoner.store().snapshot()?;
        let generation = snapshot.generation();
        let tokens = linker::tokenize(query)?;
        let candidates = linker::link(&snapshot, &tokens, &domain, &self.config)?;
        if candidates.is_empty() {
            debug!(%domain, "No entities linked");
            return Ok(EnhancementResult::empty(query, domain, generation));
        }

        let centrality = self.reasoner.centrality_at(&snapshot, CentralityKind::Degree)?;
        let inferred = self.reasoner.infer_all(&snapshot)?;
        let mut support: BTreeMap<TripleKey, SupportingRelationship> = BTreeMap::new();
        let mut linked = Vec::with_capacity(candidates.len());

        for candidate in &candidates {
            let id = &candidate.entity.id;
            let mut neighbors = Vec::new();
            for step in snapshot.steps(id.as_str(), Direction::Both) {
                if !neighbors.contains(step.neighbor) {
                    neighbors.push(step.neighbor.clone());
                }
                support
                    .entry(step.relationship.key())
                    .or_insert_with(|| SupportingRelationship {
                        relationship: step.relationship.clone(),
                        rule: None,
                    });
            }
            for derived in inferred.derived.iter().filter(|d| d.relationship.key().touches(id)) {
                support
                    .entry(derived.key())
                    .or_insert_with(|| SupportingRelationship {
                        relationship: derived.relationship.clone(),
                        rule: Some(derived.rule),
                    });
            }
            linked.push(LinkedEntity {
                id: id.clone(),
                label: candidate.entity.label(),
                entity_type: candidate.entity.entity_type.clone(),
                domain: candidate.entity.domain.clone(),
                match_kind: candidate.kind,
                score: candidate.score,
                in_domain: candidate.in_domain,
                centrality_rank: centrality.rank(id.as_str()),
                neighbors,
            });
        }

        let mut result = EnhancementResult {
            query: query.to_string(),
            domain,
            generation,
            linked,
            support: support.into_values().collect(),
            confidence_delta: 0.0,
            flags: inferred.flags,
        };
        result.confidence_delta = confidence_delta(
            &self.config,
            result.support.len(),
            result.average_support_confidence(),
        );
        debug!(
            generation,
            linked = result.linked.len(),
            support = result.support.len(),
            delta = result.confidence_delta,
            "Query enhanced"
        );
        Ok(result)
    }
}
