//! Similarity, fact validation and summary statistics.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::ontology::TripleValidation;
use crate::reasoner::inference::InferredRelationship;
use crate::reasoner::projection::Projection;
use crate::relationship::{Relationship, TripleKey};

/// Confidence credited when the endpoints are only connected by a path.
pub const PATH_SUPPORT: f64 = 0.5;

/// Upper bound on the confidence credited to an inferred-only fact.
pub const INFERRED_SUPPORT: f64 = 0.7;

/// An entity whose neighbourhood overlaps the query entity's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarEntity {
    pub id: EntityId,
    /// Jaccard similarity of the undirected neighbour sets.
    pub score: f64,
    pub shared_neighbors: Vec<EntityId>,
}

/// Evidence for or against a candidate triple.
#[derive(Debug, Clone, PartialEq)]
pub struct FactValidation {
    pub key: TripleKey,
    pub ontology: TripleValidation,
    pub direct: Option<Relationship>,
    pub inferred: Option<InferredRelationship>,
    /// Number of shortest paths linking the endpoints.
    pub supporting_paths: usize,
    pub is_valid: bool,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

impl FactValidation {
    pub(crate) fn assess(
        key: TripleKey,
        ontology: TripleValidation,
        direct: Option<Relationship>,
        inferred: Option<InferredRelationship>,
        supporting_paths: usize,
    ) -> Self {
        let mut confidence: f64 = 0.0;
        let mut evidence = Vec::new();
        if let Some(rel) = &direct {
            confidence = confidence.max(rel.confidence.value());
            evidence.push(format!("direct relationship {key} ({})", rel.confidence));
        }
        if supporting_paths > 0 {
            confidence = confidence.max(PATH_SUPPORT);
            evidence.push(format!("{supporting_paths} path(s) link the entities"));
        }
        if let Some(inf) = &inferred {
            confidence = confidence.max(inf.relationship.confidence.value().min(INFERRED_SUPPORT));
            evidence.push(format!("inferred by {}", inf.rule));
        }
        if let TripleValidation::Rejected { reason } = &ontology {
            evidence.push(format!("ontology rejects the triple: {reason}"));
        }
        let is_valid = ontology.is_allowed() && (direct.is_some() || inferred.is_some());
        Self {
            key,
            ontology,
            direct,
            inferred,
            supporting_paths,
            is_valid,
            confidence,
            evidence,
        }
    }
}

/// Summary of the graph's structure at one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStatistics {
    pub generation: u64,
    pub total_entities: usize,
    pub total_relationships: usize,
    pub undirected_edges: usize,
    pub connected_components: usize,
    pub communities_detected: usize,
    pub average_degree_centrality: f64,
    pub inferred_relationships: usize,
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn similar(projection: &Projection, node: usize, top_k: usize) -> Vec<SimilarEntity> {
    let mine: BTreeSet<usize> = projection.adj[node].keys().copied().collect();
    let mut out: Vec<SimilarEntity> = (0..projection.len())
        .filter(|&other| other != node)
        .filter_map(|other| {
            let theirs: BTreeSet<usize> = projection.adj[other].keys().copied().collect();
            let shared: Vec<usize> = mine.intersection(&theirs).copied().collect();
            if shared.is_empty() {
                return None;
            }
            let union = mine.union(&theirs).count();
            Some(SimilarEntity {
                id: projection.ids[other].clone(),
                score: shared.len() as f64 / union as f64,
                shared_neighbors: shared.into_iter().map(|i| projection.ids[i].clone()).collect(),
            })
        })
        .collect();
    out.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    out.truncate(top_k);
    out
}
