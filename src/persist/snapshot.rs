//! Canonical snapshot and adjacency summary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entity::{Entity, EntityId};
use crate::error::{KgError, KgResult};
use crate::ontology::{DomainOntology, OntologyManager};
use crate::relationship::{Provenance, Relationship, TripleKey};
use crate::store::state::{Adjacency, GraphState};
use crate::store::GraphSnapshot;

/// Layout version of [`Snapshot`].
pub const FORMAT_VERSION: u32 = 1;

/// Identifies the canonical list a summary was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationStamp {
    pub generation: u64,
    /// blake3 of the canonical list, hex encoded.
    pub digest: String,
}

/// Everything needed to rebuild a store: entities in insertion order,
/// relationships in key order, and the ontology declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub generation: u64,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub ontologies: Vec<DomainOntology>,
}

impl Snapshot {
    pub(crate) fn capture(snapshot: &GraphSnapshot) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            generation: snapshot.generation(),
            entities: snapshot.entities().cloned().collect(),
            relationships: snapshot.relationships().cloned().collect(),
            ontologies: snapshot.ontology().ontologies().to_vec(),
        }
    }

    /// Stamp over the serialised canonical list.
    pub fn stamp(&self) -> KgResult<GenerationStamp> {
        let bytes = serde_json::to_vec(self).map_err(|e| KgError::internal(format!("serialization failed: {e}")))?;
        Ok(GenerationStamp {
            generation: self.generation,
            digest: blake3::hash(&bytes).to_hex().to_string(),
        })
    }

    /// Builds graph state, failing on the first structural problem.
    pub(crate) fn restore(&self) -> KgResult<GraphState> {
        if self.format_version != FORMAT_VERSION {
            return Err(KgError::malformed(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                self.format_version
            )));
        }

        let mut state = GraphState {
            ontology: OntologyManager::from_declarations(&self.ontologies)?,
            generation: self.generation,
            ..GraphState::default()
        };

        for entity in &self.entities {
            for (key, value) in &entity.attributes {
                value.validate(key)?;
            }
            let existing = state.entity(entity.id.as_str()).map(|e| e.entity_type.clone());
            match existing {
                Some(existing) if existing != entity.entity_type => {
                    return Err(KgError::SchemaConflict {
                        id: entity.id.clone(),
                        existing,
                        requested: entity.entity_type.clone(),
                    });
                }
                Some(_) => state.replace_entity(entity.clone()),
                None => state.insert_entity(entity.clone()),
            }
        }

        for rel in &self.relationships {
            let key = rel.key();
            if rel.provenance != Provenance::Asserted {
                return Err(KgError::malformed(format!(
                    "relationship {key} has provenance '{}'; only asserted triples are stored",
                    rel.provenance
                )));
            }
            if rel.predicate.trim().is_empty() || rel.predicate.trim() != rel.predicate {
                return Err(KgError::malformed(format!("relationship {key} has an invalid predicate")));
            }
            if rel.weight.is_some_and(|w| !w.is_finite() || w < 0.0) {
                return Err(KgError::malformed(format!("relationship {key} has an invalid weight")));
            }
            for end in [&key.source, &key.target] {
                if state.entity(end.as_str()).is_none() {
                    return Err(KgError::malformed(format!(
                        "relationship {key} references missing entity '{end}'"
                    )));
                }
            }
            if state.triples.insert(key.clone(), rel.clone()).is_some() {
                return Err(KgError::malformed(format!("duplicate relationship {key}")));
            }
        }
        Ok(state)
    }
}

/// Precomputed adjacency, valid only for the canonical list it was stamped with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjacencySummary {
    pub stamp: GenerationStamp,
    pub outgoing: BTreeMap<EntityId, Vec<TripleKey>>,
    pub incoming: BTreeMap<EntityId, Vec<TripleKey>>,
}

fn flatten(adj: &Adjacency) -> BTreeMap<EntityId, Vec<TripleKey>> {
    adj.iter()
        .map(|(id, keys)| (id.clone(), keys.iter().cloned().collect()))
        .collect()
}

fn expand(summary: &BTreeMap<EntityId, Vec<TripleKey>>, state: &GraphState) -> KgResult<Adjacency> {
    let mut adj = Adjacency::with_capacity(summary.len());
    for (id, keys) in summary {
        if state.entity(id.as_str()).is_none() {
            return Err(KgError::malformed(format!(
                "adjacency summary references unknown entity '{id}'"
            )));
        }
        adj.insert(id.clone(), keys.iter().cloned().collect());
    }
    Ok(adj)
}

impl AdjacencySummary {
    pub(crate) fn capture(snapshot: &GraphSnapshot, stamp: GenerationStamp) -> Self {
        let state = snapshot.state();
        Self {
            stamp,
            outgoing: flatten(&state.outgoing),
            incoming: flatten(&state.incoming),
        }
    }

    /// Installs the summary into `state` if it matches `stamp`, otherwise
    /// rebuilds adjacency from the triples. Returns true if the summary was used.
    pub(crate) fn apply(summary: Option<&Self>, stamp: &GenerationStamp, state: &mut GraphState) -> KgResult<bool> {
        match summary {
            Some(summary) if summary.stamp == *stamp => {
                state.outgoing = expand(&summary.outgoing, state)?;
                state.incoming = expand(&summary.incoming, state)?;
                if state.adjacency_consistent() {
                    return Ok(true);
                }
                warn!(generation = stamp.generation, "Adjacency summary disagrees with triples, rebuilding");
            }
            Some(summary) => {
                warn!(
                    summary_generation = summary.stamp.generation,
                    generation = stamp.generation,
                    "Adjacency summary is stale, rebuilding"
                );
            }
            None => {}
        }
        state.rebuild_adjacency();
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GraphStore;
    use crate::value::Attributes;

    fn store() -> GraphStore {
        let store = GraphStore::new();
        store.add_entity("a", "Thing", "general", Attributes::new()).unwrap();
        store.add_entity("b", "Thing", "general", Attributes::new()).unwrap();
        store.add_relationship("a", "b", "links", "general", 0.8, None).unwrap();
        store
    }

    #[test]
    fn stamp_is_stable_and_content_sensitive() {
        let store = store();
        let snap = Snapshot::capture(&store.snapshot().unwrap());
        assert_eq!(snap.stamp().unwrap(), snap.stamp().unwrap());

        let mut other = snap.clone();
        other.relationships.clear();
        assert_ne!(snap.stamp().unwrap().digest, other.stamp().unwrap().digest);
    }

    #[test]
    fn restore_rejects_dangling_relationship() {
        let mut snap = Snapshot::capture(&store().snapshot().unwrap());
        snap.entities.retain(|e| e.id.as_str() != "b");
        let err = snap.restore().unwrap_err();
        assert!(matches!(err, KgError::MalformedSnapshot { .. }));
        assert!(err.to_string().contains("missing entity 'b'"));
    }

    #[test]
    fn restore_rejects_inferred_relationship() {
        let mut snap = Snapshot::capture(&store().snapshot().unwrap());
        snap.relationships[0].provenance = Provenance::Inferred;
        let err = snap.restore().unwrap_err();
        assert!(matches!(err, KgError::MalformedSnapshot { .. }));
        assert!(err.to_string().contains("inferred"));
    }

    #[test]
    fn restore_rejects_conflicting_duplicate() {
        let mut snap = Snapshot::capture(&store().snapshot().unwrap());
        let mut dup = snap.entities[0].clone();
        dup.entity_type = "Other".to_string();
        snap.entities.push(dup);
        assert!(matches!(snap.restore().unwrap_err(), KgError::SchemaConflict { .. }));
    }

    #[test]
    fn stale_summary_is_rebuilt() {
        let store = store();
        let view = store.snapshot().unwrap();
        let snap = Snapshot::capture(&view);
        let stamp = snap.stamp().unwrap();
        let mut stale = AdjacencySummary::capture(&view, stamp.clone());
        stale.stamp.generation += 1;
        stale.outgoing.clear();

        let mut state = snap.restore().unwrap();
        assert!(!AdjacencySummary::apply(Some(&stale), &stamp, &mut state).unwrap());
        assert!(state.adjacency_consistent());

        let fresh = AdjacencySummary::capture(&view, stamp.clone());
        let mut state = snap.restore().unwrap();
        assert!(AdjacencySummary::apply(Some(&fresh), &stamp, &mut state).unwrap());
    }

    #[test]
    fn summary_with_unknown_entity_is_malformed() {
        let store = store();
        let view = store.snapshot().unwrap();
        let snap = Snapshot::capture(&view);
        let stamp = snap.stamp().unwrap();
        let mut summary = AdjacencySummary::capture(&view, stamp.clone());
        summary.outgoing.insert(EntityId::from_static("ghost"), Vec::new());
        let mut state = snap.restore().unwrap();
        let err = AdjacencySummary::apply(Some(&summary), &stamp, &mut state).unwrap_err();
        assert!(matches!(err, KgError::MalformedSnapshot { .. }));
    }
}
