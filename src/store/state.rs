use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::entity::{Entity, EntityId};
use crate::ontology::OntologyManager;
use crate::relationship::{Relationship, TripleKey};

/// Per-entity set of incident triple keys.
pub(crate) type Adjacency = HashMap<EntityId, BTreeSet<TripleKey>>;

#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) seq: u64,
    pub(crate) entity: Entity,
}

/// The complete graph at one generation.
///
/// `triples` is authoritative; `outgoing`/`incoming` are derived from it and
/// only ever change together with it.
#[derive(Debug, Clone, Default)]
pub(crate) struct GraphState {
    pub(crate) entities: HashMap<EntityId, Slot>,
    pub(crate) order: BTreeMap<u64, EntityId>,
    pub(crate) next_seq: u64,
    pub(crate) triples: BTreeMap<TripleKey, Relationship>,
    pub(crate) outgoing: Adjacency,
    pub(crate) incoming: Adjacency,
    pub(crate) ontology: OntologyManager,
    pub(crate) generation: u64,
}

impl GraphState {
    pub(crate) fn insert_entity(&mut self, entity: Entity) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, entity.id.clone());
        self.entities.insert(entity.id.clone(), Slot { seq, entity });
    }

    /// Replaces an existing entity in place, keeping its insertion position.
    pub(crate) fn replace_entity(&mut self, entity: Entity) {
        if let Some(slot) = self.entities.get_mut(entity.id.as_str()) {
            slot.entity = entity;
        }
    }

    /// Removes the entity and returns the relationships that referenced it.
    pub(crate) fn remove_entity(&mut self, id: &str) -> Vec<Relationship> {
        let Some(slot) = self.entities.remove(id) else {
            return Vec::new();
        };
        self.order.remove(&slot.seq);

        let mut incident: BTreeSet<TripleKey> = self.outgoing.remove(id).unwrap_or_default();
        incident.extend(self.incoming.remove(id).unwrap_or_default());
        incident
            .into_iter()
            .filter_map(|key| self.remove_triple(&key))
            .collect()
    }

    pub(crate) fn insert_triple(&mut self, rel: Relationship) {
        let key = rel.key();
        self.outgoing.entry(key.source.clone()).or_default().insert(key.clone());
        self.incoming.entry(key.target.clone()).or_default().insert(key.clone());
        self.triples.insert(key, rel);
    }

    pub(crate) fn remove_triple(&mut self, key: &TripleKey) -> Option<Relationship> {
        let rel = self.triples.remove(key)?;
        detach(&mut self.outgoing, &key.source, key);
        detach(&mut self.incoming, &key.target, key);
        Some(rel)
    }

    /// Rebuilds both adjacency maps from the triple view.
    pub(crate) fn rebuild_adjacency(&mut self) {
        self.outgoing.clear();
        self.incoming.clear();
        for key in self.triples.keys() {
            self.outgoing.entry(key.source.clone()).or_default().insert(key.clone());
            self.incoming.entry(key.target.clone()).or_default().insert(key.clone());
        }
    }

    /// True if both adjacency maps hold exactly the keys of the triple view.
    pub(crate) fn adjacency_consistent(&self) -> bool {
        let count = |adj: &Adjacency| adj.values().map(BTreeSet::len).sum::<usize>();
        count(&self.outgoing) == self.triples.len()
            && count(&self.incoming) == self.triples.len()
            && self.triples.keys().all(|k| {
                self.outgoing.get(k.source.as_str()).is_some_and(|s| s.contains(k))
                    && self.incoming.get(k.target.as_str()).is_some_and(|s| s.contains(k))
            })
    }

    pub(crate) fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id).map(|slot| &slot.entity)
    }
}

fn detach(adj: &mut Adjacency, id: &EntityId, key: &TripleKey) {
    if let Some(set) = adj.get_mut(id.as_str()) {
        set.remove(key);
        if set.is_empty() {
            adj.remove(id.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::Confidence;
    use crate::domain::Domain;
    use crate::value::Attributes;

    fn entity(id: &'static str) -> Entity {
        Entity::new(EntityId::from_static(id), "Thing", Domain::General, Attributes::new())
    }

    fn rel(s: &'static str, p: &str, t: &'static str) -> Relationship {
        Relationship::asserted(
            EntityId::from_static(s),
            p,
            EntityId::from_static(t),
            Domain::General,
            Confidence::one(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn views_stay_in_step() {
        let mut state = GraphState::default();
        for id in ["a", "b", "c"] {
            state.insert_entity(entity(id));
        }
        state.insert_triple(rel("a", "p", "b"));
        state.insert_triple(rel("b", "p", "c"));
        state.insert_triple(rel("c", "q", "a"));
        assert!(state.adjacency_consistent());

        let removed = state.remove_entity("b");
        assert_eq!(removed.len(), 2);
        assert_eq!(state.triples.len(), 1);
        assert!(state.adjacency_consistent());
        assert!(!state.outgoing.contains_key("b"));
    }

    #[test]
    fn rebuild_matches_incremental() {
        let mut state = GraphState::default();
        for id in ["a", "b"] {
            state.insert_entity(entity(id));
        }
        state.insert_triple(rel("a", "p", "b"));
        let (out, inc) = (state.outgoing.clone(), state.incoming.clone());
        state.rebuild_adjacency();
        assert_eq!(state.outgoing, out);
        assert_eq!(state.incoming, inc);
    }

    #[test]
    fn insertion_order_survives_replace() {
        let mut state = GraphState::default();
        state.insert_entity(entity("z"));
        state.insert_entity(entity("a"));
        let mut updated = entity("z");
        updated.entity_type = "Other".to_string();
        state.replace_entity(updated);
        let order: Vec<&str> = state.order.values().map(EntityId::as_str).collect();
        assert_eq!(order, vec!["z", "a"]);
        assert_eq!(state.entity("z").map(|e| e.entity_type.as_str()), Some("Other"));
    }
}
