use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityId};
use crate::error::{KgError, KgResult};
use crate::ontology::OntologyManager;
use crate::relationship::{normalize_predicate, Relationship, TripleKey};
use crate::store::query::{EntityFilter, EntityQuery};
use crate::store::state::GraphState;

/// Which edges a traversal follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

/// An edge seen from one endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    pub relationship: &'a Relationship,
    pub neighbor: &'a EntityId,
    /// True when the edge points away from the expanded entity.
    pub forward: bool,
}

/// An entity reached by [`GraphSnapshot::related`].
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedEntity {
    pub entity: Entity,
    /// Hop distance from the start entity.
    pub distance: usize,
    /// Relationships along the first path that reached the entity.
    pub path: Vec<TripleKey>,
}

/// Entities returned by [`crate::GraphStore::find_related_entities`].
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedEntities {
    pub entities: Vec<RelatedEntity>,
    /// Hop limit the traversal actually used.
    pub max_hops: usize,
    /// Set when the requested hop count exceeded the configured cap. Entities
    /// further away than `max_hops` may exist but are not reported.
    pub truncated: bool,
}

impl RelatedEntities {
    pub fn iter(&self) -> std::slice::Iter<'_, RelatedEntity> {
        self.entities.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entities.iter().any(|r| r.entity.id.as_str() == id)
    }
}

impl<'a> IntoIterator for &'a RelatedEntities {
    type Item = &'a RelatedEntity;
    type IntoIter = std::slice::Iter<'a, RelatedEntity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

/// Immutable view of the graph at one generation.
///
/// Cloning is cheap. A snapshot stays valid, and unchanged, after later
/// mutations of the store it came from.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    state: Arc<GraphState>,
}

impl GraphSnapshot {
    pub(crate) fn new(state: Arc<GraphState>) -> Self {
        Self { state }
    }

    pub(crate) fn state(&self) -> &GraphState {
        &self.state
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    #[must_use]
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.state.entity(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.state.entities.contains_key(id)
    }

    /// Looks up an entity or fails with `EntityNotFound`.
    pub fn require(&self, id: &str) -> KgResult<&Entity> {
        self.entity(id).ok_or_else(|| not_found(id))
    }

    /// Entities in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.state
            .order
            .values()
            .filter_map(|id| self.state.entity(id.as_str()))
    }

    /// Position of `id` in insertion order (0-based, stable across updates).
    #[must_use]
    pub fn insertion_rank(&self, id: &str) -> Option<u64> {
        self.state.entities.get(id).map(|slot| slot.seq)
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.state.entities.len()
    }

    #[must_use]
    pub fn relationship(&self, key: &TripleKey) -> Option<&Relationship> {
        self.state.triples.get(key)
    }

    /// Relationships in canonical `(source, predicate, target)` order.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> + '_ {
        self.state.triples.values()
    }

    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.state.triples.len()
    }

    /// Relationships whose source is `id`, ordered by predicate then target.
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &Relationship> + '_ {
        self.state
            .outgoing
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|k| self.state.triples.get(k))
    }

    /// Relationships whose target is `id`.
    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &Relationship> + '_ {
        self.state
            .incoming
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|k| self.state.triples.get(k))
    }

    /// Edges incident to `id` in `direction`, ordered by predicate, then
    /// neighbour id, then outgoing before incoming.
    #[must_use]
    pub fn steps(&self, id: &str, direction: Direction) -> Vec<Step<'_>> {
        let mut steps = Vec::new();
        if direction != Direction::Incoming {
            steps.extend(self.outgoing(id).map(|r| Step {
                relationship: r,
                neighbor: &r.target,
                forward: true,
            }));
        }
        if direction != Direction::Outgoing {
            steps.extend(self.incoming(id).map(|r| Step {
                relationship: r,
                neighbor: &r.source,
                forward: false,
            }));
        }
        steps.sort_by(|a, b| {
            a.relationship
                .predicate
                .cmp(&b.relationship.predicate)
                .then_with(|| a.neighbor.cmp(b.neighbor))
                .then_with(|| b.forward.cmp(&a.forward))
        });
        steps
    }

    #[must_use]
    pub fn ontology(&self) -> &OntologyManager {
        &self.state.ontology
    }

    /// Runs a filter against this snapshot.
    ///
    /// # Errors
    /// `InvalidPattern` if a `Matches` predicate does not compile.
    pub fn query(&self, filter: &EntityFilter) -> KgResult<EntityQuery> {
        Ok(EntityQuery::new(self.clone(), filter.compile()?))
    }

    /// Breadth-first traversal from `id` up to `max_hops`.
    ///
    /// Each entity is reported once, with the path that reached it first.
    /// Neighbours are expanded in [`GraphSnapshot::steps`] order, so the
    /// result is deterministic for a given snapshot.
    pub fn related(
        &self,
        id: &str,
        max_hops: usize,
        direction: Direction,
        predicate: Option<&str>,
    ) -> KgResult<Vec<RelatedEntity>> {
        let start = self.require(id)?;
        let predicate = predicate.map(|p| normalize_predicate(p.to_string())).transpose()?;
        let mut visited: HashSet<&str> = HashSet::from([start.id.as_str()]);
        let mut queue: VecDeque<(&EntityId, usize, Vec<TripleKey>)> = VecDeque::new();
        queue.push_back((&start.id, 0, Vec::new()));
        let mut out = Vec::new();

        while let Some((current, distance, path)) = queue.pop_front() {
            if distance >= max_hops {
                continue;
            }
            for step in self.steps(current.as_str(), direction) {
                if predicate.as_ref().is_some_and(|p| *p != step.relationship.predicate) {
                    continue;
                }
                if !visited.insert(step.neighbor.as_str()) {
                    continue;
                }
                let Some(entity) = self.entity(step.neighbor.as_str()) else {
                    continue;
                };
                let mut next_path = path.clone();
                next_path.push(step.relationship.key());
                out.push(RelatedEntity {
                    entity: entity.clone(),
                    distance: distance + 1,
                    path: next_path.clone(),
                });
                queue.push_back((step.neighbor, distance + 1, next_path));
            }
        }
        Ok(out)
    }
}

pub(crate) fn not_found(id: &str) -> KgError {
    match EntityId::new(id) {
        Ok(id) => KgError::EntityNotFound { id },
        Err(e) => e.into(),
    }
}
