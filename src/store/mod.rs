//! The graph store: entities, relationships and their ontology.
//!
//! A [`GraphStore`] is single-writer, multi-reader. Readers take an
//! immutable [`GraphSnapshot`] (an `Arc` clone of the current state); a
//! mutation validates against the current state, then applies its change to a
//! copy-on-write state and publishes it together with a new generation.
//! Concurrent mutations fail fast with `ConcurrentMutationConflict`.

mod query;
mod snapshot;
pub(crate) mod state;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GraphConfig;
use crate::confidence::Confidence;
use crate::domain::Domain;
use crate::entity::{normalize_type, Entity, EntityId};
use crate::error::{KgError, KgResult};
use crate::ontology::{OntologyManager, OntologyProperty, TripleValidation};
use crate::relationship::{normalize_predicate, Relationship, TripleKey};
use crate::value::Attributes;

pub use query::{AttributePredicate, EntityFilter, EntityQuery};
pub use snapshot::{Direction, GraphSnapshot, RelatedEntities, RelatedEntity, Step};

pub(crate) use query::cached_regex;
pub(crate) use snapshot::not_found;
use state::GraphState;

fn lock_err(context: &'static str) -> KgError {
    KgError::internal(format!("poisoned lock: {context}"))
}

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    Created,
    Updated,
    /// The write matched the stored state; the generation did not move.
    Unchanged,
}

impl Mutation {
    #[must_use]
    pub const fn changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Counts describing a store at one generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub generation: u64,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub inferred_relationship_count: usize,
    pub entities_by_domain: BTreeMap<String, usize>,
    pub entities_by_type: BTreeMap<String, usize>,
    pub relationships_by_predicate: BTreeMap<String, usize>,
    pub ontology_count: usize,
    pub class_count: usize,
}

impl GraphStatistics {
    fn collect(snapshot: &GraphSnapshot) -> Self {
        let mut stats = Self {
            generation: snapshot.generation(),
            entity_count: snapshot.entity_count(),
            relationship_count: snapshot.relationship_count(),
            ontology_count: snapshot.ontology().ontologies().len(),
            class_count: snapshot.ontology().class_count(),
            ..Self::default()
        };
        for e in snapshot.entities() {
            *stats.entities_by_domain.entry(e.domain.to_string()).or_default() += 1;
            *stats.entities_by_type.entry(e.entity_type.clone()).or_default() += 1;
        }
        for r in snapshot.relationships() {
            *stats.relationships_by_predicate.entry(r.predicate.clone()).or_default() += 1;
            if r.is_inferred() {
                stats.inferred_relationship_count += 1;
            }
        }
        stats
    }
}

/// Caller-owned knowledge graph.
#[derive(Debug, Default)]
pub struct GraphStore {
    state: RwLock<Arc<GraphState>>,
    writer: Mutex<()>,
    config: GraphConfig,
}

impl GraphStore {
    /// Create an empty store with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub(crate) fn from_state(config: GraphConfig, state: GraphState) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Current immutable view of the graph.
    pub fn snapshot(&self) -> KgResult<GraphSnapshot> {
        let guard = self.state.read().map_err(|_| lock_err("graph.state"))?;
        Ok(GraphSnapshot::new(Arc::clone(&guard)))
    }

    pub fn generation(&self) -> KgResult<u64> {
        Ok(self.snapshot()?.generation())
    }

    pub fn entity(&self, id: &str) -> KgResult<Option<Entity>> {
        Ok(self.snapshot()?.entity(id).cloned())
    }

    pub fn relationship(&self, key: &TripleKey) -> KgResult<Option<Relationship>> {
        Ok(self.snapshot()?.relationship(key).cloned())
    }

    fn begin_write(&self) -> KgResult<MutexGuard<'_, ()>> {
        match self.writer.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(KgError::ConcurrentMutationConflict),
            Err(TryLockError::Poisoned(_)) => Err(lock_err("graph.writer")),
        }
    }

    /// Publishes a change and bumps the generation. Callers hold the writer
    /// guard and have already validated the change.
    fn commit(&self, apply: impl FnOnce(&mut GraphState)) -> KgResult<u64> {
        let mut guard = self.state.write().map_err(|_| lock_err("graph.state"))?;
        let state = Arc::make_mut(&mut guard);
        apply(state);
        state.generation += 1;
        Ok(state.generation)
    }

    /// Creates or updates an entity.
    ///
    /// Re-adding an entity with the same type is an upsert: identical content
    /// is `Unchanged`, different domain or attributes is `Updated`.
    ///
    /// # Errors
    /// - `SchemaConflict` if the id exists with a different type
    /// - `SchemaViolation` for undeclared types when `strict_entity_types` is on
    /// - validation errors for bad ids or non-finite numbers
    pub fn add_entity(
        &self,
        id: &str,
        entity_type: &str,
        domain: impl Into<Domain>,
        attributes: Attributes,
    ) -> KgResult<Mutation> {
        let id = EntityId::new(id)?;
        let entity_type = normalize_type(entity_type.to_string());
        let domain = domain.into();
        for (key, value) in &attributes {
            value.validate(key)?;
        }

        let _writer = self.begin_write()?;
        // The snapshot must be released before commit, or make_mut copies the state.
        let (mutation, entity) = {
            let current = self.snapshot()?;
            if self.config.strict_entity_types && !current.ontology().is_declared_class(&entity_type) {
                return Err(KgError::violation(format!(
                    "entity type '{entity_type}' is not declared in any ontology"
                )));
            }
            match current.entity(id.as_str()) {
                Some(existing) if existing.entity_type != entity_type => {
                    return Err(KgError::SchemaConflict {
                        id,
                        existing: existing.entity_type.clone(),
                        requested: entity_type,
                    });
                }
                Some(existing) if existing.same_content(&domain, &attributes) => return Ok(Mutation::Unchanged),
                Some(existing) => {
                    let mut updated = existing.clone();
                    updated.domain = domain;
                    updated.attributes = attributes;
                    updated.updated_at = Utc::now();
                    (Mutation::Updated, updated)
                }
                None => (Mutation::Created, Entity::new(id.clone(), entity_type, domain, attributes)),
            }
        };

        let generation = self.commit(|s| match mutation {
            Mutation::Created => s.insert_entity(entity),
            _ => s.replace_entity(entity),
        })?;
        debug!(entity_id = %id, generation, ?mutation, "Committed entity");
        Ok(mutation)
    }

    /// Removes an entity and every relationship referencing it. Returns the
    /// number of relationships removed with it.
    pub fn remove_entity(&self, id: &str) -> KgResult<usize> {
        let _writer = self.begin_write()?;
        self.snapshot()?.require(id)?;

        let mut removed = 0;
        let generation = self.commit(|s| removed = s.remove_entity(id).len())?;
        debug!(entity_id = id, generation, cascaded = removed, "Removed entity");
        Ok(removed)
    }

    /// Adds or updates an asserted relationship.
    ///
    /// Both endpoints must exist and the triple must pass ontology validation.
    /// The triple view and the adjacency view change in one commit.
    ///
    /// # Errors
    /// - `EntityNotFound` for a missing endpoint
    /// - `SchemaViolation` if the ontology rejects the endpoint types
    /// - validation errors for confidence, predicate or weight
    pub fn add_relationship(
        &self,
        source: &str,
        target: &str,
        predicate: &str,
        domain: impl Into<Domain>,
        confidence: f64,
        weight: Option<f64>,
    ) -> KgResult<Mutation> {
        let confidence = Confidence::new(confidence)?;
        let source_id = EntityId::new(source)?;
        let target_id = EntityId::new(target)?;
        let rel = Relationship::asserted(source_id, predicate, target_id, domain.into(), confidence, weight)?;

        let _writer = self.begin_write()?;
        let key = rel.key();
        let mutation = {
            let current = self.snapshot()?;
            let source_type = &current.require(rel.source.as_str())?.entity_type;
            let target_type = &current.require(rel.target.as_str())?.entity_type;
            if let TripleValidation::Rejected { reason } =
                current.ontology().validate_triple(source_type, &rel.predicate, target_type)
            {
                return Err(KgError::violation(reason));
            }
            match current.relationship(&key) {
                Some(existing) if *existing == rel => return Ok(Mutation::Unchanged),
                Some(_) => Mutation::Updated,
                None => Mutation::Created,
            }
        };
        let generation = self.commit(|s| s.insert_triple(rel))?;
        debug!(entity_id = %key.source, relationship = %key, generation, ?mutation, "Committed relationship");
        Ok(mutation)
    }

    /// Removes one relationship.
    pub fn remove_relationship(&self, source: &str, predicate: &str, target: &str) -> KgResult<Relationship> {
        let key = TripleKey::new(
            EntityId::new(source)?,
            normalize_predicate(predicate.to_string())?,
            EntityId::new(target)?,
        );
        let _writer = self.begin_write()?;
        if self.snapshot()?.relationship(&key).is_none() {
            return Err(KgError::RelationshipNotFound { key });
        }

        let mut removed = None;
        let generation = self.commit(|s| removed = s.remove_triple(&key))?;
        debug!(entity_id = %key.source, relationship = %key, generation, "Removed relationship");
        removed.ok_or_else(|| KgError::internal("relationship vanished under the writer lock"))
    }

    /// Registers a domain ontology namespace and returns its name.
    pub fn create_domain_ontology(&self, domain: impl Into<Domain>, topic: &str) -> KgResult<String> {
        let domain = domain.into();
        self.update_ontology(|o| Ok(o.create_domain_ontology(domain, topic)))
    }

    /// Declares a class; see [`OntologyManager::add_class`].
    pub fn add_class(&self, ontology: &str, name: &str, superclasses: &[&str]) -> KgResult<()> {
        self.update_ontology(|o| o.add_class(ontology, name, superclasses))
    }

    /// Declares a property; see [`OntologyManager::add_property`].
    ///
    /// Relationships already in the store are not re-validated.
    pub fn add_property(&self, ontology: &str, property: OntologyProperty) -> KgResult<()> {
        self.update_ontology(|o| o.add_property(ontology, property))
    }

    /// Applies `f` to a copy of the ontology and commits it only when it
    /// succeeds and actually changed something.
    fn update_ontology<T>(&self, f: impl FnOnce(&mut OntologyManager) -> KgResult<T>) -> KgResult<T> {
        let _writer = self.begin_write()?;
        let (out, ontology, changed) = {
            let current = self.snapshot()?;
            let mut ontology = current.ontology().clone();
            let out = f(&mut ontology)?;
            let changed = ontology.ontologies() != current.ontology().ontologies();
            (out, ontology, changed)
        };
        if changed {
            let generation = self.commit(|s| s.ontology = ontology)?;
            debug!(generation, "Committed ontology change");
        }
        Ok(out)
    }

    /// Runs a filter over the current snapshot. The returned query is lazy and
    /// can be iterated any number of times.
    pub fn query_entities(&self, filter: &EntityFilter) -> KgResult<EntityQuery> {
        self.snapshot()?.query(filter)
    }

    /// Entities within `max_hops` of `id`, following edges in both directions.
    pub fn find_related_entities(&self, id: &str, max_hops: usize) -> KgResult<RelatedEntities> {
        self.find_related_entities_with(id, max_hops, Direction::Both, None)
    }

    /// Like [`GraphStore::find_related_entities`] with a direction and an
    /// optional predicate filter. `max_hops` is capped by
    /// [`GraphConfig::max_traversal_hops`]; a capped request comes back with
    /// `truncated` set.
    pub fn find_related_entities_with(
        &self,
        id: &str,
        max_hops: usize,
        direction: Direction,
        predicate: Option<&str>,
    ) -> KgResult<RelatedEntities> {
        let hops = max_hops.min(self.config.max_traversal_hops);
        let truncated = hops < max_hops;
        if truncated {
            warn!(
                entity = id,
                requested = max_hops,
                applied = hops,
                "Traversal depth capped"
            );
        }
        let entities = self.snapshot()?.related(id, hops, direction, predicate)?;
        Ok(RelatedEntities {
            entities,
            max_hops: hops,
            truncated,
        })
    }

    pub fn statistics(&self) -> KgResult<GraphStatistics> {
        Ok(GraphStatistics::collect(&self.snapshot()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{attributes, AttributeValue};

    fn scenario() -> GraphStore {
        let store = GraphStore::new();
        store.add_entity("diabetes", "Disease", "medical", Attributes::new()).unwrap();
        store.add_entity("insulin", "Treatment", "medical", Attributes::new()).unwrap();
        store.add_entity("kidney", "Organ", "medical", Attributes::new()).unwrap();
        store
            .add_relationship("diabetes", "insulin", "treats", "medical", 0.9, None)
            .unwrap();
        store
            .add_relationship("diabetes", "kidney", "damages", "medical", 0.7, None)
            .unwrap();
        store
    }

    #[test]
    fn add_entity_is_idempotent_and_type_stable() {
        let store = GraphStore::new();
        assert_eq!(
            store.add_entity("x", "Disease", "medical", Attributes::new()).unwrap(),
            Mutation::Created
        );
        let generation = store.generation().unwrap();
        assert_eq!(
            store.add_entity("x", "Disease", "medical", Attributes::new()).unwrap(),
            Mutation::Unchanged
        );
        assert_eq!(store.generation().unwrap(), generation);
        assert_eq!(store.snapshot().unwrap().entity_count(), 1);

        let err = store.add_entity("x", "Drug", "medical", Attributes::new()).unwrap_err();
        assert!(matches!(err, KgError::SchemaConflict { .. }));
    }

    #[test]
    fn add_entity_updates_attributes() {
        let store = GraphStore::new();
        store.add_entity("x", "Disease", "medical", Attributes::new()).unwrap();
        let m = store
            .add_entity("x", "Disease", "medical", attributes([("severity", AttributeValue::from(3.0))]))
            .unwrap();
        assert_eq!(m, Mutation::Updated);
        assert_eq!(store.generation().unwrap(), 2);
    }

    #[test]
    fn non_finite_attribute_is_rejected() {
        let store = GraphStore::new();
        let err = store
            .add_entity("x", "Thing", "general", attributes([("v", AttributeValue::from(f64::NAN))]))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.generation().unwrap(), 0);
    }

    #[test]
    fn relationship_requires_endpoints() {
        let store = scenario();
        let before = store.snapshot().unwrap();
        let err = store
            .add_relationship("diabetes", "ghost", "treats", "medical", 0.5, None)
            .unwrap_err();
        assert!(matches!(err, KgError::EntityNotFound { .. }));
        let after = store.snapshot().unwrap();
        assert_eq!(before.generation(), after.generation());
        assert_eq!(after.relationship_count(), 2);
        assert!(after.state().adjacency_consistent());
    }

    #[test]
    fn relationship_upsert() {
        let store = scenario();
        let g = store.generation().unwrap();
        assert_eq!(
            store
                .add_relationship("diabetes", "insulin", "treats", "medical", 0.9, None)
                .unwrap(),
            Mutation::Unchanged
        );
        assert_eq!(store.generation().unwrap(), g);
        assert_eq!(
            store
                .add_relationship("diabetes", "insulin", "treats", "medical", 0.95, None)
                .unwrap(),
            Mutation::Updated
        );
        assert_eq!(store.generation().unwrap(), g + 1);
        assert_eq!(store.snapshot().unwrap().relationship_count(), 2);
    }

    #[test]
    fn ontology_rejects_bad_triples() {
        let store = scenario();
        let onto = store.create_domain_ontology(Domain::Medical, "core").unwrap();
        store.add_class(&onto, "Disease", &[]).unwrap();
        store.add_class(&onto, "Treatment", &[]).unwrap();
        store
            .add_property(
                &onto,
                OntologyProperty::object("cures")
                    .with_domain(["Treatment"])
                    .with_range(["Disease"]),
            )
            .unwrap();
        let err = store
            .add_relationship("diabetes", "insulin", "cures", "medical", 0.5, None)
            .unwrap_err();
        assert!(matches!(err, KgError::SchemaViolation { .. }));
        store
            .add_relationship("insulin", "diabetes", "cures", "medical", 0.5, None)
            .unwrap();
    }

    #[test]
    fn strict_types() {
        let store = GraphStore::with_config(GraphConfig {
            strict_entity_types: true,
            ..GraphConfig::default()
        });
        assert!(store.add_entity("x", "Disease", "medical", Attributes::new()).is_err());
        store.add_entity("y", "", "medical", Attributes::new()).unwrap();
        let onto = store.create_domain_ontology("medical", "core").unwrap();
        store.add_class(&onto, "Disease", &[]).unwrap();
        store.add_entity("x", "Disease", "medical", Attributes::new()).unwrap();
    }

    #[test]
    fn remove_entity_cascades() {
        let store = scenario();
        assert_eq!(store.remove_entity("diabetes").unwrap(), 2);
        let snap = store.snapshot().unwrap();
        assert_eq!(snap.relationship_count(), 0);
        assert!(snap.state().adjacency_consistent());
        assert!(matches!(
            store.remove_entity("diabetes").unwrap_err(),
            KgError::EntityNotFound { .. }
        ));
    }

    #[test]
    fn remove_relationship() {
        let store = scenario();
        let removed = store.remove_relationship("diabetes", "treats", "insulin").unwrap();
        assert!((removed.confidence.value() - 0.9).abs() < 1e-12);
        assert!(matches!(
            store.remove_relationship("diabetes", "treats", "insulin").unwrap_err(),
            KgError::RelationshipNotFound { .. }
        ));
    }

    #[test]
    fn related_entities_scenario() {
        let store = scenario();
        let related = store.find_related_entities("diabetes", 1).unwrap();
        let ids: Vec<&str> = related.iter().map(|r| r.entity.id.as_str()).collect();
        assert_eq!(ids, vec!["kidney", "insulin"]);
        assert!(related.iter().all(|r| r.distance == 1 && r.path.len() == 1));

        let from_insulin = store.find_related_entities("insulin", 2).unwrap();
        let kidney = from_insulin.iter().find(|r| r.entity.id.as_str() == "kidney").unwrap();
        assert_eq!(kidney.distance, 2);

        let outgoing_only = store
            .find_related_entities_with("insulin", 2, Direction::Outgoing, None)
            .unwrap();
        assert!(outgoing_only.is_empty());

        let filtered = store
            .find_related_entities_with("diabetes", 1, Direction::Both, Some("treats"))
            .unwrap();
        assert_eq!(filtered.len(), 1);
        let padded = store
            .find_related_entities_with("diabetes", 1, Direction::Both, Some(" treats "))
            .unwrap();
        assert_eq!(padded, filtered);
        assert!(!filtered.truncated);
        assert!(store.find_related_entities("nobody", 1).is_err());
    }

    #[test]
    fn capped_traversal_is_flagged() {
        let store = GraphStore::with_config(GraphConfig {
            max_traversal_hops: 3,
            ..GraphConfig::default()
        });
        let ids: Vec<String> = (0..6).map(|i| format!("n{i}")).collect();
        for id in &ids {
            store.add_entity(id, "Thing", "general", Attributes::new()).unwrap();
        }
        for pair in ids.windows(2) {
            store
                .add_relationship(&pair[0], &pair[1], "next", "general", 1.0, None)
                .unwrap();
        }

        let capped = store.find_related_entities("n0", 5).unwrap();
        assert!(capped.truncated);
        assert_eq!(capped.max_hops, 3);
        assert_eq!(capped.len(), 3);
        assert!(!capped.contains("n5"));

        let within = store.find_related_entities("n0", 3).unwrap();
        assert!(!within.truncated);
        assert_eq!(within.entities, capped.entities);
    }

    #[test]
    fn query_in_insertion_order() {
        let store = scenario();
        store
            .add_entity("hypertension", "Disease", "medical", attributes([("chronic", AttributeValue::from(true))]))
            .unwrap();
        let q = store
            .query_entities(&EntityFilter::new().with_type("Disease"))
            .unwrap();
        assert_eq!(q.ids(), vec!["diabetes", "hypertension"]);
        assert_eq!(q.ids(), q.ids());

        let q = store
            .query_entities(&EntityFilter::new().with_attribute(AttributePredicate::equals("chronic", true)))
            .unwrap();
        assert_eq!(q.ids(), vec!["hypertension"]);

        assert!(store
            .query_entities(&EntityFilter::new().with_attribute(AttributePredicate::matches("x", "(")))
            .is_err());
    }

    #[test]
    fn query_with_subclasses() {
        let store = GraphStore::new();
        let onto = store.create_domain_ontology("medical", "core").unwrap();
        store.add_class(&onto, "Treatment", &[]).unwrap();
        store.add_class(&onto, "Medication", &["Treatment"]).unwrap();
        store.add_entity("insulin", "Medication", "medical", Attributes::new()).unwrap();
        store.add_entity("surgery", "Treatment", "medical", Attributes::new()).unwrap();
        let exact = store.query_entities(&EntityFilter::new().with_type("Treatment")).unwrap();
        assert_eq!(exact.ids(), vec!["surgery"]);
        let all = store
            .query_entities(&EntityFilter::new().with_type("Treatment").with_subclasses())
            .unwrap();
        assert_eq!(all.ids(), vec!["insulin", "surgery"]);
    }

    #[test]
    fn snapshots_are_isolated_from_later_writes() {
        let store = scenario();
        let before = store.snapshot().unwrap();
        store.remove_entity("kidney").unwrap();
        assert!(before.contains("kidney"));
        assert_eq!(before.relationship_count(), 2);
        assert!(!store.snapshot().unwrap().contains("kidney"));
    }

    #[test]
    fn concurrent_writer_is_rejected() {
        let store = scenario();
        let guard = store.begin_write().unwrap();
        let err = store
            .add_entity("other", "Thing", "general", Attributes::new())
            .unwrap_err();
        assert!(matches!(err, KgError::ConcurrentMutationConflict));
        assert!(err.is_retryable());
        drop(guard);
        store.add_entity("other", "Thing", "general", Attributes::new()).unwrap();
    }

    #[test]
    fn ontology_changes_bump_generation() {
        let store = GraphStore::new();
        let onto = store.create_domain_ontology("financial", "markets").unwrap();
        assert_eq!(onto, "financial_markets");
        let g = store.generation().unwrap();
        store.create_domain_ontology("financial", "markets").unwrap();
        assert_eq!(store.generation().unwrap(), g);
        store.add_class(&onto, "Asset", &[]).unwrap();
        assert_eq!(store.generation().unwrap(), g + 1);
        assert!(store.add_class(&onto, "Asset", &["Asset"]).is_err());
        assert_eq!(store.generation().unwrap(), g + 1);
    }

    #[test]
    fn statistics_counts() {
        let store = scenario();
        let stats = store.statistics().unwrap();
        assert_eq!(stats.entity_count, 3);
        assert_eq!(stats.relationship_count, 2);
        assert_eq!(stats.entities_by_domain.get("medical"), Some(&3));
        assert_eq!(stats.relationships_by_predicate.get("treats"), Some(&1));
    }
}
