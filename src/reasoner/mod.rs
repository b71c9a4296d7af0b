//! Read-only reasoning over a [`GraphStore`].
//!
//! The [`Reasoner`] never holds its own copy of the graph. Each call takes a
//! snapshot, and every result is cached under the snapshot's generation. When
//! the store's generation moves on, the whole cache is discarded on the next
//! call; a reader still holding an older snapshot neither reads nor writes it.

mod analysis;
mod budget;
mod centrality;
mod community;
mod inference;
mod paths;
mod projection;
mod rules;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::ReasonerConfig;
use crate::error::{KgError, KgResult};
use crate::relationship::{normalize_predicate, TripleKey};
use crate::store::{not_found, Direction, GraphSnapshot, GraphStore, Step};

pub use analysis::{FactValidation, ReasoningStatistics, SimilarEntity, INFERRED_SUPPORT, PATH_SUPPORT};
pub use budget::ReasoningFlags;
pub use centrality::{CentralityKind, CentralityScores};
pub use community::CommunityResult;
pub use inference::{InferenceResult, InferredRelationship};
pub use paths::{GraphPath, PathEdge, PathResult, Trace};
pub use rules::{Composition, InferenceRule};

use budget::Budget;
use projection::Projection;

/// What `infer_relationships` reports on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InferenceScope {
    WholeGraph,
    /// Derived triples whose subject or object is this entity.
    Entity(String),
}

impl InferenceScope {
    #[must_use]
    pub fn entity(id: impl Into<String>) -> Self {
        Self::Entity(id.into())
    }
}

#[derive(Debug, Default)]
struct Cache {
    generation: u64,
    projection: Option<Arc<Projection>>,
    inference: Option<Arc<InferenceResult>>,
    scoped: HashMap<String, Arc<InferenceResult>>,
    centrality: HashMap<CentralityKind, Arc<CentralityScores>>,
    communities: Option<Arc<CommunityResult>>,
    paths: HashMap<(String, String, usize), Arc<PathResult>>,
    traces: HashMap<(String, String), Arc<Trace>>,
}

fn lock_err(context: &'static str) -> KgError {
    KgError::internal(format!("poisoned lock: {context}"))
}

/// Path finding, inference and graph analytics with per-generation caching.
#[derive(Debug)]
pub struct Reasoner {
    store: Arc<GraphStore>,
    config: ReasonerConfig,
    cache: Mutex<Cache>,
}

impl Reasoner {
    #[must_use]
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self::with_config(store, ReasonerConfig::default())
    }

    #[must_use]
    pub fn with_config(store: Arc<GraphStore>, config: ReasonerConfig) -> Self {
        Self {
            store,
            config,
            cache: Mutex::new(Cache::default()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &ReasonerConfig {
        &self.config
    }

    /// Generation the cache currently holds results for.
    pub fn cached_generation(&self) -> KgResult<u64> {
        Ok(self.cache.lock().map_err(|_| lock_err("reasoner.cache"))?.generation)
    }

    fn budget(&self) -> Budget {
        Budget::new(self.config.time_budget())
    }

    /// Runs `f` against the cache for `generation`. Returns `None` for a
    /// reader whose snapshot is older than the cache.
    fn with_cache<T>(&self, generation: u64, f: impl FnOnce(&mut Cache) -> T) -> KgResult<Option<T>> {
        let mut cache = self.cache.lock().map_err(|_| lock_err("reasoner.cache"))?;
        if generation > cache.generation {
            debug!(from = cache.generation, to = generation, "Reasoner cache invalidated");
            *cache = Cache {
                generation,
                ..Cache::default()
            };
        }
        if generation < cache.generation {
            return Ok(None);
        }
        Ok(Some(f(&mut cache)))
    }

    fn lookup<T>(
        &self,
        generation: u64,
        operation: &'static str,
        f: impl FnOnce(&mut Cache) -> Option<Arc<T>>,
    ) -> KgResult<Option<Arc<T>>> {
        let hit = self.with_cache(generation, f)?.flatten();
        if hit.is_some() {
            debug!(operation, generation, "Reasoner cache hit");
        } else {
            debug!(operation, generation, "Reasoner cache miss");
        }
        Ok(hit)
    }

    fn projection(&self, snapshot: &GraphSnapshot) -> KgResult<Arc<Projection>> {
        let generation = snapshot.generation();
        if let Some(hit) = self.lookup(generation, "projection", |c| c.projection.clone())? {
            return Ok(hit);
        }
        let projection = Arc::new(Projection::build(snapshot));
        self.with_cache(generation, |c| c.projection = Some(Arc::clone(&projection)))?;
        Ok(projection)
    }

    /// All shortest paths between two entities, up to `max_length` hops.
    ///
    /// Edges are walked in both directions. Paths are ordered by total
    /// traversal weight, then node sequence. Unreachable targets give an
    /// empty list. A `max_length` above `max_path_length` is lowered to it
    /// and the result is flagged `truncated`.
    ///
    /// # Errors
    /// `EntityNotFound` if either endpoint is unknown.
    pub fn find_paths(&self, source: &str, target: &str, max_length: usize) -> KgResult<Arc<PathResult>> {
        self.paths_at(&self.store.snapshot()?, source, target, max_length)
    }

    fn paths_at(
        &self,
        snapshot: &GraphSnapshot,
        source: &str,
        target: &str,
        requested: usize,
    ) -> KgResult<Arc<PathResult>> {
        let from = &snapshot.require(source)?.id;
        let to = &snapshot.require(target)?.id;
        let max_length = requested.min(self.config.max_path_length);
        let generation = snapshot.generation();
        let key = (from.to_string(), to.to_string(), requested);

        if let Some(hit) = self.lookup(generation, "find_paths", |c| c.paths.get(&key).cloned())? {
            return Ok(hit);
        }

        let (mut paths, mut flags) = paths::shortest_paths(
            |id| snapshot.steps(id, Direction::Both),
            from,
            to,
            max_length,
            self.config.max_paths,
            &self.budget(),
        );
        paths.sort_by(GraphPath::cmp_by_weight);
        flags.truncated |= max_length < requested;
        flags.warn_if_partial("find_paths");
        let result = Arc::new(PathResult {
            generation,
            paths,
            flags,
        });
        if !flags.timed_out {
            self.with_cache(generation, |c| c.paths.insert(key, Arc::clone(&result)))?;
        }
        Ok(result)
    }

    /// Derives new triples from the rule table.
    ///
    /// The derived set is rebuilt from the asserted triples on each new
    /// generation and never written back to the store. An entity scope
    /// filters the whole-graph result.
    ///
    /// # Errors
    /// `EntityNotFound` for an unknown scoped entity.
    pub fn infer_relationships(&self, scope: InferenceScope) -> KgResult<Arc<InferenceResult>> {
        let snapshot = self.store.snapshot()?;
        match scope {
            InferenceScope::WholeGraph => self.infer_all(&snapshot),
            InferenceScope::Entity(id) => {
                snapshot.require(&id)?;
                let generation = snapshot.generation();
                if let Some(hit) = self.lookup(generation, "infer_scoped", |c| c.scoped.get(&id).cloned())? {
                    return Ok(hit);
                }
                let scoped = Arc::new(self.infer_all(&snapshot)?.involving(&id));
                self.with_cache(generation, |c| c.scoped.insert(id, Arc::clone(&scoped)))?;
                Ok(scoped)
            }
        }
    }

    pub(crate) fn infer_all(&self, snapshot: &GraphSnapshot) -> KgResult<Arc<InferenceResult>> {
        let generation = snapshot.generation();
        if let Some(hit) = self.lookup(generation, "infer", |c| c.inference.clone())? {
            return Ok(hit);
        }
        let result = Arc::new(inference::infer(snapshot, &self.config, &self.budget()));
        result.flags.warn_if_partial("infer_relationships");
        debug!(
            generation,
            derived = result.len(),
            rounds = result.rounds,
            "Inference finished"
        );
        if !result.flags.timed_out {
            self.with_cache(generation, |c| c.inference = Some(Arc::clone(&result)))?;
        }
        Ok(result)
    }

    /// Partitions the entities with greedy modularity optimisation.
    pub fn detect_communities(&self) -> KgResult<Arc<CommunityResult>> {
        self.communities_at(&self.store.snapshot()?)
    }

    fn communities_at(&self, snapshot: &GraphSnapshot) -> KgResult<Arc<CommunityResult>> {
        let generation = snapshot.generation();
        if let Some(hit) = self.lookup(generation, "communities", |c| c.communities.clone())? {
            return Ok(hit);
        }
        let projection = self.projection(snapshot)?;
        let result = Arc::new(community::detect(&projection, generation, &self.config, &self.budget()));
        result.flags.warn_if_partial("detect_communities");
        if !result.flags.timed_out {
            self.with_cache(generation, |c| c.communities = Some(Arc::clone(&result)))?;
        }
        Ok(result)
    }

    pub fn centrality(&self, kind: CentralityKind) -> KgResult<Arc<CentralityScores>> {
        self.centrality_at(&self.store.snapshot()?, kind)
    }

    pub(crate) fn centrality_at(
        &self,
        snapshot: &GraphSnapshot,
        kind: CentralityKind,
    ) -> KgResult<Arc<CentralityScores>> {
        let generation = snapshot.generation();
        if let Some(hit) = self.lookup(generation, "centrality", |c| c.centrality.get(&kind).cloned())? {
            return Ok(hit);
        }
        let projection = self.projection(snapshot)?;
        let result = Arc::new(centrality::compute(
            kind,
            &projection,
            generation,
            &self.config,
            &self.budget(),
        ));
        result.flags.warn_if_partial("centrality");
        if !result.flags.timed_out {
            self.with_cache(generation, |c| c.centrality.insert(kind, Arc::clone(&result)))?;
        }
        Ok(result)
    }

    /// Best path between two entities over asserted and inferred
    /// relationships, within `explain_max_hops`.
    ///
    /// Among the shortest paths, the one with the highest confidence product
    /// wins, then the lexically smallest node sequence.
    pub fn explain_relationship(&self, a: &str, b: &str) -> KgResult<Arc<Trace>> {
        let snapshot = self.store.snapshot()?;
        let from = &snapshot.require(a)?.id;
        let to = &snapshot.require(b)?.id;
        let generation = snapshot.generation();
        let key = (from.to_string(), to.to_string());
        if let Some(hit) = self.lookup(generation, "explain", |c| c.traces.get(&key).cloned())? {
            return Ok(hit);
        }

        let inferred = self.infer_all(&snapshot)?;
        let mut overlay: HashMap<&str, Vec<Step<'_>>> = HashMap::new();
        for d in &inferred.derived {
            let r = &d.relationship;
            overlay.entry(r.source.as_str()).or_default().push(Step {
                relationship: r,
                neighbor: &r.target,
                forward: true,
            });
            overlay.entry(r.target.as_str()).or_default().push(Step {
                relationship: r,
                neighbor: &r.source,
                forward: false,
            });
        }
        let neighbors = |id: &str| {
            let mut steps = snapshot.steps(id, Direction::Both);
            if let Some(extra) = overlay.get(id) {
                steps.extend(extra.iter().copied());
                steps.sort_by(|x, y| {
                    x.relationship
                        .predicate
                        .cmp(&y.relationship.predicate)
                        .then_with(|| x.neighbor.cmp(y.neighbor))
                        .then_with(|| y.forward.cmp(&x.forward))
                });
            }
            steps
        };

        let max_hops = self.config.explain_max_hops;
        let (mut paths, mut flags) =
            paths::shortest_paths(neighbors, from, to, max_hops, self.config.max_paths, &self.budget());
        paths.sort_by(GraphPath::cmp_by_confidence);
        flags.depth_exceeded |= inferred.flags.depth_exceeded;
        flags.truncated |= inferred.flags.truncated;
        flags.timed_out |= inferred.flags.timed_out;
        flags.warn_if_partial("explain_relationship");

        let trace = Arc::new(Trace {
            source: from.clone(),
            target: to.clone(),
            path: paths.into_iter().next(),
            max_hops,
            flags,
        });
        if !flags.timed_out {
            self.with_cache(generation, |c| c.traces.insert(key, Arc::clone(&trace)))?;
        }
        Ok(trace)
    }

    /// The `top_k` entities with the most similar neighbourhoods.
    pub fn find_similar_entities(&self, id: &str, top_k: usize) -> KgResult<Vec<SimilarEntity>> {
        let snapshot = self.store.snapshot()?;
        let projection = self.projection(&snapshot)?;
        let node = projection.position(id).ok_or_else(|| not_found(id))?;
        Ok(analysis::similar(&projection, node, top_k))
    }

    /// Collects direct, inferred and path evidence for a candidate triple.
    pub fn validate_fact(&self, source: &str, predicate: &str, target: &str) -> KgResult<FactValidation> {
        let snapshot = self.store.snapshot()?;
        let s = snapshot.require(source)?;
        let t = snapshot.require(target)?;
        let key = TripleKey::new(s.id.clone(), normalize_predicate(predicate.to_string())?, t.id.clone());

        let ontology = snapshot
            .ontology()
            .validate_triple(&s.entity_type, &key.predicate, &t.entity_type);
        let direct = snapshot.relationship(&key).cloned();
        let inferred = self.infer_all(&snapshot)?.get(&key).cloned();
        let paths = self.paths_at(&snapshot, source, target, 3)?;
        let supporting = if s.id == t.id { 0 } else { paths.paths.len() };
        Ok(FactValidation::assess(key, ontology, direct, inferred, supporting))
    }

    /// Summary counts, component and community structure.
    #[allow(clippy::cast_precision_loss)]
    pub fn statistics(&self) -> KgResult<ReasoningStatistics> {
        let snapshot = self.store.snapshot()?;
        let projection = self.projection(&snapshot)?;
        let communities = self.communities_at(&snapshot)?;
        let degree = self.centrality_at(&snapshot, CentralityKind::Degree)?;
        let inferred = self.infer_all(&snapshot)?;
        let n = degree.scores.len();
        let average = if n == 0 {
            0.0
        } else {
            degree.scores.iter().map(|(_, s)| s).sum::<f64>() / n as f64
        };
        Ok(ReasoningStatistics {
            generation: snapshot.generation(),
            total_entities: snapshot.entity_count(),
            total_relationships: snapshot.relationship_count(),
            undirected_edges: projection.edge_count(),
            connected_components: projection.components().len(),
            communities_detected: communities.len(),
            average_degree_centrality: average,
            inferred_relationships: inferred.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::ontology::OntologyProperty;
    use crate::value::Attributes;

    fn scenario() -> Arc<GraphStore> {
        let store = Arc::new(GraphStore::new());
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
    fn scenario_path() {
        let reasoner = Reasoner::new(scenario());
        let result = reasoner.find_paths("insulin", "kidney", 3).unwrap();
        assert_eq!(result.paths.len(), 1);
        assert_eq!(result.paths[0].node_ids(), vec!["insulin", "diabetes", "kidney"]);
        let again = reasoner.find_paths("insulin", "kidney", 3).unwrap();
        assert!(Arc::ptr_eq(&result, &again));
    }

    #[test]
    fn capped_path_length_is_flagged() {
        let store = Arc::new(GraphStore::new());
        let ids: Vec<String> = (0..5).map(|i| format!("n{i}")).collect();
        for id in &ids {
            store.add_entity(id, "Thing", "general", Attributes::new()).unwrap();
        }
        for pair in ids.windows(2) {
            store
                .add_relationship(&pair[0], &pair[1], "next", "general", 1.0, None)
                .unwrap();
        }
        let config = ReasonerConfig {
            max_path_length: 3,
            ..ReasonerConfig::default()
        };
        let reasoner = Reasoner::with_config(store, config);

        let capped = reasoner.find_paths("n0", "n4", 6).unwrap();
        assert!(capped.paths.is_empty());
        assert!(capped.flags.truncated);

        let within = reasoner.find_paths("n0", "n3", 3).unwrap();
        assert_eq!(within.paths.len(), 1);
        assert!(within.flags.is_complete());
    }

    #[test]
    fn unreachable_is_empty_and_unknown_is_error() {
        let store = scenario();
        store.add_entity("island", "Thing", "general", Attributes::new()).unwrap();
        let reasoner = Reasoner::new(store);
        assert!(reasoner.find_paths("insulin", "island", 4).unwrap().paths.is_empty());
        assert!(matches!(
            reasoner.find_paths("insulin", "ghost", 4).unwrap_err(),
            KgError::EntityNotFound { .. }
        ));
    }

    #[test]
    fn cache_follows_generation() {
        let store = scenario();
        let reasoner = Reasoner::new(Arc::clone(&store));
        let first = reasoner.centrality(CentralityKind::Degree).unwrap();
        let cached = reasoner.centrality(CentralityKind::Degree).unwrap();
        assert!(Arc::ptr_eq(&first, &cached));

        store.add_entity("hub", "Thing", "general", Attributes::new()).unwrap();
        store.add_entity("extra", "Thing", "general", Attributes::new()).unwrap();
        for id in ["diabetes", "insulin", "kidney", "extra"] {
            store.add_relationship("hub", id, "links", "general", 1.0, None).unwrap();
        }
        let second = reasoner.centrality(CentralityKind::Degree).unwrap();
        assert_ne!(first.generation, second.generation);
        assert_eq!(second.rank("hub"), Some(1));
        assert_ne!(first.ranking, second.ranking);
        assert_eq!(reasoner.cached_generation().unwrap(), second.generation);
    }

    #[test]
    fn inference_is_idempotent() {
        let store = scenario();
        store.add_entity("nephropathy", "Disease", "medical", Attributes::new()).unwrap();
        store
            .add_relationship("insulin", "diabetes", "treats", "medical", 0.8, None)
            .unwrap();
        store
            .add_relationship("diabetes", "nephropathy", "causes", "medical", 0.6, None)
            .unwrap();
        let reasoner = Reasoner::new(Arc::clone(&store));
        let a = reasoner.infer_relationships(InferenceScope::WholeGraph).unwrap();
        let b = reasoner.infer_relationships(InferenceScope::WholeGraph).unwrap();
        assert_eq!(a.derived, b.derived);
        assert!(!a.is_empty());

        let keys: Vec<TripleKey> = a.keys().collect();
        let mut dedup = keys.clone();
        dedup.dedup();
        assert_eq!(keys, dedup);
        assert_eq!(store.snapshot().unwrap().relationship_count(), 4);

        let scoped = reasoner
            .infer_relationships(InferenceScope::entity("nephropathy"))
            .unwrap();
        assert!(scoped
            .derived
            .iter()
            .all(|d| d.relationship.key().touches(&EntityId::from_static("nephropathy"))));
    }

    #[test]
    fn explain_uses_inferred_edges() {
        let store = Arc::new(GraphStore::new());
        for id in ["a", "b", "c", "d", "e", "f"] {
            store.add_entity(id, "Thing", "general", Attributes::new()).unwrap();
        }
        let onto = store.create_domain_ontology("general", "structure").unwrap();
        store
            .add_property(&onto, OntologyProperty::object("part_of").transitive())
            .unwrap();
        for (s, t) in [("a", "b"), ("b", "c"), ("c", "d"), ("d", "e"), ("e", "f")] {
            store.add_relationship(s, t, "part_of", "general", 0.9, None).unwrap();
        }
        let reasoner = Reasoner::new(store);
        let trace = reasoner.explain_relationship("a", "f").unwrap();
        assert!(trace.is_connected());
        assert!(trace.uses_inference());
        assert_eq!(trace.path.as_ref().unwrap().hops(), 1);
        assert!(trace.to_string().contains("part_of (inferred"));
    }

    #[test]
    fn explain_reports_disconnection() {
        let store = scenario();
        store.add_entity("island", "Thing", "general", Attributes::new()).unwrap();
        let reasoner = Reasoner::new(store);
        let trace = reasoner.explain_relationship("insulin", "island").unwrap();
        assert!(!trace.is_connected());
        assert!(trace.to_string().contains("no relationship found"));
    }

    #[test]
    fn validate_fact_reports_support() {
        let reasoner = Reasoner::new(scenario());
        let v = reasoner.validate_fact("diabetes", "treats", "insulin").unwrap();
        assert!(v.is_valid);
        assert!((v.confidence - 0.9).abs() < 1e-12);
        let v = reasoner.validate_fact("insulin", "damages", "kidney").unwrap();
        assert!(!v.is_valid);
        assert_eq!(v.supporting_paths, 1);
        assert!((v.confidence - PATH_SUPPORT).abs() < 1e-12);
    }

    #[test]
    fn statistics_read_one_generation_under_writes() {
        let store = scenario();
        let reasoner = Arc::new(Reasoner::new(Arc::clone(&store)));
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..300 {
                    store
                        .add_entity(&format!("loner{i}"), "Thing", "general", Attributes::new())
                        .unwrap();
                }
            })
        };
        for _ in 0..50 {
            let stats = reasoner.statistics().unwrap();
            assert_eq!(stats.communities_detected, stats.connected_components);
            assert_eq!(stats.connected_components, stats.total_entities - 2);
        }
        writer.join().unwrap();
    }

    #[test]
    fn statistics_summary() {
        let reasoner = Reasoner::new(scenario());
        let stats = reasoner.statistics().unwrap();
        assert_eq!(stats.total_entities, 3);
        assert_eq!(stats.total_relationships, 2);
        assert_eq!(stats.connected_components, 1);
        assert!(stats.communities_detected >= 1);
        assert!(stats.average_degree_centrality > 0.0);
    }
}
