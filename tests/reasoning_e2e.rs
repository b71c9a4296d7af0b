//! Reasoning, enhancement and runtime over the seeded demo graph.

use std::sync::Arc;
use std::time::Duration;

use fair_kg::{
    seed, Attributes, CentralityKind, GraphStore, InferenceRule, InferenceScope, KgConfig, QueryEnhancer,
    Reasoner, ReasonerConfig, ReasoningJob, ReasoningRuntime,
};

fn demo() -> Arc<GraphStore> {
    let store = Arc::new(GraphStore::new());
    seed::cross_domain(&store).unwrap();
    store
}

#[test]
fn inference_twice_yields_identical_set() {
    let store = demo();
    store.add_entity("nephropathy", "Disease", "medical", Attributes::new()).unwrap();
    store.add_entity("metformin", "Medication", "medical", Attributes::new()).unwrap();
    store
        .add_relationship("metformin", "diabetes", "treats", "medical", 0.8, None)
        .unwrap();
    store
        .add_relationship("diabetes", "nephropathy", "causes", "medical", 0.6, None)
        .unwrap();

    let reasoner = Reasoner::new(Arc::clone(&store));
    let first = reasoner.infer_relationships(InferenceScope::WholeGraph).unwrap();
    let second = Reasoner::new(Arc::clone(&store))
        .infer_relationships(InferenceScope::WholeGraph)
        .unwrap();
    assert_eq!(first.derived, second.derived);

    let keys: Vec<_> = first.keys().collect();
    let mut unique = keys.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(keys.len(), unique.len());

    let treats = first
        .derived
        .iter()
        .find(|d| d.rule == InferenceRule::TreatsTransitivity)
        .unwrap();
    assert_eq!(treats.relationship.source.as_str(), "metformin");
    assert_eq!(treats.relationship.target.as_str(), "nephropathy");
    assert!((treats.relationship.confidence.value() - 0.48).abs() < 1e-9);
}

#[test]
fn depth_cap_is_a_flag_not_an_error() {
    let store = Arc::new(GraphStore::new());
    let onto = store.create_domain_ontology("general", "parts").unwrap();
    store
        .add_property(&onto, fair_kg::OntologyProperty::object("part_of").transitive())
        .unwrap();
    let ids: Vec<String> = (0..20).map(|i| format!("n{i:02}")).collect();
    for id in &ids {
        store.add_entity(id, "Thing", "general", Attributes::new()).unwrap();
    }
    for pair in ids.windows(2) {
        store
            .add_relationship(&pair[0], &pair[1], "part_of", "general", 0.9, None)
            .unwrap();
    }
    let config = ReasonerConfig {
        max_inference_depth: 2,
        ..ReasonerConfig::default()
    };
    let result = Reasoner::with_config(store, config)
        .infer_relationships(InferenceScope::WholeGraph)
        .unwrap();
    assert!(result.flags.depth_exceeded);
    assert_eq!(result.rounds, 2);
    assert!(!result.is_empty());
}

#[test]
fn communities_follow_domains() {
    let reasoner = Reasoner::new(demo());
    let communities = reasoner.detect_communities().unwrap();
    assert!(communities.len() >= 2);
    assert!(communities.same_community("stocks", "volatility"));
    assert!(communities.same_community("insulin", "glucose"));
    assert!(!communities.same_community("insulin", "stocks"));
    let again = reasoner.detect_communities().unwrap();
    assert!(Arc::ptr_eq(&communities, &again));
}

#[test]
fn explain_across_domains() {
    let reasoner = Reasoner::new(demo());
    let trace = reasoner.explain_relationship("hypertension", "diversification").unwrap();
    assert!(trace.is_connected());
    let path = trace.path.as_ref().unwrap();
    assert_eq!(path.node_ids(), vec!["hypertension", "risk", "diversification"]);
    let text = trace.to_string();
    assert!(text.starts_with("hypertension"));
    assert!(text.contains("hops: 2"));
}

#[test]
fn similar_and_validated_facts() {
    let reasoner = Reasoner::new(demo());
    let similar = reasoner.find_similar_entities("stocks", 3).unwrap();
    assert_eq!(similar[0].id.as_str(), "bonds");
    assert!((similar[0].score - 1.0).abs() < 1e-12);

    let direct = reasoner.validate_fact("stocks", "has", "volatility").unwrap();
    assert!(direct.is_valid);
    let indirect = reasoner.validate_fact("stocks", "increases", "risk").unwrap();
    assert!(!indirect.is_valid);
    assert!(indirect.supporting_paths > 0);

    let stats = reasoner.statistics().unwrap();
    assert_eq!(stats.total_entities, 16);
    assert_eq!(stats.connected_components, 2);
}

#[test]
fn enhancer_links_query_and_bounds_delta() {
    let store = demo();
    let config = KgConfig::default();
    let reasoner = Arc::new(Reasoner::with_config(Arc::clone(&store), config.reasoner.clone()));
    let enhancer = QueryEnhancer::with_config(Arc::clone(&reasoner), config.enhancer.clone());

    let result = enhancer
        .enhance("Does insulin help control glucose in diabetes?", "medical")
        .unwrap();
    let ids: Vec<&str> = result.linked.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["diabetes", "glucose", "insulin"]);
    assert!(result.linked.iter().all(|l| l.in_domain));
    assert!(result.confidence_delta > 0.0);
    assert!(result.confidence_delta <= config.enhancer.max_delta);
    assert!(result.support.iter().any(|s| s.relationship.predicate == "regulates"));

    let cross = enhancer.enhance("portfolio risk and insulin", "medical").unwrap();
    let last = cross.linked.last().unwrap();
    assert!(!last.in_domain);

    let none = enhancer.enhance("tell me a joke", "medical").unwrap();
    assert!(none.linked.is_empty());
    assert!(none.confidence_delta.abs() < f64::EPSILON);
}

#[test]
fn enhancement_grows_with_support() {
    let store = demo();
    let enhancer = QueryEnhancer::new(Arc::new(Reasoner::new(Arc::clone(&store))));
    let before = enhancer.enhance("aspirin", "medical").unwrap();
    store.add_entity("stroke", "Disease", "medical", Attributes::new()).unwrap();
    store
        .add_relationship("aspirin", "stroke", "prevents", "medical", 0.8, None)
        .unwrap();
    let after = enhancer.enhance("aspirin", "medical").unwrap();
    assert!(after.generation > before.generation);
    assert!(after.support.len() > before.support.len());
    assert!(after.confidence_delta >= before.confidence_delta);
}

#[test]
fn runtime_serves_jobs_with_timeouts() {
    let reasoner = Arc::new(Reasoner::new(demo()));
    let runtime = ReasoningRuntime::start(Arc::clone(&reasoner), &KgConfig::default().runtime).unwrap();

    let handles: Vec<_> = [
        ReasoningJob::Communities,
        ReasoningJob::Centrality(CentralityKind::Betweenness),
        ReasoningJob::Infer(InferenceScope::WholeGraph),
        ReasoningJob::Explain {
            source: "aspirin".into(),
            target: "portfolio".into(),
        },
    ]
    .into_iter()
    .map(|job| runtime.submit(job).unwrap())
    .collect();

    for handle in handles {
        handle.join_timeout(Duration::from_secs(10)).unwrap();
    }
    let scores = reasoner.centrality(CentralityKind::Betweenness).unwrap();
    assert_eq!(scores.ranking.len(), 16);
}
