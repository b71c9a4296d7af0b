//! # fair-kg - Knowledge-graph reasoning core
//!
//! A typed, in-memory knowledge graph for domain agents. It stores entities
//! and confidence-weighted relationships, checks them against per-domain
//! ontologies, and reasons over immutable snapshots of the graph.
//!
//! ## Core Concepts
//!
//! - **GraphStore**: the single authoritative store. One writer at a time,
//!   any number of readers, every change bumps a generation number.
//! - **OntologyManager**: class hierarchies and property declarations that
//!   constrain which triples may be asserted.
//! - **Reasoner**: path finding, rule-based inference, communities and
//!   centrality, cached per generation.
//! - **QueryEnhancer**: links free text to entities and turns the evidence
//!   around them into a bounded confidence adjustment.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use fair_kg::{Attributes, GraphStore, Reasoner};
//!
//! let store = Arc::new(GraphStore::new());
//! store.add_entity("diabetes", "Disease", "medical", Attributes::new())?;
//! store.add_entity("insulin", "Treatment", "medical", Attributes::new())?;
//! store.add_entity("kidney", "Organ", "medical", Attributes::new())?;
//! store.add_relationship("diabetes", "insulin", "treats", "medical", 0.9, None)?;
//! store.add_relationship("diabetes", "kidney", "damages", "medical", 0.7, None)?;
//!
//! let reasoner = Reasoner::new(Arc::clone(&store));
//! let result = reasoner.find_paths("insulin", "kidney", 3)?;
//! assert_eq!(result.paths[0].node_ids(), ["insulin", "diabetes", "kidney"]);
//! # Ok::<(), fair_kg::KgError>(())
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod confidence;
pub mod domain;
pub mod entity;
pub mod error;
pub mod relationship;
pub mod value;

// Configuration
pub mod config;

// Store, schema and reasoning
pub mod enhancer;
pub mod ontology;
pub mod reasoner;
pub mod store;

// Persistence and execution
pub mod persist;
pub mod runtime;
pub mod seed;

// Re-export primary types at crate root for convenience
pub use config::{EnhancerConfig, GraphConfig, KgConfig, ReasonerConfig, RuntimeConfig};
pub use confidence::Confidence;
pub use domain::Domain;
pub use entity::{Entity, EntityId};
pub use error::{KgError, KgResult, ValidationError};
pub use relationship::{Provenance, Relationship, TripleKey};
pub use value::{attributes, AttributeValue, Attributes};

pub use enhancer::{EnhancementResult, LinkedEntity, MatchKind, QueryEnhancer, SupportingRelationship};
pub use ontology::{DomainOntology, OntologyClass, OntologyManager, OntologyProperty, PropertyKind, TripleValidation};
pub use reasoner::{
    CentralityKind, CentralityScores, CommunityResult, FactValidation, GraphPath, InferenceResult, InferenceRule,
    InferenceScope, InferredRelationship, PathResult, Reasoner, ReasoningFlags, ReasoningStatistics, SimilarEntity,
    Trace,
};
pub use store::{
    AttributePredicate, Direction, EntityFilter, EntityQuery, GraphSnapshot, GraphStatistics, GraphStore, Mutation,
    RelatedEntities, RelatedEntity,
};

pub use persist::{Archive, Snapshot};
pub use runtime::{ExecutionHandle, ReasoningJob, ReasoningOutput, ReasoningRuntime};
