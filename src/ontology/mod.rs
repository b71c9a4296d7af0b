//! Ontology layer: per-domain class and property declarations.
//!
//! The [`OntologyManager`] is owned by the graph store and consulted on every
//! relationship write. Predicates it does not declare are allowed but never
//! take part in ontology-driven inference.

mod manager;
mod schema;

pub use manager::OntologyManager;
pub use schema::{DomainOntology, OntologyClass, OntologyProperty, PropertyKind, TripleValidation};
