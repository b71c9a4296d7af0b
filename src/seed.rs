//! Demo concepts for the medical and financial domains.
//!
//! Each seeder is an ordinary sequence of upserts, so running one twice
//! leaves the store unchanged.

use crate::domain::Domain;
use crate::error::KgResult;
use crate::store::GraphStore;
use crate::value::{attributes, AttributeValue};

type Concept = (&'static str, &'static str, &'static str);
type Link = (&'static str, &'static str, &'static str, f64);

const MEDICAL_CONCEPTS: [Concept; 6] = [
    ("diabetes", "Disease", "Chronic metabolic disorder"),
    ("insulin", "Medication", "Hormone for blood sugar control"),
    ("glucose", "Biomarker", "Blood sugar measurement"),
    ("hypertension", "Disease", "High blood pressure"),
    ("aspirin", "Medication", "Pain reliever and anti-inflammatory"),
    ("cardiovascular", "System", "Heart and blood vessel system"),
];

const MEDICAL_LINKS: [Link; 5] = [
    ("diabetes", "insulin", "treats", 0.9),
    ("diabetes", "glucose", "affects", 0.85),
    ("hypertension", "cardiovascular", "affects", 0.8),
    ("aspirin", "cardiovascular", "protects", 0.7),
    ("insulin", "glucose", "regulates", 0.9),
];

const FINANCIAL_CONCEPTS: [Concept; 8] = [
    ("diversification", "Strategy", "Spreading investments to reduce risk"),
    ("portfolio", "Investment", "Collection of investment assets"),
    ("risk", "Concept", "Potential for loss or gain"),
    ("return", "Concept", "Financial gain from investment"),
    ("volatility", "Measure", "Rate of price change"),
    ("bonds", "Asset", "Fixed income securities"),
    ("stocks", "Asset", "Equity securities"),
    ("etf", "Asset", "Exchange-traded funds"),
];

const FINANCIAL_LINKS: [Link; 7] = [
    ("diversification", "risk", "reduces", 0.85),
    ("portfolio", "diversification", "uses", 0.8),
    ("volatility", "risk", "increases", 0.8),
    ("stocks", "volatility", "has", 0.75),
    ("bonds", "volatility", "has", 0.4),
    ("etf", "diversification", "enables", 0.8),
    ("return", "risk", "correlates_with", 0.6),
];

const CROSS_DOMAIN_CONCEPTS: [Concept; 2] = [
    ("healthcare", "Sector", "Health services and products"),
    ("investment", "Concept", "Allocation of capital for return"),
];

const CROSS_DOMAIN_LINKS: [Link; 4] = [
    ("diabetes", "portfolio", "affects_financially", 0.5),
    ("hypertension", "risk", "increases", 0.5),
    ("cardiovascular", "return", "impacts", 0.4),
    ("healthcare", "investment", "requires", 0.6),
];

fn concepts(store: &GraphStore, domain: &Domain, items: &[Concept]) -> KgResult<()> {
    for &(id, entity_type, description) in items {
        store.add_entity(
            id,
            entity_type,
            domain.clone(),
            attributes([("description", AttributeValue::from(description))]),
        )?;
    }
    Ok(())
}

fn links(store: &GraphStore, domain: &Domain, items: &[Link]) -> KgResult<()> {
    for &(source, target, predicate, confidence) in items {
        store.add_relationship(source, target, predicate, domain.clone(), confidence, None)?;
    }
    Ok(())
}

/// Diseases, medications and biomarkers.
pub fn medical(store: &GraphStore) -> KgResult<()> {
    concepts(store, &Domain::Medical, &MEDICAL_CONCEPTS)?;
    links(store, &Domain::Medical, &MEDICAL_LINKS)
}

/// Assets, strategies and risk measures.
pub fn financial(store: &GraphStore) -> KgResult<()> {
    concepts(store, &Domain::Financial, &FINANCIAL_CONCEPTS)?;
    links(store, &Domain::Financial, &FINANCIAL_LINKS)
}

/// Links between the two domains. Seeds both domains first.
pub fn cross_domain(store: &GraphStore) -> KgResult<()> {
    medical(store)?;
    financial(store)?;
    concepts(store, &Domain::General, &CROSS_DOMAIN_CONCEPTS)?;
    links(store, &Domain::General, &CROSS_DOMAIN_LINKS)
}
