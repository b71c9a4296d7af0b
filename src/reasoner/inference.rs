//! Fixed-point rule inference.
//!
//! Each run starts from the asserted triples of one snapshot and rebuilds the
//! derived set from scratch. Rounds are semi-naive: a round only considers
//! premise pairs where at least one premise was new in the previous round.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::confidence::Confidence;
use crate::config::ReasonerConfig;
use crate::domain::Domain;
use crate::entity::EntityId;
use crate::ontology::TripleValidation;
use crate::reasoner::budget::{Budget, ReasoningFlags};
use crate::reasoner::rules::{InferenceRule, COMPOSITIONS};
use crate::relationship::{Relationship, TripleKey};
use crate::store::GraphSnapshot;

/// A derived triple with the rule and premises that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredRelationship {
    pub relationship: Relationship,
    pub rule: InferenceRule,
    /// Premise keys, first premise first.
    pub premises: Vec<TripleKey>,
    /// Round (1-based) in which the triple was first derived.
    pub round: usize,
}

impl InferredRelationship {
    #[must_use]
    pub fn key(&self) -> TripleKey {
        self.relationship.key()
    }
}

/// Output of one inference run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub generation: u64,
    /// Derived triples in canonical key order.
    pub derived: Vec<InferredRelationship>,
    /// Rounds that produced new triples.
    pub rounds: usize,
    pub flags: ReasoningFlags,
}

impl InferenceResult {
    #[must_use]
    pub fn len(&self) -> usize {
        self.derived.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.derived.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &TripleKey) -> Option<&InferredRelationship> {
        self.derived
            .binary_search_by(|d| d.relationship.key().cmp(key))
            .ok()
            .map(|i| &self.derived[i])
    }

    pub fn keys(&self) -> impl Iterator<Item = TripleKey> + '_ {
        self.derived.iter().map(InferredRelationship::key)
    }

    /// The subset whose subject or object is `id`.
    #[must_use]
    pub fn involving(&self, id: &str) -> Self {
        Self {
            generation: self.generation,
            derived: self
                .derived
                .iter()
                .filter(|d| d.relationship.source.as_str() == id || d.relationship.target.as_str() == id)
                .cloned()
                .collect(),
            rounds: self.rounds,
            flags: self.flags,
        }
    }
}

#[derive(Debug, Clone)]
struct Fact {
    confidence: Confidence,
    domain: Domain,
}

type EdgeIndex = HashMap<(String, EntityId), BTreeSet<EntityId>>;

/// Asserted plus derived triples, indexed for premise joins.
#[derive(Debug, Default)]
struct Facts {
    all: HashMap<TripleKey, Fact>,
    /// `(predicate, source)` -> targets
    by_source: EdgeIndex,
    /// `(predicate, target)` -> sources
    by_target: EdgeIndex,
}

impl Facts {
    fn insert(&mut self, key: TripleKey, fact: Fact) {
        self.by_source
            .entry((key.predicate.clone(), key.source.clone()))
            .or_default()
            .insert(key.target.clone());
        self.by_target
            .entry((key.predicate.clone(), key.target.clone()))
            .or_default()
            .insert(key.source.clone());
        self.all.insert(key, fact);
    }

    fn targets(&self, predicate: &str, source: &EntityId) -> Vec<EntityId> {
        lookup(&self.by_source, predicate, source)
    }

    fn sources(&self, predicate: &str, target: &EntityId) -> Vec<EntityId> {
        lookup(&self.by_target, predicate, target)
    }
}

fn lookup(index: &EdgeIndex, predicate: &str, node: &EntityId) -> Vec<EntityId> {
    index
        .get(&(predicate.to_string(), node.clone()))
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
struct Candidate {
    confidence: Confidence,
    domain: Domain,
    rule: InferenceRule,
    premises: Vec<TripleKey>,
}

impl Candidate {
    /// Higher confidence wins; ties go to the earlier rule, then smaller premises.
    fn beats(&self, other: &Self) -> bool {
        match self.confidence.value().total_cmp(&other.confidence.value()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => (self.rule, &self.premises) < (other.rule, &other.premises),
        }
    }
}

struct Round<'a> {
    snapshot: &'a GraphSnapshot,
    facts: &'a Facts,
    candidates: BTreeMap<TripleKey, Candidate>,
}

impl Round<'_> {
    fn propose(&mut self, key: TripleKey, candidate: Candidate) {
        if key.source == key.target || self.facts.all.contains_key(&key) {
            return;
        }
        let (Some(source), Some(target)) = (
            self.snapshot.entity(key.source.as_str()),
            self.snapshot.entity(key.target.as_str()),
        ) else {
            return;
        };
        if let TripleValidation::Rejected { .. } =
            self.snapshot
                .ontology()
                .validate_triple(&source.entity_type, &key.predicate, &target.entity_type)
        {
            return;
        }
        match self.candidates.get(&key) {
            Some(existing) if !candidate.beats(existing) => {}
            _ => {
                self.candidates.insert(key, candidate);
            }
        }
    }

    fn expand(&mut self, key: &TripleKey) {
        let Some(fact) = self.facts.all.get(key).cloned() else {
            return;
        };
        let ontology = self.snapshot.ontology();
        let symmetric = ontology.is_symmetric(&key.predicate);
        let transitive = ontology.is_transitive(&key.predicate);

        if symmetric {
            self.propose(
                TripleKey::new(key.target.clone(), key.predicate.clone(), key.source.clone()),
                Candidate {
                    confidence: fact.confidence,
                    domain: fact.domain.clone(),
                    rule: InferenceRule::SymmetricMirror,
                    premises: vec![key.clone()],
                },
            );
        }

        if transitive {
            let p = &key.predicate;
            for c in self.facts.targets(p, &key.target) {
                let second = TripleKey::new(key.target.clone(), p.clone(), c.clone());
                self.compose(InferenceRule::TransitiveClosure, key, &second, (&key.source, p, &c), None);
            }
            for a in self.facts.sources(p, &key.source) {
                let first = TripleKey::new(a.clone(), p.clone(), key.source.clone());
                self.compose(InferenceRule::TransitiveClosure, &first, key, (&a, p, &key.target), None);
            }
        }

        for comp in &COMPOSITIONS {
            if key.predicate == comp.first {
                let (x, y) = (&key.source, &key.target);
                let matches = if comp.second_reversed {
                    self.facts.sources(comp.second, y)
                } else {
                    self.facts.targets(comp.second, y)
                };
                for z in matches {
                    let second = second_key(comp.second, comp.second_reversed, y, &z);
                    self.compose(comp.rule, key, &second, (x, comp.conclusion, &z), Some(&comp.domain));
                }
            }
            if key.predicate == comp.second {
                let (y, z) = if comp.second_reversed {
                    (&key.target, &key.source)
                } else {
                    (&key.source, &key.target)
                };
                for x in self.facts.sources(comp.first, y) {
                    let first = TripleKey::new(x.clone(), comp.first, y.clone());
                    self.compose(comp.rule, &first, key, (&x, comp.conclusion, z), Some(&comp.domain));
                }
            }
        }
    }

    /// Proposes a two-premise conclusion. `rule_domain` is set for domain
    /// rules, which need a premise in that domain and tag their conclusion
    /// with it; otherwise the conclusion takes the first premise's domain.
    fn compose(
        &mut self,
        rule: InferenceRule,
        first: &TripleKey,
        second: &TripleKey,
        conclusion: (&EntityId, &str, &EntityId),
        rule_domain: Option<&Domain>,
    ) {
        let (Some(f1), Some(f2)) = (self.facts.all.get(first), self.facts.all.get(second)) else {
            return;
        };
        let domain = match rule_domain {
            Some(d) if *d != f1.domain && *d != f2.domain => return,
            Some(d) => d.clone(),
            None => f1.domain.clone(),
        };
        let confidence = f1.confidence.combine(f2.confidence);
        let (s, p, t) = conclusion;
        self.propose(
            TripleKey::new(s.clone(), p, t.clone()),
            Candidate {
                confidence,
                domain,
                rule,
                premises: vec![first.clone(), second.clone()],
            },
        );
    }
}

fn second_key(predicate: &str, reversed: bool, y: &EntityId, z: &EntityId) -> TripleKey {
    if reversed {
        TripleKey::new(z.clone(), predicate, y.clone())
    } else {
        TripleKey::new(y.clone(), predicate, z.clone())
    }
}

/// Runs inference over the whole snapshot.
pub(crate) fn infer(snapshot: &GraphSnapshot, config: &ReasonerConfig, budget: &Budget) -> InferenceResult {
    let mut facts = Facts::default();
    for rel in snapshot.relationships() {
        facts.insert(
            rel.key(),
            Fact {
                confidence: rel.confidence,
                domain: rel.domain.clone(),
            },
        );
    }

    let mut delta: Vec<TripleKey> = facts.all.keys().cloned().collect();
    delta.sort();
    let mut derived: BTreeMap<TripleKey, InferredRelationship> = BTreeMap::new();
    let mut flags = ReasoningFlags::default();
    let mut rounds = 0;

    'rounds: loop {
        let mut round = Round {
            snapshot,
            facts: &facts,
            candidates: BTreeMap::new(),
        };
        for key in &delta {
            if budget.expired() {
                flags.timed_out = true;
                break 'rounds;
            }
            round.expand(key);
        }
        let fresh = round.candidates;
        if fresh.is_empty() {
            break;
        }
        if rounds == config.max_inference_depth {
            flags.depth_exceeded = true;
            break;
        }
        rounds += 1;

        delta = Vec::with_capacity(fresh.len());
        for (key, candidate) in fresh {
            if derived.len() >= config.max_derived {
                flags.truncated = true;
                break;
            }
            facts.insert(
                key.clone(),
                Fact {
                    confidence: candidate.confidence,
                    domain: candidate.domain.clone(),
                },
            );
            derived.insert(
                key.clone(),
                InferredRelationship {
                    relationship: Relationship::inferred(key.clone(), candidate.domain, candidate.confidence),
                    rule: candidate.rule,
                    premises: candidate.premises,
                    round: rounds,
                },
            );
            delta.push(key);
        }
        debug!(round = rounds, derived = delta.len(), total = derived.len(), "Inference round");
        if flags.truncated {
            break;
        }
    }

    InferenceResult {
        generation: snapshot.generation(),
        derived: derived.into_values().collect(),
        rounds,
        flags,
    }
}
