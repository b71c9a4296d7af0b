//! Shortest-path enumeration and reasoning traces.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::confidence::Confidence;
use crate::entity::EntityId;
use crate::reasoner::budget::{Budget, ReasoningFlags};
use crate::relationship::{Provenance, Relationship};
use crate::store::Step;

/// One edge of a path, with the direction it was walked in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEdge {
    pub relationship: Relationship,
    /// True if walked from the relationship's source to its target.
    pub forward: bool,
}

/// A walk between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    pub nodes: Vec<EntityId>,
    pub edges: Vec<PathEdge>,
    /// Sum of traversal weights.
    pub total_weight: f64,
    /// Product of edge confidences.
    pub confidence: Confidence,
}

impl GraphPath {
    #[must_use]
    pub fn hops(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(EntityId::as_str).collect()
    }

    fn from_steps(source: &EntityId, steps: &[Step<'_>]) -> Self {
        let mut nodes = Vec::with_capacity(steps.len() + 1);
        nodes.push(source.clone());
        nodes.extend(steps.iter().map(|s| s.neighbor.clone()));
        Self {
            nodes,
            edges: steps
                .iter()
                .map(|s| PathEdge {
                    relationship: s.relationship.clone(),
                    forward: s.forward,
                })
                .collect(),
            total_weight: steps.iter().map(|s| s.relationship.traversal_weight()).sum(),
            confidence: Confidence::product(steps.iter().map(|s| s.relationship.confidence)),
        }
    }

    /// Path ordering: weight ascending, then node sequence, then predicates.
    pub(crate) fn cmp_by_weight(&self, other: &Self) -> Ordering {
        self.total_weight
            .total_cmp(&other.total_weight)
            .then_with(|| self.cmp_lexical(other))
    }

    /// Trace ordering: confidence descending, then node sequence, then predicates.
    pub(crate) fn cmp_by_confidence(&self, other: &Self) -> Ordering {
        other
            .confidence
            .value()
            .total_cmp(&self.confidence.value())
            .then_with(|| self.cmp_lexical(other))
    }

    fn cmp_lexical(&self, other: &Self) -> Ordering {
        self.nodes.cmp(&other.nodes).then_with(|| {
            let preds = |p: &Self| p.edges.iter().map(|e| (e.relationship.predicate.clone(), !e.forward)).collect::<Vec<_>>();
            preds(self).cmp(&preds(other))
        })
    }
}

impl fmt::Display for GraphPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(first) = self.nodes.first() else {
            return Ok(());
        };
        write!(f, "{first}")?;
        for (edge, node) in self.edges.iter().zip(self.nodes.iter().skip(1)) {
            let r = &edge.relationship;
            if edge.forward {
                write!(f, " --{} ({}, {})--> {node}", r.predicate, r.provenance, r.confidence)?;
            } else {
                write!(f, " <--{} ({}, {})-- {node}", r.predicate, r.provenance, r.confidence)?;
            }
        }
        Ok(())
    }
}

/// Result of [`crate::Reasoner::find_paths`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub generation: u64,
    pub paths: Vec<GraphPath>,
    pub flags: ReasoningFlags,
}

/// Human-readable explanation of how two entities are connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub source: EntityId,
    pub target: EntityId,
    /// Best path over asserted and inferred relationships, if any.
    pub path: Option<GraphPath>,
    pub max_hops: usize,
    pub flags: ReasoningFlags,
}

impl Trace {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.path.is_some()
    }

    /// True if the trace relies on at least one inferred relationship.
    #[must_use]
    pub fn uses_inference(&self) -> bool {
        self.path.as_ref().is_some_and(|p| {
            p.edges
                .iter()
                .any(|e| e.relationship.provenance == Provenance::Inferred)
        })
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(
                f,
                "{path} [hops: {}, confidence: {}]",
                path.hops(),
                path.confidence
            ),
            None => write!(
                f,
                "no relationship found between {} and {} within {} hops",
                self.source, self.target, self.max_hops
            ),
        }
    }
}

/// All shortest walks from `source` to `target` of at most `max_len` hops.
///
/// `neighbors` yields the steps leaving a node in a deterministic order.
/// Enumeration stops after `max_paths` walks (`truncated`). Walks are
/// returned unsorted.
pub(crate) fn shortest_paths<'a, F>(
    neighbors: F,
    source: &'a EntityId,
    target: &'a EntityId,
    max_len: usize,
    max_paths: usize,
    budget: &Budget,
) -> (Vec<GraphPath>, ReasoningFlags)
where
    F: Fn(&str) -> Vec<Step<'a>>,
{
    let mut flags = ReasoningFlags::default();
    if source == target {
        return (vec![GraphPath::from_steps(source, &[])], flags);
    }

    let mut dist: HashMap<&'a str, usize> = HashMap::from([(source.as_str(), 0)]);
    let mut preds: HashMap<&'a str, Vec<(&'a EntityId, Step<'a>)>> = HashMap::new();
    let mut frontier: Vec<&'a EntityId> = vec![source];

    for depth in 0..max_len {
        if frontier.is_empty() || dist.contains_key(target.as_str()) {
            break;
        }
        let mut next = Vec::new();
        for &node in &frontier {
            if budget.expired() {
                flags.timed_out = true;
                return (Vec::new(), flags);
            }
            for step in neighbors(node.as_str()) {
                let neighbor = step.neighbor.as_str();
                match dist.get(neighbor) {
                    None => {
                        dist.insert(neighbor, depth + 1);
                        preds.entry(neighbor).or_default().push((node, step));
                        next.push(step.neighbor);
                    }
                    Some(&d) if d == depth + 1 => preds.entry(neighbor).or_default().push((node, step)),
                    Some(_) => {}
                }
            }
        }
        frontier = next;
    }

    let mut out = Vec::new();
    if dist.contains_key(target.as_str()) {
        let mut suffix = Vec::new();
        collect(target, source, &preds, &mut suffix, &mut out, max_paths, &mut flags);
    }
    (out, flags)
}

fn collect<'a>(
    node: &'a EntityId,
    source: &'a EntityId,
    preds: &HashMap<&'a str, Vec<(&'a EntityId, Step<'a>)>>,
    suffix: &mut Vec<Step<'a>>,
    out: &mut Vec<GraphPath>,
    max_paths: usize,
    flags: &mut ReasoningFlags,
) {
    if node == source {
        let steps: Vec<Step<'a>> = suffix.iter().rev().copied().collect();
        out.push(GraphPath::from_steps(source, &steps));
        return;
    }
    let Some(incoming) = preds.get(node.as_str()) else {
        return;
    };
    for (prev, step) in incoming {
        if out.len() >= max_paths {
            flags.truncated = true;
            return;
        }
        suffix.push(*step);
        collect(*prev, source, preds, suffix, out, max_paths, flags);
        suffix.pop();
    }
}
