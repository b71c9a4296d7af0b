use std::collections::{BTreeMap, HashMap};

use crate::entity::EntityId;
use crate::store::GraphSnapshot;

/// Undirected, weighted view of a snapshot used by the graph analytics.
///
/// Nodes are indexed in entity insertion order. Parallel and opposite edges
/// collapse into one undirected edge weighted by the highest confidence among
/// them. Self-loops are dropped.
#[derive(Debug, Clone, Default)]
pub(crate) struct Projection {
    pub(crate) ids: Vec<EntityId>,
    pub(crate) index: HashMap<EntityId, usize>,
    pub(crate) adj: Vec<BTreeMap<usize, f64>>,
}

impl Projection {
    pub(crate) fn build(snapshot: &GraphSnapshot) -> Self {
        let ids: Vec<EntityId> = snapshot.entities().map(|e| e.id.clone()).collect();
        let index: HashMap<EntityId, usize> = ids.iter().cloned().enumerate().map(|(i, id)| (id, i)).collect();
        let mut adj = vec![BTreeMap::new(); ids.len()];

        for rel in snapshot.relationships() {
            let (Some(&a), Some(&b)) = (index.get(rel.source.as_str()), index.get(rel.target.as_str())) else {
                continue;
            };
            if a == b {
                continue;
            }
            let w = rel.confidence.value();
            for (x, y) in [(a, b), (b, a)] {
                let slot: &mut f64 = adj[x].entry(y).or_insert(0.0);
                if w > *slot {
                    *slot = w;
                }
            }
        }
        Self { ids, index, adj }
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn degree(&self, node: usize) -> usize {
        self.adj[node].len()
    }

    /// Sum of incident edge weights.
    pub(crate) fn strength(&self, node: usize) -> f64 {
        self.adj[node].values().sum()
    }

    /// Total undirected edge weight.
    pub(crate) fn total_weight(&self) -> f64 {
        self.adj.iter().map(|n| n.values().sum::<f64>()).sum::<f64>() / 2.0
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.adj.iter().map(BTreeMap::len).sum::<usize>() / 2
    }

    /// Connected components, each listed in insertion order.
    pub(crate) fn components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.len()];
        let mut out = Vec::new();
        for start in 0..self.len() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut stack = vec![start];
            let mut members = Vec::new();
            while let Some(node) = stack.pop() {
                members.push(node);
                for &next in self.adj[node].keys() {
                    if !seen[next] {
                        seen[next] = true;
                        stack.push(next);
                    }
                }
            }
            members.sort_unstable();
            out.push(members);
        }
        out
    }
}
