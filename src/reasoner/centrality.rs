//! Degree, betweenness and eigenvector centrality over the undirected projection.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ReasonerConfig;
use crate::entity::EntityId;
use crate::reasoner::budget::{Budget, ReasoningFlags};
use crate::reasoner::projection::Projection;

/// Supported centrality measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralityKind {
    Degree,
    Betweenness,
    Eigenvector,
}

impl fmt::Display for CentralityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Degree => write!(f, "degree"),
            Self::Betweenness => write!(f, "betweenness"),
            Self::Eigenvector => write!(f, "eigenvector"),
        }
    }
}

/// Scores for every entity of one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralityScores {
    pub kind: CentralityKind,
    pub generation: u64,
    /// `(id, score)` in insertion order.
    pub scores: Vec<(EntityId, f64)>,
    /// Ids by descending score, ties by id.
    pub ranking: Vec<EntityId>,
    /// False if eigenvector iteration hit its cap. Always true otherwise.
    pub converged: bool,
    pub flags: ReasoningFlags,
}

impl CentralityScores {
    fn new(kind: CentralityKind, generation: u64, ids: &[EntityId], values: Vec<f64>) -> Self {
        let scores: Vec<(EntityId, f64)> = ids.iter().cloned().zip(values).collect();
        let mut order: Vec<&(EntityId, f64)> = scores.iter().collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let ranking = order.into_iter().map(|(id, _)| id.clone()).collect();
        Self {
            kind,
            generation,
            scores,
            ranking,
            converged: true,
            flags: ReasoningFlags::default(),
        }
    }

    #[must_use]
    pub fn score(&self, id: &str) -> Option<f64> {
        self.scores.iter().find(|(e, _)| e.as_str() == id).map(|(_, s)| *s)
    }

    /// 1-based rank of `id`.
    #[must_use]
    pub fn rank(&self, id: &str) -> Option<usize> {
        self.ranking.iter().position(|e| e.as_str() == id).map(|p| p + 1)
    }

    /// The `k` highest-scoring entities.
    #[must_use]
    pub fn top(&self, k: usize) -> Vec<(&EntityId, f64)> {
        self.ranking
            .iter()
            .take(k)
            .filter_map(|id| self.score(id.as_str()).map(|s| (id, s)))
            .collect()
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn compute(
    kind: CentralityKind,
    projection: &Projection,
    generation: u64,
    config: &ReasonerConfig,
    budget: &Budget,
) -> CentralityScores {
    match kind {
        CentralityKind::Degree => {
            let n = projection.len();
            let norm = if n > 1 { 1.0 / (n - 1) as f64 } else { 0.0 };
            let values = (0..n).map(|i| projection.degree(i) as f64 * norm).collect();
            CentralityScores::new(kind, generation, &projection.ids, values)
        }
        CentralityKind::Betweenness => {
            let (values, timed_out) = betweenness(projection, budget);
            let mut scores = CentralityScores::new(kind, generation, &projection.ids, values);
            scores.flags.timed_out = timed_out;
            scores
        }
        CentralityKind::Eigenvector => {
            let (values, converged, timed_out) = eigenvector(projection, config, budget);
            let mut scores = CentralityScores::new(kind, generation, &projection.ids, values);
            scores.converged = converged;
            scores.flags.timed_out = timed_out;
            scores
        }
    }
}

/// Brandes' algorithm, unweighted, normalised by `2 / ((n-1)(n-2))`.
#[allow(clippy::cast_precision_loss)]
fn betweenness(projection: &Projection, budget: &Budget) -> (Vec<f64>, bool) {
    let n = projection.len();
    let mut cb = vec![0.0; n];
    let mut timed_out = false;

    for s in 0..n {
        if budget.expired() {
            timed_out = true;
            break;
        }
        let mut stack = Vec::with_capacity(n);
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0_f64; n];
        let mut dist: Vec<Option<usize>> = vec![None; n];
        sigma[s] = 1.0;
        dist[s] = Some(0);
        let mut queue = VecDeque::from([s]);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            let dv = dist[v].unwrap_or(0);
            for &w in projection.adj[v].keys() {
                if dist[w].is_none() {
                    dist[w] = Some(dv + 1);
                    queue.push_back(w);
                }
                if dist[w] == Some(dv + 1) {
                    sigma[w] += sigma[v];
                    preds[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0_f64; n];
        while let Some(w) = stack.pop() {
            for &v in &preds[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                cb[w] += delta[w];
            }
        }
    }

    // Each unordered pair was counted from both ends.
    if n > 2 {
        let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
        for v in &mut cb {
            *v *= scale;
        }
    } else {
        cb.iter_mut().for_each(|v| *v = 0.0);
    }
    (cb, timed_out)
}

/// Power iteration on `A + I`, L2-normalised.
#[allow(clippy::cast_precision_loss)]
fn eigenvector(projection: &Projection, config: &ReasonerConfig, budget: &Budget) -> (Vec<f64>, bool, bool) {
    let n = projection.len();
    if n == 0 {
        return (Vec::new(), true, false);
    }
    let mut x = vec![1.0 / n as f64; n];
    let tolerance = n as f64 * config.eigenvector_tolerance;

    for _ in 0..config.eigenvector_max_iterations {
        if budget.expired() {
            return (x, false, true);
        }
        let mut next = x.clone();
        for (v, neighbours) in projection.adj.iter().enumerate() {
            for (&u, &w) in neighbours {
                next[v] += w * x[u];
            }
        }
        let norm = next.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            next.iter_mut().for_each(|v| *v /= norm);
        }
        let change: f64 = next.iter().zip(&x).map(|(a, b)| (a - b).abs()).sum();
        x = next;
        if change < tolerance {
            return (x, true, false);
        }
    }
    (x, false, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GraphStore;
    use crate::value::Attributes;

    fn star() -> Projection {
        let store = GraphStore::new();
        for id in ["hub", "leaf_a", "leaf_b"] {
            store.add_entity(id, "Thing", "general", Attributes::new()).unwrap();
        }
        store.add_relationship("hub", "leaf_a", "links", "general", 1.0, None).unwrap();
        store.add_relationship("hub", "leaf_b", "links", "general", 1.0, None).unwrap();
        Projection::build(&store.snapshot().unwrap())
    }

    fn run(kind: CentralityKind, p: &Projection) -> CentralityScores {
        compute(kind, p, 0, &ReasonerConfig::default(), &Budget::unlimited())
    }

    #[test]
    fn star_degree() {
        let scores = run(CentralityKind::Degree, &star());
        let hub = scores.score("hub").unwrap();
        let leaf = scores.score("leaf_a").unwrap();
        assert!((hub - 1.0).abs() < 1e-12);
        assert!((hub - 2.0 * leaf).abs() < 1e-12);
        assert_eq!(scores.rank("hub"), Some(1));
        assert_eq!(scores.rank("leaf_a"), Some(2));
        assert_eq!(scores.rank("leaf_b"), Some(3));
    }

    #[test]
    fn star_betweenness() {
        let scores = run(CentralityKind::Betweenness, &star());
        assert!((scores.score("hub").unwrap() - 1.0).abs() < 1e-12);
        assert!(scores.score("leaf_a").unwrap().abs() < 1e-12);
    }

    #[test]
    fn star_eigenvector() {
        let scores = run(CentralityKind::Eigenvector, &star());
        assert!(scores.converged);
        let hub = scores.score("hub").unwrap();
        let leaf = scores.score("leaf_b").unwrap();
        assert!(hub > leaf);
        let norm: f64 = scores.scores.iter().map(|(_, s)| s * s).sum();
        assert!((norm - 1.0).abs() < 1e-9);
        assert_eq!(scores.top(1)[0].0.as_str(), "hub");
    }

    #[test]
    fn empty_and_single_node() {
        let empty = Projection::default();
        assert!(run(CentralityKind::Eigenvector, &empty).scores.is_empty());

        let store = GraphStore::new();
        store.add_entity("solo", "Thing", "general", Attributes::new()).unwrap();
        let p = Projection::build(&store.snapshot().unwrap());
        assert_eq!(run(CentralityKind::Degree, &p).score("solo"), Some(0.0));
        assert_eq!(run(CentralityKind::Betweenness, &p).score("solo"), Some(0.0));
    }
}
