//! Greedy modularity community detection (Clauset, Newman and Moore).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::ReasonerConfig;
use crate::entity::EntityId;
use crate::reasoner::budget::{Budget, ReasoningFlags};
use crate::reasoner::projection::Projection;

/// A partition of the entities into communities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityResult {
    pub generation: u64,
    /// Members per community id, in insertion order. Ids are assigned by size
    /// descending, then by earliest member.
    pub communities: Vec<Vec<EntityId>>,
    pub assignments: HashMap<EntityId, usize>,
    pub modularity: f64,
    pub merges: usize,
    pub flags: ReasoningFlags,
}

impl CommunityResult {
    #[must_use]
    pub fn community_of(&self, id: &str) -> Option<usize> {
        self.assignments.get(id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.communities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.communities.is_empty()
    }

    #[must_use]
    pub fn same_community(&self, a: &str, b: &str) -> bool {
        matches!((self.community_of(a), self.community_of(b)), (Some(x), Some(y)) if x == y)
    }
}

#[derive(Debug, Clone)]
struct Cluster {
    members: Vec<usize>,
    /// Weight to each adjacent cluster.
    links: BTreeMap<usize, f64>,
    /// Sum of member strengths.
    strength: f64,
    /// Weight of edges inside the cluster.
    internal: f64,
}

pub(crate) fn detect(
    projection: &Projection,
    generation: u64,
    config: &ReasonerConfig,
    budget: &Budget,
) -> CommunityResult {
    let n = projection.len();
    let m = projection.total_weight();
    let mut clusters: Vec<Option<Cluster>> = (0..n)
        .map(|i| {
            Some(Cluster {
                members: vec![i],
                links: projection.adj[i].clone(),
                strength: projection.strength(i),
                internal: 0.0,
            })
        })
        .collect();

    let mut flags = ReasoningFlags::default();
    let mut merges = 0;

    if m > 0.0 {
        loop {
            if budget.expired() {
                flags.timed_out = true;
                break;
            }
            let Some((i, j)) = best_merge(&clusters, m) else {
                break;
            };
            if merges >= config.max_community_merges {
                flags.truncated = true;
                break;
            }
            merge(&mut clusters, i, j);
            merges += 1;
        }
    }

    let modularity = modularity(&clusters, m);
    let mut groups: Vec<Vec<usize>> = clusters
        .into_iter()
        .flatten()
        .map(|mut c| {
            c.members.sort_unstable();
            c.members
        })
        .collect();
    groups.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));

    let mut assignments = HashMap::with_capacity(n);
    let communities: Vec<Vec<EntityId>> = groups
        .iter()
        .enumerate()
        .map(|(cid, members)| {
            members
                .iter()
                .map(|&node| {
                    let id = projection.ids[node].clone();
                    assignments.insert(id.clone(), cid);
                    id
                })
                .collect()
        })
        .collect();

    CommunityResult {
        generation,
        communities,
        assignments,
        modularity,
        merges,
        flags,
    }
}

/// The adjacent pair with the largest positive gain
/// `dQ = w_ij / m - k_i * k_j / (2 m^2)`, ties to the lowest indices.
fn best_merge(clusters: &[Option<Cluster>], m: f64) -> Option<(usize, usize)> {
    let mut best: Option<(f64, usize, usize)> = None;
    for (i, cluster) in clusters.iter().enumerate() {
        let Some(ci) = cluster else { continue };
        for (&j, &w) in ci.links.range(i + 1..) {
            let Some(cj) = &clusters[j] else { continue };
            let gain = w / m - ci.strength * cj.strength / (2.0 * m * m);
            if gain > 1e-12 && best.map_or(true, |(g, _, _)| gain > g + 1e-12) {
                best = Some((gain, i, j));
            }
        }
    }
    best.map(|(_, i, j)| (i, j))
}

/// Folds cluster `j` into cluster `i` (`i < j`).
fn merge(clusters: &mut [Option<Cluster>], i: usize, j: usize) {
    let Some(cj) = clusters[j].take() else { return };
    let between = cj.links.get(&i).copied().unwrap_or(0.0);

    for (&k, &w) in &cj.links {
        if k == i {
            continue;
        }
        if let Some(ck) = clusters[k].as_mut() {
            ck.links.remove(&j);
            *ck.links.entry(i).or_insert(0.0) += w;
        }
    }

    if let Some(ci) = clusters[i].as_mut() {
        ci.links.remove(&j);
        for (k, w) in cj.links {
            if k != i {
                *ci.links.entry(k).or_insert(0.0) += w;
            }
        }
        ci.members.extend(cj.members);
        ci.strength += cj.strength;
        ci.internal += cj.internal + between;
    }
}

/// `Q = sum_c [ L_c / m - (K_c / 2m)^2 ]`.
fn modularity(clusters: &[Option<Cluster>], m: f64) -> f64 {
    if m <= 0.0 {
        return 0.0;
    }
    clusters
        .iter()
        .flatten()
        .map(|c| c.internal / m - (c.strength / (2.0 * m)).powi(2))
        .sum()
}
