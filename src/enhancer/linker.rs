//! Matching free-text tokens against entity labels and aliases.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::EnhancerConfig;
use crate::domain::Domain;
use crate::entity::Entity;
use crate::error::KgResult;
use crate::store::{cached_regex, GraphSnapshot};

const TOKEN_PATTERN: &str = r"\w+";

const EXACT_SCORE: f64 = 1.0;
const ALIAS_SCORE: f64 = 0.9;
const FUZZY_SCORE: f64 = 0.6;

/// How an entity was recognised in the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The label (or id) appears as a contiguous token run.
    Exact,
    Alias,
    /// A query token and a one-word name share a prefix.
    Fuzzy,
}

impl MatchKind {
    const fn score(self) -> f64 {
        match self {
            Self::Exact => EXACT_SCORE,
            Self::Alias => ALIAS_SCORE,
            Self::Fuzzy => FUZZY_SCORE,
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Alias => write!(f, "alias"),
            Self::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

/// A candidate link before reasoning is consulted.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate<'a> {
    pub(crate) entity: &'a Entity,
    pub(crate) kind: MatchKind,
    pub(crate) score: f64,
    pub(crate) in_domain: bool,
}

impl Candidate<'_> {
    /// In-domain first, then score, then id.
    fn priority(&self, other: &Self) -> Ordering {
        other
            .in_domain
            .cmp(&self.in_domain)
            .then_with(|| other.score.total_cmp(&self.score))
            .then_with(|| self.entity.id.cmp(&other.entity.id))
    }
}

/// Lowercased `\w+` runs of `text`.
pub(crate) fn tokenize(text: &str) -> KgResult<Vec<String>> {
    let re = cached_regex(TOKEN_PATTERN)?;
    Ok(re.find_iter(text).map(|m| m.as_str().to_lowercase()).collect())
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

fn prefix_match(token: &str, name: &str, min_len: usize) -> bool {
    let (t, n) = (token.chars().count(), name.chars().count());
    t >= min_len && n >= min_len && token != name && (token.starts_with(name) || name.starts_with(token))
}

fn best_match(entity: &Entity, tokens: &[String], config: &EnhancerConfig) -> KgResult<Option<MatchKind>> {
    let mut names: Vec<(Vec<String>, MatchKind)> = vec![
        (tokenize(&entity.label())?, MatchKind::Exact),
        (tokenize(entity.id.as_str())?, MatchKind::Exact),
    ];
    for alias in entity.aliases() {
        names.push((tokenize(alias)?, MatchKind::Alias));
    }

    let mut best: Option<MatchKind> = None;
    for (name, kind) in &names {
        let found = if contains_run(tokens, name) {
            Some(*kind)
        } else if name.len() == 1
            && tokens
                .iter()
                .any(|t| prefix_match(t, &name[0], config.min_fuzzy_len))
        {
            Some(MatchKind::Fuzzy)
        } else {
            None
        };
        best = match (best, found) {
            (Some(b), Some(f)) => Some(b.min(f)),
            (b, f) => b.or(f),
        };
    }
    Ok(best)
}

/// Entities mentioned by `tokens`, best first, at most `max_linked_entities`.
pub(crate) fn link<'a>(
    snapshot: &'a GraphSnapshot,
    tokens: &[String],
    domain: &Domain,
    config: &EnhancerConfig,
) -> KgResult<Vec<Candidate<'a>>> {
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    let mut candidates = Vec::new();
    for entity in snapshot.entities() {
        let Some(kind) = best_match(entity, tokens, config)? else {
            continue;
        };
        let in_domain = entity.domain.serves(domain);
        let weight = if in_domain { 1.0 } else { config.cross_domain_weight };
        candidates.push(Candidate {
            entity,
            kind,
            score: kind.score() * weight,
            in_domain,
        });
    }
    candidates.sort_by(Candidate::priority);
    candidates.truncate(config.max_linked_entities);
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GraphStore;
    use crate::value::{attributes, AttributeValue, Attributes};

    fn store() -> GraphStore {
        let store = GraphStore::new();
        store
            .add_entity(
                "diabetes",
                "Disease",
                "medical",
                attributes([(
                    "aliases",
                    AttributeValue::StringList(vec!["diabetes mellitus".into(), "dm".into()]),
                )]),
            )
            .unwrap();
        store.add_entity("blood_sugar", "Biomarker", "medical", Attributes::new()).unwrap();
        store.add_entity("insulin", "Medication", "medical", Attributes::new()).unwrap();
        store.add_entity("risk", "Concept", "financial", Attributes::new()).unwrap();
        store
    }

    #[test]
    fn tokens_are_lowercased_word_runs() {
        assert_eq!(
            tokenize("Does Insulin lower blood-sugar?").unwrap(),
            vec!["does", "insulin", "lower", "blood", "sugar"]
        );
    }

    #[test]
    fn match_kinds() {
        let store = store();
        let snap = store.snapshot().unwrap();
        let config = EnhancerConfig::default();
        let tokens = tokenize("DM patients with high blood sugar and insulins").unwrap();
        let linked = link(&snap, &tokens, &Domain::Medical, &config).unwrap();
        let found: Vec<(&str, MatchKind)> = linked.iter().map(|c| (c.entity.id.as_str(), c.kind)).collect();
        assert_eq!(
            found,
            vec![
                ("blood_sugar", MatchKind::Exact),
                ("diabetes", MatchKind::Alias),
                ("insulin", MatchKind::Fuzzy),
            ]
        );
    }

    #[test]
    fn cross_domain_ranks_last() {
        let store = store();
        let snap = store.snapshot().unwrap();
        let config = EnhancerConfig::default();
        let tokens = tokenize("risk of insulin").unwrap();
        let linked = link(&snap, &tokens, &Domain::Medical, &config).unwrap();
        let ids: Vec<&str> = linked.iter().map(|c| c.entity.id.as_str()).collect();
        assert_eq!(ids, vec!["insulin", "risk"]);
        assert!(!linked[1].in_domain);
        assert!((linked[1].score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn short_tokens_never_fuzzy_match() {
        let store = store();
        let snap = store.snapshot().unwrap();
        let tokens = tokenize("ins").unwrap();
        assert!(link(&snap, &tokens, &Domain::Medical, &EnhancerConfig::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn link_count_is_capped() {
        let store = store();
        let snap = store.snapshot().unwrap();
        let config = EnhancerConfig {
            max_linked_entities: 1,
            ..EnhancerConfig::default()
        };
        let tokens = tokenize("insulin and diabetes").unwrap();
        assert_eq!(link(&snap, &tokens, &Domain::Medical, &config).unwrap().len(), 1);
    }
}
