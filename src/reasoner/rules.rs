//! The fixed table of production rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::Domain;

/// A production rule. Variant order is the tie-break order between rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceRule {
    /// `(a p b)`, `p` symmetric ⇒ `(b p a)`.
    SymmetricMirror,
    /// `(a p b)`, `(b p c)`, `p` transitive ⇒ `(a p c)`.
    TransitiveClosure,
    /// `(x treats y)`, `(y causes z)` ⇒ `(x treats z)`.
    TreatsTransitivity,
    /// `(x treats y)`, `(z causes y)` ⇒ `(x counteracts z)`.
    CauseCounteraction,
    /// `(x has_symptom y)`, `(y indicates z)` ⇒ `(x may_have z)`.
    SymptomIndication,
    /// `(x invests_in y)`, `(y has_risk z)` ⇒ `(x exposed_to z)`.
    RiskTransmission,
}

impl InferenceRule {
    /// Every rule, in table order.
    pub const ALL: [Self; 6] = [
        Self::SymmetricMirror,
        Self::TransitiveClosure,
        Self::TreatsTransitivity,
        Self::CauseCounteraction,
        Self::SymptomIndication,
        Self::RiskTransmission,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SymmetricMirror => "symmetric_mirror",
            Self::TransitiveClosure => "transitive_closure",
            Self::TreatsTransitivity => "treats_transitivity",
            Self::CauseCounteraction => "cause_counteraction",
            Self::SymptomIndication => "symptom_indication",
            Self::RiskTransmission => "risk_transmission",
        }
    }

    /// The composition this rule applies, if it is a domain rule.
    #[must_use]
    pub fn composition(self) -> Option<&'static Composition> {
        COMPOSITIONS.iter().find(|c| c.rule == self)
    }
}

impl fmt::Display for InferenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A domain-specific two-premise composition.
///
/// The first premise is `(x first y)`. The second premise is `(y second z)`,
/// or `(z second y)` when `second_reversed` is set. The conclusion is
/// `(x conclusion z)` tagged with `domain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub rule: InferenceRule,
    pub first: &'static str,
    pub second: &'static str,
    pub second_reversed: bool,
    pub conclusion: &'static str,
    pub domain: Domain,
}

impl Composition {
    /// Fires only when at least one premise carries the rule's domain.
    #[must_use]
    pub fn applies(&self, first_domain: &Domain, second_domain: &Domain) -> bool {
        *first_domain == self.domain || *second_domain == self.domain
    }
}

pub(crate) static COMPOSITIONS: [Composition; 4] = [
    Composition {
        rule: InferenceRule::TreatsTransitivity,
        first: "treats",
        second: "causes",
        second_reversed: false,
        conclusion: "treats",
        domain: Domain::Medical,
    },
    Composition {
        rule: InferenceRule::CauseCounteraction,
        first: "treats",
        second: "causes",
        second_reversed: true,
        conclusion: "counteracts",
        domain: Domain::Medical,
    },
    Composition {
        rule: InferenceRule::SymptomIndication,
        first: "has_symptom",
        second: "indicates",
        second_reversed: false,
        conclusion: "may_have",
        domain: Domain::Medical,
    },
    Composition {
        rule: InferenceRule::RiskTransmission,
        first: "invests_in",
        second: "has_risk",
        second_reversed: false,
        conclusion: "exposed_to",
        domain: Domain::Financial,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_and_names() {
        let names: Vec<&str> = InferenceRule::ALL.iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            vec![
                "symmetric_mirror",
                "transitive_closure",
                "treats_transitivity",
                "cause_counteraction",
                "symptom_indication",
                "risk_transmission"
            ]
        );
        assert!(InferenceRule::SymmetricMirror < InferenceRule::RiskTransmission);
    }

    #[test]
    fn compositions_cover_domain_rules() {
        assert!(InferenceRule::SymmetricMirror.composition().is_none());
        let c = InferenceRule::RiskTransmission.composition().unwrap();
        assert_eq!(c.domain, Domain::Financial);
        assert!(c.applies(&Domain::General, &Domain::Financial));
        assert!(!c.applies(&Domain::General, &Domain::Medical));
    }
}
