use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, info};

use crate::domain::Domain;
use crate::entity::THING;
use crate::error::{KgError, KgResult, ValidationError};
use crate::ontology::schema::{DomainOntology, OntologyClass, OntologyProperty, PropertyKind, TripleValidation};

/// Registry of domain ontologies plus the class hierarchy they share.
///
/// Class names are global: a class declared in the medical ontology can be the
/// range of a property declared in the financial one. Redeclaring a class in
/// another ontology unions its superclasses.
#[derive(Debug, Clone, Default)]
pub struct OntologyManager {
    ontologies: Vec<DomainOntology>,
    /// class -> direct superclasses, union over every declaration.
    hierarchy: BTreeMap<String, BTreeSet<String>>,
}

impl OntologyManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a namespace for `domain`/`topic` and returns its name.
    /// Re-creating an existing namespace is a no-op.
    pub fn create_domain_ontology(&mut self, domain: Domain, topic: &str) -> String {
        let name = DomainOntology::namespace(&domain, topic);
        if self.ontology(&name).is_none() {
            info!(ontology = %name, "Created domain ontology");
            self.ontologies.push(DomainOntology {
                name: name.clone(),
                domain,
                topic: topic.trim().to_string(),
                classes: Vec::new(),
                properties: Vec::new(),
            });
        }
        name
    }

    /// Declares `name` in `ontology` with the given direct superclasses.
    ///
    /// # Errors
    /// - `UnknownOntology` / `UnknownClass` for undeclared names
    /// - `CyclicHierarchy` if an edge would close a cycle; nothing is changed
    pub fn add_class(&mut self, ontology: &str, name: &str, superclasses: &[&str]) -> KgResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyId.into());
        }
        let idx = self.ontology_index(ontology)?;
        let supers = self.check_superclasses(name, superclasses.iter().map(|s| s.trim()))?;

        let domain = self.ontologies[idx].domain.clone();
        let onto = &mut self.ontologies[idx];
        match onto.classes.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.superclasses.extend(supers.iter().cloned()),
            None => onto.classes.push(OntologyClass {
                name: name.to_string(),
                domain,
                superclasses: supers.clone(),
            }),
        }
        self.hierarchy.entry(name.to_string()).or_default().extend(supers);
        debug!(ontology, class = name, "Added ontology class");
        Ok(())
    }

    /// Validates the superclass list for `name` without changing anything.
    fn check_superclasses<'a>(
        &self,
        name: &str,
        superclasses: impl Iterator<Item = &'a str>,
    ) -> KgResult<BTreeSet<String>> {
        let mut out = BTreeSet::new();
        for sup in superclasses {
            if sup.is_empty() {
                continue;
            }
            if name == THING || sup == name || self.strict_ancestors(sup).contains(name) {
                return Err(KgError::CyclicHierarchy {
                    class: name.to_string(),
                    superclass: sup.to_string(),
                });
            }
            if !self.is_declared_class(sup) {
                return Err(ValidationError::UnknownClass { name: sup.to_string() }.into());
            }
            out.insert(sup.to_string());
        }
        Ok(out)
    }

    /// Declares a property (predicate) in `ontology`. Redeclaring replaces the
    /// previous declaration in that ontology.
    ///
    /// # Errors
    /// `UnknownOntology`, or `UnknownClass` when a domain class (or, for
    /// object properties, a range class) is not declared.
    pub fn add_property(&mut self, ontology: &str, property: OntologyProperty) -> KgResult<()> {
        let idx = self.ontology_index(ontology)?;
        let name = crate::relationship::normalize_predicate(property.name.clone())?;
        let checked_range: &[String] = if property.kind == PropertyKind::Object {
            &property.range_classes
        } else {
            &[]
        };
        for class in property.domain_classes.iter().chain(checked_range) {
            if !self.is_declared_class(class) {
                return Err(ValidationError::UnknownClass { name: class.clone() }.into());
            }
        }

        let property = OntologyProperty { name, ..property };
        let onto = &mut self.ontologies[idx];
        debug!(ontology, property = %property.name, kind = %property.kind, "Added ontology property");
        match onto.properties.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => *existing = property,
            None => onto.properties.push(property),
        }
        Ok(())
    }

    /// Checks whether `(source_type, predicate, target_type)` is allowed.
    ///
    /// Undeclared predicates are allowed. A predicate declared in several
    /// ontologies is accepted when any declaration accepts it.
    #[must_use]
    pub fn validate_triple(&self, source_type: &str, predicate: &str, target_type: &str) -> TripleValidation {
        let mut first_reason = None;
        let mut declared = false;
        for prop in self.declarations(predicate) {
            declared = true;
            if !self.satisfies(source_type, &prop.domain_classes) {
                first_reason.get_or_insert_with(|| {
                    format!(
                        "'{predicate}' requires a subject of type {:?}, got '{source_type}'",
                        prop.domain_classes
                    )
                });
                continue;
            }
            if prop.kind == PropertyKind::Object && !self.satisfies(target_type, &prop.range_classes) {
                first_reason.get_or_insert_with(|| {
                    format!(
                        "'{predicate}' requires an object of type {:?}, got '{target_type}'",
                        prop.range_classes
                    )
                });
                continue;
            }
            return TripleValidation::Accepted;
        }
        match (declared, first_reason) {
            (false, _) => TripleValidation::Undeclared,
            (true, Some(reason)) => TripleValidation::Rejected { reason },
            (true, None) => TripleValidation::Accepted,
        }
    }

    fn satisfies(&self, entity_type: &str, allowed: &[String]) -> bool {
        allowed.is_empty() || allowed.iter().any(|c| self.is_subclass_of(entity_type, c))
    }

    /// Every declaration of `predicate`, in ontology creation order.
    pub fn declarations<'a>(&'a self, predicate: &'a str) -> impl Iterator<Item = &'a OntologyProperty> + 'a {
        self.ontologies.iter().filter_map(move |o| o.property(predicate))
    }

    /// First declaration of `predicate`.
    #[must_use]
    pub fn property(&self, predicate: &str) -> Option<&OntologyProperty> {
        self.ontologies.iter().find_map(|o| o.property(predicate))
    }

    #[must_use]
    pub fn is_declared_predicate(&self, predicate: &str) -> bool {
        self.property(predicate).is_some()
    }

    #[must_use]
    pub fn is_symmetric(&self, predicate: &str) -> bool {
        self.declarations(predicate).any(|p| p.symmetric)
    }

    #[must_use]
    pub fn is_transitive(&self, predicate: &str) -> bool {
        self.declarations(predicate).any(|p| p.transitive)
    }

    #[must_use]
    pub fn is_declared_class(&self, name: &str) -> bool {
        name == THING || self.hierarchy.contains_key(name)
    }

    /// Reflexive, transitive subclass test. Every type is a subclass of `Thing`.
    #[must_use]
    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        class == ancestor || ancestor == THING || self.strict_ancestors(class).contains(ancestor)
    }

    /// All ancestors of `class`, excluding `class` itself and the implicit root.
    #[must_use]
    pub fn ancestors(&self, class: &str) -> BTreeSet<String> {
        let mut out = self.strict_ancestors(class);
        out.remove(THING);
        out
    }

    fn strict_ancestors(&self, class: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([class]);
        while let Some(current) = queue.pop_front() {
            let Some(parents) = self.hierarchy.get(current) else {
                continue;
            };
            for parent in parents {
                if seen.insert(parent.clone()) {
                    queue.push_back(parent);
                }
            }
        }
        seen
    }

    /// The first declaration of `name` across ontologies.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&OntologyClass> {
        self.ontologies.iter().find_map(|o| o.class(name))
    }

    #[must_use]
    pub fn ontology(&self, name: &str) -> Option<&DomainOntology> {
        self.ontologies.iter().find(|o| o.name == name)
    }

    /// Ontologies in creation order.
    #[must_use]
    pub fn ontologies(&self) -> &[DomainOntology] {
        &self.ontologies
    }

    #[must_use]
    pub fn class_count(&self) -> usize {
        self.hierarchy.len()
    }

    fn ontology_index(&self, name: &str) -> KgResult<usize> {
        self.ontologies
            .iter()
            .position(|o| o.name == name)
            .ok_or_else(|| ValidationError::UnknownOntology { name: name.to_string() }.into())
    }

    /// Rebuilds a manager from exported declarations.
    ///
    /// Classes are replayed in dependency order so declarations may appear in
    /// any order; a set that never resolves is a cycle or a dangling reference.
    pub fn from_declarations(declarations: &[DomainOntology]) -> KgResult<Self> {
        let mut manager = Self::new();
        for decl in declarations {
            manager.create_domain_ontology(decl.domain.clone(), &decl.topic);
            if manager.ontologies.last().map(|o| &o.name) != Some(&decl.name) {
                return Err(KgError::malformed(format!(
                    "ontology name '{}' does not match its domain and topic",
                    decl.name
                )));
            }
        }

        let mut pending: Vec<(&str, &OntologyClass)> = declarations
            .iter()
            .flat_map(|d| d.classes.iter().map(move |c| (d.name.as_str(), c)))
            .collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut still_pending = Vec::new();
            for (onto, class) in pending {
                let ready = class.superclasses.iter().all(|s| manager.is_declared_class(s));
                if ready {
                    let supers: Vec<&str> = class.superclasses.iter().map(String::as_str).collect();
                    manager.add_class(onto, &class.name, &supers)?;
                } else {
                    still_pending.push((onto, class));
                }
            }
            if still_pending.len() == before {
                return Err(Self::unresolved_error(&still_pending));
            }
            pending = still_pending;
        }

        for decl in declarations {
            for prop in &decl.properties {
                manager.add_property(&decl.name, prop.clone())?;
            }
        }
        Ok(manager)
    }

    fn unresolved_error(pending: &[(&str, &OntologyClass)]) -> KgError {
        let pending_names: BTreeSet<&str> = pending.iter().map(|(_, c)| c.name.as_str()).collect();
        for (_, class) in pending {
            if let Some(missing) = class
                .superclasses
                .iter()
                .find(|s| s.as_str() != THING && !pending_names.contains(s.as_str()))
            {
                return KgError::malformed(format!(
                    "class '{}' references undeclared superclass '{missing}'",
                    class.name
                ));
            }
        }
        let (_, class) = pending[0];
        KgError::CyclicHierarchy {
            class: class.name.clone(),
            superclass: class.superclasses.iter().next().cloned().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medical() -> (OntologyManager, String) {
        let mut m = OntologyManager::new();
        let onto = m.create_domain_ontology(Domain::Medical, "core");
        m.add_class(&onto, "MedicalConcept", &[]).unwrap();
        m.add_class(&onto, "Disease", &["MedicalConcept"]).unwrap();
        m.add_class(&onto, "Treatment", &["MedicalConcept"]).unwrap();
        m.add_class(&onto, "Medication", &["Treatment"]).unwrap();
        (m, onto)
    }

    #[test]
    fn namespace_is_idempotent() {
        let mut m = OntologyManager::new();
        let a = m.create_domain_ontology(Domain::Medical, "core");
        let b = m.create_domain_ontology(Domain::Medical, "core");
        assert_eq!(a, "medical_core");
        assert_eq!(a, b);
        assert_eq!(m.ontologies().len(), 1);
    }

    #[test]
    fn subclass_is_transitive() {
        let (m, _) = medical();
        assert!(m.is_subclass_of("Medication", "MedicalConcept"));
        assert!(m.is_subclass_of("Medication", "Medication"));
        assert!(m.is_subclass_of("Anything", THING));
        assert!(!m.is_subclass_of("Disease", "Treatment"));
        assert_eq!(
            m.ancestors("Medication").into_iter().collect::<Vec<_>>(),
            vec!["MedicalConcept".to_string(), "Treatment".to_string()]
        );
    }

    #[test]
    fn cycle_is_rejected_without_side_effects() {
        let (mut m, onto) = medical();
        let err = m.add_class(&onto, "MedicalConcept", &["Medication"]).unwrap_err();
        assert!(matches!(err, KgError::CyclicHierarchy { .. }));
        assert!(!m.is_subclass_of("MedicalConcept", "Medication"));

        let err = m.add_class(&onto, "Disease", &["Disease"]).unwrap_err();
        assert!(matches!(err, KgError::CyclicHierarchy { .. }));
    }

    #[test]
    fn unknown_superclass_and_ontology() {
        let (mut m, onto) = medical();
        assert!(m.add_class(&onto, "X", &["Nope"]).unwrap_err().is_validation());
        assert!(m.add_class("missing_onto", "X", &[]).unwrap_err().is_validation());
    }

    #[test]
    fn validate_triple_uses_hierarchy() {
        let (mut m, onto) = medical();
        m.add_property(
            &onto,
            OntologyProperty::object("treats")
                .with_domain(["Treatment"])
                .with_range(["Disease"]),
        )
        .unwrap();

        assert_eq!(m.validate_triple("Medication", "treats", "Disease"), TripleValidation::Accepted);
        assert!(!m.validate_triple("Disease", "treats", "Medication").is_allowed());
        assert_eq!(m.validate_triple("Disease", "undeclared", "Disease"), TripleValidation::Undeclared);
    }

    #[test]
    fn cross_domain_range() {
        let (mut m, med) = medical();
        let fin = m.create_domain_ontology(Domain::Financial, "costs");
        m.add_class(&fin, "FinancialCost", &[]).unwrap();
        m.add_property(
            &med,
            OntologyProperty::object("incurs_cost")
                .with_domain(["Disease"])
                .with_range(["FinancialCost"]),
        )
        .unwrap();
        assert_eq!(
            m.validate_triple("Disease", "incurs_cost", "FinancialCost"),
            TripleValidation::Accepted
        );
    }

    #[test]
    fn algebraic_flags() {
        let (mut m, onto) = medical();
        m.add_property(&onto, OntologyProperty::object("interacts_with").symmetric()).unwrap();
        m.add_property(&onto, OntologyProperty::object("part_of").transitive()).unwrap();
        assert!(m.is_symmetric("interacts_with"));
        assert!(!m.is_transitive("interacts_with"));
        assert!(m.is_transitive("part_of"));
        assert!(!m.is_symmetric("undeclared"));
    }

    #[test]
    fn property_lookup_returns_first_declaration() {
        let (mut m, med) = medical();
        let fin = m.create_domain_ontology(Domain::Financial, "costs");
        m.add_property(&med, OntologyProperty::object("linked_to")).unwrap();
        m.add_property(&fin, OntologyProperty::object("linked_to").symmetric()).unwrap();
        let found = {
            let predicate = String::from("linked_to");
            m.property(&predicate)
        };
        assert!(!found.unwrap().symmetric);
        assert!(m.is_symmetric("linked_to"));
        assert!(m.property("unlinked").is_none());
    }

    #[test]
    fn property_requires_declared_classes() {
        let (mut m, onto) = medical();
        let err = m
            .add_property(&onto, OntologyProperty::object("p").with_range(["Ghost"]))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn declarations_replay_out_of_order() {
        let (m, _) = medical();
        let mut decls = m.ontologies().to_vec();
        decls[0].classes.reverse();
        let rebuilt = OntologyManager::from_declarations(&decls).unwrap();
        assert!(rebuilt.is_subclass_of("Medication", "MedicalConcept"));
    }

    #[test]
    fn declarations_with_cycle_fail() {
        let (m, _) = medical();
        let mut decls = m.ontologies().to_vec();
        decls[0].classes[0].superclasses.insert("Medication".to_string());
        let err = OntologyManager::from_declarations(&decls).unwrap_err();
        assert!(matches!(err, KgError::CyclicHierarchy { .. }));
    }
}
