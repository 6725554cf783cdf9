//! The immutable sync registry.
//!
//! Built once at startup and passed to the engine by value; the engine shares
//! it read-only across requests. Rules are indexed by every `(concept, action)`
//! their when clause references so a scan only touches relevant rules.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::concept::ConceptSet;
use crate::error::{SyncResult, ValidationError};

use super::SyncRule;

type ActionKey = (String, String);

/// Registered syncs, indexed by the actions they react to.
#[derive(Debug, Default)]
pub struct SyncRegistry {
    rules: Vec<Arc<SyncRule>>,
    index: HashMap<ActionKey, Vec<usize>>,
}

impl SyncRegistry {
    #[must_use]
    pub fn builder() -> SyncRegistryBuilder {
        SyncRegistryBuilder::default()
    }

    /// All rules in registration order.
    #[must_use]
    pub fn rules(&self) -> &[Arc<SyncRule>] {
        &self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<SyncRule>> {
        self.rules.iter().find(|r| r.name() == name)
    }

    /// Rules whose when clause references `concept.action`, in registration
    /// order, each at most once.
    #[must_use]
    pub fn rules_for(&self, concept: &str, action: &str) -> Vec<Arc<SyncRule>> {
        self.index
            .get(&(concept.to_string(), action.to_string()))
            .map(|idxs| idxs.iter().map(|&i| Arc::clone(&self.rules[i])).collect())
            .unwrap_or_default()
    }

    /// Checks every concept and action a rule references against `concepts`.
    pub fn validate_against(&self, concepts: &ConceptSet) -> Result<(), ValidationError> {
        for rule in &self.rules {
            let referenced = rule
                .when()
                .iter()
                .map(|p| (&p.concept, &p.action))
                .chain(rule.then().iter().map(|t| (&t.concept, &t.action)));

            for (concept, action) in referenced {
                if !concepts.contains(concept) {
                    return Err(ValidationError::UnknownConcept {
                        sync: rule.name().to_string(),
                        concept: concept.clone(),
                    });
                }
                if !concepts.has_action(concept, action) {
                    return Err(ValidationError::UnknownAction {
                        sync: rule.name().to_string(),
                        concept: concept.clone(),
                        action: action.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Collects rules before freezing them into a [`SyncRegistry`].
#[derive(Debug, Default)]
pub struct SyncRegistryBuilder {
    rules: Vec<SyncRule>,
    names: HashSet<String>,
}

impl SyncRegistryBuilder {
    /// Adds a rule. Names must be unique.
    pub fn register(&mut self, rule: SyncRule) -> Result<&mut Self, ValidationError> {
        if !self.names.insert(rule.name().to_string()) {
            return Err(ValidationError::DuplicateSync {
                sync: rule.name().to_string(),
            });
        }
        self.rules.push(rule);
        Ok(self)
    }

    /// Builder-style [`SyncRegistryBuilder::register`].
    pub fn with(mut self, rule: SyncRule) -> SyncResult<Self> {
        self.register(rule)?;
        Ok(self)
    }

    /// Adds several rules.
    pub fn extend(mut self, rules: impl IntoIterator<Item = SyncRule>) -> SyncResult<Self> {
        for rule in rules {
            self.register(rule)?;
        }
        Ok(self)
    }

    /// Freezes the registry and builds the action index.
    #[must_use]
    pub fn build(self) -> SyncRegistry {
        let rules: Vec<Arc<SyncRule>> = self.rules.into_iter().map(Arc::new).collect();
        let mut index: HashMap<ActionKey, Vec<usize>> = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            for pattern in rule.when() {
                let slot = index
                    .entry((pattern.concept.clone(), pattern.action.clone()))
                    .or_default();
                if !slot.contains(&i) {
                    slot.push(i);
                }
            }
        }
        SyncRegistry { rules, index }
    }
}
