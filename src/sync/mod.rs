//! Sync rules: declarative when/where/then compositions of concepts.
//!
//! A sync reacts to actions recorded in the trace (`when`), optionally filters
//! and enriches the resulting frames through an async `where` clause, and
//! dispatches further actions (`then`) for every surviving frame. Syncs are
//! immutable once built and are shared read-only across requests.

/// Immutable rule registry indexed by action.
pub mod registry;
/// Where-clause trait and evaluator.
pub mod where_clause;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::ValidationError;
use crate::pattern::{ActionPattern, ActionTemplate};

pub use registry::{SyncRegistry, SyncRegistryBuilder};
pub use where_clause::WhereClause;

/// A registered synchronization rule.
#[derive(Clone)]
pub struct SyncRule {
    name: String,
    when: Vec<ActionPattern>,
    where_clause: Option<Arc<dyn WhereClause>>,
    where_binds: BTreeSet<String>,
    then: Vec<ActionTemplate>,
}

impl SyncRule {
    /// Starts building a sync with the given unique name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SyncRuleBuilder {
        SyncRuleBuilder {
            name: name.into(),
            when: Vec::new(),
            where_clause: None,
            where_binds: BTreeSet::new(),
            then: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn when(&self) -> &[ActionPattern] {
        &self.when
    }

    #[must_use]
    pub fn then(&self) -> &[ActionTemplate] {
        &self.then
    }

    #[must_use]
    pub fn where_clause(&self) -> Option<&dyn WhereClause> {
        self.where_clause.as_deref()
    }

    /// Variables the where clause declares it binds.
    #[must_use]
    pub fn where_binds(&self) -> &BTreeSet<String> {
        &self.where_binds
    }

    /// Variables bound by the when clause.
    #[must_use]
    pub fn when_variables(&self) -> BTreeSet<String> {
        self.when.iter().flat_map(ActionPattern::variables).collect()
    }

    /// Returns true if any when pattern addresses `concept.action`.
    #[must_use]
    pub fn reacts_to(&self, concept: &str, action: &str) -> bool {
        self.when
            .iter()
            .any(|p| p.concept == concept && p.action == action)
    }
}

impl fmt::Debug for SyncRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRule")
            .field("name", &self.name)
            .field("when", &self.when)
            .field("where", &self.where_clause.is_some())
            .field("where_binds", &self.where_binds)
            .field("then", &self.then)
            .finish()
    }
}

/// Builder for [`SyncRule`].
pub struct SyncRuleBuilder {
    name: String,
    when: Vec<ActionPattern>,
    where_clause: Option<Arc<dyn WhereClause>>,
    where_binds: BTreeSet<String>,
    then: Vec<ActionTemplate>,
}

impl SyncRuleBuilder {
    /// Adds a when pattern. Multiple patterns are joined on shared variables.
    #[must_use]
    pub fn when(mut self, pattern: ActionPattern) -> Self {
        self.when.push(pattern);
        self
    }

    /// Sets the where clause.
    #[must_use]
    pub fn where_fn(mut self, clause: impl WhereClause + 'static) -> Self {
        self.where_clause = Some(Arc::new(clause));
        self
    }

    /// Declares variables introduced by the where clause.
    #[must_use]
    pub fn binds<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.where_binds.extend(vars.into_iter().map(Into::into));
        self
    }

    /// Adds a then template.
    #[must_use]
    pub fn then(mut self, template: ActionTemplate) -> Self {
        self.then.push(template);
        self
    }

    /// Validates and builds the rule.
    ///
    /// Every variable a then template references must be bound by a when
    /// pattern or declared with [`SyncRuleBuilder::binds`].
    pub fn build(self) -> Result<SyncRule, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "name".to_string(),
            });
        }
        if self.when.is_empty() {
            return Err(ValidationError::EmptyWhen { sync: self.name });
        }
        if self.then.is_empty() {
            return Err(ValidationError::EmptyThen { sync: self.name });
        }
        if !self.where_binds.is_empty() && self.where_clause.is_none() {
            return Err(ValidationError::MissingField {
                field: format!("{}.where", self.name),
            });
        }

        let rule = SyncRule {
            name: self.name,
            when: self.when,
            where_clause: self.where_clause,
            where_binds: self.where_binds,
            then: self.then,
        };

        let bound = rule.when_variables();
        for template in &rule.then {
            for variable in template.variables() {
                if !bound.contains(&variable) && !rule.where_binds.contains(&variable) {
                    return Err(ValidationError::UnboundThenVariable {
                        sync: rule.name,
                        variable,
                    });
                }
            }
        }

        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::QueryContext;
    use crate::error::SyncError;
    use crate::frame::Frames;
    use crate::pattern::{lit, var};
    use crate::terms;

    fn send_pattern() -> ActionPattern {
        ActionPattern::new("Conversing", "send")
            .inputs(terms! { "conversation" => var("c"), "content" => var("content") })
            .outputs(terms! { "message" => var("m") })
    }

    #[test]
    fn build_accepts_bound_then_variables() {
        let rule = SyncRule::builder("Echo")
            .when(send_pattern())
            .then(ActionTemplate::new("Log", "write").inputs(terms! { "text" => var("content") }))
            .build()
            .unwrap();
        assert_eq!(rule.name(), "Echo");
        assert!(rule.reacts_to("Conversing", "send"));
        assert!(!rule.reacts_to("Conversing", "create"));
        assert_eq!(rule.when_variables().len(), 3);
    }

    #[test]
    fn build_rejects_unbound_then_variable() {
        let err = SyncRule::builder("Broken")
            .when(send_pattern())
            .then(ActionTemplate::new("Assistant", "reply").inputs(terms! { "prompt" => var("prompt") }))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnboundThenVariable {
                sync: "Broken".to_string(),
                variable: "prompt".to_string(),
            }
        );
    }

    #[test]
    fn where_binds_satisfy_then_variables() {
        let rule = SyncRule::builder("Mention")
            .when(send_pattern())
            .where_fn(|frames: Frames, _ctx: QueryContext| async move { Ok::<_, SyncError>(frames) })
            .binds(["prompt"])
            .then(
                ActionTemplate::new("Assistant", "reply")
                    .inputs(terms! { "prompt" => var("prompt"), "mode" => lit("chat") }),
            )
            .build()
            .unwrap();
        assert!(rule.where_clause().is_some());
        assert!(rule.where_binds().contains("prompt"));
    }

    #[test]
    fn binds_without_where_clause_is_rejected() {
        let err = SyncRule::builder("NoWhere")
            .when(send_pattern())
            .binds(["prompt"])
            .then(ActionTemplate::new("Assistant", "reply"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { .. }));
    }

    #[test]
    fn empty_clauses_are_rejected() {
        assert!(matches!(
            SyncRule::builder("A").then(ActionTemplate::new("X", "y")).build(),
            Err(ValidationError::EmptyWhen { .. })
        ));
        assert!(matches!(
            SyncRule::builder("B").when(send_pattern()).build(),
            Err(ValidationError::EmptyThen { .. })
        ));
        assert!(matches!(
            SyncRule::builder("  ").when(send_pattern()).build(),
            Err(ValidationError::MissingField { .. })
        ));
    }
}
