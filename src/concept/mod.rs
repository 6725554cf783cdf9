//! Concept boundary.
//!
//! A concept is an independent unit of state exposing named actions (which may
//! mutate) and named queries (read-only). The engine never looks inside a
//! concept: it only performs actions, runs queries, and compares the values
//! they return.

/// Built-in concept turning inbound requests into trace entries.
pub mod requesting;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{ExecutionError, SyncResult, ValidationError};
use crate::value::Record;

pub use requesting::Requesting;

/// Error returned by a concept action.
///
/// Action errors are data: they are recorded in the trace, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionError {
    /// Human-readable message.
    pub message: String,
}

impl ActionError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub(crate) fn poisoned(context: &str) -> Self {
        Self::new(format!("poisoned lock: {context}"))
    }
}

/// Result of a concept action.
pub type ActionResult = Result<Record, ActionError>;

/// A unit of state exposing actions and queries.
#[async_trait]
pub trait Concept: Send + Sync {
    /// Name used by sync patterns to address this concept.
    fn name(&self) -> &str;

    /// Names of the actions this concept performs.
    fn actions(&self) -> &[&'static str];

    /// Names of the queries this concept answers.
    fn queries(&self) -> &[&'static str] {
        &[]
    }

    /// Performs an action.
    async fn perform(&self, action: &str, input: &Record) -> ActionResult;

    /// Runs a read-only query. An empty result is the failure signal.
    async fn query(&self, query: &str, input: &Record) -> Vec<Record> {
        let _ = (query, input);
        Vec::new()
    }
}

/// The set of concepts an engine dispatches to. Built once at startup.
#[derive(Clone, Default)]
pub struct ConceptSet {
    concepts: HashMap<String, Arc<dyn Concept>>,
}

impl ConceptSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a concept. Names must be unique.
    pub fn register(&mut self, concept: Arc<dyn Concept>) -> SyncResult<()> {
        let name = concept.name().to_string();
        if self.concepts.contains_key(&name) {
            return Err(ValidationError::DuplicateConcept { concept: name }.into());
        }
        self.concepts.insert(name, concept);
        Ok(())
    }

    /// Builder-style [`ConceptSet::register`].
    pub fn with(mut self, concept: Arc<dyn Concept>) -> SyncResult<Self> {
        self.register(concept)?;
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Concept>> {
        self.concepts.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.concepts.contains_key(name)
    }

    #[must_use]
    pub fn has_action(&self, concept: &str, action: &str) -> bool {
        self.get(concept)
            .is_some_and(|c| c.actions().contains(&action))
    }

    #[must_use]
    pub fn has_query(&self, concept: &str, query: &str) -> bool {
        self.get(concept)
            .is_some_and(|c| c.queries().contains(&query))
    }

    /// Registered concept names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.concepts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Performs `concept.action`.
    ///
    /// The outer result reports a missing concept; the inner result is the
    /// action's own success or error.
    pub async fn perform(
        &self,
        concept: &str,
        action: &str,
        input: &Record,
    ) -> SyncResult<ActionResult> {
        let target = self
            .get(concept)
            .ok_or_else(|| ExecutionError::ConceptNotFound {
                concept: concept.to_string(),
            })?;
        Ok(target.perform(action, input).await)
    }
}

impl fmt::Debug for ConceptSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConceptSet")
            .field("concepts", &self.names())
            .finish()
    }
}

/// Read-only view of the concept set handed to where clauses.
///
/// Only queries are reachable through this handle, so a where clause cannot
/// dispatch mutating actions.
#[derive(Clone, Debug)]
pub struct QueryContext {
    concepts: Arc<ConceptSet>,
}

impl QueryContext {
    #[must_use]
    pub fn new(concepts: Arc<ConceptSet>) -> Self {
        Self { concepts }
    }

    /// Runs `concept.query` with the given input.
    pub async fn query(&self, concept: &str, query: &str, input: &Record) -> SyncResult<Vec<Record>> {
        let target = self
            .concepts
            .get(concept)
            .ok_or_else(|| ExecutionError::ConceptNotFound {
                concept: concept.to_string(),
            })?;
        if !target.queries().contains(&query) {
            return Err(ExecutionError::QueryNotFound {
                concept: concept.to_string(),
                query: query.to_string(),
            }
            .into());
        }
        Ok(target.query(query, input).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    struct Echo;

    #[async_trait]
    impl Concept for Echo {
        fn name(&self) -> &str {
            "Echo"
        }

        fn actions(&self) -> &[&'static str] {
            &["say"]
        }

        fn queries(&self) -> &[&'static str] {
            &["_same"]
        }

        async fn perform(&self, action: &str, input: &Record) -> ActionResult {
            match action {
                "say" => Ok(input.clone()),
                other => Err(ActionError::new(format!("unknown action {other}"))),
            }
        }

        async fn query(&self, _query: &str, input: &Record) -> Vec<Record> {
            vec![input.clone()]
        }
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut set = ConceptSet::new();
        set.register(Arc::new(Echo)).unwrap();
        let err = set.register(Arc::new(Echo)).unwrap_err();
        assert!(err.is_validation());
        assert!(set.has_action("Echo", "say"));
        assert!(!set.has_action("Echo", "shout"));
        assert!(set.has_query("Echo", "_same"));
    }

    #[tokio::test]
    async fn perform_reports_missing_concept() {
        let set = ConceptSet::new().with(Arc::new(Echo)).unwrap();
        let ok = set.perform("Echo", "say", &record! { "a" => 1 }).await.unwrap();
        assert_eq!(ok.unwrap().get("a"), Some(&crate::Value::Int(1)));

        let err = set.perform("Nope", "say", &Record::new()).await.unwrap_err();
        assert!(err.is_execution());
    }

    #[tokio::test]
    async fn query_context_only_reaches_exposed_queries() {
        let ctx = QueryContext::new(Arc::new(ConceptSet::new().with(Arc::new(Echo)).unwrap()));
        let rows = ctx.query("Echo", "_same", &record! { "x" => true }).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(ctx.query("Echo", "say", &Record::new()).await.is_err());
    }
}
