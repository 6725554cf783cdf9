//! Request execution.
//!
//! [`SyncEngine`] owns the immutable rule registry and the concept set, and
//! runs one fixpoint cascade per request. Concurrent requests share nothing
//! mutable except the concepts themselves.

mod deadline;
/// Serializable diagnostics attached to request outcomes.
pub mod diagnostic;
mod dispatcher;
/// Fixpoint driver state.
pub mod driver;
/// Candidate frame construction.
pub mod matcher;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, field, info, info_span, Instrument, Span};

use crate::concept::requesting::{REQUEST, REQUESTING};
use crate::concept::{Concept, ConceptSet, QueryContext, Requesting};
use crate::config::EngineConfig;
use crate::error::{ExecutionError, SyncResult, ValidationError};
use crate::sync::SyncRegistry;
use crate::trace::ActionTrace;
use crate::value::{record_from_json, Record, Value};

use deadline::Deadline;
use dispatcher::Dispatcher;
use driver::{CascadeState, Driver};

pub use diagnostic::Diagnostic;
pub use driver::{CascadeStats, DriverPhase, OutcomeStatus};

/// Everything a caller learns about one processed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    /// Request id minted by `Requesting.request`; `None` for direct invocations.
    pub request: Option<String>,
    /// Fields recorded by `Requesting.respond`, if a sync answered the request.
    pub response: Option<Record>,
    pub status: OutcomeStatus,
    /// Every action performed while processing the request, in order.
    pub trace: ActionTrace,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: CascadeStats,
}

impl RequestOutcome {
    /// Returns true if the cascade reached a fixpoint.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }

    /// Looks up one field of the response.
    #[must_use]
    pub fn response_field(&self, field: &str) -> Option<&Value> {
        self.response.as_ref().and_then(|r| r.get(field))
    }
}

/// The sync engine.
#[derive(Clone)]
pub struct SyncEngine {
    registry: Arc<SyncRegistry>,
    concepts: Arc<ConceptSet>,
    requesting: Arc<Requesting>,
    config: EngineConfig,
}

impl SyncEngine {
    /// Creates an engine.
    ///
    /// Registers the built-in `Requesting` concept, then checks the config and
    /// every concept and action the registry references.
    pub fn new(
        registry: SyncRegistry,
        mut concepts: ConceptSet,
        config: EngineConfig,
    ) -> SyncResult<Self> {
        config.validate()?;

        let requesting = Arc::new(Requesting::new());
        let builtin: Arc<dyn Concept> = requesting.clone();
        concepts.register(builtin)?;
        registry.validate_against(&concepts)?;

        info!(
            rules = registry.len(),
            concepts = concepts.names().len(),
            "sync engine ready"
        );

        Ok(Self {
            registry: Arc::new(registry),
            concepts: Arc::new(concepts),
            requesting,
            config,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &SyncRegistry {
        &self.registry
    }

    #[must_use]
    pub fn concepts(&self) -> &ConceptSet {
        &self.concepts
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only access to concept queries, as handed to where clauses.
    #[must_use]
    pub fn queries(&self) -> QueryContext {
        QueryContext::new(Arc::clone(&self.concepts))
    }

    /// Processes an inbound request.
    ///
    /// Seeds the trace with `Requesting.request { path, ..body }` and returns
    /// once the cascade is idle. A `path` field in `body` is overridden.
    pub async fn submit_request(&self, path: &str, body: Record) -> SyncResult<RequestOutcome> {
        let mut input = body;
        input.insert("path".to_string(), Value::from(path));

        let span = info_span!("request", path, request_id = field::Empty);
        async move {
            let mut state = CascadeState::default();
            let result = self.cascade(&mut state, REQUESTING, REQUEST, input).await;

            // Collect before propagating so a failed cascade leaves nothing pending.
            let request = state
                .trace
                .get(0)
                .and_then(|e| e.outcome.output())
                .and_then(|o| o.get("request"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let response = request
                .as_deref()
                .and_then(|id| self.requesting.take_response(id));
            result?;

            info!(
                status = ?state.status,
                entries = state.trace.len(),
                answered = response.is_some(),
                "request processed"
            );
            Ok(outcome(state, request, response))
        }
        .instrument(span)
        .await
    }

    /// Like [`SyncEngine::submit_request`], with a JSON object body.
    pub async fn submit_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> SyncResult<RequestOutcome> {
        let body = record_from_json(body).ok_or_else(|| ValidationError::InvalidRequest {
            reason: "request body must be a JSON object".to_string(),
        })?;
        self.submit_request(path, body).await
    }

    /// Runs a cascade seeded by a direct action instead of a request.
    ///
    /// `Requesting.request` cannot be invoked directly; use
    /// [`SyncEngine::submit_request`], which also collects the response.
    pub async fn invoke(
        &self,
        concept: &str,
        action: &str,
        input: Record,
    ) -> SyncResult<RequestOutcome> {
        if concept == REQUESTING && action == REQUEST {
            return Err(ValidationError::InvalidRequest {
                reason: "requests are submitted with submit_request".to_string(),
            }
            .into());
        }
        if !self.concepts.has_action(concept, action) {
            return Err(ExecutionError::ConceptNotFound {
                concept: format!("{concept}.{action}"),
            }
            .into());
        }

        let span = info_span!("invoke", concept, action);
        async move {
            let mut state = CascadeState::default();
            self.cascade(&mut state, concept, action, input).await?;
            debug!(status = ?state.status, entries = state.trace.len(), "invocation processed");
            Ok(outcome(state, None, None))
        }
        .instrument(span)
        .await
    }

    async fn cascade(
        &self,
        state: &mut CascadeState,
        concept: &str,
        action: &str,
        input: Record,
    ) -> SyncResult<()> {
        let deadline = Deadline::after(self.config.request_timeout());
        let driver = Driver::new(
            &self.registry,
            &self.config,
            Dispatcher::new(&self.concepts, deadline),
            self.queries(),
            deadline,
        );

        match driver.seed(state, concept, action, input).await {
            Ok(seq) => {
                if let Some(id) = state
                    .trace
                    .get(seq)
                    .filter(|e| e.is_action(REQUESTING, REQUEST))
                    .and_then(|e| e.outcome.output())
                    .and_then(|o| o.get("request"))
                    .and_then(Value::as_str)
                {
                    Span::current().record("request_id", id);
                }
            }
            Err(err) if err.is_timeout() => {
                driver.timed_out(state);
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        driver.run(state).await
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("rules", &self.registry.len())
            .field("concepts", &self.concepts)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn outcome(state: CascadeState, request: Option<String>, response: Option<Record>) -> RequestOutcome {
    RequestOutcome {
        request,
        response,
        status: state.status,
        trace: state.trace,
        diagnostics: state.diagnostics,
        stats: state.stats,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::concept::requesting::RESPOND;
    use crate::concept::ActionResult;
    use crate::pattern::{lit, var, ActionPattern, ActionTemplate};
    use crate::sync::SyncRule;
    use crate::{record, terms};

    struct Clock;

    #[async_trait]
    impl Concept for Clock {
        fn name(&self) -> &str {
            "Clock"
        }

        fn actions(&self) -> &[&'static str] {
            &["tick"]
        }

        async fn perform(&self, _action: &str, input: &Record) -> ActionResult {
            Ok(input.clone())
        }
    }

    fn ping_registry() -> SyncRegistry {
        let respond = SyncRule::builder("Pong")
            .when(
                ActionPattern::new(REQUESTING, REQUEST)
                    .inputs(terms! { "path" => lit("/ping") })
                    .outputs(terms! { "request" => var("r") }),
            )
            .then(ActionTemplate::new(REQUESTING, RESPOND).inputs(terms! {
                "request" => var("r"),
                "body" => lit("pong"),
            }))
            .build()
            .unwrap();
        SyncRegistry::builder().with(respond).unwrap().build()
    }

    fn engine() -> SyncEngine {
        let concepts = ConceptSet::new().with(Arc::new(Clock)).unwrap();
        SyncEngine::new(ping_registry(), concepts, EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn request_is_answered_by_sync() {
        let out = engine().submit_request("/ping", Record::new()).await.unwrap();
        assert!(out.is_completed());
        assert!(out.request.is_some());
        assert_eq!(out.response_field("body"), Some(&Value::from("pong")));
        assert_eq!(out.trace.len(), 2);
        assert_eq!(out.stats.dispatches, 1);
    }

    #[tokio::test]
    async fn unmatched_path_has_no_response() {
        let out = engine().submit_request("/other", record! { "x" => 1 }).await.unwrap();
        assert!(out.is_completed());
        assert!(out.response.is_none());
        assert_eq!(out.trace.len(), 1);
    }

    #[tokio::test]
    async fn submit_json_rejects_non_object_body() {
        let err = engine()
            .submit_json("/ping", serde_json::json!([1, 2]))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn invoke_rejects_unknown_action() {
        let err = engine().invoke("Clock", "stop", Record::new()).await.unwrap_err();
        assert!(err.is_execution());
    }

    #[tokio::test]
    async fn invoke_runs_without_request() {
        let out = engine()
            .invoke("Clock", "tick", record! { "at" => 3 })
            .await
            .unwrap();
        assert!(out.request.is_none());
        assert_eq!(out.trace.len(), 1);
    }

    #[tokio::test]
    async fn answered_and_unanswered_requests_are_collected() {
        let engine = engine();
        engine.submit_request("/ping", Record::new()).await.unwrap();
        engine.submit_request("/other", Record::new()).await.unwrap();
        assert_eq!(engine.requesting.in_flight(), 0);
    }

    #[tokio::test]
    async fn invoke_cannot_seed_a_request() {
        let engine = engine();
        let err = engine
            .invoke(REQUESTING, REQUEST, record! { "path" => "/ping" })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(engine.requesting.in_flight(), 0);
    }

    #[test]
    fn new_rejects_rules_for_unknown_concepts() {
        let rule = SyncRule::builder("Ghost")
            .when(ActionPattern::new("Ghost", "boo"))
            .then(ActionTemplate::new("Clock", "tick"))
            .build()
            .unwrap();
        let registry = SyncRegistry::builder().with(rule).unwrap().build();
        let err = SyncEngine::new(registry, ConceptSet::new(), EngineConfig::default()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = EngineConfig {
            max_dispatches: 0,
            ..EngineConfig::default()
        };
        let err = SyncEngine::new(SyncRegistry::builder().build(), ConceptSet::new(), config).unwrap_err();
        assert!(err.is_validation());
    }
}
