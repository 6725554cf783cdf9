//! # concept-sync - Reactive Synchronization of Independent Concepts
//!
//! An application backend is composed of independent state units ("concepts"),
//! each exposing actions and queries, glued together by declarative
//! synchronization rules ("syncs"). Every completed action is recorded in a
//! per-request action trace; syncs react to trace entries, bind variables,
//! optionally filter and enrich those bindings with queries, and dispatch
//! further actions until nothing new fires.
//!
//! ## Core Concepts
//!
//! - **Concept**: A unit of state with named actions (mutating) and queries (read-only)
//! - **ActionTrace**: The ordered record of every action performed for one request
//! - **SyncRule**: A when/where/then rule reacting to trace entries
//! - **Frame**: Variable bindings produced by matching and consumed by dispatch
//! - **SyncEngine**: Runs each request's cascade to a fixpoint
//!
//! ## Usage
//!
//! ```rust,ignore
//! use concept_sync::{record, terms};
//! use concept_sync::pattern::{lit, var};
//! use concept_sync::{ActionPattern, ActionTemplate, EngineConfig, SyncEngine, SyncRegistry, SyncRule};
//!
//! let pong = SyncRule::builder("Pong")
//!     .when(
//!         ActionPattern::new("Requesting", "request")
//!             .inputs(terms! { "path" => lit("/ping") })
//!             .outputs(terms! { "request" => var("r") }),
//!     )
//!     .then(ActionTemplate::new("Requesting", "respond").inputs(terms! { "request" => var("r") }))
//!     .build()?;
//!
//! let registry = SyncRegistry::builder().with(pong)?.build();
//! let engine = SyncEngine::new(registry, concepts, EngineConfig::default())?;
//! let outcome = engine.submit_request("/ping", record! {}).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod frame;
pub mod pattern;
pub mod trace;
pub mod value;

// Concepts, rules and execution
pub mod concept;
pub mod config;
pub mod engine;
pub mod sync;

// Reference application
pub mod app;

// Re-export primary types at crate root for convenience
pub use concept::{ActionError, ActionResult, Concept, ConceptSet, QueryContext, Requesting};
pub use config::EngineConfig;
pub use engine::{CascadeStats, Diagnostic, OutcomeStatus, RequestOutcome, SyncEngine};
pub use error::{ExecutionError, SyncError, SyncResult, ValidationError};
pub use frame::{unify, Frame, Frames};
pub use pattern::{ActionPattern, ActionTemplate, OutputPattern, Term, TermMap};
pub use sync::{SyncRegistry, SyncRegistryBuilder, SyncRule, SyncRuleBuilder, WhereClause};
pub use trace::{ActionOutcome, ActionTrace, Cause, TraceEntry};
pub use value::{Record, Value};
