//! The per-request action trace.
//!
//! Every completed action invocation is recorded once, in order, and never
//! mutated afterwards. The trace is owned by the fixpoint driver for the
//! lifetime of one request and returned to the caller with the outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Record;

/// Result of a completed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The action succeeded with the given output bindings.
    Success {
        /// Output bindings.
        output: Record,
    },
    /// The action reported an error.
    Error {
        /// Error message returned by the concept.
        error: String,
    },
}

impl ActionOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Output bindings of a successful action.
    #[must_use]
    pub const fn output(&self) -> Option<&Record> {
        match self {
            Self::Success { output } => Some(output),
            Self::Error { .. } => None,
        }
    }

    /// Error message of a failed action.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Error { error } => Some(error),
        }
    }
}

impl From<Result<Record, crate::concept::ActionError>> for ActionOutcome {
    fn from(result: Result<Record, crate::concept::ActionError>) -> Self {
        match result {
            Ok(output) => Self::Success { output },
            Err(err) => Self::Error {
                error: err.message,
            },
        }
    }
}

/// What caused an entry to be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cause {
    /// Name of the sync whose then clause dispatched the action.
    pub sync: String,
    /// Sequence number of the entry whose scan fired the sync.
    pub trigger: u64,
}

/// One completed action invocation.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub id: Uuid,
    /// Position in the trace; strictly increasing within a request.
    pub seq: u64,
    pub concept: String,
    pub action: String,
    pub input: Record,
    pub outcome: ActionOutcome,
    /// Cascade depth: 0 for the seed entry, trigger depth + 1 for dispatched entries.
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Cause>,
    pub recorded_at: DateTime<Utc>,
}

impl TraceEntry {
    /// Returns true if the entry records `concept.action`.
    #[must_use]
    pub fn is_action(&self, concept: &str, action: &str) -> bool {
        self.concept == concept && self.action == action
    }
}

/// Append-only list of trace entries for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionTrace {
    entries: Vec<TraceEntry>,
}

impl ActionTrace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed action and returns its sequence number.
    pub fn append(
        &mut self,
        concept: impl Into<String>,
        action: impl Into<String>,
        input: Record,
        outcome: ActionOutcome,
        depth: u32,
        cause: Option<Cause>,
    ) -> u64 {
        let seq = self.entries.len() as u64;
        self.entries.push(TraceEntry {
            id: Uuid::new_v4(),
            seq,
            concept: concept.into(),
            action: action.into(),
            input,
            outcome,
            depth,
            cause,
            recorded_at: Utc::now(),
        });
        seq
    }

    /// Looks up an entry by sequence number.
    #[must_use]
    pub fn get(&self, seq: u64) -> Option<&TraceEntry> {
        usize::try_from(seq).ok().and_then(|idx| self.entries.get(idx))
    }

    /// Entries in append order.
    #[must_use]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    /// Entries recording `concept.action`, in append order.
    pub fn find<'a>(
        &'a self,
        concept: &'a str,
        action: &'a str,
    ) -> impl Iterator<Item = &'a TraceEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.is_action(concept, action))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
