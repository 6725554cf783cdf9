//! Error types for concept-sync.
//!
//! All errors are strongly typed using thiserror. Unification failures are not
//! errors (the frame is simply dropped), and dispatched action failures are
//! recorded in the trace rather than raised.

use thiserror::Error;

/// Validation errors raised while building rules, registries and configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Sync '{sync}' has no when patterns")]
    EmptyWhen {
        sync: String,
    },

    #[error("Sync '{sync}' has no then templates")]
    EmptyThen {
        sync: String,
    },

    #[error("Sync '{sync}' references variable '{variable}' in its then clause but never binds it")]
    UnboundThenVariable {
        sync: String,
        variable: String,
    },

    #[error("Sync '{sync}' is registered more than once")]
    DuplicateSync {
        sync: String,
    },

    #[error("Sync '{sync}' references unknown concept '{concept}'")]
    UnknownConcept {
        sync: String,
        concept: String,
    },

    #[error("Sync '{sync}' references unknown action '{concept}.{action}'")]
    UnknownAction {
        sync: String,
        concept: String,
        action: String,
    },

    #[error("Concept '{concept}' is registered more than once")]
    DuplicateConcept {
        concept: String,
    },

    #[error("Invalid request: {reason}")]
    InvalidRequest {
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors that occur while a request is being processed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Variable '{variable}' is not bound in the current frame")]
    UnboundVariable {
        variable: String,
    },

    #[error("Concept not found: {concept}")]
    ConceptNotFound {
        concept: String,
    },

    #[error("Query '{concept}.{query}' is not exposed")]
    QueryNotFound {
        concept: String,
        query: String,
    },

    #[error("Where clause of sync '{sync}' failed: {reason}")]
    WhereFailed {
        sync: String,
        reason: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Top-level error type for concept-sync.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl SyncError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an error raised by a where clause author.
    ///
    /// The sync name is filled in by the engine when the error is reported.
    #[must_use]
    pub fn where_failed(reason: impl Into<String>) -> Self {
        Self::Execution(ExecutionError::WhereFailed {
            sync: String::new(),
            reason: reason.into(),
        })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this error reports an elapsed request budget.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Timeout { .. }))
    }

    /// Returns true if this error reports a variable missing from a frame.
    #[must_use]
    pub const fn is_unbound_variable(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::UnboundVariable { .. })
        )
    }
}

/// Result type alias for concept-sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
