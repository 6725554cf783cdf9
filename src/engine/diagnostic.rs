//! Diagnostics collected while a request cascades.
//!
//! Diagnostics never change the primary response; they are returned next to it
//! so callers can surface cascade failures.

use serde::{Deserialize, Serialize};

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A where clause returned an error; the rule was skipped for this scan.
    WhereFailed {
        sync: String,
        trigger: u64,
        reason: String,
        frames: serde_json::Value,
    },

    /// A where clause panicked; the rule was skipped for this scan.
    WherePanicked {
        sync: String,
        trigger: u64,
        message: String,
    },

    /// A then template referenced a variable missing from the frame.
    UnboundVariable {
        sync: String,
        variable: String,
        frame: serde_json::Value,
    },

    /// A dispatched action returned an error.
    ActionFailed {
        seq: u64,
        concept: String,
        action: String,
        error: String,
    },

    /// Candidate frames for a rule were truncated.
    FrameLimit {
        sync: String,
        limit: usize,
    },

    /// The cascade guard stopped the request.
    CascadeLimit {
        sync: String,
        depth: u32,
        dispatches: usize,
    },

    /// The request budget elapsed.
    TimedOut {
        after_ms: u64,
    },
}

impl Diagnostic {
    /// Short machine-friendly kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::WhereFailed { .. } => "where_failed",
            Self::WherePanicked { .. } => "where_panicked",
            Self::UnboundVariable { .. } => "unbound_variable",
            Self::ActionFailed { .. } => "action_failed",
            Self::FrameLimit { .. } => "frame_limit",
            Self::CascadeLimit { .. } => "cascade_limit",
            Self::TimedOut { .. } => "timed_out",
        }
    }

    /// Name of the sync the diagnostic is about, if any.
    #[must_use]
    pub fn sync(&self) -> Option<&str> {
        match self {
            Self::WhereFailed { sync, .. }
            | Self::WherePanicked { sync, .. }
            | Self::UnboundVariable { sync, .. }
            | Self::FrameLimit { sync, .. }
            | Self::CascadeLimit { sync, .. } => Some(sync),
            Self::ActionFailed { .. } | Self::TimedOut { .. } => None,
        }
    }
}
