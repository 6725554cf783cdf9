use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ExecutionError, SyncResult};

/// Optional wall-clock budget for one request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<Instant>,
    budget_ms: u64,
}

impl Deadline {
    pub(crate) fn after(budget: Option<Duration>) -> Self {
        match budget {
            Some(d) => Self {
                at: Some(Instant::now() + d),
                budget_ms: d.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            None => Self {
                at: None,
                budget_ms: 0,
            },
        }
    }

    pub(crate) fn budget_ms(&self) -> u64 {
        self.budget_ms
    }

    pub(crate) fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Awaits `fut`, failing with a timeout once the budget is spent.
    pub(crate) async fn run<F: Future>(&self, fut: F) -> SyncResult<F::Output> {
        match self.at {
            Some(at) => tokio::time::timeout_at(at, fut).await.map_err(|_| {
                ExecutionError::Timeout {
                    duration_ms: self.budget_ms,
                }
                .into()
            }),
            None => Ok(fut.await),
        }
    }
}
