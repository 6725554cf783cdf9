//! Where clauses: async filter/enrich functions over frame sets.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::concept::QueryContext;
use crate::error::{ExecutionError, SyncError, SyncResult};
use crate::frame::Frames;

/// A where clause supplied by a sync author.
///
/// Receives the candidate frames and a read-only [`QueryContext`], and returns
/// the surviving (possibly enriched) frames. Implemented for any
/// `Fn(Frames, QueryContext) -> impl Future<Output = SyncResult<Frames>>`.
pub trait WhereClause: Send + Sync {
    /// Evaluates the clause.
    fn apply(&self, frames: Frames, ctx: QueryContext) -> BoxFuture<'static, SyncResult<Frames>>;
}

impl<F, Fut> WhereClause for F
where
    F: Fn(Frames, QueryContext) -> Fut + Send + Sync,
    Fut: Future<Output = SyncResult<Frames>> + Send + 'static,
{
    fn apply(&self, frames: Frames, ctx: QueryContext) -> BoxFuture<'static, SyncResult<Frames>> {
        self(frames, ctx).boxed()
    }
}

/// Why a where clause produced no result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WhereFailure {
    Error(String),
    Panic(String),
}

/// Runs a where clause, converting panics into failures.
pub(crate) async fn evaluate(
    clause: &dyn WhereClause,
    frames: Frames,
    ctx: QueryContext,
) -> Result<Frames, WhereFailure> {
    let fut = panic::catch_unwind(AssertUnwindSafe(|| clause.apply(frames, ctx)))
        .map_err(|payload| WhereFailure::Panic(panic_message(payload.as_ref())))?;

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(frames)) => Ok(frames),
        Ok(Err(SyncError::Execution(ExecutionError::WhereFailed { reason, .. }))) => {
            Err(WhereFailure::Error(reason))
        }
        Ok(Err(err)) => Err(WhereFailure::Error(err.to_string())),
        Err(payload) => Err(WhereFailure::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "where clause panicked".to_string()
    }
}
