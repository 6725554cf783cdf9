//! Then-clause dispatch.
//!
//! Substitutes a frame into a sync's then templates, performs each action in
//! order, and appends one trace entry per invocation. Action errors become
//! error entries; they never propagate as `Err`.

use tracing::{debug, info};

use crate::concept::ConceptSet;
use crate::error::SyncResult;
use crate::frame::Frame;
use crate::pattern::ActionTemplate;
use crate::trace::{ActionOutcome, ActionTrace, Cause};
use crate::value::Record;

use super::deadline::Deadline;

pub(crate) struct Dispatcher<'a> {
    concepts: &'a ConceptSet,
    deadline: Deadline,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(concepts: &'a ConceptSet, deadline: Deadline) -> Self {
        Self { concepts, deadline }
    }

    /// Dispatches every template for `frame`.
    ///
    /// All templates are instantiated before the first action runs, so an
    /// unbound variable dispatches nothing. Appended sequence numbers are
    /// pushed to `appended` as they are recorded, including before a timeout.
    pub(crate) async fn dispatch(
        &self,
        trace: &mut ActionTrace,
        templates: &[ActionTemplate],
        frame: &Frame,
        depth: u32,
        cause: &Cause,
        appended: &mut Vec<u64>,
    ) -> SyncResult<()> {
        let inputs = templates
            .iter()
            .map(|t| t.instantiate(frame))
            .collect::<SyncResult<Vec<Record>>>()?;

        for (template, input) in templates.iter().zip(inputs) {
            let seq = self
                .perform(
                    trace,
                    &template.concept,
                    &template.action,
                    input,
                    depth,
                    Some(cause.clone()),
                )
                .await?;
            appended.push(seq);
        }
        Ok(())
    }

    /// Performs one action and records it.
    pub(crate) async fn perform(
        &self,
        trace: &mut ActionTrace,
        concept: &str,
        action: &str,
        input: Record,
        depth: u32,
        cause: Option<Cause>,
    ) -> SyncResult<u64> {
        let result = self
            .deadline
            .run(self.concepts.perform(concept, action, &input))
            .await?;

        let outcome = match result {
            Ok(action_result) => ActionOutcome::from(action_result),
            Err(err) => ActionOutcome::Error {
                error: err.to_string(),
            },
        };

        let failed = outcome.error().map(str::to_string);
        let seq = trace.append(concept, action, input, outcome, depth, cause);

        match failed {
            None => debug!(seq, depth, concept, action, "action dispatched"),
            Some(error) => info!(seq, depth, concept, action, %error, "action returned error"),
        }

        Ok(seq)
    }
}
