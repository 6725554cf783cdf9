//! The fixpoint driver.
//!
//! Processes one request's cascade with an explicit FIFO work queue of trace
//! sequence numbers. Each scanned entry selects, through the registry index,
//! the syncs that react to its action; their frames are matched, filtered by
//! the where clause and dispatched. Dispatched entries are queued in turn. The
//! loop ends when the queue drains (fixpoint) or a guard trips.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::concept::QueryContext;
use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::frame::{Frame, Frames};
use crate::sync::where_clause::{self, WhereFailure};
use crate::sync::{SyncRegistry, SyncRule};
use crate::trace::{ActionTrace, Cause};
use crate::value::Record;

use super::deadline::Deadline;
use super::diagnostic::Diagnostic;
use super::dispatcher::Dispatcher;
use super::matcher::anchored_frames;

/// Phases of the driver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverPhase {
    /// No request is being processed.
    Idle,
    /// Popping the next entry off the work queue.
    Scanning,
    /// Building candidate frames for one rule.
    Matching,
    /// Awaiting the rule's where clause.
    WhereFiltering,
    /// Performing then actions for surviving frames.
    Dispatching,
}

/// How a request's cascade ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The work queue drained.
    #[default]
    Completed,
    /// A cascade guard stopped processing; committed effects stand.
    CascadeLimitExceeded,
    /// The request budget elapsed; committed effects stand.
    TimedOut,
}

/// Counters describing one cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeStats {
    /// Trace entries scanned.
    pub scans: usize,
    /// Actions dispatched by syncs (the seed action is not counted).
    pub dispatches: usize,
    /// Deepest dispatched entry.
    pub max_depth: u32,
    /// Firings skipped because the (sync, frame) pair already fired.
    pub deduplicated: usize,
}

/// Per-request mutable state owned by the driver.
#[derive(Debug, Default)]
pub(crate) struct CascadeState {
    pub(crate) trace: ActionTrace,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) status: OutcomeStatus,
    pub(crate) stats: CascadeStats,
    queue: VecDeque<u64>,
    fired: HashSet<[u8; 32]>,
    phase: Option<DriverPhase>,
}

impl CascadeState {
    fn enter(&mut self, phase: DriverPhase) {
        if self.phase != Some(phase) {
            trace!(from = ?self.phase, to = ?phase, "driver phase");
            self.phase = Some(phase);
        }
    }

    fn halt(&mut self, status: OutcomeStatus, diagnostic: Diagnostic) {
        self.status = status;
        self.diagnostics.push(diagnostic);
        self.enter(DriverPhase::Idle);
    }
}

enum Flow {
    Continue,
    Halt,
}

pub(crate) struct Driver<'a> {
    registry: &'a SyncRegistry,
    config: &'a EngineConfig,
    dispatcher: Dispatcher<'a>,
    queries: QueryContext,
    deadline: Deadline,
}

impl<'a> Driver<'a> {
    pub(crate) fn new(
        registry: &'a SyncRegistry,
        config: &'a EngineConfig,
        dispatcher: Dispatcher<'a>,
        queries: QueryContext,
        deadline: Deadline,
    ) -> Self {
        Self {
            registry,
            config,
            dispatcher,
            queries,
            deadline,
        }
    }

    /// Performs the initiating action at depth 0 and queues it.
    pub(crate) async fn seed(
        &self,
        state: &mut CascadeState,
        concept: &str,
        action: &str,
        input: Record,
    ) -> SyncResult<u64> {
        let seq = self
            .dispatcher
            .perform(&mut state.trace, concept, action, input, 0, None)
            .await?;
        state.queue.push_back(seq);
        Ok(seq)
    }

    /// Runs the cascade until the queue drains or a guard trips.
    pub(crate) async fn run(&self, state: &mut CascadeState) -> SyncResult<()> {
        while let Some(seq) = {
            state.enter(DriverPhase::Scanning);
            state.queue.pop_front()
        } {
            if self.deadline.expired() {
                self.timed_out(state);
                return Ok(());
            }

            let Some(entry) = state.trace.get(seq) else {
                return Err(SyncError::internal(format!("queued entry {seq} missing from trace")));
            };
            let rules = self.registry.rules_for(&entry.concept, &entry.action);
            state.stats.scans += 1;
            debug!(seq, concept = %entry.concept, action = %entry.action, rules = rules.len(), "scanning entry");

            for rule in rules {
                if let Flow::Halt = self.fire(&rule, seq, state).await? {
                    return Ok(());
                }
            }
        }

        state.enter(DriverPhase::Idle);
        debug!(
            scans = state.stats.scans,
            dispatches = state.stats.dispatches,
            "cascade reached fixpoint"
        );
        Ok(())
    }

    async fn fire(&self, rule: &SyncRule, seq: u64, state: &mut CascadeState) -> SyncResult<Flow> {
        state.enter(DriverPhase::Matching);
        let candidates = anchored_frames(rule.when(), &state.trace, seq, self.config.max_frames_per_rule);
        if candidates.truncated {
            warn!(sync = rule.name(), limit = self.config.max_frames_per_rule, "candidate frames truncated");
            state.diagnostics.push(Diagnostic::FrameLimit {
                sync: rule.name().to_string(),
                limit: self.config.max_frames_per_rule,
            });
        }
        if candidates.frames.is_empty() {
            return Ok(Flow::Continue);
        }
        trace!(sync = rule.name(), seq, frames = candidates.frames.len(), "candidate frames");

        let frames = match rule.where_clause() {
            None => candidates.frames,
            Some(clause) => {
                state.enter(DriverPhase::WhereFiltering);
                let input = candidates.frames.clone();
                let evaluated = self
                    .deadline
                    .run(where_clause::evaluate(clause, candidates.frames, self.queries.clone()))
                    .await;
                match evaluated {
                    Ok(Ok(frames)) => frames,
                    Ok(Err(WhereFailure::Error(reason))) => {
                        let frames = frames_json(&input);
                        warn!(sync = rule.name(), trigger = seq, %reason, %frames, "where clause failed, skipping sync for this scan");
                        state.diagnostics.push(Diagnostic::WhereFailed {
                            sync: rule.name().to_string(),
                            trigger: seq,
                            reason,
                            frames,
                        });
                        return Ok(Flow::Continue);
                    }
                    Ok(Err(WhereFailure::Panic(message))) => {
                        warn!(sync = rule.name(), trigger = seq, %message, frames = %frames_json(&input), "where clause panicked, skipping sync for this scan");
                        state.diagnostics.push(Diagnostic::WherePanicked {
                            sync: rule.name().to_string(),
                            trigger: seq,
                            message,
                        });
                        return Ok(Flow::Continue);
                    }
                    Err(err) if err.is_timeout() => {
                        self.timed_out(state);
                        return Ok(Flow::Halt);
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        state.enter(DriverPhase::Dispatching);
        let depth = state.trace.get(seq).map_or(0, |e| e.depth) + 1;

        for frame in frames {
            let key = fingerprint(rule.name(), &frame)?;
            if state.fired.contains(&key) {
                state.stats.deduplicated += 1;
                trace!(sync = rule.name(), seq, "frame already fired");
                continue;
            }

            if let Some(variable) = first_unbound(rule, &frame) {
                warn!(sync = rule.name(), %variable, frame = %frame.to_json(), "then clause variable unbound, skipping firing");
                state.diagnostics.push(Diagnostic::UnboundVariable {
                    sync: rule.name().to_string(),
                    variable,
                    frame: frame.to_json(),
                });
                continue;
            }

            let would_dispatch = state.stats.dispatches + rule.then().len();
            if depth > self.config.max_cascade_depth || would_dispatch > self.config.max_dispatches {
                warn!(
                    sync = rule.name(),
                    depth,
                    dispatches = state.stats.dispatches,
                    "cascade limit exceeded, stopping request"
                );
                state.halt(
                    OutcomeStatus::CascadeLimitExceeded,
                    Diagnostic::CascadeLimit {
                        sync: rule.name().to_string(),
                        depth,
                        dispatches: state.stats.dispatches,
                    },
                );
                return Ok(Flow::Halt);
            }

            state.fired.insert(key);
            let cause = Cause {
                sync: rule.name().to_string(),
                trigger: seq,
            };
            let mut appended = Vec::with_capacity(rule.then().len());
            let result = self
                .dispatcher
                .dispatch(&mut state.trace, rule.then(), &frame, depth, &cause, &mut appended)
                .await;

            for s in appended {
                state.stats.dispatches += 1;
                state.stats.max_depth = state.stats.max_depth.max(depth);
                if let Some(entry) = state.trace.get(s) {
                    if let Some(error) = entry.outcome.error() {
                        state.diagnostics.push(Diagnostic::ActionFailed {
                            seq: s,
                            concept: entry.concept.clone(),
                            action: entry.action.clone(),
                            error: error.to_string(),
                        });
                    }
                }
                state.queue.push_back(s);
            }

            match result {
                Ok(()) => {}
                Err(err) if err.is_timeout() => {
                    self.timed_out(state);
                    return Ok(Flow::Halt);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(Flow::Continue)
    }

    pub(crate) fn timed_out(&self, state: &mut CascadeState) {
        warn!(after_ms = self.deadline.budget_ms(), "request budget elapsed, stopping request");
        state.halt(
            OutcomeStatus::TimedOut,
            Diagnostic::TimedOut {
                after_ms: self.deadline.budget_ms(),
            },
        );
    }
}

/// Identity of a (sync, fully-bound frame) firing.
fn fingerprint(sync: &str, frame: &Frame) -> SyncResult<[u8; 32]> {
    let encoded = serde_json::to_vec(frame)
        .map_err(|e| SyncError::internal(format!("failed to encode frame: {e}")))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(sync.as_bytes());
    hasher.update(&[0]);
    hasher.update(&encoded);
    Ok(*hasher.finalize().as_bytes())
}

fn first_unbound(rule: &SyncRule, frame: &Frame) -> Option<String> {
    rule.then()
        .iter()
        .flat_map(|t| t.variables())
        .find(|v| !frame.contains(v))
}

fn frames_json(frames: &Frames) -> serde_json::Value {
    serde_json::Value::Array(frames.iter().map(Frame::to_json).collect())
}
