//! Run state machine.
//!
//! `IDLE → DETECT_SPLITS → {FULL_REWRITE | INCREMENTAL_APPEND} →
//! BATCH_PROCESS(phase, k/K)* → FINALIZE_AGGREGATES → COMMIT_CHECKPOINT → IDLE`
//!
//! Aggregation batches run 1..K, then indicator batches 1..K'. A run with no
//! work goes straight from the mode state to FINALIZE_AGGREGATES. A run that
//! cannot commit returns to IDLE from FINALIZE_AGGREGATES, and a systemic
//! failure may return to IDLE from anywhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Aggregation,
    Indicators,
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchPhase::Aggregation => f.write_str("aggregation"),
            BatchPhase::Indicators => f.write_str("indicators"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    DetectSplits,
    FullRewrite,
    IncrementalAppend,
    BatchProcess {
        phase: BatchPhase,
        batch: usize,
        of: usize,
    },
    FinalizeAggregates,
    CommitCheckpoint,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("IDLE"),
            RunState::DetectSplits => f.write_str("DETECT_SPLITS"),
            RunState::FullRewrite => f.write_str("FULL_REWRITE"),
            RunState::IncrementalAppend => f.write_str("INCREMENTAL_APPEND"),
            RunState::BatchProcess { phase, batch, of } => {
                write!(f, "BATCH_PROCESS({phase} {batch}/{of})")
            }
            RunState::FinalizeAggregates => f.write_str("FINALIZE_AGGREGATES"),
            RunState::CommitCheckpoint => f.write_str("COMMIT_CHECKPOINT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal state transition {from} -> {to}")]
pub struct TransitionError {
    pub from: RunState,
    pub to: RunState,
}

impl RunState {
    /// Transition guard.
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use BatchPhase::*;
        use RunState::*;

        match (*self, *next) {
            (_, Idle) => *self != Idle,
            (Idle, DetectSplits) => true,
            (DetectSplits, FullRewrite | IncrementalAppend) => true,
            (FullRewrite | IncrementalAppend, BatchProcess { phase, batch, of }) => {
                phase == Aggregation && batch == 1 && of >= 1
            }
            (FullRewrite | IncrementalAppend, FinalizeAggregates) => true,
            (
                BatchProcess { phase: p, batch: b, of: n },
                BatchProcess { phase: q, batch: c, of: m },
            ) => {
                let next_in_phase = p == q && n == m && c == b + 1 && c <= m;
                let next_phase = p == Aggregation && q == Indicators && b == n && c == 1 && m >= 1;
                next_in_phase || next_phase
            }
            (BatchProcess { batch, of, .. }, FinalizeAggregates) => batch == of,
            (FinalizeAggregates, CommitCheckpoint) => true,
            _ => false,
        }
    }
}

/// Current state plus every state visited, in order.
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    current: RunState,
    history: Vec<RunState>,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            current: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    pub fn current(&self) -> RunState {
        self.current
    }

    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn advance(&mut self, next: RunState) -> Result<(), TransitionError> {
        if !self.current.can_transition_to(&next) {
            return Err(TransitionError {
                from: self.current,
                to: next,
            });
        }
        tracing::debug!(from = %self.current, to = %next, "state transition");
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}
