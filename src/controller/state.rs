//! Iteration states and the candidate they carry.

use crate::parser::ExecutionResult;

/// Which action produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Generated,
    Pruned,
    Repaired,
    Refined,
}

/// The active test source. Each refinement supersedes it with a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub source: String,
    /// Trajectory step that produced this source.
    pub step: u32,
    pub provenance: Provenance,
}

impl Candidate {
    pub fn new(source: impl Into<String>, step: u32, provenance: Provenance) -> Self {
        Self {
            source: source.into(),
            step,
            provenance,
        }
    }
}

/// Position within one outer iteration.
#[derive(Debug)]
pub enum State {
    Generate,
    StageAndExecute(Candidate),
    Parse {
        candidate: Candidate,
        raw: String,
    },
    Prune {
        candidate: Candidate,
        result: ExecutionResult,
    },
    Decide {
        candidate: Candidate,
        result: ExecutionResult,
        /// False when the run passed, or pruning left nothing failing.
        failing: bool,
    },
    Done(IterationOutcome),
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Generate => "generate",
            State::StageAndExecute(_) => "stage_and_execute",
            State::Parse { .. } => "parse",
            State::Prune { .. } => "prune",
            State::Decide { .. } => "decide",
            State::Done(_) => "done",
        }
    }
}

/// How an outer iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// A failure was confirmed to reproduce the issue; the run stops.
    Confirmed,
    /// The candidate lineage was dropped; the next iteration starts fresh.
    Abandoned,
    /// Refinement ran out of attempts without a confirmed failure.
    Exhausted,
}
