//! Regression Refiner - feedback-guided generation of defect-reproducing tests
//!
//! This library drives a generation service to write a regression test for a
//! reported defect, runs each candidate in an isolated sandbox, and refines it
//! from the execution feedback until a failure is confirmed to reproduce the
//! defect or the iteration budget runs out.

pub mod backoff;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod extract;
pub mod generation;
pub mod generator;
pub mod parser;
pub mod prompts;
pub mod pruner;
pub mod report;
pub mod sandbox;
pub mod search;
pub mod trajectory;

pub use error::{Error, IterationFault, Result};

pub use classifier::{
    FailureCategory, FailureClassification, FailureClassifier, RelevanceJudgement,
};
pub use config::{RefinerConfig, Validate, ValidationResult};
pub use controller::{
    Candidate, IterationOutcome, Provenance, RefinementController, RepairOutcome,
};
pub use generation::{GenerationRequest, GenerationResponse, GenerationService};
pub use generator::{CandidateGenerator, Issue, IssueContext};
pub use parser::{ExecutionResult, Outcome, ResultParser, TestOutcome};
pub use pruner::{prune, Pruned};
pub use report::{FinalStatus, IterationRecord, RunContext, StatusReport};
pub use sandbox::{CandidateStager, PathMapping, SandboxAdapter, ScriptSandbox};
pub use search::{CodeSearch, ImportUsageSearch, SearchReport};
pub use trajectory::{StepKind, TrajectoryRecorder};
