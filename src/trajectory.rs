//! Per-step audit artifacts.
//!
//! Each model call gets a `step_{n}-{kind}` directory holding the prompt, the
//! raw response, and token counts. Nothing in the control loop reads these
//! back.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::generation::Exchange;
use crate::report::StatusReport;

/// Kind of step a trajectory directory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    TestGeneration,
    TestRemoval,
    ErrorFix,
    ErrorCategorization,
    CheckAssertion,
    TestRefinement,
    ExtractResults,
}

impl StepKind {
    fn suffix(self) -> &'static str {
        match self {
            StepKind::TestGeneration => "test-gen",
            StepKind::TestRemoval => "test-removal",
            StepKind::ErrorFix => "error_fix",
            StepKind::ErrorCategorization => "error_categorization",
            StepKind::CheckAssertion => "check_assertion",
            StepKind::TestRefinement => "test_refinement",
            StepKind::ExtractResults => "extract_results",
        }
    }

    /// Directory name for step `n`.
    pub fn dir_name(self, step: u32) -> String {
        format!("step_{}-{}", step, self.suffix())
    }
}

/// Writes trajectory artifacts under one run's directory.
#[derive(Debug, Clone)]
pub struct TrajectoryRecorder {
    root: PathBuf,
}

impl TrajectoryRecorder {
    /// Creates `base/<issue_id>/<run_id>`.
    pub fn create(base: &Path, issue_id: &str, run_id: &str) -> Result<Self> {
        let root = base.join(issue_id).join(run_id);
        std::fs::create_dir_all(&root)?;
        tracing::info!(path = %root.display(), "recording trajectory");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn step_dir(&self, step: u32, kind: StepKind) -> Result<PathBuf> {
        let dir = self.root.join(kind.dir_name(step));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Saves prompt, response, and token counts for a model call.
    pub fn record_exchange(
        &self,
        step: u32,
        kind: StepKind,
        exchange: &Exchange,
    ) -> Result<PathBuf> {
        let dir = self.step_dir(step, kind)?;
        std::fs::write(dir.join("prompt_input.txt"), &exchange.request.user)?;
        std::fs::write(dir.join("prompt_output.txt"), &exchange.response.text)?;
        std::fs::write(
            dir.join("metadata.txt"),
            format!(
                "Input Tokens: {}\nResponse Tokens: {}",
                exchange.response.prompt_tokens, exchange.response.completion_tokens
            ),
        )?;
        Ok(dir)
    }

    /// Saves a candidate as `step_{n}.py` in the step's directory.
    pub fn save_candidate(&self, step: u32, kind: StepKind, source: &str) -> Result<PathBuf> {
        let path = self.step_dir(step, kind)?.join(format!("step_{}.py", step));
        std::fs::write(&path, source)?;
        Ok(path)
    }

    /// Writes the report as pretty `status.json` in the run directory.
    pub fn write_status(&self, report: &StatusReport) -> Result<PathBuf> {
        let path = self.root.join("status.json");
        std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
        Ok(path)
    }
}
