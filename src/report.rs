//! Run-scoped state and the status report handed to external reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::generation::GenerationResponse;

/// Final outcome of a defect-resolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FinalStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

/// What happened in one outer step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub step: u32,
    #[serde(default)]
    pub test_case_generated: bool,
    /// A compilation/runtime repair was attempted; `true` if the error is
    /// still outstanding afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compilation_error: Option<bool>,
    /// Candidate produced by the last repair attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compilation_fix: Option<String>,
    /// `true` while the step ends on a failure not yet tied to the issue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_failures: Option<bool>,
    /// Fault that aborted the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IterationRecord {
    pub fn new(step: u32) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }

    /// Record of a step aborted by `error`.
    pub fn faulted(step: u32, error: impl Into<String>) -> Self {
        Self {
            step,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// True when the step left a failure or compilation error outstanding.
    pub fn is_outstanding(&self) -> bool {
        self.test_failures == Some(true) || self.compilation_error == Some(true)
    }
}

/// Durable summary of one run, persisted as `status.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub github_issue_id: String,
    pub github_issue: String,
    pub steps: Vec<IterationRecord>,
    pub final_status: FinalStatus,
    pub calculated_cost: f64,
    pub reported_cost: f64,
    /// Outer step whose failure was confirmed as reproducing the issue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at_step: Option<u32>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StatusReport {
    pub fn new(issue_id: impl Into<String>, issue: impl Into<String>) -> Self {
        Self {
            github_issue_id: issue_id.into(),
            github_issue: issue.into(),
            steps: Vec::new(),
            final_status: FinalStatus::Pending,
            calculated_cost: 0.0,
            reported_cost: 0.0,
            confirmed_at_step: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Closes the report: Success if a failure was confirmed, or if no step
    /// left a failure or compilation error outstanding.
    ///
    /// Steps that only carry an `error` never count as outstanding, so a run
    /// in which every iteration faulted finalizes as Success. Check the
    /// per-step `error` fields before reading that as a reproduction.
    pub fn finalize(&mut self, ctx: &RunContext) {
        let clean = self.steps.iter().all(|s| !s.is_outstanding());
        self.final_status = if self.confirmed_at_step.is_some() || clean {
            FinalStatus::Success
        } else {
            FinalStatus::Failed
        };
        self.calculated_cost = ctx.calculated_cost();
        self.reported_cost = ctx.reported_cost();
        self.finished_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.final_status == FinalStatus::Success
    }
}

/// Counters threaded through one run: trajectory step labels and cost totals.
///
/// These label artifacts and feed the report; no control decision reads them.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    step: u32,
    prompt_tokens: u64,
    completion_tokens: u64,
    calculated_cost: f64,
    reported_cost: f64,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            step: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            calculated_cost: 0.0,
            reported_cost: 0.0,
        }
    }

    /// A context with a fresh random run id.
    pub fn fresh() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Current trajectory step label.
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Advances the trajectory step label and returns it.
    pub fn next_step(&mut self) -> u32 {
        self.step += 1;
        self.step
    }

    /// Adds a response's usage to the totals.
    pub fn add_usage(&mut self, response: &GenerationResponse) {
        self.prompt_tokens += response.prompt_tokens;
        self.completion_tokens += response.completion_tokens;
        self.calculated_cost += response.stats.calculated_cost;
        self.reported_cost += response.stats.reported_cost;
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens
    }

    pub fn completion_tokens(&self) -> u64 {
        self.completion_tokens
    }

    pub fn calculated_cost(&self) -> f64 {
        self.calculated_cost
    }

    pub fn reported_cost(&self) -> f64 {
        self.reported_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationStats;

    fn record(test_failures: Option<bool>, compilation_error: Option<bool>) -> IterationRecord {
        IterationRecord {
            test_failures,
            compilation_error,
            ..IterationRecord::new(1)
        }
    }

    #[test]
    fn report_without_outstanding_flags_is_success() {
        let mut report = StatusReport::new("x__x-1", "bug");
        report.steps = vec![record(None, None), record(Some(false), Some(false))];
        report.finalize(&RunContext::new("run"));

        assert_eq!(report.final_status, FinalStatus::Success);
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn report_with_outstanding_failure_is_failed() {
        let mut report = StatusReport::new("x__x-1", "bug");
        report.steps = vec![record(None, None), record(Some(true), None)];
        report.finalize(&RunContext::new("run"));
        assert_eq!(report.final_status, FinalStatus::Failed);

        report.steps = vec![record(None, Some(true))];
        report.finalize(&RunContext::new("run"));
        assert_eq!(report.final_status, FinalStatus::Failed);
    }

    #[test]
    fn confirmed_report_is_success_despite_earlier_failures() {
        let mut report = StatusReport::new("x__x-1", "bug");
        report.steps = vec![record(Some(true), None), record(Some(true), None)];
        report.confirmed_at_step = Some(2);
        report.finalize(&RunContext::new("run"));
        assert!(report.is_success());
    }

    #[test]
    fn faulted_steps_do_not_count_as_outstanding() {
        assert!(!IterationRecord::faulted(3, "sandbox fault").is_outstanding());
    }

    #[test]
    fn all_faulted_run_finalizes_as_success() {
        let mut report = StatusReport::new("x__x-1", "bug");
        report.steps = vec![
            IterationRecord::faulted(1, "sandbox fault: exit 125"),
            IterationRecord::faulted(2, "generation fault: no code block"),
        ];
        report.finalize(&RunContext::new("run"));

        assert_eq!(report.final_status, FinalStatus::Success);
        assert_eq!(report.confirmed_at_step, None);
    }

    #[test]
    fn iteration_record_omits_unset_fields() {
        let json = serde_json::to_value(IterationRecord::faulted(2, "boom")).unwrap();
        assert_eq!(json["step"], 2);
        assert_eq!(json["error"], "boom");
        assert!(json.get("compilation_error").is_none());
    }

    #[test]
    fn status_report_serializes_expected_keys() {
        let report = StatusReport::new("django__django-1", "bug");
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["github_issue_id"], "django__django-1");
        assert_eq!(json["final_status"], "Pending");
        assert!(json["steps"].as_array().unwrap().is_empty());
        assert!(json.get("calculated_cost").is_some());
        assert!(json.get("reported_cost").is_some());
    }

    #[test]
    fn run_context_accumulates_usage() {
        let mut ctx = RunContext::fresh();
        let response = GenerationResponse {
            text: String::new(),
            prompt_tokens: 1000,
            completion_tokens: 200,
            stats: GenerationStats {
                calculated_cost: 0.25,
                reported_cost: 0.5,
                ..GenerationStats::default()
            },
        };
        ctx.add_usage(&response);
        ctx.add_usage(&response);

        assert_eq!(ctx.prompt_tokens(), 2000);
        assert_eq!(ctx.completion_tokens(), 400);
        assert_eq!(ctx.calculated_cost(), 0.5);
        assert_eq!(ctx.reported_cost(), 1.0);
        assert_eq!(ctx.run_id().len(), 36);
    }

    #[test]
    fn run_context_steps_are_monotonic() {
        let mut ctx = RunContext::new("r");
        assert_eq!(ctx.step(), 0);
        assert_eq!(ctx.next_step(), 1);
        assert_eq!(ctx.next_step(), 2);
    }
}
