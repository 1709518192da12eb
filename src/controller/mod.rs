//! Refinement controller: the generate, execute, parse, prune, decide loop.
//!
//! Each outer iteration walks the [`State`] machine from `Generate` to
//! `Done`. Faults end the iteration, never the run; they are recorded in the
//! [`StatusReport`] and the next iteration starts from a fresh candidate. The
//! run stops early on the first confirmed failure.
//!
//! The repair sub-loop lives in `repair.rs` and the refine-until-failing flow
//! in `refine.rs`; both reuse [`RefinementController::execute`].

mod refine;
mod repair;
mod state;

pub use repair::RepairOutcome;
pub use state::{Candidate, IterationOutcome, Provenance, State};

use std::path::PathBuf;

use crate::classifier::{FailureCategory, FailureClassifier};
use crate::config::{PathsConfig, RefinementConfig, SandboxConfig};
use crate::error::{IterationFault, Result};
use crate::generation::{Exchange, GenerationService};
use crate::generator::{CandidateGenerator, IssueContext};
use crate::parser::{ExecutionResult, ResultParser};
use crate::pruner;
use crate::report::{IterationRecord, RunContext, StatusReport};
use crate::sandbox::{CandidateStager, SandboxAdapter};
use crate::search::CodeSearch;
use crate::trajectory::{StepKind, TrajectoryRecorder};

/// Per-run mutable state threaded through every transition.
pub(crate) struct Run {
    ctx: RunContext,
    recorder: TrajectoryRecorder,
    /// Summary of the last failing outer execution, for stuck detection.
    previous_summary: Option<String>,
}

/// Drives one defect through generation, execution, and refinement.
pub struct RefinementController<G, S, C> {
    generator: G,
    sandbox: S,
    search: C,
    context: IssueContext,
    stager: CandidateStager,
    config: RefinementConfig,
    trajectories_dir: PathBuf,
}

impl<G, S, C> RefinementController<G, S, C>
where
    G: GenerationService,
    S: SandboxAdapter,
    C: CodeSearch,
{
    /// Creates a controller with default loop bounds and staging layout.
    pub fn new(generator: G, sandbox: S, search: C, context: IssueContext) -> Self {
        let sandbox_config = SandboxConfig::default();
        let stager = CandidateStager::new(
            sandbox_config.staging_path(),
            &sandbox_config.test_file_name,
            &context.issue.test_file,
            context.issue.project_name(),
        );
        Self {
            generator,
            sandbox,
            search,
            context,
            stager,
            config: RefinementConfig::default(),
            trajectories_dir: PathsConfig::default().trajectories_dir,
        }
    }

    /// Sets the loop bounds.
    pub fn with_config(mut self, config: RefinementConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets where candidates are staged before each sandbox run.
    pub fn with_stager(mut self, stager: CandidateStager) -> Self {
        self.stager = stager;
        self
    }

    /// Sets the root directory for trajectory artifacts.
    pub fn with_trajectories_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trajectories_dir = dir.into();
        self
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Runs up to `max_iterations` outer iterations and returns the finalized
    /// report, also written as `status.json` in the run's trajectory directory.
    ///
    /// Only failing to set up or persist the trajectory is an error.
    pub async fn run(&self) -> Result<StatusReport> {
        let ctx = RunContext::fresh();
        let recorder = TrajectoryRecorder::create(
            &self.trajectories_dir,
            self.context.issue_id(),
            ctx.run_id(),
        )?;
        let mut run = Run {
            ctx,
            recorder,
            previous_summary: None,
        };
        let mut report = StatusReport::new(self.context.issue_id(), self.context.description());

        tracing::info!(
            issue = self.context.issue_id(),
            run_id = run.ctx.run_id(),
            max_iterations = self.config.max_iterations,
            "starting refinement run"
        );

        for iteration in 1..=self.config.max_iterations {
            let mut record = IterationRecord::new(iteration);
            let outcome = self.iterate(&mut run, &mut record).await;

            match outcome {
                Ok(IterationOutcome::Confirmed) => {
                    tracing::info!(iteration, "failure confirmed as reproducing the issue");
                    report.steps.push(record);
                    report.confirmed_at_step = Some(iteration);
                    break;
                }
                Ok(outcome) => {
                    tracing::info!(iteration, outcome = ?outcome, "iteration finished");
                    report.steps.push(record);
                }
                Err(fault) => {
                    tracing::error!(iteration, error = %fault, "iteration aborted");
                    record.error = Some(fault.to_string());
                    report.steps.push(record);
                }
            }
        }

        report.finalize(&run.ctx);
        let path = run.recorder.write_status(&report)?;
        tracing::info!(
            status = ?report.final_status,
            cost = report.calculated_cost,
            path = %path.display(),
            "refinement run finished"
        );
        Ok(report)
    }

    async fn iterate(
        &self,
        run: &mut Run,
        record: &mut IterationRecord,
    ) -> std::result::Result<IterationOutcome, IterationFault> {
        let mut state = State::Generate;
        loop {
            tracing::debug!(iteration = record.step, state = state.name(), "transition");
            state = match state {
                State::Generate => self.generate(run, record).await?,
                State::StageAndExecute(candidate) => {
                    let raw = self.run_sandbox(&candidate).await?;
                    State::Parse { candidate, raw }
                }
                State::Parse { candidate, raw } => self.parse(run, candidate, &raw).await?,
                State::Prune { candidate, result } => self.prune(run, candidate, result)?,
                State::Decide {
                    candidate,
                    result,
                    failing,
                } => State::Done(self.decide(run, record, candidate, result, failing).await?),
                State::Done(outcome) => return Ok(outcome),
            };
        }
    }

    async fn generate(
        &self,
        run: &mut Run,
        record: &mut IterationRecord,
    ) -> std::result::Result<State, IterationFault> {
        let generated = CandidateGenerator::new(&self.generator, &self.context)
            .generate()
            .await?;
        let step = self.record_exchange(run, StepKind::TestGeneration, &generated.exchange)?;
        run.recorder
            .save_candidate(step, StepKind::TestGeneration, &generated.source)?;
        record.test_case_generated = true;

        Ok(State::StageAndExecute(Candidate::new(
            generated.source,
            step,
            Provenance::Generated,
        )))
    }

    async fn run_sandbox(&self, candidate: &Candidate) -> Result<String> {
        let mapping = self.stager.stage(&candidate.source)?;
        tracing::info!(
            step = candidate.step,
            provenance = ?candidate.provenance,
            sandbox = self.sandbox.name(),
            "executing candidate"
        );
        self.sandbox.execute(&mapping, self.context.issue_id()).await
    }

    async fn parse_log(&self, run: &mut Run, raw: &str) -> Result<ExecutionResult> {
        let parsed = ResultParser::new(&self.generator)
            .parse(raw, self.stager.sandbox_path())
            .await;
        if let Some(exchange) = &parsed.exchange {
            self.record_exchange(run, StepKind::ExtractResults, exchange)?;
        }
        Ok(parsed.result)
    }

    /// Stages, executes, and parses `candidate`.
    pub(crate) async fn execute(
        &self,
        run: &mut Run,
        candidate: &Candidate,
    ) -> Result<ExecutionResult> {
        let raw = self.run_sandbox(candidate).await?;
        self.parse_log(run, &raw).await
    }

    async fn parse(
        &self,
        run: &mut Run,
        candidate: Candidate,
        raw: &str,
    ) -> std::result::Result<State, IterationFault> {
        let result = self.parse_log(run, raw).await?;
        tracing::info!(
            passed = result.passed_count(),
            failed = result.failed_count(),
            has_failures = result.has_failures,
            "execution parsed"
        );

        if result.has_failures {
            if result.summary.is_some() && run.previous_summary == result.summary {
                tracing::warn!("failing summary unchanged since the previous iteration");
            }
            run.previous_summary = result.summary.clone();
        }

        if result.is_mixed() {
            return Ok(State::Prune { candidate, result });
        }
        let failing = result.has_failures;
        Ok(State::Decide {
            candidate,
            result,
            failing,
        })
    }

    fn prune(
        &self,
        run: &mut Run,
        candidate: Candidate,
        result: ExecutionResult,
    ) -> std::result::Result<State, IterationFault> {
        let (candidate, failing) = self.drop_passing_units(run, candidate, &result)?;
        Ok(State::Decide {
            candidate,
            result,
            failing,
        })
    }

    /// Removes the passing units of a mixed run from `candidate`.
    ///
    /// Returns the candidate to carry forward and whether it still fails. When
    /// nothing testable is left the run counts as passing and the unpruned
    /// candidate is kept.
    pub(crate) fn drop_passing_units(
        &self,
        run: &mut Run,
        candidate: Candidate,
        result: &ExecutionResult,
    ) -> Result<(Candidate, bool)> {
        let pruned = pruner::prune(&candidate.source, &result.tests)?;
        let step = run.ctx.next_step();
        run.recorder
            .save_candidate(step, StepKind::TestRemoval, &pruned.source)?;
        tracing::info!(
            removed = ?pruned.removed,
            remaining = pruned.remaining_units.len(),
            "pruned passing units"
        );

        if !pruned.has_units() {
            tracing::warn!("pruning left no test units, treating run as passing");
            return Ok((candidate, false));
        }
        Ok((Candidate::new(pruned.source, step, Provenance::Pruned), true))
    }

    async fn decide(
        &self,
        run: &mut Run,
        record: &mut IterationRecord,
        candidate: Candidate,
        result: ExecutionResult,
        failing: bool,
    ) -> std::result::Result<IterationOutcome, IterationFault> {
        if !failing {
            return self.refine_until_failing(run, record, candidate).await;
        }

        let classifier = FailureClassifier::new(&self.generator);
        let verdict = classifier.classify(&result.raw, &candidate.source).await;
        self.record_verdict(run, StepKind::ErrorCategorization, verdict.exchange.as_ref())?;
        let classification = verdict.value;

        match classification.category {
            FailureCategory::Compilation | FailureCategory::Runtime => {
                let outcome = self
                    .repair(run, candidate, &result.raw, classification)
                    .await?;
                record.compilation_error = Some(!outcome.fixed);
                record.compilation_fix = Some(outcome.candidate.source.clone());

                if !outcome.fixed {
                    return Ok(IterationOutcome::Abandoned);
                }
                if outcome.related {
                    return Ok(IterationOutcome::Confirmed);
                }
                self.refine_until_failing(run, record, outcome.candidate).await
            }
            FailureCategory::Assertion => {
                if self.is_direct_match(run, &result.raw, &candidate.source).await? {
                    return Ok(IterationOutcome::Confirmed);
                }
                self.refine_until_failing(run, record, candidate).await
            }
            FailureCategory::Unknown => {
                tracing::warn!(
                    reason = %classification.reason,
                    "unclassified failure, abandoning candidate"
                );
                record.test_failures = Some(true);
                Ok(IterationOutcome::Abandoned)
            }
        }
    }

    /// Asks whether an assertion failure reproduces the issue.
    pub(crate) async fn is_direct_match(
        &self,
        run: &mut Run,
        log: &str,
        candidate: &str,
    ) -> Result<bool> {
        let verdict = FailureClassifier::new(&self.generator)
            .classify_relevance(
                log,
                self.context.issue_id(),
                self.context.description(),
                candidate,
            )
            .await;
        self.record_verdict(run, StepKind::CheckAssertion, verdict.exchange.as_ref())?;
        Ok(verdict.value.is_direct_match)
    }

    /// Persists a model call under a new trajectory step and adds its cost.
    pub(crate) fn record_exchange(
        &self,
        run: &mut Run,
        kind: StepKind,
        exchange: &Exchange,
    ) -> Result<u32> {
        let step = run.ctx.next_step();
        run.ctx.add_usage(&exchange.response);
        run.recorder.record_exchange(step, kind, exchange)?;
        Ok(step)
    }

    pub(crate) fn record_verdict(
        &self,
        run: &mut Run,
        kind: StepKind,
        exchange: Option<&Exchange>,
    ) -> Result<()> {
        if let Some(exchange) = exchange {
            self.record_exchange(run, kind, exchange)?;
        }
        Ok(())
    }
}
