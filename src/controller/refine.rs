//! Refine-until-failing: turn a passing candidate into one that fails on the
//! defect.
//!
//! Each refined run is parsed and, when mixed, pruned exactly like an outer
//! execution before it is classified.

use crate::classifier::{FailureCategory, FailureClassifier};
use crate::error::IterationFault;
use crate::generation::GenerationService;
use crate::generator::CandidateGenerator;
use crate::report::IterationRecord;
use crate::sandbox::SandboxAdapter;
use crate::search::CodeSearch;
use crate::trajectory::StepKind;

use super::{Candidate, IterationOutcome, Provenance, RefinementController, Run};

impl<G, S, C> RefinementController<G, S, C>
where
    G: GenerationService,
    S: SandboxAdapter,
    C: CodeSearch,
{
    pub(crate) async fn refine_until_failing(
        &self,
        run: &mut Run,
        record: &mut IterationRecord,
        candidate: Candidate,
    ) -> Result<IterationOutcome, IterationFault> {
        let generator = CandidateGenerator::new(&self.generator, &self.context);
        let classifier = FailureClassifier::new(&self.generator);
        let mut current = candidate;

        for attempt in 1..=self.config.max_refinements {
            tracing::info!(
                attempt,
                limit = self.config.max_refinements,
                from_step = current.step,
                "refining candidate"
            );

            let refined = generator.refine(&current.source).await?;
            let step = self.record_exchange(run, StepKind::TestRefinement, &refined.exchange)?;
            run.recorder
                .save_candidate(step, StepKind::TestRefinement, &refined.source)?;
            let refined = Candidate::new(refined.source, step, Provenance::Refined);

            let result = self.execute(run, &refined).await?;
            let (candidate, failing) = if result.is_mixed() {
                self.drop_passing_units(run, refined, &result)?
            } else {
                (refined, result.has_failures)
            };
            current = candidate;
            if !failing {
                tracing::info!(attempt, "refined candidate still passes");
                continue;
            }
            record.test_failures = Some(true);

            let verdict = classifier.classify(&result.raw, &current.source).await;
            self.record_verdict(run, StepKind::ErrorCategorization, verdict.exchange.as_ref())?;

            match verdict.value.category {
                FailureCategory::Compilation | FailureCategory::Runtime => {
                    let outcome = self
                        .repair(run, current, &result.raw, verdict.value)
                        .await?;
                    record.compilation_error = Some(!outcome.fixed);
                    record.compilation_fix = Some(outcome.candidate.source.clone());

                    if outcome.related {
                        return Ok(IterationOutcome::Confirmed);
                    }
                    if !outcome.fixed {
                        return Ok(IterationOutcome::Abandoned);
                    }
                    current = outcome.candidate;
                }
                FailureCategory::Assertion => {
                    if self
                        .is_direct_match(run, &result.raw, &current.source)
                        .await?
                    {
                        return Ok(IterationOutcome::Confirmed);
                    }
                }
                FailureCategory::Unknown => {
                    tracing::warn!("unclassified failure during refinement, abandoning candidate");
                    return Ok(IterationOutcome::Abandoned);
                }
            }
        }

        record.test_failures = Some(false);
        Ok(IterationOutcome::Exhausted)
    }
}
