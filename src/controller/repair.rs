//! Compilation/runtime repair sub-loop.

use crate::classifier::{FailureCategory, FailureClassification, FailureClassifier};
use crate::error::IterationFault;
use crate::generation::GenerationService;
use crate::generator::CandidateGenerator;
use crate::parser::{analyze_log, first_module_not_found};
use crate::prompts::RepairPrompt;
use crate::sandbox::SandboxAdapter;
use crate::search::{primary_symbol, CodeSearch};
use crate::trajectory::StepKind;

use super::{Candidate, Provenance, RefinementController, Run};

/// Result of the repair sub-loop.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    /// The last repaired candidate no longer fails to import or run.
    pub fixed: bool,
    /// The remaining failure was judged to reproduce the issue.
    pub related: bool,
    /// Last candidate produced, fixed or not.
    pub candidate: Candidate,
}

impl<G, S, C> RefinementController<G, S, C>
where
    G: GenerationService,
    S: SandboxAdapter,
    C: CodeSearch,
{
    /// Repairs `candidate` for up to `retry_limit` attempts.
    ///
    /// Each attempt asks for a fixed test, runs it, and re-classifies any
    /// remaining failure. A missing module with a known symbol grounds the
    /// repair prompt in real import sites from the repository.
    pub(crate) async fn repair(
        &self,
        run: &mut Run,
        candidate: Candidate,
        log: &str,
        classification: FailureClassification,
    ) -> Result<RepairOutcome, IterationFault> {
        let generator = CandidateGenerator::new(&self.generator, &self.context);
        let classifier = FailureClassifier::new(&self.generator);

        let mut candidate = candidate;
        let mut log = log.to_string();
        let mut classification = classification;

        for attempt in 1..=self.config.retry_limit {
            tracing::info!(
                attempt,
                limit = self.config.retry_limit,
                category = ?classification.category,
                "repairing candidate"
            );

            let mut prompt = RepairPrompt::new(
                self.context.description(),
                &log,
                &candidate.source,
                classification,
            );
            if let Some(context) = self.import_context(&log).await {
                prompt = prompt.with_import_context(context);
            }

            let repaired = generator.repair(prompt).await?;
            let step = self.record_exchange(run, StepKind::ErrorFix, &repaired.exchange)?;
            run.recorder
                .save_candidate(step, StepKind::ErrorFix, &repaired.source)?;
            candidate = Candidate::new(repaired.source, step, Provenance::Repaired);

            let result = self.execute(run, &candidate).await?;
            if !result.has_failures {
                tracing::info!(attempt, "repaired candidate runs cleanly");
                return Ok(RepairOutcome {
                    fixed: true,
                    related: false,
                    candidate,
                });
            }

            let verdict = classifier
                .classify_after_repair(&result.raw, &candidate.source, self.context.description())
                .await;
            self.record_verdict(run, StepKind::ErrorCategorization, verdict.exchange.as_ref())?;

            if verdict.value.is_related_runtime() {
                return Ok(RepairOutcome {
                    fixed: true,
                    related: true,
                    candidate,
                });
            }
            if verdict.value.category == FailureCategory::Assertion {
                let related = self
                    .is_direct_match(run, &result.raw, &candidate.source)
                    .await?;
                return Ok(RepairOutcome {
                    fixed: true,
                    related,
                    candidate,
                });
            }

            log = result.raw;
            classification = verdict.value;
        }

        tracing::warn!(
            limit = self.config.retry_limit,
            "repair attempts exhausted, abandoning candidate"
        );
        Ok(RepairOutcome {
            fixed: false,
            related: false,
            candidate,
        })
    }

    /// Import usages of the symbol behind the first missing module, if any.
    async fn import_context(&self, log: &str) -> Option<String> {
        let analysis = analyze_log(log);
        let (module, symbol) = first_module_not_found(&analysis.errors)?;
        let symbol = symbol?;
        let symbol = primary_symbol(&symbol)?;

        match self.search.import_usages(symbol).await {
            Ok(report) => {
                tracing::info!(module = %module, symbol, found = report.found, "import analysis");
                Some(report.output)
            }
            Err(e) => {
                tracing::warn!(error = %e, symbol, "import search failed, using plain repair");
                None
            }
        }
    }
}
