//! Integration tests for whole refinement runs.
//!
//! Generation and sandbox are scripted, so these run without any CLI or
//! container, suitable for CI.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use regression_refiner::config::RefinementConfig;
use regression_refiner::generation::{GenerationRequest, GenerationResponse, GenerationStats};
use regression_refiner::{
    CandidateStager, CodeSearch, Error, FinalStatus, GenerationService, Issue, IssueContext,
    PathMapping, RefinementController, Result, SandboxAdapter, SearchReport, StatusReport,
};

const GENERATED: &str = "from pkg.math import add\n\n\ndef test_negative():\n    assert add(-1, 1) == 0\n\n\ndef test_positive():\n    assert add(1, 1) == 2\n";

const REPAIRED: &str = "from pkg.math import add\n\n\ndef test_negative():\n    assert add(-1, 1) == 0\n";

const REFINED: &str = "from pkg.math import add\n\n\ndef test_negative_sum():\n    assert add(-2, -3) == -5\n";

const REFINED_PAIR: &str = "from pkg.math import add\n\n\ndef test_negative_sum():\n    assert add(-2, -3) == -5\n\n\ndef test_positive_sum():\n    assert add(2, 3) == 5\n";

const UNPARSEABLE: &str = "from pkg.math import add\n\n\ndef test_negative(:\n    assert add(-1, 1) == 0\n";

const PASS_LOG: &str = "\
============================= test session starts ==============================
collected 1 item

tests/test_new.py .                                                      [100%]

=========================== short test summary info ============================
PASSED tests/test_new.py::test_negative
============================== 1 passed in 0.01s ===============================
";

const ASSERTION_LOG: &str = "\
============================= test session starts ==============================
collected 1 item

tests/test_new.py F                                                      [100%]

E       AssertionError: negatives dropped

=========================== short test summary info ============================
FAILED tests/test_new.py::test_negative - AssertionError: negatives dropped
============================== 1 failed in 0.02s ===============================
";

const MIXED_LOG: &str = "\
============================= test session starts ==============================
collected 2 items

tests/test_new.py F.                                                     [100%]

=========================== short test summary info ============================
FAILED tests/test_new.py::test_negative - AssertionError: negatives dropped
PASSED tests/test_new.py::test_positive
========================= 1 failed, 1 passed in 0.02s ==========================
";

/// Mixed run whose only failure names a unit the candidate does not define.
const STRAY_FAILURE_LOG: &str = "\
=========================== short test summary info ============================
FAILED tests/test_new.py::test_stray - assert 1 == 2
PASSED tests/test_new.py::test_negative
PASSED tests/test_new.py::test_positive
========================= 1 failed, 2 passed in 0.02s ==========================
";

const REFINED_MIXED_LOG: &str = "\
=========================== short test summary info ============================
FAILED tests/test_new.py::test_negative_sum - assert 5 == -5
PASSED tests/test_new.py::test_positive_sum
========================= 1 failed, 1 passed in 0.02s ==========================
";

const COMPILE_LOG: &str = "\
==================================== ERRORS ====================================
______________________ ERROR collecting tests/test_new.py ______________________
tests/test_new.py:1: in <module>
    from pkg.mystery import Thing
E   ModuleNotFoundError: No module named 'pkg.mystery'
=========================== short test summary info ============================
ERROR tests/test_new.py
=============================== 1 error in 0.10s ===============================
";

const RUNTIME_LOG: &str = "\
============================= test session starts ==============================
collected 1 item

tests/test_new.py F                                                      [100%]

E       TypeError: unsupported operand type(s) for +: 'int' and 'NoneType'

=========================== short test summary info ============================
FAILED tests/test_new.py::test_negative - TypeError: unsupported operand
============================== 1 failed in 0.02s ===============================
";

const PASSING_EXTRACTION: &str = "```json\n{\"test_file\": \"tests/test_new.py\", \"tests\": [{\"name\": \"tests/test_new.py::test_negative\", \"outcome\": \"PASSED\"}], \"summary\": \"1 passed\"}\n```";

fn category(label: &str) -> String {
    format!(
        "```json\n{{\"error_type\": \"{}\", \"reason\": \"r\", \"root_cause\": \"c\", \"repair_steps\": \"s\"}}\n```",
        label
    )
}

fn related_runtime() -> String {
    "```json\n{\"error_type\": \"runtime\", \"reason\": \"r\", \"root_cause\": \"c\", \"repair_steps\": \"s\", \"issue_error_relevance\": \"yes\"}\n```".to_string()
}

fn relevance(direct: bool) -> String {
    format!(
        "```json\n{{\"is_direct_match\": \"{}\", \"reason\": \"r\"}}\n```",
        if direct { "yes" } else { "no" }
    )
}

fn python(source: &str) -> String {
    format!("```python\n{}```", source)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Generate,
    Repair,
    ImportRepair,
    Refine,
    Categorize,
    Relevance,
    Extract,
}

fn call_kind(user: &str) -> Call {
    if user.starts_with("## Regression Test Request") {
        Call::Generate
    } else if user.starts_with("## Import Repair Request") {
        Call::ImportRepair
    } else if user.starts_with("## Test Repair Request") {
        Call::Repair
    } else if user.starts_with("## Test Refinement Request") {
        Call::Refine
    } else if user.starts_with("## Failure Categorization Request") {
        Call::Categorize
    } else if user.starts_with("## Assertion Relevance Check") {
        Call::Relevance
    } else {
        Call::Extract
    }
}

/// Generation service answering each prompt kind from its own queue.
#[derive(Default)]
struct ScriptedGenerator {
    generations: Mutex<VecDeque<String>>,
    repairs: Mutex<VecDeque<String>>,
    refinements: Mutex<VecDeque<String>>,
    categories: Mutex<VecDeque<String>>,
    relevance: Mutex<VecDeque<String>>,
    default_category: String,
    calls: Mutex<Vec<(Call, String)>>,
}

impl ScriptedGenerator {
    fn new() -> Self {
        Self::default()
    }

    fn with_generations(self, sources: &[&str]) -> Self {
        *self.generations.lock().unwrap() = sources.iter().map(|s| python(s)).collect();
        self
    }

    fn with_repairs(self, sources: &[&str]) -> Self {
        *self.repairs.lock().unwrap() = sources.iter().map(|s| python(s)).collect();
        self
    }

    fn with_refinements(self, sources: &[&str]) -> Self {
        *self.refinements.lock().unwrap() = sources.iter().map(|s| python(s)).collect();
        self
    }

    fn with_categories(self, responses: Vec<String>) -> Self {
        *self.categories.lock().unwrap() = responses.into();
        self
    }

    fn with_default_category(mut self, response: String) -> Self {
        self.default_category = response;
        self
    }

    fn with_relevance(self, responses: Vec<String>) -> Self {
        *self.relevance.lock().unwrap() = responses.into();
        self
    }

    fn count(&self, kind: Call) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    fn prompts(&self, kind: Call) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, user)| user.clone())
            .collect()
    }

    fn pop(queue: &Mutex<VecDeque<String>>, default: String) -> String {
        queue.lock().unwrap().pop_front().unwrap_or(default)
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let kind = call_kind(&request.user);
        self.calls
            .lock()
            .unwrap()
            .push((kind, request.user.clone()));

        let text = match kind {
            Call::Generate => Self::pop(&self.generations, python(GENERATED)),
            Call::Repair | Call::ImportRepair => Self::pop(&self.repairs, python(REPAIRED)),
            Call::Refine => Self::pop(&self.refinements, python(REFINED)),
            Call::Categorize => Self::pop(&self.categories, self.default_category.clone()),
            Call::Relevance => Self::pop(&self.relevance, relevance(false)),
            Call::Extract if request.user.contains("passed in") => PASSING_EXTRACTION.to_string(),
            Call::Extract => "I could not find any results.".to_string(),
        };

        Ok(GenerationResponse {
            text,
            prompt_tokens: 100,
            completion_tokens: 10,
            stats: GenerationStats {
                calculated_cost: 0.01,
                reported_cost: 0.02,
                ..GenerationStats::default()
            },
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Sandbox replaying canned console logs and remembering what was staged.
struct ScriptedSandbox {
    logs: Mutex<VecDeque<&'static str>>,
    fallback: Option<&'static str>,
    staged: Mutex<Vec<String>>,
}

impl ScriptedSandbox {
    fn new(logs: &[&'static str]) -> Self {
        Self {
            logs: Mutex::new(logs.iter().copied().collect()),
            fallback: None,
            staged: Mutex::new(Vec::new()),
        }
    }

    fn then_always(mut self, log: &'static str) -> Self {
        self.fallback = Some(log);
        self
    }
}

#[async_trait]
impl SandboxAdapter for ScriptedSandbox {
    async fn execute(&self, mapping: &PathMapping, run_id: &str) -> Result<String> {
        assert_eq!(run_id, "pkg__pkg-42");
        let pair = &mapping.pairs()[0];
        assert_eq!(pair.sandbox, "tests/test_new.py");
        self.staged
            .lock()
            .unwrap()
            .push(std::fs::read_to_string(&pair.host)?);

        let next = self.logs.lock().unwrap().pop_front().or(self.fallback);
        next.map(str::to_string)
            .ok_or_else(|| Error::Sandbox("container exited with status 125".to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct RecordingSearch {
    symbols: Mutex<Vec<String>>,
}

#[async_trait]
impl CodeSearch for RecordingSearch {
    async fn import_usages(&self, symbol: &str) -> Result<SearchReport> {
        self.symbols.lock().unwrap().push(symbol.to_string());
        Ok(SearchReport::render(symbol, Vec::new()))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn context() -> IssueContext {
    IssueContext {
        issue: Issue {
            instance_id: "pkg__pkg-42".to_string(),
            problem_statement: "add() drops negative operands".to_string(),
            hints_text: String::new(),
            project: "pkg".to_string(),
            source_file: "pkg/math.py".to_string(),
            test_file: "tests/test_math.py".to_string(),
        },
        repo_root: PathBuf::from("/repo"),
        numbered_source: "1: def add(a, b):\n2:     return abs(a) + abs(b)\n".to_string(),
        numbered_test: "No existing test file found.".to_string(),
    }
}

fn limits(max_iterations: u32, retry_limit: u32, max_refinements: u32) -> RefinementConfig {
    RefinementConfig {
        max_iterations,
        retry_limit,
        max_refinements,
    }
}

async fn run(
    dir: &TempDir,
    generator: &ScriptedGenerator,
    sandbox: &ScriptedSandbox,
    search: &RecordingSearch,
    config: RefinementConfig,
) -> StatusReport {
    let stager = CandidateStager::new(
        dir.path().join("staging"),
        "test_new.py",
        "tests/test_math.py",
        "pkg",
    );
    RefinementController::new(generator, sandbox, search, context())
        .with_config(config)
        .with_stager(stager)
        .with_trajectories_dir(dir.path().join("trajectories"))
        .run()
        .await
        .expect("run should produce a report")
}

/// The single run directory under `trajectories/<issue_id>`.
fn run_dir(dir: &TempDir) -> PathBuf {
    let issue_dir = dir.path().join("trajectories").join("pkg__pkg-42");
    let mut runs: Vec<PathBuf> = std::fs::read_dir(issue_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(runs.len(), 1);
    runs.remove(0)
}

fn step_dirs(run_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(run_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("step_"))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn assertion_failure_confirmed_on_first_iteration() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new()
        .with_categories(vec![category("assertion")])
        .with_relevance(vec![relevance(true)]);
    let sandbox = ScriptedSandbox::new(&[ASSERTION_LOG]);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(5, 3, 3)).await;

    assert_eq!(report.final_status, FinalStatus::Success);
    assert_eq!(report.confirmed_at_step, Some(1));
    assert_eq!(report.steps.len(), 1);
    assert!(report.steps[0].test_case_generated);
    assert_eq!(generator.count(Call::Generate), 1);
    assert_eq!(generator.count(Call::Extract), 0);

    let run_dir = run_dir(&dir);
    assert_eq!(
        step_dirs(&run_dir),
        vec![
            "step_1-test-gen",
            "step_2-error_categorization",
            "step_3-check_assertion"
        ]
    );
    let metadata = std::fs::read_to_string(run_dir.join("step_1-test-gen/metadata.txt")).unwrap();
    assert_eq!(metadata, "Input Tokens: 100\nResponse Tokens: 10");
    assert!(run_dir.join("step_1-test-gen/step_1.py").exists());

    let status: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("status.json")).unwrap())
            .unwrap();
    assert_eq!(status["final_status"], "Success");
    assert_eq!(status["github_issue_id"], "pkg__pkg-42");
}

#[tokio::test]
async fn mixed_outcomes_prune_passing_units_before_deciding() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new()
        .with_categories(vec![category("assertion")])
        .with_relevance(vec![relevance(true)]);
    let sandbox = ScriptedSandbox::new(&[MIXED_LOG]);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(5, 3, 3)).await;
    assert!(report.is_success());

    let categorize = generator.prompts(Call::Categorize);
    assert_eq!(categorize.len(), 1);
    assert!(categorize[0].contains("def test_negative"));
    assert!(!categorize[0].contains("def test_positive"));

    let run_dir = run_dir(&dir);
    let removal = step_dirs(&run_dir)
        .into_iter()
        .find(|name| name.ends_with("-test-removal"))
        .expect("pruned candidate saved");
    let step = removal
        .trim_start_matches("step_")
        .trim_end_matches("-test-removal")
        .to_string();
    let pruned =
        std::fs::read_to_string(run_dir.join(&removal).join(format!("step_{}.py", step))).unwrap();
    assert!(pruned.starts_with("from pkg.math import add\n"));
    assert!(pruned.contains("def test_negative():"));
    assert!(!pruned.contains("test_positive"));
}

#[tokio::test]
async fn pruning_every_unit_refines_the_unpruned_candidate() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new()
        .with_categories(vec![category("assertion")])
        .with_relevance(vec![relevance(true)]);
    let sandbox = ScriptedSandbox::new(&[STRAY_FAILURE_LOG, ASSERTION_LOG]);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(5, 3, 3)).await;

    assert!(report.is_success());
    assert_eq!(report.confirmed_at_step, Some(1));
    assert_eq!(report.steps[0].test_failures, Some(true));

    let refine = generator.prompts(Call::Refine);
    assert_eq!(refine.len(), 1);
    assert!(refine[0].contains("def test_negative():"));
    assert!(refine[0].contains("def test_positive():"));

    // Only the refined run is classified.
    let categorize = generator.prompts(Call::Categorize);
    assert_eq!(categorize.len(), 1);
    assert!(categorize[0].contains("def test_negative_sum"));

    let steps = step_dirs(&run_dir(&dir));
    assert!(steps.iter().any(|name| name.ends_with("-test-removal")));
}

#[tokio::test]
async fn unparseable_mixed_candidate_faults_the_iteration() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new()
        .with_generations(&[UNPARSEABLE])
        .with_categories(vec![category("assertion")])
        .with_relevance(vec![relevance(true)]);
    let sandbox = ScriptedSandbox::new(&[MIXED_LOG, ASSERTION_LOG]);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(3, 3, 3)).await;

    assert_eq!(report.steps.len(), 2);
    let error = report.steps[0].error.as_deref().expect("fault recorded");
    assert!(error.contains("structural fault"), "unexpected error: {}", error);
    assert!(report.steps[0].test_failures.is_none());

    assert_eq!(report.confirmed_at_step, Some(2));
    assert!(report.is_success());
    assert_eq!(generator.count(Call::Generate), 2);
    assert_eq!(generator.count(Call::Categorize), 1);
}

#[tokio::test]
async fn mixed_refined_run_is_pruned_before_classification() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new()
        .with_refinements(&[REFINED_PAIR])
        .with_categories(vec![category("assertion")])
        .with_relevance(vec![relevance(true)]);
    let sandbox = ScriptedSandbox::new(&[PASS_LOG, REFINED_MIXED_LOG]);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(5, 3, 3)).await;

    assert!(report.is_success());
    assert_eq!(report.confirmed_at_step, Some(1));

    let categorize = generator.prompts(Call::Categorize);
    assert_eq!(categorize.len(), 1);
    assert!(categorize[0].contains("def test_negative_sum"));
    assert!(!categorize[0].contains("def test_positive_sum"));

    let relevance = generator.prompts(Call::Relevance);
    assert_eq!(relevance.len(), 1);
    assert!(!relevance[0].contains("def test_positive_sum"));

    let steps = step_dirs(&run_dir(&dir));
    assert!(steps.iter().any(|name| name.ends_with("-test-removal")));
}

#[tokio::test]
async fn compilation_repair_exhaustion_abandons_candidate() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new().with_default_category(category("compilation"));
    let sandbox = ScriptedSandbox::new(&[]).then_always(COMPILE_LOG);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(2, 3, 3)).await;

    assert_eq!(report.final_status, FinalStatus::Failed);
    assert_eq!(report.steps.len(), 2);
    for record in &report.steps {
        assert!(record.test_case_generated);
        assert_eq!(record.compilation_error, Some(true));
        assert!(record.compilation_fix.is_some());
        assert!(record.error.is_none());
    }

    assert_eq!(generator.count(Call::Generate), 2);
    assert_eq!(generator.count(Call::ImportRepair), 6);
    assert_eq!(generator.count(Call::Repair), 0);
    assert_eq!(generator.count(Call::Refine), 0);

    let symbols = search.symbols.lock().unwrap();
    assert_eq!(symbols.len(), 6);
    assert!(symbols.iter().all(|s| s == "Thing"));
    assert!(generator.prompts(Call::ImportRepair)[0]
        .contains("No imports or aliases for 'Thing' found."));
}

#[tokio::test]
async fn related_runtime_failure_after_repair_is_confirmed() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new()
        .with_categories(vec![category("compilation"), related_runtime()])
        .with_repairs(&[REPAIRED]);
    let sandbox = ScriptedSandbox::new(&[COMPILE_LOG, RUNTIME_LOG]);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(5, 3, 3)).await;

    assert!(report.is_success());
    assert_eq!(report.confirmed_at_step, Some(1));
    let record = &report.steps[0];
    assert_eq!(record.compilation_error, Some(false));
    assert_eq!(record.compilation_fix.as_deref(), Some(REPAIRED.trim_end()));

    let staged = sandbox.staged.lock().unwrap();
    assert_eq!(staged.len(), 2);
    assert_eq!(staged[1], REPAIRED.trim_end());
}

#[tokio::test]
async fn passing_candidates_exhaust_refinement_without_flags() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new();
    let sandbox = ScriptedSandbox::new(&[]).then_always(PASS_LOG);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(2, 3, 2)).await;

    assert_eq!(report.final_status, FinalStatus::Success);
    assert_eq!(report.confirmed_at_step, None);
    assert_eq!(report.steps.len(), 2);
    assert!(report
        .steps
        .iter()
        .all(|record| record.test_failures == Some(false)));

    assert_eq!(generator.count(Call::Generate), 2);
    assert_eq!(generator.count(Call::Refine), 4);
    assert_eq!(generator.count(Call::Categorize), 0);
    // Each passing run goes through model extraction: 2 generated + 4 refined.
    assert_eq!(generator.count(Call::Extract), 6);

    let refine_prompt = &generator.prompts(Call::Refine)[1];
    assert!(refine_prompt.contains("def test_negative_sum"));
}

#[tokio::test]
async fn refinement_turns_passing_test_into_confirmed_failure() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new()
        .with_refinements(&[REFINED])
        .with_categories(vec![category("assertion")])
        .with_relevance(vec![relevance(true)]);
    let sandbox = ScriptedSandbox::new(&[PASS_LOG, ASSERTION_LOG]);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(5, 3, 3)).await;

    assert!(report.is_success());
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].test_failures, Some(true));
    assert_eq!(generator.count(Call::Refine), 1);

    let staged = sandbox.staged.lock().unwrap();
    assert_eq!(staged[1], REFINED.trim_end());
}

#[tokio::test]
async fn unclassified_failure_is_abandoned_for_fresh_generation() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new()
        .with_default_category("```json\n{\"reason\": \"unclear\"}\n```".to_string());
    let sandbox = ScriptedSandbox::new(&[]).then_always(ASSERTION_LOG);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(2, 3, 3)).await;

    assert_eq!(report.final_status, FinalStatus::Failed);
    assert_eq!(report.steps.len(), 2);
    assert!(report
        .steps
        .iter()
        .all(|record| record.test_failures == Some(true) && record.compilation_error.is_none()));

    assert_eq!(generator.count(Call::Generate), 2);
    assert_eq!(generator.count(Call::Repair), 0);
    assert_eq!(generator.count(Call::ImportRepair), 0);
    assert_eq!(generator.count(Call::Refine), 0);
    assert_eq!(generator.count(Call::Relevance), 0);
}

#[tokio::test]
async fn unrelated_assertion_falls_back_to_refinement() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new()
        .with_categories(vec![category("assertion"), category("assertion")])
        .with_relevance(vec![relevance(false), relevance(true)]);
    let sandbox = ScriptedSandbox::new(&[ASSERTION_LOG, ASSERTION_LOG]);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(5, 3, 3)).await;

    assert!(report.is_success());
    assert_eq!(generator.count(Call::Relevance), 2);
    assert_eq!(generator.count(Call::Refine), 1);
}

#[tokio::test]
async fn sandbox_faults_are_recorded_and_the_loop_continues() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new();
    let sandbox = ScriptedSandbox::new(&[]);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(3, 3, 3)).await;

    assert_eq!(report.steps.len(), 3);
    for (idx, record) in report.steps.iter().enumerate() {
        assert_eq!(record.step, idx as u32 + 1);
        assert!(record.test_case_generated);
        let error = record.error.as_deref().expect("fault recorded");
        assert!(error.contains("sandbox fault"), "unexpected error: {}", error);
    }
    assert_eq!(generator.count(Call::Generate), 3);
}

#[tokio::test]
async fn run_accumulates_cost_across_model_calls() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new()
        .with_categories(vec![category("assertion")])
        .with_relevance(vec![relevance(true)]);
    let sandbox = ScriptedSandbox::new(&[ASSERTION_LOG]);
    let search = RecordingSearch::default();

    let report = run(&dir, &generator, &sandbox, &search, limits(5, 3, 3)).await;

    // generate + categorize + relevance
    assert!((report.calculated_cost - 0.03).abs() < 1e-9);
    assert!((report.reported_cost - 0.06).abs() < 1e-9);
}
