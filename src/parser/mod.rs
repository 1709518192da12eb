//! Result parsing: raw sandbox console output into structured outcomes.
//!
//! Parsing is deterministic first: the pytest "short test summary info" block
//! is scanned for `OUTCOME name` pairs. When that finds no FAILED outcome, the
//! raw log goes to the generation service with an extraction prompt. Output
//! the model cannot turn into the expected JSON shape is treated as a failing
//! run with no outcomes.

mod errors;
mod summary;

pub use errors::{
    analyze_log, detect_outcome, extract_error_detail, first_module_not_found, ErrorDetail,
    ErrorKind, LogAnalysis,
};
pub use summary::{clean_line, contains_error_markers, summary_section, SummarySection};

use serde::{Deserialize, Serialize};

use crate::extract::extract_code_block;
use crate::generation::{exchange, Exchange, GenerationService};
use crate::prompts::ExtractResultsPrompt;

/// Outcome of a single test unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Passed,
    Failed,
    Error,
    Skipped,
}

impl Outcome {
    /// Parses the uppercase label pytest prints.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "PASSED" => Some(Outcome::Passed),
            "FAILED" => Some(Outcome::Failed),
            "ERROR" => Some(Outcome::Error),
            "SKIPPED" => Some(Outcome::Skipped),
            _ => None,
        }
    }

    /// FAILED or ERROR.
    pub fn is_failure(self) -> bool {
        matches!(self, Outcome::Failed | Outcome::Error)
    }
}

/// One test unit and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub outcome: Outcome,
}

impl TestOutcome {
    /// Function or method a pytest node id refers to
    /// (`file.py::Class::test[1-a]` -> `test`). Parametrization ids are dropped
    /// so every parameter of one function shares a name.
    pub fn unit_name(&self) -> &str {
        let id = match self.name.find('[') {
            Some(open) if self.name.ends_with(']') => &self.name[..open],
            _ => self.name.as_str(),
        };
        id.rsplit("::").next().unwrap_or(id)
    }
}

/// Structured view of one sandbox run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub test_file: String,
    pub tests: Vec<TestOutcome>,
    pub summary: Option<String>,
    pub has_failures: bool,
    #[serde(skip)]
    pub raw: String,
}

impl ExecutionResult {
    /// Outcome entries equal to `outcome`.
    pub fn with_outcome(&self, outcome: Outcome) -> impl Iterator<Item = &TestOutcome> {
        self.tests.iter().filter(move |t| t.outcome == outcome)
    }

    pub fn failed_count(&self) -> usize {
        self.with_outcome(Outcome::Failed).count()
    }

    pub fn passed_count(&self) -> usize {
        self.with_outcome(Outcome::Passed).count()
    }

    /// True when the run has both PASSED and FAILED units, i.e. pruning applies.
    pub fn is_mixed(&self) -> bool {
        self.passed_count() > 0 && self.failed_count() > 0
    }

    /// Fail-safe result for output nothing could interpret.
    pub fn assume_failure(raw: &str, test_file: &str) -> Self {
        Self {
            test_file: test_file.to_string(),
            tests: Vec::new(),
            summary: None,
            has_failures: true,
            raw: raw.to_string(),
        }
    }
}

/// Computes the failure flag from outcomes, falling back to generic error
/// markers when no outcome was found.
fn failure_flag(tests: &[TestOutcome], raw: &str) -> bool {
    tests.iter().any(|t| t.outcome.is_failure())
        || (tests.is_empty() && contains_error_markers(raw))
}

/// Deterministic parse of the pytest summary block.
pub fn parse_summary(raw: &str, test_file: &str) -> ExecutionResult {
    let section = summary_section(raw);
    ExecutionResult {
        test_file: test_file.to_string(),
        has_failures: failure_flag(&section.outcomes, raw),
        tests: section.outcomes,
        summary: section.text,
        raw: raw.to_string(),
    }
}

/// Shape the extraction prompt asks the model to return.
#[derive(Debug, Deserialize)]
struct ExtractedResults {
    #[serde(default)]
    test_file: Option<String>,
    tests: Vec<TestOutcome>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    has_failures: Option<bool>,
}

/// Interprets the model's extraction response against `raw`.
pub fn interpret_extraction(response: &str, raw: &str, test_file: &str) -> ExecutionResult {
    let block = extract_code_block(response);
    let json = if block.trim().is_empty() {
        response.trim()
    } else {
        block.trim()
    };

    if json.is_empty() {
        tracing::error!(test_file, "model returned no extractable results");
        return ExecutionResult::assume_failure(raw, test_file);
    }

    match serde_json::from_str::<ExtractedResults>(json) {
        Ok(extracted) => ExecutionResult {
            test_file: extracted
                .test_file
                .unwrap_or_else(|| test_file.to_string()),
            has_failures: extracted.has_failures.unwrap_or(false)
                || failure_flag(&extracted.tests, raw),
            tests: extracted.tests,
            summary: extracted.summary,
            raw: raw.to_string(),
        },
        Err(e) => {
            tracing::error!(test_file, error = %e, "model results failed validation");
            ExecutionResult::assume_failure(raw, test_file)
        }
    }
}

/// Parsed result plus the model call made for the fallback, if one was.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub result: ExecutionResult,
    pub exchange: Option<Exchange>,
}

/// Parses sandbox output, consulting the generation service when the
/// deterministic pass finds no FAILED outcome.
pub struct ResultParser<'a, G: ?Sized> {
    generator: &'a G,
}

impl<'a, G: GenerationService + ?Sized> ResultParser<'a, G> {
    pub fn new(generator: &'a G) -> Self {
        Self { generator }
    }

    /// Parses `raw` into an [`ExecutionResult`]. Never fails.
    pub async fn parse(&self, raw: &str, test_file: &str) -> ParseOutcome {
        let result = parse_summary(raw, test_file);
        if result.failed_count() > 0 {
            return ParseOutcome {
                result,
                exchange: None,
            };
        }

        tracing::warn!(
            outcomes = result.tests.len(),
            "summary parsing found no failures, asking model to extract results"
        );

        let request = ExtractResultsPrompt::new(raw).build();
        match exchange(self.generator, request).await {
            Ok(exchange) => ParseOutcome {
                result: interpret_extraction(&exchange.response.text, raw, test_file),
                exchange: Some(exchange),
            },
            Err(e) => {
                tracing::error!(error = %e, "result extraction call failed");
                ParseOutcome {
                    result: ExecutionResult::assume_failure(raw, test_file),
                    exchange: None,
                }
            }
        }
    }
}
