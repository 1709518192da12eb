//! Prompt builders for test generation, repair, and log analysis.

use crate::classifier::FailureClassification;
use crate::generation::GenerationRequest;

const TEST_WRITER_SYSTEM: &str = "You are an expert Python developer who writes pytest \
regression tests that reproduce reported bugs. Reply with the complete test file in a \
single ```python code block and nothing else.";

const ANALYST_SYSTEM: &str = "You are an expert at diagnosing failing Python test runs. \
Reply with a single ```json code block and nothing else.";

fn push_section(prompt: &mut String, title: &str, body: &str) {
    prompt.push_str("### ");
    prompt.push_str(title);
    prompt.push_str("\n\n");
    prompt.push_str(body.trim_end());
    prompt.push_str("\n\n");
}

fn push_fenced(prompt: &mut String, title: &str, lang: &str, body: &str) {
    prompt.push_str("### ");
    prompt.push_str(title);
    prompt.push_str("\n\n```");
    prompt.push_str(lang);
    prompt.push('\n');
    prompt.push_str(body.trim_end());
    prompt.push_str("\n```\n\n");
}

/// Builder for the initial test generation prompt.
pub struct TestGenerationPrompt {
    issue: String,
    hints: Option<String>,
    numbered_source: String,
    numbered_test: String,
}

impl TestGenerationPrompt {
    /// Creates a new builder from the issue text and numbered file listings.
    pub fn new(
        issue: impl Into<String>,
        numbered_source: impl Into<String>,
        numbered_test: impl Into<String>,
    ) -> Self {
        Self {
            issue: issue.into(),
            hints: None,
            numbered_source: numbered_source.into(),
            numbered_test: numbered_test.into(),
        }
    }

    /// Adds maintainer hints from the issue thread.
    pub fn with_hints(mut self, hints: impl Into<String>) -> Self {
        let hints = hints.into();
        self.hints = (!hints.trim().is_empty()).then_some(hints);
        self
    }

    /// Builds the request.
    pub fn build(&self) -> GenerationRequest {
        let mut prompt = String::new();

        prompt.push_str("## Regression Test Request\n\n");
        prompt.push_str(
            "Write a pytest test file that reproduces the issue below. The tests must FAIL \
             on the current code because of the reported bug, and should pass once it is fixed.\n\n",
        );

        push_section(&mut prompt, "Issue", &self.issue);
        if let Some(hints) = &self.hints {
            push_section(&mut prompt, "Hints", hints);
        }
        push_section(&mut prompt, "Source Under Test (numbered)", &self.numbered_source);
        push_section(&mut prompt, "Existing Tests (numbered)", &self.numbered_test);

        prompt.push_str("### Requirements\n\n");
        prompt.push_str("- Import only modules that exist in the repository\n");
        prompt.push_str("- Keep each test focused on the reported behavior\n");
        prompt.push_str("- Assert the expected (fixed) behavior, not the buggy one\n");

        GenerationRequest::new(TEST_WRITER_SYSTEM, prompt)
    }
}

/// Builder for prompts that repair a test which fails to import or run.
pub struct RepairPrompt {
    issue: String,
    log: String,
    candidate: String,
    classification: FailureClassification,
    import_context: Option<String>,
}

impl RepairPrompt {
    /// Creates a new repair prompt.
    pub fn new(
        issue: impl Into<String>,
        log: impl Into<String>,
        candidate: impl Into<String>,
        classification: FailureClassification,
    ) -> Self {
        Self {
            issue: issue.into(),
            log: log.into(),
            candidate: candidate.into(),
            classification,
            import_context: None,
        }
    }

    /// Switches to import analysis, grounding the fix in real import sites.
    pub fn with_import_context(mut self, context: impl Into<String>) -> Self {
        self.import_context = Some(context.into());
        self
    }

    /// Builds the request.
    pub fn build(&self) -> GenerationRequest {
        let mut prompt = String::new();

        if self.import_context.is_some() {
            prompt.push_str("## Import Repair Request\n\n");
            prompt.push_str(
                "The test below cannot import a symbol. Use the import sites found in the \
                 repository to correct the import path, then return the full fixed test file.\n\n",
            );
        } else {
            prompt.push_str("## Test Repair Request\n\n");
            prompt.push_str(
                "The test below fails before reaching its assertions. Fix it so it runs, \
                 keeping the assertions that target the issue. Return the full fixed test file.\n\n",
            );
        }

        push_section(&mut prompt, "Issue", &self.issue);
        push_fenced(&mut prompt, "Execution Log", "text", &self.log);
        push_fenced(&mut prompt, "Current Test", "python", &self.candidate);

        prompt.push_str("### Diagnosis\n\n");
        prompt.push_str(&format!("- Reason: {}\n", self.classification.reason));
        prompt.push_str(&format!("- Root cause: {}\n", self.classification.root_cause));
        prompt.push_str(&format!(
            "- Repair steps: {}\n\n",
            self.classification.repair_steps
        ));

        if let Some(context) = &self.import_context {
            push_section(&mut prompt, "Import Search Results", context);
        }

        GenerationRequest::new(TEST_WRITER_SYSTEM, prompt)
    }
}

/// Builder for turning a passing test into one that fails on the defect.
pub struct RefinePrompt {
    issue: String,
    numbered_source: String,
    passing_test: String,
}

impl RefinePrompt {
    /// Creates a new refinement prompt.
    pub fn new(
        issue: impl Into<String>,
        numbered_source: impl Into<String>,
        passing_test: impl Into<String>,
    ) -> Self {
        Self {
            issue: issue.into(),
            numbered_source: numbered_source.into(),
            passing_test: passing_test.into(),
        }
    }

    /// Builds the request.
    pub fn build(&self) -> GenerationRequest {
        let mut prompt = String::new();

        prompt.push_str("## Test Refinement Request\n\n");
        prompt.push_str(
            "The test below PASSES on the buggy code, so it does not reproduce the issue. \
             Rewrite it so that it fails because of the reported bug.\n\n",
        );

        push_section(&mut prompt, "Issue", &self.issue);
        push_section(&mut prompt, "Source Under Test (numbered)", &self.numbered_source);
        push_fenced(&mut prompt, "Passing Test", "python", &self.passing_test);

        GenerationRequest::new(TEST_WRITER_SYSTEM, prompt)
    }
}

/// Builder for failure categorization prompts.
pub struct CategorizePrompt {
    log: String,
    candidate: String,
    issue: Option<String>,
}

impl CategorizePrompt {
    /// Creates a new categorization prompt.
    pub fn new(log: impl Into<String>, candidate: impl Into<String>) -> Self {
        Self {
            log: log.into(),
            candidate: candidate.into(),
            issue: None,
        }
    }

    /// Asks additionally whether the failure relates to this issue.
    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issue = Some(issue.into());
        self
    }

    /// Builds the request.
    pub fn build(&self) -> GenerationRequest {
        let mut prompt = String::new();

        prompt.push_str("## Failure Categorization Request\n\n");
        prompt.push_str("Categorize why the test run below failed.\n\n");

        if let Some(issue) = &self.issue {
            push_section(&mut prompt, "Issue", issue);
        }
        push_fenced(&mut prompt, "Execution Log", "text", &self.log);
        push_fenced(&mut prompt, "Test", "python", &self.candidate);

        prompt.push_str("### Categories\n\n");
        prompt.push_str("- compilation: syntax errors, missing modules, bad imports\n");
        prompt.push_str("- runtime: exceptions raised before or outside assertions\n");
        prompt.push_str("- assertion: the test ran and an assertion failed\n\n");

        prompt.push_str("### Output Format\n\n");
        prompt.push_str("Respond with a JSON object:\n");
        prompt.push_str("```json\n");
        prompt.push_str("{\n");
        prompt.push_str("  \"error_type\": \"compilation\" | \"runtime\" | \"assertion\",\n");
        prompt.push_str("  \"reason\": \"What failed\",\n");
        prompt.push_str("  \"root_cause\": \"Why it failed\",\n");
        if self.issue.is_some() {
            prompt.push_str("  \"repair_steps\": \"How to fix the test\",\n");
            prompt.push_str("  \"issue_error_relevance\": \"yes\" | \"no\"\n");
        } else {
            prompt.push_str("  \"repair_steps\": \"How to fix the test\"\n");
        }
        prompt.push_str("}\n");
        prompt.push_str("```\n");

        GenerationRequest::new(ANALYST_SYSTEM, prompt)
    }
}

/// Builder for judging whether an assertion failure reproduces the issue.
pub struct RelevancePrompt {
    log: String,
    issue_id: String,
    issue: String,
    candidate: String,
}

impl RelevancePrompt {
    /// Creates a new relevance prompt.
    pub fn new(
        log: impl Into<String>,
        issue_id: impl Into<String>,
        issue: impl Into<String>,
        candidate: impl Into<String>,
    ) -> Self {
        Self {
            log: log.into(),
            issue_id: issue_id.into(),
            issue: issue.into(),
            candidate: candidate.into(),
        }
    }

    /// Builds the request.
    pub fn build(&self) -> GenerationRequest {
        let mut prompt = String::new();

        prompt.push_str("## Assertion Relevance Check\n\n");
        prompt.push_str(&format!(
            "Decide whether the assertion failure below is caused by issue {} \
             rather than by a mistake in the test itself.\n\n",
            self.issue_id
        ));

        push_section(&mut prompt, "Issue", &self.issue);
        push_fenced(&mut prompt, "Execution Log", "text", &self.log);
        push_fenced(&mut prompt, "Test", "python", &self.candidate);

        prompt.push_str("### Output Format\n\n");
        prompt.push_str("Respond with a JSON object:\n");
        prompt.push_str("```json\n");
        prompt.push_str("{\n");
        prompt.push_str("  \"is_direct_match\": \"yes\" | \"no\",\n");
        prompt.push_str("  \"reason\": \"Brief justification\"\n");
        prompt.push_str("}\n");
        prompt.push_str("```\n");

        GenerationRequest::new(ANALYST_SYSTEM, prompt)
    }
}

/// Builder for extracting structured outcomes from an unrecognized log.
pub struct ExtractResultsPrompt {
    log: String,
}

impl ExtractResultsPrompt {
    pub fn new(log: impl Into<String>) -> Self {
        Self { log: log.into() }
    }

    /// Builds the request.
    pub fn build(&self) -> GenerationRequest {
        let mut prompt = String::new();

        prompt.push_str("## Test Result Extraction\n\n");
        prompt.push_str("List every test and its outcome from the output below.\n\n");
        push_fenced(&mut prompt, "Test Output", "text", &self.log);

        prompt.push_str("### Output Format\n\n");
        prompt.push_str("Respond with a JSON object:\n");
        prompt.push_str("```json\n");
        prompt.push_str("{\n");
        prompt.push_str("  \"test_file\": \"path/to/test_file.py\",\n");
        prompt.push_str("  \"tests\": [\n");
        prompt.push_str("    {\"name\": \"test_name\", \"outcome\": \"PASSED|FAILED|ERROR|SKIPPED\"}\n");
        prompt.push_str("  ],\n");
        prompt.push_str("  \"summary\": \"Short summary or null\"\n");
        prompt.push_str("}\n");
        prompt.push_str("```\n");

        GenerationRequest::new(ANALYST_SYSTEM, prompt)
    }
}
