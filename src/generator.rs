//! Issue context and candidate test generation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::extract::extract_code_block;
use crate::generation::{exchange, Exchange, GenerationRequest, GenerationService};
use crate::prompts::{RefinePrompt, RepairPrompt, TestGenerationPrompt};

/// Placeholder used when the issue has no existing test file.
pub const NO_TEST_FILE: &str = "No existing test file found.";

/// A reported defect and where to look for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Dataset identifier, e.g. `django__django-11583`.
    pub instance_id: String,
    pub problem_statement: String,
    #[serde(default)]
    pub hints_text: String,
    /// Project name (e.g. `django`); drives sandbox path conventions.
    #[serde(default)]
    pub project: String,
    /// Repository-relative source file under test.
    pub source_file: String,
    /// Repository-relative existing test file.
    pub test_file: String,
}

impl Issue {
    /// Loads an issue from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Project name, falling back to the part of the id before `__`.
    pub fn project_name(&self) -> &str {
        if !self.project.is_empty() {
            return &self.project;
        }
        self.instance_id
            .split("__")
            .next()
            .unwrap_or(&self.instance_id)
    }
}

/// Renders lines as `N: line`, numbering from 1 and keeping line endings.
pub fn number_lines(content: &str) -> String {
    content
        .split_inclusive('\n')
        .enumerate()
        .map(|(idx, line)| format!("{}: {}", idx + 1, line))
        .collect()
}

/// Issue plus the numbered source and test listings prompts are built from.
#[derive(Debug, Clone)]
pub struct IssueContext {
    pub issue: Issue,
    pub repo_root: PathBuf,
    pub numbered_source: String,
    pub numbered_test: String,
}

impl IssueContext {
    /// Reads the source and test files under `repo_root`.
    ///
    /// The source file must exist; a missing test file is rendered as
    /// [`NO_TEST_FILE`].
    pub fn load(issue: Issue, repo_root: impl Into<PathBuf>) -> Result<Self> {
        let repo_root = repo_root.into();

        let source_path = repo_root.join(&issue.source_file);
        let source = std::fs::read_to_string(&source_path).map_err(|e| {
            Error::Config(format!(
                "source file {} not readable: {}",
                source_path.display(),
                e
            ))
        })?;

        let test_path = repo_root.join(&issue.test_file);
        let numbered_test = match std::fs::read_to_string(&test_path) {
            Ok(content) => number_lines(&content),
            Err(_) => {
                tracing::warn!(path = %test_path.display(), "no existing test file");
                NO_TEST_FILE.to_string()
            }
        };

        Ok(Self {
            numbered_source: number_lines(&source),
            numbered_test,
            issue,
            repo_root,
        })
    }

    pub fn issue_id(&self) -> &str {
        &self.issue.instance_id
    }

    pub fn description(&self) -> &str {
        &self.issue.problem_statement
    }
}

/// Test source produced by one generation call.
#[derive(Debug, Clone)]
pub struct GeneratedTest {
    pub source: String,
    pub exchange: Exchange,
}

/// Renders prompts from the issue context and extracts candidate source.
pub struct CandidateGenerator<'a, G: ?Sized> {
    generator: &'a G,
    context: &'a IssueContext,
}

impl<'a, G: GenerationService + ?Sized> CandidateGenerator<'a, G> {
    pub fn new(generator: &'a G, context: &'a IssueContext) -> Self {
        Self { generator, context }
    }

    /// Initial generation prompt for the issue.
    pub fn generation_prompt(&self) -> GenerationRequest {
        TestGenerationPrompt::new(
            self.context.description(),
            &self.context.numbered_source,
            &self.context.numbered_test,
        )
        .with_hints(&self.context.issue.hints_text)
        .build()
    }

    /// Generates a fresh candidate.
    pub async fn generate(&self) -> Result<GeneratedTest> {
        self.complete(self.generation_prompt()).await
    }

    /// Generates a repaired candidate.
    pub async fn repair(&self, prompt: RepairPrompt) -> Result<GeneratedTest> {
        self.complete(prompt.build()).await
    }

    /// Rewrites a passing candidate so it targets the defect.
    pub async fn refine(&self, passing_test: &str) -> Result<GeneratedTest> {
        let prompt = RefinePrompt::new(
            self.context.description(),
            &self.context.numbered_source,
            passing_test,
        );
        self.complete(prompt.build()).await
    }

    async fn complete(&self, request: GenerationRequest) -> Result<GeneratedTest> {
        let exchange = exchange(self.generator, request).await?;
        let source = extract_code_block(&exchange.response.text);
        if source.trim().is_empty() {
            return Err(Error::Parse(
                "response contained no fenced code block".to_string(),
            ));
        }
        tracing::debug!(
            lines = source.lines().count(),
            service = self.generator.name(),
            "candidate extracted"
        );
        Ok(GeneratedTest { source, exchange })
    }
}
