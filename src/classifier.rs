//! Failure classification through the generation service.
//!
//! The classifier renders one prompt, makes one model call, and validates the
//! JSON that comes back. It applies no local heuristics. Anything it cannot
//! validate becomes [`FailureCategory::Unknown`] (or "not a direct match" for
//! relevance checks); classification is never retried.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extract::parse_json_object;
use crate::generation::{exchange, Exchange, GenerationService};
use crate::prompts::{CategorizePrompt, RelevancePrompt};

/// Why a test run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    Compilation,
    Runtime,
    Assertion,
    #[default]
    Unknown,
}

impl FailureCategory {
    /// Parses a category label; anything unrecognized is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "compilation" => FailureCategory::Compilation,
            "runtime" => FailureCategory::Runtime,
            "assertion" => FailureCategory::Assertion,
            _ => FailureCategory::Unknown,
        }
    }

    /// Compilation and runtime failures go through the repair sub-loop.
    pub fn is_repairable(self) -> bool {
        matches!(self, FailureCategory::Compilation | FailureCategory::Runtime)
    }
}

/// A validated classification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailureClassification {
    pub category: FailureCategory,
    pub reason: String,
    pub root_cause: String,
    /// Free text used as repair prompt context.
    pub repair_steps: String,
    /// Whether the failure relates to the issue, when the prompt asked.
    pub issue_relevance: Option<bool>,
}

impl FailureClassification {
    /// An `Unknown` classification carrying `reason`.
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Self::default()
        }
    }

    /// Validates a model response.
    pub fn from_response(text: &str) -> Self {
        let Some(map) = parse_json_object(text) else {
            return Self::unknown("classification response was not a JSON object");
        };
        let Some(label) = map.get("error_type").and_then(Value::as_str) else {
            return Self::unknown("classification response has no error_type");
        };

        Self {
            category: FailureCategory::from_label(label),
            reason: text_field(&map, "reason"),
            root_cause: text_field(&map, "root_cause"),
            repair_steps: text_field(&map, "repair_steps"),
            issue_relevance: map.get("issue_error_relevance").and_then(as_yes_no),
        }
    }

    /// Runtime failure judged related to the issue after a repair.
    pub fn is_related_runtime(&self) -> bool {
        self.category == FailureCategory::Runtime && self.issue_relevance == Some(true)
    }
}

/// Judgement on whether an assertion failure reproduces the issue.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelevanceJudgement {
    pub is_direct_match: bool,
    pub reason: String,
}

impl RelevanceJudgement {
    /// Validates a model response. Missing or malformed fields mean no match.
    pub fn from_response(text: &str) -> Self {
        let Some(map) = parse_json_object(text) else {
            return Self {
                is_direct_match: false,
                reason: "relevance response was not a JSON object".to_string(),
            };
        };
        Self {
            is_direct_match: map
                .get("is_direct_match")
                .and_then(as_yes_no)
                .unwrap_or(false),
            reason: text_field(&map, "reason"),
        }
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Accepts `true`/`false` or the strings "yes"/"no"/"true"/"false".
fn as_yes_no(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" => Some(true),
            "no" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// A classifier verdict plus the model call behind it.
#[derive(Debug, Clone)]
pub struct Verdict<T> {
    pub value: T,
    pub exchange: Option<Exchange>,
}

/// Classifies failing runs with a single model call each.
pub struct FailureClassifier<'a, G: ?Sized> {
    generator: &'a G,
}

impl<'a, G: GenerationService + ?Sized> FailureClassifier<'a, G> {
    pub fn new(generator: &'a G) -> Self {
        Self { generator }
    }

    /// Categorizes a failing run.
    pub async fn classify(&self, log: &str, candidate: &str) -> Verdict<FailureClassification> {
        self.categorize(CategorizePrompt::new(log, candidate)).await
    }

    /// Categorizes a run after a repair attempt, also asking whether the
    /// failure relates to the issue.
    pub async fn classify_after_repair(
        &self,
        log: &str,
        candidate: &str,
        issue: &str,
    ) -> Verdict<FailureClassification> {
        self.categorize(CategorizePrompt::new(log, candidate).with_issue(issue))
            .await
    }

    async fn categorize(&self, prompt: CategorizePrompt) -> Verdict<FailureClassification> {
        match exchange(self.generator, prompt.build()).await {
            Ok(exchange) => {
                let value = FailureClassification::from_response(&exchange.response.text);
                tracing::info!(
                    category = ?value.category,
                    relevance = ?value.issue_relevance,
                    "failure classified"
                );
                Verdict {
                    value,
                    exchange: Some(exchange),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "classification call failed");
                Verdict {
                    value: FailureClassification::unknown(e.to_string()),
                    exchange: None,
                }
            }
        }
    }

    /// Judges whether an assertion failure is caused by the reported issue.
    pub async fn classify_relevance(
        &self,
        log: &str,
        issue_id: &str,
        issue: &str,
        candidate: &str,
    ) -> Verdict<RelevanceJudgement> {
        let request = RelevancePrompt::new(log, issue_id, issue, candidate).build();
        match exchange(self.generator, request).await {
            Ok(exchange) => {
                let value = RelevanceJudgement::from_response(&exchange.response.text);
                tracing::info!(direct_match = value.is_direct_match, "assertion relevance judged");
                Verdict {
                    value,
                    exchange: Some(exchange),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "relevance call failed");
                Verdict {
                    value: RelevanceJudgement {
                        is_direct_match: false,
                        reason: e.to_string(),
                    },
                    exchange: None,
                }
            }
        }
    }
}
