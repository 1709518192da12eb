//! Line-oriented error detail extraction.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::summary::clean_line;
use super::{Outcome, TestOutcome};

/// Python exception kinds recognized in execution logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ModuleNotFoundError,
    ImportError,
    AssertionError,
    SyntaxError,
    TypeError,
    AttributeError,
    ValueError,
    NameError,
    IndexError,
    KeyError,
}

/// A recognized error line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    /// Capture groups of the matching pattern.
    pub details: Vec<String>,
    /// Missing module, for `ModuleNotFoundError`.
    pub module: Option<String>,
    /// Symbol imported on the preceding `from X import Y` line.
    pub symbol: Option<String>,
    pub import_statement: Option<String>,
    pub full_error_text: String,
}

/// Outcome lines and error details found by scanning a log line by line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAnalysis {
    pub tests: Vec<TestOutcome>,
    pub errors: Vec<ErrorDetail>,
}

fn error_patterns() -> &'static [(ErrorKind, Regex)] {
    static PATTERNS: OnceLock<Vec<(ErrorKind, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                ErrorKind::ModuleNotFoundError,
                r"ModuleNotFoundError: No module named '(.*?)'",
            ),
            (
                ErrorKind::ImportError,
                r"ImportError: cannot import name '(.*?)' from '(.*?)'",
            ),
            (ErrorKind::AssertionError, r"AssertionError: (.*)"),
            (ErrorKind::SyntaxError, r"SyntaxError: (.*?) at line (\d+)"),
            (ErrorKind::TypeError, r"TypeError: (.*)"),
            (ErrorKind::AttributeError, r"AttributeError: (.*)"),
            (ErrorKind::ValueError, r"ValueError: (.*)"),
            (ErrorKind::NameError, r"NameError: name '(.*?)' is not defined"),
            (ErrorKind::IndexError, r"IndexError: (.*)"),
            (ErrorKind::KeyError, r"KeyError: '(.*?)'"),
        ]
        .into_iter()
        .map(|(kind, pattern)| {
            (
                kind,
                Regex::new(pattern).expect("error detail pattern is valid"),
            )
        })
        .collect()
    })
}

fn from_import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"from (.*?) import (.*)").expect("import pattern is valid"))
}

/// Matches a single cleaned line against the known error patterns.
///
/// `previous_line` supplies the import statement for missing-module errors.
pub fn extract_error_detail(line: &str, previous_line: &str) -> Option<ErrorDetail> {
    let (kind, caps) = error_patterns()
        .iter()
        .find_map(|(kind, re)| re.captures(line).map(|caps| (*kind, caps)))?;

    let details: Vec<String> = caps
        .iter()
        .skip(1)
        .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
        .collect();

    let mut detail = ErrorDetail {
        kind,
        details,
        module: None,
        symbol: None,
        import_statement: None,
        full_error_text: line.trim().to_string(),
    };

    if kind == ErrorKind::ModuleNotFoundError {
        detail.module = detail.details.first().cloned();
        if let Some(import) = from_import_regex().captures(previous_line) {
            detail.import_statement = import.get(0).map(|m| m.as_str().to_string());
            detail.symbol = import.get(2).map(|m| m.as_str().trim().to_string());
        }
    }

    Some(detail)
}

/// Detects `STATUS name` or `STATUS - name` at the start of a line.
pub fn detect_outcome(line: &str) -> Option<TestOutcome> {
    let label = ["PASSED", "FAILED", "ERROR", "SKIPPED"]
        .into_iter()
        .find(|label| line.starts_with(label))?;

    let normalized = line.replace(" - ", " ");
    let name = normalized.split_whitespace().nth(1)?;
    Some(TestOutcome {
        name: name.to_string(),
        outcome: Outcome::from_label(label)?,
    })
}

/// Scans a raw log line by line for outcomes and error details.
///
/// An error line is never also read as an outcome line, and does not become
/// the "previous line" for the next import lookup.
pub fn analyze_log(raw: &str) -> LogAnalysis {
    let mut analysis = LogAnalysis::default();
    let mut previous_line = String::new();

    for line in raw.split('\n') {
        let line = clean_line(line);

        if let Some(detail) = extract_error_detail(&line, &previous_line) {
            analysis.errors.push(detail);
            continue;
        }

        if let Some(outcome) = detect_outcome(&line) {
            analysis.tests.push(outcome);
        }

        previous_line = line;
    }

    analysis
}

/// Returns `(module, symbol)` for the first missing-module error, if any.
pub fn first_module_not_found(errors: &[ErrorDetail]) -> Option<(String, Option<String>)> {
    errors
        .iter()
        .find(|e| e.kind == ErrorKind::ModuleNotFoundError)
        .map(|e| (e.module.clone().unwrap_or_default(), e.symbol.clone()))
}
