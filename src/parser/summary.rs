//! Deterministic extraction from pytest console output.

use std::sync::OnceLock;

use regex::Regex;

use super::{Outcome, TestOutcome};

fn summary_section_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?ms)^=+ short test summary info =+[ \t\r]*$(.*?)^=+ ")
            .expect("summary section pattern is valid")
    })
}

fn outcome_pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(PASSED|FAILED|SKIPPED|ERROR) (\S+)").expect("outcome pattern is valid")
    })
}

fn error_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*E\s|Error|Exception|FAILED|ERROR|Failed|DID NOT RAISE|Traceback",
        )
        .expect("error marker pattern is valid")
    })
}

fn ansi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("ansi pattern is valid")
    })
}

/// A located short-summary block and the outcomes listed inside it.
#[derive(Debug, Clone, Default)]
pub struct SummarySection {
    pub text: Option<String>,
    pub outcomes: Vec<TestOutcome>,
}

/// Finds the "short test summary info" block and extracts `(OUTCOME, name)` pairs.
///
/// Both banner bars must start their own line, and each pair must start a
/// line, so `==` or `ERROR` inside a failure message is never a boundary.
/// Pairs are kept in log order. Repeated names are kept as separate entries.
pub fn summary_section(raw: &str) -> SummarySection {
    let Some(caps) = summary_section_regex().captures(raw.trim()) else {
        return SummarySection::default();
    };
    let text = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();

    let outcomes = outcome_pair_regex()
        .captures_iter(text)
        .filter_map(|pair| {
            let outcome = Outcome::from_label(pair.get(1)?.as_str())?;
            let name = pair.get(2)?.as_str().to_string();
            Some(TestOutcome { name, outcome })
        })
        .collect();

    SummarySection {
        text: Some(text.to_string()),
        outcomes,
    }
}

/// True if any line carries a generic failure marker (exception names,
/// tracebacks, pytest `E` lines, FAILED/ERROR).
pub fn contains_error_markers(raw: &str) -> bool {
    raw.lines().any(|line| error_marker_regex().is_match(line))
}

/// Removes ANSI escape sequences and other control characters from a line.
pub fn clean_line(line: &str) -> String {
    ansi_regex()
        .replace_all(line, "")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}
