//! Extraction of code and JSON payloads from model responses.

use std::sync::OnceLock;

use regex::Regex;

fn fenced_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:\w+)?\n(.*?)\n?```").expect("fenced block pattern is valid")
    })
}

/// Returns the contents of the first fenced code block, trailing whitespace removed.
///
/// Returns an empty string when the text contains no fenced block.
pub fn extract_code_block(text: &str) -> String {
    fenced_block_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end().to_string())
        .unwrap_or_default()
}

/// Extracts a JSON object from output that may contain markdown code blocks.
///
/// The first fenced block wins; otherwise the outermost `{...}` span is used.
pub fn extract_json(output: &str) -> Option<String> {
    let block = extract_code_block(output);
    if !block.trim().is_empty() {
        return Some(block.trim().to_string());
    }

    let json_start = output.find('{')?;
    let json_end = output.rfind('}')?;
    if json_start < json_end {
        Some(output[json_start..=json_end].to_string())
    } else {
        None
    }
}

/// Parses the first JSON object in a model response.
pub fn parse_json_object(output: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let json = extract_json(output)?;
    match serde_json::from_str::<serde_json::Value>(&json) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}
