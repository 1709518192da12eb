//! Per-token pricing for calculated cost.

/// USD per token for (input, output).
fn price_per_token(model: &str) -> Option<(f64, f64)> {
    match model {
        "gpt-4o-mini" | "gpt-4o-mini-2024-07-18" => Some((0.15 / 1_000_000.0, 0.60 / 1_000_000.0)),
        "gpt-4o" | "gpt-4o-2024-08-06" => Some((2.50 / 1_000_000.0, 10.00 / 1_000_000.0)),
        _ => None,
    }
}

/// Computes the cost of a call from the local pricing table.
///
/// Unknown models cost nothing; the backend-reported cost is tracked separately.
pub fn calculate_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    match price_per_token(model) {
        Some((input, output)) => prompt_tokens as f64 * input + completion_tokens as f64 * output,
        None => {
            tracing::debug!(model = %model, "model not in pricing table");
            0.0
        }
    }
}
