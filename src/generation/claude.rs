//! Claude Code CLI generation backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{
    calculate_cost, failure_from_message, run_cli, GenerationRequest, GenerationResponse,
    GenerationService, GenerationStats,
};

/// Generation backend driving the Claude Code CLI in print mode.
pub struct ClaudeGenerator {
    /// Path to the claude CLI binary.
    cli_path: String,
    /// Model to use (e.g., "sonnet", "haiku", "opus").
    model: Option<String>,
    /// Wall-clock limit per call.
    timeout: Duration,
}

impl Default for ClaudeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaudeGenerator {
    /// Creates a new generator using the default `claude` command.
    pub fn new() -> Self {
        Self {
            cli_path: "claude".to_string(),
            model: None,
            timeout: Duration::from_secs(600),
        }
    }

    /// Creates a new generator with a custom CLI path.
    pub fn with_cli_path(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            ..Self::new()
        }
    }

    /// Sets the model.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the command arguments for a single-shot completion.
    fn build_args(&self, request: &GenerationRequest) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(), // Non-interactive mode
            "--output-format".to_string(),
            "json".to_string(),
            // Completions only; no tool use
            "--disallowedTools".to_string(),
            "Bash,Edit,Write,Read,WebFetch,WebSearch".to_string(),
        ];

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if !request.system.is_empty() {
            args.push("--system-prompt".to_string());
            args.push(request.system.clone());
        }

        args.push("-p".to_string());
        args.push(request.user.clone());

        args
    }

    /// Parses the CLI's JSON result envelope.
    fn parse_response(&self, stdout: &str, latency: Duration) -> Result<GenerationResponse> {
        let json: serde_json::Value = serde_json::from_str(stdout.trim())
            .map_err(|e| Error::Generation(format!("unparseable claude output: {}", e)))?;

        let text = json
            .get("result")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .to_string();

        if json.get("is_error").and_then(|e| e.as_bool()) == Some(true) {
            return Err(failure_from_message(&text));
        }

        let usage = json.get("usage");
        let token_count = |field: &str| {
            usage
                .and_then(|u| u.get(field))
                .and_then(|v| v.as_u64())
                .unwrap_or(0)
        };
        let prompt_tokens = token_count("input_tokens")
            + token_count("cache_read_input_tokens")
            + token_count("cache_creation_input_tokens");
        let completion_tokens = token_count("output_tokens");

        let model = self.model.clone().unwrap_or_else(|| "claude".to_string());
        let stats = GenerationStats {
            calculated_cost: calculate_cost(&model, prompt_tokens, completion_tokens),
            reported_cost: json
                .get("total_cost_usd")
                .and_then(|c| c.as_f64())
                .unwrap_or(0.0),
            model,
            prompt_tokens,
            completion_tokens,
            latency_ms: latency.as_millis() as u64,
            request_id: json
                .get("session_id")
                .and_then(|s| s.as_str())
                .map(|s| s.to_string()),
        };

        Ok(GenerationResponse {
            text,
            prompt_tokens,
            completion_tokens,
            stats,
        })
    }
}

#[async_trait]
impl GenerationService for ClaudeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let args = self.build_args(request);

        tracing::info!(
            cli = %self.cli_path,
            model = ?self.model,
            prompt_chars = request.user.len(),
            "invoking Claude CLI"
        );

        let start = Instant::now();
        let output = run_cli(&self.cli_path, &args, self.timeout).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(status = ?output.status, stderr = %stderr, "claude exited with error");
            let message = if stderr.trim().is_empty() {
                stdout.to_string()
            } else {
                stderr.to_string()
            };
            return Err(failure_from_message(&message));
        }

        let response = self.parse_response(&stdout, start.elapsed())?;
        tracing::debug!(
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            latency_ms = response.stats.latency_ms,
            "claude response received"
        );
        Ok(response)
    }

    fn name(&self) -> &str {
        "claude-code"
    }
}
