//! Gemini CLI generation backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{
    calculate_cost, failure_from_message, run_cli, GenerationRequest, GenerationResponse,
    GenerationService, GenerationStats,
};

/// Generation backend driving the Gemini CLI.
pub struct GeminiGenerator {
    /// Path to the gemini CLI binary.
    cli_path: String,
    /// Model to use.
    model: Option<String>,
    /// Wall-clock limit per call.
    timeout: Duration,
}

impl Default for GeminiGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiGenerator {
    /// Creates a new generator using the default `gemini` command.
    pub fn new() -> Self {
        Self {
            cli_path: "gemini".to_string(),
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

    /// Builds the command arguments. Gemini has no system prompt flag, so the
    /// system text is prepended to the user message.
    fn build_args(&self, request: &GenerationRequest) -> Vec<String> {
        let mut args = vec!["--output-format".to_string(), "json".to_string()];

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        let prompt = if request.system.is_empty() {
            request.user.clone()
        } else {
            format!("{}\n\n{}", request.system, request.user)
        };

        args.push("--prompt".to_string());
        args.push(prompt);

        args
    }

    fn parse_response(&self, stdout: &str, latency: Duration) -> Result<GenerationResponse> {
        let json: serde_json::Value = serde_json::from_str(stdout.trim())
            .map_err(|e| Error::Generation(format!("unparseable gemini output: {}", e)))?;

        if let Some(error) = json.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
                .unwrap_or_else(|| error.to_string());
            return Err(failure_from_message(&message));
        }

        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .to_string();

        // Usage is reported per model; sum across all of them.
        let mut prompt_tokens = 0;
        let mut completion_tokens = 0;
        if let Some(models) = json
            .get("stats")
            .and_then(|s| s.get("models"))
            .and_then(|m| m.as_object())
        {
            for model_stats in models.values() {
                let tokens = model_stats.get("tokens");
                prompt_tokens += tokens
                    .and_then(|t| t.get("prompt"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                completion_tokens += tokens
                    .and_then(|t| t.get("candidates"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
            }
        }

        let model = self.model.clone().unwrap_or_else(|| "gemini".to_string());
        let stats = GenerationStats {
            calculated_cost: calculate_cost(&model, prompt_tokens, completion_tokens),
            reported_cost: 0.0,
            model,
            prompt_tokens,
            completion_tokens,
            latency_ms: latency.as_millis() as u64,
            request_id: None,
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
impl GenerationService for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let args = self.build_args(request);

        tracing::info!(
            cli = %self.cli_path,
            model = ?self.model,
            prompt_chars = request.user.len(),
            "invoking Gemini CLI"
        );

        let start = Instant::now();
        let output = run_cli(&self.cli_path, &args, self.timeout).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(status = ?output.status, stderr = %stderr, "gemini exited with error");
            return Err(failure_from_message(&stderr));
        }

        self.parse_response(&String::from_utf8_lossy(&output.stdout), start.elapsed())
    }

    fn name(&self) -> &str {
        "gemini-cli"
    }
}
