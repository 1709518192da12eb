//! Generation service boundary.
//!
//! A generation service turns a `{system, user}` prompt into response text plus
//! token usage. Backends drive headless LLM CLIs; [`RetryingGenerator`] layers
//! the rate-limit retry policy on top of any backend.

mod claude;
mod gemini;
mod pricing;
mod retry;

pub use claude::ClaudeGenerator;
pub use gemini::GeminiGenerator;
pub use pricing::calculate_cost;
pub use retry::RetryingGenerator;

use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{Error, Result};

/// A prompt for the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// System instructions.
    pub system: String,
    /// User message.
    pub user: String,
}

impl GenerationRequest {
    /// Creates a new request.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Usage statistics reported alongside a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Model that served the request.
    pub model: String,
    /// Prompt tokens consumed.
    pub prompt_tokens: u64,
    /// Completion tokens produced.
    pub completion_tokens: u64,
    /// Cost computed from the local pricing table.
    pub calculated_cost: f64,
    /// Cost reported by the backend, if any.
    pub reported_cost: f64,
    /// Wall-clock latency of the call.
    pub latency_ms: u64,
    /// Backend request or session identifier.
    pub request_id: Option<String>,
}

/// Response from the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Response text.
    pub text: String,
    /// Prompt tokens consumed.
    pub prompt_tokens: u64,
    /// Completion tokens produced.
    pub completion_tokens: u64,
    /// Full statistics.
    pub stats: GenerationStats,
}

impl GenerationResponse {
    /// Creates a response with the given text and no usage.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt_tokens: 0,
            completion_tokens: 0,
            stats: GenerationStats::default(),
        }
    }
}

/// One completed model call, kept so the caller can record it.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request: GenerationRequest,
    pub response: GenerationResponse,
}

/// Sends `request` and pairs it with the response.
pub async fn exchange<G: GenerationService + ?Sized>(
    service: &G,
    request: GenerationRequest,
) -> Result<Exchange> {
    let response = service.generate(&request).await?;
    Ok(Exchange { request, response })
}

/// Trait for generation services.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Sends the request and waits for the full response.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse>;

    /// Returns the name of this service.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: GenerationService + ?Sized> GenerationService for Box<T> {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<'a, T: GenerationService + ?Sized> GenerationService for &'a T {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Runs a CLI to completion under a wall-clock limit, capturing its output.
pub(crate) async fn run_cli(cli_path: &str, args: &[String], timeout: Duration) -> Result<Output> {
    let child = Command::new(cli_path)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Generation(format!("failed to spawn {}: {}", cli_path, e)))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output
            .map_err(|e| Error::Generation(format!("failed to wait for {}: {}", cli_path, e))),
        Err(_) => Err(Error::Generation(format!(
            "{} did not respond within {:?}",
            cli_path, timeout
        ))),
    }
}

/// Maps a backend failure message to a retryable or terminal error.
pub(crate) fn failure_from_message(message: &str) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("429")
        || lower.contains("overloaded")
        || lower.contains("resource_exhausted")
    {
        Error::RateLimited(message.trim().to_string())
    } else {
        Error::Generation(message.trim().to_string())
    }
}
