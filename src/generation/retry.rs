//! Rate-limit retry wrapper for generation services.

use std::time::Duration;

use async_trait::async_trait;

use crate::backoff::ExponentialBackoff;
use crate::error::{Error, Result};

use super::{GenerationRequest, GenerationResponse, GenerationService};

/// Wraps a generation service and retries rate-limited calls with
/// exponential backoff. Any other failure is returned immediately.
pub struct RetryingGenerator<S> {
    inner: S,
    max_retries: u32,
    backoff_initial: Duration,
    backoff_max: Duration,
}

impl<S: GenerationService> RetryingGenerator<S> {
    /// Wraps `inner` with the default policy (5 retries, 2s doubling to 60s).
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            max_retries: 5,
            backoff_initial: Duration::from_secs(2),
            backoff_max: Duration::from_secs(60),
        }
    }

    /// Sets the maximum number of retries after the first attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff bounds.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff_initial = initial;
        self.backoff_max = max;
        self
    }

    /// Returns the wrapped service.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: GenerationService> GenerationService for RetryingGenerator<S> {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let mut backoff = ExponentialBackoff::new(self.backoff_initial, self.backoff_max);

        loop {
            match self.inner.generate(request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && backoff.attempts() < self.max_retries => {
                    tracing::warn!(
                        service = self.inner.name(),
                        attempt = backoff.attempts() + 1,
                        delay = ?backoff.current(),
                        error = %err,
                        "rate limited, backing off"
                    );
                    backoff.wait().await;
                }
                Err(err) if err.is_retryable() => {
                    tracing::error!(
                        service = self.inner.name(),
                        retries = self.max_retries,
                        "generation retry budget exhausted"
                    );
                    return Err(Error::Generation(format!(
                        "max retries exceeded: {}",
                        err
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
