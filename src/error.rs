//! Error types for the regression refiner.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for refinement operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while staging files or writing artifacts.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The generation service failed to produce a response.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The generation service asked us to slow down.
    #[error("generation rate limited: {0}")]
    RateLimited(String),

    /// The sandbox run failed before producing output.
    #[error("sandbox execution failed: {0}")]
    Sandbox(String),

    /// The sandbox run exceeded its wall-clock budget.
    #[error("sandbox execution timed out after {0:?}")]
    Timeout(Duration),

    /// The sandbox finished but left no results file behind.
    #[error("missing sandbox results at {0}")]
    MissingResults(PathBuf),

    /// A path mapping line is malformed.
    #[error("invalid path mapping at line {line}: {reason}")]
    PathMapping { line: usize, reason: String },

    /// Test source could not be parsed structurally.
    #[error("failed to prune test source: {0}")]
    Prune(String),

    /// Model output could not be interpreted.
    #[error("failed to parse model output: {0}")]
    Parse(String),

    /// Code search failed.
    #[error("code search failed: {0}")]
    Search(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if retrying the same generation request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited(_))
    }
}

/// Result type alias for refinement operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A fault that ends the current iteration without ending the run.
///
/// Every variant is caught at the iteration boundary by the controller and
/// surfaces only as the `error` field of an iteration record.
#[derive(Error, Debug)]
pub enum IterationFault {
    /// Sandbox timeout, nonzero exit, or missing results artifact.
    #[error("sandbox fault: {0}")]
    Sandbox(String),

    /// The generation service gave up after its retry budget.
    #[error("generation fault: {0}")]
    Generation(String),

    /// The candidate source could not be parsed for pruning.
    #[error("structural fault: {0}")]
    Structural(String),

    /// Artifact persistence or other local IO failed.
    #[error("io fault: {0}")]
    Io(String),
}

impl From<Error> for IterationFault {
    fn from(err: Error) -> Self {
        match err {
            Error::Sandbox(_)
            | Error::Timeout(_)
            | Error::MissingResults(_)
            | Error::PathMapping { .. } => IterationFault::Sandbox(err.to_string()),
            Error::Generation(_) | Error::RateLimited(_) | Error::Parse(_) => {
                IterationFault::Generation(err.to_string())
            }
            Error::Prune(_) => IterationFault::Structural(err.to_string()),
            Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Search(_) => {
                IterationFault::Io(err.to_string())
            }
        }
    }
}
