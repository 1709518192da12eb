//! Execution sandbox boundary.
//!
//! A [`SandboxAdapter`] copies the files named by a [`PathMapping`] into an
//! isolated environment, runs the test suite there, and returns the raw
//! console output. [`CandidateStager`] writes the active candidate to disk and
//! produces the mapping for it.

mod mapping;
mod script;
mod staging;

pub use mapping::{strip_tests_prefix, PathMapping, PathPair};
pub use script::ScriptSandbox;
pub use staging::CandidateStager;

use async_trait::async_trait;

use crate::error::Result;

/// Runs staged files in an isolated environment.
#[async_trait]
pub trait SandboxAdapter: Send + Sync {
    /// Copies `mapping` into the sandbox, runs it, and returns the console log.
    ///
    /// Timeouts, failed runs, and missing result artifacts are errors.
    async fn execute(&self, mapping: &PathMapping, run_id: &str) -> Result<String>;

    /// Returns the name of this adapter.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: SandboxAdapter + ?Sized> SandboxAdapter for Box<T> {
    async fn execute(&self, mapping: &PathMapping, run_id: &str) -> Result<String> {
        (**self).execute(mapping, run_id).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<'a, T: SandboxAdapter + ?Sized> SandboxAdapter for &'a T {
    async fn execute(&self, mapping: &PathMapping, run_id: &str) -> Result<String> {
        (**self).execute(mapping, run_id).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
