//! Sandbox adapter that shells out to a container driver script.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::SandboxConfig;
use crate::error::{Error, Result};

use super::{PathMapping, SandboxAdapter};

const MAPPING_FILE: &str = "paths.lst";

/// Runs `<interpreter> <script> <run_id> <paths> <paths> <test_folders>` in
/// the script directory and reads `<run_id><suffix>` back as the console log.
pub struct ScriptSandbox {
    config: SandboxConfig,
}

impl ScriptSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Directory candidates and the mapping file are staged in.
    pub fn staging_path(&self) -> PathBuf {
        self.config.staging_path()
    }

    fn build_args(&self, run_id: &str, mapping_file: &str) -> Vec<String> {
        vec![
            self.config.script.clone(),
            run_id.to_string(),
            mapping_file.to_string(),
            mapping_file.to_string(),
            self.config.test_folders_file.clone(),
        ]
    }

    fn timeout(&self) -> Duration {
        self.config.timeout()
    }
}

#[async_trait]
impl SandboxAdapter for ScriptSandbox {
    async fn execute(&self, mapping: &PathMapping, run_id: &str) -> Result<String> {
        if mapping.is_empty() {
            return Err(Error::Sandbox("nothing to copy into the sandbox".to_string()));
        }

        let staging = self.staging_path();
        tokio::fs::create_dir_all(&staging).await?;
        let mapping_path = staging.join(MAPPING_FILE);
        mapping.write_to(&mapping_path)?;
        let mapping_arg = std::path::absolute(&mapping_path)?
            .to_string_lossy()
            .into_owned();

        // A stale results file from an earlier run must not be mistaken for this one.
        let results_path = self.config.results_path(run_id);
        match tokio::fs::remove_file(&results_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let args = self.build_args(run_id, &mapping_arg);
        tracing::info!(
            interpreter = %self.config.interpreter,
            args = ?args,
            dir = %self.config.script_dir.display(),
            "running sandbox script"
        );

        let child = Command::new(&self.config.interpreter)
            .args(&args)
            .current_dir(&self.config.script_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Sandbox(format!("failed to spawn sandbox script: {}", e)))?;

        // Dropping the child on timeout kills it.
        let output = match tokio::time::timeout(self.timeout(), child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::error!(timeout = ?self.timeout(), run_id, "sandbox run timed out");
                return Err(Error::Timeout(self.timeout()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(status = ?output.status, stderr = %stderr, "sandbox script failed");
            return Err(Error::Sandbox(format!(
                "script exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        match tokio::fs::read_to_string(&results_path).await {
            Ok(log) => {
                tracing::debug!(bytes = log.len(), "sandbox results read");
                Ok(log)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::error!(path = %results_path.display(), "results file not found");
                Err(Error::MissingResults(results_path))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "script"
    }
}
