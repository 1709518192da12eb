//! Staging candidates on the host before a sandbox run.

use std::path::{Path, PathBuf};

use crate::error::Result;

use super::mapping::{strip_tests_prefix, PathMapping};

/// Writes the active candidate to a fixed host file and maps it next to the
/// original test file inside the sandbox.
#[derive(Debug, Clone)]
pub struct CandidateStager {
    host_path: PathBuf,
    sandbox_path: String,
}

impl CandidateStager {
    /// Stages into `staging_dir/file_name`, destined for the directory of
    /// `original_test_file` in the sandbox.
    pub fn new(
        staging_dir: impl AsRef<Path>,
        file_name: &str,
        original_test_file: &str,
        project: &str,
    ) -> Self {
        let test_dir = Path::new(original_test_file)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sandbox_path = if test_dir.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", test_dir, file_name)
        };
        let sandbox_path = if project == "django" {
            strip_tests_prefix(&sandbox_path).to_string()
        } else {
            sandbox_path
        };

        Self {
            host_path: staging_dir.as_ref().join(file_name),
            sandbox_path,
        }
    }

    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    pub fn sandbox_path(&self) -> &str {
        &self.sandbox_path
    }

    /// Writes `source` as the staged candidate, replacing the previous one,
    /// and returns the mapping for it.
    pub fn stage(&self, source: &str) -> Result<PathMapping> {
        if let Some(dir) = self.host_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.host_path, source)?;

        let host = std::path::absolute(&self.host_path)?;
        tracing::debug!(host = %host.display(), sandbox = %self.sandbox_path, "staged candidate");

        Ok(PathMapping::new().with_pair(host, self.sandbox_path.clone()))
    }
}
