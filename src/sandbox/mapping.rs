//! Host to sandbox path mappings.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One file to copy into the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPair {
    /// Absolute (or script-relative) path on the host.
    pub host: PathBuf,
    /// Destination path inside the sandbox, relative to the project root.
    pub sandbox: String,
}

/// Ordered list of files to copy into the sandbox before a run.
///
/// Persisted one pair per line as `host#sandbox`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    pairs: Vec<PathPair>,
}

impl PathMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pair.
    pub fn with_pair(mut self, host: impl Into<PathBuf>, sandbox: impl Into<String>) -> Self {
        self.pairs.push(PathPair {
            host: host.into(),
            sandbox: sandbox.into(),
        });
        self
    }

    pub fn pairs(&self) -> &[PathPair] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Parses the persisted format. Blank lines are skipped; any other line
    /// must contain exactly one `#`.
    pub fn parse(content: &str) -> Result<Self> {
        let mut pairs = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('#').collect();
            let [host, sandbox] = fields.as_slice() else {
                return Err(Error::PathMapping {
                    line: idx + 1,
                    reason: format!("expected exactly one '#' separator in {:?}", line),
                });
            };
            if host.is_empty() || sandbox.is_empty() {
                return Err(Error::PathMapping {
                    line: idx + 1,
                    reason: "host and sandbox paths must both be non-empty".to_string(),
                });
            }

            pairs.push(PathPair {
                host: PathBuf::from(host),
                sandbox: sandbox.to_string(),
            });
        }

        Ok(Self { pairs })
    }

    /// Renders the persisted format.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Writes the persisted format to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        for (idx, pair) in self.pairs.iter().enumerate() {
            if pair.host.to_string_lossy().contains('#') || pair.sandbox.contains('#') {
                return Err(Error::PathMapping {
                    line: idx + 1,
                    reason: "paths may not contain '#'".to_string(),
                });
            }
        }
        std::fs::write(path, self.render())?;
        Ok(())
    }

    /// Reads and validates a persisted mapping.
    pub fn read_from(path: &Path) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }
}

impl fmt::Display for PathMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pair in &self.pairs {
            writeln!(f, "{}#{}", pair.host.display(), pair.sandbox)?;
        }
        Ok(())
    }
}

/// Drops a leading `tests/` component. Django's runner resolves test modules
/// relative to its `tests` directory.
pub fn strip_tests_prefix(path: &str) -> &str {
    path.strip_prefix("tests/").unwrap_or(path)
}
