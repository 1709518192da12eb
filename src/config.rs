//! Configuration for refinement runs.
//!
//! Configuration is read from a TOML or YAML file (selected by extension) and
//! validated before a run starts to catch errors early.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "REFINER_CONFIG";

/// Environment variable overriding the generation backend.
pub const BACKEND_ENV_VAR: &str = "REFINER_BACKEND";

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

/// Bounds for the refinement loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Maximum outer generate/execute iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Maximum attempts in the compilation/runtime repair sub-loop.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    /// Maximum attempts to turn a passing test into a failing one.
    #[serde(default = "default_max_refinements")]
    pub max_refinements: u32,
}

fn default_max_iterations() -> u32 {
    20
}

fn default_retry_limit() -> u32 {
    5
}

fn default_max_refinements() -> u32 {
    5
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            retry_limit: default_retry_limit(),
            max_refinements: default_max_refinements(),
        }
    }
}

/// Settings for the script-driven execution sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Directory containing the sandbox driver script; results land here too.
    #[serde(default = "default_script_dir")]
    pub script_dir: PathBuf,
    /// Interpreter used to launch the driver script.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Driver script name, relative to `script_dir`.
    #[serde(default = "default_script")]
    pub script: String,
    /// Project → default test folder mapping file, relative to `script_dir`.
    #[serde(default = "default_test_folders")]
    pub test_folders_file: String,
    /// Staging directory for candidates, relative to `script_dir`.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
    /// File name the candidate is staged under.
    #[serde(default = "default_test_file_name")]
    pub test_file_name: String,
    /// Suffix appended to the run id to name the results file.
    #[serde(default = "default_results_suffix")]
    pub results_suffix: String,
    /// Wall-clock limit for one sandbox run, in seconds.
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,
}

fn default_script_dir() -> PathBuf {
    PathBuf::from("swe-bench-docker")
}

fn default_interpreter() -> String {
    "python".to_string()
}

fn default_script() -> String {
    "execute_in_docker.py".to_string()
}

fn default_test_folders() -> String {
    "test_folders".to_string()
}

fn default_staging_dir() -> String {
    "generated_tests".to_string()
}

fn default_test_file_name() -> String {
    "test_new.py".to_string()
}

fn default_results_suffix() -> String {
    "_test_results_buggy".to_string()
}

fn default_sandbox_timeout() -> u64 {
    1800 // 30 minutes - container startup plus the test run
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            script_dir: default_script_dir(),
            interpreter: default_interpreter(),
            script: default_script(),
            test_folders_file: default_test_folders(),
            staging_dir: default_staging_dir(),
            test_file_name: default_test_file_name(),
            results_suffix: default_results_suffix(),
            timeout_secs: default_sandbox_timeout(),
        }
    }
}

impl SandboxConfig {
    /// Returns the sandbox timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the staging directory under `script_dir`.
    pub fn staging_path(&self) -> PathBuf {
        self.script_dir.join(&self.staging_dir)
    }

    /// Returns the path of the results file for a run.
    pub fn results_path(&self, run_id: &str) -> PathBuf {
        self.script_dir.join(format!("{}{}", run_id, self.results_suffix))
    }
}

/// Which generation backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Claude Code CLI in print mode.
    #[default]
    Claude,
    /// Gemini CLI in non-interactive mode.
    Gemini,
}

/// Settings for the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Backend to use.
    #[serde(default)]
    pub backend: Backend,
    /// Model to request, passed through to the backend.
    #[serde(default)]
    pub model: Option<String>,
    /// Custom path to the backend CLI.
    #[serde(default)]
    pub cli_path: Option<String>,
    /// Retries on rate limiting before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial retry delay in seconds.
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_secs: u64,
    /// Maximum retry delay in seconds.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,
    /// Wall-clock limit for a single generation call, in seconds.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_initial() -> u64 {
    2
}

fn default_backoff_max() -> u64 {
    60
}

fn default_generation_timeout() -> u64 {
    600
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            model: None,
            cli_path: None,
            max_retries: default_max_retries(),
            backoff_initial_secs: default_backoff_initial(),
            backoff_max_secs: default_backoff_max(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl Backend {
    /// Parses a backend name as used in `REFINER_BACKEND`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "claude" => Some(Backend::Claude),
            "gemini" => Some(Backend::Gemini),
            _ => None,
        }
    }
}

impl GenerationConfig {
    /// Returns the initial backoff as a Duration.
    pub fn backoff_initial(&self) -> Duration {
        Duration::from_secs(self.backoff_initial_secs)
    }

    /// Returns the maximum backoff as a Duration.
    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    /// Returns the per-call timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root directory for per-run trajectory artifacts.
    #[serde(default = "default_trajectories_dir")]
    pub trajectories_dir: PathBuf,
}

fn default_trajectories_dir() -> PathBuf {
    PathBuf::from(".regression-refiner/trajectories")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            trajectories_dir: default_trajectories_dir(),
        }
    }
}

/// Top-level refiner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefinerConfig {
    /// Loop bounds.
    #[serde(default)]
    pub refinement: RefinementConfig,
    /// Sandbox settings.
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Generation service settings.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Output locations.
    #[serde(default)]
    pub paths: PathsConfig,
}

impl RefinerConfig {
    /// Loads configuration from a TOML or YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("invalid YAML in {}: {}", path.display(), e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("invalid TOML in {}: {}", path.display(), e)))
        }
    }

    /// Loads configuration from `REFINER_CONFIG`, falling back to defaults,
    /// then applies a `REFINER_BACKEND` override.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load(Path::new(&path))?,
            _ => Self::default(),
        };

        if let Ok(name) = std::env::var(BACKEND_ENV_VAR) {
            config.generation.backend = Backend::from_name(&name)
                .ok_or_else(|| Error::Config(format!("unknown backend '{}'", name)))?;
        }

        Ok(config)
    }
}

impl Validate for RefinementConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.max_iterations == 0 {
            result.add_error("max_iterations must be at least 1");
        }
        if self.retry_limit == 0 {
            result.add_error("retry_limit must be at least 1");
        }
        if self.max_refinements == 0 {
            result.add_warning("max_refinements of 0 disables refining passing tests");
        }

        result
    }
}

impl Validate for SandboxConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.timeout_secs == 0 {
            result.add_error("sandbox timeout_secs must be greater than 0");
        }
        if self.test_file_name.contains('#') || self.staging_dir.contains('#') {
            result.add_error("sandbox paths may not contain '#'");
        }
        if self.timeout_secs > 7200 {
            result.add_warning("sandbox timeout over 2 hours may indicate a misconfiguration");
        }

        result
    }
}

impl Validate for GenerationConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.timeout_secs == 0 {
            result.add_error("generation timeout_secs must be greater than 0");
        }
        if self.backoff_initial_secs > self.backoff_max_secs {
            result.add_warning("backoff_initial_secs exceeds backoff_max_secs");
        }

        result
    }
}

impl Validate for RefinerConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        result.merge(self.refinement.validate());
        result.merge(self.sandbox.validate());
        result.merge(self.generation.validate());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refiner_config_has_sensible_defaults() {
        let config = RefinerConfig::default();

        assert_eq!(config.refinement.max_iterations, 20);
        assert_eq!(config.refinement.retry_limit, 5);
        assert_eq!(config.refinement.max_refinements, 5);
        assert_eq!(config.sandbox.timeout(), Duration::from_secs(1800));
        assert_eq!(config.sandbox.script, "execute_in_docker.py");
        assert_eq!(config.generation.backend, Backend::Claude);
        assert_eq!(config.generation.max_retries, 5);
        assert_eq!(config.generation.backoff_initial(), Duration::from_secs(2));
    }

    #[test]
    fn results_path_uses_run_id_and_suffix() {
        let config = SandboxConfig::default();
        let path = config.results_path("django__django-11583");
        assert_eq!(
            path,
            PathBuf::from("swe-bench-docker/django__django-11583_test_results_buggy")
        );
    }

    #[test]
    fn backend_serializes_correctly() {
        assert_eq!(
            serde_json::to_string(&Backend::Claude).unwrap(),
            "\"claude\""
        );
        assert_eq!(
            serde_json::to_string(&Backend::Gemini).unwrap(),
            "\"gemini\""
        );
    }

    #[test]
    fn backend_from_name_is_case_insensitive() {
        assert_eq!(Backend::from_name("Gemini"), Some(Backend::Gemini));
        assert_eq!(Backend::from_name(" claude "), Some(Backend::Claude));
        assert_eq!(Backend::from_name("gpt"), None);
    }

    #[test]
    fn refiner_config_deserializes_from_toml() {
        let toml = r#"
            [refinement]
            max_iterations = 3
            retry_limit = 2

            [sandbox]
            timeout_secs = 60

            [generation]
            backend = "gemini"
            model = "gemini-2.5-pro"
        "#;

        let config: RefinerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.refinement.max_iterations, 3);
        assert_eq!(config.refinement.retry_limit, 2);
        assert_eq!(config.refinement.max_refinements, 5);
        assert_eq!(config.sandbox.timeout_secs, 60);
        assert_eq!(config.generation.backend, Backend::Gemini);
        assert_eq!(config.generation.model.as_deref(), Some("gemini-2.5-pro"));
    }

    #[test]
    fn refiner_config_loads_yaml_by_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("refiner.yaml");
        std::fs::write(
            &path,
            "refinement:\n  max_iterations: 7\npaths:\n  trajectories_dir: /tmp/traj\n",
        )
        .unwrap();

        let config = RefinerConfig::load(&path).unwrap();
        assert_eq!(config.refinement.max_iterations, 7);
        assert_eq!(config.paths.trajectories_dir, PathBuf::from("/tmp/traj"));
    }

    #[test]
    fn refiner_config_load_reports_bad_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("refiner.toml");
        std::fs::write(&path, "[refinement\nmax_iterations = ").unwrap();

        let err = RefinerConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validate_rejects_zero_iterations() {
        let mut config = RefinerConfig::default();
        config.refinement.max_iterations = 0;

        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("max_iterations"));
    }

    #[test]
    fn validate_warns_on_long_sandbox_timeout() {
        let mut config = RefinerConfig::default();
        config.sandbox.timeout_secs = 10_000;

        let result = config.validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn validation_result_into_result_joins_errors() {
        let mut result = ValidationResult::default();
        result.add_error("first");
        result.add_error("second");

        let err = result.into_result().unwrap_err();
        assert_eq!(err.to_string(), "configuration error: first; second");
    }
}
