//! Regression refiner CLI
//!
//! Generates a regression test that reproduces a reported defect.

use std::path::PathBuf;

use regression_refiner::config::{Backend, RefinerConfig, Validate};
use regression_refiner::generation::{
    ClaudeGenerator, GeminiGenerator, GenerationService, RetryingGenerator,
};
use regression_refiner::{
    CandidateStager, ImportUsageSearch, Issue, IssueContext, RefinementController, ScriptSandbox,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <issue.json> <repo_root>", args[0]);
        eprintln!("\nGenerates a test that fails because of the described defect.");
        eprintln!("\nEnvironment variables:");
        eprintln!("  REFINER_CONFIG=<path>          TOML or YAML configuration file");
        eprintln!("  REFINER_BACKEND=claude|gemini  Select generation backend (default: claude)");
        std::process::exit(1);
    }

    let issue_path = PathBuf::from(&args[1]);
    let repo_root = PathBuf::from(&args[2]);

    let config = match RefinerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    match config.validate().into_result() {
        Ok(warnings) => {
            for warning in warnings {
                tracing::warn!(%warning, "configuration warning");
            }
        }
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    }

    let loaded = Issue::load(&issue_path).and_then(|issue| IssueContext::load(issue, &repo_root));
    let context = match loaded {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Failed to load issue: {}", e);
            std::process::exit(1);
        }
    };

    let generation = &config.generation;
    let backend: Box<dyn GenerationService> = match generation.backend {
        Backend::Gemini => {
            tracing::info!("using Gemini backend");
            let generator = match &generation.cli_path {
                Some(path) => GeminiGenerator::with_cli_path(path),
                None => GeminiGenerator::new(),
            };
            Box::new(
                generator
                    .with_model(generation.model.clone())
                    .with_timeout(generation.timeout()),
            )
        }
        Backend::Claude => {
            tracing::info!("using Claude backend");
            let generator = match &generation.cli_path {
                Some(path) => ClaudeGenerator::with_cli_path(path),
                None => ClaudeGenerator::new(),
            };
            Box::new(
                generator
                    .with_model(generation.model.clone())
                    .with_timeout(generation.timeout()),
            )
        }
    };
    let generator = RetryingGenerator::new(backend)
        .with_max_retries(generation.max_retries)
        .with_backoff(generation.backoff_initial(), generation.backoff_max());

    let stager = CandidateStager::new(
        config.sandbox.staging_path(),
        &config.sandbox.test_file_name,
        &context.issue.test_file,
        context.issue.project_name(),
    );
    let sandbox = ScriptSandbox::new(config.sandbox.clone());
    let search = ImportUsageSearch::new(&repo_root);

    let controller = RefinementController::new(generator, sandbox, search, context)
        .with_config(config.refinement.clone())
        .with_stager(stager)
        .with_trajectories_dir(&config.paths.trajectories_dir);

    match controller.run().await {
        Ok(report) => {
            println!("\n{}", "=".repeat(60));
            println!("Refinement Complete: {}", report.github_issue_id);
            println!("{}", "=".repeat(60));
            println!();
            println!("Status: {:?}", report.final_status);
            println!("Steps: {}", report.steps.len());
            if let Some(step) = report.confirmed_at_step {
                println!("Confirmed at step: {}", step);
            }
            println!("Calculated cost: ${:.4}", report.calculated_cost);
            println!("Reported cost: ${:.4}", report.reported_cost);

            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Refinement failed: {}", e);
            std::process::exit(1);
        }
    }
}
