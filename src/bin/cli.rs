use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use step_check::engine::{e2e_config_path, SynthesisPlan};
use step_check::engine::synthesizer::{self, ScriptContext};
use step_check::prelude::*;
use step_check::workflow::discover_from_bytes;
use tracing_subscriber::EnvFilter;

/// Name in the workflow list that selects the E2E suite
const E2E_WORKFLOW: &str = "e2e";

#[derive(Parser)]
#[command(name = "step-check")]
#[command(about = "Run the E2E test workflows of a CI step", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Step directory containing e2e/bitrise.yml
    #[arg(long, env = "step_dir", default_value = ".", global = true)]
    step_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct RunArgs {
    /// Stop at the first failed test
    #[arg(
        long,
        env = "FAIL_FAST",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    fail_fast: bool,

    /// Execution strategy: direct, reference or script
    #[arg(long, env = "E2E_STRATEGY", default_value = "direct")]
    strategy: Strategy,

    /// Test ordering: declaration or lexicographic
    #[arg(long, env = "E2E_ORDER", default_value = "declaration")]
    order: DiscoveryOrder,

    /// Runner binary
    #[arg(long, env = "BITRISE_BIN", default_value = "bitrise")]
    runner: String,

    /// Validate the config with the runner before the first test
    #[arg(
        long,
        env = "E2E_PREFLIGHT",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    preflight: bool,

    /// Telemetry write key
    #[arg(long, env = "SEGMENT_KEY", hide_env_values = true)]
    segment_key: Option<String>,

    /// Parent build URL attached to telemetry
    #[arg(long, env = "PARENT_URL")]
    parent_url: Option<String>,

    /// Telemetry endpoint
    #[arg(long, env = "SEGMENT_ENDPOINT")]
    analytics_endpoint: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the requested workflows (`e2e` and/or embedded checks)
    Run {
        /// Newline-separated workflow list
        #[arg(long, env = "workflow")]
        workflow: String,

        #[command(flatten)]
        args: RunArgs,
    },

    /// Run the E2E suite only
    E2e {
        #[command(flatten)]
        args: RunArgs,
    },

    /// List discovered E2E test workflows
    List {
        /// Sort by name instead of declaration order
        #[arg(long, env = "E2E_ORDER", default_value = "declaration")]
        order: DiscoveryOrder,
    },

    /// Validate the E2E config without running it
    Validate,

    /// Write the config with the synthesized executor workflow
    Synthesize {
        /// reference or script
        #[arg(long, default_value = "reference")]
        strategy: Strategy,

        /// Output path (default: <step-dir>/e2e/bitrise.e2e.yml)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Runner binary named in generated scripts
        #[arg(long, env = "BITRISE_BIN", default_value = "bitrise")]
        runner: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "step_check=debug"
    } else {
        "step_check=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Step failed");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let step_dir = std::path::absolute(&cli.step_dir)
        .with_context(|| format!("Invalid step directory: {}", cli.step_dir.display()))?;

    match cli.command {
        Commands::Run { workflow, args } => run_step(&step_dir, &workflow, args).await,
        Commands::E2e { args } => {
            let report = run_e2e(&step_dir, &args).await?;
            Ok(report.success())
        }
        Commands::List { order } => list_tests(&step_dir, order).await,
        Commands::Validate => validate(&step_dir).await,
        Commands::Synthesize {
            strategy,
            output,
            runner,
        } => synthesize(&step_dir, strategy, output, runner).await,
    }
}

/// Split the `workflow` input into names, dropping blanks
fn requested_workflows(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

#[tracing::instrument(skip(args), fields(step_dir = %step_dir.display()))]
async fn run_step(step_dir: &Path, workflow: &str, args: RunArgs) -> anyhow::Result<bool> {
    let mut workflows = requested_workflows(workflow);
    if workflows.is_empty() {
        anyhow::bail!("Workflow input is empty, nothing to run");
    }

    let wants_e2e = workflows.iter().any(|name| name == E2E_WORKFLOW);
    workflows.retain(|name| name != E2E_WORKFLOW);

    if wants_e2e {
        let report = run_e2e(step_dir, &args).await?;
        if !report.success() {
            return Ok(false);
        }
    }

    if workflows.is_empty() {
        return Ok(true);
    }

    println!("\nRunning checks: {}\n", workflows.join(", "));
    let runner = BitriseRunner::locate(&args.runner)?;
    let report = run_checks(&runner, &EmbeddedChecks, step_dir, &workflows).await?;

    println!("\n=== Check Results ===\n");
    print!("{}", report.summary());
    Ok(report.success())
}

async fn run_e2e(step_dir: &Path, args: &RunArgs) -> anyhow::Result<RunReport> {
    let runner = BitriseRunner::locate(&args.runner)?;
    let options = OrchestratorOptions {
        fail_fast: args.fail_fast,
        strategy: args.strategy,
        order: args.order,
        preflight: args.preflight,
    };

    let mut orchestrator = Orchestrator::new(step_dir, runner).with_options(options);

    let settings = TelemetrySettings {
        write_key: args.segment_key.clone(),
        parent_url: args.parent_url.clone(),
        endpoint: args.analytics_endpoint.clone(),
    };
    if let Some((sink, parent_url)) = settings.client() {
        orchestrator = orchestrator.telemetry(sink, parent_url);
    } else {
        tracing::debug!("Telemetry disabled");
    }

    println!("Running E2E tests from: {}\n", step_dir.display());
    let report = orchestrator.run().await?;

    println!("\n=== E2E Results ===\n");
    print!("{}", report.summary());
    Ok(report)
}

async fn list_tests(step_dir: &Path, order: DiscoveryOrder) -> anyhow::Result<bool> {
    let config_path = e2e_config_path(step_dir);
    let bytes = tokio::fs::read(&config_path)
        .await
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    let mut tests = discover_from_bytes(&bytes)?;
    if order == DiscoveryOrder::Lexicographic {
        tests.sort();
    }

    if tests.is_empty() {
        println!("No test workflows found in: {}", config_path.display());
        return Ok(true);
    }

    println!("Test workflows in {}:\n", config_path.display());
    for name in &tests {
        println!("  {}", name);
    }
    Ok(true)
}

async fn validate(step_dir: &Path) -> anyhow::Result<bool> {
    let config_path = e2e_config_path(step_dir);
    let (document, warnings) = ConfigLoader::load_file(&config_path)?;

    for warning in &warnings {
        println!("warning: {}", warning);
    }

    let tests = discover(&document, DiscoveryOrder::Declaration);
    println!(
        "✓ {} is valid ({} workflows, {} tests)",
        config_path.display(),
        document.workflows.len(),
        tests.len()
    );
    Ok(true)
}

async fn synthesize(
    step_dir: &Path,
    strategy: Strategy,
    output: Option<PathBuf>,
    runner: String,
) -> anyhow::Result<bool> {
    if strategy == Strategy::Direct {
        anyhow::bail!("The direct strategy has no executor workflow to write");
    }

    let config_path = e2e_config_path(step_dir);
    let (document, _) = ConfigLoader::load_file(&config_path)?;
    let tests = discover(&document, DiscoveryOrder::Declaration);
    if tests.is_empty() {
        anyhow::bail!("No test workflows found in {}", config_path.display());
    }

    let secrets = step_check::engine::secrets::resolve(step_dir)?;
    let context = ScriptContext::new(&config_path)
        .runner(runner)
        .inventory(secrets.as_deref());

    let plan = synthesizer::synthesize(strategy, &document, &tests, &context)?;
    let SynthesisPlan::Aggregate { document, workflow } = plan else {
        anyhow::bail!("Strategy '{}' produced no executor workflow", strategy);
    };

    let output = output.unwrap_or_else(|| config_path.with_file_name("bitrise.e2e.yml"));
    if output == config_path {
        anyhow::bail!("Refusing to overwrite the source config {}", config_path.display());
    }
    ConfigLoader::write_file(&output, &document)?;

    println!(
        "✓ Wrote '{}' ({} tests) to {}",
        workflow,
        tests.len(),
        output.display()
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_workflows() {
        assert_eq!(
            requested_workflows("e2e\n  lint\n\nunit_test  \n"),
            vec!["e2e", "lint", "unit_test"]
        );
        assert!(requested_workflows("\n \n").is_empty());
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "step-check",
            "run",
            "--workflow",
            "e2e",
            "--fail-fast",
            "false",
            "--strategy",
            "script",
        ])
        .unwrap();

        match cli.command {
            Commands::Run { workflow, args } => {
                assert_eq!(workflow, "e2e");
                assert!(!args.fail_fast);
                assert_eq!(args.strategy, Strategy::ScriptEmbedding);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_accepts_yes_no_inputs() {
        let cli = Cli::try_parse_from([
            "step-check",
            "e2e",
            "--fail-fast",
            "no",
            "--preflight",
            "yes",
        ])
        .unwrap();

        match cli.command {
            Commands::E2e { args } => {
                assert!(!args.fail_fast);
                assert!(args.preflight);
            }
            _ => panic!("expected e2e command"),
        }
    }
}
