//! Embedded check runner
//!
//! Runs the `lint` / `unit_test` workflows from a [`DefaultConfigProvider`]
//! against a step directory. Checks run in the requested order and the first
//! failure stops the rest.

use std::path::Path;
use std::time::Instant;

use tracing::{error, info};

use super::error::{FilesystemError, StepError};
use super::result::{RunReport, TestOutcome};
use super::runner::{Invocation, PipelineRunner};
use crate::workflow::{parser, DefaultConfigProvider};

/// Environment variable the embedded workflows read the step directory from
pub const STEP_DIR_ENV: &str = "STEP_DIR";

/// Run `workflows` from the provider's config with `STEP_DIR=<step_dir>`
pub async fn run_checks<R, P>(
    runner: &R,
    provider: &P,
    step_dir: &Path,
    workflows: &[String],
) -> Result<RunReport, StepError>
where
    R: PipelineRunner + ?Sized,
    P: DefaultConfigProvider + ?Sized,
{
    let mut report = RunReport::new();
    if workflows.is_empty() {
        return Ok(report);
    }

    let (document, _) = parser::parse_str(provider.config_yaml())?;
    if let Some(unknown) = workflows.iter().find(|name| !document.contains(name)) {
        let available: Vec<_> = document.workflow_names().collect();
        return Err(StepError::Precondition(format!(
            "unknown workflow '{}', available: {}",
            unknown,
            available.join(", ")
        )));
    }

    let dir = tempfile::tempdir()
        .map_err(|source| FilesystemError::new(std::env::temp_dir(), source))?;
    let config = dir.path().join("bitrise.yml");
    tokio::fs::write(&config, provider.config_yaml())
        .await
        .map_err(|source| FilesystemError::new(&config, source))?;

    let step_dir_value = step_dir.display().to_string();
    for (index, workflow) in workflows.iter().enumerate() {
        let invocation = Invocation::new(&config, workflow, step_dir)
            .with_env(STEP_DIR_ENV, step_dir_value.as_str());

        let started = Instant::now();
        let status = runner.run(&invocation).await?;
        let duration = started.elapsed();

        if status.success() {
            info!("Check '{}' succeeded", workflow);
            report.push(TestOutcome::passed(workflow, duration));
        } else {
            error!("Check '{}' failed: {}", workflow, status.describe());
            report.push(TestOutcome::failed(workflow, duration, status.describe()));
            report.skipped = workflows[index + 1..].to_vec();
            break;
        }
    }

    Ok(report)
}
