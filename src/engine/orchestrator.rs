//! E2E orchestrator
//!
//! Drives one run through its phases:
//!
//! ```text
//! Idle -> Validating -> Discovering -> Running(i) -> Summarizing -> Passed | Failed
//! ```
//!
//! Tests run strictly one at a time; workflows share the working directory
//! and environment and must not race. Telemetry, when configured, gets one
//! event per finished test and is flushed on every exit path.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::error::{FilesystemError, StepError};
use super::result::{RunReport, TestOutcome};
use super::runner::{shell_quote, Invocation, PipelineRunner, RunStatus};
use super::secrets;
use super::synthesizer::{self, ScriptContext, Strategy, SynthesisPlan};
use crate::telemetry::{TelemetrySink, TrackEvent};
use crate::workflow::{discover, parser, DiscoveryOrder};

/// Location of the E2E config relative to the base directory
pub fn e2e_config_path(base_dir: &Path) -> PathBuf {
    base_dir.join("e2e").join("bitrise.yml")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Validating,
    Discovering,
    Running(usize),
    Summarizing,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorOptions {
    /// Stop at the first failed test
    pub fail_fast: bool,
    pub strategy: Strategy,
    pub order: DiscoveryOrder,
    /// Ask the runner to validate the config before the first test
    pub preflight: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            fail_fast: true,
            strategy: Strategy::Direct,
            order: DiscoveryOrder::Declaration,
            preflight: false,
        }
    }
}

impl OrchestratorOptions {
    /// Discovery order actually used. The reference strategy runs tests in
    /// `after_run` order, which must stay the declaration order.
    pub fn effective_order(&self) -> DiscoveryOrder {
        match self.strategy {
            Strategy::Reference => DiscoveryOrder::Declaration,
            _ => self.order,
        }
    }

    /// Options that the chosen strategy cannot honour
    pub fn ignored_settings(&self) -> Vec<String> {
        let mut ignored = Vec::new();
        if self.strategy == Strategy::Reference && self.order != DiscoveryOrder::Declaration {
            ignored.push(format!(
                "order '{}' ignored: the reference strategy keeps declaration order",
                self.order
            ));
        }
        if self.strategy != Strategy::Direct && !self.fail_fast {
            ignored.push(format!(
                "fail_fast=false ignored: the {} strategy stops where the runner stops the aggregate workflow",
                self.strategy
            ));
        }
        ignored
    }
}

struct Telemetry {
    sink: Box<dyn TelemetrySink>,
    parent_url: String,
}

pub struct Orchestrator<R: PipelineRunner> {
    base_dir: PathBuf,
    runner: R,
    options: OrchestratorOptions,
    telemetry: Option<Telemetry>,
    phase: RunPhase,
}

impl<R: PipelineRunner> Orchestrator<R> {
    pub fn new(base_dir: impl AsRef<Path>, runner: R) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            runner,
            options: OrchestratorOptions::default(),
            telemetry: None,
            phase: RunPhase::Idle,
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.options.fail_fast = enabled;
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.options.strategy = strategy;
        self
    }

    pub fn order(mut self, order: DiscoveryOrder) -> Self {
        self.options.order = order;
        self
    }

    pub fn preflight(mut self, enabled: bool) -> Self {
        self.options.preflight = enabled;
        self
    }

    /// Report each finished test to `sink`, tagged with `parent_url`
    pub fn telemetry(mut self, sink: Box<dyn TelemetrySink>, parent_url: impl Into<String>) -> Self {
        self.telemetry = Some(Telemetry {
            sink,
            parent_url: parent_url.into(),
        });
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn config_path(&self) -> PathBuf {
        e2e_config_path(&self.base_dir)
    }

    /// Run the E2E suite.
    ///
    /// `Ok` carries the report whatever the verdict; `Err` is a fatal
    /// configuration or infrastructure problem.
    #[instrument(skip(self), fields(base_dir = %self.base_dir.display(), strategy = %self.options.strategy))]
    pub async fn run(&mut self) -> Result<RunReport, StepError> {
        let result = self.run_phases().await;

        if let Some(telemetry) = self.telemetry.as_mut() {
            debug!("Flushing telemetry");
            telemetry.sink.flush().await;
        }

        self.phase = match &result {
            Ok(report) if report.success() => RunPhase::Passed,
            _ => RunPhase::Failed,
        };
        result
    }

    async fn run_phases(&mut self) -> Result<RunReport, StepError> {
        self.phase = RunPhase::Validating;
        let config_path = self.config_path();
        let exists = config_path
            .try_exists()
            .map_err(|source| FilesystemError::new(&config_path, source))?;
        if !exists {
            return Err(StepError::Precondition(format!(
                "looking for bitrise.yml in e2e directory, path ({}) does not exist",
                config_path.display()
            )));
        }
        info!("Using bitrise.yml from: {}", config_path.display());

        let bytes = tokio::fs::read(&config_path)
            .await
            .map_err(|source| FilesystemError::new(&config_path, source))?;
        let (document, warnings) = parser::parse(&bytes)?;
        for warning in &warnings {
            warn!("{}", warning);
        }

        let secrets = secrets::resolve(&self.base_dir)?;

        self.phase = RunPhase::Discovering;
        for notice in self.options.ignored_settings() {
            warn!("{}", notice);
        }
        let tests = discover(&document, self.options.effective_order());
        let mut report = RunReport::new().with_rerun_command(format!(
            "{} run --config {}",
            shell_quote(&self.runner.program()),
            shell_quote(&config_path.display().to_string())
        ));

        if tests.is_empty() {
            info!("No test workflows found in {}", config_path.display());
            self.phase = RunPhase::Summarizing;
            return Ok(report);
        }
        info!(count = tests.len(), "Discovered test workflows: {}", tests.join(", "));

        let context = ScriptContext::new(&config_path)
            .runner(self.runner.program())
            .inventory(secrets.as_deref());
        let plan = synthesizer::synthesize(self.options.strategy, &document, &tests, &context)?;

        // Keeps the derived config alive until the last invocation returns
        let mut _scratch = None;
        let run_config = match &plan {
            SynthesisPlan::Direct(_) => config_path.clone(),
            SynthesisPlan::Aggregate { document, workflow } => {
                let dir = tempfile::tempdir()
                    .map_err(|source| FilesystemError::new(std::env::temp_dir(), source))?;
                let derived = dir.path().join("bitrise.yml");
                let yaml = synthesizer::to_yaml(document)?;
                tokio::fs::write(&derived, yaml)
                    .await
                    .map_err(|source| FilesystemError::new(&derived, source))?;
                info!("Running aggregate workflow '{}' from {}", workflow, derived.display());
                _scratch = Some(dir);
                derived
            }
        };

        if self.options.preflight {
            self.runner.validate(&run_config, &self.base_dir).await?;
        }

        let workflows = plan.invocations();
        for (index, workflow) in workflows.iter().enumerate() {
            self.phase = RunPhase::Running(index);
            let outcome = self
                .run_test(workflow, &run_config, secrets.as_deref())
                .await?;
            self.report_telemetry(&outcome).await?;

            let failed = !outcome.success;
            report.push(outcome);

            if failed && self.options.fail_fast {
                report.skipped = workflows[index + 1..].to_vec();
                if !report.skipped.is_empty() {
                    warn!(
                        "Fail-fast: skipping {} remaining test(s)",
                        report.skipped.len()
                    );
                }
                break;
            }
        }

        self.phase = RunPhase::Summarizing;
        Ok(report)
    }

    async fn run_test(
        &self,
        workflow: &str,
        config: &Path,
        secrets: Option<&Path>,
    ) -> Result<TestOutcome, StepError> {
        let invocation = Invocation::new(config, workflow, &self.base_dir).with_inventory(secrets);

        let started = Instant::now();
        let status = self.runner.run(&invocation).await?;
        let duration = started.elapsed();

        Ok(match status {
            RunStatus::Succeeded => {
                info!("Test '{}' succeeded", workflow);
                TestOutcome::passed(workflow, duration)
            }
            failed => {
                error!("Test '{}' failed: {}", workflow, failed.describe());
                TestOutcome::failed(workflow, duration, failed.describe())
            }
        })
    }

    async fn report_telemetry(&self, outcome: &TestOutcome) -> Result<(), StepError> {
        if let Some(telemetry) = &self.telemetry {
            let event = TrackEvent::ci_finished(outcome, &telemetry.parent_url);
            telemetry.sink.enqueue(event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = OrchestratorOptions::default();
        assert!(options.fail_fast);
        assert_eq!(options.strategy, Strategy::Direct);
        assert_eq!(options.order, DiscoveryOrder::Declaration);
        assert!(!options.preflight);
    }

    #[test]
    fn test_options_from_partial_yaml() {
        let options: OrchestratorOptions =
            serde_yaml::from_str("fail_fast: false\nstrategy: script\n").unwrap();
        assert!(!options.fail_fast);
        assert_eq!(options.strategy, Strategy::ScriptEmbedding);
        assert_eq!(options.order, DiscoveryOrder::Declaration);
    }

    #[test]
    fn test_reference_strategy_forces_declaration_order() {
        let options = OrchestratorOptions {
            strategy: Strategy::Reference,
            order: DiscoveryOrder::Lexicographic,
            ..Default::default()
        };
        assert_eq!(options.effective_order(), DiscoveryOrder::Declaration);
        assert_eq!(options.ignored_settings().len(), 1);

        let direct = OrchestratorOptions {
            order: DiscoveryOrder::Lexicographic,
            ..Default::default()
        };
        assert_eq!(direct.effective_order(), DiscoveryOrder::Lexicographic);
        assert!(direct.ignored_settings().is_empty());
    }

    #[test]
    fn test_aggregate_strategies_cannot_continue_on_failure() {
        for strategy in [Strategy::Reference, Strategy::ScriptEmbedding] {
            let options = OrchestratorOptions {
                strategy,
                fail_fast: false,
                ..Default::default()
            };
            let ignored = options.ignored_settings();
            assert_eq!(ignored.len(), 1);
            assert!(ignored[0].contains("fail_fast=false"));
        }

        let direct = OrchestratorOptions {
            fail_fast: false,
            ..Default::default()
        };
        assert!(direct.ignored_settings().is_empty());
    }

    #[test]
    fn test_e2e_config_path() {
        assert_eq!(
            e2e_config_path(Path::new("/step")),
            PathBuf::from("/step/e2e/bitrise.yml")
        );
    }
}
