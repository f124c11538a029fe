//! E2E execution engine
//!
//! This module contains:
//! - `orchestrator` - Validate, discover, synthesize, run, summarize
//! - `synthesizer` - Executor workflow strategies
//! - `runner` - External runner contract and the `bitrise` implementation
//! - `secrets` - Secrets file resolution
//! - `checks_runner` - Embedded lint/unit-test workflows
//! - `error` - Engine error types
//! - `result` - Test outcome and run report types

pub mod checks_runner;
pub mod error;
pub mod orchestrator;
pub mod result;
pub mod runner;
pub mod secrets;
pub mod synthesizer;

pub use checks_runner::{run_checks, STEP_DIR_ENV};
pub use error::{ExecutionError, FilesystemError, StepError, SynthesisError};
pub use orchestrator::{e2e_config_path, Orchestrator, OrchestratorOptions, RunPhase};
pub use result::{RunReport, TestOutcome};
pub use runner::{shell_quote, BitriseRunner, Invocation, PipelineRunner, RunStatus, DEFAULT_RUNNER};
pub use secrets::SECRETS_FILE_NAME;
pub use synthesizer::{synthesize, ScriptContext, Strategy, SynthesisPlan, EXECUTOR_WORKFLOW};
