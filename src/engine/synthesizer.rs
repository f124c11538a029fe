//! Executor workflow synthesis
//!
//! Builds the plan the orchestrator executes from the discovered test names:
//!
//! - `direct` - no synthesis; every test is invoked by the orchestrator itself
//! - `reference` - one aggregate workflow whose `after_run` lists every test
//! - `script` - one aggregate workflow with a `script@1` step per test, placed
//!   in a separate document that points back at the source config
//!
//! The source document is never mutated; aggregate strategies work on a copy.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::SynthesisError;
use super::runner::{shell_quote, DEFAULT_RUNNER};
use crate::workflow::{ExecutionUnit, PipelineDocument, WorkflowDefinition};

/// Reserved name of the synthesized aggregate workflow
pub const EXECUTOR_WORKFLOW: &str = "e2e_test_executor_workflow";

const SCRIPT_STEP: &str = "script@1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Direct,
    Reference,
    #[serde(rename = "script")]
    ScriptEmbedding,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "reference" | "after_run" => Ok(Self::Reference),
            "script" | "script-embedding" => Ok(Self::ScriptEmbedding),
            other => Err(format!(
                "unknown strategy '{}', expected 'direct', 'reference' or 'script'",
                other
            )),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Reference => f.write_str("reference"),
            Self::ScriptEmbedding => f.write_str("script"),
        }
    }
}

/// What the orchestrator should run
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisPlan {
    /// Invoke the runner once per test, in order
    Direct(Vec<String>),
    /// Invoke the runner once for `workflow` inside `document`
    Aggregate {
        document: PipelineDocument,
        workflow: String,
    },
}

impl SynthesisPlan {
    /// Workflows the runner is invoked for, in order
    pub fn invocations(&self) -> Vec<String> {
        match self {
            SynthesisPlan::Direct(tests) => tests.clone(),
            SynthesisPlan::Aggregate { workflow, .. } => vec![workflow.clone()],
        }
    }
}

/// Inputs the script strategy bakes into generated steps
#[derive(Debug, Clone)]
pub struct ScriptContext {
    pub runner: String,
    /// Config the generated scripts run tests from
    pub target_config: PathBuf,
    pub inventory: Option<PathBuf>,
}

impl ScriptContext {
    pub fn new(target_config: impl AsRef<Path>) -> Self {
        Self {
            runner: DEFAULT_RUNNER.to_string(),
            target_config: target_config.as_ref().to_path_buf(),
            inventory: None,
        }
    }

    pub fn runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = runner.into();
        self
    }

    pub fn inventory(mut self, inventory: Option<&Path>) -> Self {
        self.inventory = inventory.map(Path::to_path_buf);
        self
    }
}

/// Build the plan for `strategy`. Deterministic for a given `tests` sequence.
pub fn synthesize(
    strategy: Strategy,
    source: &PipelineDocument,
    tests: &[String],
    context: &ScriptContext,
) -> Result<SynthesisPlan, SynthesisError> {
    match strategy {
        Strategy::Direct => Ok(SynthesisPlan::Direct(tests.to_vec())),
        Strategy::Reference => {
            let document = with_reference_executor(source, tests)?;
            Ok(SynthesisPlan::Aggregate {
                document,
                workflow: EXECUTOR_WORKFLOW.to_string(),
            })
        }
        Strategy::ScriptEmbedding => {
            let document = with_script_executor(source, tests, context)?;
            Ok(SynthesisPlan::Aggregate {
                document,
                workflow: EXECUTOR_WORKFLOW.to_string(),
            })
        }
    }
}

/// Copy of `source` with an aggregate workflow chaining every test via `after_run`
pub fn with_reference_executor(
    source: &PipelineDocument,
    tests: &[String],
) -> Result<PipelineDocument, SynthesisError> {
    ensure_name_free(source)?;
    let mut document = source.clone();
    document
        .workflows
        .insert(EXECUTOR_WORKFLOW.to_string(), reference_workflow(tests));
    Ok(document)
}

/// New document holding only a script-per-test aggregate workflow
pub fn with_script_executor(
    source: &PipelineDocument,
    tests: &[String],
    context: &ScriptContext,
) -> Result<PipelineDocument, SynthesisError> {
    ensure_name_free(source)?;
    let mut document = source.header_only();
    document
        .workflows
        .insert(EXECUTOR_WORKFLOW.to_string(), script_workflow(tests, context));
    Ok(document)
}

pub fn reference_workflow(tests: &[String]) -> WorkflowDefinition {
    WorkflowDefinition {
        title: EXECUTOR_WORKFLOW.to_string(),
        after_run: tests.to_vec(),
        ..Default::default()
    }
}

pub fn script_workflow(tests: &[String], context: &ScriptContext) -> WorkflowDefinition {
    let steps = tests
        .iter()
        .map(|test| {
            ExecutionUnit::new(SCRIPT_STEP)
                .with_title(format!("Running {}", test))
                .with_input("content", run_script(test, context))
        })
        .collect();

    WorkflowDefinition {
        title: EXECUTOR_WORKFLOW.to_string(),
        steps,
        ..Default::default()
    }
}

fn run_script(test: &str, context: &ScriptContext) -> String {
    let mut command = vec![
        shell_quote(&context.runner),
        "run".to_string(),
        "--config".to_string(),
        shell_quote(&context.target_config.display().to_string()),
    ];
    if let Some(inventory) = &context.inventory {
        command.push("--inventory".to_string());
        command.push(shell_quote(&inventory.display().to_string()));
    }
    command.push(shell_quote(test));

    format!("#!/usr/bin/env bash\nset -e\n{}\n", command.join(" "))
}

fn ensure_name_free(source: &PipelineDocument) -> Result<(), SynthesisError> {
    if source.contains(EXECUTOR_WORKFLOW) {
        return Err(SynthesisError::NameCollision(EXECUTOR_WORKFLOW.to_string()));
    }
    Ok(())
}

/// Serialize a document back to `bitrise.yml` text
pub fn to_yaml(document: &PipelineDocument) -> Result<String, SynthesisError> {
    Ok(serde_yaml::to_string(document)?)
}
