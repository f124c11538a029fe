//! External pipeline runner contract
//!
//! The runner is an opaque subprocess invoked as:
//!
//! ```text
//! <runner> run --config <path> [--inventory <secrets>] <workflow>
//! ```
//!
//! Exit code 0 means the workflow passed, any other exit means the workflow's
//! own steps failed. Failing to start the process at all is an
//! [`ExecutionError`], never a test failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use super::error::ExecutionError;

pub const DEFAULT_RUNNER: &str = "bitrise";

/// One request to run a workflow
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub config: PathBuf,
    pub inventory: Option<PathBuf>,
    pub workflow: String,
    pub working_dir: PathBuf,
    pub envs: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(
        config: impl AsRef<Path>,
        workflow: impl Into<String>,
        working_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            config: config.as_ref().to_path_buf(),
            inventory: None,
            workflow: workflow.into(),
            working_dir: working_dir.as_ref().to_path_buf(),
            envs: Vec::new(),
        }
    }

    pub fn with_inventory(mut self, inventory: Option<&Path>) -> Self {
        self.inventory = inventory.map(Path::to_path_buf);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Runner arguments, without the program itself
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--config".to_string(),
            self.config.display().to_string(),
        ];
        if let Some(inventory) = &self.inventory {
            args.push("--inventory".to_string());
            args.push(inventory.display().to_string());
        }
        args.push(self.workflow.clone());
        args
    }

    /// Shell-pasteable form of the full command
    pub fn printable(&self, program: &str) -> String {
        std::iter::once(program.to_string())
            .chain(self.args())
            .map(|arg| shell_quote(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a runner process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    /// Non-zero exit; `code` is `None` when the process was killed by a signal
    Failed { code: Option<i32> },
}

impl RunStatus {
    pub fn success(&self) -> bool {
        matches!(self, RunStatus::Succeeded)
    }

    pub fn describe(&self) -> String {
        match self {
            RunStatus::Succeeded => "exit status 0".to_string(),
            RunStatus::Failed { code: Some(code) } => format!("exit status {}", code),
            RunStatus::Failed { code: None } => "terminated by signal".to_string(),
        }
    }
}

#[async_trait]
pub trait PipelineRunner: Send + Sync {
    /// Program name shown in logs and re-run hints
    fn program(&self) -> String;

    /// Run one workflow, inheriting the parent's standard streams
    async fn run(&self, invocation: &Invocation) -> Result<RunStatus, ExecutionError>;

    /// Check that the runner accepts `config` before any test starts
    async fn validate(&self, _config: &Path, _working_dir: &Path) -> Result<(), ExecutionError> {
        Ok(())
    }
}

/// Runs workflows through the `bitrise` CLI
#[derive(Debug, Clone)]
pub struct BitriseRunner {
    program: PathBuf,
}

impl BitriseRunner {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }

    /// Resolve `name` on `PATH` (or as a path) up front, so a missing binary
    /// fails before the first test
    pub fn locate(name: &str) -> Result<Self, ExecutionError> {
        let program = which::which(name).map_err(|source| ExecutionError::RunnerNotFound {
            name: name.to_string(),
            source,
        })?;
        Ok(Self::new(program))
    }

    fn spawn_error(&self, source: std::io::Error) -> ExecutionError {
        ExecutionError::Spawn {
            program: self.program.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl PipelineRunner for BitriseRunner {
    fn program(&self) -> String {
        self.program.display().to_string()
    }

    async fn run(&self, invocation: &Invocation) -> Result<RunStatus, ExecutionError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(invocation.args())
            .current_dir(&invocation.working_dir)
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        println!();
        info!("$ {}", invocation.printable(&self.program()));

        let status = cmd.status().await.map_err(|e| self.spawn_error(e))?;

        if status.success() {
            Ok(RunStatus::Succeeded)
        } else {
            Ok(RunStatus::Failed {
                code: status.code(),
            })
        }
    }

    async fn validate(&self, config: &Path, working_dir: &Path) -> Result<(), ExecutionError> {
        info!("Validating {} with {}", config.display(), self.program());

        let output = Command::new(&self.program)
            .args(["validate", "--config"])
            .arg(config)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };

        Err(ExecutionError::Preflight {
            config: config.to_path_buf(),
            detail,
        })
    }
}

/// Quote `arg` for a POSIX shell when it contains anything outside a safe set
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:@,+%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
