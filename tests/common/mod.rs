#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use step_check::engine::{ExecutionError, Invocation, PipelineRunner, RunStatus};
use step_check::telemetry::{TelemetryError, TelemetrySink, TrackEvent};
use tempfile::TempDir;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Write `content` as `<dir>/e2e/bitrise.yml`
pub fn write_e2e_config(dir: &Path, content: &str) -> PathBuf {
    let e2e = dir.join("e2e");
    fs::create_dir_all(&e2e).expect("Failed to create e2e directory");
    let path = e2e.join("bitrise.yml");
    fs::write(&path, content).expect("Failed to write bitrise.yml");
    path
}

pub fn write_secrets(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join(".bitrise.secrets.yml");
    fs::write(&path, content).expect("Failed to write secrets file");
    path
}

/// Config with one trivial workflow per name, in the given order
pub fn config_with_workflows(names: &[&str]) -> String {
    let mut yaml = String::from(
        "format_version: 11\ndefault_step_lib_source: https://github.com/bitrise-io/bitrise-steplib.git\nworkflows:\n",
    );
    for name in names {
        yaml.push_str(&format!(
            "  {}:\n    steps:\n    - script@1:\n        inputs:\n        - content: echo {}\n",
            name, name
        ));
    }
    yaml
}

/// Runner that records invocations and fails the workflows it is told to
#[derive(Clone, Default)]
pub struct FakeRunner {
    failing: HashSet<String>,
    spawn_failure: Option<String>,
    reject_config: bool,
    invocations: Arc<Mutex<Vec<Invocation>>>,
    configs: Arc<Mutex<Vec<String>>>,
    validations: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, workflows: &[&str]) -> Self {
        self.failing.extend(workflows.iter().map(|w| w.to_string()));
        self
    }

    /// Fail to start the process for `workflow`
    pub fn spawn_failure(mut self, workflow: &str) -> Self {
        self.spawn_failure = Some(workflow.to_string());
        self
    }

    pub fn reject_config(mut self) -> Self {
        self.reject_config = true;
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invoked_workflows(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .map(|invocation| invocation.workflow)
            .collect()
    }

    /// Config file contents as seen at each invocation
    pub fn configs(&self) -> Vec<String> {
        self.configs.lock().unwrap().clone()
    }

    pub fn validations(&self) -> Vec<PathBuf> {
        self.validations.lock().unwrap().clone()
    }
}

#[async_trait]
impl PipelineRunner for FakeRunner {
    fn program(&self) -> String {
        "bitrise".to_string()
    }

    async fn run(&self, invocation: &Invocation) -> Result<RunStatus, ExecutionError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let config = fs::read_to_string(&invocation.config).unwrap_or_default();
        self.configs.lock().unwrap().push(config);

        if self.spawn_failure.as_deref() == Some(invocation.workflow.as_str()) {
            return Err(ExecutionError::Spawn {
                program: self.program(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }

        if self.failing.contains(&invocation.workflow) {
            Ok(RunStatus::Failed { code: Some(1) })
        } else {
            Ok(RunStatus::Succeeded)
        }
    }

    async fn validate(&self, config: &Path, _working_dir: &Path) -> Result<(), ExecutionError> {
        self.validations.lock().unwrap().push(config.to_path_buf());
        if self.reject_config {
            return Err(ExecutionError::Preflight {
                config: config.to_path_buf(),
                detail: "invalid config".to_string(),
            });
        }
        Ok(())
    }
}

/// Telemetry sink that keeps events in memory
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<TrackEvent>>>,
    flushed: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TrackEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn was_flushed(&self) -> bool {
        self.flushed.load(Ordering::SeqCst)
    }

    pub fn boxed(&self) -> Box<dyn TelemetrySink> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn enqueue(&self, event: TrackEvent) -> Result<(), TelemetryError> {
        if self.was_flushed() {
            return Err(TelemetryError::Closed);
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn flush(&mut self) {
        self.flushed.store(true, Ordering::SeqCst);
    }
}

/// Shell script standing in for the runner binary.
///
/// Appends its arguments to `<dir>/runner.log` and exits 1 when the last
/// argument is listed in `FAKE_RUNNER_FAIL`.
#[cfg(unix)]
pub fn write_fake_runner(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let log = dir.join("runner.log");
    let script = format!(
        r#"#!/bin/sh
echo "$@" >> '{}'
for last; do :; done
case " $FAKE_RUNNER_FAIL " in
  *" $last "*) exit 1 ;;
esac
exit 0
"#,
        log.display()
    );

    let path = dir.join("fake-bitrise");
    fs::write(&path, script).expect("Failed to write fake runner");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("Failed to make fake runner executable");
    path
}

pub fn runner_log(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("runner.log"))
        .map(|log| log.lines().map(String::from).collect())
        .unwrap_or_default()
}
