//! Test outcome and run report types

use std::fmt::Write as _;
use std::time::Duration;

/// Result of one test workflow run
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub workflow: String,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<String>,
}

impl TestOutcome {
    pub fn passed(workflow: impl Into<String>, duration: Duration) -> Self {
        Self {
            workflow: workflow.into(),
            success: true,
            duration,
            error: None,
        }
    }

    pub fn failed(workflow: impl Into<String>, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            success: false,
            duration,
            error: Some(error.into()),
        }
    }

    /// Status label used in telemetry
    pub fn status(&self) -> &'static str {
        if self.success {
            "success"
        } else {
            "error"
        }
    }

    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Outcomes of a run, in execution order
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<TestOutcome>,
    /// Tests never started because fail-fast stopped the run
    pub skipped: Vec<String>,
    /// Command prefix that re-runs a single workflow, e.g. `bitrise run --config e2e/bitrise.yml`
    pub rerun_command: Option<String>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rerun_command(mut self, command: impl Into<String>) -> Self {
        self.rerun_command = Some(command.into());
        self
    }

    pub fn push(&mut self, outcome: TestOutcome) {
        self.outcomes.push(outcome);
    }

    /// True when every outcome succeeded; vacuously true for an empty run
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.passed_count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    /// Human-readable summary, one line per outcome
    pub fn summary(&self) -> String {
        let mut out = String::new();

        if self.outcomes.is_empty() {
            out.push_str("No test workflows were run\n");
        }

        for outcome in &self.outcomes {
            let secs = outcome.duration.as_secs_f64();
            if outcome.success {
                let _ = writeln!(out, "OK   {} ({:.2}s)", outcome.workflow, secs);
            } else {
                let _ = writeln!(
                    out,
                    "FAIL {} ({:.2}s): {}",
                    outcome.workflow,
                    secs,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        if !self.skipped.is_empty() {
            let _ = writeln!(out, "Skipped: {}", self.skipped.join(", "));
        }

        let _ = writeln!(
            out,
            "Passed: {}, Failed: {}",
            self.passed_count(),
            self.failed_count()
        );

        if let Some(command) = &self.rerun_command {
            for failure in self.failures() {
                let _ = writeln!(out, "Re-run: {} {}", command, failure.workflow);
            }
        }

        out
    }
}
