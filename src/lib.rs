//! # Step Check
//!
//! End-to-end test driver for CI steps defined in `bitrise.yml`.
//!
//! ## Features
//!
//! - **Config model** - Parse, normalize and validate `bitrise.yml` documents
//! - **Discovery** - Every workflow named `test_*` is an E2E test
//! - **Synthesis** - Run tests directly or through a generated executor workflow
//! - **Orchestration** - Sequential runs with fail-fast or continue-on-failure
//! - **Telemetry** - Optional per-test `ci_finished` events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use step_check::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runner = BitriseRunner::locate("bitrise")?;
//!     let mut orchestrator = Orchestrator::new(".", runner)
//!         .fail_fast(false)
//!         .strategy(Strategy::Direct);
//!
//!     let report = orchestrator.run().await?;
//!     print!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod telemetry;
pub mod workflow;

// Re-export main types
pub use engine::{
    run_checks, BitriseRunner, ExecutionError, FilesystemError, Invocation, Orchestrator,
    OrchestratorOptions, PipelineRunner, RunPhase, RunReport, RunStatus, StepError, Strategy,
    SynthesisError, SynthesisPlan, TestOutcome,
};
pub use telemetry::{SegmentClient, TelemetryError, TelemetrySettings, TelemetrySink, TrackEvent};
pub use workflow::{
    discover, ConfigError, ConfigLoader, DefaultConfigProvider, DiscoveryOrder, EmbeddedChecks,
    EnvItem, ExecutionUnit, LoadError, ParseError, PipelineDocument, ValidationError,
    WorkflowDefinition,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::engine::{
        run_checks, BitriseRunner, Orchestrator, OrchestratorOptions, PipelineRunner, RunReport,
        StepError, Strategy,
    };
    pub use crate::telemetry::{TelemetrySettings, TelemetrySink};
    pub use crate::workflow::{
        discover, ConfigLoader, DefaultConfigProvider, DiscoveryOrder, EmbeddedChecks,
        PipelineDocument,
    };
}
