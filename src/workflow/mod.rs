//! Pipeline configuration types and everything that reads them
//!
//! - `model` - PipelineDocument, WorkflowDefinition, ExecutionUnit, EnvItem
//! - `parser` - Parse, normalize and validate configuration bytes
//! - `loader` - Read and write configuration files
//! - `discovery` - Find E2E test workflows by naming convention
//! - `checks` - Embedded lint/unit-test configuration

pub mod checks;
pub mod discovery;
pub mod loader;
pub mod model;
pub mod parser;

pub use checks::{DefaultConfigProvider, EmbeddedChecks, CHECK_CONFIG};
pub use discovery::{
    discover, discover_from_bytes, is_test_workflow, DiscoveryOrder, TEST_WORKFLOW_PREFIX,
};
pub use loader::{ConfigLoader, LoadError};
pub use model::{EnvItem, ExecutionUnit, PipelineDocument, WorkflowDefinition};
pub use parser::{normalize, parse, parse_str, validate, ConfigError, ParseError, ValidationError};
