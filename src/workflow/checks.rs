//! Embedded lint and unit-test workflows
//!
//! The non-E2E checks the step can run live in a static configuration that
//! ships inside the binary.

/// Static `bitrise.yml` with the `lint` and `unit_test` workflows
pub const CHECK_CONFIG: &str = include_str!("../../assets/check_config.yml");

/// Source of a default configuration document
pub trait DefaultConfigProvider {
    fn config_yaml(&self) -> &str;
}

/// Provider backed by [`CHECK_CONFIG`]
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedChecks;

impl DefaultConfigProvider for EmbeddedChecks {
    fn config_yaml(&self) -> &str {
        CHECK_CONFIG
    }
}
