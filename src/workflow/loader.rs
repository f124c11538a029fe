//! Configuration file loader
//!
//! Reads a `bitrise.yml` from disk and hands the bytes to the parser, and
//! writes derived documents back out.

use std::path::Path;

use super::model::PipelineDocument;
use super::parser::{self, ConfigError};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error in {file}: {error}")]
    Config { file: String, error: ConfigError },

    #[error("Failed to serialize config for {file}: {error}")]
    Serialize {
        file: String,
        error: serde_yaml::Error,
    },
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate a configuration file, returning its warnings alongside
    pub fn load_file(path: &Path) -> Result<(PipelineDocument, Vec<String>), LoadError> {
        let bytes = std::fs::read(path)?;
        parser::parse(&bytes).map_err(|error| LoadError::Config {
            file: path.display().to_string(),
            error,
        })
    }

    pub fn write_file(path: &Path, document: &PipelineDocument) -> Result<(), LoadError> {
        let yaml = serde_yaml::to_string(document).map_err(|error| LoadError::Serialize {
            file: path.display().to_string(),
            error,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bitrise.yml");

        fs::write(
            &path,
            r#"
format_version: 11
workflows:
  test_smoke:
    steps:
    - script@1:
        inputs:
        - content: echo ok
"#,
        )
        .unwrap();

        let (document, warnings) = ConfigLoader::load_file(&path).unwrap();
        assert!(warnings.is_empty());
        assert!(document.contains("test_smoke"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = ConfigLoader::load_file(&dir.path().join("nope.yml"));
        assert!(matches!(result, Err(LoadError::Io(_))));
    }

    #[test]
    fn test_load_invalid_file_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bitrise.yml");
        fs::write(&path, "workflows:\n  a:\n    after_run: [b]\n").unwrap();

        let err = ConfigLoader::load_file(&path).unwrap_err();
        assert!(err.to_string().contains("bitrise.yml"));
    }

    #[test]
    fn test_write_then_load_preserves_order() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("bitrise.yml");
        fs::write(
            &source,
            r#"
format_version: 11
workflows:
  test_b:
    steps:
    - script@1: {}
  test_a:
    steps:
    - script@1: {}
"#,
        )
        .unwrap();

        let (document, _) = ConfigLoader::load_file(&source).unwrap();
        let target = dir.path().join("out").join("derived.yml");
        ConfigLoader::write_file(&target, &document).unwrap();

        let (reloaded, _) = ConfigLoader::load_file(&target).unwrap();
        let names: Vec<_> = reloaded.workflow_names().collect();
        assert_eq!(names, vec!["test_b", "test_a"]);
        assert_eq!(reloaded, document);
    }
}
