//! E2E test workflow discovery
//!
//! A workflow is an E2E test when its name starts with `test_` (case-sensitive).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::model::PipelineDocument;
use super::parser::ParseError;

/// Naming convention marking a workflow as an E2E test
pub const TEST_WORKFLOW_PREFIX: &str = "test_";

/// Ordering of discovered test workflows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryOrder {
    /// Order in which workflows are declared in the document
    #[default]
    Declaration,
    /// Sorted by name
    Lexicographic,
}

impl FromStr for DiscoveryOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "declaration" => Ok(Self::Declaration),
            "lexicographic" | "sorted" => Ok(Self::Lexicographic),
            other => Err(format!(
                "unknown discovery order '{}', expected 'declaration' or 'lexicographic'",
                other
            )),
        }
    }
}

impl fmt::Display for DiscoveryOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declaration => f.write_str("declaration"),
            Self::Lexicographic => f.write_str("lexicographic"),
        }
    }
}

pub fn is_test_workflow(name: &str) -> bool {
    name.starts_with(TEST_WORKFLOW_PREFIX)
}

/// Names of every E2E test workflow in `document`
pub fn discover(document: &PipelineDocument, order: DiscoveryOrder) -> Vec<String> {
    let names = document
        .workflow_names()
        .filter(|name| is_test_workflow(name))
        .map(String::from)
        .collect();
    apply_order(names, order)
}

/// Discover test workflows from raw bytes, reading only the `workflows` keys.
///
/// Declaration order is preserved; nothing beyond the workflow names is
/// interpreted, so documents the full parser would reject still work here.
pub fn discover_from_bytes(bytes: &[u8]) -> Result<Vec<String>, ParseError> {
    let root: Value = serde_yaml::from_slice(bytes)?;

    let workflows = match root.get("workflows") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Mapping(workflows)) => workflows,
        Some(_) => {
            return Err(ParseError::Schema(
                "'workflows' must be a mapping".to_string(),
            ))
        }
    };

    let mut result = Vec::new();
    for (key, _) in workflows.iter() {
        let name = key
            .as_str()
            .ok_or_else(|| ParseError::InvalidWorkflowName(format!("{:?}", key)))?;
        if is_test_workflow(name) {
            result.push(name.to_string());
        }
    }
    Ok(result)
}

fn apply_order(mut names: Vec<String>, order: DiscoveryOrder) -> Vec<String> {
    if order == DiscoveryOrder::Lexicographic {
        names.sort();
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::parser::parse_str;

    const DOCUMENT: &str = r#"
format_version: 11
workflows:
  test_zeta:
    steps:
    - script@1: {}
  build:
    steps:
    - script@1: {}
  test_alpha:
    steps:
    - script@1: {}
  Test_upper:
    steps:
    - script@1: {}
  deploy_test_x:
    steps:
    - script@1: {}
"#;

    #[test]
    fn test_discover_declaration_order() {
        let (document, _) = parse_str(DOCUMENT).unwrap();
        let tests = discover(&document, DiscoveryOrder::Declaration);
        assert_eq!(tests, vec!["test_zeta", "test_alpha"]);
    }

    #[test]
    fn test_discover_lexicographic_order() {
        let (document, _) = parse_str(DOCUMENT).unwrap();
        let tests = discover(&document, DiscoveryOrder::Lexicographic);
        assert_eq!(tests, vec!["test_alpha", "test_zeta"]);
    }

    #[test]
    fn test_discover_is_deterministic() {
        let (document, _) = parse_str(DOCUMENT).unwrap();
        let first = discover(&document, DiscoveryOrder::Declaration);
        for _ in 0..10 {
            assert_eq!(discover(&document, DiscoveryOrder::Declaration), first);
        }
    }

    #[test]
    fn test_discover_no_matches() {
        let (document, _) = parse_str(
            r#"
format_version: 11
workflows:
  build:
    steps:
    - script@1: {}
"#,
        )
        .unwrap();
        assert!(discover(&document, DiscoveryOrder::Declaration).is_empty());
    }

    #[test]
    fn test_discover_from_bytes_matches_full_parse() {
        let (document, _) = parse_str(DOCUMENT).unwrap();
        let partial = discover_from_bytes(DOCUMENT.as_bytes()).unwrap();
        assert_eq!(partial, discover(&document, DiscoveryOrder::Declaration));
    }

    #[test]
    fn test_discover_from_bytes_without_workflows() {
        let tests = discover_from_bytes(b"format_version: 11\n").unwrap();
        assert!(tests.is_empty());
    }

    #[test]
    fn test_discover_from_bytes_rejects_non_string_name() {
        let result = discover_from_bytes(b"workflows:\n  42: {}\n");
        assert!(matches!(result, Err(ParseError::InvalidWorkflowName(_))));
    }

    #[test]
    fn test_order_from_str() {
        assert_eq!(
            "declaration".parse::<DiscoveryOrder>().unwrap(),
            DiscoveryOrder::Declaration
        );
        assert_eq!(
            "Lexicographic".parse::<DiscoveryOrder>().unwrap(),
            DiscoveryOrder::Lexicographic
        );
        assert!("random".parse::<DiscoveryOrder>().is_err());
    }
}
