//! Configuration parser
//!
//! Turns raw `bitrise.yml` bytes into a [`PipelineDocument`], then runs a
//! normalize-then-validate pass over it. Byte acquisition is the caller's job.

use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use super::model::{PipelineDocument, RawDocument};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid workflow name: {0}")]
    InvalidWorkflowName(String),

    #[error("Invalid document: {0}")]
    Schema(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Duplicate workflow name: {0}")]
    DuplicateWorkflow(String),

    #[error("Workflow name must not be empty")]
    EmptyWorkflowName,

    #[error("Step #{index} of workflow '{workflow}' has an empty step id")]
    EmptyStepId { workflow: String, index: usize },

    #[error("Workflow '{workflow}' references non-existent workflow '{reference}'")]
    UnknownReference { workflow: String, reference: String },

    #[error("Cyclic workflow reference: {}", .0.join(" -> "))]
    CyclicReference(Vec<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Parse, normalize and validate a configuration document.
///
/// Returns the document with its non-fatal warnings.
pub fn parse(bytes: &[u8]) -> Result<(PipelineDocument, Vec<String>), ConfigError> {
    let raw: RawDocument = serde_yaml::from_slice(bytes).map_err(ParseError::Yaml)?;
    let mut document = from_raw(raw)?;
    normalize(&mut document);
    let warnings = validate(&document)?;
    Ok((document, warnings))
}

pub fn parse_str(yaml: &str) -> Result<(PipelineDocument, Vec<String>), ConfigError> {
    parse(yaml.as_bytes())
}

fn from_raw(raw: RawDocument) -> Result<PipelineDocument, ValidationError> {
    let mut workflows = IndexMap::with_capacity(raw.workflows.0.len());
    for (name, workflow) in raw.workflows.0 {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyWorkflowName);
        }
        if workflows.contains_key(&name) {
            return Err(ValidationError::DuplicateWorkflow(name));
        }
        workflows.insert(name, workflow);
    }

    Ok(PipelineDocument {
        format_version: raw.format_version,
        default_step_lib_source: raw.default_step_lib_source,
        project_type: raw.project_type,
        app: raw.app,
        meta: raw.meta,
        trigger_map: raw.trigger_map,
        extra: raw.extra,
        workflows,
    })
}

/// Fill in implied fields so the document is consistent whatever the input omitted
pub fn normalize(document: &mut PipelineDocument) {
    for (name, workflow) in document.workflows.iter_mut() {
        if workflow.title.trim().is_empty() {
            workflow.title = name.clone();
        }
        for reference in workflow
            .before_run
            .iter_mut()
            .chain(workflow.after_run.iter_mut())
        {
            let trimmed = reference.trim();
            if trimmed.len() != reference.len() {
                *reference = trimmed.to_string();
            }
        }
        for step in workflow.steps.iter_mut() {
            let trimmed = step.id.trim();
            if trimmed.len() != step.id.len() {
                step.id = trimmed.to_string();
            }
        }
    }
}

static WORKFLOW_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap());

/// Check referential integrity and collect advisory warnings
pub fn validate(document: &PipelineDocument) -> Result<Vec<String>, ValidationError> {
    let mut warnings = Vec::new();

    if document.format_version.is_none() {
        warnings.push("missing format_version".to_string());
    }

    for (name, workflow) in &document.workflows {
        if !WORKFLOW_ID_REGEX.is_match(name) {
            warnings.push(format!(
                "invalid workflow ID ({}): doesn't conform to: [A-Za-z0-9-_.]",
                name
            ));
        }

        if workflow.is_empty() {
            warnings.push(format!("workflow ({}) has no steps", name));
        }

        for (index, step) in workflow.steps.iter().enumerate() {
            if step.id.is_empty() {
                return Err(ValidationError::EmptyStepId {
                    workflow: name.clone(),
                    index: index + 1,
                });
            }
        }

        for reference in workflow.references() {
            if !document.contains(reference) {
                return Err(ValidationError::UnknownReference {
                    workflow: name.clone(),
                    reference: reference.clone(),
                });
            }
        }
    }

    if let Some(cycle) = find_cycle(document) {
        return Err(ValidationError::CyclicReference(cycle));
    }

    Ok(warnings)
}

/// Depth-first search over `before_run`/`after_run` edges, in declaration order
fn find_cycle(document: &PipelineDocument) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        document: &'a PipelineDocument,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(name) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(name.to_string());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(name, Mark::Visiting);
        stack.push(name);

        if let Some(workflow) = document.workflow(name) {
            for reference in workflow.references() {
                if let Some(cycle) = visit(reference, document, marks, stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        marks.insert(name, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    for name in document.workflow_names() {
        if let Some(cycle) = visit(name, document, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_document() {
        let yaml = r#"
format_version: 11
workflows:
  build:
    steps:
    - script@1:
        inputs:
        - content: make
  test_login:
    after_run:
    - build
"#;

        let (document, warnings) = parse_str(yaml).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
        assert_eq!(document.format_version.as_deref(), Some("11"));
        assert_eq!(document.workflows.len(), 2);
        assert_eq!(document.workflow("build").unwrap().title, "build");
        assert_eq!(
            document.workflow("test_login").unwrap().after_run,
            vec!["build"]
        );
    }

    #[test]
    fn test_steps_not_a_sequence_is_parse_error() {
        let yaml = r#"
format_version: 11
workflows:
  build:
    steps: "make"
"#;

        let result = parse_str(yaml);
        assert!(matches!(result, Err(ConfigError::Parse(ParseError::Yaml(_)))));
    }

    #[test]
    fn test_workflows_wrong_shape_is_parse_error() {
        let result = parse_str("workflows: [a, b]\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let result = parse_str("workflows:\n  build: [\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_duplicate_workflow_name() {
        let yaml = r#"
format_version: 11
workflows:
  build: {}
  build: {}
"#;

        let result = parse_str(yaml);
        assert!(matches!(
            result,
            Err(ConfigError::Validation(ValidationError::DuplicateWorkflow(ref name))) if name == "build"
        ));
    }

    #[test]
    fn test_unknown_after_run_reference() {
        let yaml = r#"
format_version: 11
workflows:
  test_a:
    after_run: [missing]
"#;

        let result = parse_str(yaml);
        assert!(matches!(
            result,
            Err(ConfigError::Validation(ValidationError::UnknownReference { .. }))
        ));
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let yaml = r#"
format_version: 11
workflows:
  loop:
    after_run: [loop]
"#;

        let result = parse_str(yaml);
        match result {
            Err(ConfigError::Validation(ValidationError::CyclicReference(path))) => {
                assert_eq!(path, vec!["loop", "loop"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_indirect_cycle_through_before_run() {
        let yaml = r#"
format_version: 11
workflows:
  a:
    after_run: [b]
  b:
    before_run: [c]
  c:
    after_run: [a]
"#;

        let result = parse_str(yaml);
        match result {
            Err(ConfigError::Validation(ValidationError::CyclicReference(path))) => {
                assert_eq!(path, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_shared_reference_is_not_a_cycle() {
        let yaml = r#"
format_version: 11
workflows:
  setup:
    steps:
    - script@1: {}
  test_a:
    before_run: [setup]
  test_b:
    before_run: [setup]
"#;

        assert!(parse_str(yaml).is_ok());
    }

    #[test]
    fn test_warnings_are_not_fatal() {
        let yaml = r#"
workflows:
  "bad name!":
    steps:
    - script@1: {}
  empty: {}
"#;

        let (document, warnings) = parse_str(yaml).unwrap();
        assert_eq!(document.workflows.len(), 2);
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("format_version"));
        assert!(warnings[1].contains("bad name!"));
        assert!(warnings[2].contains("empty"));
    }

    #[test]
    fn test_normalize_fills_title_and_trims_references() {
        let yaml = r#"
format_version: 11
workflows:
  setup:
    title: Setup env
    steps:
    - " script@1 ": {}
  test_a:
    before_run: [" setup "]
"#;

        let (document, _) = parse_str(yaml).unwrap();
        let setup = document.workflow("setup").unwrap();
        assert_eq!(setup.title, "Setup env");
        assert_eq!(setup.steps[0].id, "script@1");
        let test_a = document.workflow("test_a").unwrap();
        assert_eq!(test_a.title, "test_a");
        assert_eq!(test_a.before_run, vec!["setup"]);
    }

    #[test]
    fn test_non_string_workflow_name() {
        let yaml = r#"
format_version: 11
workflows:
  123: {}
"#;

        assert!(matches!(parse_str(yaml), Err(ConfigError::Parse(_))));
    }
}
