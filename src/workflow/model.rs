//! Pipeline document, workflow, and step definitions
//!
//! These types mirror the subset of the `bitrise.yml` format the step needs:
//! named workflows made of steps, chained through `before_run`/`after_run`.

use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;

// ============================================================================
// PipelineDocument
// ============================================================================

/// A parsed, normalized pipeline configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_step_lib_source: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,

    /// App-level envs and settings, kept verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_map: Option<Value>,

    /// Top-level keys not modelled here (`step_bundles`, `pipelines`,
    /// `include`, ...), kept verbatim so derived documents stay runnable
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,

    /// Workflows in declaration order
    pub workflows: IndexMap<String, WorkflowDefinition>,
}

impl PipelineDocument {
    pub fn workflow(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// Workflow names in declaration order
    pub fn workflow_names(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    /// An empty document carrying the same format header
    pub fn header_only(&self) -> Self {
        Self {
            format_version: self.format_version.clone(),
            default_step_lib_source: self.default_step_lib_source.clone(),
            ..Default::default()
        }
    }
}

/// Document as it comes out of the YAML deserializer, before duplicate
/// workflow names are rejected.
#[derive(Debug, Deserialize)]
pub(crate) struct RawDocument {
    #[serde(default, deserialize_with = "optional_scalar")]
    pub format_version: Option<String>,
    #[serde(default)]
    pub default_step_lib_source: Option<String>,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub app: Option<Value>,
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub trigger_map: Option<Value>,
    #[serde(default)]
    pub workflows: WorkflowEntries,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Workflow entries in declaration order, duplicates included
#[derive(Debug, Default)]
pub(crate) struct WorkflowEntries(pub Vec<(String, WorkflowDefinition)>);

impl<'de> Deserialize<'de> for WorkflowEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = WorkflowEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of workflow names to workflow definitions")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(WorkflowEntries::default())
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some(key) = map.next_key::<Value>()? {
                    let name = match key {
                        Value::String(name) => name,
                        other => {
                            return Err(de::Error::custom(format!(
                                "workflow name must be a string, found {}",
                                describe(&other)
                            )))
                        }
                    };
                    let workflow: Option<WorkflowDefinition> = map.next_value()?;
                    entries.push((name, workflow.unwrap_or_default()));
                }
                Ok(WorkflowEntries(entries))
            }
        }

        deserializer.deserialize_any(EntriesVisitor)
    }
}

// ============================================================================
// WorkflowDefinition
// ============================================================================

/// A named pipeline of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Identifier, normalized to the workflow's key when omitted
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Workflows to run before this one
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub before_run: Vec<String>,

    /// Workflows to run after this one, in order
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub after_run: Vec<String>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub envs: Vec<EnvItem>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub steps: Vec<ExecutionUnit>,

    /// Other workflow keys (`meta`, `triggers`, `status_report_name`, ...)
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl WorkflowDefinition {
    /// Every workflow this one references, `before_run` first
    pub fn references(&self) -> impl Iterator<Item = &String> {
        self.before_run.iter().chain(self.after_run.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.before_run.is_empty() && self.after_run.is_empty()
    }
}

// ============================================================================
// ExecutionUnit
// ============================================================================

/// A single step invocation, written in YAML as `- <step-id>: <body>`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionUnit {
    /// Step reference, e.g. `script@1`
    pub id: String,
    pub title: Option<String>,
    pub is_always_run: Option<bool>,
    pub run_if: Option<String>,
    pub inputs: Vec<EnvItem>,
    /// Step fields this model does not interpret
    pub extra: IndexMap<String, Value>,
}

impl ExecutionUnit {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.push(EnvItem::new(key, value));
        self
    }

    /// Look up an input value by key
    pub fn input(&self, key: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.as_str())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StepBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_always_run: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    run_if: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    inputs: Vec<EnvItem>,
    #[serde(flatten)]
    extra: IndexMap<String, Value>,
}

impl<'de> Deserialize<'de> for ExecutionUnit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let item: IndexMap<String, Option<StepBody>> = IndexMap::deserialize(deserializer)?;
        if item.len() != 1 {
            return Err(de::Error::custom(format!(
                "step list item must have exactly one key, found {}",
                item.len()
            )));
        }

        let Some((id, body)) = item.into_iter().next() else {
            return Err(de::Error::custom("empty step list item"));
        };
        let body = body.unwrap_or_default();

        Ok(ExecutionUnit {
            id,
            title: body.title,
            is_always_run: body.is_always_run,
            run_if: body.run_if,
            inputs: body.inputs,
            extra: body.extra,
        })
    }
}

impl Serialize for ExecutionUnit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let body = StepBody {
            title: self.title.clone(),
            is_always_run: self.is_always_run,
            run_if: self.run_if.clone(),
            inputs: self.inputs.clone(),
            extra: self.extra.clone(),
        };
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.id, &body)?;
        map.end()
    }
}

// ============================================================================
// EnvItem
// ============================================================================

/// A `key: value` input or env entry with optional `opts`
#[derive(Debug, Clone, PartialEq)]
pub struct EnvItem {
    pub key: String,
    pub value: String,
    pub opts: Option<Value>,
}

impl EnvItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            opts: None,
        }
    }
}

impl<'de> Deserialize<'de> for EnvItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mapping = serde_yaml::Mapping::deserialize(deserializer)?;
        let mut entry: Option<(String, String)> = None;
        let mut opts = None;

        for (key, value) in mapping {
            let key = match key {
                Value::String(key) => key,
                other => {
                    return Err(de::Error::custom(format!(
                        "env key must be a string, found {}",
                        describe(&other)
                    )))
                }
            };
            if key == "opts" {
                opts = Some(value);
                continue;
            }
            if let Some((first, _)) = &entry {
                return Err(de::Error::custom(format!(
                    "env item must have exactly one key, found '{}' and '{}'",
                    first, key
                )));
            }
            let value = scalar_to_string(value).map_err(|kind| {
                <D::Error as de::Error>::custom(format!(
                    "value of '{}' must be a scalar, found {}",
                    key, kind
                ))
            })?;
            entry = Some((key, value));
        }

        let (key, value) =
            entry.ok_or_else(|| <D::Error as de::Error>::custom("env item has no key"))?;
        Ok(EnvItem { key, value, opts })
    }
}

impl Serialize for EnvItem {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if self.opts.is_some() { 2 } else { 1 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(&self.key, &self.value)?;
        if let Some(opts) = &self.opts {
            map.serialize_entry("opts", opts)?;
        }
        map.end()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_to_string(value)
            .map(Some)
            .map_err(|kind| de::Error::custom(format!("expected a scalar, found {}", kind))),
    }
}

/// Stringify a YAML scalar; `null` becomes the empty string
fn scalar_to_string(value: Value) -> Result<String, &'static str> {
    match value {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(describe(&other)),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
