//! Pipeline manifest types.
//!
//! A manifest is the resolved, multi-document YAML configuration of a
//! repository. Each document declares its `kind`; pipeline documents become
//! stages of a build, signature documents carry the HMAC used to verify
//! protected repositories, and everything else is carried along untouched.

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Name given to pipeline documents that do not declare one.
pub const DEFAULT_PIPELINE_NAME: &str = "default";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("yaml: found unknown directive name")]
    UnknownDirective,
    #[error("yaml: missing kind attribute")]
    MissingKind,
    #[error("yaml: {0}")]
    Yaml(serde_yaml::Error),
}

impl From<serde_yaml::Error> for ManifestError {
    fn from(e: serde_yaml::Error) -> Self {
        // The scanner appends a position to the message; the directive
        // failure is reported without it.
        if e.to_string().starts_with("found unknown directive name") {
            ManifestError::UnknownDirective
        } else {
            ManifestError::Yaml(e)
        }
    }
}

/// Structural problems reported by a manifest linter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LintError {
    #[error("linter: duplicate pipeline names")]
    DuplicatePipeline,
    #[error("linter: invalid or missing pipeline dependency")]
    MissingPipelineDependency,
    #[error("linter: duplicate step names")]
    DuplicateStep,
    #[error("linter: invalid or missing step dependency")]
    MissingStepDependency,
    #[error("linter: untrusted repositories cannot enable privileged mode")]
    PrivilegedUntrusted,
    #[error("linter: {0}")]
    Other(String),
}

/// Parsed multi-document configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Pipeline(PipelineDocument),
    Signature(SignatureDocument),
    Secret(SecretDocument),
    Other { kind: String },
}

impl Manifest {
    /// Parse a YAML stream into its documents, in order.
    pub fn parse(data: &str) -> Result<Self, ManifestError> {
        let mut resources = Vec::new();
        for document in serde_yaml::Deserializer::from_str(data) {
            let value = serde_yaml::Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }
            let kind = value
                .get("kind")
                .and_then(serde_yaml::Value::as_str)
                .ok_or(ManifestError::MissingKind)?
                .to_string();

            let resource = match kind.as_str() {
                "pipeline" => Resource::Pipeline(serde_yaml::from_value(value)?),
                "signature" => Resource::Signature(serde_yaml::from_value(value)?),
                "secret" => Resource::Secret(serde_yaml::from_value(value)?),
                _ => Resource::Other { kind },
            };
            resources.push(resource);
        }

        Ok(Self { resources })
    }

    /// Pipeline documents in manifest order.
    pub fn pipelines(&self) -> impl Iterator<Item = &PipelineDocument> {
        self.resources.iter().filter_map(|resource| match resource {
            Resource::Pipeline(pipeline) => Some(pipeline),
            _ => None,
        })
    }

    pub fn signature(&self) -> Option<&SignatureDocument> {
        self.resources.iter().find_map(|resource| match resource {
            Resource::Signature(signature) => Some(signature),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineDocument {
    pub kind: String,
    #[serde(rename = "type")]
    pub pipeline_type: String,
    pub name: String,
    pub platform: Platform,
    pub concurrency: Concurrency,
    pub depends_on: Vec<String>,
    pub trigger: TriggerConditions,
    /// Labels used to route the stage to matching runners.
    pub node: HashMap<String, String>,
    pub steps: Vec<StepDocument>,
}

impl PipelineDocument {
    /// The document name, or `"default"` when it has none.
    pub fn resolved_name(&self) -> &str {
        if self.name.is_empty() {
            DEFAULT_PIPELINE_NAME
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Platform {
    pub os: String,
    pub arch: String,
    pub variant: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Concurrency {
    pub limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDocument {
    pub name: String,
    pub image: String,
    pub privileged: bool,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureDocument {
    pub hmac: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretDocument {
    pub name: String,
}

/// Per-axis trigger conditions of a pipeline document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConditions {
    pub branch: Condition,
    pub event: Condition,
    pub action: Condition,
    #[serde(rename = "ref")]
    pub git_ref: Condition,
    pub repo: Condition,
    pub target: Condition,
    pub cron: Condition,
    pub status: Condition,
    pub instance: Condition,
}

/// Include/exclude glob lists for a single trigger axis.
///
/// Accepts a scalar (`branch: main`), a list (`branch: [main, dev]`), or a
/// map with `include`/`exclude` keys, each of which may itself be a scalar
/// or a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConditionRepr")]
pub struct Condition {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn includes(&self, value: &str) -> bool {
        self.include.iter().any(|p| pattern_matches(p, value))
    }

    pub fn excludes(&self, value: &str) -> bool {
        self.exclude.iter().any(|p| pattern_matches(p, value))
    }

    /// Exclusions win over inclusions; an empty include list admits
    /// everything that is not excluded.
    pub fn matches(&self, value: &str) -> bool {
        if self.excludes(value) {
            return false;
        }
        if self.includes(value) {
            return true;
        }
        self.include.is_empty()
    }
}

fn pattern_matches(pattern: &str, value: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    match Pattern::new(pattern) {
        Ok(compiled) => compiled.matches_with(value, options),
        Err(_) => pattern == value,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConditionRepr {
    Scalar(String),
    List(Vec<String>),
    Map {
        #[serde(default)]
        include: Option<OneOrMany>,
        #[serde(default)]
        exclude: Option<OneOrMany>,
    },
}

impl From<ConditionRepr> for Condition {
    fn from(repr: ConditionRepr) -> Self {
        match repr {
            ConditionRepr::Scalar(s) => Condition {
                include: vec![s],
                exclude: vec![],
            },
            ConditionRepr::List(include) => Condition {
                include,
                exclude: vec![],
            },
            ConditionRepr::Map { include, exclude } => Condition {
                include: include.map(Into::into).unwrap_or_default(),
                exclude: exclude.map(Into::into).unwrap_or_default(),
            },
        }
    }
}
