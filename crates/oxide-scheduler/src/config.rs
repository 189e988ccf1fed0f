//! Orchestrator configuration.

use oxide_core::Result;
use oxide_core::build::MAX_MESSAGE_RUNES;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings applied while assembling builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Title and message truncation limit, in characters.
    #[serde(default = "default_max_message_runes")]
    pub max_message_runes: usize,
    #[serde(default = "default_os")]
    pub default_os: String,
    #[serde(default = "default_arch")]
    pub default_arch: String,
    /// Applied to `kind: pipeline` documents that declare no `type`.
    #[serde(default = "default_pipeline_type")]
    pub default_pipeline_type: String,
    /// Global switch for cancelling superseded builds. Repositories still
    /// opt in per event.
    #[serde(default = "default_auto_cancel")]
    pub auto_cancel: bool,
}

fn default_max_message_runes() -> usize {
    MAX_MESSAGE_RUNES
}

fn default_os() -> String {
    "linux".to_string()
}

fn default_arch() -> String {
    "amd64".to_string()
}

fn default_pipeline_type() -> String {
    "docker".to_string()
}

fn default_auto_cancel() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_message_runes: default_max_message_runes(),
            default_os: default_os(),
            default_arch: default_arch(),
            default_pipeline_type: default_pipeline_type(),
            auto_cancel: default_auto_cancel(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_message_runes, 2000);
        assert_eq!(config.default_os, "linux");
        assert_eq!(config.default_arch, "amd64");
        assert_eq!(config.default_pipeline_type, "docker");
        assert!(config.auto_cancel);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: OrchestratorConfig =
            serde_yaml::from_str("auto_cancel: false\ndefault_arch: arm64\n").unwrap();
        assert!(!config.auto_cancel);
        assert_eq!(config.default_arch, "arm64");
        assert_eq!(config.default_os, "linux");
        assert_eq!(config.max_message_runes, 2000);
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("oxide-orchestrator-{}.yml", std::process::id()));
        std::fs::write(&path, "max_message_runes: 100\n").unwrap();

        let config = OrchestratorConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.max_message_runes, 100);
        assert_eq!(config.default_pipeline_type, "docker");
    }

    #[test]
    fn test_from_missing_file() {
        let err = OrchestratorConfig::from_file(Path::new("/nonexistent/oxide.yml")).unwrap_err();
        assert!(matches!(err, oxide_core::Error::Io(_)));
    }
}
