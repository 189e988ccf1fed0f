//! Structural checks applied to a parsed manifest before a build is created.

use oxide_core::manifest::{LintError, Manifest, PipelineDocument};
use oxide_core::ports::Linter;
use std::collections::HashSet;

/// Default [`Linter`]: unique names, resolvable dependencies, and no
/// privileged steps in untrusted repositories.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestLinter;

impl ManifestLinter {
    pub fn new() -> Self {
        Self
    }

    fn lint_pipeline(&self, pipeline: &PipelineDocument, trusted: bool) -> Result<(), LintError> {
        let mut names = HashSet::new();
        for step in &pipeline.steps {
            if !names.insert(step.name.as_str()) {
                return Err(LintError::DuplicateStep);
            }
        }
        for step in &pipeline.steps {
            if step.depends_on.iter().any(|dep| !names.contains(dep.as_str())) {
                return Err(LintError::MissingStepDependency);
            }
            if step.privileged && !trusted {
                return Err(LintError::PrivilegedUntrusted);
            }
        }
        Ok(())
    }
}

impl Linter for ManifestLinter {
    fn lint(&self, manifest: &Manifest, trusted: bool) -> Result<(), LintError> {
        let mut names = HashSet::new();
        for pipeline in manifest.pipelines() {
            if !names.insert(pipeline.resolved_name()) {
                return Err(LintError::DuplicatePipeline);
            }
        }
        for pipeline in manifest.pipelines() {
            if pipeline
                .depends_on
                .iter()
                .any(|dep| !names.contains(dep.as_str()))
            {
                return Err(LintError::MissingPipelineDependency);
            }
            self.lint_pipeline(pipeline, trusted)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lint(yaml: &str, trusted: bool) -> Result<(), LintError> {
        let manifest = Manifest::parse(yaml).unwrap();
        ManifestLinter::new().lint(&manifest, trusted)
    }

    #[test]
    fn test_valid_manifest() {
        let yaml = r#"
kind: pipeline
name: backend
steps:
- name: build
  image: rust
- name: test
  image: rust
  depends_on: [build]
---
kind: pipeline
name: frontend
depends_on: [backend]
"#;
        assert_eq!(lint(yaml, false), Ok(()));
    }

    #[test]
    fn test_duplicate_pipeline_names() {
        let yaml = "kind: pipeline\n---\nkind: pipeline\nname: default\n";
        assert_eq!(lint(yaml, true), Err(LintError::DuplicatePipeline));
    }

    #[test]
    fn test_dependency_on_unnamed_pipeline() {
        let yaml = "kind: pipeline\n---\nkind: pipeline\nname: deploy\ndepends_on: [default]\n";
        assert_eq!(lint(yaml, true), Ok(()));
    }

    #[test]
    fn test_missing_pipeline_dependency() {
        let yaml = "kind: pipeline\nname: deploy\ndepends_on: [build]\n";
        let err = lint(yaml, true).unwrap_err();
        assert_eq!(err.to_string(), "linter: invalid or missing pipeline dependency");
    }

    #[test]
    fn test_duplicate_step_names() {
        let yaml = "kind: pipeline\nsteps:\n- name: build\n- name: build\n";
        assert_eq!(lint(yaml, true), Err(LintError::DuplicateStep));
    }

    #[test]
    fn test_missing_step_dependency() {
        let yaml = "kind: pipeline\nsteps:\n- name: test\n  depends_on: [build]\n";
        assert_eq!(lint(yaml, true), Err(LintError::MissingStepDependency));
    }

    #[test]
    fn test_privileged_requires_trust() {
        let yaml = "kind: pipeline\nsteps:\n- name: dind\n  image: docker:dind\n  privileged: true\n";
        assert_eq!(lint(yaml, false), Err(LintError::PrivilegedUntrusted));
        assert_eq!(lint(yaml, true), Ok(()));
    }
}
