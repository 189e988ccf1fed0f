//! Trigger matching and evaluation.
//!
//! Each `skip_*` predicate answers whether a pipeline document should be
//! left out of a build because its trigger condition for one axis does not
//! match the value carried by the hook. An empty condition never skips.

use oxide_core::manifest::PipelineDocument;
use oxide_core::repo::{Event, Hook};

/// Commit message directives that suppress a build.
const SKIP_DIRECTIVES: [&str; 3] = ["[ci skip]", "[skip ci]", "***no_ci***"];

/// The axis a pipeline document failed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    Branch,
    Event,
    Action,
    Ref,
    Repo,
    Target,
    Cron,
}

impl Mismatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mismatch::Branch => "branch",
            Mismatch::Event => "event",
            Mismatch::Action => "action",
            Mismatch::Ref => "ref",
            Mismatch::Repo => "repo",
            Mismatch::Target => "deploy target",
            Mismatch::Cron => "cron job",
        }
    }
}

pub fn skip_branch(document: &PipelineDocument, branch: &str) -> bool {
    !document.trigger.branch.matches(branch)
}

pub fn skip_event(document: &PipelineDocument, event: &str) -> bool {
    !document.trigger.event.matches(event)
}

/// Closed pull requests are skipped unless the document explicitly
/// includes the `closed` action.
pub fn skip_action(document: &PipelineDocument, action: &str) -> bool {
    let condition = &document.trigger.action;
    if action == "closed" && !condition.includes(action) {
        return true;
    }
    !condition.matches(action)
}

pub fn skip_ref(document: &PipelineDocument, git_ref: &str) -> bool {
    !document.trigger.git_ref.matches(git_ref)
}

pub fn skip_repo(document: &PipelineDocument, slug: &str) -> bool {
    !document.trigger.repo.matches(slug)
}

pub fn skip_target(document: &PipelineDocument, target: &str) -> bool {
    !document.trigger.target.matches(target)
}

pub fn skip_cron(document: &PipelineDocument, cron: &str) -> bool {
    !document.trigger.cron.matches(cron)
}

/// Run every axis predicate in order and report the first mismatch.
pub fn check(document: &PipelineDocument, hook: &Hook, slug: &str) -> Option<Mismatch> {
    if skip_branch(document, &hook.target) {
        Some(Mismatch::Branch)
    } else if skip_event(document, hook.event.as_str()) {
        Some(Mismatch::Event)
    } else if skip_action(document, &hook.action) {
        Some(Mismatch::Action)
    } else if skip_ref(document, &hook.git_ref) {
        Some(Mismatch::Ref)
    } else if skip_repo(document, slug) {
        Some(Mismatch::Repo)
    } else if skip_target(document, &hook.deployment) {
        Some(Mismatch::Target)
    } else if skip_cron(document, &hook.cron) {
        Some(Mismatch::Cron)
    } else {
        None
    }
}

/// Whether the hook's commit message or title asks to skip the build. Tags
/// are always built.
pub fn skip_message(hook: &Hook) -> bool {
    if hook.event == Event::Tag {
        return false;
    }
    skip_message_eval(&hook.message) || skip_message_eval(&hook.title)
}

pub fn skip_message_eval(message: &str) -> bool {
    let lower = message.to_lowercase();
    SKIP_DIRECTIVES.iter().any(|directive| lower.contains(directive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_core::manifest::Manifest;

    fn document(yaml: &str) -> PipelineDocument {
        let manifest = Manifest::parse(yaml).unwrap();
        manifest.pipelines().next().unwrap().clone()
    }

    #[test]
    fn test_empty_conditions_never_skip() {
        let doc = document("kind: pipeline\n");
        assert!(!skip_branch(&doc, "main"));
        assert!(!skip_event(&doc, "push"));
        assert!(!skip_action(&doc, "opened"));
        assert!(!skip_ref(&doc, "refs/heads/main"));
        assert!(!skip_repo(&doc, "octocat/hello-world"));
        assert!(!skip_target(&doc, ""));
        assert!(!skip_cron(&doc, "nightly"));
        assert_eq!(check(&doc, &Hook::default(), "octocat/hello-world"), None);
    }

    #[test]
    fn test_skip_branch() {
        let doc = document("kind: pipeline\ntrigger:\n  branch: [main, release/*]\n");
        assert!(!skip_branch(&doc, "main"));
        assert!(!skip_branch(&doc, "release/v1"));
        assert!(skip_branch(&doc, "develop"));
        assert!(skip_branch(&doc, "release/v1/hotfix"));
    }

    #[test]
    fn test_skip_event_exclude() {
        let doc = document("kind: pipeline\ntrigger:\n  event:\n    exclude: [pull_request]\n");
        assert!(skip_event(&doc, "pull_request"));
        assert!(!skip_event(&doc, "push"));
    }

    #[test]
    fn test_skip_action_closed_by_default() {
        let doc = document("kind: pipeline\n");
        assert!(skip_action(&doc, "closed"));
        assert!(!skip_action(&doc, "synchronized"));

        let doc = document("kind: pipeline\ntrigger:\n  action: [opened, closed]\n");
        assert!(!skip_action(&doc, "closed"));
        assert!(!skip_action(&doc, "opened"));
        assert!(skip_action(&doc, "synchronized"));
    }

    #[test]
    fn test_skip_ref_and_repo() {
        let doc = document(
            "kind: pipeline\ntrigger:\n  ref: refs/tags/*\n  repo:\n    exclude: octocat/*\n",
        );
        assert!(!skip_ref(&doc, "refs/tags/v1.0.0"));
        assert!(skip_ref(&doc, "refs/heads/main"));
        assert!(skip_repo(&doc, "octocat/hello-world"));
        assert!(!skip_repo(&doc, "spaceghost/hello-world"));
    }

    #[test]
    fn test_skip_target_and_cron() {
        let doc = document("kind: pipeline\ntrigger:\n  target: production\n  cron: nightly\n");
        assert!(!skip_target(&doc, "production"));
        assert!(skip_target(&doc, "staging"));
        assert!(!skip_cron(&doc, "nightly"));
        assert!(skip_cron(&doc, "hourly"));
    }

    #[test]
    fn test_check_reports_first_mismatch() {
        let doc = document("kind: pipeline\ntrigger:\n  branch: main\n  event: push\n");
        let mut hook = Hook {
            target: "develop".to_string(),
            event: Event::PullRequest,
            ..Default::default()
        };
        assert_eq!(check(&doc, &hook, "octocat/hello-world"), Some(Mismatch::Branch));

        hook.target = "main".to_string();
        assert_eq!(check(&doc, &hook, "octocat/hello-world"), Some(Mismatch::Event));

        hook.event = Event::Push;
        assert_eq!(check(&doc, &hook, "octocat/hello-world"), None);
    }

    #[test]
    fn test_skip_message_eval() {
        assert!(skip_message_eval("foo [CI SKIP] bar"));
        assert!(skip_message_eval("[skip ci]"));
        assert!(skip_message_eval("release ***NO_CI***"));
        assert!(!skip_message_eval("normal message"));
        assert!(!skip_message_eval(""));
    }

    #[test]
    fn test_skip_message_checks_title() {
        let hook = Hook {
            title: "Update README [skip ci]".to_string(),
            message: "docs".to_string(),
            ..Default::default()
        };
        assert!(skip_message(&hook));
    }

    #[test]
    fn test_tags_bypass_skip_message() {
        let hook = Hook {
            event: Event::Tag,
            message: "v1.0.0 [ci skip]".to_string(),
            ..Default::default()
        };
        assert!(!skip_message(&hook));
    }
}
