//! Build, stage, and step entities.

use crate::ids::{BuildId, RepoId, StageId, StepId};
use crate::repo::{Event, Hook, Repository};
use crate::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default rune limit applied to build titles and messages.
pub const MAX_MESSAGE_RUNES: usize = 2000;

/// One execution of a repository at a commit or ref.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: BuildId,
    pub repo_id: RepoId,
    pub trigger: String,
    pub number: u64,
    pub parent: u64,
    pub status: Status,
    /// Set only when `status` is [`Status::Error`].
    pub error: String,
    pub event: Event,
    pub action: String,
    pub link: String,
    pub title: String,
    pub message: String,
    pub before: String,
    pub after: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub fork: String,
    pub source: String,
    pub target: String,
    pub author_login: String,
    pub author_name: String,
    pub author_email: String,
    pub author_avatar: String,
    pub sender: String,
    pub params: HashMap<String, String>,
    pub cron: String,
    pub deploy: String,
    pub deploy_id: i64,
    pub debug: bool,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Build {
    /// Create a pending build for `repo` numbered with the repository's
    /// current counter, copying the triggering metadata from `hook`.
    pub fn from_hook(repo: &Repository, hook: &Hook, max_runes: usize) -> Self {
        let now = Utc::now();
        Self {
            id: BuildId::new(),
            repo_id: repo.id,
            trigger: hook.trigger.clone(),
            number: repo.counter,
            parent: hook.parent,
            status: Status::Pending,
            error: String::new(),
            event: hook.event,
            action: hook.action.clone(),
            link: hook.link.clone(),
            title: truncate(&hook.title, max_runes),
            message: truncate(&hook.message, max_runes),
            before: hook.before.clone(),
            after: hook.after.clone(),
            git_ref: hook.git_ref.clone(),
            fork: hook.fork.clone(),
            source: hook.source.clone(),
            target: hook.target.clone(),
            author_login: hook.author_login.clone(),
            author_name: hook.author_name.clone(),
            author_email: hook.author_email.clone(),
            author_avatar: hook.author_avatar.clone(),
            sender: hook.sender.clone(),
            params: hook.params.clone(),
            cron: hook.cron.clone(),
            deploy: hook.deployment.clone(),
            deploy_id: hook.deployment_id,
            debug: hook.debug,
            started: None,
            finished: None,
            created: now,
            updated: now,
        }
    }

    /// Turn this build into its terminal error form.
    pub fn fail(&mut self, message: impl Into<String>) {
        let now = Utc::now();
        self.status = Status::Error;
        self.error = message.into();
        self.started = Some(now);
        self.finished = Some(now);
        self.updated = now;
    }
}

/// Truncate `s` to at most `max` characters without splitting a
/// multi-byte character.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// One schedulable unit of a build; corresponds to one pipeline document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub repo_id: RepoId,
    pub build_id: BuildId,
    /// 1-based position in the manifest's matched documents.
    pub number: u32,
    /// Unique within a build; used as the dependency graph key.
    pub name: String,
    pub kind: String,
    #[serde(rename = "type")]
    pub pipeline_type: String,
    pub status: Status,
    pub error: String,
    pub exit_code: i32,
    pub machine: String,
    pub os: String,
    pub arch: String,
    pub variant: String,
    pub kernel: String,
    pub limit: u32,
    pub limit_repo: u32,
    pub started: Option<DateTime<Utc>>,
    pub stopped: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub on_success: bool,
    pub on_failure: bool,
    pub depends_on: Vec<String>,
    pub labels: HashMap<String, String>,
}

impl Stage {
    pub fn new(repo_id: RepoId, build_id: BuildId, number: u32, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: StageId::new(),
            repo_id,
            build_id,
            number,
            name: name.into(),
            kind: String::new(),
            pipeline_type: String::new(),
            status: Status::Waiting,
            error: String::new(),
            exit_code: 0,
            machine: String::new(),
            os: String::new(),
            arch: String::new(),
            variant: String::new(),
            kernel: String::new(),
            limit: 0,
            limit_repo: 0,
            started: None,
            stopped: None,
            created: now,
            updated: now,
            on_success: true,
            on_failure: false,
            depends_on: Vec::new(),
            labels: HashMap::new(),
        }
    }

    fn clear_execution(&mut self) {
        self.error.clear();
        self.exit_code = 0;
        self.machine.clear();
        self.started = None;
        self.stopped = None;
        self.updated = Utc::now();
    }

    /// Reset a restarted stage so it can be queued again.
    pub fn reset_pending(&mut self) {
        self.status = Status::Pending;
        self.clear_execution();
    }

    /// Reset a downstream stage so it waits on its dependencies again.
    pub fn reset_waiting(&mut self) {
        self.status = Status::Waiting;
        self.clear_execution();
    }
}

/// Execution sub-unit of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub stage_id: StageId,
    pub number: u32,
    pub name: String,
    pub status: Status,
    pub error: String,
    pub exit_code: i32,
    pub started: Option<DateTime<Utc>>,
    pub stopped: Option<DateTime<Utc>>,
}

impl Step {
    pub fn new(stage_id: StageId, number: u32, name: impl Into<String>) -> Self {
        Self {
            id: StepId::new(),
            stage_id,
            number,
            name: name.into(),
            status: Status::Pending,
            error: String::new(),
            exit_code: 0,
            started: None,
            stopped: None,
        }
    }

    pub fn reset(&mut self) {
        self.status = Status::Pending;
        self.error.clear();
        self.exit_code = 0;
        self.started = None;
        self.stopped = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_truncate_is_rune_safe() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("héllo wörld", 5), "héllo");
        assert_eq!(truncate("日本語テキスト", 3), "日本語");
        assert_eq!(truncate("", 3), "");
    }

    #[test]
    fn test_from_hook_truncates_title_and_message() {
        let mut repo = Repository::new(UserId::new(), "octocat", "hello-world");
        repo.counter = 42;
        let hook = Hook {
            title: "t".repeat(2500),
            message: "ü".repeat(2001),
            after: "7fd1a60b01f91b314f59955a4e4d4e80d8edf11d".to_string(),
            ..Default::default()
        };

        let build = Build::from_hook(&repo, &hook, MAX_MESSAGE_RUNES);
        assert_eq!(build.number, 42);
        assert_eq!(build.status, Status::Pending);
        assert_eq!(build.title.chars().count(), 2000);
        assert_eq!(build.message.chars().count(), 2000);
        assert_eq!(build.after, hook.after);
    }

    #[test]
    fn test_fail_sets_terminal_error() {
        let repo = Repository::new(UserId::new(), "octocat", "hello-world");
        let mut build = Build::from_hook(&repo, &Hook::default(), MAX_MESSAGE_RUNES);
        build.fail("yaml: found unknown directive name");

        assert_eq!(build.status, Status::Error);
        assert_eq!(build.error, "yaml: found unknown directive name");
        assert!(build.started.is_some());
        assert!(build.finished.is_some());
    }

    #[test]
    fn test_stage_resets() {
        let mut stage = Stage::new(RepoId::new(), BuildId::new(), 1, "build");
        stage.status = Status::Failing;
        stage.error = "exit status 1".to_string();
        stage.exit_code = 1;
        stage.machine = "runner-01".to_string();
        stage.started = Some(Utc::now());
        stage.stopped = Some(Utc::now());

        let mut downstream = stage.clone();

        stage.reset_pending();
        assert_eq!(stage.status, Status::Pending);
        assert!(stage.error.is_empty());
        assert_eq!(stage.exit_code, 0);
        assert!(stage.machine.is_empty());
        assert!(stage.started.is_none() && stage.stopped.is_none());

        downstream.reset_waiting();
        assert_eq!(downstream.status, Status::Waiting);
        assert!(downstream.machine.is_empty());
    }
}
