//! Test fixtures for creating sample data.

use chrono::{Duration, Utc};
use oxide_core::build::{Build, MAX_MESSAGE_RUNES, Stage, Step};
use oxide_core::cron::Cron;
use oxide_core::ids::UserId;
use oxide_core::repo::{Commit, CommitAuthor, Event, Hook, Repository, TRIGGER_HOOK, User};
use oxide_core::Status;

/// A single pipeline with no steps and no trigger conditions.
pub const SIMPLE_YAML: &str = "kind: pipeline\nsteps: [ ]";

/// A stream the YAML parser rejects up front.
pub const UNKNOWN_DIRECTIVE_YAML: &str = "%ERROR";

/// A quoted scalar whose continuation line starts with `%`.
pub const PERCENT_CONTINUATION_YAML: &str = "kind: pipeline\nname: \"50\n%done\"\n";

/// A pipeline that only runs for the `weekly` cron job.
pub const WEEKLY_CRON_YAML: &str = "kind: pipeline\ntrigger:\n  cron: [weekly]\n";

pub const DEVELOP_ONLY_YAML: &str = "kind: pipeline\ntrigger:\n  branch: [develop]\n";

pub const PULL_REQUEST_ONLY_YAML: &str = "kind: pipeline\ntrigger:\n  event: [pull_request]\n";

/// `pipeline2` depends on `pipeline1`, which only runs on `develop`.
pub const FILTERED_DEPENDENCY_YAML: &str = r#"
kind: pipeline
name: pipeline1
trigger:
  branch: [develop]
---
kind: pipeline
name: pipeline2
depends_on: [pipeline1]
"#;

pub const CHAINED_YAML: &str = r#"
kind: pipeline
name: backend
platform:
  os: linux
  arch: arm64
concurrency:
  limit: 2
node:
  region: eu
---
kind: pipeline
name: frontend
type: exec
depends_on: [backend]
trigger:
  status: [success, failure]
"#;

/// `deploy` depends on an unnamed pipeline by its default name.
pub const DEFAULT_DEPENDENCY_YAML: &str = r#"
kind: pipeline
---
kind: pipeline
name: deploy
depends_on: [default]
"#;

pub const CYCLE_YAML: &str = r#"
kind: pipeline
name: a
depends_on: [b]
---
kind: pipeline
name: b
depends_on: [a]
"#;

pub const PRIVILEGED_YAML: &str = r#"
kind: pipeline
steps:
- name: dind
  image: docker:dind
  privileged: true
"#;

/// Factory for repository owners.
pub struct UserFixture;

impl UserFixture {
    pub fn active() -> User {
        User {
            id: UserId::new(),
            login: "octocat".to_string(),
            email: "octocat@github.com".to_string(),
            active: true,
            admin: false,
        }
    }
}

/// Factory for repositories.
pub struct RepoFixture;

impl RepoFixture {
    pub fn owned_by(owner: &User) -> Repository {
        let mut repo = Repository::new(owner.id, "octocat", "hello-world");
        repo.link = "https://github.com/octocat/hello-world".to_string();
        repo.branch = "master".to_string();
        repo.secret = "correct-horse-battery-staple".to_string();
        repo.counter = 41;
        repo.throttle = 3;
        repo
    }
}

/// Factory for branch head commits.
pub struct CommitFixture;

impl CommitFixture {
    pub fn head() -> Commit {
        Commit {
            sha: "7fd1a60b01f91b314f59955a4e4d4e80d8edf11d".to_string(),
            git_ref: "refs/heads/master".to_string(),
            message: "Updated README.md".to_string(),
            author: CommitAuthor {
                name: "The Octocat".to_string(),
                email: "octocat@hello-world.com".to_string(),
                login: "octocat".to_string(),
                avatar: "https://avatars.githubusercontent.com/u/583231".to_string(),
            },
            link: "https://github.com/octocat/hello-world/commit/7fd1a60b01f9".to_string(),
        }
    }
}

/// Factory for cron jobs.
pub struct CronFixture;

impl CronFixture {
    /// A midnight job on `master`, due a minute ago.
    pub fn nightly(repo: &Repository) -> Cron {
        Self::due(repo, "nightly", "0 0 * * *")
    }

    pub fn due(repo: &Repository, name: &str, expr: &str) -> Cron {
        let mut cron = Cron::new(repo.id, name, expr, "master");
        cron.next = Utc::now() - Duration::minutes(1);
        cron
    }
}

/// Factory for inbound hooks.
pub struct HookFixture;

impl HookFixture {
    pub fn push() -> Hook {
        Hook {
            trigger: TRIGGER_HOOK.to_string(),
            event: Event::Push,
            link: "https://github.com/octocat/hello-world/compare/553c2077f0ed...7fd1a60b01f9"
                .to_string(),
            message: "Updated README.md".to_string(),
            before: "553c2077f0edc3d5dc5d17262f6aa498e69d6f8e".to_string(),
            after: "7fd1a60b01f91b314f59955a4e4d4e80d8edf11d".to_string(),
            git_ref: "refs/heads/master".to_string(),
            source: "master".to_string(),
            target: "master".to_string(),
            author_login: "octocat".to_string(),
            author_name: "The Octocat".to_string(),
            author_email: "octocat@hello-world.com".to_string(),
            author_avatar: "https://avatars.githubusercontent.com/u/583231".to_string(),
            sender: "octocat".to_string(),
            ..Default::default()
        }
    }

    pub fn pull_request(fork: &str) -> Hook {
        Hook {
            event: Event::PullRequest,
            action: "opened".to_string(),
            git_ref: "refs/pull/42/head".to_string(),
            fork: fork.to_string(),
            source: "feature".to_string(),
            ..Self::push()
        }
    }
}

/// Factory for persisted builds used by the transition tests.
pub struct BuildFixture;

impl BuildFixture {
    pub fn with_status(repo: &Repository, status: Status) -> Build {
        let mut build = Build::from_hook(repo, &HookFixture::push(), MAX_MESSAGE_RUNES);
        build.status = status;
        build
    }

    /// A stage of `build` with the given dependencies.
    pub fn stage(build: &Build, number: u32, name: &str, status: Status, deps: &[&str]) -> Stage {
        let mut stage = Stage::new(build.repo_id, build.id, number, name);
        stage.kind = "pipeline".to_string();
        stage.pipeline_type = "docker".to_string();
        stage.os = "linux".to_string();
        stage.arch = "amd64".to_string();
        stage.status = status;
        stage.depends_on = deps.iter().map(|d| d.to_string()).collect();
        if status.is_terminal() {
            stage.machine = "runner-01".to_string();
            stage.exit_code = if status == Status::Passing { 0 } else { 1 };
            stage.started = Some(chrono::Utc::now());
            stage.stopped = Some(chrono::Utc::now());
        }
        stage
    }

    pub fn finished_step(stage: &Stage, number: u32, name: &str, status: Status) -> Step {
        let mut step = Step::new(stage.id, number, name);
        step.status = status;
        step.exit_code = if status == Status::Passing { 0 } else { 1 };
        step.started = Some(chrono::Utc::now());
        step.stopped = Some(chrono::Utc::now());
        step
    }
}
