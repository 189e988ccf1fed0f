//! Repositories, their owners, and the inbound source-control events.

use crate::ids::{RepoId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Trigger origin recorded for builds created from a webhook.
pub const TRIGGER_HOOK: &str = "@hook";

/// Trigger origin recorded for builds created by the cron scheduler.
pub const TRIGGER_CRON: &str = "@cron";

/// Kind of source-control event that produced a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    #[default]
    Push,
    PullRequest,
    Tag,
    Promote,
    Rollback,
    Cron,
    Custom,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Push => "push",
            Event::PullRequest => "pull_request",
            Event::Tag => "tag",
            Event::Promote => "promote",
            Event::Rollback => "rollback",
            Event::Cron => "cron",
            Event::Custom => "custom",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepoId,
    /// Owner whose credentials are used to talk to the provider.
    pub user_id: UserId,
    pub namespace: String,
    pub name: String,
    pub slug: String,
    pub link: String,
    pub branch: String,
    /// Path of the pipeline configuration file.
    pub config: String,
    pub trusted: bool,
    pub protected: bool,
    pub ignore_forks: bool,
    pub ignore_pulls: bool,
    pub cancel_pulls: bool,
    pub cancel_push: bool,
    /// Maximum concurrently running stages for the repository, 0 is unlimited.
    pub throttle: u32,
    /// Last assigned build number.
    pub counter: u64,
    #[serde(skip_serializing, default)]
    pub secret: String,
}

impl Repository {
    pub fn new(user_id: UserId, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let name = name.into();
        Self {
            id: RepoId::new(),
            user_id,
            slug: format!("{}/{}", namespace, name),
            namespace,
            name,
            link: String::new(),
            branch: "main".to_string(),
            config: ".oxide.yml".to_string(),
            trusted: false,
            protected: false,
            ignore_forks: false,
            ignore_pulls: false,
            cancel_pulls: false,
            cancel_push: false,
            throttle: 0,
            counter: 0,
            secret: String::new(),
        }
    }

    /// Whether a freshly created build of this event should supersede
    /// older pending builds.
    pub fn auto_cancels(&self, event: Event) -> bool {
        match event {
            Event::Push => self.cancel_push,
            Event::PullRequest => self.cancel_pulls,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub email: String,
    pub active: bool,
    pub admin: bool,
}

/// Commit metadata returned by the source-control provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub git_ref: String,
    pub message: String,
    pub author: CommitAuthor,
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
    pub login: String,
    pub avatar: String,
}

/// Normalized inbound event: a push, pull request, cron tick, or manual
/// request that may result in a build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hook {
    pub parent: u64,
    /// `@hook`, `@cron`, or the login of the user that requested the build.
    pub trigger: String,
    pub event: Event,
    pub action: String,
    pub link: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub title: String,
    pub message: String,
    pub before: String,
    pub after: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Slug of the repository the change originates from.
    pub fork: String,
    pub source: String,
    pub target: String,
    pub author_login: String,
    pub author_name: String,
    pub author_email: String,
    pub author_avatar: String,
    pub deployment: String,
    pub deployment_id: i64,
    pub debug: bool,
    pub cron: String,
    pub sender: String,
    pub params: HashMap<String, String>,
}

impl Hook {
    pub fn is_webhook(&self) -> bool {
        self.trigger == TRIGGER_HOOK
    }

    /// Fill in commit details the provider omitted from the payload.
    /// Author fields that are already present are kept.
    pub fn backfill(&mut self, commit: &Commit) {
        self.message = commit.message.clone();
        if self.author_email.is_empty() {
            self.author_email = commit.author.email.clone();
        }
        if self.author_name.is_empty() {
            self.author_name = commit.author.name.clone();
        }
        if self.author_avatar.is_empty() {
            self.author_avatar = commit.author.avatar.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        assert_eq!(
            serde_json::to_string(&Event::PullRequest).unwrap(),
            "\"pull_request\""
        );
        assert_eq!(Event::PullRequest.to_string(), "pull_request");
    }

    #[test]
    fn test_repository_slug() {
        let repo = Repository::new(UserId::new(), "octocat", "hello-world");
        assert_eq!(repo.slug, "octocat/hello-world");
    }

    #[test]
    fn test_auto_cancel_per_event() {
        let mut repo = Repository::new(UserId::new(), "octocat", "hello-world");
        repo.cancel_push = true;
        assert!(repo.auto_cancels(Event::Push));
        assert!(!repo.auto_cancels(Event::PullRequest));
        assert!(!repo.auto_cancels(Event::Tag));
    }

    #[test]
    fn test_backfill_keeps_existing_author() {
        let mut hook = Hook {
            author_name: "The Octocat".to_string(),
            ..Default::default()
        };
        let commit = Commit {
            message: "first commit".to_string(),
            author: CommitAuthor {
                name: "Someone Else".to_string(),
                email: "octocat@hello-world.com".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        hook.backfill(&commit);
        assert_eq!(hook.message, "first commit");
        assert_eq!(hook.author_name, "The Octocat");
        assert_eq!(hook.author_email, "octocat@hello-world.com");
    }
}
