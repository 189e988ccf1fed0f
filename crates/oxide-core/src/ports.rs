//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the build orchestrator and
//! the external adapters it relies on: stores, source-control services,
//! configuration pipeline, notification channels, and the stage queue.

use crate::build::{Build, Stage, Step};
use crate::cron::Cron;
use crate::ids::*;
use crate::manifest::{LintError, Manifest};
use crate::repo::{Commit, Hook, Repository, User};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Repository owners.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, id: UserId) -> Result<User>;
}

/// Repository records and their build counters.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn find(&self, id: RepoId) -> Result<Repository>;

    /// Atomically increment the build counter, returning the updated
    /// repository. Numbers are never reused.
    async fn increment(&self, repo: &Repository) -> Result<Repository>;
}

/// Builds together with their stages.
#[async_trait]
pub trait BuildStore: Send + Sync {
    async fn find(&self, id: BuildId) -> Result<Build>;

    /// Persist a build and all of its stages in one transaction.
    async fn create(&self, build: &Build, stages: &[Stage]) -> Result<()>;

    async fn update(&self, build: &Build) -> Result<()>;
}

#[async_trait]
pub trait StageStore: Send + Sync {
    async fn find_number(&self, build_id: BuildId, number: u32) -> Result<Stage>;

    async fn list(&self, build_id: BuildId) -> Result<Vec<Stage>>;

    async fn update(&self, stage: &Stage) -> Result<()>;
}

#[async_trait]
pub trait StepStore: Send + Sync {
    async fn list(&self, stage_id: StageId) -> Result<Vec<Step>>;

    async fn update(&self, step: &Step) -> Result<()>;
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn delete(&self, step_id: StepId) -> Result<()>;
}

/// Cron job definitions.
#[async_trait]
pub trait CronStore: Send + Sync {
    /// Jobs whose next run is at or before `before`.
    async fn ready(&self, before: DateTime<Utc>) -> Result<Vec<Cron>>;

    async fn update(&self, cron: &Cron) -> Result<()>;
}

/// Commit metadata from the source-control provider.
#[async_trait]
pub trait CommitService: Send + Sync {
    async fn find(&self, user: &User, repo: &str, sha: &str) -> Result<Commit>;

    async fn find_ref(&self, user: &User, repo: &str, git_ref: &str) -> Result<Commit>;
}

/// Raw configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub data: String,
    pub kind: String,
}

impl Config {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            kind: String::new(),
        }
    }
}

/// Arguments shared by the configuration lookup and its validators.
#[derive(Debug, Clone, Copy)]
pub struct ConfigArgs<'a> {
    pub user: &'a User,
    pub repo: &'a Repository,
    pub build: &'a Build,
}

#[async_trait]
pub trait ConfigService: Send + Sync {
    async fn find(&self, args: ConfigArgs<'_>) -> Result<Config>;
}

/// Converts templated configuration (Starlark, Jsonnet, ...) to YAML.
#[async_trait]
pub trait ConvertService: Send + Sync {
    async fn convert(&self, args: ConfigArgs<'_>, config: &Config) -> Result<Config>;
}

/// Location details handed to the legacy format normalizer.
#[derive(Debug, Clone, Default)]
pub struct LegacyMetadata {
    pub filename: String,
    pub url: String,
    pub git_ref: String,
}

/// Rewrites configuration written in the legacy format.
pub trait LegacyConverter: Send + Sync {
    fn convert(&self, data: &str, metadata: &LegacyMetadata) -> Result<String>;
}

/// Outcome of external configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Proceed,
    /// Proceed, but hold every stage for manual approval.
    Block,
    /// Silently drop the event.
    Skip,
    Failed(String),
}

#[async_trait]
pub trait ValidateService: Send + Sync {
    async fn validate(&self, args: ConfigArgs<'_>, config: &Config) -> ValidationOutcome;
}

pub trait Linter: Send + Sync {
    fn lint(&self, manifest: &Manifest, trusted: bool) -> std::result::Result<(), LintError>;
}

pub trait Signer: Send + Sync {
    fn verify(&self, data: &str, secret: &str) -> bool;
}

/// Build status input for commit status reporting.
#[derive(Debug, Clone, Copy)]
pub struct StatusInput<'a> {
    pub repo: &'a Repository,
    pub build: &'a Build,
}

/// Reports build status back to the source-control provider.
#[async_trait]
pub trait StatusService: Send + Sync {
    async fn send(&self, user: &User, input: StatusInput<'_>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    Build,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    Created,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookData {
    pub event: WebhookEvent,
    pub action: WebhookAction,
    pub user: User,
    pub repo: Repository,
    pub build: Build,
}

#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, payload: &WebhookData) -> Result<()>;
}

/// Runner-side criteria for requesting queued stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    pub kind: String,
    #[serde(rename = "type")]
    pub pipeline_type: String,
    pub os: String,
    pub arch: String,
    pub variant: String,
    pub kernel: String,
    pub labels: HashMap<String, String>,
}

/// Stage queue and admission control.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Hand a pending stage to the queue.
    async fn schedule(&self, stage: &Stage) -> Result<()>;

    /// Wait for the next stage matching `filter`.
    async fn request(&self, filter: &Filter) -> Result<Stage>;

    /// Drop every queued stage of the build and mark it cancelled.
    async fn cancel(&self, build_id: BuildId) -> Result<()>;

    async fn cancelled(&self, build_id: BuildId) -> Result<bool>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Implementation-defined queue statistics.
    async fn stats(&self) -> Result<serde_json::Value>;
}

/// Cancels builds superseded by a newer build of the same branch or PR.
#[async_trait]
pub trait Canceler: Send + Sync {
    async fn cancel_pending(&self, repo: &Repository, build: &Build) -> Result<()>;
}

/// Turns an inbound hook into a build.
#[async_trait]
pub trait Triggerer: Send + Sync {
    /// `Ok(None)` means the hook was deliberately ignored.
    async fn trigger(&self, repo: &Repository, hook: &Hook) -> Result<Option<Build>>;
}
