//! In-memory fakes of the orchestrator ports.
//!
//! Every fake records the calls it receives so tests can assert on side
//! effects, and most can be switched into a failing mode.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oxide_core::build::{Build, Stage, Step};
use oxide_core::cron::Cron;
use oxide_core::ids::{BuildId, RepoId, StageId, StepId, UserId};
use oxide_core::ports::{
    BuildStore, Canceler, CommitService, Config, ConfigArgs, ConfigService, ConvertService,
    CronStore, Filter, LegacyConverter, LegacyMetadata, LogStore, RepositoryStore, Scheduler,
    StageStore, StatusInput, StatusService, StepStore, Triggerer, UserStore, ValidateService,
    ValidationOutcome, WebhookData, WebhookSender,
};
use oxide_core::repo::{Commit, Hook, Repository, User};
use oxide_core::{Error, Result, Status};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Failure switch shared by the fakes.
#[derive(Debug, Default)]
pub struct FailSwitch(AtomicBool);

impl FailSwitch {
    pub fn set(&self, failing: bool) {
        self.0.store(failing, Ordering::SeqCst);
    }

    fn check(&self, what: &str) -> Result<()> {
        if self.0.load(Ordering::SeqCst) {
            return Err(Error::Internal(format!("{} failed", what)));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeUsers {
    users: Mutex<HashMap<UserId, User>>,
    pub fail: FailSwitch,
}

impl FakeUsers {
    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }
}

#[async_trait]
impl UserStore for FakeUsers {
    async fn find(&self, id: UserId) -> Result<User> {
        self.fail.check("user lookup")?;
        self.users
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::UserNotFound(id.to_string()))
    }
}

/// Repository lookups plus build counters.
#[derive(Debug, Default)]
pub struct FakeRepos {
    repos: Mutex<HashMap<RepoId, Repository>>,
    counters: Mutex<HashMap<RepoId, u64>>,
    pub fail: FailSwitch,
}

impl FakeRepos {
    pub fn insert(&self, repo: Repository) {
        self.repos.lock().unwrap().insert(repo.id, repo);
    }

    pub fn increments(&self, repo_id: RepoId) -> u64 {
        self.counters.lock().unwrap().get(&repo_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RepositoryStore for FakeRepos {
    async fn find(&self, id: RepoId) -> Result<Repository> {
        self.repos
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::RepositoryNotFound(id.to_string()))
    }

    async fn increment(&self, repo: &Repository) -> Result<Repository> {
        self.fail.check("increment")?;
        let mut counters = self.counters.lock().unwrap();
        let counter = counters.entry(repo.id).or_insert(0);
        *counter += 1;

        let mut updated = repo.clone();
        updated.counter = repo.counter + *counter;
        Ok(updated)
    }
}

/// A persistence call recorded by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    CreateBuild(BuildId),
    UpdateBuild(BuildId),
    UpdateStage(String),
    UpdateStep(StepId),
    DeleteLogs(StepId),
}

#[derive(Debug, Default)]
struct StoreState {
    builds: HashMap<BuildId, Build>,
    stages: Vec<Stage>,
    steps: Vec<Step>,
    created: Vec<BuildId>,
    writes: Vec<Write>,
}

/// Build, stage, step, and log storage in one place.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    /// Fails [`BuildStore::create`].
    pub fail_create: FailSwitch,
    /// Name of a stage whose updates fail.
    fail_stage: Mutex<Option<String>>,
}

impl MemoryStore {
    /// Insert records without recording writes.
    pub fn seed(&self, build: Build, stages: Vec<Stage>, steps: Vec<Step>) {
        let mut state = self.state.lock().unwrap();
        state.builds.insert(build.id, build);
        state.stages.extend(stages);
        state.steps.extend(steps);
    }

    pub fn fail_stage_updates(&self, name: &str) {
        *self.fail_stage.lock().unwrap() = Some(name.to_string());
    }

    pub fn build(&self, id: BuildId) -> Option<Build> {
        self.state.lock().unwrap().builds.get(&id).cloned()
    }

    /// Builds passed to [`BuildStore::create`], oldest first.
    pub fn created(&self) -> Vec<Build> {
        let state = self.state.lock().unwrap();
        state
            .created
            .iter()
            .filter_map(|id| state.builds.get(id).cloned())
            .collect()
    }

    /// Stages of a build ordered by number.
    pub fn stages(&self, build_id: BuildId) -> Vec<Stage> {
        let mut stages: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .stages
            .iter()
            .filter(|s| s.build_id == build_id)
            .cloned()
            .collect();
        stages.sort_by_key(|s| s.number);
        stages
    }

    pub fn stage(&self, build_id: BuildId, name: &str) -> Option<Stage> {
        self.stages(build_id).into_iter().find(|s| s.name == name)
    }

    pub fn steps(&self, stage_id: StageId) -> Vec<Step> {
        self.state
            .lock()
            .unwrap()
            .steps
            .iter()
            .filter(|s| s.stage_id == stage_id)
            .cloned()
            .collect()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }
}

#[async_trait]
impl BuildStore for MemoryStore {
    async fn find(&self, id: BuildId) -> Result<Build> {
        self.build(id)
            .ok_or_else(|| Error::BuildNotFound(id.to_string()))
    }

    async fn create(&self, build: &Build, stages: &[Stage]) -> Result<()> {
        self.fail_create.check("build create")?;
        let mut state = self.state.lock().unwrap();
        state.builds.insert(build.id, build.clone());
        state.stages.extend(stages.iter().cloned());
        state.created.push(build.id);
        state.writes.push(Write::CreateBuild(build.id));
        Ok(())
    }

    async fn update(&self, build: &Build) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.builds.insert(build.id, build.clone());
        state.writes.push(Write::UpdateBuild(build.id));
        Ok(())
    }
}

#[async_trait]
impl StageStore for MemoryStore {
    async fn find_number(&self, build_id: BuildId, number: u32) -> Result<Stage> {
        self.state
            .lock()
            .unwrap()
            .stages
            .iter()
            .find(|s| s.build_id == build_id && s.number == number)
            .cloned()
            .ok_or_else(|| Error::StageNotFound(format!("{}/{}", build_id, number)))
    }

    async fn list(&self, build_id: BuildId) -> Result<Vec<Stage>> {
        Ok(self.stages(build_id))
    }

    async fn update(&self, stage: &Stage) -> Result<()> {
        if self.fail_stage.lock().unwrap().as_deref() == Some(stage.name.as_str()) {
            return Err(Error::Database(format!("cannot update stage {}", stage.name)));
        }
        let mut state = self.state.lock().unwrap();
        let existing = state
            .stages
            .iter_mut()
            .find(|s| s.id == stage.id)
            .ok_or_else(|| Error::StageNotFound(stage.id.to_string()))?;
        *existing = stage.clone();
        state.writes.push(Write::UpdateStage(stage.name.clone()));
        Ok(())
    }
}

#[async_trait]
impl StepStore for MemoryStore {
    async fn list(&self, stage_id: StageId) -> Result<Vec<Step>> {
        Ok(self.steps(stage_id))
    }

    async fn update(&self, step: &Step) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.steps.iter_mut().find(|s| s.id == step.id) {
            *existing = step.clone();
        }
        state.writes.push(Write::UpdateStep(step.id));
        Ok(())
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn delete(&self, step_id: StepId) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .writes
            .push(Write::DeleteLogs(step_id));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeCommits {
    commit: Mutex<Option<Commit>>,
    missing: Mutex<HashSet<String>>,
    lookups: Mutex<Vec<String>>,
}

impl FakeCommits {
    pub fn set(&self, commit: Commit) {
        *self.commit.lock().unwrap() = Some(commit);
    }

    /// Make lookups of `key`, a sha or branch, fail.
    pub fn fail_ref(&self, key: &str) {
        self.missing.lock().unwrap().insert(key.to_string());
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    fn lookup(&self, key: &str) -> Result<Commit> {
        self.lookups.lock().unwrap().push(key.to_string());
        if self.missing.lock().unwrap().contains(key) {
            return Err(Error::Network(format!("commit {} not found", key)));
        }
        self.commit
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Network(format!("commit {} not found", key)))
    }
}

#[async_trait]
impl CommitService for FakeCommits {
    async fn find(&self, _user: &User, _repo: &str, sha: &str) -> Result<Commit> {
        self.lookup(sha)
    }

    async fn find_ref(&self, _user: &User, _repo: &str, git_ref: &str) -> Result<Commit> {
        self.lookup(git_ref)
    }
}

/// Serves a fixed configuration file, or none.
#[derive(Debug, Default)]
pub struct FakeConfigs {
    data: Mutex<Option<String>>,
}

impl FakeConfigs {
    pub fn set(&self, data: &str) {
        *self.data.lock().unwrap() = Some(data.to_string());
    }

    pub fn clear(&self) {
        *self.data.lock().unwrap() = None;
    }
}

#[async_trait]
impl ConfigService for FakeConfigs {
    async fn find(&self, args: ConfigArgs<'_>) -> Result<Config> {
        self.data
            .lock()
            .unwrap()
            .clone()
            .map(Config::new)
            .ok_or_else(|| Error::ConfigNotFound(args.repo.config.clone()))
    }
}

/// Returns configuration unchanged unless given an error to report.
#[derive(Debug, Default)]
pub struct FakeConverter {
    error: Mutex<Option<String>>,
}

impl FakeConverter {
    pub fn fail_with(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl ConvertService for FakeConverter {
    async fn convert(&self, _args: ConfigArgs<'_>, config: &Config) -> Result<Config> {
        match self.error.lock().unwrap().clone() {
            Some(message) => Err(Error::Other(message)),
            None => Ok(config.clone()),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeLegacy {
    error: Mutex<Option<String>>,
}

impl FakeLegacy {
    pub fn fail_with(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }
}

impl LegacyConverter for FakeLegacy {
    fn convert(&self, data: &str, _metadata: &LegacyMetadata) -> Result<String> {
        match self.error.lock().unwrap().clone() {
            Some(message) => Err(Error::Other(message)),
            None => Ok(data.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct FakeValidator {
    outcome: Mutex<ValidationOutcome>,
}

impl Default for FakeValidator {
    fn default() -> Self {
        Self {
            outcome: Mutex::new(ValidationOutcome::Proceed),
        }
    }
}

impl FakeValidator {
    pub fn set(&self, outcome: ValidationOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }
}

#[async_trait]
impl ValidateService for FakeValidator {
    async fn validate(&self, _args: ConfigArgs<'_>, _config: &Config) -> ValidationOutcome {
        self.outcome.lock().unwrap().clone()
    }
}

#[derive(Debug, Default)]
pub struct FakeStatus {
    sent: Mutex<Vec<(BuildId, Status)>>,
    pub fail: FailSwitch,
}

impl FakeStatus {
    pub fn sent(&self) -> Vec<(BuildId, Status)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusService for FakeStatus {
    async fn send(&self, _user: &User, input: StatusInput<'_>) -> Result<()> {
        self.fail.check("status")?;
        self.sent
            .lock()
            .unwrap()
            .push((input.build.id, input.build.status));
        Ok(())
    }
}

/// Records scheduled stages instead of queueing them.
#[derive(Debug, Default)]
pub struct FakeScheduler {
    scheduled: Mutex<Vec<Stage>>,
    cancelled: Mutex<Vec<BuildId>>,
    pub fail: FailSwitch,
}

impl FakeScheduler {
    pub fn scheduled(&self) -> Vec<Stage> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn scheduled_names(&self) -> Vec<String> {
        self.scheduled().into_iter().map(|s| s.name).collect()
    }
}

#[async_trait]
impl Scheduler for FakeScheduler {
    async fn schedule(&self, stage: &Stage) -> Result<()> {
        self.fail.check("schedule")?;
        self.scheduled.lock().unwrap().push(stage.clone());
        Ok(())
    }

    async fn request(&self, _filter: &Filter) -> Result<Stage> {
        Err(Error::Scheduler("request is not supported".to_string()))
    }

    async fn cancel(&self, build_id: BuildId) -> Result<()> {
        self.cancelled.lock().unwrap().push(build_id);
        Ok(())
    }

    async fn cancelled(&self, build_id: BuildId) -> Result<bool> {
        Ok(self.cancelled.lock().unwrap().contains(&build_id))
    }

    async fn pause(&self) -> Result<()> {
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        Ok(())
    }

    async fn stats(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "scheduled": self.scheduled.lock().unwrap().len() }))
    }
}

#[derive(Debug, Default)]
pub struct FakeWebhooks {
    sent: Mutex<Vec<WebhookData>>,
    pub fail: FailSwitch,
}

impl FakeWebhooks {
    pub fn sent(&self) -> Vec<WebhookData> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSender for FakeWebhooks {
    async fn send(&self, payload: &WebhookData) -> Result<()> {
        self.fail.check("webhook")?;
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeCanceler {
    calls: Mutex<Vec<(RepoId, BuildId)>>,
    pub fail: FailSwitch,
}

impl FakeCanceler {
    pub fn calls(&self) -> Vec<(RepoId, BuildId)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Canceler for FakeCanceler {
    async fn cancel_pending(&self, repo: &Repository, build: &Build) -> Result<()> {
        self.calls.lock().unwrap().push((repo.id, build.id));
        self.fail.check("cancel pending")
    }
}

/// Cron job definitions, served in insertion order.
#[derive(Debug, Default)]
pub struct FakeCrons {
    jobs: Mutex<Vec<Cron>>,
    updates: Mutex<Vec<Cron>>,
    failing_updates: Mutex<HashSet<String>>,
    pub fail_list: FailSwitch,
}

impl FakeCrons {
    pub fn insert(&self, cron: Cron) {
        self.jobs.lock().unwrap().push(cron);
    }

    /// Make updates of the job named `name` fail.
    pub fn fail_update(&self, name: &str) {
        self.failing_updates.lock().unwrap().insert(name.to_string());
    }

    pub fn updates(&self) -> Vec<Cron> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl CronStore for FakeCrons {
    async fn ready(&self, before: DateTime<Utc>) -> Result<Vec<Cron>> {
        self.fail_list.check("cron list")?;
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.next <= before)
            .cloned()
            .collect())
    }

    async fn update(&self, cron: &Cron) -> Result<()> {
        if self.failing_updates.lock().unwrap().contains(&cron.name) {
            return Err(Error::Database(format!("cron {} update failed", cron.name)));
        }
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == cron.id) {
            *job = cron.clone();
        }
        self.updates.lock().unwrap().push(cron.clone());
        Ok(())
    }
}

/// Records trigger requests without assembling builds.
#[derive(Debug, Default)]
pub struct FakeTriggerer {
    calls: Mutex<Vec<(RepoId, Hook)>>,
    failing: Mutex<HashSet<RepoId>>,
}

impl FakeTriggerer {
    pub fn calls(&self) -> Vec<(RepoId, Hook)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_for(&self, repo_id: RepoId) {
        self.failing.lock().unwrap().insert(repo_id);
    }
}

#[async_trait]
impl Triggerer for FakeTriggerer {
    async fn trigger(&self, repo: &Repository, hook: &Hook) -> Result<Option<Build>> {
        self.calls.lock().unwrap().push((repo.id, hook.clone()));
        if self.failing.lock().unwrap().contains(&repo.id) {
            return Err(Error::Internal(format!("trigger for {} failed", repo.slug)));
        }
        Ok(None)
    }
}
