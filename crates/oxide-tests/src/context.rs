//! Test context wiring the orchestrator to in-memory fakes.

use crate::fakes::*;
use crate::fixtures::{RepoFixture, UserFixture};
use oxide_core::ports::Triggerer;
use oxide_core::repo::{Repository, User};
use oxide_scheduler::{
    BackgroundTasks, BuildTriggerer, CronScheduler, HmacSigner, ManifestLinter,
    OrchestratorConfig, StageTransitions, TriggerPorts,
};
use std::sync::Arc;

/// Fakes for every port plus an active owner and their repository.
pub struct TestContext {
    pub users: Arc<FakeUsers>,
    pub repos: Arc<FakeRepos>,
    pub store: Arc<MemoryStore>,
    pub commits: Arc<FakeCommits>,
    pub configs: Arc<FakeConfigs>,
    pub converter: Arc<FakeConverter>,
    pub legacy: Arc<FakeLegacy>,
    pub validator: Arc<FakeValidator>,
    pub status: Arc<FakeStatus>,
    pub scheduler: Arc<FakeScheduler>,
    pub webhooks: Arc<FakeWebhooks>,
    pub canceler: Arc<FakeCanceler>,
    pub crons: Arc<FakeCrons>,
    pub triggers: Arc<FakeTriggerer>,
    pub tasks: BackgroundTasks,
    pub owner: User,
    pub repo: Repository,
}

impl TestContext {
    pub fn new() -> Self {
        crate::init_test_logging();

        let owner = UserFixture::active();
        let repo = RepoFixture::owned_by(&owner);
        let users = Arc::new(FakeUsers::default());
        users.insert(owner.clone());
        let repos = Arc::new(FakeRepos::default());
        repos.insert(repo.clone());

        Self {
            users,
            repos,
            store: Arc::default(),
            commits: Arc::default(),
            configs: Arc::default(),
            converter: Arc::default(),
            legacy: Arc::default(),
            validator: Arc::default(),
            status: Arc::default(),
            scheduler: Arc::default(),
            webhooks: Arc::default(),
            canceler: Arc::default(),
            crons: Arc::default(),
            triggers: Arc::default(),
            tasks: BackgroundTasks::new(),
            owner,
            repo,
        }
    }

    /// Context whose configuration service serves `yaml`.
    pub fn with_yaml(yaml: &str) -> Self {
        let ctx = Self::new();
        ctx.configs.set(yaml);
        ctx
    }

    pub fn ports(&self) -> TriggerPorts {
        TriggerPorts {
            users: self.users.clone(),
            repos: self.repos.clone(),
            builds: self.store.clone(),
            commits: self.commits.clone(),
            configs: self.configs.clone(),
            converter: self.converter.clone(),
            legacy: self.legacy.clone(),
            validator: self.validator.clone(),
            linter: Arc::new(ManifestLinter::new()),
            signer: Arc::new(HmacSigner::new()),
            status: self.status.clone(),
            scheduler: self.scheduler.clone(),
            webhooks: self.webhooks.clone(),
            canceler: self.canceler.clone(),
        }
    }

    pub fn triggerer(&self) -> BuildTriggerer {
        self.triggerer_with(OrchestratorConfig::default())
    }

    pub fn triggerer_with(&self, config: OrchestratorConfig) -> BuildTriggerer {
        BuildTriggerer::new(self.ports())
            .with_config(config)
            .with_tasks(self.tasks.clone())
    }

    pub fn transitions(&self) -> StageTransitions {
        StageTransitions::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.scheduler.clone(),
        )
    }

    /// Cron scheduler that hands hooks to the recording triggerer.
    pub fn cron_scheduler(&self) -> CronScheduler {
        self.cron_scheduler_with(self.triggers.clone())
    }

    pub fn cron_scheduler_with(&self, triggerer: Arc<dyn Triggerer>) -> CronScheduler {
        CronScheduler::new(
            self.crons.clone(),
            self.repos.clone(),
            self.users.clone(),
            self.commits.clone(),
            triggerer,
        )
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
